/// Per-tick resolution of the running templates into one canonical state, and
/// the change detection that decides what gets committed and published.
use crate::registry::{display_name, GameTemplate, NATIVE_SYSTEM};
use crate::state::CanonicalState;

// ── Winner selection ──────────────────────────────────────────────────────────

/// Picks the template that names the current activity.
///
/// `running` is in registry order. With one candidate it wins regardless of
/// focus. With several, the one owning `focused_pid` wins; otherwise the
/// first non-emulator candidate, and the emulator only when nothing else is
/// left. Callers must supply `focused_pid` whenever `running.len() > 1`.
pub fn pick_winner(running: &[GameTemplate], focused_pid: Option<u32>) -> Option<&GameTemplate> {
    match running {
        [] => None,
        [only] => Some(only),
        _ => {
            if let Some(focused) = focused_pid
                .and_then(|pid| running.iter().find(|t| t.pid == pid && t.pid != 0))
            {
                return Some(focused);
            }
            running
                .iter()
                .find(|t| !t.is_emulator())
                .or_else(|| running.first())
        }
    }
}

/// Whether resolving a winner among `running` needs the focused pid.
pub fn needs_focus(running: &[GameTemplate]) -> bool {
    running.len() > 1
}

/// Names a native (non-emulator) winner.
///
/// The template's fixed caption wins, then the live OS caption, then the
/// template's own game name. Both fields are always non-empty.
pub fn native_state(template: &GameTemplate, os_title: Option<&str>) -> CanonicalState {
    let game = [
        Some(template.window_title.trim()),
        os_title.map(str::trim),
        Some(template.game.trim()),
    ]
    .into_iter()
    .flatten()
    .find(|s| !s.is_empty())
    .map(str::to_string)
    .unwrap_or_else(|| display_name(&template.process_name));

    let console = match template.system.trim() {
        "" => NATIVE_SYSTEM.to_string(),
        system => system.to_string(),
    };
    CanonicalState::tracking(game, console)
}

// ── Change detection ──────────────────────────────────────────────────────────

/// What the poller has to do with one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: CanonicalState,
    /// Write `state` into the shared canonical state.
    pub commit: bool,
    /// Publish `state` to subscribers.
    pub notify: bool,
    /// Empty the output files.
    pub clear_sinks: bool,
}

/// Remembers the last observed state across ticks.
#[derive(Debug, Default)]
pub struct StateChangeDetector {
    last: CanonicalState,
    initialized: bool,
}

impl StateChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> &CanonicalState {
        &self.last
    }

    /// Folds the state resolved this tick (idle when nothing runs).
    ///
    /// Only a change of `game` notifies. A console-only change is committed
    /// silently, so subscribers keep showing the previous console until the
    /// game changes too.
    pub fn observe(&mut self, next: CanonicalState) -> Transition {
        let transition = if next.is_idle() {
            Transition {
                commit: next != self.last,
                notify: !self.last.game.is_empty(),
                clear_sinks: !self.initialized || !self.last.is_idle(),
                state: next,
            }
        } else {
            Transition {
                commit: next != self.last,
                notify: next.game != self.last.game,
                clear_sinks: false,
                state: next,
            }
        };
        self.initialized = true;
        self.last = transition.state.clone();
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(name: &str, pid: u32) -> GameTemplate {
        let mut t = GameTemplate::native(name, "");
        t.pid = pid;
        t.is_running = true;
        t
    }

    fn emulator(pid: u32) -> GameTemplate {
        let mut t = GameTemplate::emulator();
        t.pid = pid;
        t.is_running = true;
        t
    }

    // ── pick_winner ───────────────────────────────────────────────────────────

    #[test]
    fn nothing_running_has_no_winner() {
        assert!(pick_winner(&[], Some(1)).is_none());
    }

    #[test]
    fn single_candidate_wins_without_focus() {
        let r = [running("foo.exe", 10)];
        assert_eq!(pick_winner(&r, None).unwrap().process_name, "foo.exe");
        assert_eq!(pick_winner(&r, Some(999)).unwrap().process_name, "foo.exe");
        assert!(!needs_focus(&r));
    }

    #[test]
    fn focused_candidate_wins() {
        let r = [running("foo.exe", 10), running("bar.exe", 20)];
        assert!(needs_focus(&r));
        assert_eq!(pick_winner(&r, Some(20)).unwrap().process_name, "bar.exe");
    }

    #[test]
    fn unfocused_tie_prefers_first_native() {
        let r = [emulator(5), running("foo.exe", 10), running("bar.exe", 20)];
        assert_eq!(pick_winner(&r, Some(999)).unwrap().process_name, "foo.exe");
    }

    #[test]
    fn focused_emulator_wins_over_natives() {
        let r = [running("foo.exe", 10), emulator(5)];
        assert!(pick_winner(&r, Some(5)).unwrap().is_emulator());
    }

    // ── native_state ──────────────────────────────────────────────────────────

    #[test]
    fn fixed_caption_beats_os_title() {
        let t = GameTemplate::new("foo.exe", "Fixed Caption", "Windows", "foo");
        assert_eq!(native_state(&t, Some("Live")).game, "Fixed Caption");
    }

    #[test]
    fn os_title_used_when_caption_empty() {
        let t = GameTemplate::native("foo.exe", "");
        let s = native_state(&t, Some("Foo - Level 3"));
        assert_eq!(s, CanonicalState::tracking("Foo - Level 3", "Windows"));
    }

    #[test]
    fn template_game_is_the_last_resort() {
        let t = GameTemplate::native("foo.exe", "");
        assert_eq!(native_state(&t, None).game, "foo");
        assert_eq!(native_state(&t, Some("   ")).game, "foo");

        let bare = GameTemplate::new("bar.exe", "", "", "");
        assert_eq!(native_state(&bare, None), CanonicalState::tracking("bar", "Windows"));
    }

    // ── StateChangeDetector ───────────────────────────────────────────────────

    #[test]
    fn first_idle_tick_clears_sinks_without_notifying() {
        let mut d = StateChangeDetector::new();
        let t = d.observe(CanonicalState::default());
        assert!(t.clear_sinks);
        assert!(!t.notify);
        assert!(!t.commit);

        let again = d.observe(CanonicalState::default());
        assert!(!again.clear_sinks);
    }

    #[test]
    fn game_change_commits_and_notifies_once() {
        let mut d = StateChangeDetector::new();
        let t = d.observe(CanonicalState::tracking("foo", "Windows"));
        assert!(t.commit && t.notify);

        let same = d.observe(CanonicalState::tracking("foo", "Windows"));
        assert!(!same.commit && !same.notify);
    }

    #[test]
    fn console_only_change_commits_silently() {
        let mut d = StateChangeDetector::new();
        d.observe(CanonicalState::tracking("Tetris", "Nintendo - Game Boy"));
        let t = d.observe(CanonicalState::tracking("Tetris", "Nintendo - NES"));
        assert!(t.commit);
        assert!(!t.notify);
        assert_eq!(d.last().console, "Nintendo - NES");
    }

    #[test]
    fn transition_into_idle_clears_and_notifies() {
        let mut d = StateChangeDetector::new();
        d.observe(CanonicalState::tracking("foo", "Windows"));
        let t = d.observe(CanonicalState::default());
        assert!(t.commit && t.notify && t.clear_sinks);
        assert!(t.state.is_idle());
    }
}
