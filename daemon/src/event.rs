use crate::config::Config;
use crate::state::CanonicalState;

pub enum DaemonEvent {
    /// The poller committed a new canonical state (game or console changed).
    StateCommitted(CanonicalState),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; the daemon should stop the poller and exit.
    Shutdown,
}
