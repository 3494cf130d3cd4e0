/// Extraction of the most recent game from RetroArch's `content_history.lpl`.
///
/// The history log is read as lines, not as JSON: the first line containing
/// `"label":` and the first line containing `"db_name":` are located by two
/// independent scans, and the quoted value after each marker is cut out with
/// a delimiter scan. The two lines are not required to belong to the same
/// record, so a log that interleaves records can pair a label with another
/// entry's console.
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::PlaylistError;

pub const LABEL_MARKER: &str = "\"label\":";
pub const DB_NAME_MARKER: &str = "\"db_name\":";

/// The game and console named by the newest history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub game: String,
    pub console: String,
}

pub trait PlaylistParser: Send + Sync {
    fn latest_entry(&self, path: &Path) -> Result<PlaylistEntry, PlaylistError>;
}

/// Line scanner for the `.lpl` history format.
pub struct LplHistoryParser;

impl PlaylistParser for LplHistoryParser {
    fn latest_entry(&self, path: &Path) -> Result<PlaylistEntry, PlaylistError> {
        let file = File::open(path).map_err(|source| PlaylistError::Io {
            path: path.display().to_string(),
            source,
        })?;
        parse_history(BufReader::new(file)).map_err(|e| match e {
            PlaylistError::Io { source, .. } => PlaylistError::Io {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }
}

/// Finds the first label and db_name lines in `reader` and derives the entry.
pub fn parse_history<R: BufRead>(reader: R) -> Result<PlaylistEntry, PlaylistError> {
    let mut label_line: Option<String> = None;
    let mut db_line: Option<String> = None;

    for line in reader.lines() {
        let line = line.map_err(|source| PlaylistError::Io {
            path: String::new(),
            source,
        })?;
        if label_line.is_none() && line.contains(LABEL_MARKER) {
            label_line = Some(line.clone());
        }
        if db_line.is_none() && line.contains(DB_NAME_MARKER) {
            db_line = Some(line);
        }
        if label_line.is_some() && db_line.is_some() {
            break;
        }
    }

    let label_line = label_line.ok_or(PlaylistError::MissingMarker(LABEL_MARKER))?;
    let db_line = db_line.ok_or(PlaylistError::MissingMarker(DB_NAME_MARKER))?;

    let game = game_from_label(&extract_value(&label_line, LABEL_MARKER)?);
    if game.is_empty() {
        return Err(PlaylistError::EmptyValue(LABEL_MARKER));
    }
    let console = console_from_db_name(&extract_value(&db_line, DB_NAME_MARKER)?);
    if console.is_empty() {
        return Err(PlaylistError::EmptyValue(DB_NAME_MARKER));
    }
    Ok(PlaylistEntry { game, console })
}

/// Returns the double-quoted string following `marker` on `line`.
///
/// Whitespace between the marker and the opening quote is skipped. The value
/// ends at the next quote not preceded by a backslash; `\"` and `\\` are
/// unescaped, other escapes are kept verbatim.
pub fn extract_value(line: &str, marker: &'static str) -> Result<String, PlaylistError> {
    let start = line
        .find(marker)
        .ok_or(PlaylistError::MissingMarker(marker))?
        + marker.len();
    let rest = line[start..].trim_start();
    let mut chars = rest.strip_prefix('"').ok_or(PlaylistError::Unterminated(marker))?.chars();

    let mut value = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Ok(value),
            '\\' => match chars.next() {
                Some('"') => value.push('"'),
                Some('\\') => value.push('\\'),
                Some(other) => {
                    value.push('\\');
                    value.push(other);
                }
                None => break,
            },
            _ => value.push(c),
        }
    }
    Err(PlaylistError::Unterminated(marker))
}

/// "Super Game (USA) (Rev 1)" → "Super Game".
pub fn game_from_label(label: &str) -> String {
    label.split('(').next().unwrap_or_default().trim().to_string()
}

/// "Nintendo - NES.dat" → "Nintendo - NES".
pub fn console_from_db_name(db_name: &str) -> String {
    db_name.split('.').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HISTORY: &str = r#"{
  "version": "1.5",
  "items": [
    {
      "path": "C:\\roms\\nes\\Super Game (USA).zip",
      "label": "Super Game (USA)",
      "core_path": "C:\\RetroArch-Win64\\cores\\nestopia_libretro.dll",
      "core_name": "Nintendo - NES / Famicom (Nestopia UE)",
      "crc32": "DETECT",
      "db_name": "Nintendo - NES.dat"
    },
    {
      "label": "Older Game (Europe)",
      "db_name": "Sega - Mega Drive - Genesis.lpl"
    }
  ]
}"#;

    // ── parse_history ─────────────────────────────────────────────────────────

    #[test]
    fn newest_entry_is_extracted() {
        let entry = parse_history(Cursor::new(HISTORY)).unwrap();
        assert_eq!(entry.game, "Super Game");
        assert_eq!(entry.console, "Nintendo - NES");
    }

    #[test]
    fn parser_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content_history.lpl");
        std::fs::write(&path, HISTORY).unwrap();
        let entry = LplHistoryParser.latest_entry(&path).unwrap();
        assert_eq!(entry, PlaylistEntry {
            game: "Super Game".into(),
            console: "Nintendo - NES".into(),
        });
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LplHistoryParser
            .latest_entry(&dir.path().join("missing.lpl"))
            .unwrap_err();
        assert!(matches!(err, PlaylistError::Io { .. }));
    }

    #[test]
    fn missing_label_marker_is_an_error() {
        let err = parse_history(Cursor::new("\"db_name\": \"Nintendo - NES.dat\"\n")).unwrap_err();
        assert!(matches!(err, PlaylistError::MissingMarker(LABEL_MARKER)));
    }

    #[test]
    fn missing_db_name_marker_is_an_error() {
        let err = parse_history(Cursor::new("\"label\": \"Game\"\n")).unwrap_err();
        assert!(matches!(err, PlaylistError::MissingMarker(DB_NAME_MARKER)));
    }

    #[test]
    fn empty_label_is_rejected() {
        let log = "\"label\": \"\",\n\"db_name\": \"Nintendo - NES.dat\"\n";
        assert!(matches!(
            parse_history(Cursor::new(log)),
            Err(PlaylistError::EmptyValue(LABEL_MARKER))
        ));
    }

    #[test]
    fn markers_are_scanned_independently() {
        // The first label and the first db_name come from different records.
        let log = "\"label\": \"First (USA)\",\n}\n{\n\"label\": \"Second\",\n\"db_name\": \"Sony - PlayStation.dat\"\n";
        let entry = parse_history(Cursor::new(log)).unwrap();
        assert_eq!(entry.game, "First");
        assert_eq!(entry.console, "Sony - PlayStation");
    }

    // ── extract_value ─────────────────────────────────────────────────────────

    #[test]
    fn extract_value_stops_at_unescaped_quote() {
        let line = r#"      "label": "Say \"Hi\" (Japan)","#;
        assert_eq!(extract_value(line, LABEL_MARKER).unwrap(), "Say \"Hi\" (Japan)");
    }

    #[test]
    fn extract_value_tolerates_missing_space() {
        assert_eq!(extract_value(r#""label":"Game""#, LABEL_MARKER).unwrap(), "Game");
    }

    #[test]
    fn extract_value_unterminated_is_error() {
        assert!(matches!(
            extract_value(r#""label": "Game"#, LABEL_MARKER),
            Err(PlaylistError::Unterminated(_))
        ));
        assert!(matches!(
            extract_value(r#""label": null"#, LABEL_MARKER),
            Err(PlaylistError::Unterminated(_))
        ));
    }

    // ── derivations ───────────────────────────────────────────────────────────

    #[test]
    fn game_label_drops_parenthetical_suffix() {
        assert_eq!(game_from_label("Super Game (USA) (Rev 1)"), "Super Game");
        assert_eq!(game_from_label("  Plain Title  "), "Plain Title");
        assert_eq!(game_from_label("(Prototype)"), "");
    }

    #[test]
    fn console_is_dotted_prefix_of_db_name() {
        assert_eq!(console_from_db_name("Nintendo - NES.dat"), "Nintendo - NES");
        assert_eq!(console_from_db_name("Sega - Saturn.lpl"), "Sega - Saturn");
        assert_eq!(console_from_db_name("NoExtension"), "NoExtension");
    }
}
