/// Thumbnail lookup for the `thumbnails` screen and staging of uploaded images.
///
/// Thumbnails follow RetroArch's layout:
///   <thumbnails_path>/<console>/Named_Titles/<game>.png
///   <thumbnails_path>/<console>/Named_Boxarts/<game>.png
/// RetroArch writes `&` as `_` in file names, so both spellings are checked.
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::GeneralConfig;
use crate::error::ThumbnailError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailKind {
    Titles,
    Boxarts,
}

impl ThumbnailKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            ThumbnailKind::Titles => "Named_Titles",
            ThumbnailKind::Boxarts => "Named_Boxarts",
        }
    }

    /// Maps the wire `imgType` (`named_titles` / `named_boxarts`).
    pub fn from_img_type(img_type: &str) -> Result<Self, ThumbnailError> {
        match img_type {
            "named_titles" => Ok(ThumbnailKind::Titles),
            "named_boxarts" => Ok(ThumbnailKind::Boxarts),
            other => Err(ThumbnailError::UnknownKind(other.to_string())),
        }
    }
}

/// Payload of the `thumbnails` screen (minus the game name).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThumbnailSet {
    pub paths: Vec<String>,
    pub width: String,
    pub height: String,
}

/// URLs of the existing thumbnails for `game` on `console`, plus display size.
pub fn resolve(general: &GeneralConfig, console: &str, game: &str) -> ThumbnailSet {
    let mut set = ThumbnailSet::default();
    let console = console.trim();
    let game = game.trim();
    if !general.enable_thumbnails
        || general.thumbnails_path.is_empty()
        || console.is_empty()
        || game.is_empty()
    {
        return set;
    }

    let root = Path::new(&general.thumbnails_path);
    let url_game = game.replace('&', "_");
    for kind in [ThumbnailKind::Titles, ThumbnailKind::Boxarts] {
        let dir = root.join(console).join(kind.dir_name());
        let exists = [format!("{game}.png"), format!("{url_game}.png")]
            .iter()
            .any(|file| dir.join(file).is_file());
        if exists {
            set.paths
                .push(format!("/thumbnails/{console}/{}/{url_game}.png", kind.dir_name()));
        }
    }

    let (width, height) = parse_size(&general.thumbnail_size);
    set.width = width;
    set.height = height;
    set
}

/// "320x240" → ("320px", "240px"); either side may be empty; "0" or "" = unset.
pub fn parse_size(size: &str) -> (String, String) {
    let size = size.trim();
    if size.is_empty() || size == "0" {
        return (String::new(), String::new());
    }
    let mut parts = size.split('x');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(w), Some(h), None) => (px(w), px(h)),
        _ => (String::new(), String::new()),
    }
}

fn px(side: &str) -> String {
    let side = side.trim();
    if side.is_empty() {
        String::new()
    } else {
        format!("{side}px")
    }
}

/// Splits "data:image/png;base64,AAAA" and decodes the payload.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, ThumbnailError> {
    let (_, payload) = data_url
        .split_once(',')
        .ok_or(ThumbnailError::InvalidDataUrl)?;
    Ok(STANDARD.decode(payload.trim())?)
}

// ── Staging ───────────────────────────────────────────────────────────────────

/// Images uploaded with `saveFile`, waiting for the next `saveProcess`.
pub struct StagedThumbnails {
    root: PathBuf,
    titles: Option<PathBuf>,
    boxarts: Option<PathBuf>,
}

/// Relative thumbnail paths recorded on a newly registered template.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CommittedThumbnails {
    pub named_titles: String,
    pub named_boxarts: String,
}

impl StagedThumbnails {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            titles: None,
            boxarts: None,
        }
    }

    /// Default staging root under the OS temp directory.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join("trackgame"))
    }

    fn slot(&mut self, kind: ThumbnailKind) -> &mut Option<PathBuf> {
        match kind {
            ThumbnailKind::Titles => &mut self.titles,
            ThumbnailKind::Boxarts => &mut self.boxarts,
        }
    }

    /// Writes the decoded image to `<root>/<kind>/<name>.png` and remembers it.
    pub fn stage(
        &mut self,
        kind: ThumbnailKind,
        name: &str,
        data_url: &str,
    ) -> Result<PathBuf, ThumbnailError> {
        let file_name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty() && *n == name)
            .ok_or_else(|| ThumbnailError::InvalidName(name.to_string()))?;
        let bytes = decode_data_url(data_url)?;

        let dir = self.root.join(kind.dir_name().to_lowercase());
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{file_name}.png"));
        std::fs::write(&path, bytes)?;
        tracing::debug!("Staged {:?} thumbnail at {}", kind, path.display());
        *self.slot(kind) = Some(path.clone());
        Ok(path)
    }

    /// Copies staged images into `<thumbnails_path>/<system>/<kind>/` and clears
    /// the stage. Returns the paths relative to `thumbnails_path`.
    pub fn commit(
        &mut self,
        thumbnails_path: &str,
        system: &str,
    ) -> Result<CommittedThumbnails, ThumbnailError> {
        let mut committed = CommittedThumbnails::default();
        for kind in [ThumbnailKind::Titles, ThumbnailKind::Boxarts] {
            let Some(staged) = self.slot(kind).take() else {
                continue;
            };
            if thumbnails_path.trim().is_empty() {
                tracing::warn!("thumbnails_path is not set; dropping staged {:?} image", kind);
                let _ = std::fs::remove_file(&staged);
                continue;
            }
            let Some(file_name) = staged.file_name().map(|n| n.to_os_string()) else {
                continue;
            };
            let dest_dir = Path::new(thumbnails_path).join(system).join(kind.dir_name());
            std::fs::create_dir_all(&dest_dir)?;
            std::fs::copy(&staged, dest_dir.join(&file_name))?;
            let _ = std::fs::remove_file(&staged);

            let relative = format!(
                "{system}\\{}\\{}",
                kind.dir_name(),
                file_name.to_string_lossy()
            );
            match kind {
                ThumbnailKind::Titles => committed.named_titles = relative,
                ThumbnailKind::Boxarts => committed.named_boxarts = relative,
            }
        }
        Ok(committed)
    }
}
