/// Wire messages of the live-update websocket (JSON text frames).
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Screen that every query reply and refresh hint is addressed to.
pub const SETTINGS_SCREEN: &str = "settings-games";

// ── Server → client ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outgoing {
    #[serde(rename = "type")]
    pub kind: String,
    pub screen: String,
    pub payload: Value,
}

impl Outgoing {
    /// Broadcast notification of a new canonical state.
    pub fn update(screen: &str, payload: Value) -> Self {
        Self {
            kind: "update".into(),
            screen: screen.into(),
            payload,
        }
    }

    /// Direct reply to a `get_data` query; `kind` echoes the requested dataType.
    pub fn reply(kind: &str, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            screen: SETTINGS_SCREEN.into(),
            payload,
        }
    }

    /// Hint that the settings screen should re-pull after a mutation.
    pub fn refresh() -> Self {
        Self {
            kind: "refresh".into(),
            screen: SETTINGS_SCREEN.into(),
            payload: Value::Bool(true),
        }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ── Client → server ───────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum Inbound {
    #[serde(rename = "register")]
    Register {
        #[serde(default)]
        screen: String,
    },
    #[serde(rename = "get_data")]
    GetData(DataQuery),
    #[serde(rename = "saveData")]
    SaveData(SaveRequest),
    #[serde(rename = "delete")]
    Delete(DeleteRequest),
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "dataType")]
pub enum DataQuery {
    #[serde(rename = "gameTemplates")]
    GameTemplates,
    #[serde(rename = "processes")]
    Processes,
    #[serde(rename = "infoProcess")]
    InfoProcess {
        #[serde(default)]
        pid: Option<PidArg>,
    },
}

impl DataQuery {
    /// The `type` echoed back in the reply.
    pub fn kind(&self) -> &'static str {
        match self {
            DataQuery::GameTemplates => "gameTemplates",
            DataQuery::Processes => "processes",
            DataQuery::InfoProcess { .. } => "infoProcess",
        }
    }
}

/// Browsers send the pid either as a number or as the string from a form field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PidArg {
    Number(u32),
    Text(String),
}

impl PidArg {
    pub fn as_pid(&self) -> Option<u32> {
        match self {
            PidArg::Number(n) => Some(*n),
            PidArg::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "dataType")]
pub enum SaveRequest {
    #[serde(rename = "saveFile")]
    SaveFile {
        #[serde(rename = "fileData")]
        file_data: String,
        name: String,
        #[serde(rename = "imgType")]
        img_type: String,
    },
    #[serde(rename = "saveProcess")]
    SaveProcess {
        #[serde(rename = "dataForm")]
        data_form: ProcessForm,
    },
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct ProcessForm {
    pub process_name_display: String,
    #[serde(default)]
    pub window_title: String,
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "dataType")]
pub enum DeleteRequest {
    #[serde(rename = "deleteGameTemplate")]
    GameTemplate {
        #[serde(rename = "processName")]
        process_name: String,
    },
}

pub fn parse_inbound(text: &str) -> serde_json::Result<Inbound> {
    serde_json::from_str(text)
}
