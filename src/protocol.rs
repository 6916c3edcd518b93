//! # Websocket Control Objects
//!
//! Text frames between Operator and Agent carry these as JSON; binary
//! frames are opaque payloads and never touch this module — they are
//! relayed verbatim by the handlers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error codes carried on a [`CommandError`] frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CommandErrorCode {
    PermissionDenied = 0x0A,
    InvalidArguments = 0x0B,
    InternalError = 0x0C,
    InvalidCommand = 0x0D,
}

impl CommandErrorCode {
    pub fn message(self) -> &'static str {
        match self {
            CommandErrorCode::PermissionDenied => "Permission denied",
            CommandErrorCode::InvalidArguments => "Invalid arguments",
            CommandErrorCode::InternalError => "Internal error",
            CommandErrorCode::InvalidCommand => "Invalid command",
        }
    }
}

/// Server → Operator command error, sent inline over the Operator's own
/// socket; the connection stays open afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct CommandError {
    pub cmd_response: String,
    pub error_code: u32,
    pub error_msg: String,
}

impl CommandError {
    pub fn new(cmd: &str, code: CommandErrorCode) -> Self {
        Self {
            cmd_response: cmd.to_string(),
            error_code: code as u32,
            error_msg: code.message().to_string(),
        }
    }
}

pub const INFO_CODE_USER_DISCONNECTED: u32 = 0x00;
pub const INFO_CODE_USER_CONNECTED: u32 = 0xFC;

/// Server → Agent info frame.
#[derive(Debug, Clone, Serialize)]
pub struct InfoFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl InfoFrame {
    pub fn user_connected(username: &str) -> Self {
        Self {
            kind: "info",
            code: INFO_CODE_USER_CONNECTED,
            data: Some(username.to_string()),
            msg: None,
        }
    }

    pub fn user_disconnected() -> Self {
        Self {
            kind: "info",
            code: INFO_CODE_USER_DISCONNECTED,
            data: None,
            msg: Some("User disconnected!".to_string()),
        }
    }
}

/// A decoded Operator→Server text frame, before the `type` field decides
/// how it is handled. `fields` keeps the whole object so a passthrough
/// frame (no `type`, or a `type` other than `command`) can be forwarded
/// unmodified.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub fields: Value,
}

/// The shape a `{type:"command", ...}` frame must have to be eligible for
/// relay. A missing or mistyped `cmd`/`args` is a validation failure, not a
/// permission failure — it earns `InvalidArguments`, not `PermissionDenied`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandFrame {
    pub cmd: String,
    pub args: Vec<Value>,
}

/// Attempts to pull a [`CommandFrame`] out of an already-parsed frame's raw
/// JSON body. Returns `None` on a missing/mistyped `cmd` or `args`.
pub fn parse_command_frame(fields: &Value) -> Option<CommandFrame> {
    let cmd = fields.get("cmd")?.as_str()?.to_string();
    let args = fields.get("args")?.as_array()?.clone();
    Some(CommandFrame { cmd, args })
}

/// Rebuilds the JSON object for a command frame with sanitized `args`,
/// preserving any other fields the Operator sent.
pub fn rebuild_command_object(fields: &Value, cmd: &str, args: Vec<Value>) -> Value {
    let mut obj = fields.as_object().cloned().unwrap_or_default();
    obj.insert("type".to_string(), Value::String("command".to_string()));
    obj.insert("cmd".to_string(), Value::String(cmd.to_string()));
    obj.insert("args".to_string(), Value::Array(args));
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_frame_without_type_deserializes() {
        let raw: RawFrame = serde_json::from_value(json!({"foo": "bar"})).unwrap();
        assert!(raw.kind.is_none());
    }

    #[test]
    fn parse_command_frame_rejects_missing_args() {
        let body = json!({"type": "command", "cmd": "ls_dir"});
        assert!(parse_command_frame(&body).is_none());
    }

    #[test]
    fn parse_command_frame_rejects_non_string_cmd() {
        let body = json!({"type": "command", "cmd": 5, "args": []});
        assert!(parse_command_frame(&body).is_none());
    }

    #[test]
    fn rebuild_command_object_replaces_args() {
        let body = json!({"type": "command", "cmd": "ls_dir", "args": ["../etc"], "id": 7});
        let rebuilt = rebuild_command_object(&body, "ls_dir", vec![json!("etc")]);
        assert_eq!(rebuilt["args"], json!(["etc"]));
        assert_eq!(rebuilt["id"], json!(7));
    }
}
