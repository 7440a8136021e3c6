//! Protocol commands
//!
//! Wire types for the JSON control messages exchanged with the module.
//!
//! Outgoing commands look like
//! `{"request_id":"llm_setup","work_id":"llm","action":"setup","object":"llm.setup","data":{...}}`.
//! A binary inference header additionally carries a top-level `RAW` byte
//! count, and the raw block follows it on the transport.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::ProtocolError;

/// Actions understood by the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Load a capability unit and get its work id
    Setup,
    /// Release a capability unit
    Exit,
    /// Push input to a running unit
    Inference,
    /// Liveness check on the `sys` unit
    Ping,
    /// Query the firmware protocol version
    Version,
    /// Reset all units
    Reset,
}

impl Action {
    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Setup => "setup",
            Action::Exit => "exit",
            Action::Inference => "inference",
            Action::Ping => "ping",
            Action::Version => "version",
            Action::Reset => "reset",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability units hosted by the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Module housekeeping
    Sys,
    /// Camera capture
    Camera,
    /// Keyword spotting
    Kws,
    /// Language model
    Llm,
    /// Vision-language model
    Vlm,
    /// Monocular depth estimation
    DepthAnything,
}

impl Capability {
    /// Well-known unit name, used as work id before setup completes
    pub fn unit_name(&self) -> &'static str {
        match self {
            Capability::Sys => "sys",
            Capability::Camera => "camera",
            Capability::Kws => "kws",
            Capability::Llm => "llm",
            Capability::Vlm => "vlm",
            Capability::DepthAnything => "depth_anything",
        }
    }

    /// Object tag sent with a setup command
    pub fn setup_object(&self) -> String {
        format!("{}.setup", self.unit_name())
    }

    /// Default request id for `action` on this unit, e.g. `llm_setup`
    pub fn default_request_id(&self, action: Action) -> String {
        format!("{}_{}", self.unit_name(), action)
    }
}

/// Object tag for a binary (JPEG) inference transfer
pub const RAW_JPEG_OBJECT: &str = "cv.jpeg.base64";

/// A command sent to the module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Byte count of the raw block that follows this header
    #[serde(rename = "RAW", default, skip_serializing_if = "Option::is_none")]
    pub raw_len: Option<usize>,
    /// Caller-chosen tag echoed by every reply
    pub request_id: String,
    /// Unit name before setup, assigned work id afterwards
    pub work_id: String,
    /// What to do
    pub action: Action,
    /// Payload kind, e.g. `llm.setup` or `llm.utf-8.stream`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    /// Payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Command {
    /// Create a bare command with no object or data
    pub fn new(
        request_id: impl Into<String>,
        work_id: impl Into<String>,
        action: Action,
    ) -> Self {
        Self {
            raw_len: None,
            request_id: request_id.into(),
            work_id: work_id.into(),
            action,
            object: None,
            data: None,
        }
    }

    /// Set the object tag
    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    /// Set the data object
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(Value::Object(data));
        self
    }

    /// Declare a raw block of `len` bytes following this header
    pub fn with_raw_len(mut self, len: usize) -> Self {
        self.raw_len = Some(len);
        self
    }

    /// Field of the `data` object, if any
    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }

    /// Serialize to the JSON text written on the transport
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Status object attached to module replies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStatus {
    /// Zero on success
    #[serde(default)]
    pub code: i64,
    /// Human readable detail
    #[serde(default)]
    pub message: String,
}

impl ModuleStatus {
    /// True for a zero code
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// A parsed message received from the module
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    /// Request id the reply answers
    pub request_id: String,
    /// Work id of the replying unit
    pub work_id: String,
    /// Status object, when present
    pub error: Option<ModuleStatus>,
    /// The complete message object
    pub raw: Value,
}

impl ResponseMessage {
    /// Build from a decoded JSON object; returns `None` for non-objects
    pub fn from_value(raw: Value) -> Option<Self> {
        let obj = raw.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let request_id = text("request_id");
        let work_id = text("work_id");
        let error = obj
            .get("error")
            .and_then(|e| serde_json::from_value::<ModuleStatus>(e.clone()).ok());
        Some(Self {
            request_id,
            work_id,
            error,
            raw,
        })
    }

    /// The `data` field
    pub fn data(&self) -> Option<&Value> {
        self.raw.get("data")
    }

    /// The `object` field
    pub fn object(&self) -> Option<&str> {
        self.raw.get("object").and_then(Value::as_str)
    }

    /// Non-zero error status carried by the reply, if any
    pub fn module_error(&self) -> Option<&ModuleStatus> {
        self.error.as_ref().filter(|e| !e.is_ok())
    }

    /// Turn a reply carrying a non-zero error status into [`ProtocolError::ModuleError`]
    pub fn into_result(self) -> Result<Self, ProtocolError> {
        if let Some(status) = self.module_error() {
            return Err(ProtocolError::ModuleError {
                code: status.code,
                message: status.message.clone(),
            });
        }
        Ok(self)
    }
}

/// One chunk of a streamed reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseFragment {
    /// Work id of the streaming unit
    pub work_id: String,
    /// Request id the fragment answers
    pub request_id: String,
    /// Text carried by this fragment
    pub delta: String,
    /// Set on the last fragment
    pub finish: bool,
    /// Position within the stream
    pub index: i64,
}

impl ResponseFragment {
    /// Extract the streaming fields from `data`
    ///
    /// Non-string deltas (e.g. `kws.bool`) are rendered as JSON text; a missing
    /// or non-boolean `finish` counts as not finished.
    pub fn from_message(msg: &ResponseMessage) -> Self {
        let data = msg.data();
        let delta = match data {
            Some(Value::String(s)) => s.clone(),
            Some(d) => match d.get("delta") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            },
            None => String::new(),
        };
        let finish = data
            .and_then(|d| d.get("finish"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let index = data
            .and_then(|d| d.get("index"))
            .and_then(Value::as_i64)
            .unwrap_or(0);

        Self {
            work_id: msg.work_id.clone(),
            request_id: msg.request_id.clone(),
            delta,
            finish,
            index,
        }
    }
}
