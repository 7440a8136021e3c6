//! Demo Mode - Simulated module for testing without hardware
//!
//! [`DemoModule`] is a [`Transport`] that answers commands the way a module
//! would: setup hands out `<unit>.<n>` work ids, text inference streams the
//! input back in random-sized pieces, and a JPEG sent to `depth_anything` is
//! returned as a base64 stream. Replies go through the same line parser as a
//! real port and are released one per pump, so streaming waits see several
//! polls per answer.

use std::collections::{HashMap, VecDeque};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use crate::protocol::{
    Action, Capability, Command, MessageQueue, ProtocolError, ProtocolVersion, ResponseMessage,
    Transport,
};

/// First work id number handed out by setup
const FIRST_WORK_ID: u32 = 1000;

/// Error code for a command addressed to a unit that was never set up
pub const ERR_UNKNOWN_WORK_ID: i64 = -6;

/// Error code for a setup naming a unit the module does not host
pub const ERR_UNKNOWN_UNIT: i64 = -9;

/// Error code for a raw block that does not match its header
pub const ERR_RAW_LENGTH: i64 = -4;

/// Simulated module
pub struct DemoModule {
    version: ProtocolVersion,
    rng: StdRng,
    next_work_id: u32,
    /// Live units by work id
    units: HashMap<String, Capability>,
    /// Serialized replies not yet delivered
    outbox: VecDeque<String>,
    queue: MessageQueue,
    /// Header of a raw transfer waiting for its bytes
    pending_raw: Option<Command>,
    received: Vec<Command>,
    raw_bytes_received: usize,
    silent: bool,
}

impl Default for DemoModule {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoModule {
    /// Create a demo module reporting protocol `v1.0`
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Create a demo module with reproducible chunking
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            version: ProtocolVersion::default(),
            rng,
            next_work_id: FIRST_WORK_ID,
            units: HashMap::new(),
            outbox: VecDeque::new(),
            queue: MessageQueue::new(),
            pending_raw: None,
            received: Vec::new(),
            raw_bytes_received: 0,
            silent: false,
        }
    }

    /// Firmware version reported to `sys.version`
    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Accept commands but never answer
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Every command received so far, in order
    pub fn received_commands(&self) -> &[Command] {
        &self.received
    }

    /// Most recent command received
    pub fn last_command(&self) -> Option<&Command> {
        self.received.last()
    }

    /// Total bytes received in raw blocks
    pub fn raw_bytes_received(&self) -> usize {
        self.raw_bytes_received
    }

    /// Work ids of units currently set up
    pub fn active_units(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.units.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Replies produced but not yet pumped
    pub fn pending_replies(&self) -> usize {
        self.outbox.len()
    }

    fn handle(&mut self, command: &Command) {
        match command.action {
            Action::Setup => self.handle_setup(command),
            Action::Exit => self.handle_exit(command),
            Action::Inference => self.handle_text_inference(command),
            Action::Ping => self.reply_ok(command, &command.work_id, Value::from("None")),
            Action::Version => {
                let version = self.version.to_string();
                self.reply_ok(command, &command.work_id, Value::from(version));
            }
            Action::Reset => {
                self.units.clear();
                self.reply_ok(command, &command.work_id, Value::from("None"));
            }
        }
    }

    fn handle_setup(&mut self, command: &Command) {
        let Some(capability) = capability_for_unit(&command.work_id) else {
            self.reply_error(command, ERR_UNKNOWN_UNIT, "unit call false");
            return;
        };
        let work_id = format!("{}.{}", capability.unit_name(), self.next_work_id);
        self.next_work_id += 1;
        tracing::debug!("demo: {} set up as {}", capability.unit_name(), work_id);
        self.units.insert(work_id.clone(), capability);
        self.reply_ok(command, &work_id, Value::from("None"));
    }

    fn handle_exit(&mut self, command: &Command) {
        if self.units.remove(&command.work_id).is_some() {
            self.reply_ok(command, &command.work_id, Value::from("None"));
        } else {
            self.reply_error(command, ERR_UNKNOWN_WORK_ID, "unit does not exist");
        }
    }

    fn handle_text_inference(&mut self, command: &Command) {
        let Some(&capability) = self.units.get(&command.work_id) else {
            self.reply_error(command, ERR_UNKNOWN_WORK_ID, "unit does not exist");
            return;
        };
        let input = command
            .data_field("delta")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let object = format!("{}.utf-8.stream", capability.unit_name());
        self.stream_text(command, &object, &input);
    }

    fn handle_raw_inference(&mut self, header: &Command, bytes: &[u8]) {
        let Some(&capability) = self.units.get(&header.work_id) else {
            self.reply_error(header, ERR_UNKNOWN_WORK_ID, "unit does not exist");
            return;
        };
        if header.raw_len != Some(bytes.len()) {
            self.reply_error(header, ERR_RAW_LENGTH, "raw length mismatch");
            return;
        }
        match capability {
            Capability::DepthAnything => {
                let encoded = STANDARD.encode(bytes);
                self.stream_text(header, "jpeg.base64.stream", &encoded);
            }
            _ => {
                let object = format!("{}.utf-8.stream", capability.unit_name());
                let text = format!("image of {} bytes", bytes.len());
                self.stream_text(header, &object, &text);
            }
        }
    }

    /// Queue `text` as fragments of 1 to 4 characters, then an empty finishing fragment
    fn stream_text(&mut self, command: &Command, object: &str, text: &str) {
        let chars: Vec<char> = text.chars().collect();
        let mut index = 0i64;
        let mut pos = 0;
        while pos < chars.len() {
            let take = self.rng.gen_range(1..=4).min(chars.len() - pos);
            let delta: String = chars[pos..pos + take].iter().collect();
            pos += take;
            self.push_reply(json!({
                "request_id": command.request_id,
                "work_id": command.work_id,
                "object": object,
                "data": {"delta": delta, "index": index, "finish": false},
                "error": {"code": 0, "message": ""},
            }));
            index += 1;
        }
        self.push_reply(json!({
            "request_id": command.request_id,
            "work_id": command.work_id,
            "object": object,
            "data": {"delta": "", "index": index, "finish": true},
            "error": {"code": 0, "message": ""},
        }));
    }

    fn reply_ok(&mut self, command: &Command, work_id: &str, data: Value) {
        self.push_reply(json!({
            "request_id": command.request_id,
            "work_id": work_id,
            "object": "None",
            "data": data,
            "error": {"code": 0, "message": ""},
        }));
    }

    fn reply_error(&mut self, command: &Command, code: i64, message: &str) {
        tracing::debug!("demo: {} -> error {} {}", command.request_id, code, message);
        self.push_reply(json!({
            "request_id": command.request_id,
            "work_id": command.work_id,
            "object": "None",
            "data": "None",
            "error": {"code": code, "message": message},
        }));
    }

    fn push_reply(&mut self, reply: Value) {
        if !self.silent {
            self.outbox.push_back(reply.to_string());
        }
    }
}

fn capability_for_unit(unit: &str) -> Option<Capability> {
    [
        Capability::Sys,
        Capability::Camera,
        Capability::Kws,
        Capability::Llm,
        Capability::Vlm,
        Capability::DepthAnything,
    ]
    .into_iter()
    .find(|c| c.unit_name() == unit)
}

impl Transport for DemoModule {
    fn send_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        let command: Command = serde_json::from_str(text)?;
        self.received.push(command.clone());
        if command.raw_len.is_some() {
            self.pending_raw = Some(command);
        } else {
            self.handle(&command);
        }
        Ok(())
    }

    fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.raw_bytes_received += bytes.len();
        match self.pending_raw.take() {
            Some(header) => self.handle_raw_inference(&header, bytes),
            None => tracing::warn!("demo: {} raw bytes without a header", bytes.len()),
        }
        Ok(())
    }

    fn pump(&mut self) -> Result<(), ProtocolError> {
        if let Some(line) = self.outbox.pop_front() {
            let mut bytes = line.into_bytes();
            bytes.push(b'\n');
            self.queue.push_bytes(&bytes);
        }
        Ok(())
    }

    fn take_message(&mut self, request_id: &str) -> Option<ResponseMessage> {
        self.queue.take(request_id)
    }
}
