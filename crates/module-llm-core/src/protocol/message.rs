//! Incoming message buffering
//!
//! The module writes one JSON object per line. [`MessageQueue`] collects raw
//! bytes as they arrive, cuts them into lines, parses each line and keeps the
//! parsed messages until a waiter takes the one carrying its request id.

use std::collections::VecDeque;

use super::commands::ResponseMessage;
use super::{ProtocolError, MAX_BUFFERED_MESSAGES, MAX_MESSAGE_SIZE};

/// Line splitter and request-id keyed message buffer
#[derive(Debug, Default)]
pub struct MessageQueue {
    /// Bytes of the line currently being received
    partial: Vec<u8>,
    /// Parsed messages, oldest first
    messages: VecDeque<ResponseMessage>,
    /// Set while skipping the rest of an oversized line
    discarding: bool,
    /// Oversized lines dropped so far
    overflows: usize,
}

impl MessageQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines dropped for exceeding the message size limit
    pub fn overflows(&self) -> usize {
        self.overflows
    }

    /// Feed received bytes; returns how many complete messages were parsed
    pub fn push_bytes(&mut self, bytes: &[u8]) -> usize {
        let mut parsed = 0;
        for &byte in bytes {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else if self.finish_line() {
                    parsed += 1;
                }
                self.partial.clear();
                continue;
            }
            if self.discarding {
                continue;
            }
            if self.partial.len() >= MAX_MESSAGE_SIZE {
                tracing::warn!("{}, discarding", ProtocolError::BufferOverflow(MAX_MESSAGE_SIZE));
                self.overflows += 1;
                self.partial.clear();
                self.discarding = true;
                continue;
            }
            self.partial.push(byte);
        }
        parsed
    }

    fn finish_line(&mut self) -> bool {
        let line = String::from_utf8_lossy(&self.partial).trim().to_string();
        if line.is_empty() {
            return false;
        }

        let value = match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("dropping unparseable line ({}): {:?}", e, line);
                return false;
            }
        };
        match ResponseMessage::from_value(value) {
            Some(msg) => {
                tracing::trace!(
                    request_id = %msg.request_id,
                    work_id = %msg.work_id,
                    "buffered message"
                );
                self.push_message(msg);
                true
            }
            None => {
                tracing::warn!("dropping non-object message: {:?}", line);
                false
            }
        }
    }

    /// Buffer an already parsed message
    pub fn push_message(&mut self, msg: ResponseMessage) {
        if self.messages.len() >= MAX_BUFFERED_MESSAGES {
            if let Some(evicted) = self.messages.pop_front() {
                tracing::warn!(
                    request_id = %evicted.request_id,
                    "message buffer full, evicting oldest message"
                );
            }
        }
        self.messages.push_back(msg);
    }

    /// Remove and return the oldest message tagged with `request_id`
    pub fn take(&mut self, request_id: &str) -> Option<ResponseMessage> {
        let pos = self
            .messages
            .iter()
            .position(|m| m.request_id == request_id)?;
        self.messages.remove(pos)
    }

    /// Number of buffered messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop all buffered messages and any partial line
    pub fn clear(&mut self) {
        self.messages.clear();
        self.partial.clear();
        self.discarding = false;
    }
}
