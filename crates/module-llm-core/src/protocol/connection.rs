//! Connection management
//!
//! Sends commands through a [`Transport`] and correlates the module's replies
//! to them by request id. There are two ways to wait:
//!
//! - **Fixed wait** ([`Connection::send_and_wait`]): one reply is expected. The
//!   deadline is absolute, measured from the send. The first message carrying
//!   the request id resolves the wait; nothing after it is looked at.
//! - **Streaming wait** ([`Connection::send_and_stream`]): the reply arrives as
//!   a sequence of fragments ending with `finish: true`. The timeout is an idle
//!   window that restarts on every fragment, so a long answer that keeps
//!   flowing never times out, while a stall of more than the window does.
//!
//! Both loops run on the calling thread. Each iteration pumps the transport,
//! checks for matching messages, then compares elapsed time against the
//! [`Clock`]. There is no cancellation besides the timeout.

use std::time::Duration;

use super::commands::{Command, ResponseFragment, ResponseMessage};
use super::transport::{Clock, SystemClock, Transport};
use super::{ProtocolError, DEFAULT_POLL_INTERVAL_MS};

/// Polling behaviour of the wait loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    /// Pause between two polls of the transport
    pub poll_interval: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Outcome of a finished streaming wait
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Number of fragments delivered to the callback
    pub fragments: usize,
    /// Index reported by the finishing fragment
    pub final_index: i64,
    /// Total time from start of the wait to the finish marker
    pub elapsed_ms: u64,
}

/// Correlates commands and replies over a single transport
pub struct Connection<T, C = SystemClock> {
    transport: T,
    clock: C,
    settings: WaitSettings,
    commands_sent: u64,
    timeouts: u64,
}

impl<T: Transport> Connection<T, SystemClock> {
    /// Create a connection using the wall clock
    pub fn new(transport: T) -> Self {
        Self::with_clock(transport, SystemClock::new(), WaitSettings::default())
    }
}

impl<T: Transport, C: Clock> Connection<T, C> {
    /// Create a connection with an explicit clock and polling settings
    pub fn with_clock(transport: T, clock: C, settings: WaitSettings) -> Self {
        Self {
            transport,
            clock,
            settings,
            commands_sent: 0,
            timeouts: 0,
        }
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give back the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Clock driving the waits
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Current polling settings
    pub fn settings(&self) -> WaitSettings {
        self.settings
    }

    /// Change the pause between polls
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.settings.poll_interval = interval;
    }

    /// Commands sent and waits that ended in a timeout
    pub fn get_counters(&self) -> (u64, u64) {
        (self.commands_sent, self.timeouts)
    }

    /// Send a command without waiting for anything
    pub fn send_command(&mut self, command: &Command) -> Result<(), ProtocolError> {
        let text = command.to_json()?;
        tracing::debug!(
            request_id = %command.request_id,
            work_id = %command.work_id,
            action = %command.action,
            "sending command"
        );
        self.transport.send_text(&text)?;
        self.commands_sent = self.commands_sent.saturating_add(1);
        Ok(())
    }

    /// Send a binary inference header immediately followed by its raw block
    ///
    /// The header must declare exactly `bytes.len()`; nothing else is sent
    /// between the two.
    pub fn send_raw_transfer(
        &mut self,
        header: &Command,
        bytes: &[u8],
    ) -> Result<(), ProtocolError> {
        if header.raw_len != Some(bytes.len()) {
            return Err(ProtocolError::RawLengthMismatch {
                declared: header.raw_len.unwrap_or(0),
                actual: bytes.len(),
            });
        }
        self.send_command(header)?;
        tracing::debug!(request_id = %header.request_id, "sending {} raw bytes", bytes.len());
        self.transport.send_raw(bytes)
    }

    /// Send a command and wait for its single reply
    pub fn send_and_wait(
        &mut self,
        command: &Command,
        timeout: Duration,
    ) -> Result<ResponseMessage, ProtocolError> {
        self.send_command(command)?;
        self.wait_for_reply(&command.request_id, timeout)
    }

    /// Wait for the first message tagged with `request_id`, up to an absolute deadline
    pub fn wait_for_reply(
        &mut self,
        request_id: &str,
        timeout: Duration,
    ) -> Result<ResponseMessage, ProtocolError> {
        let timeout_ms = timeout.as_millis() as u64;
        let start = self.clock.now_ms();

        loop {
            self.transport.pump()?;
            if let Some(msg) = self.transport.take_message(request_id) {
                tracing::debug!(
                    request_id,
                    work_id = %msg.work_id,
                    "reply after {}ms",
                    self.clock.now_ms().saturating_sub(start)
                );
                return Ok(msg);
            }

            let elapsed = self.clock.now_ms().saturating_sub(start);
            if elapsed > timeout_ms {
                return Err(self.timed_out(request_id, elapsed));
            }
            self.clock.pause(self.settings.poll_interval);
        }
    }

    /// Send a command and deliver its streamed reply to `on_fragment`
    pub fn send_and_stream<F>(
        &mut self,
        command: &Command,
        idle_timeout: Duration,
        on_fragment: F,
    ) -> Result<StreamSummary, ProtocolError>
    where
        F: FnMut(&str),
    {
        self.send_command(command)?;
        self.stream_until_finish(&command.request_id, idle_timeout, on_fragment)
    }

    /// Raw-transfer variant of [`send_and_stream`](Self::send_and_stream)
    pub fn send_raw_and_stream<F>(
        &mut self,
        header: &Command,
        bytes: &[u8],
        idle_timeout: Duration,
        on_fragment: F,
    ) -> Result<StreamSummary, ProtocolError>
    where
        F: FnMut(&str),
    {
        self.send_raw_transfer(header, bytes)?;
        self.stream_until_finish(&header.request_id, idle_timeout, on_fragment)
    }

    /// Accumulate fragments for `request_id` until one carries `finish: true`
    ///
    /// Each fragment's delta is passed to `on_fragment`; the finishing one gets
    /// a trailing newline. Every fragment restarts the idle window.
    pub fn stream_until_finish<F>(
        &mut self,
        request_id: &str,
        idle_timeout: Duration,
        mut on_fragment: F,
    ) -> Result<StreamSummary, ProtocolError>
    where
        F: FnMut(&str),
    {
        let idle_ms = idle_timeout.as_millis() as u64;
        let start = self.clock.now_ms();
        let mut last_activity = start;
        let mut fragments = 0usize;

        loop {
            self.transport.pump()?;
            while let Some(msg) = self.transport.take_message(request_id) {
                let fragment = ResponseFragment::from_message(&msg);
                let mut text = fragment.delta;
                if fragment.finish {
                    text.push('\n');
                }
                on_fragment(&text);
                fragments += 1;
                last_activity = self.clock.now_ms();

                if fragment.finish {
                    let elapsed_ms = last_activity.saturating_sub(start);
                    tracing::debug!(
                        request_id,
                        "stream finished after {} fragments in {}ms",
                        fragments,
                        elapsed_ms
                    );
                    return Ok(StreamSummary {
                        fragments,
                        final_index: fragment.index,
                        elapsed_ms,
                    });
                }
            }

            let now = self.clock.now_ms();
            if now.saturating_sub(last_activity) > idle_ms {
                tracing::debug!(request_id, "stream idle after {} fragments", fragments);
                return Err(self.timed_out(request_id, now.saturating_sub(start)));
            }
            self.clock.pause(self.settings.poll_interval);
        }
    }

    fn timed_out(&mut self, request_id: &str, elapsed_ms: u64) -> ProtocolError {
        self.timeouts = self.timeouts.saturating_add(1);
        tracing::warn!(request_id, "no response within {}ms", elapsed_ms);
        ProtocolError::Timeout {
            request_id: request_id.to_string(),
            elapsed_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::transport::ManualClock;
    use crate::protocol::Action;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Releases queued messages one per pump
    #[derive(Default)]
    struct QueueTransport {
        sent: Vec<String>,
        raw: Vec<Vec<u8>>,
        pending: VecDeque<ResponseMessage>,
        ready: Vec<ResponseMessage>,
    }

    impl QueueTransport {
        fn reply(&mut self, value: serde_json::Value) {
            self.pending
                .push_back(ResponseMessage::from_value(value).unwrap());
        }
    }

    impl Transport for QueueTransport {
        fn send_text(&mut self, text: &str) -> Result<(), ProtocolError> {
            self.sent.push(text.to_string());
            Ok(())
        }

        fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
            self.raw.push(bytes.to_vec());
            Ok(())
        }

        fn pump(&mut self) -> Result<(), ProtocolError> {
            if let Some(msg) = self.pending.pop_front() {
                self.ready.push(msg);
            }
            Ok(())
        }

        fn take_message(&mut self, request_id: &str) -> Option<ResponseMessage> {
            let pos = self.ready.iter().position(|m| m.request_id == request_id)?;
            Some(self.ready.remove(pos))
        }
    }

    fn connection(transport: QueueTransport) -> Connection<QueueTransport, ManualClock> {
        Connection::with_clock(transport, ManualClock::new(), WaitSettings::default())
    }

    #[test]
    fn test_fixed_wait_ignores_other_request_ids() {
        let mut transport = QueueTransport::default();
        transport.reply(json!({"request_id": "other", "work_id": "x"}));
        transport.reply(json!({"request_id": "llm_setup", "work_id": "llm.1000"}));
        transport.reply(json!({"request_id": "llm_setup", "work_id": "llm.1001"}));
        let mut conn = connection(transport);

        let cmd = Command::new("llm_setup", "llm", Action::Setup);
        let msg = conn.send_and_wait(&cmd, Duration::from_millis(100)).unwrap();
        assert_eq!(msg.work_id, "llm.1000");
        assert_eq!(conn.transport().sent.len(), 1);
        // The other reply is still buffered for its own waiter
        assert!(conn.transport_mut().take_message("other").is_some());
    }

    #[test]
    fn test_raw_transfer_length_checked() {
        let mut conn = connection(QueueTransport::default());
        let header = Command::new("r", "vlm.1000", Action::Inference).with_raw_len(4);
        let err = conn.send_raw_transfer(&header, &[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::RawLengthMismatch { declared: 4, actual: 3 }
        ));
        assert!(conn.transport().sent.is_empty());

        conn.send_raw_transfer(&header, &[1, 2, 3, 4]).unwrap();
        assert_eq!(conn.transport().sent.len(), 1);
        assert_eq!(conn.transport().raw, vec![vec![1, 2, 3, 4]]);
    }

    #[test]
    fn test_stream_drains_buffered_fragments_in_order() {
        let mut transport = QueueTransport::default();
        for (index, delta) in ["a", "b", "c"].into_iter().enumerate() {
            transport.reply(json!({
                "request_id": "s",
                "data": {"delta": delta, "finish": index == 2, "index": index},
            }));
        }
        let mut conn = connection(transport);

        let mut seen = Vec::new();
        let summary = conn
            .stream_until_finish("s", Duration::from_millis(50), |d| seen.push(d.to_string()))
            .unwrap();
        assert_eq!(seen, vec!["a", "b", "c\n"]);
        assert_eq!(summary.fragments, 3);
        assert_eq!(summary.final_index, 2);
    }

    #[test]
    fn test_timeouts_counted() {
        let mut conn = connection(QueueTransport::default());
        assert!(conn
            .wait_for_reply("missing", Duration::from_millis(5))
            .unwrap_err()
            .is_timeout());
        assert_eq!(conn.get_counters(), (0, 1));
    }
}
