//! Transport and clock seams
//!
//! [`Connection`](super::Connection) never touches a port directly. It drives a
//! [`Transport`], which queues outgoing bytes, parses incoming ones into
//! messages when pumped, and hands out buffered messages by request id. Time
//! comes from a [`Clock`] so waits can be simulated in tests.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::commands::ResponseMessage;
use super::message::MessageQueue;
use super::serial::open_port;
use super::stream::{with_default_port, CommunicationChannel, SerialChannel, TcpChannel};
use super::ProtocolError;
use crate::config::TransportSettings;

/// Message-level transport consumed by the correlation engine
pub trait Transport {
    /// Queue a JSON command for writing
    fn send_text(&mut self, text: &str) -> Result<(), ProtocolError>;

    /// Queue a raw block, written right after the preceding text
    fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ProtocolError>;

    /// Drive pending reads and parsing; must not block
    fn pump(&mut self) -> Result<(), ProtocolError>;

    /// Remove and return the oldest buffered message tagged with `request_id`
    fn take_message(&mut self, request_id: &str) -> Option<ResponseMessage>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        (**self).send_text(text)
    }

    fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        (**self).send_raw(bytes)
    }

    fn pump(&mut self) -> Result<(), ProtocolError> {
        (**self).pump()
    }

    fn take_message(&mut self, request_id: &str) -> Option<ResponseMessage> {
        (**self).take_message(request_id)
    }
}

/// Monotonic millisecond clock used by the wait loops
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin
    fn now_ms(&self) -> u64;

    /// Idle between two polls
    fn pause(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Clock whose origin is now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn pause(&self, duration: Duration) {
        if duration.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(duration);
        }
    }
}

/// Simulated clock; clones share the same time
///
/// `pause` advances time instead of sleeping, by at least one millisecond so
/// a polling loop always makes progress.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Clock starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn pause(&self, duration: Duration) {
        self.advance((duration.as_millis() as u64).max(1));
    }
}

/// [`Transport`] over a byte channel (serial port or TCP socket)
pub struct ChannelTransport {
    channel: Box<dyn CommunicationChannel>,
    queue: MessageQueue,
    read_buf: Vec<u8>,
    tx_bytes: u64,
    rx_bytes: u64,
    tx_messages: u64,
    rx_messages: u64,
}

impl ChannelTransport {
    /// Transport over an already opened channel
    pub fn new(channel: Box<dyn CommunicationChannel>) -> Self {
        Self {
            channel,
            queue: MessageQueue::new(),
            read_buf: vec![0u8; 4096],
            tx_bytes: 0,
            rx_bytes: 0,
            tx_messages: 0,
            rx_messages: 0,
        }
    }

    /// Open the module's UART
    pub fn open_serial(settings: &TransportSettings) -> Result<Self, ProtocolError> {
        let port = open_port(settings)?;
        Ok(Self::new(Box::new(SerialChannel::new(port))))
    }

    /// Connect to the module's StackFlow TCP service
    ///
    /// `address` may omit the port, in which case
    /// [`DEFAULT_TCP_PORT`](super::stream::DEFAULT_TCP_PORT) is used.
    pub fn connect_tcp(address: &str, timeout: Duration) -> Result<Self, ProtocolError> {
        let address = with_default_port(address);
        tracing::debug!("connecting to {}", address);
        let mut channel = TcpChannel::connect(address.as_str(), timeout)?;
        channel.set_timeout(timeout)?;
        Ok(Self::new(Box::new(channel)))
    }

    /// Open whichever channel the settings describe, TCP taking precedence
    pub fn open(settings: &TransportSettings) -> Result<Self, ProtocolError> {
        match &settings.tcp_address {
            Some(address) => {
                Self::connect_tcp(address, Duration::from_millis(settings.connect_timeout_ms))
            }
            None => Self::open_serial(settings),
        }
    }

    /// Cumulative tx/rx bytes and message counters
    pub fn get_counters(&self) -> (u64, u64, u64, u64) {
        (
            self.tx_bytes,
            self.rx_bytes,
            self.tx_messages,
            self.rx_messages,
        )
    }

    /// Drop buffered messages and anything unread on the channel
    pub fn clear(&mut self) -> Result<(), ProtocolError> {
        self.queue.clear();
        self.channel.clear_input_buffer()?;
        Ok(())
    }

    /// A closed link becomes [`ProtocolError::NotConnected`]
    fn read_error(&self, e: std::io::Error) -> ProtocolError {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => {
                tracing::warn!("{}: {}", self.channel.describe(), e);
                ProtocolError::NotConnected
            }
            _ => ProtocolError::SerialError(e.to_string()),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.channel
            .write_all(bytes)
            .and_then(|_| self.channel.flush())
            .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
        self.tx_bytes = self.tx_bytes.saturating_add(bytes.len() as u64);
        Ok(())
    }
}

impl Transport for ChannelTransport {
    fn send_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        tracing::trace!("{} <- {}", self.channel.describe(), text);
        self.write_all(text.as_bytes())?;
        self.tx_messages = self.tx_messages.saturating_add(1);
        Ok(())
    }

    fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        tracing::trace!("{} <- {} raw bytes", self.channel.describe(), bytes.len());
        self.write_all(bytes)
    }

    fn pump(&mut self) -> Result<(), ProtocolError> {
        loop {
            let available = self
                .channel
                .bytes_to_read()
                .map_err(|e| self.read_error(e))?;
            if available == 0 {
                return Ok(());
            }

            let to_read = (available as usize).min(self.read_buf.len());
            match self.channel.read(&mut self.read_buf[..to_read]) {
                Ok(0) => {
                    tracing::warn!("{}: end of stream", self.channel.describe());
                    return Err(ProtocolError::NotConnected);
                }
                Ok(n) => {
                    self.rx_bytes = self.rx_bytes.saturating_add(n as u64);
                    let parsed = self.queue.push_bytes(&self.read_buf[..n]);
                    self.rx_messages = self.rx_messages.saturating_add(parsed as u64);
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    return Ok(());
                }
                Err(e) => return Err(self.read_error(e)),
            }
        }
    }

    fn take_message(&mut self, request_id: &str) -> Option<ResponseMessage> {
        self.queue.take(request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    /// In-memory channel: `incoming` is what the module "sent"
    struct LoopChannel {
        incoming: Vec<u8>,
        written: Arc<Mutex<Vec<u8>>>,
        /// Report end of stream once `incoming` is drained
        closed: bool,
    }

    impl Read for LoopChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.incoming.len());
            buf[..n].copy_from_slice(&self.incoming[..n]);
            self.incoming.drain(..n);
            Ok(n)
        }
    }

    impl Write for LoopChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CommunicationChannel for LoopChannel {
        fn describe(&self) -> String {
            "loop".into()
        }

        fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }

        fn clear_input_buffer(&mut self) -> io::Result<()> {
            self.incoming.clear();
            Ok(())
        }

        fn bytes_to_read(&mut self) -> io::Result<u32> {
            if self.closed && self.incoming.is_empty() {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "closed"));
            }
            Ok(self.incoming.len() as u32)
        }
    }

    #[test]
    fn test_send_order_and_pump() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let channel = LoopChannel {
            incoming: b"{\"request_id\":\"vlm_setup\",\"work_id\":\"vlm.1000\"}\n".to_vec(),
            written: written.clone(),
            closed: false,
        };
        let mut transport = ChannelTransport::new(Box::new(channel));

        transport.send_text("{\"RAW\":3}").unwrap();
        transport.send_raw(&[1, 2, 3]).unwrap();
        assert_eq!(written.lock().unwrap().as_slice(), b"{\"RAW\":3}\x01\x02\x03");

        assert!(transport.take_message("vlm_setup").is_none());
        transport.pump().unwrap();
        let msg = transport.take_message("vlm_setup").unwrap();
        assert_eq!(msg.work_id, "vlm.1000");

        let (tx_bytes, rx_bytes, tx_msgs, rx_msgs) = transport.get_counters();
        assert_eq!(tx_bytes, 12);
        assert!(rx_bytes > 0);
        assert_eq!(tx_msgs, 1);
        assert_eq!(rx_msgs, 1);
    }

    #[test]
    fn test_closed_channel_is_not_connected() {
        let channel = LoopChannel {
            incoming: b"{\"request_id\":\"sys_ping\",\"work_id\":\"sys\"}\n".to_vec(),
            written: Arc::new(Mutex::new(Vec::new())),
            closed: true,
        };
        let mut transport = ChannelTransport::new(Box::new(channel));

        let err = transport.pump().unwrap_err();
        assert!(matches!(err, ProtocolError::NotConnected), "{:?}", err);
        assert!(!err.is_timeout());
        // Lines received before the close are still delivered
        assert!(transport.take_message("sys_ping").is_some());
        assert!(matches!(transport.pump(), Err(ProtocolError::NotConnected)));
    }

    #[test]
    fn test_manual_clock_pause_always_advances() {
        let clock = ManualClock::new();
        let shared = clock.clone();
        clock.pause(Duration::ZERO);
        clock.pause(Duration::from_millis(5));
        assert_eq!(shared.now_ms(), 6);
    }
}
