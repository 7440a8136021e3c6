//! Byte channels to the module
//!
//! The module is reachable over its UART or, when it is on the network, over
//! the StackFlow TCP port. Both are wrapped behind [`CommunicationChannel`] so
//! the transport above them only sees a non-blocking byte pipe.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Default StackFlow TCP port on the module
pub const DEFAULT_TCP_PORT: u16 = 10001;

/// Append [`DEFAULT_TCP_PORT`] to an address that names only a host
///
/// Bare IPv6 addresses are bracketed first.
pub fn with_default_port(address: &str) -> String {
    let address = address.trim();
    let has_port = match address.strip_prefix('[') {
        Some(rest) => rest.contains("]:"),
        None => address.matches(':').count() == 1,
    };
    if has_port {
        address.to_string()
    } else if address.contains(':') && !address.starts_with('[') {
        format!("[{}]:{}", address, DEFAULT_TCP_PORT)
    } else {
        format!("{}:{}", address, DEFAULT_TCP_PORT)
    }
}

/// Abstraction for communication channels (Serial or TCP)
pub trait CommunicationChannel: Read + Write + Send {
    /// Short human readable name for logs
    fn describe(&self) -> String;

    /// Set timeout for blocking read/write operations
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discard anything received but not yet read
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Get number of bytes available to read without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;
}

/// Serial port wrapper implementing CommunicationChannel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl CommunicationChannel for SerialChannel {
    fn describe(&self) -> String {
        self.port.name().unwrap_or_else(|| "serial".to_string())
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::other)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(io::Error::other)
    }
}

/// TCP stream wrapper implementing CommunicationChannel
pub struct TcpChannel {
    stream: TcpStream,
    peer: String,
}

impl TcpChannel {
    /// Wrap a connected stream
    pub fn new(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "tcp".to_string());
        Self { stream, peer }
    }

    /// Connect to a module's StackFlow service
    pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> io::Result<Self> {
        let mut last_err = None;
        for candidate in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(Self::new(stream));
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no address to connect to")
        }))
    }
}

impl Read for TcpChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl CommunicationChannel for TcpChannel {
    fn describe(&self) -> String {
        self.peer.clone()
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        // No flush syscall for a socket; drain whatever is readable right now
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; 1024];
        let mut drained = 0usize;
        let result = loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => drained += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.stream.set_nonblocking(false)?;
        if drained > 0 {
            tracing::debug!("{}: drained {} stale bytes", self.peer, drained);
        }
        result
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.stream.set_nonblocking(true)?;
        // peek() reports min(available, buffer size)
        let mut buf = [0u8; 8192];
        let result = self.stream.peek(&mut buf);
        self.stream.set_nonblocking(false)?;

        match result {
            // A readable socket with nothing to peek has been closed by the peer
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} closed the connection", self.peer),
            )),
            Ok(n) => Ok(n as u32),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_tcp_channel_bytes_to_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut channel = TcpChannel::connect(addr, Duration::from_secs(1)).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        assert_eq!(channel.bytes_to_read().unwrap(), 0);

        server.write_all(b"{\"request_id\":\"x\"}\n").unwrap();
        server.flush().unwrap();

        let mut available = 0;
        for _ in 0..200 {
            available = channel.bytes_to_read().unwrap();
            if available > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(available > 0);

        channel.clear_input_buffer().unwrap();
        assert_eq!(channel.bytes_to_read().unwrap(), 0);
    }

    #[test]
    fn test_tcp_channel_reports_closed_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut channel = TcpChannel::connect(addr, Duration::from_secs(1)).unwrap();
        let (server, _) = listener.accept().unwrap();
        drop(server);

        let mut closed = None;
        for _ in 0..200 {
            match channel.bytes_to_read() {
                Ok(_) => std::thread::sleep(Duration::from_millis(5)),
                Err(e) => {
                    closed = Some(e.kind());
                    break;
                }
            }
        }
        assert_eq!(closed, Some(io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_default_port_appended_to_bare_host() {
        assert_eq!(with_default_port("m5stack-llm.local"), "m5stack-llm.local:10001");
        assert_eq!(with_default_port("192.168.1.20"), "192.168.1.20:10001");
        assert_eq!(with_default_port("192.168.1.20:9000"), "192.168.1.20:9000");
        assert_eq!(with_default_port("fe80::1"), "[fe80::1]:10001");
        assert_eq!(with_default_port("[fe80::1]"), "[fe80::1]:10001");
        assert_eq!(with_default_port("[fe80::1]:9000"), "[fe80::1]:9000");
    }
}
