//! Module Protocol Communication
//!
//! JSON control messages interleaved with raw binary blocks, correlated by
//! request id.

pub mod command_builder;
pub mod commands;
mod connection;
mod error;
pub mod message;
pub mod serial;
pub mod stream;
pub mod transport;
pub mod value;
pub mod version;

pub use command_builder::{CapabilityConfig, CommandBuilder, InputSpec};
pub use commands::{
    Action, Capability, Command, ModuleStatus, ResponseFragment, ResponseMessage, RAW_JPEG_OBJECT,
};
pub use connection::{Connection, StreamSummary, WaitSettings};
pub use error::ProtocolError;
pub use message::MessageQueue;
pub use serial::{detect_port, list_ports, open_port, PortInfo, PortKind};
pub use transport::{ChannelTransport, Clock, ManualClock, SystemClock, Transport};
pub use value::{decode_option, encode_options, ExtraParams, OptionValue};
pub use version::{ProtocolVersion, LEGACY_INPUT_VERSION, VLM_HIGH_CAPABILITY_VERSION};

/// Default baud rate of the module's UART
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Wait for `exit` replies
pub const DEFAULT_EXIT_TIMEOUT_MS: u64 = 100;

/// Wait for setup of units that load no model (camera)
pub const DEFAULT_SETUP_TIMEOUT_MS: u64 = 5000;

/// Wait for setup of units that load a model
pub const DEFAULT_MODEL_SETUP_TIMEOUT_MS: u64 = 30000;

/// Idle window between streamed inference fragments
pub const DEFAULT_INFERENCE_IDLE_TIMEOUT_MS: u64 = 5000;

/// Wait for `sys` unit replies (ping, version)
pub const DEFAULT_SYS_TIMEOUT_MS: u64 = 1000;

/// Pause between two polls in the wait loops
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1;

/// Longest accepted message line
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Parsed messages kept while nobody takes them
pub const MAX_BUFFERED_MESSAGES: usize = 256;
