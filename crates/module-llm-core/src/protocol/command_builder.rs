//! Command Builder
//!
//! Assembles setup, exit and inference commands for a capability unit,
//! shaping fields according to the module's protocol version.
//!
//! Setup `data` is filled in a fixed order:
//! 1. the capability's base fields (model, response_format, enoutput, ...)
//! 2. `input`, as a scalar on `v1.0` and as a list everywhere else
//! 3. model substitution, which always wins over the configured model
//! 4. extra options, decoded by [`encode_options`], which win over everything
//!
//! Building never fails. A missing input encodes as an empty string.

use serde_json::{Map, Value};

use super::commands::{Action, Capability, Command, RAW_JPEG_OBJECT};
use super::value::{encode_options, ExtraParams};
use super::version::ProtocolVersion;

/// How a capability declares its `input` field
#[derive(Debug, Clone, Copy)]
pub enum InputSpec<'a> {
    /// Scalar on `v1.0`, ordered list on every other version
    Versioned(&'a [String]),
    /// Always a scalar, regardless of version
    Fixed(&'a str),
}

/// Setup configuration for one capability unit
pub trait CapabilityConfig {
    /// Unit this config sets up
    fn capability(&self) -> Capability;

    /// Declared base fields, excluding `input`
    fn base_fields(&self) -> Map<String, Value>;

    /// How the `input` field is shaped
    fn input(&self) -> InputSpec<'_>;

    /// Model name forced by auxiliary selectors or the protocol version
    fn model_override(&self, _version: &ProtocolVersion) -> Option<String> {
        None
    }

    /// Caller-supplied options merged last
    fn extra_params(&self) -> &ExtraParams;
}

/// Builds commands for a given protocol version
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    version: ProtocolVersion,
}

impl CommandBuilder {
    /// Builder shaping commands for `version`
    pub fn new(version: ProtocolVersion) -> Self {
        Self { version }
    }

    /// Version commands are currently shaped for
    pub fn version(&self) -> &ProtocolVersion {
        &self.version
    }

    /// Shape later commands for `version`
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    /// Build a setup command addressed to the unit's well-known name
    pub fn build_setup<C: CapabilityConfig + ?Sized>(
        &self,
        config: &C,
        request_id: &str,
    ) -> Command {
        let capability = config.capability();
        let mut data = config.base_fields();

        let input = match config.input() {
            InputSpec::Fixed(value) => Value::String(value.to_string()),
            InputSpec::Versioned(list) if self.version.uses_scalar_input() => {
                Value::String(list.first().cloned().unwrap_or_default())
            }
            InputSpec::Versioned(list) => {
                Value::Array(list.iter().cloned().map(Value::String).collect())
            }
        };
        data.insert("input".to_string(), input);

        if let Some(model) = config.model_override(&self.version) {
            data.insert("model".to_string(), Value::String(model));
        }

        encode_options(&mut data, config.extra_params());

        Command::new(request_id, capability.unit_name(), Action::Setup)
            .with_object(capability.setup_object())
            .with_data(data)
    }

    /// Build an exit command; it carries no object or data
    pub fn build_exit(&self, work_id: &str, request_id: &str) -> Command {
        Command::new(request_id, work_id, Action::Exit)
    }

    /// Build a single-shot text inference command
    pub fn build_text_inference(
        &self,
        work_id: &str,
        object: &str,
        input: &str,
        request_id: &str,
    ) -> Command {
        let mut data = Map::new();
        data.insert("delta".to_string(), Value::String(input.to_string()));
        data.insert("index".to_string(), Value::from(0));
        data.insert("finish".to_string(), Value::Bool(true));

        Command::new(request_id, work_id, Action::Inference)
            .with_object(object)
            .with_data(data)
    }

    /// Build the header for a binary inference; the raw block must follow it
    pub fn build_raw_inference(&self, work_id: &str, raw_len: usize, request_id: &str) -> Command {
        Command::new(request_id, work_id, Action::Inference)
            .with_object(RAW_JPEG_OBJECT)
            .with_raw_len(raw_len)
    }

    /// Build a request to the `sys` unit (ping, version, reset)
    pub fn build_sys(&self, action: Action, request_id: &str) -> Command {
        Command::new(request_id, Capability::Sys.unit_name(), action)
    }
}
