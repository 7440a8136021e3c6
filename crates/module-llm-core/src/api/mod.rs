//! Capability clients
//!
//! [`ModuleLlm`] owns the connection to one module and hands out short-lived
//! clients for each capability unit. Clients only supply defaults (object
//! tags, request ids, timeouts); command shaping lives in
//! [`CommandBuilder`] and reply correlation in [`Connection`].
//!
//! ```rust,ignore
//! use module_llm_core::prelude::*;
//!
//! let config = ModuleConfig::load("module.json")?;
//! let mut module = ModuleLlm::open(&config)?;
//! module.refresh_version()?;
//!
//! let work_id = module.llm().setup(&LlmSetupConfig::default(), CallOptions::new())?;
//! let print = |delta: &str| print!("{delta}");
//! module.llm().inference_and_wait_result(&work_id, "Hello", print, CallOptions::new())?;
//! module.llm().exit(&work_id, CallOptions::new())?;
//! ```

pub mod camera;
pub mod depth_anything;
pub mod kws;
pub mod llm;
pub mod sys;
pub mod vlm;

pub use camera::{ApiCamera, CameraSetupConfig};
pub use depth_anything::{decode_depth_frame, ApiDepthAnything, DepthAnythingSetupConfig};
pub use kws::{ApiKws, KwsLanguage, KwsSetupConfig};
pub use llm::{ApiLlm, LlmSetupConfig};
pub use sys::ApiSys;
pub use vlm::{ApiVlm, VlmSetupConfig};

use std::time::Duration;
use uuid::Uuid;

use crate::config::{ModuleConfig, Timeouts};
use crate::protocol::{
    Action, Capability, CapabilityConfig, ChannelTransport, Clock, CommandBuilder, Connection,
    ProtocolError, ProtocolVersion, StreamSummary, SystemClock, Transport, WaitSettings,
};

/// Per-call overrides; unset fields fall back to the capability defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Request id to tag the command with
    pub request_id: Option<String>,
    /// Fixed wait for setup and exit, idle window for streamed answers
    pub timeout: Option<Duration>,
}

impl CallOptions {
    /// Options with every field unset
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with a fresh request id, e.g. `llm_inference_3f2a...`
    pub fn unique(prefix: &str) -> Self {
        Self::new().request_id(format!("{}_{}", prefix, Uuid::new_v4().simple()))
    }

    /// Override the request id
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Override the timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn request_id_or(&self, capability: Capability, action: Action) -> String {
        self.request_id
            .clone()
            .unwrap_or_else(|| capability.default_request_id(action))
    }
}

/// One attached module
pub struct ModuleLlm<T, C = SystemClock> {
    connection: Connection<T, C>,
    builder: CommandBuilder,
    timeouts: Timeouts,
}

impl ModuleLlm<ChannelTransport> {
    /// Open the transport described by `config`
    ///
    /// The protocol version comes from the config when set; otherwise `v1.0`
    /// is assumed until [`refresh_version`](Self::refresh_version) is called.
    pub fn open(config: &ModuleConfig) -> Result<Self, ProtocolError> {
        let transport = ChannelTransport::open(&config.transport)?;
        let mut module = Self::new(transport, config.timeouts);
        if let Some(raw) = &config.protocol_version {
            match ProtocolVersion::parse(raw) {
                Some(version) => module.set_version(version),
                None => tracing::warn!("ignoring unparseable protocol_version {:?}", raw),
            }
        }
        Ok(module)
    }
}

impl<T: Transport> ModuleLlm<T, SystemClock> {
    /// Drive `transport` with the wall clock
    pub fn new(transport: T, timeouts: Timeouts) -> Self {
        Self::with_clock(transport, SystemClock::new(), timeouts)
    }
}

impl<T: Transport, C: Clock> ModuleLlm<T, C> {
    /// Drive `transport` with an explicit clock
    pub fn with_clock(transport: T, clock: C, timeouts: Timeouts) -> Self {
        let settings = WaitSettings {
            poll_interval: timeouts.poll_interval(),
        };
        Self {
            connection: Connection::with_clock(transport, clock, settings),
            builder: CommandBuilder::default(),
            timeouts,
        }
    }

    /// Version commands are shaped for
    pub fn version(&self) -> &ProtocolVersion {
        self.builder.version()
    }

    /// Shape later commands for `version` without asking the module
    pub fn set_version(&mut self, version: ProtocolVersion) {
        tracing::debug!("protocol version set to {}", version);
        self.builder.set_version(version);
    }

    /// Ask the module for its version and shape later commands accordingly
    pub fn refresh_version(&mut self) -> Result<ProtocolVersion, ProtocolError> {
        let raw = self.sys().version(CallOptions::new())?;
        let version = ProtocolVersion::parse(&raw)
            .ok_or_else(|| ProtocolError::InvalidResponse(format!("bad version {:?}", raw)))?;
        self.set_version(version.clone());
        Ok(version)
    }

    /// True when the module answers a ping
    pub fn check_connection(&mut self) -> bool {
        match self.sys().ping(CallOptions::new()) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("ping failed: {}", e);
                false
            }
        }
    }

    /// Default timeouts used when a call sets none
    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Replace the default timeouts, including the poll interval
    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.connection.set_poll_interval(timeouts.poll_interval());
        self.timeouts = timeouts;
    }

    /// Builder shaping commands for the current version
    pub fn builder(&self) -> &CommandBuilder {
        &self.builder
    }

    /// Underlying correlation engine
    pub fn connection(&self) -> &Connection<T, C> {
        &self.connection
    }

    /// Mutable access to the correlation engine
    pub fn connection_mut(&mut self) -> &mut Connection<T, C> {
        &mut self.connection
    }

    /// Give back the transport
    pub fn into_transport(self) -> T {
        self.connection.into_transport()
    }

    /// Client for the `camera` unit
    pub fn camera(&mut self) -> ApiCamera<'_, T, C> {
        ApiCamera::new(self)
    }

    /// Client for the `kws` unit
    pub fn kws(&mut self) -> ApiKws<'_, T, C> {
        ApiKws::new(self)
    }

    /// Client for the `llm` unit
    pub fn llm(&mut self) -> ApiLlm<'_, T, C> {
        ApiLlm::new(self)
    }

    /// Client for the `vlm` unit
    pub fn vlm(&mut self) -> ApiVlm<'_, T, C> {
        ApiVlm::new(self)
    }

    /// Client for the `depth_anything` unit
    pub fn depth_anything(&mut self) -> ApiDepthAnything<'_, T, C> {
        ApiDepthAnything::new(self)
    }

    /// Client for the `sys` unit
    pub fn sys(&mut self) -> ApiSys<'_, T, C> {
        ApiSys::new(self)
    }

    // Shared plumbing for the capability clients

    fn setup_unit<Cfg: CapabilityConfig + ?Sized>(
        &mut self,
        config: &Cfg,
        default_timeout: Duration,
        opts: CallOptions,
    ) -> Result<String, ProtocolError> {
        let request_id = opts.request_id_or(config.capability(), Action::Setup);
        let command = self.builder.build_setup(config, &request_id);
        let reply = self
            .connection
            .send_and_wait(&command, opts.timeout.unwrap_or(default_timeout))?
            .into_result()?;
        tracing::debug!("{} ready as {}", config.capability().unit_name(), reply.work_id);
        Ok(reply.work_id)
    }

    fn exit_unit(
        &mut self,
        capability: Capability,
        work_id: &str,
        opts: CallOptions,
    ) -> Result<String, ProtocolError> {
        let request_id = opts.request_id_or(capability, Action::Exit);
        let command = self.builder.build_exit(work_id, &request_id);
        let reply = self
            .connection
            .send_and_wait(&command, opts.timeout.unwrap_or(self.timeouts.exit()))?
            .into_result()?;
        Ok(reply.work_id)
    }

    fn text_inference(
        &mut self,
        capability: Capability,
        object: &str,
        work_id: &str,
        input: &str,
        opts: &CallOptions,
    ) -> Result<String, ProtocolError> {
        let request_id = opts.request_id_or(capability, Action::Inference);
        let command = self
            .builder
            .build_text_inference(work_id, object, input, &request_id);
        self.connection.send_command(&command)?;
        Ok(request_id)
    }

    fn text_inference_and_wait<F: FnMut(&str)>(
        &mut self,
        capability: Capability,
        object: &str,
        work_id: &str,
        input: &str,
        on_result: F,
        opts: CallOptions,
    ) -> Result<StreamSummary, ProtocolError> {
        let request_id = self.text_inference(capability, object, work_id, input, &opts)?;
        let idle = opts.timeout.unwrap_or(self.timeouts.inference_idle());
        self.connection
            .stream_until_finish(&request_id, idle, on_result)
    }

    fn raw_inference(
        &mut self,
        capability: Capability,
        work_id: &str,
        bytes: &[u8],
        opts: &CallOptions,
    ) -> Result<String, ProtocolError> {
        let request_id = opts.request_id_or(capability, Action::Inference);
        let header = self
            .builder
            .build_raw_inference(work_id, bytes.len(), &request_id);
        self.connection.send_raw_transfer(&header, bytes)?;
        Ok(request_id)
    }

    fn raw_inference_and_wait<F: FnMut(&str)>(
        &mut self,
        capability: Capability,
        work_id: &str,
        bytes: &[u8],
        on_result: F,
        opts: CallOptions,
    ) -> Result<StreamSummary, ProtocolError> {
        let request_id = self.raw_inference(capability, work_id, bytes, &opts)?;
        let idle = opts.timeout.unwrap_or(self.timeouts.inference_idle());
        self.connection
            .stream_until_finish(&request_id, idle, on_result)
    }

    fn sys_request(
        &mut self,
        action: Action,
        default_timeout: Duration,
        opts: CallOptions,
    ) -> Result<crate::protocol::ResponseMessage, ProtocolError> {
        let request_id = opts.request_id_or(Capability::Sys, action);
        let command = self.builder.build_sys(action, &request_id);
        let reply = self
            .connection
            .send_and_wait(&command, opts.timeout.unwrap_or(default_timeout))?;
        reply.into_result()
    }
}
