//! Depth estimation unit
//!
//! Accepts JPEG frames and streams back a depth map as base64 JPEG text.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};

use super::{CallOptions, ModuleLlm};
use crate::protocol::{
    Capability, CapabilityConfig, Clock, ExtraParams, InputSpec, ProtocolError, StreamSummary,
    Transport,
};

/// Setup parameters for the `depth_anything` unit
#[derive(Debug, Clone, PartialEq)]
pub struct DepthAnythingSetupConfig {
    /// Depth model name
    pub model: String,
    /// Output encoding, base64 JPEG stream by default
    pub response_format: String,
    /// Input sources, in order
    pub input: Vec<String>,
    /// Stream results back to the host
    pub enoutput: bool,
    /// Options merged into setup `data` last
    pub extra_params: ExtraParams,
}

impl Default for DepthAnythingSetupConfig {
    fn default() -> Self {
        Self {
            model: "depth_anything".to_string(),
            response_format: "jpeg.base64.stream".to_string(),
            input: vec!["depth_anything.jpeg.raw".to_string()],
            enoutput: true,
            extra_params: ExtraParams::new(),
        }
    }
}

impl CapabilityConfig for DepthAnythingSetupConfig {
    fn capability(&self) -> Capability {
        Capability::DepthAnything
    }

    fn base_fields(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("model".into(), Value::from(self.model.as_str()));
        data.insert("response_format".into(), Value::from(self.response_format.as_str()));
        data.insert("enoutput".into(), Value::from(self.enoutput));
        data
    }

    fn input(&self) -> InputSpec<'_> {
        InputSpec::Versioned(&self.input)
    }

    fn extra_params(&self) -> &ExtraParams {
        &self.extra_params
    }
}

/// Decode an accumulated base64 depth stream into JPEG bytes
///
/// Whitespace, including the newline appended to the final fragment, is ignored.
pub fn decode_depth_frame(text: &str) -> Result<Vec<u8>, ProtocolError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ProtocolError::InvalidResponse(format!("bad base64 depth frame: {}", e)))
}

/// Client for the `depth_anything` unit
pub struct ApiDepthAnything<'a, T, C> {
    module: &'a mut ModuleLlm<T, C>,
}

impl<'a, T: Transport, C: Clock> ApiDepthAnything<'a, T, C> {
    pub(super) fn new(module: &'a mut ModuleLlm<T, C>) -> Self {
        Self { module }
    }

    /// Load the depth model; returns the unit's work id
    pub fn setup(
        &mut self,
        config: &DepthAnythingSetupConfig,
        opts: CallOptions,
    ) -> Result<String, ProtocolError> {
        let timeout = self.module.timeouts.model_setup();
        self.module.setup_unit(config, timeout, opts)
    }

    /// Release the unit; returns the work id the module released
    pub fn exit(&mut self, work_id: &str, opts: CallOptions) -> Result<String, ProtocolError> {
        self.module.exit_unit(Capability::DepthAnything, work_id, opts)
    }

    /// Push a JPEG frame without waiting
    pub fn inference(
        &mut self,
        work_id: &str,
        jpeg: &[u8],
        opts: CallOptions,
    ) -> Result<(), ProtocolError> {
        self.module
            .raw_inference(Capability::DepthAnything, work_id, jpeg, &opts)
            .map(|_| ())
    }

    /// Push a JPEG frame and stream the base64 depth map into `on_result`
    pub fn inference_and_wait_result<F: FnMut(&str)>(
        &mut self,
        work_id: &str,
        jpeg: &[u8],
        on_result: F,
        opts: CallOptions,
    ) -> Result<StreamSummary, ProtocolError> {
        self.module
            .raw_inference_and_wait(Capability::DepthAnything, work_id, jpeg, on_result, opts)
    }

    /// Push a JPEG frame and return the decoded depth JPEG
    pub fn estimate(
        &mut self,
        work_id: &str,
        jpeg: &[u8],
        opts: CallOptions,
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut encoded = String::new();
        self.inference_and_wait_result(work_id, jpeg, |delta| encoded.push_str(delta), opts)?;
        decode_depth_frame(&encoded)
    }
}
