//! Vision-language model unit
//!
//! Takes text prompts and JPEG frames. The model name depends on firmware:
//! `v1.0` only ships a text model, and from [`VLM_HIGH_CAPABILITY_VERSION`]
//! on the InternVL build replaces whatever model was configured.

use serde_json::{Map, Value};

use super::{CallOptions, ModuleLlm};
use crate::protocol::{
    Capability, CapabilityConfig, Clock, ExtraParams, InputSpec, ProtocolError, ProtocolVersion,
    StreamSummary, Transport, LEGACY_INPUT_VERSION, VLM_HIGH_CAPABILITY_VERSION,
};

/// Object tag of streamed UTF-8 text for the vision-language model
pub const VLM_TEXT_OBJECT: &str = "vlm.utf-8.stream";

/// Model forced on firmware at or above [`VLM_HIGH_CAPABILITY_VERSION`]
pub const VLM_HIGH_CAPABILITY_MODEL: &str = "internvl2.5-1B-364-ax630c";

/// Model forced on `v1.0` firmware
pub const VLM_LEGACY_MODEL: &str = "qwen2.5-0.5b";

/// Setup parameters for the `vlm` unit
#[derive(Debug, Clone, PartialEq)]
pub struct VlmSetupConfig {
    /// System prompt
    pub prompt: String,
    /// Model name; may be replaced depending on firmware version
    pub model: String,
    /// Output encoding, `vlm.utf-8.stream` by default
    pub response_format: String,
    /// Input sources, in order
    pub input: Vec<String>,
    /// Stream answers back to the host
    pub enoutput: bool,
    /// Let a wake word interrupt generation
    pub enkws: bool,
    /// Upper bound on generated tokens
    pub max_token_len: i64,
    /// Options merged into setup `data` last
    pub extra_params: ExtraParams,
}

impl Default for VlmSetupConfig {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            model: VLM_HIGH_CAPABILITY_MODEL.to_string(),
            response_format: "vlm.utf-8.stream".to_string(),
            input: vec!["vlm.utf-8.stream".to_string()],
            enoutput: true,
            enkws: true,
            max_token_len: 127,
            extra_params: ExtraParams::new(),
        }
    }
}

impl CapabilityConfig for VlmSetupConfig {
    fn capability(&self) -> Capability {
        Capability::Vlm
    }

    fn base_fields(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("model".into(), Value::from(self.model.as_str()));
        data.insert("response_format".into(), Value::from(self.response_format.as_str()));
        data.insert("enoutput".into(), Value::from(self.enoutput));
        data.insert("enkws".into(), Value::from(self.enkws));
        data.insert("max_token_len".into(), Value::from(self.max_token_len));
        data.insert("prompt".into(), Value::from(self.prompt.as_str()));
        data
    }

    fn input(&self) -> InputSpec<'_> {
        InputSpec::Versioned(&self.input)
    }

    fn model_override(&self, version: &ProtocolVersion) -> Option<String> {
        if version.as_str() == LEGACY_INPUT_VERSION {
            Some(VLM_LEGACY_MODEL.to_string())
        } else if version.at_least(VLM_HIGH_CAPABILITY_VERSION) {
            Some(VLM_HIGH_CAPABILITY_MODEL.to_string())
        } else {
            None
        }
    }

    fn extra_params(&self) -> &ExtraParams {
        &self.extra_params
    }
}

/// Client for the `vlm` unit
pub struct ApiVlm<'a, T, C> {
    module: &'a mut ModuleLlm<T, C>,
}

impl<'a, T: Transport, C: Clock> ApiVlm<'a, T, C> {
    pub(super) fn new(module: &'a mut ModuleLlm<T, C>) -> Self {
        Self { module }
    }

    /// Load the vision-language model; returns the unit's work id
    pub fn setup(
        &mut self,
        config: &VlmSetupConfig,
        opts: CallOptions,
    ) -> Result<String, ProtocolError> {
        let timeout = self.module.timeouts.model_setup();
        self.module.setup_unit(config, timeout, opts)
    }

    /// Release the unit; returns the work id the module released
    pub fn exit(&mut self, work_id: &str, opts: CallOptions) -> Result<String, ProtocolError> {
        self.module.exit_unit(Capability::Vlm, work_id, opts)
    }

    /// Push a text prompt without waiting
    pub fn inference(
        &mut self,
        work_id: &str,
        input: &str,
        opts: CallOptions,
    ) -> Result<(), ProtocolError> {
        self.module
            .text_inference(Capability::Vlm, VLM_TEXT_OBJECT, work_id, input, &opts)
            .map(|_| ())
    }

    /// Push a JPEG frame without waiting
    pub fn inference_raw(
        &mut self,
        work_id: &str,
        jpeg: &[u8],
        opts: CallOptions,
    ) -> Result<(), ProtocolError> {
        self.module
            .raw_inference(Capability::Vlm, work_id, jpeg, &opts)
            .map(|_| ())
    }

    /// Push a text prompt and stream the answer into `on_result`
    pub fn inference_and_wait_result<F: FnMut(&str)>(
        &mut self,
        work_id: &str,
        input: &str,
        on_result: F,
        opts: CallOptions,
    ) -> Result<StreamSummary, ProtocolError> {
        self.module.text_inference_and_wait(
            Capability::Vlm,
            VLM_TEXT_OBJECT,
            work_id,
            input,
            on_result,
            opts,
        )
    }

    /// Push a JPEG frame and stream the answer into `on_result`
    pub fn inference_raw_and_wait_result<F: FnMut(&str)>(
        &mut self,
        work_id: &str,
        jpeg: &[u8],
        on_result: F,
        opts: CallOptions,
    ) -> Result<StreamSummary, ProtocolError> {
        self.module
            .raw_inference_and_wait(Capability::Vlm, work_id, jpeg, on_result, opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_for(version: &str) -> Option<String> {
        let version = ProtocolVersion::parse(version).unwrap();
        VlmSetupConfig::default().model_override(&version)
    }

    #[test]
    fn test_model_override_by_version() {
        assert_eq!(model_for("v1.0").as_deref(), Some(VLM_LEGACY_MODEL));
        assert_eq!(model_for("v1.3"), None);
        assert_eq!(model_for("v1.6").as_deref(), Some(VLM_HIGH_CAPABILITY_MODEL));
    }

    #[test]
    fn test_model_override_reads_level_as_decimal() {
        assert_eq!(model_for("v1.10"), None);
        assert_eq!(model_for("v1.00"), None);
        assert_eq!(model_for("v1.6.1").as_deref(), Some(VLM_HIGH_CAPABILITY_MODEL));
    }
}
