//! Language model unit

use serde_json::{Map, Value};

use super::{CallOptions, ModuleLlm};
use crate::protocol::{
    Capability, CapabilityConfig, Clock, ExtraParams, InputSpec, ProtocolError, StreamSummary,
    Transport,
};

/// Object tag of streamed UTF-8 text for the language model
pub const LLM_TEXT_OBJECT: &str = "llm.utf-8.stream";

/// Setup parameters for the `llm` unit
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSetupConfig {
    /// System prompt
    pub prompt: String,
    /// Model name
    pub model: String,
    /// Output encoding, `llm.utf-8.stream` by default
    pub response_format: String,
    /// Upstream sources; the first one is used on `v1.0`
    pub input: Vec<String>,
    /// Stream answers back to the host
    pub enoutput: bool,
    /// Accept wake-word interruptions from a linked kws unit
    pub enkws: bool,
    /// Upper bound on generated tokens
    pub max_token_len: i64,
    /// Options merged into setup `data` last
    pub extra_params: ExtraParams,
}

impl Default for LlmSetupConfig {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            model: "qwen2.5-0.5B-prefill-20e".to_string(),
            response_format: "llm.utf-8.stream".to_string(),
            input: vec!["llm.utf-8.stream".to_string()],
            enoutput: true,
            enkws: true,
            max_token_len: 127,
            extra_params: ExtraParams::new(),
        }
    }
}

impl CapabilityConfig for LlmSetupConfig {
    fn capability(&self) -> Capability {
        Capability::Llm
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

    fn extra_params(&self) -> &ExtraParams {
        &self.extra_params
    }
}

/// Client for the `llm` unit
pub struct ApiLlm<'a, T, C> {
    module: &'a mut ModuleLlm<T, C>,
}

impl<'a, T: Transport, C: Clock> ApiLlm<'a, T, C> {
    pub(super) fn new(module: &'a mut ModuleLlm<T, C>) -> Self {
        Self { module }
    }

    /// Load the model; returns the assigned work id
    pub fn setup(
        &mut self,
        config: &LlmSetupConfig,
        opts: CallOptions,
    ) -> Result<String, ProtocolError> {
        let timeout = self.module.timeouts.model_setup();
        self.module.setup_unit(config, timeout, opts)
    }

    /// Release the unit; returns the work id echoed by the module
    pub fn exit(&mut self, work_id: &str, opts: CallOptions) -> Result<String, ProtocolError> {
        self.module.exit_unit(Capability::Llm, work_id, opts)
    }

    /// Push a prompt without waiting for the answer
    pub fn inference(
        &mut self,
        work_id: &str,
        input: &str,
        opts: CallOptions,
    ) -> Result<(), ProtocolError> {
        self.module
            .text_inference(Capability::Llm, LLM_TEXT_OBJECT, work_id, input, &opts)
            .map(|_| ())
    }

    /// Push a prompt and stream the answer into `on_result`
    ///
    /// `opts.timeout` is the idle window between fragments.
    pub fn inference_and_wait_result<F: FnMut(&str)>(
        &mut self,
        work_id: &str,
        input: &str,
        on_result: F,
        opts: CallOptions,
    ) -> Result<StreamSummary, ProtocolError> {
        self.module.text_inference_and_wait(
            Capability::Llm,
            LLM_TEXT_OBJECT,
            work_id,
            input,
            on_result,
            opts,
        )
    }
}
