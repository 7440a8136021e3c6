//! Keyword spotting unit

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{CallOptions, ModuleLlm};
use crate::protocol::{
    Capability, CapabilityConfig, Clock, ExtraParams, InputSpec, ProtocolError, ProtocolVersion,
    Transport,
};

/// Default English wake-word model
pub const KWS_MODEL_EN: &str = "sherpa-onnx-kws-zipformer-gigaspeech-3.3M-2024-01-01";

/// Mandarin wake-word model, forced when the language is [`KwsLanguage::ZhCn`]
pub const KWS_MODEL_ZH: &str = "sherpa-onnx-kws-zipformer-wenetspeech-3.3M-2024-01-01";

/// Wake-word language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KwsLanguage {
    /// English, `en_US`
    #[default]
    #[serde(rename = "en_US")]
    EnUs,
    /// Mandarin, `zh_CN`
    #[serde(rename = "zh_CN")]
    ZhCn,
}

/// Setup parameters for the `kws` unit
#[derive(Debug, Clone, PartialEq)]
pub struct KwsSetupConfig {
    /// Wake phrase
    pub kws: String,
    /// Wake-word model; replaced for Mandarin
    pub model: String,
    /// Output encoding, `kws.bool` by default
    pub response_format: String,
    /// Audio sources, in order
    pub input: Vec<String>,
    /// Report detections to the host
    pub enoutput: bool,
    /// Selects the wake-word model
    pub language: KwsLanguage,
    /// Options merged into setup `data` last
    pub extra_params: ExtraParams,
}

impl Default for KwsSetupConfig {
    fn default() -> Self {
        Self {
            kws: "HELLO".to_string(),
            model: KWS_MODEL_EN.to_string(),
            response_format: "kws.bool".to_string(),
            input: vec!["sys.pcm".to_string()],
            enoutput: true,
            language: KwsLanguage::EnUs,
            extra_params: ExtraParams::new(),
        }
    }
}

impl CapabilityConfig for KwsSetupConfig {
    fn capability(&self) -> Capability {
        Capability::Kws
    }

    fn base_fields(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("model".into(), Value::from(self.model.as_str()));
        data.insert("response_format".into(), Value::from(self.response_format.as_str()));
        data.insert("enoutput".into(), Value::from(self.enoutput));
        data.insert("kws".into(), Value::from(self.kws.as_str()));
        data
    }

    fn input(&self) -> InputSpec<'_> {
        InputSpec::Versioned(&self.input)
    }

    fn model_override(&self, _version: &ProtocolVersion) -> Option<String> {
        (self.language == KwsLanguage::ZhCn).then(|| KWS_MODEL_ZH.to_string())
    }

    fn extra_params(&self) -> &ExtraParams {
        &self.extra_params
    }
}

/// Client for the `kws` unit
pub struct ApiKws<'a, T, C> {
    module: &'a mut ModuleLlm<T, C>,
}

impl<'a, T: Transport, C: Clock> ApiKws<'a, T, C> {
    pub(super) fn new(module: &'a mut ModuleLlm<T, C>) -> Self {
        Self { module }
    }

    /// Start listening; returns the unit's work id
    pub fn setup(
        &mut self,
        config: &KwsSetupConfig,
        opts: CallOptions,
    ) -> Result<String, ProtocolError> {
        let timeout = self.module.timeouts.model_setup();
        self.module.setup_unit(config, timeout, opts)
    }

    /// Release the unit; returns the work id the module released
    pub fn exit(&mut self, work_id: &str, opts: CallOptions) -> Result<String, ProtocolError> {
        self.module.exit_unit(Capability::Kws, work_id, opts)
    }
}
