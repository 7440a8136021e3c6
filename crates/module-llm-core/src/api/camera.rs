//! Camera capture unit
//!
//! The camera has no model; its frames are linked to other units on the
//! module, so only setup and exit are exposed here.

use serde_json::{Map, Value};

use super::{CallOptions, ModuleLlm};
use crate::protocol::{
    Capability, CapabilityConfig, Clock, ExtraParams, InputSpec, ProtocolError, Transport,
};

/// Setup parameters for the `camera` unit
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSetupConfig {
    /// Frame encoding, `camera.raw` by default
    pub response_format: String,
    /// Capture device path on the module
    pub input: String,
    /// Forward frames to the host as well as to linked units
    pub enoutput: bool,
    /// Capture width in pixels
    pub frame_width: i64,
    /// Capture height in pixels
    pub frame_height: i64,
    /// Options merged into setup `data` last
    pub extra_params: ExtraParams,
}

impl Default for CameraSetupConfig {
    fn default() -> Self {
        Self {
            response_format: "camera.raw".to_string(),
            input: "/dev/video0".to_string(),
            enoutput: false,
            frame_width: 320,
            frame_height: 240,
            extra_params: ExtraParams::new(),
        }
    }
}

impl CapabilityConfig for CameraSetupConfig {
    fn capability(&self) -> Capability {
        Capability::Camera
    }

    fn base_fields(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("response_format".into(), Value::from(self.response_format.as_str()));
        data.insert("enoutput".into(), Value::from(self.enoutput));
        data.insert("frame_width".into(), Value::from(self.frame_width));
        data.insert("frame_height".into(), Value::from(self.frame_height));
        data
    }

    fn input(&self) -> InputSpec<'_> {
        InputSpec::Fixed(&self.input)
    }

    fn extra_params(&self) -> &ExtraParams {
        &self.extra_params
    }
}

/// Client for the `camera` unit
pub struct ApiCamera<'a, T, C> {
    module: &'a mut ModuleLlm<T, C>,
}

impl<'a, T: Transport, C: Clock> ApiCamera<'a, T, C> {
    pub(super) fn new(module: &'a mut ModuleLlm<T, C>) -> Self {
        Self { module }
    }

    /// Start capturing; returns the work id of the camera unit
    pub fn setup(
        &mut self,
        config: &CameraSetupConfig,
        opts: CallOptions,
    ) -> Result<String, ProtocolError> {
        let timeout = self.module.timeouts.setup();
        self.module.setup_unit(config, timeout, opts)
    }

    /// Stop the unit; returns the work id the module released
    pub fn exit(&mut self, work_id: &str, opts: CallOptions) -> Result<String, ProtocolError> {
        self.module.exit_unit(Capability::Camera, work_id, opts)
    }
}
