//! Module housekeeping (`sys` unit)

use super::{CallOptions, ModuleLlm};
use crate::protocol::{Action, Clock, ProtocolError, Transport};

/// Client for the `sys` unit
pub struct ApiSys<'a, T, C> {
    module: &'a mut ModuleLlm<T, C>,
}

impl<'a, T: Transport, C: Clock> ApiSys<'a, T, C> {
    pub(super) fn new(module: &'a mut ModuleLlm<T, C>) -> Self {
        Self { module }
    }

    /// Round-trip a ping; any well-formed reply counts
    pub fn ping(&mut self, opts: CallOptions) -> Result<(), ProtocolError> {
        let timeout = self.module.timeouts.sys();
        self.module.sys_request(Action::Ping, timeout, opts).map(|_| ())
    }

    /// Firmware protocol version string, e.g. `"v1.6"`
    pub fn version(&mut self, opts: CallOptions) -> Result<String, ProtocolError> {
        let timeout = self.module.timeouts.sys();
        let reply = self.module.sys_request(Action::Version, timeout, opts)?;
        reply
            .data()
            .and_then(|d| d.as_str())
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::InvalidResponse("version reply without data".into()))
    }

    /// Restart every unit on the module
    ///
    /// The module reloads its services, so this waits as long as a model setup.
    pub fn reset(&mut self, opts: CallOptions) -> Result<(), ProtocolError> {
        let timeout = self.module.timeouts.model_setup();
        self.module.sys_request(Action::Reset, timeout, opts).map(|_| ())
    }
}
