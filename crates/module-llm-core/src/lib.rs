//! # Module LLM Core Library
//!
//! Host-side SDK for driving an AI accelerator module over a serial link.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - JSON command building with firmware version awareness
//! - Request/reply correlation with fixed and streaming (idle) timeouts
//! - Serial and TCP transports
//! - Clients for the camera, kws, llm, vlm, depth_anything and sys units
//! - A simulated module for testing without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use module_llm_core::prelude::*;
//!
//! let config = ModuleConfig::load("module.json")?;
//! let mut module = ModuleLlm::open(&config)?;
//! module.refresh_version()?;
//!
//! let work_id = module.vlm().setup(&VlmSetupConfig::default(), CallOptions::new())?;
//! module.vlm().inference_and_wait_result(&work_id, "Describe the scene", |delta| {
//!     print!("{}", delta);
//! }, CallOptions::new())?;
//! ```

pub mod api;
pub mod config;
pub mod demo;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{
        ApiCamera, ApiDepthAnything, ApiKws, ApiLlm, ApiSys, ApiVlm, CallOptions,
        CameraSetupConfig, DepthAnythingSetupConfig, KwsLanguage, KwsSetupConfig, LlmSetupConfig,
        ModuleLlm, VlmSetupConfig,
    };
    pub use crate::config::{ModuleConfig, Timeouts, TransportSettings};
    pub use crate::demo::DemoModule;
    pub use crate::protocol::{
        ChannelTransport, Connection, ExtraParams, ProtocolError, ProtocolVersion, StreamSummary,
        Transport,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
