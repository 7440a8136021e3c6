//! Capability clients against the simulated module

use module_llm_core::api::kws::KWS_MODEL_ZH;
use module_llm_core::api::vlm::{VLM_HIGH_CAPABILITY_MODEL, VLM_LEGACY_MODEL};
use module_llm_core::demo::{DemoModule, ERR_UNKNOWN_WORK_ID};
use module_llm_core::prelude::*;
use module_llm_core::protocol::{Action, ManualClock};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;

fn module(demo: DemoModule) -> ModuleLlm<DemoModule, ManualClock> {
    ModuleLlm::with_clock(demo, ManualClock::new(), Timeouts::default())
}

fn version(s: &str) -> ProtocolVersion {
    ProtocolVersion::parse(s).unwrap()
}

fn last_data(module: &ModuleLlm<DemoModule, ManualClock>) -> Value {
    module
        .connection()
        .transport()
        .last_command()
        .and_then(|c| c.data.clone())
        .unwrap()
}

#[test]
fn test_llm_setup_inference_exit() {
    let mut module = module(DemoModule::with_seed(42));

    let work_id = module
        .llm()
        .setup(&LlmSetupConfig::default(), CallOptions::new())
        .unwrap();
    assert_eq!(work_id, "llm.1000");

    let mut answer = String::new();
    let summary = module
        .llm()
        .inference_and_wait_result(
            &work_id,
            "Hello there",
            |d| answer.push_str(d),
            CallOptions::new(),
        )
        .unwrap();
    assert_eq!(answer, "Hello there\n");
    assert!(summary.fragments >= 4);

    let exited = module.llm().exit(&work_id, CallOptions::new()).unwrap();
    assert_eq!(exited, work_id);
    assert!(module.connection().transport().active_units().is_empty());
}

#[test]
fn test_v1_0_setup_uses_scalar_input() {
    let mut module = module(DemoModule::with_seed(1));
    module
        .llm()
        .setup(&LlmSetupConfig::default(), CallOptions::new())
        .unwrap();

    let data = last_data(&module);
    assert_eq!(data["input"], json!("llm.utf-8.stream"));
    assert_eq!(data["model"], json!("qwen2.5-0.5B-prefill-20e"));
    assert_eq!(data["max_token_len"], json!(127));
}

#[test]
fn test_refresh_version_switches_to_list_input() {
    let mut module = module(DemoModule::with_seed(1).with_version(version("v1.6")));
    let reported = module.refresh_version().unwrap();
    assert_eq!(reported, version("v1.6"));

    let mut config = VlmSetupConfig::default();
    config.model = "something-else".into();
    module.vlm().setup(&config, CallOptions::new()).unwrap();

    let data = last_data(&module);
    assert_eq!(data["input"], json!(["vlm.utf-8.stream"]));
    assert_eq!(data["model"], json!(VLM_HIGH_CAPABILITY_MODEL));
}

#[test]
fn test_refresh_version_accepts_patch_level() {
    let mut module = module(DemoModule::with_seed(1).with_version(version("v1.6.1")));
    let reported = module.refresh_version().unwrap();
    assert_eq!(reported.to_string(), "v1.6.1");
    assert_eq!(module.version(), &reported);

    module
        .vlm()
        .setup(&VlmSetupConfig::default(), CallOptions::new())
        .unwrap();
    let data = last_data(&module);
    assert_eq!(data["input"], json!(["vlm.utf-8.stream"]));
    assert_eq!(data["model"], json!(VLM_HIGH_CAPABILITY_MODEL));
}

#[test]
fn test_vlm_on_v1_0_uses_legacy_model() {
    let mut module = module(DemoModule::with_seed(1));
    module
        .vlm()
        .setup(&VlmSetupConfig::default(), CallOptions::new())
        .unwrap();
    assert_eq!(last_data(&module)["model"], json!(VLM_LEGACY_MODEL));
}

#[test]
fn test_vlm_on_minor_version_between_keeps_configured_model() {
    let mut module = module(DemoModule::with_seed(1));
    module.set_version(version("v1.3"));
    let mut config = VlmSetupConfig::default();
    config.model = "custom-vlm".into();
    module.vlm().setup(&config, CallOptions::new()).unwrap();
    assert_eq!(last_data(&module)["model"], json!("custom-vlm"));
}

#[test]
fn test_vlm_raw_inference_sends_header_then_bytes() {
    let mut module = module(DemoModule::with_seed(3));
    let work_id = module
        .vlm()
        .setup(&VlmSetupConfig::default(), CallOptions::new())
        .unwrap();

    let jpeg = vec![0xffu8; 321];
    let mut answer = String::new();
    module
        .vlm()
        .inference_raw_and_wait_result(&work_id, &jpeg, |d| answer.push_str(d), CallOptions::new())
        .unwrap();

    assert_eq!(answer, "image of 321 bytes\n");
    let demo = module.connection().transport();
    assert_eq!(demo.raw_bytes_received(), 321);
    let header = demo.last_command().unwrap();
    assert_eq!(header.raw_len, Some(321));
    assert_eq!(header.object.as_deref(), Some("cv.jpeg.base64"));
    assert_eq!(header.request_id, "vlm_inference");
}

#[test]
fn test_depth_anything_round_trips_frame() {
    let mut module = module(DemoModule::with_seed(9));
    let work_id = module
        .depth_anything()
        .setup(&DepthAnythingSetupConfig::default(), CallOptions::new())
        .unwrap();
    assert_eq!(work_id, "depth_anything.1000");

    let jpeg: Vec<u8> = (0..=255u8).collect();
    let depth = module
        .depth_anything()
        .estimate(&work_id, &jpeg, CallOptions::new())
        .unwrap();
    assert_eq!(depth, jpeg);
}

#[test]
fn test_kws_chinese_forces_model() {
    let mut module = module(DemoModule::with_seed(1));
    let config = KwsSetupConfig {
        kws: "你好你好".into(),
        language: KwsLanguage::ZhCn,
        ..Default::default()
    };
    module.kws().setup(&config, CallOptions::new()).unwrap();

    let data = last_data(&module);
    assert_eq!(data["model"], json!(KWS_MODEL_ZH));
    assert_eq!(data["kws"], json!("你好你好"));
}

#[test]
fn test_camera_input_stays_scalar() {
    let mut module = module(DemoModule::with_seed(1));
    module.set_version(version("v1.6"));
    module
        .camera()
        .setup(&CameraSetupConfig::default(), CallOptions::new())
        .unwrap();

    let data = last_data(&module);
    assert_eq!(data["input"], json!("/dev/video0"));
    assert_eq!(data["frame_width"], json!(320));
    assert_eq!(data["enoutput"], json!(false));
}

#[test]
fn test_extra_params_override_declared_fields() {
    let mut module = module(DemoModule::with_seed(1));
    let mut config = LlmSetupConfig::default();
    config
        .extra_params
        .set_bool("enoutput", false)
        .set_int("max_token_len", 1023)
        .set_float("temperature", 0.7)
        .set_str("model", "from-extras");
    module.llm().setup(&config, CallOptions::new()).unwrap();

    let data = last_data(&module);
    assert_eq!(data["enoutput"], json!(false));
    assert_eq!(data["max_token_len"], json!(1023));
    assert_eq!(data["temperature"], json!(0.7));
    assert_eq!(data["model"], json!("from-extras"));
}

#[test]
fn test_custom_request_id_is_used() {
    let mut module = module(DemoModule::with_seed(1));
    module
        .kws()
        .setup(&KwsSetupConfig::default(), CallOptions::new().request_id("wake_1"))
        .unwrap();
    let cmd = module.connection().transport().last_command().unwrap();
    assert_eq!(cmd.request_id, "wake_1");
    assert_eq!(cmd.action, Action::Setup);
}

#[test]
fn test_exit_unknown_work_id_is_module_error() {
    let mut module = module(DemoModule::with_seed(1));
    let err = module.llm().exit("llm.4242", CallOptions::new()).unwrap_err();
    match err {
        ProtocolError::ModuleError { code, .. } => assert_eq!(code, ERR_UNKNOWN_WORK_ID),
        other => panic!("expected module error, got {:?}", other),
    }
}

#[test]
fn test_silent_module_times_out() {
    let mut module = module(DemoModule::with_seed(1).silent());
    let err = module
        .llm()
        .setup(
            &LlmSetupConfig::default(),
            CallOptions::new().timeout(Duration::from_millis(200)),
        )
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(!module.check_connection());
}

#[test]
fn test_sys_ping_and_reset() {
    let mut module = module(DemoModule::with_seed(1));
    assert!(module.check_connection());

    module
        .llm()
        .setup(&LlmSetupConfig::default(), CallOptions::new())
        .unwrap();
    module.sys().reset(CallOptions::new()).unwrap();
    assert!(module.connection().transport().active_units().is_empty());
}

#[test]
fn test_fire_and_forget_inference_leaves_reply_buffered() {
    let mut module = module(DemoModule::with_seed(5));
    let work_id = module
        .llm()
        .setup(&LlmSetupConfig::default(), CallOptions::new())
        .unwrap();
    module
        .llm()
        .inference(&work_id, "hi", CallOptions::new())
        .unwrap();
    assert!(module.connection().transport().pending_replies() > 0);
}
