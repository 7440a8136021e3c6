use module_llm_core::prelude::*;
use std::env;
use std::io::{self, BufRead, Write};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: llm_chat <config.json | --demo>");
        return Ok(());
    }

    if args[1] == "--demo" {
        let mut module = ModuleLlm::new(DemoModule::new(), Timeouts::default());
        return chat(&mut module);
    }

    let config = ModuleConfig::load(&args[1])?;
    let mut module = ModuleLlm::open(&config)?;
    if config.protocol_version.is_none() {
        let version = module.refresh_version()?;
        println!("Module protocol {}", version);
    }
    chat(&mut module)
}

fn chat<T: Transport>(module: &mut ModuleLlm<T>) -> anyhow::Result<()> {
    let config = LlmSetupConfig {
        prompt: "You are a helpful assistant.".into(),
        ..Default::default()
    };
    let work_id = module.llm().setup(&config, CallOptions::new())?;
    println!("LLM ready as {}. Empty line quits.", work_id);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            break;
        }
        let summary = module.llm().inference_and_wait_result(
            &work_id,
            &line,
            |delta| {
                print!("{}", delta);
                let _ = io::stdout().flush();
            },
            CallOptions::unique("llm_inference"),
        );
        if let Err(e) = summary {
            eprintln!("Inference failed: {}", e);
        }
    }

    module.llm().exit(&work_id, CallOptions::new())?;
    Ok(())
}
