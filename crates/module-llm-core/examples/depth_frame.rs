use module_llm_core::prelude::*;
use std::env;
use std::fs;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        println!("Usage: depth_frame <config.json> <input.jpg> <output.jpg>");
        return Ok(());
    }

    let config = ModuleConfig::load(&args[1])?;
    let jpeg = fs::read(&args[2])?;

    let mut module = ModuleLlm::open(&config)?;
    let work_id = module
        .depth_anything()
        .setup(&DepthAnythingSetupConfig::default(), CallOptions::new())?;
    println!("Sending {} bytes to {}", jpeg.len(), work_id);

    let depth = module
        .depth_anything()
        .estimate(&work_id, &jpeg, CallOptions::new())?;
    fs::write(&args[3], &depth)?;
    println!("Wrote {} bytes to {}", depth.len(), args[3]);

    module.depth_anything().exit(&work_id, CallOptions::new())?;
    Ok(())
}
