use anyhow::{Context, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::env;
use std::fs;

// Model paths from config.json when none are given on the command line
fn configured_models() -> Result<Vec<String>> {
    let content = fs::read_to_string("config.json").context("No model given and config.json not readable")?;
    let config: serde_json::Value = serde_json::from_str(&content)?;
    let models = &config["models"];
    Ok(["face_detector", "emotion_classifier"]
        .iter()
        .filter_map(|k| models[*k].as_str().map(str::to_string))
        .collect())
}

fn inspect(model_path: &str) -> Result<()> {
    println!("Inspecting model: {}", model_path);

    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level1)?
        .with_intra_threads(1)?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load {}", model_path))?;

    println!("--- Inputs ---");
    for (i, input) in session.inputs.iter().enumerate() {
        println!("#{}: {} {:?}", i, input.name, input.input_type);
    }

    println!("--- Outputs ---");
    for (i, output) in session.outputs.iter().enumerate() {
        println!("#{}: {} {:?}", i, output.name, output.output_type);
    }
    println!();
    Ok(())
}

fn main() -> Result<()> {
    let mut paths: Vec<String> = env::args().skip(1).collect();
    if paths.is_empty() {
        paths = configured_models()?;
    }
    if paths.is_empty() {
        println!("Usage: inspect_onnx [model.onnx ...]");
        return Ok(());
    }

    for p in &paths {
        if let Err(e) = inspect(p) {
            eprintln!("{:#}", e);
        }
    }
    Ok(())
}
