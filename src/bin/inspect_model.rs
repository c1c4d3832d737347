use anyhow::Result;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::env;

use emotune::classifier::{EmotionClassifier, LabelVocabulary, OnnxScorer};
use emotune::config::AppConfig;

fn main() -> Result<()> {
    let config_path = env::args().nth(1).unwrap_or_else(|| AppConfig::PATH.to_string());
    let config = AppConfig::load_from(&config_path)?;
    let model_path = &config.models.emotion_model_path;
    println!("Inspecting model: {}", model_path);

    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level1)?
        .with_intra_threads(1)?
        .commit_from_file(model_path)?;

    println!("\n--- Inputs ---");
    for (i, input) in session.inputs.iter().enumerate() {
        println!("#{}: Name: {}", i, input.name);
        println!("    Type: {:?}", input.input_type);
    }

    println!("\n--- Outputs ---");
    for (i, output) in session.outputs.iter().enumerate() {
        println!("#{}: Name: {}", i, output.name);
        println!("    Type: {:?}", output.output_type);
    }
    drop(session);

    let layout = config.features;
    println!("\n--- Feature layout ---");
    println!(
        "face {} pts (ref {}), hands {} pts (ref {}) -> {} values",
        layout.face_points, layout.face_reference, layout.hand_points, layout.hand_reference, layout.len()
    );

    let labels = LabelVocabulary::load_or_default(&config.models.labels_path, config.models.allow_default_labels)?;
    println!("\n--- Labels ({}) ---", labels.len());
    for (i, label) in labels.iter().enumerate() {
        println!("#{}: {}", i, label);
    }

    let scorer = OnnxScorer::new(model_path, 1)?;
    match EmotionClassifier::new(Box::new(scorer), labels, layout.len()) {
        Ok(_) => println!("\nSelf-check passed."),
        Err(e) => println!("\nSelf-check FAILED: {}", e),
    }

    Ok(())
}
