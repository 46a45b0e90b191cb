// Train a detector from a labeled set, then run it against one image
//
// cargo run --example train_and_detect -- trainingData.json to_test.jpg [object_detector.svm]
use marsupial::{load_training_records, AsyncBridge, BackendType, TrainerConfig};
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    marsupial::init()?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!(
            "Usage: {} <trainingData.json> <image> [detector output]",
            args[0]
        );
        std::process::exit(2);
    }
    let output = args
        .get(3)
        .cloned()
        .unwrap_or_else(|| "object_detector.svm".to_string());

    let records = load_training_records(&args[1])?;
    let boxes: usize = records.iter().map(|r| r.bounding_boxes.len()).sum();
    println!("Loaded {} images ({} boxes)", records.len(), boxes);

    let backend = BackendType::preferred();
    println!("Backend: {}", backend.name());

    let bridge = AsyncBridge::from_current(backend.create())?
        .with_trainer_config(TrainerConfig::default());

    let start = Instant::now();
    bridge.train_object_detector(records, &output).await?;
    println!("Trained {} in {:.2?}", output, start.elapsed());

    let start = Instant::now();
    let detections = bridge.detect_objects(&args[2], &output).await?;
    println!("Detection took {:.2?}", start.elapsed());

    println!("Found {} object(s):", detections.len());
    for d in &detections {
        let b = d.bbox;
        match d.confidence {
            Some(score) => println!(
                "  top={} left={} width={} height={} (score {:.3})",
                b.top, b.left, b.width, b.height, score
            ),
            None => println!(
                "  top={} left={} width={} height={}",
                b.top, b.left, b.width, b.height
            ),
        }
    }

    Ok(())
}
