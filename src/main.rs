//! Example program driving the threaded inference engine
//!
//! Verifies the model weights exist, constructs the driver on CPU device 0,
//! submits one token-based chat completion, prints the first sampled token id
//! delivered over the stream channel, and stops the engine.

use std::path::Path;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use engine_driver::{Device, EngineConfig, EngineDriver, GenerationConfig, SimBackend};

const MODEL_PATH: &str = "models/sim-chat-v0.1";

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber for logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("engine_driver=info".parse().unwrap()))
        .init();

    if !Path::new(MODEL_PATH).exists() {
        eprintln!("Error: the compiled model weights are not at {MODEL_PATH}");
        std::process::exit(1);
    }

    info!("Starting engine driver v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::local(MODEL_PATH);
    let (mut driver, mut stream_rx) =
        match EngineDriver::construct(Box::new(SimBackend::new()), config, Device::cpu()).await {
            Ok(started) => started,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        };

    let request_id = format!("chatcmpl-{}", uuid::Uuid::new_v4().simple());
    let mut generation = GenerationConfig::default();
    generation.max_tokens = Some(20);
    generation.seed = Some(100);
    generation.stop_token_ids = vec![2];

    if let Err(e) = driver.chat_completion(vec![55027], generation, &request_id) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    // Print the first sampled token id of the first candidate group.
    match stream_rx.recv().await {
        Some(batch) => match batch.first().and_then(|output| output.first_token()) {
            Some(token) => println!("{token}"),
            None => println!("No token outputted"),
        },
        None => println!("No token outputted"),
    }

    if let Err(e) = driver.stop().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
