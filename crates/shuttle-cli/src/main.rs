use std::path::Path;
use std::sync::Arc;

use shuttle_core::app::RuntimeBuilder;
use shuttle_core::config::ShuttleConfig;
use shuttle_core::domain::Artifact;
use shuttle_core::impls::InMemoryObjectStore;
use shuttle_core::logging;
use tokio::fs;
use tracing::info;

type DemoResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// S3 descriptor in the same JSON shape the workflow controller hands out.
const DESCRIPTOR: &str = r#"{
    "name": "run-output",
    "s3": {
        "bucket": "demo",
        "key": "runs/42/",
        "credentials": {
            "accessKeyId": "AKIDDEMO",
            "secretAccessKey": "demo-secret"
        }
    }
}"#;

async fn write_scratch(root: &Path) -> DemoResult<()> {
    fs::create_dir_all(root.join("sub")).await?;
    fs::write(root.join("a.txt"), "hello").await?;
    fs::write(root.join("sub").join("b.txt"), "world").await?;
    Ok(())
}

async fn run(scratch: &Path) -> DemoResult<()> {
    // (A) 設定とログ
    let cfg = ShuttleConfig::load()?;
    logging::init_with_level(&cfg.log_level);

    // (B) in-memory store を factory にして runtime を組み立てる
    let store = InMemoryObjectStore::new();
    let runtime = RuntimeBuilder::from_config(&cfg, Arc::new(store.clone()))?.build()?;
    let artifact = Artifact::from_json(DESCRIPTOR)?;

    // (C) Save: scratch directory -> runs/42/
    let outputs = scratch.join("outputs");
    write_scratch(&outputs).await?;
    let saved = runtime.save(&outputs, &artifact).await?;
    println!("saved: {}", serde_json::to_string(&saved)?);
    for key in store.keys("demo") {
        println!("  s3://demo/{key}");
    }

    // (D) Load: runs/42/ -> fresh directory
    let restored = scratch.join("restored");
    let loaded = runtime.load(&artifact, &restored).await?;
    println!("loaded: {}", serde_json::to_string(&loaded)?);

    let a = fs::read_to_string(restored.join("a.txt")).await?;
    let b = fs::read_to_string(restored.join("sub").join("b.txt")).await?;
    info!(a = %a, b = %b, "restored contents");
    Ok(())
}

#[tokio::main]
async fn main() -> DemoResult<()> {
    let scratch = std::env::temp_dir().join(format!("shuttle-demo-{}", std::process::id()));
    let result = run(&scratch).await;

    // 片付けは成否に関わらず
    if let Err(e) = fs::remove_dir_all(&scratch).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            eprintln!("failed to remove {}: {e}", scratch.display());
        }
    }
    result
}
