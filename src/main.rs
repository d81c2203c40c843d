use bytes::Bytes;
use logokit::config::LogoKitConfig;
use logokit::pipeline::Derivative;
use logokit::transform::params::TransformOptions;
use logokit::LogoKit;
use serde_json::{json, Value};

const USAGE: &str = "usage: logokit [--upload] [--options <query>] <image>...";
const DEFAULT_LOG_FILTER: &str = "logokit=debug";

/// Processes logo files through the optimize, thumbnail and responsive
/// pipelines and prints one JSON summary line per file.
///
/// # Configuration
/// - `LOGOKIT_CONFIG`: path to a JSON config file (defaults otherwise)
/// - `LOGOKIT_CACHE_DIR`, `LOGOKIT_REDIS_URL`, ...: see `LogoKitConfig::load`
/// - `RUST_LOG`: logging verbosity (default: "logokit=debug")
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut upload = false;
    let mut options = TransformOptions::default();
    let mut files = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--upload" => upload = true,
            "--options" => {
                let query = args.next().ok_or(USAGE)?;
                options = query.parse()?;
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            _ => files.push(arg),
        }
    }
    if files.is_empty() {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    }

    let cfg = LogoKitConfig::load()?;
    let kit = LogoKit::from_config(&cfg)?;
    tracing::info!(files = files.len(), upload, "Starting LogoKit");

    let mut failed = false;
    for file in &files {
        match process(&kit, file, &options, upload).await {
            Ok(summary) => println!("{}", summary),
            Err(e) => {
                failed = true;
                tracing::error!(file = %file, error = %e, "Failed to process image");
                println!("{}", json!({ "file": file, "error": e.to_string() }));
            }
        }
    }

    tracing::info!(metrics = ?kit.metrics(), "Done");
    if failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn process(
    kit: &LogoKit,
    file: &str,
    options: &TransformOptions,
    upload: bool,
) -> Result<Value, Box<dyn std::error::Error>> {
    let source = Bytes::from(tokio::fs::read(file).await?);

    let optimized = kit.optimize_buffer(source.clone(), options, upload).await?;
    let thumbnail = kit.generate_thumbnail(source.clone(), options, upload).await?;
    let responsive = kit.generate_responsive_images(source, options, upload).await?;

    Ok(json!({
        "file": file,
        "optimized": describe(&optimized),
        "thumbnail": describe(&thumbnail),
        "responsive": responsive.iter().map(describe).collect::<Vec<_>>(),
    }))
}

fn describe(d: &Derivative) -> Value {
    json!({
        "width": d.variant.width,
        "height": d.variant.height,
        "format": d.variant.format,
        "sizeBytes": d.variant.size_bytes,
        "cacheKey": d.cache_key,
        "fromCache": d.from_cache,
        "remote": d.remote,
    })
}
