use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use futures_util::stream;
use rayon::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mosaic_guard::{
    decode_file, is_supported_image, Config, Discovered, HttpImageDecoder, MosaicEngine,
    MosaicState, PixelClassifier,
};

#[derive(Parser)]
#[command(
    name = "mosaic-guard",
    about = "Obscure images unless their color profile looks safe",
    version,
    after_help = "Ratios are the share of pixels inside the configured color clusters.\n\
                  Images at or above the threshold stay obscured."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    options: Options,
}

#[derive(Args)]
struct Options {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Reveal threshold in percent (overrides the configuration file)
    #[arg(short, long, global = true)]
    threshold: Option<f64>,

    /// Minimum width and height in pixels (overrides the configuration file)
    #[arg(long, global = true)]
    min_dimension: Option<u32>,

    /// Allowed image host, repeatable (replaces the configured list)
    #[arg(long = "allow", global = true)]
    allow: Vec<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch and judge remote images as the engine would on a page
    Scan {
        /// Image URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Classify local image files or directories
    Classify {
        /// Image files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

/// One line of output.
struct Verdict {
    name: String,
    status: String,
    failed: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.options);

    let config = match build_config(&cli.options) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let verdicts = match cli.command {
        Command::Scan { urls } => scan(config, urls).await,
        Command::Classify { inputs } => classify(&config, &inputs),
    };

    let mut failed = 0u32;
    for verdict in &verdicts {
        if verdict.failed {
            failed += 1;
            eprintln!("[FAIL] {}: {}", verdict.name, verdict.status);
        } else if !cli.options.quiet {
            println!("{}: {}", verdict.name, verdict.status);
        }
    }

    if verdicts.len() > 1 && !cli.options.quiet {
        eprintln!();
        eprint!("[Summary] Judged: {}", verdicts.len());
        if failed > 0 {
            eprint!(", Failed: {failed}");
        }
        eprintln!();
    }

    if failed > 0 {
        process::exit(1);
    }
}

fn init_logging(options: &Options) {
    let default = if options.verbose {
        "mosaic_guard=debug"
    } else if options.quiet {
        "mosaic_guard=error"
    } else {
        "mosaic_guard=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}

fn build_config(options: &Options) -> mosaic_guard::Result<Config> {
    let mut config = match &options.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(threshold) = options.threshold {
        config.threshold = threshold;
    }
    if let Some(min_dimension) = options.min_dimension {
        config.min_dimension = min_dimension;
    }
    if !options.allow.is_empty() {
        config.allowed_sources.clone_from(&options.allow);
    }
    config.validate()?;
    Ok(config)
}

async fn scan(config: Config, urls: Vec<String>) -> Vec<Verdict> {
    let decoder = match HttpImageDecoder::new() {
        Ok(decoder) => decoder,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize HTTP client: {e}");
            process::exit(1);
        }
    };
    let engine = match MosaicEngine::new(config, decoder) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize engine: {e}");
            process::exit(1);
        }
    };

    // The URL doubles as the identity, so repeated URLs are judged once.
    let feed = stream::iter(urls.into_iter().map(|url| Discovered::image(url.clone(), url)));
    engine.run(feed).await;

    engine
        .snapshot()
        .into_iter()
        .map(|candidate| {
            let failed = candidate.state == MosaicState::Error;
            let status = match (&candidate.reason, failed) {
                (Some(reason), true) => reason.to_string(),
                _ => candidate.status(),
            };
            Verdict {
                name: candidate.id.to_string(),
                status,
                failed,
            }
        })
        .collect()
}

fn classify(config: &Config, inputs: &[PathBuf]) -> Vec<Verdict> {
    let files: Vec<PathBuf> = inputs.iter().flat_map(|p| expand(p)).collect();
    let classifier = PixelClassifier::new(config.color_clusters.clone());

    files
        .par_iter()
        .map(|path| classify_file(config, &classifier, path))
        .collect()
}

fn classify_file(config: &Config, classifier: &PixelClassifier, path: &Path) -> Verdict {
    let (status, failed) = match decode_file(path) {
        Err(e) => (format!("load_error: {e}"), true),
        Ok(decoded)
            if decoded.width < config.min_dimension || decoded.height < config.min_dimension =>
        {
            ("ignored_small".to_string(), false)
        }
        Ok(decoded) => match classifier.classify(&decoded.pixels, decoded.width, decoded.height) {
            Ok(result) if result.is_below(config.threshold) => {
                (format!("unmosaiced ({:.1}%)", result.ratio), false)
            }
            Ok(result) => (format!("mosaiced ({:.1}%)", result.ratio), false),
            Err(e) => (format!("read_error: {e}"), true),
        },
    };
    Verdict {
        name: path.display().to_string(),
        status,
        failed,
    }
}

/// A file as-is, or the supported images directly inside a directory.
fn expand(path: &Path) -> Vec<PathBuf> {
    if !path.is_dir() {
        return vec![path.to_path_buf()];
    }
    match std::fs::read_dir(path) {
        Ok(rd) => {
            let mut files: Vec<PathBuf> = rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| is_supported_image(p))
                .collect();
            files.sort();
            files
        }
        Err(e) => {
            eprintln!("Error: Failed to read directory {}: {e}", path.display());
            Vec::new()
        }
    }
}
