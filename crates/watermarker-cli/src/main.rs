//! Command-line interface for batch watermarking

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use watermarker_core::{
    init, version, AppConfig, BatchEntry, BatchOrchestrator, Compositor, ConfigManager, FontRasterizer,
    GlyphRasterizer, ImageCrateCodec, ImageFormat, SourceImage, WatermarkOptions, WatermarkSpec,
};

#[derive(Parser)]
#[command(name = "watermarker")]
#[command(about = "Batch watermarking of images with text and logo overlays")]
#[command(version = version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Watermark inputs shared by the processing commands
#[derive(clap::Args)]
struct WatermarkArgs {
    /// JSON file with watermark options (camelCase keys)
    #[arg(long)]
    options: Option<PathBuf>,

    /// Logo image used by the logo pass
    #[arg(long)]
    logo: Option<PathBuf>,

    /// Font file for the text pass, overrides font discovery
    #[arg(long)]
    font: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watermark every image in a directory
    Batch {
        /// Input directory
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output_dir: PathBuf,

        #[command(flatten)]
        watermark: WatermarkArgs,

        /// Write a JSON report of the batch to this file
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Watermark a single image
    Watermark {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        watermark: WatermarkArgs,
    },

    /// Show version, supported formats and font availability
    Info,
}

fn load_config(path: Option<&Path>) -> AppConfig {
    let manager = match path {
        Some(path) => ConfigManager::with_path(path.to_path_buf()),
        None => ConfigManager::new(),
    };
    match manager {
        Ok(manager) => manager.config().clone(),
        Err(e) => {
            eprintln!("Warning: {}; using default configuration", e);
            AppConfig::default()
        }
    }
}

fn load_font(font: Option<&Path>, config: &AppConfig) -> Result<Option<FontRasterizer>> {
    match font {
        Some(path) => {
            let rasterizer = FontRasterizer::from_file(path)
                .with_context(|| format!("Failed to load font {}", path.display()))?;
            Ok(Some(rasterizer))
        }
        None => Ok(FontRasterizer::discover(&config.fonts)),
    }
}

fn build_spec(args: &WatermarkArgs) -> Result<WatermarkSpec> {
    let options = match &args.options {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read options {}", path.display()))?;
            WatermarkOptions::from_json(&json)
                .with_context(|| format!("Invalid watermark options in {}", path.display()))?
        }
        None => WatermarkOptions::default(),
    };

    let logo = match &args.logo {
        Some(path) => {
            let bytes = std::fs::read(path).with_context(|| format!("Failed to read logo {}", path.display()))?;
            Some(Arc::<[u8]>::from(bytes))
        }
        None => None,
    };

    Ok(WatermarkSpec::from_options(&options, logo))
}

fn build_orchestrator(args: &WatermarkArgs, config: &AppConfig) -> Result<BatchOrchestrator> {
    let glyphs = load_font(args.font.as_deref(), config)?.map(|f| Arc::new(f) as Arc<dyn GlyphRasterizer>);
    if glyphs.is_none() {
        warn!("No font available, text watermarks will be skipped");
    }

    let orchestrator = BatchOrchestrator::new(
        Arc::new(ImageCrateCodec::new()),
        Compositor::new(glyphs),
        config.processing.clone(),
    );

    let token = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current image");
            token.cancel();
        }
    });

    Ok(orchestrator)
}

fn source_from_path(path: &Path) -> Result<SourceImage> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mut source = SourceImage::new(name, bytes);
    if let Some(format) = ImageFormat::from_extension(path) {
        source = source.with_mime(format.mime_type());
    }
    Ok(source)
}

/// Image files directly inside `dir`, sorted by name
fn collect_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && ImageFormat::from_extension(&path).is_some() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

async fn run_batch_command(
    config: &AppConfig,
    input_dir: &Path,
    output_dir: &Path,
    args: &WatermarkArgs,
    summary_path: Option<&Path>,
) -> Result<()> {
    let spec = build_spec(args)?;
    let orchestrator = build_orchestrator(args, config)?;

    let inputs = collect_inputs(input_dir)?;
    if inputs.is_empty() {
        println!("No images found in {}", input_dir.display());
        return Ok(());
    }
    let sources = inputs
        .iter()
        .map(|p| source_from_path(p))
        .collect::<Result<Vec<_>>>()?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let result = orchestrator.run_batch(sources, &spec).await;

    for entry in &result.entries {
        match entry {
            BatchEntry::Succeeded { output_name, bytes, .. } => {
                let path = output_dir.join(output_name);
                std::fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Wrote {}", path.display());
            }
            BatchEntry::Failed { name, error_type, message } => {
                error!("{} failed ({}): {}", name, error_type, message);
                println!("  FAILED {}: {}", name, message);
            }
        }
    }

    let summary = result.summary();
    println!(
        "Processed {} images: {} succeeded, {} failed in {} ms",
        summary.total, summary.succeeded, summary.failed, summary.duration_ms
    );

    if let Some(path) = summary_path {
        let report = serde_json::json!({
            "summary": summary,
            "entries": result.entries,
        });
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write summary {}", path.display()))?;
    }

    Ok(())
}

async fn run_watermark_command(config: &AppConfig, input: &Path, output: &Path, args: &WatermarkArgs) -> Result<()> {
    let spec = build_spec(args)?;
    let orchestrator = build_orchestrator(args, config)?;
    let source = source_from_path(input)?;

    let result = orchestrator.run_batch(vec![source], &spec).await;
    match result.entries.into_iter().next() {
        Some(BatchEntry::Succeeded { bytes, format, .. }) => {
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(output, &bytes).with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Watermarked {} -> {} ({:?})", input.display(), output.display(), format);
            Ok(())
        }
        Some(BatchEntry::Failed { message, .. }) => bail!("Failed to watermark {}: {}", input.display(), message),
        None => bail!("No result produced for {}", input.display()),
    }
}

fn print_info(config: &AppConfig) {
    println!("Watermarker v{}", version());
    println!("Batch text and logo watermarking");
    println!("\nSupported formats:");
    for format in ImageFormat::ALL {
        println!("  {:<5} {}", format.extension(), format.mime_type());
    }
    println!("\nFont:");
    match FontRasterizer::discover(&config.fonts).and_then(|f| f.path().map(Path::to_path_buf)) {
        Some(path) => println!("  {}", path.display()),
        None => println!("  none found (text watermarks disabled)"),
    }
    println!("\nPlatform: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref());
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    let _guard = init(&config.logging)?;

    info!("Watermarker CLI v{} starting", version());

    match cli.command {
        Commands::Batch {
            input_dir,
            output_dir,
            watermark,
            summary,
        } => {
            info!("Batch watermarking from {} to {}", input_dir.display(), output_dir.display());
            run_batch_command(&config, &input_dir, &output_dir, &watermark, summary.as_deref()).await?;
        }

        Commands::Watermark { input, output, watermark } => {
            info!("Watermarking {} to {}", input.display(), output.display());
            run_watermark_command(&config, &input, &output, &watermark).await?;
        }

        Commands::Info => print_info(&config),
    }

    Ok(())
}
