//! pneumo CLI: Grad-CAM overlays and predictions for chest X-rays.
//!
//! Every command prints exactly one JSON line on stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pneumo::core::backend::{ExplainBackend, NdArrayDevice};
use pneumo::core::Seed;
use pneumo::models::{
    default_model_path, save_model, CheckpointMetadata, ModelProvider, PneumoniaCnnConfig,
    PNEUMONIA_CNN_ARCH,
};
use pneumo::{
    generate_gradcam, load_model_with, predict, GradcamOutput, InitModelOutput, InspectOutput,
    PipelineConfig, PipelineError, Report,
};

#[derive(Parser)]
#[command(name = "pneumo")]
#[command(author, version)]
#[command(about = "Explain and run a chest X-ray pneumonia classifier")]
#[command(long_about = "pneumo: Grad-CAM heatmap overlays and predictions for a binary X-ray classifier.

Every command prints a single JSON line on stdout:
  {\"status\":\"success\", ...}   exit code 0
  {\"status\":\"error\",\"message\":\"...\"}   non-zero exit code

EXAMPLES:
  # Explain a prediction (writes scan_gradcam.png)
  pneumo gradcam --image scan.png

  # Explain another convolution layer with a stronger overlay
  pneumo gradcam --image scan.png --target conv2d_1 --alpha 0.6

  # Classify an image
  pneumo predict --image scan.png

  # List layer names and shapes of a model
  pneumo inspect --model model/best_cnn.json

  # Write a reference model with seeded weights
  pneumo init-model --output model/best_cnn.json --seed 7")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a Grad-CAM overlay for an image
    Gradcam {
        /// Input image (PNG or JPEG)
        #[arg(long, value_name = "PATH")]
        image: PathBuf,

        /// Output image; defaults to the input path with `_gradcam` before the extension
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,

        /// Name of the nested sub-network to replay
        #[arg(long, value_name = "NAME")]
        inner: Option<String>,

        /// Convolution layer to explain
        #[arg(long, value_name = "NAME")]
        target: Option<String>,

        /// Heatmap opacity in [0, 1]
        #[arg(long, value_name = "ALPHA")]
        alpha: Option<f32>,
    },
    /// Classify an image as PNEUMONIA or NORMAL
    Predict {
        /// Input image (PNG or JPEG)
        #[arg(long, value_name = "PATH")]
        image: PathBuf,

        #[command(flatten)]
        common: CommonArgs,

        /// Probability at or above which the image is PNEUMONIA
        #[arg(long, value_name = "P")]
        threshold: Option<f32>,
    },
    /// Print the layer tree of a model
    Inspect {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Write the reference CNN with seeded weights
    InitModel {
        /// Model file to write
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Random seed for the weights
        #[arg(long, default_value = "42", value_name = "SEED")]
        seed: u64,

        /// Square input size of the model
        #[arg(long, default_value = "224", value_name = "SIZE")]
        image_size: usize,
    },
}

/// Options shared by commands that load a model.
#[derive(clap::Args)]
struct CommonArgs {
    /// Model file; defaults to model/best_cnn.json next to the executable
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// JSON pipeline configuration; flags override its values
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Preprocessing size; defaults to the model input size
    #[arg(long, value_name = "SIZE")]
    image_size: Option<u32>,
}

impl CommonArgs {
    fn resolve(&self) -> pneumo::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(model) = &self.model {
            config = config.with_model_path(model);
        }
        if let Some(size) = self.image_size {
            config = config.with_image_size(size);
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                let message = e.to_string();
                let first = message.lines().next().unwrap_or("invalid arguments");
                let report: Report<()> = Report::error(first.trim_start_matches("error: "));
                println!("{}", report.to_json_line());
                return ExitCode::from(2);
            }
        },
    };

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("warning: {:#}", e);
    }

    match cli.command {
        Commands::Gradcam {
            image,
            output,
            common,
            inner,
            target,
            alpha,
        } => finish(handle_gradcam(&image, output.as_deref(), &common, inner, target, alpha)),
        Commands::Predict {
            image,
            common,
            threshold,
        } => finish(handle_predict(&image, &common, threshold)),
        Commands::Inspect { common } => finish(handle_inspect(&common)),
        Commands::InitModel {
            output,
            seed,
            image_size,
        } => finish(handle_init_model(&output, seed, image_size)),
    }
}

/// Install the stderr log subscriber at the level given by `-v`.
fn init_logging(verbose: u8) -> Result<()> {
    let log_level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .try_init()
        .context("failed to install log subscriber")
}

/// Print the single result line and map it to an exit code.
fn finish<T: Serialize>(result: pneumo::Result<T>) -> ExitCode {
    if let Err(e) = &result {
        tracing::error!(kind = e.kind(), "{}", e);
    }
    let report = Report::from_result(result);
    println!("{}", report.to_json_line());
    ExitCode::from(report.exit_code())
}

fn handle_gradcam(
    image: &Path,
    output: Option<&Path>,
    common: &CommonArgs,
    inner: Option<String>,
    target: Option<String>,
    alpha: Option<f32>,
) -> pneumo::Result<GradcamOutput> {
    let mut config = common.resolve()?;
    if let Some(inner) = inner {
        config = config.with_inner_subnetwork(inner);
    }
    if let Some(target) = target {
        config = config.with_target_layer(target);
    }
    if let Some(alpha) = alpha {
        config = config.with_alpha(alpha);
    }

    let written = generate_gradcam(image, output, &config)?;
    Ok(GradcamOutput {
        output_path: written.display().to_string(),
    })
}

fn handle_predict(
    image: &Path,
    common: &CommonArgs,
    threshold: Option<f32>,
) -> pneumo::Result<pneumo::Prediction> {
    let mut config = common.resolve()?;
    if let Some(threshold) = threshold {
        config = config.with_threshold(threshold);
    }
    predict(image, &config)
}

fn handle_inspect(common: &CommonArgs) -> pneumo::Result<InspectOutput> {
    let config = common.resolve()?;
    let model = load_model_with(ModelProvider::<ExplainBackend>::global(), &config)?;
    let model_path = config.model_path.unwrap_or_else(default_model_path);
    Ok(InspectOutput {
        model_path: model_path.display().to_string(),
        model: model.summary(),
    })
}

fn handle_init_model(
    output: &Path,
    seed: u64,
    image_size: usize,
) -> pneumo::Result<InitModelOutput> {
    if image_size == 0 {
        return Err(PipelineError::InvalidConfig("image_size must be positive".to_string()));
    }
    let device = NdArrayDevice::Cpu;
    let graph =
        PneumoniaCnnConfig::new(image_size).init::<ExplainBackend>(Seed::new(seed), &device)?;

    let meta = CheckpointMetadata::new(PNEUMONIA_CNN_ARCH).with_extra("seed", seed.to_string());
    save_model(&graph, output, Some(&meta))?;

    Ok(InitModelOutput {
        model_path: output.display().to_string(),
        params: graph.param_count(),
    })
}
