use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::config::Config;
use clap::{Args, Parser, Subcommand, ValueEnum};
use segmesh_model::{save_segresnet, LoadStrategy};
use segmesh_pipeline::config::{MeshFormat, Precision};
use segmesh_pipeline::device::CpuBackend;
use segmesh_pipeline::{locator_from_config, PipelineConfig, RecordStore, Runtime};
use tracing::info;

#[derive(Parser)]
#[command(name = "segmesh")]
#[command(about = "Segment multi-modal MRI volumes into per-class surface meshes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a volume under the media root and register it
    Upload {
        /// Patient or display name the volume belongs to
        name: String,
        /// Modality tag (flair, t1, t1ce, t2)
        modality: String,
        /// NIfTI file to store
        file: PathBuf,
        #[command(flatten)]
        settings: Settings,
    },

    /// Run the pipeline for one or more patients
    Infer {
        /// Patient identifiers
        #[arg(required = true)]
        patient_ids: Vec<String>,
        #[command(flatten)]
        settings: Settings,
    },

    /// Show the volumes a patient resolves to
    Locate {
        patient_id: String,
        #[command(flatten)]
        settings: Settings,
    },

    /// Write a randomly initialised model to a weights file
    InitWeights {
        /// Destination; `.mpk` uses the named recorder, anything else raw bytes
        #[arg(default_value = "model.mpk")]
        output: PathBuf,
        #[command(flatten)]
        settings: Settings,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        settings: Settings,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PrecisionArg {
    Full,
    Mixed,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Binary,
    Ascii,
}

/// Configuration file plus per-field overrides.
#[derive(Args)]
struct Settings {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    media_root: Option<PathBuf>,

    #[arg(long)]
    weights: Option<PathBuf>,

    #[arg(long, value_enum)]
    precision: Option<PrecisionArg>,

    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Write mesh vertices in physical coordinates
    #[arg(long)]
    world_coordinates: bool,

    /// Abort inference after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl Settings {
    fn resolve(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .map_err(|e| anyhow::anyhow!("{e}"))
                .with_context(|| format!("Failed to load configuration {}", path.display()))?,
            None => PipelineConfig::new(),
        };

        if let Some(root) = &self.media_root {
            config.media_root = root.clone();
        }
        if let Some(weights) = &self.weights {
            config.weights_path = weights.clone();
        }
        if let Some(precision) = self.precision {
            config.precision = match precision {
                PrecisionArg::Full => Precision::Full,
                PrecisionArg::Mixed => Precision::Mixed,
            };
        }
        if let Some(format) = self.format {
            config.mesh.format = match format {
                FormatArg::Binary => MeshFormat::Binary,
                FormatArg::Ascii => MeshFormat::Ascii,
            };
        }
        if self.world_coordinates {
            config.mesh.world_coordinates = true;
        }
        if self.timeout.is_some() {
            config.timeout_secs = self.timeout;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Upload {
            name,
            modality,
            file,
            settings,
        } => upload(&name, &modality, &file, &settings.resolve()?),
        Commands::Infer { patient_ids, settings } => infer(&patient_ids, settings.resolve()?),
        Commands::Locate { patient_id, settings } => locate(&patient_id, &settings.resolve()?),
        Commands::InitWeights { output, settings } => init_weights(&output, &settings.resolve()?),
        Commands::Config { settings } => {
            println!("{}", serde_json::to_string_pretty(&settings.resolve()?)?);
            Ok(())
        }
    }
}

fn upload(name: &str, modality: &str, file: &Path, config: &PipelineConfig) -> Result<()> {
    let contents = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let record = RecordStore::new(&config.media_root).upload(name, modality, &contents)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn infer(patient_ids: &[String], config: PipelineConfig) -> Result<()> {
    let runtime = Runtime::load(config)?;
    info!(target = ?runtime.target(), patients = patient_ids.len(), "runtime ready");

    let mut failures = 0;
    for id in patient_ids {
        let response = runtime.trigger(id);
        if !response.is_success() {
            failures += 1;
        }
        println!("{}", serde_json::to_string(&response)?);
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} patients failed", patient_ids.len());
    }
    Ok(())
}

fn locate(patient_id: &str, config: &PipelineConfig) -> Result<()> {
    let set = locator_from_config(config).resolve(patient_id)?;
    for (modality, path) in set.iter() {
        println!("{modality}\t{}", path.display());
    }
    Ok(())
}

fn init_weights(output: &Path, config: &PipelineConfig) -> Result<()> {
    let strategy = match output.extension().and_then(|e| e.to_str()) {
        Some("mpk") => LoadStrategy::NamedFile,
        _ => LoadStrategy::BinaryStream,
    };
    let device = Default::default();
    let model = config.model.init::<CpuBackend>(&device);
    let path = save_segresnet(model, output, strategy)?;
    info!(path = %path.display(), %strategy, "wrote initial weights");
    Ok(())
}
