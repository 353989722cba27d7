//! Emotion AlexNet CLI
//!
//! Entry point for training the facial-emotion classifier, running the
//! old/young bias evaluation, classifying images and inspecting datasets.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use emotion_alexnet::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use emotion_alexnet::dataset::{class_counts, class_name, dataset_size, default_class_names};
use emotion_alexnet::inference::{run_bias_evaluation, Predictor};
use emotion_alexnet::training::run_training;
use emotion_alexnet::utils::logging::{init_logging, LogConfig};
use emotion_alexnet::utils::format_number;
use emotion_alexnet::TrainingConfig;

/// AlexNet facial-emotion classification with Burn
#[derive(Parser, Debug)]
#[command(name = "emotion_alexnet")]
#[command(version)]
#[command(about = "AlexNet facial-emotion classifier with an old/young bias evaluation", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error); overrides -v and -q
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the network from per-class image directories
    Train(TrainArgs),

    /// Run the old/young bias evaluation and write the result files
    Predict {
        /// Checkpoint directory
        #[arg(long, default_value = "ckpt-alexnet")]
        ckpt_path: PathBuf,

        /// Images of old subjects (label 1)
        #[arg(long, default_value = "/var/data/bias_data/image/test/test_old")]
        old_dir: PathBuf,

        /// Images of young subjects (label 0)
        #[arg(long, default_value = "/var/data/bias_data/image/test/test_young")]
        young_dir: PathBuf,

        /// Where test_results_two.txt and test_results_six.txt are written
        #[arg(short, long, default_value = "/var/data/bias_data/image/test")]
        output_dir: PathBuf,

        /// Images per forward pass
        #[arg(short, long, default_value = "64")]
        batch_size: usize,
    },

    /// Classify a single image or every image in a directory
    Classify {
        /// Path to input image or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Checkpoint directory
        #[arg(long, default_value = "ckpt-alexnet")]
        ckpt_path: PathBuf,

        /// Number of top classes to show
        #[arg(short = 'k', long, default_value = "3")]
        top_k: usize,

        /// Average over this many random crops instead of one center crop
        #[arg(long)]
        crops: Option<usize>,

        /// Random seed for crop positions
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Show per-class image counts of a training directory
    Stats {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "/var/data/bias_data/image/train")]
        data_dir: PathBuf,
    },
}

/// Flags override values from `--config`, which override defaults
#[derive(clap::Args, Debug)]
struct TrainArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    epochs: Option<usize>,
    #[arg(short, long)]
    batch_size: Option<usize>,
    #[arg(short, long)]
    learning_rate: Option<f64>,
    #[arg(long)]
    keep_prob: Option<f64>,
    #[arg(long)]
    momentum: Option<f64>,
    #[arg(long)]
    weight_decay: Option<f64>,
    /// Continue from the checkpoint in ckpt_path
    #[arg(long)]
    resume: bool,
    #[arg(long)]
    display_step: Option<usize>,
    #[arg(long)]
    test_step: Option<usize>,
    #[arg(long)]
    ckpt_path: Option<PathBuf>,
    #[arg(long)]
    summary_path: Option<PathBuf>,
    #[arg(long)]
    train_dir: Option<PathBuf>,
    #[arg(long)]
    eval_dir: Option<PathBuf>,
    /// Training set size; counted from train_dir when set to 0
    #[arg(long)]
    num_images: Option<usize>,
    #[arg(long)]
    valid_batch_size: Option<usize>,
    #[arg(long)]
    num_threads: Option<usize>,
    /// Comma-separated global steps at which the learning rate drops
    #[arg(long, value_delimiter = ',')]
    decay_steps: Option<Vec<usize>>,
    #[arg(long)]
    decay_factor: Option<f64>,
    #[arg(long)]
    image_size: Option<u32>,
    #[arg(long)]
    seed: Option<u64>,
}

impl TrainArgs {
    fn into_config(self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_toml_file(path)?,
            None => TrainingConfig::default(),
        };

        if let Some(value) = self.epochs {
            config.epochs = value;
        }
        if let Some(value) = self.batch_size {
            config.batch_size = value;
        }
        if let Some(value) = self.learning_rate {
            config.learning_rate = value;
        }
        if let Some(value) = self.keep_prob {
            config.keep_prob = value;
        }
        if let Some(value) = self.momentum {
            config.momentum = value;
        }
        if let Some(value) = self.weight_decay {
            config.weight_decay = value;
        }
        if let Some(value) = self.display_step {
            config.display_step = value;
        }
        if let Some(value) = self.test_step {
            config.test_step = value;
        }
        if let Some(value) = self.ckpt_path {
            config.ckpt_path = value;
        }
        if let Some(value) = self.summary_path {
            config.summary_path = value;
        }
        if let Some(value) = self.train_dir {
            config.train_dir = value;
        }
        if let Some(value) = self.eval_dir {
            config.eval_dir = value;
        }
        if let Some(value) = self.num_images {
            config.num_images = value;
        }
        if let Some(value) = self.valid_batch_size {
            config.valid_batch_size = value;
        }
        if let Some(value) = self.num_threads {
            config.num_threads = value;
        }
        if let Some(value) = self.decay_steps {
            config.decay_steps = value;
        }
        if let Some(value) = self.decay_factor {
            config.decay_factor = value;
        }
        if let Some(value) = self.image_size {
            config.image_size = value;
        }
        if let Some(value) = self.seed {
            config.seed = value;
        }
        if self.resume {
            config.resume = true;
        }

        if config.num_images == 0 {
            config.num_images = dataset_size(&config.train_dir)
                .with_context(|| format!("counting images in {:?}", config.train_dir))?;
            info!("Counted {} training images", config.num_images);
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_flags(cli.verbose, cli.quiet, cli.log_level.as_deref());

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train(args) => cmd_train(args)?,

        Commands::Predict {
            ckpt_path,
            old_dir,
            young_dir,
            output_dir,
            batch_size,
        } => cmd_predict(&ckpt_path, &old_dir, &young_dir, &output_dir, batch_size)?,

        Commands::Classify {
            input,
            ckpt_path,
            top_k,
            crops,
            seed,
        } => cmd_classify(&input, &ckpt_path, top_k, crops, seed)?,

        Commands::Stats { data_dir } => cmd_stats(&data_dir)?,
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════╗
 ║   😀 Emotion AlexNet                                         ║
 ║   Facial Emotion Classification with Burn + Rust             ║
 ╚══════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let config = args.into_config()?;
    println!("  🧠 Backend: {}", backend_name());

    let summary = run_training::<TrainingBackend>(&config, &default_device())
        .context("training failed")?;

    if let Some(acc) = summary.last_validation_accuracy {
        println!("  ✅ Last validation accuracy: {:.4}", acc);
    }
    println!("  🔢 Global step: {}", format_number(summary.global_step));
    Ok(())
}

fn load_predictor(ckpt_path: &Path) -> Result<Predictor<DefaultBackend>> {
    let predictor = Predictor::<DefaultBackend>::from_checkpoint(ckpt_path, &default_device())
        .with_context(|| format!("loading checkpoint from {:?}", ckpt_path))?;
    Ok(predictor)
}

fn cmd_predict(
    ckpt_path: &Path,
    old_dir: &Path,
    young_dir: &Path,
    output_dir: &Path,
    batch_size: usize,
) -> Result<()> {
    info!("Bias evaluation with checkpoint {:?}", ckpt_path);
    let predictor = load_predictor(ckpt_path)?.with_batch_size(batch_size);

    let summary = run_bias_evaluation(&predictor, old_dir, young_dir, output_dir)?;
    summary.print();
    Ok(())
}

fn cmd_classify(
    input: &Path,
    ckpt_path: &Path,
    top_k: usize,
    crops: Option<usize>,
    seed: u64,
) -> Result<()> {
    let predictor = load_predictor(ckpt_path)?;

    match crops {
        Some(k) => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let probs = predictor.multi_crop_predict(input, k, &mut rng)?;
            println!("{}", format!("Averaged over {} crops:", k).cyan().bold());
            for (idx, p) in probs.iter().enumerate() {
                println!("  {:12} {:.2}%", class_name(idx).unwrap_or("unknown"), p * 100.0);
            }
        }
        None => {
            for result in predictor.classify(input, top_k)? {
                println!("{}", result.display());
            }
        }
    }
    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    info!("Computing dataset statistics for: {:?}", data_dir);

    if !data_dir.exists() {
        anyhow::bail!("dataset directory not found: {:?}", data_dir);
    }

    let stats = class_counts(data_dir, &default_class_names())?;
    stats.print();
    println!(
        "\n  All files in class directories: {}",
        format_number(dataset_size(data_dir)?)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use emotion_alexnet::utils::logging::LogLevel;
    use tempfile::TempDir;

    #[test]
    fn test_stats_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        assert!(cmd_stats(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_log_flags() {
        let cli = Cli::try_parse_from(["emotion_alexnet", "-q", "stats"]).unwrap();
        let config = LogConfig::from_flags(cli.verbose, cli.quiet, cli.log_level.as_deref());
        assert_eq!(config.level, LogLevel::Error);

        let cli =
            Cli::try_parse_from(["emotion_alexnet", "stats", "--log-level", "warn"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("warn"));

        assert!(Cli::try_parse_from(["emotion_alexnet", "-v", "-q", "stats"]).is_err());
    }
}
