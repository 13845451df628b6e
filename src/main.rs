use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use maneuver_rs::callbacks::EarlyStopping;
use maneuver_rs::config::ManeuverConfig;
use maneuver_rs::data::generate_trajectories;
use maneuver_rs::model::ManeuverClassifier;
use maneuver_rs::strategy::build_strategy;
use maneuver_rs::trainer::Trainer;
use maneuver_rs::Result;

#[derive(Parser)]
#[command(name = "maneuver", version, about = "Flight-maneuver classification trainer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a configuration file without training
    Validate {
        /// Path to the YAML configuration
        config: PathBuf,
    },
    /// Train a maneuver classifier
    Train {
        /// Path to the YAML configuration
        config: PathBuf,
        /// Resume from the latest checkpoint in the checkpoint directory
        #[arg(long)]
        resume: bool,
    },
    /// Write a preset configuration file
    Init {
        /// Where to write the configuration
        output: PathBuf,
        /// Preset name: resnet-small, resnet-small-sgd, or plateau
        #[arg(long, default_value = "resnet-small")]
        preset: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Validate { config } => {
            let config = ManeuverConfig::from_file(&config)?;
            config.validate()?;
            println!("Configuration is valid");
            Ok(())
        }
        Commands::Train { config, resume } => {
            let config = ManeuverConfig::from_file(&config)?;
            config.validate()?;
            train(&config, resume)
        }
        Commands::Init { output, preset } => {
            let config = ManeuverConfig::from_preset(&preset)?;
            config.to_file(&output)?;
            println!("Wrote {preset} configuration to {}", output.display());
            Ok(())
        }
    }
}

fn train(config: &ManeuverConfig, resume: bool) -> Result<()> {
    let strategy = build_strategy(config.strategy)?;
    let mut trainer = Trainer::new(strategy, &config.trainer)
        .with_callback(Box::new(EarlyStopping::new("loss", 15)));

    let device = trainer.device().clone();
    let mut model = ManeuverClassifier::new(config, &device)?;
    let train = generate_trajectories(&config.dataset, config.dataset.num_train, config.seed, &device)?;
    let val = generate_trajectories(
        &config.dataset,
        config.dataset.num_valid,
        config.seed + 1,
        &device,
    )?;

    tracing::info!(
        trajectories = train.len(),
        validation = val.len(),
        "Starting training"
    );
    trainer.fit(&mut model, train, Some(val), resume)?;
    tracing::info!(
        epochs = trainer.state().current_epoch,
        steps = trainer.state().global_step,
        "Training complete"
    );
    Ok(())
}
