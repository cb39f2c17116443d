use anyhow::Result;
use clap::{CommandFactory, Parser};
use eegsync::app::{RecordOptions, run_record_command};
use eegsync::cli::{Cli, Commands, ConfigAction};
use eegsync::config::Config;
use eegsync::diagnostics::check_setup;
use eegsync::markers::MarkerSchedule;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref())?;
            let options = RecordOptions {
                video: cli.video,
                no_video: cli.no_video,
                markers: cli.markers,
                output: cli.output,
                output_dir: cli.output_dir,
                subject: cli.subject,
                countdown: cli.countdown,
                device: cli.device,
                serial_port: cli.serial_port,
                sample_rate: cli.sample_rate,
                summary_json: cli.summary_json,
                quiet: cli.quiet,
                verbosity: cli.verbose,
            };
            run_record_command(config, options).await?;
        }
        Some(Commands::Markers { path, limit }) => {
            let config = load_config(cli.config.as_deref())?;
            let path = path.unwrap_or(config.markers.path);
            show_markers(&path, limit)?;
        }
        Some(Commands::Check) => {
            let config = load_config(cli.config.as_deref())?;
            if !check_setup(&config) {
                std::process::exit(1);
            }
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "eegsync", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/eegsync/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

/// Print a marker schedule.
fn show_markers(path: &Path, limit: usize) -> Result<()> {
    let schedule = MarkerSchedule::load(path)?;
    if schedule.is_empty() {
        println!("{} contains no markers", path.display());
        return Ok(());
    }
    println!(
        "{} markers over {:.1}s in {}",
        schedule.len().green(),
        schedule.span_seconds(),
        path.display()
    );
    print!("{}", schedule.preview(limit));
    Ok(())
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            let exists = if config_path.exists() {
                "exists".green().to_string()
            } else {
                "not created".dimmed().to_string()
            };
            println!("{} ({})", config_path.display(), exists);
        }
    }
    Ok(())
}
