//! damage-intake CLI: assess a home damage claim from photos and a description.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use damage_intake::config::{self, IntakeConfig};
use damage_intake::evidence::{RawImage, Submission, check_upload_types};
use damage_intake::llm::{OllamaClient, has_model};
use damage_intake::pipeline::AssessmentPipeline;

#[derive(Parser)]
#[command(
    name = "damage-intake",
    version,
    about = "Home damage claim intake assessment"
)]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/damage-intake/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess a claim and print the report.
    Assess {
        /// Photo of the damage (PNG, JPG, or JPEG). Repeat for several photos.
        #[arg(long = "image")]
        images: Vec<PathBuf>,

        /// Date of occurrence (YYYY-MM-DD).
        #[arg(long)]
        date: NaiveDate,

        /// Zip or postal code of the incident.
        #[arg(long, default_value = "")]
        location: String,

        /// Short description of the incident.
        #[arg(long, default_value = "")]
        narrative: String,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check that Ollama is reachable and the configured models are present.
    Probe {
        /// Pull any missing model.
        #[arg(long)]
        pull: bool,
    },

    /// Inspect or create the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Write the default configuration.
    Init {
        /// Destination (defaults to the standard config location).
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Assess {
            images,
            date,
            location,
            narrative,
            json,
        } => {
            let config = IntakeConfig::resolve(cli.config.as_deref())?;

            let images = images
                .iter()
                .map(|path| RawImage::from_path(path.as_path()))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            check_upload_types(&images)?;

            let pipeline = AssessmentPipeline::from_config(&config);
            let report = pipeline.run(Submission {
                images,
                occurred_on: date,
                location_code: location,
                narrative,
            })?;

            if json {
                println!("{}", report.to_json().into_diagnostic()?);
            } else {
                print!("{report}");
            }
        }

        Commands::Probe { pull } => {
            let config = IntakeConfig::resolve(cli.config.as_deref())?;
            let client = OllamaClient::new(config.ollama.clone());

            let available = client.probe()?;
            println!("Ollama reachable at {}", config.ollama.base_url);
            for (role, model) in [
                ("vision", &config.ollama.vision_model),
                ("text", &config.ollama.text_model),
            ] {
                if has_model(&available, model) {
                    println!("  {role:<6} {model}: present");
                } else if pull {
                    client.ensure_model(model)?;
                    println!("  {role:<6} {model}: pulled");
                } else {
                    println!("  {role:<6} {model}: missing (run with --pull)");
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let mut shown = IntakeConfig::resolve(cli.config.as_deref())?;
                if !shown.weather.api_key.is_empty() {
                    shown.weather.api_key = "<set>".into();
                }
                let rendered = shown.to_toml().map_err(|m| miette::miette!("{m}"))?;
                print!("{rendered}");
            }
            ConfigAction::Init { path, force } => {
                let path = match path.or(cli.config).or_else(config::default_path) {
                    Some(path) => path,
                    None => miette::bail!("cannot determine a config location; pass --path"),
                };
                if path.exists() && !force {
                    miette::bail!(
                        "{} already exists (use --force to overwrite)",
                        path.display()
                    );
                }
                IntakeConfig::default().save(&path)?;
                println!("Wrote default configuration to {}", path.display());
            }
        },
    }

    Ok(())
}
