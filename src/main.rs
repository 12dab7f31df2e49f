//! # Type Parameter Assigner CLI (`tpa`)
//!
//! Browse a model's families and types, preview assignment payloads and
//! viewer colors, run assignment jobs, and start the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! tpa --config ./config/tpa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tpa families` | List the model's family names |
//! | `tpa types` | List the type names of one family |
//! | `tpa colors` | Print the viewer color map for a sheet |
//! | `tpa payload` | Print the job request document for a sheet |
//! | `tpa run` | Submit a job and wait for it |
//! | `tpa versions` | Show which Revit versions have an activity configured |
//! | `tpa serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! export APS_ACCESS_TOKEN=...
//!
//! tpa families --urn urn:adsk.dtm:abc123
//! tpa types --model-key YWJjMTIz --family "Basic Wall"
//! tpa payload --sheet ./sheets/fire-rating.toml
//! tpa run --sheet ./sheets/fire-rating.toml \
//!     --input-url https://storage.example.com/Tower.rvt --name Tower.rvt \
//!     --output https://storage.example.com/results
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use type_param_assigner::activity::list_versions;
use type_param_assigner::config::{load_config, load_or_minimal};
use type_param_assigner::job::{run_job, RunOptions};
use type_param_assigner::payload::run_payload;
use type_param_assigner::progress::ProgressMode;
use type_param_assigner::server::run_server;
use type_param_assigner::session::{run_colors, run_families, run_types, Session};
use type_param_assigner::urn::model_key_from_urn;

/// Assign parameter values to family types of cloud-hosted Revit models.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tpa.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "tpa", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tpa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Which model to read. Either the exchange key or the raw URN.
#[derive(Args)]
struct ModelArgs {
    /// Model key (URL-safe base64 exchange id).
    #[arg(long, required_unless_present = "urn", conflicts_with = "urn")]
    model_key: Option<String>,

    /// Raw model URN; converted to a model key.
    #[arg(long)]
    urn: Option<String>,
}

impl ModelArgs {
    fn key(&self) -> String {
        match (&self.model_key, &self.urn) {
            (Some(key), _) => key.clone(),
            (None, Some(urn)) => model_key_from_urn(urn),
            (None, None) => String::new(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the family names of a model.
    Families {
        #[command(flatten)]
        model: ModelArgs,
    },

    /// List the type names of one family.
    Types {
        #[command(flatten)]
        model: ModelArgs,

        /// Family name.
        #[arg(long)]
        family: String,
    },

    /// Print the external-id → color map for a sheet.
    Colors {
        #[command(flatten)]
        model: ModelArgs,

        /// Assignment sheet (TOML).
        #[arg(long)]
        sheet: PathBuf,
    },

    /// Print the job request document for a sheet without submitting it.
    Payload {
        /// Assignment sheet (TOML).
        #[arg(long)]
        sheet: PathBuf,
    },

    /// Submit an assignment job and wait for it to finish.
    Run {
        /// Assignment sheet (TOML).
        #[arg(long)]
        sheet: PathBuf,

        /// URL the engine downloads the source model from.
        #[arg(long)]
        input_url: String,

        /// Display name of the source model, e.g. `Tower.rvt`.
        #[arg(long)]
        name: String,

        /// Destination folder URL for the result.
        #[arg(long)]
        output: String,

        /// Revit version; detected from `--manifest` when omitted.
        #[arg(long)]
        version: Option<String>,

        /// Model-derivative manifest (JSON) used to detect the version.
        #[arg(long, conflicts_with = "version")]
        manifest: Option<PathBuf>,

        /// Model URN; its manifest is fetched to detect the version.
        #[arg(long, conflicts_with_all = ["version", "manifest"])]
        urn: Option<String>,

        /// Progress output: `human`, `json` or `off`. Defaults to human on a TTY.
        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,
    },

    /// Show which Revit versions have an activity configured.
    Versions,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    ProgressMode::parse(s).ok_or_else(|| format!("invalid progress mode '{}'", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("type_param_assigner=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Commands that need no credentials run on defaults when the file is absent
    match &cli.command {
        Commands::Payload { sheet } => return run_payload(sheet),
        Commands::Versions => {
            let cfg = load_or_minimal(&cli.config)?;
            return list_versions(&cfg.automation);
        }
        _ => {}
    }

    let cfg = load_config(&cli.config)?;

    match cli.command {
        Commands::Families { model } => {
            let session = Session::from_config(cfg)?;
            run_families(&session, &model.key()).await?;
        }
        Commands::Types { model, family } => {
            let session = Session::from_config(cfg)?;
            run_types(&session, &model.key(), &family).await?;
        }
        Commands::Colors { model, sheet } => {
            let session = Session::from_config(cfg)?;
            run_colors(&session, &model.key(), &sheet).await?;
        }
        Commands::Run {
            sheet,
            input_url,
            name,
            output,
            version,
            manifest,
            urn,
            progress,
        } => {
            let session = Session::from_config(cfg)?;
            let opts = RunOptions {
                sheet,
                input_url,
                display_name: name,
                output_destination: output,
                version,
                manifest,
                urn,
                progress: progress.unwrap_or_else(ProgressMode::default_for_tty),
            };
            run_job(&session, opts).await?;
        }
        Commands::Serve => {
            run_server(&cfg).await?;
        }
        Commands::Payload { .. } | Commands::Versions => {}
    }

    Ok(())
}
