use clap::{Parser, Subcommand};
use pgbridge_core::{LogFormat, LoggingConfig, Transport};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Overrides;

#[derive(Parser, Debug)]
#[command(name = "pgbridge", version, about = "PostgreSQL tool bridge for MCP agents")]
struct Cli {
    /// Path to the configuration file. Missing files fall back to defaults.
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "PGBRIDGE_CONFIG",
        default_value = "pgbridge.yaml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the MCP server.
    Serve {
        /// Transport override: stdio or http.
        #[arg(long)]
        transport: Option<Transport>,

        /// HTTP port override (implies nothing about the transport).
        #[arg(long)]
        port: Option<u16>,

        /// HTTP host override.
        #[arg(long)]
        host: Option<String>,

        /// Database URL override.
        #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
        database_url: Option<String>,
    },

    /// Inspect the tool catalog (no database needed).
    Tools {
        #[command(subcommand)]
        cmd: ToolsCommand,
    },

    /// Validate the configuration and connect to the upstream database.
    Check {
        /// Database URL override.
        #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
        database_url: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ToolsCommand {
    /// List registered tools.
    List {
        /// Print each tool's input schema.
        #[arg(long, short = 'v', conflicts_with = "json")]
        verbose: bool,

        /// Print the catalog as JSON, as `tools/list` returns it.
        #[arg(long)]
        json: bool,
    },

    /// Show the schema and annotations of one tool.
    Describe { name: String },
}

/// Install the global subscriber. Output always goes to stderr so the stdio
/// transport keeps stdout to itself.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Serve {
            transport,
            port,
            host,
            database_url,
        } => {
            let overrides = Overrides {
                transport,
                host,
                port,
                database_url,
            };
            let config = commands::load_config(&cli.config, &overrides)?;
            init_logging(&config.logging);
            commands::serve::run(config).await?
        }

        Command::Tools { cmd } => {
            init_logging(&LoggingConfig {
                level: "warn".to_string(),
                format: LogFormat::Text,
            });
            match cmd {
                ToolsCommand::List { verbose, json } => commands::tools::list(verbose, json)?,
                ToolsCommand::Describe { name } => commands::tools::describe(&name)?,
            }
        }

        Command::Check { database_url } => {
            let overrides = Overrides {
                database_url,
                ..Default::default()
            };
            let config = commands::load_config(&cli.config, &overrides)?;
            init_logging(&config.logging);
            commands::check::run(&cli.config, config).await?
        }
    }

    Ok(())
}
