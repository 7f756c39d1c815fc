//! SoundStreamer Command Line Interface
//!
//! Lists audio sources and microphones and routes one into the other by
//! talking to `soundstreamer-daemon` over its Unix socket.

mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use soundstreamer_core::endpoint::AudioEndpoint;
use soundstreamer_core::ledger::LinkPair;
use soundstreamer_core::state::{CreatedLinkView, LinkView};
use soundstreamer_ipc::{
    Diagnostics, ErrorInfo, IpcClient, IpcError, LinkReport, Method, RemoveReport, socket_path,
};

#[derive(Debug, Parser)]
#[command(name = "soundstreamer")]
#[command(author = "SoundStreamer")]
#[command(version)]
#[command(about = "Route application audio into microphone inputs", long_about = None)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Daemon socket (defaults to $XDG_RUNTIME_DIR/soundstreamer/daemon.sock)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Log client activity to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List applications currently playing audio
    Sources,

    /// List microphones that can receive audio
    Targets,

    /// List links created in this session
    Links {
        /// Show every link PipeWire reports
        #[arg(short, long)]
        all: bool,
    },

    /// Link every selected source to every selected microphone
    Link {
        /// Source node ID (repeatable)
        #[arg(short, long = "source", value_name = "ID")]
        sources: Vec<u32>,

        /// Target node ID (repeatable)
        #[arg(short, long = "target", value_name = "ID")]
        targets: Vec<u32>,
    },

    /// Link one output port to one input port
    LinkPorts {
        /// Output port ID
        output: u32,
        /// Input port ID
        input: u32,
    },

    /// Remove a link created in this session
    Unlink {
        /// Output node (or port) ID
        output: u32,
        /// Input node (or port) ID
        input: u32,
        /// Treat the IDs as port IDs
        #[arg(long)]
        ports: bool,
    },

    /// Remove any link by its PipeWire ID
    UnlinkId {
        /// PipeWire link ID
        id: u32,
    },

    /// Remove every link created in this session
    UnlinkAll,

    /// Re-read the graph from PipeWire
    Refresh,

    /// Show daemon status
    Status,

    /// Print daemon events until interrupted
    Watch,

    /// Stop the daemon
    Shutdown,
}

/// Error with an associated exit code.
#[derive(Debug)]
struct CliError {
    message: String,
    exit_code: i32,
}

impl CliError {
    fn new(message: impl Into<String>, exit_code: i32) -> Self {
        Self { message: message.into(), exit_code }
    }

    fn general(message: impl Into<String>) -> Self {
        Self::new(message, 1)
    }

    fn usage(message: impl Into<String>) -> Self {
        Self::new(message, 64)
    }

    fn unavailable(message: impl Into<String>) -> Self {
        Self::new(message, 69)
    }
}

impl From<IpcError> for CliError {
    fn from(e: IpcError) -> Self {
        match e {
            IpcError::Server { code: ErrorInfo::BAD_REQUEST, message } => Self::usage(message),
            IpcError::Server { code: ErrorInfo::UNAVAILABLE, message } => Self::unavailable(message),
            IpcError::ConnectionClosed => Self::unavailable("The daemon closed the connection"),
            other => Self::general(other.to_string()),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        eprintln!("{}: {}", "Error".red().bold(), e.message);
        std::process::exit(e.exit_code);
    }
}

async fn connect(cli: &Cli) -> Result<IpcClient, CliError> {
    let path = cli.socket.clone().unwrap_or_else(socket_path);
    tracing::debug!(path = %path.display(), "Connecting to daemon");

    IpcClient::connect(&path).await.map_err(|e| {
        CliError::unavailable(format!(
            "Cannot connect to {}: {e}. Is soundstreamer-daemon running?",
            path.display()
        ))
    })
}

/// Print `value` as JSON, or as text via `render`.
fn show<T: DeserializeOwned>(
    cli: &Cli,
    value: &Value,
    render: impl FnOnce(&T) -> String,
) -> Result<T, CliError> {
    let parsed: T = serde_json::from_value(value.clone())
        .map_err(|e| CliError::general(format!("Unexpected response from daemon: {e}")))?;

    match cli.format {
        OutputFormat::Json => println!("{}", output::json(value)),
        OutputFormat::Text => {
            let text = render(&parsed);
            if !text.is_empty() {
                println!("{text}");
            }
        }
    }
    Ok(parsed)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut client = connect(&cli).await?;

    match cli.command {
        Commands::Sources => {
            let value = client.call(Method::GetSources).await?;
            show::<Vec<AudioEndpoint>>(&cli, &value, |v| output::endpoints(v, "source", "sources"))?;
        }

        Commands::Targets => {
            let value = client.call(Method::GetTargets).await?;
            show::<Vec<AudioEndpoint>>(&cli, &value, |v| output::endpoints(v, "target", "targets"))?;
        }

        Commands::Links { all: true } => {
            let value = client.call(Method::GetLinks).await?;
            show::<Vec<LinkView>>(&cli, &value, |v| output::all_links(v))?;
        }

        Commands::Links { all: false } => {
            let value = client.call(Method::GetCreatedLinks).await?;
            show::<Vec<CreatedLinkView>>(&cli, &value, |v| output::created_links(v))?;
        }

        Commands::Link { ref sources, ref targets } => {
            let method = Method::CreateLinks { sources: sources.clone(), targets: targets.clone() };
            let value = client.call(method).await?;
            let report = show::<LinkReport>(&cli, &value, output::link_report)?;

            if report.created.is_empty() && report.already_linked.is_empty() && !report.failed.is_empty() {
                return Err(CliError::general(format!(
                    "None of the {} requested links could be created",
                    report.failed.len()
                )));
            }
        }

        Commands::LinkPorts { output: output_port, input: input_port } => {
            let method = Method::LinkPorts { output_port, input_port };
            let value = client.call(method).await?;
            show::<LinkReport>(&cli, &value, output::link_report)?;
        }

        Commands::Unlink { output: out, input, ports } => {
            let pair = if ports { LinkPair::ports(out, input) } else { LinkPair::nodes(out, input) };
            let value = client.call(Method::RemoveLinks { pairs: vec![pair] }).await?;
            let report = show::<RemoveReport>(&cli, &value, output::remove_report)?;

            if report.removed.is_empty() {
                return Err(CliError::general(format!("{pair} was not removed")));
            }
        }

        Commands::UnlinkId { id } => {
            let value = client.call(Method::UnlinkById { id }).await?;
            show::<RemoveReport>(&cli, &value, output::remove_report)?;
        }

        Commands::UnlinkAll => {
            let value = client.call(Method::RemoveAllLinks).await?;
            show::<RemoveReport>(&cli, &value, output::remove_report)?;
        }

        Commands::Refresh => {
            let value = client.call(Method::Refresh).await?;
            let quiet = cli.quiet;
            show::<Value>(&cli, &value, |_| {
                if quiet { String::new() } else { "Graph refreshed".green().to_string() }
            })?;
        }

        Commands::Status => {
            let value = client.call(Method::GetDiagnostics).await?;
            show::<Diagnostics>(&cli, &value, output::status)?;
        }

        Commands::Watch => {
            client.call(Method::Subscribe { events: vec![] }).await?;
            if !cli.quiet && matches!(cli.format, OutputFormat::Text) {
                eprintln!("{}", "Watching daemon events (Ctrl+C to stop)".dimmed());
            }

            loop {
                tokio::select! {
                    event = client.events().recv() => {
                        let Some(event) = event else {
                            return Err(CliError::unavailable("The daemon closed the connection"));
                        };
                        match cli.format {
                            OutputFormat::Json => {
                                let value = serde_json::to_value(&event).unwrap_or(Value::Null);
                                println!("{value}");
                            }
                            OutputFormat::Text => println!("{}", output::event(&event)),
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }

        Commands::Shutdown => {
            client.call(Method::Shutdown).await?;
            if !cli.quiet {
                println!("Daemon is shutting down");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_link_takes_repeated_ids() {
        let cli = Cli::try_parse_from(["soundstreamer", "link", "-s", "40", "-s", "41", "--target", "50"]).unwrap();

        assert_matches!(cli.command, Commands::Link { sources, targets } => {
            assert_eq!(sources, vec![40, 41]);
            assert_eq!(targets, vec![50]);
        });
    }

    #[test]
    fn test_link_without_ids_parses() {
        // The daemon answers with the message the user should see
        let cli = Cli::try_parse_from(["soundstreamer", "link"]).unwrap();

        assert_matches!(cli.command, Commands::Link { sources, targets } if sources.is_empty() && targets.is_empty());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "soundstreamer",
            "--format",
            "json",
            "--socket",
            "/tmp/ss.sock",
            "unlink",
            "100",
            "120",
            "--ports",
        ])
        .unwrap();

        assert_matches!(cli.format, OutputFormat::Json);
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/ss.sock")));
        assert_matches!(cli.command, Commands::Unlink { output: 100, input: 120, ports: true });
    }

    #[test]
    fn test_unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["soundstreamer", "levels"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        let usage = CliError::from(IpcError::Server {
            code: 400,
            message: "Please select at least one source application".into(),
        });
        assert_eq!(usage.exit_code, 64);
        assert_eq!(usage.message, "Please select at least one source application");

        let missing = CliError::from(IpcError::Server { code: 404, message: "Link not found: 9".into() });
        assert_eq!(missing.exit_code, 1);

        assert_eq!(CliError::from(IpcError::ConnectionClosed).exit_code, 69);
    }
}
