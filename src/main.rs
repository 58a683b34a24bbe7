//! agent-relay: drives a coding agent and relays its stream events
//!
//! `serve` listens for inbound messages on a Unix socket; `run` handles a
//! single message and exits.

use agent_relay::agents::claude_code::ClaudeCli;
use agent_relay::config::{self, Config};
use agent_relay::error::InboundError;
use agent_relay::inbound::Inbound;
use agent_relay::ipc::{JsonLinesNotifier, SocketNotifier};
use agent_relay::query::{AbortHandle, PermissionMode};
use agent_relay::server::{self, Relay};
use agent_relay::Notifier;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "agent-relay", about = "Relay coding-agent stream events to a notification bus")]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Working directory for agent queries
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Permission mode passed to the agent
    #[arg(long, value_enum, global = true)]
    permission_mode: Option<PermissionMode>,

    /// Agent executable
    #[arg(long, global = true)]
    agent_program: Option<String>,

    /// Where notifications go (default: stdout for `run`, socket for `serve`)
    #[arg(long, value_enum, global = true)]
    notify: Option<NotifyTarget>,

    /// Notification bus socket
    #[arg(long, global = true)]
    notify_socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Listen for inbound messages on a Unix socket
    Serve {
        /// Inbound socket path
        #[arg(long)]
        socket: Option<PathBuf>,
    },
    /// Handle one message (read from stdin when omitted) and exit
    Run {
        prompt: Option<String>,
    },
    /// Print the effective configuration
    Config {
        /// Persist the effective configuration to config.json
        #[arg(long)]
        write: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, clap::ValueEnum)]
enum NotifyTarget {
    Stdout,
    Socket,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded config.
    fn apply(&self, config: &mut Config) {
        if let Some(cwd) = &self.cwd {
            config.cwd = Some(cwd.clone());
        }
        if let Some(mode) = self.permission_mode {
            config.permission_mode = mode;
        }
        if let Some(program) = &self.agent_program {
            config.agent_program = program.clone();
        }
        if let Some(path) = &self.notify_socket {
            config.notify_socket = Some(path.clone());
        }
        if let Command::Serve {
            socket: Some(path),
        } = &self.command
        {
            config.inbound_socket = Some(path.clone());
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("AGENT_RELAY_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_relay(config: &Config, target: NotifyTarget) -> Relay {
    let notifier: Arc<dyn Notifier> = match target {
        NotifyTarget::Stdout => Arc::new(JsonLinesNotifier::new(std::io::stdout())),
        NotifyTarget::Socket => Arc::new(SocketNotifier::spawn(config.notify_socket())),
    };
    let agent = ClaudeCli::new(config.agent_program.clone()).with_args(config.agent_args.clone());
    Relay::new(Arc::new(agent), notifier, config.query_options())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = config::load_config();
    cli.apply(&mut config);

    let (abort, signal) = AbortHandle::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            abort.abort();
        }
    });

    match cli.command {
        Command::Config { write } => {
            match serde_json::to_string_pretty(&config) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Failed to render config: {e}");
                    return ExitCode::FAILURE;
                }
            }
            if write {
                match config::save_config(&config) {
                    Ok(path) => eprintln!("Saved {}", path.display()),
                    Err(e) => {
                        eprintln!("Failed to save config: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Command::Serve { .. } => {
            let relay = Arc::new(build_relay(&config, cli.notify.unwrap_or(NotifyTarget::Socket)));
            match server::start(relay, &config.inbound_socket(), signal).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Run { prompt } => {
            let relay = build_relay(&config, cli.notify.unwrap_or(NotifyTarget::Stdout));
            let message = match prompt {
                Some(prompt) => Inbound::Text(prompt),
                None => {
                    let mut buf = String::new();
                    if let Err(e) = tokio::io::stdin().read_to_string(&mut buf).await {
                        relay.report_handler_error(&InboundError::Io(e));
                        return ExitCode::FAILURE;
                    }
                    Inbound::from_line(&buf)
                }
            };

            match relay.handle_message(message, &signal).await {
                Some(outcome) if outcome.failed => ExitCode::FAILURE,
                Some(_) => ExitCode::SUCCESS,
                None => {
                    warn!("Empty message, nothing to run");
                    ExitCode::SUCCESS
                }
            }
        }
    }
}
