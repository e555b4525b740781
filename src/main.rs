use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use flowrun_adapters::{ConfigCredentialStore, DirFlowStore, HttpGenerationService, JsonlLedger};
use flowrun_core::config::AppConfig;
use flowrun_core::hub::{Hub, Observer};
use flowrun_core::message::LifecycleMessage;
use flowrun_core::traits::StatusSignaler;
use flowrun_core::types::FlowId;
use flowrun_engine::{EngineServices, FileSignaler, FlowEngine, FlowJournal, HubSignaler, StatusQuery};

#[derive(Parser)]
#[command(name = "flowrun", version, about = "Flow orchestration engine with live and durable status")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "flowrun.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a stored flow once and print its summary
    Run {
        /// Id of the flow to execute
        flow_id: i64,
    },
    /// Show the last recorded status of a flow
    Status {
        /// Id of the flow to look up
        flow_id: i64,
    },
    /// Start the HTTP/WebSocket gateway
    Serve,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Everything a command needs, wired from config.
struct Runtime {
    engine: Arc<FlowEngine>,
    hub: Arc<Hub>,
    durable: Arc<dyn StatusSignaler>,
    live: Arc<dyn StatusSignaler>,
}

fn build_runtime(config: &AppConfig) -> anyhow::Result<Runtime> {
    let hub = Arc::new(Hub::new(config.hub.observer_queue));
    let durable: Arc<dyn StatusSignaler> = Arc::new(FileSignaler::new(config.status_dir()));
    let live: Arc<dyn StatusSignaler> = Arc::new(HubSignaler::new(hub.clone()));

    let generator = HttpGenerationService::new(
        config.generation.endpoint.clone(),
        Duration::from_secs(config.generation.timeout_secs),
    )?;
    info!(endpoint = generator.endpoint(), "Generation service configured");
    let credentials = ConfigCredentialStore::from_config(&config.credentials);
    if credentials.is_empty() {
        warn!("No provider credentials configured; every agent node will fail");
    }

    let flows = DirFlowStore::new(config.flows_dir());
    info!(dir = %flows.dir().display(), "Reading flows");

    let services = EngineServices {
        flows: Arc::new(flows),
        credentials: Arc::new(credentials),
        generator: Arc::new(generator),
        ledger: Arc::new(JsonlLedger::new(config.ledger_path())),
        hub: hub.clone(),
        durable: durable.clone(),
        live: live.clone(),
    };

    Ok(Runtime {
        engine: Arc::new(FlowEngine::new(services, &config.engine)),
        hub,
        durable,
        live,
    })
}

/// Start the JSONL journal if enabled. Returns its handle for a clean flush.
fn start_journal(
    config: &AppConfig,
    hub: &Arc<Hub>,
    cancel: &CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    if !config.journal.enabled {
        return None;
    }
    let journal = FlowJournal::new(config.journal_dir(), config.journal.level);
    Some(journal.start(hub.clone(), cancel.clone()))
}

/// Print lifecycle messages for one flow to stderr as they arrive.
fn spawn_progress_printer(mut observer: Observer, flow_id: FlowId) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = observer.recv().await {
            let message = match LifecycleMessage::decode(&payload) {
                Ok(Some(m)) if m.flow_id() == flow_id => m,
                _ => continue,
            };
            match &message {
                LifecycleMessage::NodeStarted { node_id, label, .. } => {
                    eprintln!("[node: {}] {}", node_id, label);
                }
                LifecycleMessage::NodeCompleted {
                    node_id,
                    input_tokens,
                    output_tokens,
                    cost,
                    ..
                } => {
                    eprintln!(
                        "[node: {} done] {} in / {} out, ${:.4}",
                        node_id, input_tokens, output_tokens, cost
                    );
                }
                LifecycleMessage::FlowFailed { error, .. } => eprintln!("[failed] {}", error),
                LifecycleMessage::FlowCompleted { execution_time_ms, .. } => {
                    eprintln!("[completed] {} ms", execution_time_ms);
                }
                _ => {}
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flowrun=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "flowrun", &mut std::io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        warn!(path = %cli.config.display(), "No config file found; using defaults");
        AppConfig::default()
    };

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Status { flow_id } => {
            let signaler = Arc::new(FileSignaler::new(config.status_dir()));
            let status_dir = signaler.dir().to_path_buf();
            let query = StatusQuery::new(signaler);
            match query.status(FlowId(flow_id)).await {
                Ok(status) => println!("{}", serde_json::to_string_pretty(&status)?),
                Err(e) if e.is_not_found() => {
                    eprintln!(
                        "No status recorded for flow {} in {}",
                        flow_id,
                        status_dir.display()
                    );
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Run { flow_id } => {
            let runtime = build_runtime(&config)?;
            let cancel = CancellationToken::new();
            let journal = start_journal(&config, &runtime.hub, &cancel);
            let observer = runtime.hub.attach();
            let observer_id = observer.id();
            let printer = spawn_progress_printer(observer, FlowId(flow_id));

            let result = runtime.engine.execute_flow(FlowId(flow_id)).await;

            // Detaching closes the queue; the printer drains it and exits.
            runtime.hub.detach(observer_id);
            printer.await.ok();
            cancel.cancel();
            if let Some(handle) = journal {
                handle.await.ok();
            }

            match result {
                Ok(summary) => {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                    let total = summary.total_usage();
                    eprintln!(
                        "[total] {} in / {} out, ${:.4}",
                        total.input_tokens, total.output_tokens, total.cost
                    );
                }
                Err(e) => {
                    error!(flow_id, error = %e, "Flow run failed");
                    return Err(e.into());
                }
            }
        }
        Commands::Serve => {
            let runtime = build_runtime(&config)?;
            let query = StatusQuery::select(
                config.status.query_backend,
                runtime.durable.clone(),
                runtime.live.clone(),
            );

            let cancel = CancellationToken::new();
            let journal = start_journal(&config, &runtime.hub, &cancel);
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            info!(bind = %config.gateway.bind, "Starting gateway");
            let server = flowrun_gateway::GatewayServer::new(
                config.gateway.clone(),
                runtime.engine.clone(),
                query,
            );
            server.run(cancel).await?;

            if let Some(handle) = journal {
                handle.await.ok();
            }
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}
