//! roccd - loopback Ro charging simulator
//!
//! This is the main entry point for the roccd service.
//! It wires together all the components:
//! - Configuration loading
//! - Session store initialization
//! - A client node and a server node joined by a mock transport pair
//! - Inbound routing from each transport into its session factory
//! - Simulated charging dialogues (INITIAL -> UPDATE* -> TERMINATION)

use anyhow::{Context, Result, bail};
use clap::Parser;
use rocc_api::{CcRequestType, ClientState, CreditControlAnswer, CreditControlRequest};
use rocc_config::{NodeConfig, Settings, StoreKind, load_config, parse_store_kind};
use rocc_core::{
    ClientRoSession, ClientSessionListener, ListenerResult, Listeners, RoSessionFactory,
    ServerRoSession, ServerSessionListener,
};
use rocc_store::{MemoryStore, SessionDatastore, SqliteStore};
use rocc_transport_api::{MockTransport, Transport, TransportEvent};
use rocc_util::{ApplicationId, SessionId, default_config_path, doubled, format_datetime_full};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// roccd - Loopback Ro charging simulator
#[derive(Parser, Debug)]
#[command(name = "roccd")]
#[command(about = "Loopback Ro charging simulator", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/rocc/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set ROCC_DATA_DIR env var)
    #[arg(short, long, env = "ROCC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Session store override: sqlite or memory
    #[arg(long)]
    store: Option<String>,

    /// Number of concurrent charging dialogues
    #[arg(short = 'n', long, default_value_t = 3)]
    dialogues: usize,

    /// Update exchanges per dialogue
    #[arg(short, long, default_value_t = 2)]
    updates: u32,

    /// Pause between exchanges, in milliseconds
    #[arg(long, default_value_t = 200)]
    pause_ms: u64,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

/// Simulated charging server: grants every request with a fixed validity
struct AutoAnswer {
    validity_seconds: u32,
}

impl ServerSessionListener for AutoAnswer {
    fn do_credit_control_request(
        &self,
        session: &ServerRoSession,
        request: &CreditControlRequest,
    ) -> ListenerResult {
        debug!(
            session_id = %session.session_id(),
            request_type = ?request.request_type(),
            "Granting CCR"
        );

        let answer = CreditControlAnswer::success(request).with_validity_time(self.validity_seconds);
        let session = session.clone();
        tokio::spawn(async move {
            if let Err(e) = session.send_credit_control_answer(answer).await {
                warn!(session_id = %session.session_id(), error = %e, "Failed to answer CCR");
            }
        });
        Ok(())
    }
}

/// Hands each CCA to the dialogue waiting on its session
#[derive(Default)]
struct AnswerRelay {
    waiting: Mutex<HashMap<SessionId, mpsc::UnboundedSender<CreditControlAnswer>>>,
}

impl AnswerRelay {
    fn register(&self, session_id: &SessionId) -> mpsc::UnboundedReceiver<CreditControlAnswer> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.waiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.clone(), tx);
        rx
    }

    fn unregister(&self, session_id: &SessionId) {
        self.waiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }
}

impl ClientSessionListener for AnswerRelay {
    fn do_credit_control_answer(
        &self,
        session: &ClientRoSession,
        _request: &CreditControlRequest,
        answer: &CreditControlAnswer,
    ) -> ListenerResult {
        let waiting = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
        match waiting.get(session.session_id()) {
            Some(tx) => {
                let _ = tx.send(answer.clone());
                Ok(())
            }
            None => Err("no dialogue waiting for this answer".into()),
        }
    }
}

/// Shape of one simulated dialogue
#[derive(Debug, Clone)]
struct DialoguePlan {
    application_id: ApplicationId,
    updates: u32,
    pause: Duration,
    answer_timeout: Duration,
}

#[derive(Debug)]
struct DialogueReport {
    session_id: SessionId,
    exchanges: u32,
    final_state: ClientState,
}

async fn run_dialogue(
    factory: Arc<RoSessionFactory>,
    relay: Arc<AnswerRelay>,
    plan: DialoguePlan,
) -> Result<DialogueReport> {
    let session = factory
        .create_client_session(None, plan.application_id)
        .context("Failed to create client session")?;
    let session_id = session.session_id().clone();
    info!(session_id = %session_id, "Dialogue started");

    let mut answers = relay.register(&session_id);
    let exchanged = exchange_all(&session, &mut answers, &plan).await;
    relay.unregister(&session_id);

    // No-op when the termination exchange already ended the session
    session.release().await?;

    Ok(DialogueReport {
        session_id,
        exchanges: exchanged?,
        final_state: session.state(),
    })
}

async fn exchange_all(
    session: &ClientRoSession,
    answers: &mut mpsc::UnboundedReceiver<CreditControlAnswer>,
    plan: &DialoguePlan,
) -> Result<u32> {
    let steps = std::iter::once(CcRequestType::Initial)
        .chain(std::iter::repeat_n(CcRequestType::Update, plan.updates as usize))
        .chain(std::iter::once(CcRequestType::Termination));

    let mut exchanges = 0;
    for (number, request_type) in (0u32..).zip(steps) {
        if request_type != CcRequestType::Initial {
            tokio::time::sleep(plan.pause).await;
            if session.state() != ClientState::Open {
                warn!(
                    session_id = %session.session_id(),
                    state = ?session.state(),
                    "Session left Open, ending dialogue"
                );
                break;
            }
        }

        let request = CreditControlRequest::new(
            session.session_id(),
            plan.application_id,
            request_type,
            number,
        );
        session
            .send_credit_control_request(request)
            .await
            .with_context(|| format!("Failed to send CCR {:?}", request_type))?;

        let answer = match tokio::time::timeout(plan.answer_timeout, answers.recv()).await {
            Ok(Some(answer)) => answer,
            Ok(None) => bail!("answer relay closed"),
            Err(_) => {
                warn!(
                    session_id = %session.session_id(),
                    request_type = ?request_type,
                    "No answer, failure handling decided the outcome"
                );
                break;
            }
        };

        exchanges += 1;
        info!(
            session_id = %session.session_id(),
            request_type = ?request_type,
            result_code = ?answer.result_code(),
            validity = ?answer.validity_time(),
            "Exchange complete"
        );
        if !answer.is_success() {
            break;
        }
    }
    Ok(exchanges)
}

/// Forward inbound messages from a transport into its session factory
fn spawn_router(
    node: &'static str,
    factory: Arc<RoSessionFactory>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(TransportEvent::Inbound(message)) = events.recv().await {
            if let Err(e) = factory.deliver(message).await {
                warn!(node, error = %e, "Inbound message dropped");
            }
        }
        debug!(node, "Router stopped");
    })
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = if args.config.exists() {
        let settings = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;
        info!(
            config_path = %args.config.display(),
            origin_host = %settings.node.origin_host,
            "Configuration loaded"
        );
        settings
    } else {
        warn!(config_path = %args.config.display(), "Config file not found, using defaults");
        Settings::default()
    };

    if let Some(data_dir) = &args.data_dir {
        settings.node.data_dir = data_dir.clone();
    }
    if let Some(store) = &args.store {
        settings.node.store =
            parse_store_kind(store).with_context(|| format!("Unknown store backend {:?}", store))?;
    }
    Ok(settings)
}

fn open_store(node: &NodeConfig) -> Result<Arc<dyn SessionDatastore>> {
    match node.store {
        StoreKind::Memory => {
            info!("Using in-memory session store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreKind::Sqlite => {
            let db_path = node.store_path();
            let store = SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?;
            info!(db_path = %db_path.display(), "Store initialized");
            Ok(Arc::new(store))
        }
    }
}

/// Main simulator state
struct Simulator {
    settings: Settings,
    store: Arc<dyn SessionDatastore>,
    client_transport: Arc<MockTransport>,
    server_transport: Arc<MockTransport>,
    client: Arc<RoSessionFactory>,
    server: Arc<RoSessionFactory>,
    relay: Arc<AnswerRelay>,
}

impl Simulator {
    fn new(settings: Settings) -> Result<Self> {
        let store = open_store(&settings.node)?;

        let (client_transport, server_transport) = MockTransport::pair();
        let client_transport = Arc::new(client_transport);
        let server_transport = Arc::new(server_transport);

        let relay = Arc::new(AnswerRelay::default());
        let mut client_listeners = Listeners::new();
        client_listeners.set_client_listener(relay.clone());
        let client = Arc::new(
            RoSessionFactory::new(&settings, store.clone(), client_transport.clone())
                .with_listeners(client_listeners),
        );

        // The simulated charging server keeps its sessions in memory
        let validity_seconds = u32::try_from(settings.ro.validity_time.as_secs()).unwrap_or(u32::MAX);
        let mut server_listeners = Listeners::new();
        server_listeners.set_server_listener(Arc::new(AutoAnswer { validity_seconds }));
        let server = Arc::new(
            RoSessionFactory::new(
                &settings,
                Arc::new(MemoryStore::new()),
                server_transport.clone(),
            )
            .with_listeners(server_listeners),
        );

        Ok(Self {
            settings,
            store,
            client_transport,
            server_transport,
            client,
            server,
            relay,
        })
    }

    async fn run(self, args: &Args) -> Result<()> {
        let client_router = spawn_router(
            "client",
            self.client.clone(),
            self.client_transport.subscribe()?,
        );
        let server_router = spawn_router(
            "server",
            self.server.clone(),
            self.server_transport.subscribe()?,
        );

        let restored = self.client.restore_persisted()?;
        if restored > 0 {
            info!(count = restored, "Restored persisted client sessions");
        }

        let plan = DialoguePlan {
            application_id: self
                .settings
                .ro
                .application_ids
                .first()
                .copied()
                .unwrap_or(ApplicationId::CREDIT_CONTROL),
            updates: args.updates,
            pause: Duration::from_millis(args.pause_ms),
            answer_timeout: doubled(self.settings.ro.tx_timer),
        };

        let mut dialogues = JoinSet::new();
        for _ in 0..args.dialogues {
            dialogues.spawn(run_dialogue(
                self.client.clone(),
                self.relay.clone(),
                plan.clone(),
            ));
        }

        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        info!(dialogues = args.dialogues, updates = args.updates, "Simulator running");

        let mut completed = 0usize;
        let mut failed = 0usize;
        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                joined = dialogues.join_next() => match joined {
                    Some(Ok(Ok(report))) => {
                        completed += 1;
                        info!(
                            session_id = %report.session_id,
                            exchanges = report.exchanges,
                            final_state = ?report.final_state,
                            "Dialogue finished"
                        );
                    }
                    Some(Ok(Err(e))) => {
                        failed += 1;
                        warn!(error = %e, "Dialogue failed");
                    }
                    Some(Err(e)) => {
                        failed += 1;
                        error!(error = %e, "Dialogue task aborted");
                    }
                    None => {
                        info!("All dialogues finished");
                        break;
                    }
                },
            }
        }

        // Graceful shutdown
        info!("Shutting down roccd");
        dialogues.abort_all();

        for factory in [&self.client, &self.server] {
            for session_id in factory.session_ids() {
                if let Err(e) = factory.release(&session_id).await {
                    warn!(session_id = %session_id, error = %e, "Failed to release session");
                }
            }
        }

        client_router.abort();
        server_router.abort();

        match self.store.recent_audits(5) {
            Ok(audits) => {
                for audit in audits {
                    debug!(
                        id = audit.id,
                        at = %format_datetime_full(&audit.timestamp),
                        event = ?audit.event,
                        "Recent audit event"
                    );
                }
            }
            Err(e) => warn!(error = %e, "Failed to read audit log"),
        }

        info!(
            completed,
            failed,
            client_messages = self.client_transport.dispatched().len(),
            server_messages = self.server_transport.dispatched().len(),
            "Shutdown complete"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "roccd starting");

    let settings = load_settings(&args)?;
    let simulator = Simulator::new(settings)?;
    simulator.run(&args).await
}
