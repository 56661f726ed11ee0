//! Chat relay HTTP server binary.
//!
//! Wires the Postgres pool, FAQ table and completion client into the relay,
//! runs migrations, and serves `POST /chat` until Ctrl-C or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use chatrelay_core::faq::PgFaqSource;
use chatrelay_core::generation::openai::{OPENAI_API_BASE_URL, OpenAiEngine};
use chatrelay_core::generation::{GenerationEngine, GenerationParams};
use chatrelay_core::relay::{DEFAULT_SYSTEM_PROMPT, Relay};
use chatrelay_core::store::{MemoryTranscriptStore, PgTranscriptStore, TranscriptStore};
use clap::Parser;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// CLI arguments for the chat relay server.
#[derive(Parser, Debug)]
#[command(name = "chatrelay_server", about = "Chat relay server", version)]
struct Args {
    /// Interface to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on (0 = ephemeral).
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/chatrelay"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// API key for the completion service.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: String,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = OPENAI_API_BASE_URL)]
    openai_base_url: String,

    /// Completion model.
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o")]
    model: String,

    /// Upper bound on completion length, in tokens.
    #[arg(long, env = "OPENAI_MAX_TOKENS", default_value_t = 200)]
    max_tokens: u32,

    /// System instruction placed at the start of every new conversation.
    #[arg(long, env = "SYSTEM_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT, hide_default_value = true)]
    system_prompt: String,

    /// Do not keep conversation history; `contact_id` becomes optional.
    #[arg(long, env = "CHAT_STATELESS", default_value_t = false)]
    stateless: bool,

    /// Skip the FAQ short-circuit.
    #[arg(long, env = "FAQ_DISABLED", default_value_t = false)]
    disable_faq: bool,

    /// Keep history in process memory and run without a database.
    ///
    /// Implies `--disable-faq`. History is lost on restart.
    #[arg(long, env = "CHAT_IN_MEMORY", default_value_t = false)]
    in_memory: bool,

    /// Time allowed for one exchange, end to end.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    request_timeout_secs: u64,
}

impl Args {
    fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            ..GenerationParams::default()
        }
    }

    fn needs_database(&self) -> bool {
        !self.in_memory && (!self.stateless || !self.disable_faq)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("info,chatrelay_api=debug,chatrelay_core=debug")
                }),
        )
        .init();

    let args = Args::parse();

    info!(
        port = args.port,
        stateless = args.stateless,
        in_memory = args.in_memory,
        faq = !args.disable_faq && !args.in_memory,
        model = %args.model,
        "starting chatrelay_server"
    );

    let pool = if args.needs_database() {
        info!(max_connections = args.max_connections, "configuring connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&args.database_url)
            .await?;

        info!("running database migrations");
        chatrelay_api::migrate(&pool).await?;
        Some(pool)
    } else {
        None
    };

    let relay = build_relay(&args, pool.clone())?;

    let config = chatrelay_api::config::ApiConfig::new(args.bind_addr())
        .with_exchange_timeout(Duration::from_secs(args.request_timeout_secs));

    let state = chatrelay_api::AppState {
        relay: Arc::new(relay),
        pool: pool.clone(),
        config: config.clone(),
    };

    let app = chatrelay_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pool {
        info!("closing database pool");
        pool.close().await;
    }
    info!("shutdown complete");

    Ok(())
}

/// Assemble the relay and its collaborators from the parsed arguments.
fn build_relay(args: &Args, pool: Option<PgPool>) -> Result<Relay, Box<dyn std::error::Error>> {
    let engine: Arc<dyn GenerationEngine> = Arc::new(
        OpenAiEngine::new(reqwest::Client::new(), args.openai_api_key.clone())?
            .with_base_url(args.openai_base_url.clone())
            .with_params(args.generation_params()),
    );

    let mut relay = if args.stateless {
        Relay::stateless(args.system_prompt.clone(), engine)
    } else {
        let store: Arc<dyn TranscriptStore> = match &pool {
            Some(pool) => Arc::new(PgTranscriptStore::new(pool.clone())),
            None => {
                warn!("in-memory mode: conversation history is lost on restart");
                Arc::new(MemoryTranscriptStore::new())
            }
        };
        Relay::persistent(args.system_prompt.clone(), store, engine)
    };

    if !args.disable_faq
        && let Some(pool) = pool
    {
        relay = relay.with_faq(Arc::new(PgFaqSource::new(pool)));
    }

    Ok(relay)
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["chatrelay_server", "--openai-api-key", "sk-test"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).expect("valid args")
    }

    #[test]
    fn defaults_match_deployment_settings() {
        let args = parse(&["--port", "3000", "--model", "gpt-4o", "--max-tokens", "200"]);
        assert_eq!(args.bind_addr(), format!("{}:3000", args.host));
        let params = args.generation_params();
        assert_eq!(params.model, "gpt-4o");
        assert_eq!(params.max_tokens, 200);
        assert_eq!(params.temperature, 1.0);
    }

    #[test]
    fn stateless_without_faq_needs_no_database() {
        let args = parse(&["--stateless", "--disable-faq"]);
        assert!(!args.needs_database());
    }

    #[test]
    fn stateless_with_faq_still_needs_database() {
        let args = parse(&["--stateless"]);
        assert!(args.needs_database());
    }

    #[test]
    fn in_memory_never_needs_database() {
        let args = parse(&["--in-memory"]);
        assert!(!args.needs_database());
    }

    #[test]
    fn in_memory_relay_is_persistent_without_faq() {
        let args = parse(&["--in-memory"]);
        let relay = build_relay(&args, None).expect("relay");
        assert_eq!(
            relay.mode(),
            chatrelay_core::relay::ConversationMode::Persistent
        );
    }

    #[test]
    fn stateless_flag_builds_stateless_relay() {
        let args = parse(&["--stateless", "--disable-faq"]);
        let relay = build_relay(&args, None).expect("relay");
        assert_eq!(
            relay.mode(),
            chatrelay_core::relay::ConversationMode::Stateless
        );
    }
}
