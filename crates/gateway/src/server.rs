//! Gateway app construction and startup wiring.

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        response::Json,
        routing::get,
    },
    tower_http::cors::{Any, CorsLayer},
    tracing::{info, warn},
};

use {
    herald_botlink::BotBridge,
    herald_channels::{
        adapter::AdapterRegistry,
        events::DeliveryEventSink,
        model::ChannelKind,
        store::{ChannelState, ChannelStore, ContactStore, MessageStore, MetaStore, StoredChannel},
    },
    herald_config::{ChannelSeed, HeraldConfig},
    herald_dispatch::OutboundDispatcher,
    herald_handover::AgentForwarder,
    herald_routing::RoutingTable,
    herald_store::{
        ContactResolver, SqliteChannelStore, SqliteContactStore, SqliteMessageStore,
        SqliteMetaStore,
    },
    herald_tasks::{InMemoryQueue, RetryPolicy, TaskQueue, TaskRunner},
    herald_telegram::TelegramAdapter,
    herald_whatsapp::WhatsAppAdapter,
};

use crate::{broadcast::BroadcastSink, pipeline::Pipeline, webhook};

// ── Shared app state ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub channels: Arc<dyn ChannelStore>,
    pub adapters: Arc<AdapterRegistry>,
    pub queue: Arc<dyn TaskQueue>,
}

// ── Router ──────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/webhooks/{provider}/{account_id}",
            get(webhook::handshake).post(webhook::receive),
        )
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

// ── Server startup ──────────────────────────────────────────────────────────

/// Start the gateway: open the database, seed channels, spin up the worker
/// pool, and serve the webhook routes. `bind`/`port` override the config
/// file when given.
pub async fn start_gateway(
    bind: Option<String>,
    port: Option<u16>,
    config_dir: Option<PathBuf>,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = herald_config::discover_and_load(config_dir.as_deref());

    let data_dir = data_dir.unwrap_or_else(herald_config::data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("herald.db");
    let pool =
        sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path.display())).await?;
    herald_store::init_all(&pool).await?;
    info!(db = %db_path.display(), "database ready");

    let channels: Arc<dyn ChannelStore> = Arc::new(SqliteChannelStore::new(pool.clone()));
    let messages: Arc<dyn MessageStore> = Arc::new(SqliteMessageStore::new(pool.clone()));
    let contacts: Arc<dyn ContactStore> = Arc::new(SqliteContactStore::new(pool.clone()));
    let meta: Arc<dyn MetaStore> = Arc::new(SqliteMetaStore::new(pool));

    seed_channels(&*channels, &config.channels).await?;

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(WhatsAppAdapter::new()));
    registry.register(Arc::new(TelegramAdapter::new()));
    let adapters = Arc::new(registry);

    let (queue, queue_rx) = InMemoryQueue::new();
    let queue = Arc::new(queue);
    let events: Arc<dyn DeliveryEventSink> = Arc::new(BroadcastSink::new(256));

    let pipeline = Pipeline {
        channels: Arc::clone(&channels),
        messages: Arc::clone(&messages),
        meta: Arc::clone(&meta),
        resolver: Arc::new(ContactResolver::new(Arc::clone(&contacts), meta)),
        routing: RoutingTable::from_config(&config.routing),
        queue: Arc::clone(&queue) as Arc<dyn TaskQueue>,
        bridge: Arc::new(BotBridge::from_config(&config.bot)),
        forwarder: Arc::new(AgentForwarder::new(
            Arc::clone(&messages),
            contacts,
            Arc::clone(&queue) as Arc<dyn TaskQueue>,
            config.handover.clone(),
        )),
        dispatcher: Arc::new(OutboundDispatcher::new(
            Arc::clone(&channels),
            messages,
            Arc::clone(&adapters),
            Arc::clone(&events),
        )),
        events,
    };

    let policy = RetryPolicy {
        max_attempts: config.tasks.max_attempts,
        backoff: Duration::from_secs(config.tasks.retry_backoff_secs),
        attempt_timeout: Duration::from_secs(config.tasks.attempt_timeout_secs),
    };
    let runner = TaskRunner::new(
        Arc::new(pipeline),
        Arc::clone(&queue),
        policy,
        config.tasks.workers,
    );
    let _workers = runner.start(queue_rx);
    info!(workers = config.tasks.workers, "task runner started");

    let app = build_gateway_app(AppState {
        channels,
        adapters,
        queue: queue as Arc<dyn TaskQueue>,
    });

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let port = port.unwrap_or(config.server.port);
    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    info!(%bind, port, "gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Upsert configured channel accounts. Stands in for an administrative
/// surface: the pipeline itself only ever reads channels.
async fn seed_channels(store: &dyn ChannelStore, seeds: &[ChannelSeed]) -> anyhow::Result<()> {
    for seed in seeds {
        let Some(kind) = ChannelKind::parse(&seed.kind) else {
            warn!(account_id = %seed.account_id, kind = %seed.kind, "unknown channel kind, skipping seed");
            continue;
        };
        let now = now_secs();
        let status = if seed.disabled {
            ChannelState::Disabled
        } else {
            ChannelState::Active
        };
        store
            .upsert(StoredChannel {
                account_id: seed.account_id.clone(),
                kind,
                config: seed.config.clone(),
                status,
                is_default: seed.is_default,
                created_at: now,
                updated_at: now,
            })
            .await?;
        info!(account_id = %seed.account_id, kind = %kind, "channel seeded");
    }
    Ok(())
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Convenience used by tests and embedders: the same wiring as
/// [`start_gateway`] but over an existing pool and config, returning the
/// router without binding a listener.
pub async fn build_wired_app(
    pool: sqlx::SqlitePool,
    config: &HeraldConfig,
    adapters: Arc<AdapterRegistry>,
) -> anyhow::Result<Router> {
    herald_store::init_all(&pool).await?;

    let channels: Arc<dyn ChannelStore> = Arc::new(SqliteChannelStore::new(pool.clone()));
    let messages: Arc<dyn MessageStore> = Arc::new(SqliteMessageStore::new(pool.clone()));
    let contacts: Arc<dyn ContactStore> = Arc::new(SqliteContactStore::new(pool.clone()));
    let meta: Arc<dyn MetaStore> = Arc::new(SqliteMetaStore::new(pool));

    seed_channels(&*channels, &config.channels).await?;

    let (queue, queue_rx) = InMemoryQueue::new();
    let queue = Arc::new(queue);
    let events: Arc<dyn DeliveryEventSink> = Arc::new(BroadcastSink::new(256));

    let pipeline = Pipeline {
        channels: Arc::clone(&channels),
        messages: Arc::clone(&messages),
        meta: Arc::clone(&meta),
        resolver: Arc::new(ContactResolver::new(Arc::clone(&contacts), meta)),
        routing: RoutingTable::from_config(&config.routing),
        queue: Arc::clone(&queue) as Arc<dyn TaskQueue>,
        bridge: Arc::new(BotBridge::from_config(&config.bot)),
        forwarder: Arc::new(AgentForwarder::new(
            Arc::clone(&messages),
            contacts,
            Arc::clone(&queue) as Arc<dyn TaskQueue>,
            config.handover.clone(),
        )),
        dispatcher: Arc::new(OutboundDispatcher::new(
            Arc::clone(&channels),
            messages,
            Arc::clone(&adapters),
            Arc::clone(&events),
        )),
        events,
    };

    let policy = RetryPolicy {
        max_attempts: config.tasks.max_attempts,
        backoff: Duration::from_secs(config.tasks.retry_backoff_secs),
        attempt_timeout: Duration::from_secs(config.tasks.attempt_timeout_secs),
    };
    let runner = TaskRunner::new(
        Arc::new(pipeline),
        Arc::clone(&queue),
        policy,
        config.tasks.workers,
    );
    let _workers = runner.start(queue_rx);

    Ok(build_gateway_app(AppState {
        channels,
        adapters,
        queue: queue as Arc<dyn TaskQueue>,
    }))
}
