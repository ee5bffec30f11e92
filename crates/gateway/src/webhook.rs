//! Provider webhook routes.
//!
//! The handlers validate, normalize, and enqueue — nothing else. A data call
//! is acknowledged with 200 even when parts of it fail to parse, because
//! providers treat non-2xx as an invitation to redeliver.

use std::collections::HashMap;

use {
    axum::{
        body::Bytes,
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
    },
    tracing::{debug, error, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{counter, labels, webhook as hook_metrics};

use {
    herald_channels::{
        Error as ChannelError,
        model::ChannelKind,
        store::{ChannelStore as _, StoredChannel},
    },
    herald_tasks::{TaskQueue as _, TaskSpec},
};

use crate::server::AppState;

/// GET: the provider's webhook subscription handshake. Echoes the literal
/// challenge on success; providers without a handshake get 404.
pub async fn handshake(
    State(state): State<AppState>,
    Path((provider, account_id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(channel) = match_channel(&state, &provider, &account_id).await else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(adapter) = state.adapters.get(channel.kind) else {
        error!(provider, "no adapter registered");
        return StatusCode::NOT_FOUND.into_response();
    };

    #[cfg(feature = "metrics")]
    counter!(hook_metrics::HANDSHAKES_TOTAL, labels::PROVIDER => provider.clone()).increment(1);

    match adapter.verify_handshake(&channel, &params) {
        Ok(challenge) => (StatusCode::OK, challenge).into_response(),
        Err(ChannelError::Unavailable { .. }) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(account_id, error = %e, "webhook handshake rejected");
            #[cfg(feature = "metrics")]
            counter!(hook_metrics::REJECTED_TOTAL, labels::PROVIDER => provider).increment(1);
            StatusCode::FORBIDDEN.into_response()
        },
    }
}

/// POST: one provider data call. Authenticates, normalizes, and enqueues one
/// ingest task per event plus one status-application task for the batch.
pub async fn receive(
    State(state): State<AppState>,
    Path((provider, account_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(channel) = match_channel(&state, &provider, &account_id).await else {
        // Unknown or disabled accounts are acknowledged so the provider
        // does not redeliver.
        return StatusCode::OK.into_response();
    };
    let Some(adapter) = state.adapters.get(channel.kind) else {
        error!(provider, "no adapter registered");
        return StatusCode::OK.into_response();
    };

    if let Err(e) = adapter.authenticate(&channel, &headers, &body) {
        warn!(account_id, error = %e, "webhook data call rejected");
        #[cfg(feature = "metrics")]
        counter!(hook_metrics::REJECTED_TOTAL, labels::PROVIDER => provider).increment(1);
        return StatusCode::FORBIDDEN.into_response();
    }

    #[cfg(feature = "metrics")]
    counter!(hook_metrics::CALLS_TOTAL, labels::PROVIDER => provider).increment(1);

    let batch = match adapter.normalize(&channel, &body) {
        Ok(batch) => batch,
        Err(e) => {
            warn!(account_id, error = %e, "webhook payload failed to parse, acknowledged anyway");
            return StatusCode::OK.into_response();
        },
    };

    debug!(
        account_id,
        events = batch.events.len(),
        statuses = batch.statuses.len(),
        "webhook batch normalized"
    );

    for event in batch.events {
        let spec = TaskSpec::IngestMessage {
            account_id: account_id.clone(),
            event,
        };
        if let Err(e) = state.queue.submit(spec).await {
            error!(account_id, error = %e, "failed to enqueue ingest task");
        }
    }
    if !batch.statuses.is_empty() {
        let spec = TaskSpec::ApplyStatuses {
            account_id: account_id.clone(),
            statuses: batch.statuses,
        };
        if let Err(e) = state.queue.submit(spec).await {
            error!(account_id, error = %e, "failed to enqueue status task");
        }
    }

    StatusCode::OK.into_response()
}

/// Resolve the route to an active channel of the right provider kind.
async fn match_channel(
    state: &AppState,
    provider: &str,
    account_id: &str,
) -> Option<StoredChannel> {
    let Some(kind) = ChannelKind::parse(provider) else {
        warn!(provider, "unknown provider in webhook path");
        return None;
    };
    let channel = match state.channels.get(account_id).await {
        Ok(channel) => channel,
        Err(e) => {
            error!(account_id, error = %e, "channel lookup failed");
            return None;
        },
    };
    match channel {
        Some(c) if c.is_active() && c.kind == kind => Some(c),
        Some(c) => {
            warn!(
                account_id,
                kind = %c.kind,
                active = c.is_active(),
                "webhook for mismatched or disabled channel"
            );
            None
        },
        None => {
            warn!(account_id, "webhook for unknown account");
            None
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use {
        anyhow::Result,
        async_trait::async_trait,
        axum::body::Body,
        herald_channels::{
            adapter::AdapterRegistry,
            store::{ChannelState, ChannelStore},
        },
        herald_store::SqliteChannelStore,
        herald_tasks::{TaskId, TaskQueue},
        herald_telegram::TelegramAdapter,
        herald_whatsapp::WhatsAppAdapter,
        hmac::Mac,
        http::Request,
        sqlx::SqlitePool,
        tower::ServiceExt,
    };

    use {
        super::*,
        crate::server::build_gateway_app,
    };

    struct RecordingQueue(Mutex<Vec<TaskSpec>>);

    #[async_trait]
    impl TaskQueue for RecordingQueue {
        async fn submit(&self, spec: TaskSpec) -> Result<TaskId> {
            self.0.lock().unwrap().push(spec);
            Ok(TaskId::new())
        }

        async fn submit_after(
            &self,
            spec: TaskSpec,
            _delay: std::time::Duration,
        ) -> Result<TaskId> {
            self.submit(spec).await
        }
    }

    async fn app() -> (axum::Router, Arc<RecordingQueue>) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteChannelStore::init(&pool).await.unwrap();
        let channels = Arc::new(SqliteChannelStore::new(pool));

        channels
            .upsert(StoredChannel {
                account_id: "wa-main".into(),
                kind: ChannelKind::Whatsapp,
                config: serde_json::json!({
                    "phone_number_id": "15550001111",
                    "access_token": "tok",
                    "verify_token": "vt-secret",
                    "app_secret": "app-secret",
                }),
                status: ChannelState::Active,
                is_default: true,
                created_at: 1,
                updated_at: 1,
            })
            .await
            .unwrap();
        channels
            .upsert(StoredChannel {
                account_id: "tg-main".into(),
                kind: ChannelKind::Telegram,
                config: serde_json::json!({
                    "bot_token": "123:abc",
                    "bot_id": "herald_bot",
                }),
                status: ChannelState::Active,
                is_default: false,
                created_at: 1,
                updated_at: 1,
            })
            .await
            .unwrap();

        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(WhatsAppAdapter::new()));
        registry.register(Arc::new(TelegramAdapter::new()));

        let queue = Arc::new(RecordingQueue(Mutex::new(Vec::new())));
        let state = AppState {
            channels,
            adapters: Arc::new(registry),
            queue: Arc::clone(&queue) as Arc<dyn TaskQueue>,
        };
        (build_gateway_app(state), queue)
    }

    fn sign(body: &[u8]) -> String {
        let mut mac =
            hmac::Hmac::<sha2::Sha256>::new_from_slice(b"app-secret").unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn whatsapp_body() -> Vec<u8> {
        serde_json::json!({
            "entry": [{
                "changes": [{
                    "field": "messages",
                    "value": {
                        "metadata": {"phone_number_id": "15550001111"},
                        "contacts": [{"wa_id": "919990001111", "profile": {"name": "Asha"}}],
                        "messages": [{
                            "id": "wamid.1",
                            "from": "919990001111",
                            "timestamp": "1700000000",
                            "type": "text",
                            "text": {"body": "Hello"},
                        }],
                        "statuses": [{
                            "id": "wamid.0",
                            "status": "delivered",
                            "timestamp": "1700000000",
                        }],
                    },
                }],
            }],
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn handshake_echoes_the_literal_challenge() {
        let (app, _) = app().await;
        let response = app
            .oneshot(
                Request::get(
                    "/webhooks/whatsapp/wa-main?hub.mode=subscribe&hub.verify_token=vt-secret&hub.challenge=12345",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"12345");
    }

    #[tokio::test]
    async fn handshake_with_wrong_token_is_forbidden() {
        let (app, _) = app().await;
        let response = app
            .oneshot(
                Request::get(
                    "/webhooks/whatsapp/wa-main?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=12345",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn telegram_has_no_handshake() {
        let (app, _) = app().await;
        let response = app
            .oneshot(
                Request::get("/webhooks/telegram/tg-main?anything=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn data_call_enqueues_ingest_and_status_tasks() {
        let (app, queue) = app().await;
        let body = whatsapp_body();
        let response = app
            .oneshot(
                Request::post("/webhooks/whatsapp/wa-main")
                    .header("content-type", "application/json")
                    .header("x-hub-signature-256", sign(&body))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let specs = queue.0.lock().unwrap();
        assert_eq!(specs.len(), 2);
        match &specs[0] {
            TaskSpec::IngestMessage { account_id, event } => {
                assert_eq!(account_id, "wa-main");
                assert_eq!(event.provider_message_id, "wamid.1");
                assert_eq!(event.body, "Hello");
            },
            other => panic!("unexpected spec: {other:?}"),
        }
        match &specs[1] {
            TaskSpec::ApplyStatuses { statuses, .. } => {
                assert_eq!(statuses.len(), 1);
                assert_eq!(statuses[0].provider_message_id, "wamid.0");
            },
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_any_processing() {
        let (app, queue) = app().await;
        let body = whatsapp_body();
        let response = app
            .oneshot(
                Request::post("/webhooks/whatsapp/wa-main")
                    .header("x-hub-signature-256", "sha256=deadbeef")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(queue.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_account_is_acknowledged_without_processing() {
        let (app, queue) = app().await;
        let body = whatsapp_body();
        let response = app
            .oneshot(
                Request::post("/webhooks/whatsapp/nobody")
                    .header("x-hub-signature-256", sign(&body))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(queue.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unparseable_body_is_still_acknowledged() {
        let (app, queue) = app().await;
        let body = b"this is not json".to_vec();
        let response = app
            .oneshot(
                Request::post("/webhooks/whatsapp/wa-main")
                    .header("x-hub-signature-256", sign(&body))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(queue.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn telegram_secret_token_header_is_enforced() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteChannelStore::init(&pool).await.unwrap();
        let channels = Arc::new(SqliteChannelStore::new(pool));
        channels
            .upsert(StoredChannel {
                account_id: "tg-main".into(),
                kind: ChannelKind::Telegram,
                config: serde_json::json!({
                    "bot_token": "123:abc",
                    "bot_id": "herald_bot",
                    "secret_token": "shh",
                }),
                status: ChannelState::Active,
                is_default: false,
                created_at: 1,
                updated_at: 1,
            })
            .await
            .unwrap();

        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(TelegramAdapter::new()));
        let queue = Arc::new(RecordingQueue(Mutex::new(Vec::new())));
        let app = build_gateway_app(AppState {
            channels,
            adapters: Arc::new(registry),
            queue: Arc::clone(&queue) as Arc<dyn TaskQueue>,
        });

        let update = serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 7,
                "chat": {"id": 99},
                "from": {"id": 42, "first_name": "Asha"},
                "date": 1_700_000_000,
                "text": "hi",
            },
        })
        .to_string();

        let response = app
            .clone()
            .oneshot(
                Request::post("/webhooks/telegram/tg-main")
                    .body(Body::from(update.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(
                Request::post("/webhooks/telegram/tg-main")
                    .header("x-telegram-bot-api-secret-token", "shh")
                    .body(Body::from(update))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(queue.0.lock().unwrap().len(), 1);
    }
}
