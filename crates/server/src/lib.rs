//! HTTP query API and WebSocket channel for the emotion relay.
//!
//! `build_router` wires the handlers to an [`AppState`]; `start_server` binds
//! it and serves until the shutdown future resolves.

pub mod error;
pub mod handlers;
pub mod types;
pub mod ws;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use emotion_relay_core::pipeline::emotion_pipeline::EmotionPipeline;
use emotion_relay_core::query::conversation_context::ConversationContext;
use emotion_relay_core::query::query_service::QueryService;
use emotion_relay_core::state::broadcaster::Broadcaster;

/// Everything a request handler can reach.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no classifier could be loaded; frame endpoints then
    /// answer "unavailable" while queries keep working.
    pub pipeline: Option<Arc<EmotionPipeline>>,
    pub query: QueryService,
    pub broadcaster: Arc<Broadcaster>,
    /// Prompt history of the conversational consumer.
    pub conversation: Arc<Mutex<ConversationContext>>,
    next_session: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(pipeline: Arc<EmotionPipeline>) -> Self {
        let query = QueryService::new(pipeline.store().clone(), true);
        let broadcaster = pipeline.broadcaster().clone();
        Self {
            pipeline: Some(pipeline),
            query,
            broadcaster,
            conversation: Arc::new(Mutex::new(ConversationContext::new())),
            next_session: Arc::new(AtomicU64::new(0)),
        }
    }

    /// State for a process that runs without an emotion classifier.
    pub fn unavailable(query: QueryService, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            pipeline: None,
            query,
            broadcaster,
            conversation: Arc::new(Mutex::new(ConversationContext::new())),
            next_session: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn next_session_id(&self) -> String {
        let n = self
            .next_session
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        format!("ws-{n}")
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/emotion", get(handlers::current_emotion))
        .route(
            "/api/webhook/emotion",
            get(handlers::agent_context).post(handlers::agent_context),
        )
        .route("/api/health", get(handlers::health))
        .route("/api/process_frame", post(handlers::process_frame))
        .route("/api/conversation/prompt", post(handlers::conversation_prompt))
        .route("/api/conversation/summary", get(handlers::conversation_summary))
        .route("/api/conversation", delete(handlers::clear_conversation))
        .route("/ws", get(ws::websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves `state` on `addr` until `shutdown` resolves.
pub async fn start_server<F>(
    addr: SocketAddr,
    state: AppState,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
