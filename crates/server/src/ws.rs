use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use emotion_relay_core::ingestion::infrastructure::push_frame_source::{PushFrameSource, PushedFrame};
use emotion_relay_core::pipeline::inference_scheduler::SourceState;
use emotion_relay_core::state::broadcaster::SubscriberHandle;

use crate::error::UNAVAILABLE_MESSAGE;
use crate::types::{ClientEvent, FrameAck, ServerEvent};
use crate::AppState;

const OUTBOX_CAPACITY: usize = 32;

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Frames pushed over one connection, with their own skip phase and slot
/// cache.
struct PushSession {
    source: PushFrameSource,
    state: SourceState,
}

impl PushSession {
    fn new(id: String) -> Self {
        Self {
            source: PushFrameSource::new(id),
            state: SourceState::new(),
        }
    }
}

/// One connection is one subscriber plus one push session.
///
/// Updates from the broadcaster and replies to pushed frames share a single
/// outbox, drained into the socket by the send task.
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut inbox) = mpsc::channel::<ServerEvent>(OUTBOX_CAPACITY);

    let subscription = state.broadcaster.subscribe();
    let subscriber_id = subscription.id();
    log::info!("Client {subscriber_id} connected");

    let forward_task = tokio::spawn(forward_updates(subscription, outbox.clone()));

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    log::error!("Failed to encode event: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let session_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut session = PushSession::new(session_state.next_session_id());
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    let (returned, reply) = handle_text(&session_state, session, text.as_str()).await;
                    session = returned;
                    if outbox.send(reply).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    log::warn!(
                        "WebSocket error on session {}: {e}",
                        session.source.session_id()
                    );
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.broadcaster.unsubscribe(subscriber_id);
    forward_task.abort();
    log::info!("Client {subscriber_id} disconnected");
}

/// Moves readings into the outbox until either end goes away.
async fn forward_updates(mut subscription: SubscriberHandle, outbox: mpsc::Sender<ServerEvent>) {
    while let Some(reading) = subscription.recv().await {
        if outbox.send(ServerEvent::EmotionUpdate(reading)).await.is_err() {
            break;
        }
    }
}

async fn handle_text(state: &AppState, session: PushSession, text: &str) -> (PushSession, ServerEvent) {
    let message = match serde_json::from_str::<ClientEvent>(text) {
        Ok(ClientEvent::VideoFrame(message)) => message,
        Err(e) => {
            log::debug!(
                "Ignoring malformed message on session {}: {e}",
                session.source.session_id()
            );
            return (session, ServerEvent::error(format!("Invalid message: {e}")));
        }
    };
    process_pushed(state, session, message).await
}

/// Feeds one pushed frame through the shared pipeline.
///
/// The reply carries the reading this frame published, or the current
/// snapshot when the frame was a cached cycle that published nothing, plus
/// every face slot of the frame.
async fn process_pushed(
    state: &AppState,
    mut session: PushSession,
    message: PushedFrame,
) -> (PushSession, ServerEvent) {
    let Some(pipeline) = state.pipeline.clone() else {
        return (session, ServerEvent::error(UNAVAILABLE_MESSAGE));
    };
    if let Err(e) = session.source.offer(&message) {
        log::debug!("Rejected frame on session {}: {e}", session.source.session_id());
        return (session, ServerEvent::error(e.to_string()));
    }

    let joined = tokio::task::spawn_blocking(move || {
        let result = pipeline.pump(&mut session.source, &mut session.state);
        let snapshot = pipeline.store().get();
        (session, result, snapshot)
    })
    .await;

    match joined {
        Ok((session, Ok(Some(outcome)), snapshot)) => {
            let reading = outcome.reading.unwrap_or(snapshot);
            let ack = FrameAck::success(&reading).with_faces(&outcome.faces);
            (session, ServerEvent::EmotionProcessed(ack))
        }
        Ok((session, Ok(None), snapshot)) => {
            (session, ServerEvent::EmotionProcessed(FrameAck::success(&snapshot)))
        }
        Ok((session, Err(e), _)) => (session, ServerEvent::error(e.to_string())),
        Err(e) => {
            log::error!("Frame task failed: {e}");
            (
                PushSession::new(state.next_session_id()),
                ServerEvent::error("Frame processing failed"),
            )
        }
    }
}
