use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    Extension,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{
    sync::{mpsc, RwLock},
    task::{AbortHandle, JoinHandle},
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    services::auth::Claims,
    storage::redis::RedisClient,
    AppState,
};

use super::middleware::get_user_id;

const CLIENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsIncomingMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsOutgoingMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Devices,
    Reminders,
    NowPlaying,
    Profiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// A row-level change. `record` is the row as the REST API serves it, so
/// clients can patch their state in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub op: ChangeOp,
    pub record: serde_json::Value,
}

impl ChangeEvent {
    pub fn new<T: Serialize>(table: Table, op: ChangeOp, record: &T) -> Self {
        Self {
            table,
            op,
            record: serde_json::to_value(record).unwrap_or_default(),
        }
    }

    pub fn deleted(table: Table, id: Uuid) -> Self {
        Self {
            table,
            op: ChangeOp::Delete,
            record: json!({ "id": id }),
        }
    }

    fn into_message(self) -> WsOutgoingMessage {
        WsOutgoingMessage {
            msg_type: "change".to_string(),
            payload: serde_json::to_value(self).unwrap_or_default(),
        }
    }
}

/// Per-user fan-out of change events to open WebSocket connections.
///
/// With Redis, events go through `changes:{user_id}` and every connection
/// listens on its user's channel, so each connection sees an event once no
/// matter which instance produced it. Without Redis delivery is in-process.
pub struct RealtimeHub {
    clients: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::Sender<WsOutgoingMessage>>>>,
    redis: Option<RedisClient>,
}

impl RealtimeHub {
    pub fn new(redis: Option<RedisClient>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            redis,
        }
    }

    pub fn redis(&self) -> Option<&RedisClient> {
        self.redis.as_ref()
    }

    pub async fn register(
        &self,
        user_id: Uuid,
        connection_id: Uuid,
        sender: mpsc::Sender<WsOutgoingMessage>,
    ) {
        let mut clients = self.clients.write().await;
        clients
            .entry(user_id)
            .or_default()
            .insert(connection_id, sender);
        tracing::info!("Realtime client registered: {}:{}", user_id, connection_id);
    }

    pub async fn unregister(&self, user_id: Uuid, connection_id: Uuid) {
        let mut clients = self.clients.write().await;
        if let Some(connections) = clients.get_mut(&user_id) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                clients.remove(&user_id);
            }
        }
        tracing::info!("Realtime client unregistered: {}:{}", user_id, connection_id);
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.clients
            .read()
            .await
            .get(&user_id)
            .map_or(0, HashMap::len)
    }

    /// Publishes a change to every connection of `user_id`. Delivery is best
    /// effort and never fails the mutation that produced it.
    pub async fn publish(&self, user_id: Uuid, event: ChangeEvent) {
        let message = event.into_message();

        if let Some(redis) = &self.redis {
            match serde_json::to_string(&message) {
                Ok(payload) => match redis.publish_change(user_id, &payload).await {
                    Ok(()) => return,
                    Err(e) => tracing::warn!("Redis publish failed, delivering locally: {}", e),
                },
                Err(e) => tracing::warn!("Failed to encode change event: {}", e),
            }
        }

        self.deliver_local(user_id, message).await;
    }

    async fn deliver_local(&self, user_id: Uuid, message: WsOutgoingMessage) {
        let clients = self.clients.read().await;
        let Some(connections) = clients.get(&user_id) else {
            return;
        };

        for (connection_id, sender) in connections {
            if let Err(e) = sender.try_send(message.clone()) {
                tracing::warn!(
                    "Dropping change for {}:{}: {}",
                    user_id,
                    connection_id,
                    e
                );
            }
        }
    }
}

pub async fn handle_realtime(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Response> {
    let user_id = get_user_id(&claims)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let connection_id = Uuid::new_v4();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create channel for sending messages to this client
    let (tx, mut rx) = mpsc::channel::<WsOutgoingMessage>(CLIENT_BUFFER);

    state
        .realtime
        .register(user_id, connection_id, tx.clone())
        .await;
    tracing::debug!(
        "{} realtime connection(s) open for {}",
        state.realtime.connection_count(user_id).await,
        user_id
    );

    // Cross-instance events arrive through the user's Redis channel
    let redis_task = state.realtime.redis().cloned().map(|redis| {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut pubsub = match redis.subscribe_changes(user_id).await {
                Ok(pubsub) => pubsub,
                Err(e) => {
                    tracing::warn!("Realtime subscribe failed for {}: {}", user_id, e);
                    return;
                }
            };
            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                let Ok(payload) = msg.get_payload::<String>() else {
                    continue;
                };
                if let Ok(ws_msg) = serde_json::from_str::<WsOutgoingMessage>(&payload) {
                    if tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
            }
        })
    });

    // Task to send messages to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Task to receive messages from WebSocket
    let reply = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    if let Ok(msg) = serde_json::from_str::<WsIncomingMessage>(&text) {
                        handle_incoming_message(&reply, user_id, msg).await;
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    let mut tasks = vec![send_task.abort_handle(), recv_task.abort_handle()];
    tasks.extend(redis_task.as_ref().map(JoinHandle::abort_handle));
    let redis_done = async {
        match redis_task {
            Some(task) => {
                let _ = task.await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = &mut send_task => {},
        _ = &mut recv_task => {},
        _ = redis_done => {},
    }

    shut_down(tasks);
    state.realtime.unregister(user_id, connection_id).await;
}

/// Stops every task of a closed connection, including the Redis subscriber,
/// which would otherwise keep its pub/sub connection open.
fn shut_down(tasks: impl IntoIterator<Item = AbortHandle>) {
    for task in tasks {
        task.abort();
    }
}

async fn handle_incoming_message(
    reply: &mpsc::Sender<WsOutgoingMessage>,
    user_id: Uuid,
    msg: WsIncomingMessage,
) {
    match msg.msg_type.as_str() {
        "ping" => {
            let pong = WsOutgoingMessage {
                msg_type: "pong".to_string(),
                payload: json!({}),
            };
            let _ = reply.send(pong).await;
        }
        _ => {
            tracing::warn!("Unknown realtime message from {}: {}", user_id, msg.msg_type);
        }
    }
}
