//! Change-notification hub: one long-lived WebSocket channel per client.
//!
//! The hub keeps two subscription indices — exact paths and recursive
//! prefixes — so dispatching an event costs O(path depth), not
//! O(subscribers). A single timer drives heartbeats and the stale-connection
//! reaper; it runs only while connections exist.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use strata_core::events::{ChangeEvent, EventSink};
use strata_core::inode::now_millis;
use strata_core::path::parent_of;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info};

/// Close code sent when the reaper drops a stale connection.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
const MAX_MISSED_PONGS: u32 = 3;

/// Outbound traffic for one connection.
#[derive(Debug)]
pub enum WsOut {
    Text(String),
    Close { code: u16, reason: String },
}

struct Connection {
    sender: UnboundedSender<WsOut>,
    missed_pongs: u32,
    last_activity: Instant,
}

pub struct WatchHub {
    connections: DashMap<String, Connection>,
    /// path → connection ids subscribed exactly.
    exact: DashMap<String, HashSet<String>>,
    /// path → connection ids subscribed recursively.
    recursive: DashMap<String, HashSet<String>>,
    seq: AtomicU64,
    heartbeat_interval: Duration,
    connection_timeout: Duration,
    timer_running: AtomicBool,
}

impl WatchHub {
    pub fn new(heartbeat_interval: Duration, connection_timeout: Duration) -> Self {
        WatchHub {
            connections: DashMap::new(),
            exact: DashMap::new(),
            recursive: DashMap::new(),
            seq: AtomicU64::new(0),
            heartbeat_interval,
            connection_timeout,
            timer_running: AtomicBool::new(false),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Accept a connection: assign its id and send the welcome message.
    pub fn register(&self, sender: UnboundedSender<WsOut>) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let id = format!("conn-{}-{}", now_millis(), seq);
        let welcome = json!({
            "type": "welcome",
            "connectionId": id,
            "heartbeatInterval": self.heartbeat_interval.as_millis() as u64,
            "connectionTimeout": self.connection_timeout.as_millis() as u64,
            "connectedAt": now_millis(),
        });
        let _ = sender.send(WsOut::Text(welcome.to_string()));
        self.connections.insert(
            id.clone(),
            Connection { sender, missed_pongs: 0, last_activity: Instant::now() },
        );
        info!(connection = id.as_str(), "watch connection opened");
        id
    }

    /// Drop a connection and every subscription it held.
    pub fn unregister(&self, conn_id: &str) {
        self.connections.remove(conn_id);
        for index in [&self.exact, &self.recursive] {
            index.retain(|_, subscribers| {
                subscribers.remove(conn_id);
                !subscribers.is_empty()
            });
        }
        debug!(connection = conn_id, "watch connection removed");
    }

    pub fn subscribe(&self, conn_id: &str, path: &str, recursive: bool) {
        let index = if recursive { &self.recursive } else { &self.exact };
        index.entry(path.to_string()).or_default().insert(conn_id.to_string());
    }

    pub fn unsubscribe(&self, conn_id: &str, path: Option<&str>) {
        for index in [&self.exact, &self.recursive] {
            index.retain(|subscribed_path, subscribers| {
                if path.is_none_or(|p| p == subscribed_path.as_str()) {
                    subscribers.remove(conn_id);
                }
                !subscribers.is_empty()
            });
        }
    }

    fn send(&self, conn_id: &str, message: Value) {
        if let Some(conn) = self.connections.get(conn_id) {
            let _ = conn.sender.send(WsOut::Text(message.to_string()));
        }
    }

    /// Process one inbound client message.
    pub fn handle_message(&self, conn_id: &str, text: &str) {
        if let Some(mut conn) = self.connections.get_mut(conn_id) {
            conn.last_activity = Instant::now();
        }
        let Ok(msg) = serde_json::from_str::<Value>(text) else {
            self.send(conn_id, json!({ "type": "error", "message": "Invalid message" }));
            return;
        };
        match msg["type"].as_str() {
            Some("subscribe") => match msg["path"].as_str() {
                Some(path) if path.starts_with('/') => {
                    let recursive = msg["recursive"].as_bool().unwrap_or(false);
                    self.subscribe(conn_id, path, recursive);
                    self.send(conn_id, json!({ "type": "subscribed", "path": path }));
                }
                _ => {
                    self.send(
                        conn_id,
                        json!({ "type": "error", "message": "Subscription path must be absolute" }),
                    );
                }
            },
            Some("unsubscribe") => {
                let path = msg["path"].as_str();
                self.unsubscribe(conn_id, path);
                let mut reply = json!({ "type": "unsubscribed" });
                if let Some(p) = path {
                    reply["path"] = json!(p);
                }
                self.send(conn_id, reply);
            }
            Some("ping") => {
                self.send(conn_id, json!({ "type": "pong", "timestamp": now_millis() }));
            }
            Some("pong") => {
                if let Some(mut conn) = self.connections.get_mut(conn_id) {
                    conn.missed_pongs = 0;
                }
            }
            Some(other) => {
                self.send(
                    conn_id,
                    json!({ "type": "error", "message": format!("Unknown message type: {other}") }),
                );
            }
            None => {
                self.send(conn_id, json!({ "type": "error", "message": "Missing message type" }));
            }
        }
    }

    /// Fan an event out to exact subscribers of its path(s) and to recursive
    /// subscribers of any ancestor.
    pub fn broadcast(&self, event: &ChangeEvent) {
        let mut targets: HashSet<String> = HashSet::new();
        let mut paths: Vec<&str> = vec![&event.path];
        if let Some(ref old) = event.old_path {
            paths.push(old);
        }
        for path in paths {
            if let Some(subscribers) = self.exact.get(path) {
                targets.extend(subscribers.iter().cloned());
            }
            let mut ancestor = path;
            loop {
                if let Some(subscribers) = self.recursive.get(ancestor) {
                    targets.extend(subscribers.iter().cloned());
                }
                if ancestor == "/" {
                    break;
                }
                ancestor = parent_of(ancestor);
            }
        }
        if targets.is_empty() {
            return;
        }
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(_) => return,
        };
        for conn_id in targets {
            if let Some(conn) = self.connections.get(&conn_id) {
                let _ = conn.sender.send(WsOut::Text(text.clone()));
            }
        }
    }

    /// One heartbeat sweep: reap stale connections, ping the rest. Returns
    /// the number of connections left.
    pub fn tick(&self) -> usize {
        let ids: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        let now = Instant::now();
        for id in ids {
            let mut stale = false;
            if let Some(mut conn) = self.connections.get_mut(&id) {
                if now.duration_since(conn.last_activity) > self.connection_timeout {
                    stale = true;
                } else {
                    let _ = conn.sender.send(WsOut::Text(
                        json!({ "type": "ping", "timestamp": now_millis() }).to_string(),
                    ));
                    conn.missed_pongs += 1;
                    if conn.missed_pongs >= MAX_MISSED_PONGS {
                        stale = true;
                    }
                }
            }
            if stale {
                self.reap(&id);
            }
        }
        self.connections.len()
    }

    fn reap(&self, conn_id: &str) {
        if let Some(conn) = self.connections.get(conn_id) {
            let _ = conn.sender.send(WsOut::Text(
                json!({
                    "type": "error",
                    "message": "Too many missed heartbeats",
                    "code": "CONNECTION_STALE",
                })
                .to_string(),
            ));
            let _ = conn.sender.send(WsOut::Close {
                code: CLOSE_POLICY_VIOLATION,
                reason: "CONNECTION_STALE".to_string(),
            });
        }
        self.unregister(conn_id);
        info!(connection = conn_id, "stale watch connection reaped");
    }

    /// Start the shared heartbeat timer if it is not already running. The
    /// timer stops itself once the connection set drains.
    pub fn ensure_timer(self: &Arc<Self>) {
        if self.timer_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(hub.heartbeat_interval).await;
                if hub.tick() == 0 {
                    hub.timer_running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });
    }
}

/// Adapter: engine mutations flow into the hub.
pub struct HubSink(pub Arc<WatchHub>);

impl EventSink for HubSink {
    fn emit(&self, event: ChangeEvent) {
        self.0.broadcast(&event);
    }
}

// ---------------------------------------------------------------------------
// WebSocket endpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WatchQuery {
    pub path: Option<String>,
    pub recursive: Option<String>,
}

/// `GET /watch`. Non-upgrade requests get 426; an invalid `path` query
/// parameter gets 400 before the upgrade completes.
pub async fn watch_handler(
    State(ctx): State<crate::state::AppContext>,
    Query(params): Query<WatchQuery>,
    ws: Result<WebSocketUpgrade, axum::extract::ws::rejection::WebSocketUpgradeRejection>,
) -> Response {
    let Ok(ws) = ws else {
        return StatusCode::UPGRADE_REQUIRED.into_response();
    };
    if let Some(ref path) = params.path {
        if !path.starts_with('/') {
            return (
                StatusCode::BAD_REQUEST,
                axum::Json(json!({
                    "code": "EINVAL",
                    "message": "watch path must be absolute",
                })),
            )
                .into_response();
        }
    }
    ws.on_upgrade(move |socket| client_loop(socket, ctx, params))
}

async fn client_loop(socket: WebSocket, ctx: crate::state::AppContext, params: WatchQuery) {
    let (tx, mut rx) = mpsc::unbounded_channel::<WsOut>();
    let conn_id = ctx.hub.register(tx);
    ctx.hub.ensure_timer();

    if let Some(ref path) = params.path {
        let recursive = params.recursive.as_deref() == Some("true");
        ctx.hub.subscribe(&conn_id, path, recursive);
    }

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(WsOut::Text(text)) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(WsOut::Close { code, reason }) => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
                        .await;
                    break;
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => ctx.hub.handle_message(&conn_id, text.as_str()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    ctx.hub.unregister(&conn_id);
}
