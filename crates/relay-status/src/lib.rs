//! Read-only HTTP status endpoint. Binds its own listener, independent of
//! the SSH front-end, and serves both a JSON and an HTML view of the same
//! snapshot of the chat hub.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use relay_chat::ChatHub;
use serde::Serialize;

/// Everything the status handlers need: the chat hub to snapshot, plus the
/// process-wide facts that don't live in the hub (hostname, listen
/// addresses, start time).
#[derive(Clone)]
pub struct StatusState {
    pub chat: Arc<ChatHub>,
    pub hostname: String,
    pub ssh_addr: String,
    pub http_addr: String,
    pub started_at: Instant,
}

#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub hostname: String,
    pub ssh_addr: String,
    pub http_addr: String,
    pub uptime_seconds: u64,
    pub online_users: Vec<String>,
    pub total_files: usize,
    pub active_transfers: usize,
    pub total_transfers_completed: u64,
    pub relay_server_count: u32,
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/api/status", get(status_json))
        .route("/", get(status_html))
        .with_state(state)
}

async fn snapshot(state: &StatusState) -> StatusSnapshot {
    let hub = state.chat.snapshot().await;
    StatusSnapshot {
        hostname: state.hostname.clone(),
        ssh_addr: state.ssh_addr.clone(),
        http_addr: state.http_addr.clone(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        online_users: hub.online_users,
        total_files: hub.total_files,
        active_transfers: hub.active_transfers,
        total_transfers_completed: hub.total_transfers_completed,
        relay_server_count: 1,
    }
}

async fn status_json(State(state): State<StatusState>) -> Json<StatusSnapshot> {
    Json(snapshot(&state).await)
}

async fn status_html(State(state): State<StatusState>) -> Html<String> {
    let snap = snapshot(&state).await;
    let users = if snap.online_users.is_empty() {
        "<em>none</em>".to_string()
    } else {
        snap.online_users
            .iter()
            .map(|u| format!("<li>{}</li>", html_escape(u)))
            .collect::<Vec<_>>()
            .join("\n")
    };

    Html(format!(
        "<!DOCTYPE html>\n\
<html><head><title>{hostname} relay status</title></head>\n\
<body>\n\
<h1>{hostname}</h1>\n\
<p>SSH: {ssh_addr} &middot; HTTP: {http_addr} &middot; uptime: {uptime}s</p>\n\
<p>relay servers: {servers}</p>\n\
<h2>Online users ({count})</h2>\n\
<ul>\n{users}\n</ul>\n\
<p>Shared files: {files} &middot; active transfers: {active} &middot; completed: {done}</p>\n\
</body></html>\n",
        hostname = html_escape(&snap.hostname),
        ssh_addr = html_escape(&snap.ssh_addr),
        http_addr = html_escape(&snap.http_addr),
        uptime = snap.uptime_seconds,
        servers = snap.relay_server_count,
        count = snap.online_users.len(),
        users = users,
        files = snap.total_files,
        active = snap.active_transfers,
        done = snap.total_transfers_completed,
    ))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_registry::FileRegistry;

    #[tokio::test]
    async fn json_snapshot_reflects_hub_state() {
        let chat = Arc::new(ChatHub::new(Arc::new(FileRegistry::new())));
        chat.join("alice").await;

        let state = StatusState {
            chat,
            hostname: "relay.example".to_string(),
            ssh_addr: "0.0.0.0:2222".to_string(),
            http_addr: "0.0.0.0:8080".to_string(),
            started_at: Instant::now(),
        };

        let snap = snapshot(&state).await;
        assert_eq!(snap.online_users, vec!["alice".to_string()]);
        assert_eq!(snap.relay_server_count, 1);
    }

    #[test]
    fn html_escape_neutralizes_markup() {
        assert_eq!(html_escape("<b>&x</b>"), "&lt;b&gt;&amp;x&lt;/b&gt;");
    }
}
