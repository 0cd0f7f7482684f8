//! Remote sync client
//!
//! HTTP + WebSocket client for the remote document store. REST calls handle
//! get-by-id and upsert-by-id; a realtime WebSocket channel delivers update
//! events for the shared row.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::{RequestBuilder, StatusCode};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::error::{SyncError, SyncResult};
use super::message::{ClientFrame, RemoteRow, ServerFrame, UpsertRow, REALTIME_VSN};
use super::remote::{NotificationSink, RemoteStore, Subscription};
use crate::config::Config;
use crate::credentials::SyncCredentials;
use crate::snapshot::Snapshot;

/// Interval between realtime heartbeats
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for the channel join reply
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response body excerpt kept in error messages
const BODY_EXCERPT_LEN: usize = 200;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client for the remote document store
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    credentials: SyncCredentials,
    table: String,
    document_key: String,
}

impl RemoteClient {
    /// Create a client for one table row
    pub fn new(
        credentials: SyncCredentials,
        table: &str,
        document_key: &str,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            credentials,
            table: table.to_string(),
            document_key: document_key.to_string(),
        })
    }

    /// Create a client using table, key and timeout from the configuration
    pub fn from_config(config: &Config, credentials: SyncCredentials) -> SyncResult<Self> {
        Self::new(
            credentials,
            &config.sync_table,
            &config.document_key,
            config.request_timeout(),
        )
    }

    /// Endpoint this client talks to
    pub fn endpoint(&self) -> &str {
        self.credentials.endpoint()
    }

    fn rest_url(&self) -> String {
        format!("{}/rest/v1/{}", self.credentials.endpoint(), self.table)
    }

    fn realtime_url(&self) -> SyncResult<String> {
        let endpoint = self.credentials.endpoint();
        let ws_base = if let Some(rest) = endpoint.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = endpoint.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            return Err(SyncError::Connect {
                endpoint: endpoint.to_string(),
                reason: "endpoint must start with http:// or https://".to_string(),
            });
        };

        Ok(format!(
            "{}/realtime/v1/websocket?apikey={}&vsn={}",
            ws_base,
            self.credentials.key(),
            REALTIME_VSN
        ))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", self.credentials.key())
            .bearer_auth(self.credentials.key())
    }

    fn connect_error(&self, error: reqwest::Error) -> SyncError {
        SyncError::Connect {
            endpoint: self.credentials.endpoint().to_string(),
            reason: error.to_string(),
        }
    }
}

#[async_trait]
impl RemoteStore for RemoteClient {
    async fn pull(&self) -> SyncResult<Option<Snapshot>> {
        debug!(table = %self.table, key = %self.document_key, "Pulling remote document");

        let request = self.http.get(self.rest_url()).query(&[
            ("id", format!("eq.{}", self.document_key)),
            ("select", "id,data".to_string()),
        ]);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| self.connect_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Pull(describe_failure(status, &body)));
        }

        let rows: Vec<RemoteRow> = response
            .json()
            .await
            .map_err(|e| SyncError::Pull(format!("unexpected response body: {}", e)))?;

        document_from_rows(rows, &self.document_key)
    }

    async fn push(&self, snapshot: &Snapshot) -> SyncResult<()> {
        let body = UpsertRow {
            id: &self.document_key,
            data: snapshot,
        };
        let request = self
            .http
            .post(self.rest_url())
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&body);

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| SyncError::Push(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Push(describe_failure(status, &body)));
        }

        debug!(table = %self.table, key = %self.document_key, "Pushed state document");
        Ok(())
    }

    async fn subscribe(&self, sink: NotificationSink) -> SyncResult<Subscription> {
        let url = self.realtime_url()?;
        let (ws_stream, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| SyncError::Connect {
                    endpoint: self.credentials.endpoint().to_string(),
                    reason: e.to_string(),
                })?;
        let (mut write, mut read) = ws_stream.split();

        let join = ClientFrame::join(
            &self.table,
            &self.document_key,
            self.credentials.key(),
            1,
        );
        write.send(Message::Text(join.encode()?)).await?;
        wait_for_join(&mut read).await?;

        info!(table = %self.table, key = %self.document_key, "Subscribed to remote changes");

        let task = tokio::spawn(listen(write, read, sink, self.document_key.clone()));
        Ok(Subscription::from_task(task))
    }
}

/// Wait for the server to accept the channel join
async fn wait_for_join(read: &mut SplitStream<WsStream>) -> SyncResult<()> {
    let deadline = tokio::time::Instant::now() + JOIN_TIMEOUT;

    loop {
        let next = tokio::time::timeout_at(deadline, read.next())
            .await
            .map_err(|_| SyncError::Subscribe("timed out waiting for join reply".to_string()))?;

        match next {
            Some(Ok(Message::Text(text))) => match ServerFrame::decode(&text) {
                Ok(ServerFrame::Reply { payload, .. }) if payload.status == "ok" => return Ok(()),
                Ok(ServerFrame::Reply { payload, .. }) => {
                    return Err(SyncError::Subscribe(format!(
                        "join rejected ({}): {}",
                        payload.status, payload.response
                    )))
                }
                Ok(ServerFrame::Error { payload, .. }) => {
                    return Err(SyncError::Subscribe(format!("channel error: {}", payload)))
                }
                // Ignore other frames during the join
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Ignoring undecodable frame during join"),
            },
            Some(Ok(Message::Close(_))) | None => {
                return Err(SyncError::Subscribe(
                    "server closed connection during join".to_string(),
                ))
            }
            Some(Err(e)) => return Err(e.into()),
            _ => {}
        }
    }
}

/// Forward change events until the socket closes or the sink is dropped
async fn listen(
    mut write: SplitSink<WsStream, Message>,
    mut read: SplitStream<WsStream>,
    sink: NotificationSink,
    document_key: String,
) {
    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + HEARTBEAT_INTERVAL,
        HEARTBEAT_INTERVAL,
    );
    let mut next_ref: u64 = 2;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let frame = match ClientFrame::heartbeat(next_ref).encode() {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode heartbeat");
                        continue;
                    }
                };
                next_ref += 1;
                if let Err(e) = write.send(Message::Text(frame)).await {
                    warn!(error = %e, "Heartbeat failed, ending subscription");
                    break;
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !forward_frame(&text, &sink, &document_key) {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Realtime connection closed");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Realtime connection error");
                        break;
                    }
                    // Ping/pong/binary - ignore
                    _ => {}
                }
            }
        }
    }

    write.close().await.ok();
    info!("Change subscription ended");
}

/// Handle one text frame; returns false once the sink is gone
fn forward_frame(text: &str, sink: &NotificationSink, document_key: &str) -> bool {
    let frame = match ServerFrame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Dropping undecodable realtime frame");
            return true;
        }
    };

    match frame {
        ServerFrame::Changes { payload, .. } => match payload.notification() {
            Some(Ok(notification)) if notification.id == document_key => {
                sink.send(notification).is_ok()
            }
            Some(Ok(notification)) => {
                debug!(id = %notification.id, "Ignoring change for another row");
                true
            }
            Some(Err(e)) => {
                warn!(error = %e, kind = %payload.data.kind, "Dropping malformed change event");
                true
            }
            None => {
                debug!(kind = %payload.data.kind, "Change event without record");
                true
            }
        },
        ServerFrame::Error { topic, payload } => {
            warn!(%topic, %payload, "Realtime channel error");
            true
        }
        ServerFrame::Close { topic } => {
            info!(%topic, "Realtime channel closed by server");
            true
        }
        ServerFrame::Reply { .. } | ServerFrame::Other => true,
    }
}

/// Pick the shared document out of a get-by-id response
///
/// A row whose document has a mistyped collection fails the pull rather than
/// replacing local state.
fn document_from_rows(
    rows: Vec<RemoteRow>,
    document_key: &str,
) -> SyncResult<Option<Snapshot>> {
    match rows.into_iter().find(|row| row.id == document_key) {
        Some(row) => Ok(Some(Snapshot::from_remote_value(row.data)?)),
        None => Ok(None),
    }
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    let excerpt: String = body.chars().take(BODY_EXCERPT_LEN).collect();
    if excerpt.is_empty() {
        format!("server responded {}", status)
    } else {
        format!("server responded {}: {}", status, excerpt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn client(endpoint: &str) -> RemoteClient {
        let credentials = SyncCredentials::new(endpoint, "anon-key").unwrap();
        RemoteClient::new(
            credentials,
            "app_state",
            "global_state",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_rest_url() {
        let client = client("https://db.example.com/");
        assert_eq!(client.rest_url(), "https://db.example.com/rest/v1/app_state");
    }

    #[test]
    fn test_realtime_url_schemes() {
        assert_eq!(
            client("https://db.example.com").realtime_url().unwrap(),
            "wss://db.example.com/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
        );
        assert_eq!(
            client("http://localhost:54321").realtime_url().unwrap(),
            "ws://localhost:54321/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
        );
        assert!(matches!(
            client("db.example.com").realtime_url(),
            Err(SyncError::Connect { .. })
        ));
    }

    #[test]
    fn test_forward_frame_filters_by_key() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let frame = |id: &str| {
            json!({
                "topic": "realtime:app_state",
                "event": "postgres_changes",
                "payload": {"data": {"type": "UPDATE", "record": {"id": id, "data": {"students": []}}}}
            })
            .to_string()
        };

        assert!(forward_frame(&frame("other_row"), &tx, "global_state"));
        assert!(rx.try_recv().is_err());

        assert!(forward_frame(&frame("global_state"), &tx, "global_state"));
        assert_eq!(rx.try_recv().unwrap().id, "global_state");
    }

    #[test]
    fn test_forward_frame_drops_malformed() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(forward_frame("not json", &tx, "global_state"));
        let missing_id = json!({
            "topic": "realtime:app_state",
            "event": "postgres_changes",
            "payload": {"data": {"type": "UPDATE", "record": {"data": {}}}}
        })
        .to_string();
        assert!(forward_frame(&missing_id, &tx, "global_state"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_forward_frame_stops_when_sink_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let frame = json!({
            "topic": "realtime:app_state",
            "event": "postgres_changes",
            "payload": {"data": {"type": "UPDATE", "record": {"id": "global_state", "data": {}}}}
        })
        .to_string();
        assert!(!forward_frame(&frame, &tx, "global_state"));
    }

    fn row(id: &str, data: serde_json::Value) -> RemoteRow {
        RemoteRow {
            id: id.to_string(),
            data,
        }
    }

    #[test]
    fn test_document_from_rows() {
        assert!(document_from_rows(vec![], "global_state").unwrap().is_none());
        assert!(
            document_from_rows(vec![row("other", json!({}))], "global_state")
                .unwrap()
                .is_none()
        );

        let snapshot = document_from_rows(
            vec![row("global_state", json!({"students": [{"id": "s1"}]}))],
            "global_state",
        )
        .unwrap()
        .unwrap();
        assert_eq!(snapshot.records("students").len(), 1);
        assert!(snapshot.records("classes").is_empty());
    }

    #[test]
    fn test_mistyped_pulled_document_is_an_error() {
        let rows = vec![row(
            "global_state",
            json!({"students": "garbage", "classes": [{"id": "c1"}]}),
        )];
        assert!(matches!(
            document_from_rows(rows, "global_state"),
            Err(SyncError::MalformedDocument(_))
        ));

        let rows = vec![row("global_state", json!(null))];
        assert!(matches!(
            document_from_rows(rows, "global_state"),
            Err(SyncError::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_describe_failure_truncates_body() {
        let long = "x".repeat(500);
        let message = describe_failure(StatusCode::UNAUTHORIZED, &long);
        assert!(message.starts_with("server responded 401 Unauthorized: "));
        assert!(message.len() < 300);
        assert_eq!(
            describe_failure(StatusCode::BAD_GATEWAY, ""),
            "server responded 502 Bad Gateway"
        );
    }

    #[tokio::test]
    async fn test_pull_unreachable_endpoint_is_connect_error() {
        // Port 9 on localhost is the discard port; nothing listens there in CI
        let client = client("http://127.0.0.1:9");
        assert!(matches!(
            client.pull().await,
            Err(SyncError::Connect { .. })
        ));
    }
}
