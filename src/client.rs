use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Routes;
use crate::error::TransportError;
use crate::extract::FieldKind;
use crate::orchestrate::StepKind;
use crate::session::SessionId;

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NewChatResponse {
    #[serde(default)]
    session_id: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    session_id: &'a SessionId,
    user_input: &'a str,
}

/// Reply to a chat turn: either displayable text or a marker-wrapped directive.
/// The server may send both (text is then a placeholder); `null` reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub response_text: Option<String>,
    #[serde(default)]
    pub orchestration_command: Option<String>,
}

/// One orchestration step call, built fresh for each invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRequest {
    pub step: StepKind,
    pub session_id: SessionId,
    pub customer_info: BTreeMap<FieldKind, String>,
}

impl StepRequest {
    pub fn new(step: StepKind, session_id: SessionId) -> Self {
        Self { step, session_id, customer_info: BTreeMap::new() }
    }

    pub fn with_field(mut self, kind: FieldKind, value: String) -> Self {
        self.customer_info.insert(kind, value);
        self
    }
}

// ── Backend seam ──────────────────────────────────────────────────────────────

/// The three round trips the controller makes. Each is a single request with
/// no retry and no timeout override.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn new_chat(&self) -> Result<SessionId, TransportError>;

    async fn chat(&self, session: &SessionId, user_input: &str) -> Result<ChatReply, TransportError>;

    /// Step results are polymorphic over the step kind, so the raw JSON is
    /// handed back and decoded by the caller.
    async fn run_step(&self, request: &StepRequest) -> Result<Value, TransportError>;
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct Client {
    http: reqwest::Client,
    pub endpoint: String,
    routes: Routes,
}

impl Client {
    pub fn new(endpoint: String, routes: Routes) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            routes,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Backend for Client {
    async fn new_chat(&self) -> Result<SessionId, TransportError> {
        let resp = self.http.get(self.url(&self.routes.new_chat)).send().await?;
        let body: NewChatResponse = decode(resp).await?;
        if body.session_id.trim().is_empty() {
            return Err(TransportError::MissingSession);
        }
        Ok(SessionId::new(body.session_id))
    }

    async fn chat(&self, session: &SessionId, user_input: &str) -> Result<ChatReply, TransportError> {
        let resp = self
            .http
            .post(self.url(&self.routes.chat))
            .header("Content-Type", "application/json")
            .json(&ChatRequest { session_id: session, user_input })
            .send()
            .await?;
        decode(resp).await
    }

    async fn run_step(&self, request: &StepRequest) -> Result<Value, TransportError> {
        let resp = self
            .http
            .post(self.url(&self.routes.orchestrate))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;
        decode(resp).await
    }
}

/// Read the body, reject non-2xx statuses, then parse JSON.
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, TransportError> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(TransportError::Status { status, body: text });
    }
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one connection, capture the raw request, answer with `status` + `body`.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }
            let reply = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(reply.as_bytes()).await.unwrap();
            sock.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    fn client(endpoint: String) -> Client {
        Client::new(endpoint, Routes::default())
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let c = client("http://localhost:5000/".to_string());
        assert_eq!(c.url("/chat"), "http://localhost:5000/chat");
        assert_eq!(c.url("orchestrate"), "http://localhost:5000/orchestrate");
    }

    #[test]
    fn test_step_request_wire_shape() {
        let req = StepRequest::new(StepKind::VerifyKyc, SessionId::new("sess_1"))
            .with_field(FieldKind::CustomerId, "cust9f2a".to_string());
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "step": "VERIFY_KYC",
                "session_id": "sess_1",
                "customer_info": { "customer_id": "cust9f2a" }
            })
        );

        let req = StepRequest::new(StepKind::Underwrite, SessionId::new("sess_1"))
            .with_field(FieldKind::LoanAmount, "5000".to_string());
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["step"], "UNDERWRITE");
        assert_eq!(json["customer_info"]["loan_amount"], "5000");
    }

    #[test]
    fn test_chat_reply_accepts_nulls_and_missing_fields() {
        let r: ChatReply = serde_json::from_str(r#"{"response_text":"hi"}"#).unwrap();
        assert_eq!(r.response_text.as_deref(), Some("hi"));
        assert_eq!(r.orchestration_command, None);

        let r: ChatReply = serde_json::from_str(
            r#"{"response_text":"Processing request...","orchestration_command":"[[FLASK_CALL:UNDERWRITE]]"}"#,
        )
        .unwrap();
        assert_eq!(r.orchestration_command.as_deref(), Some("[[FLASK_CALL:UNDERWRITE]]"));

        let r: ChatReply =
            serde_json::from_str(r#"{"response_text":"ok","orchestration_command":null}"#).unwrap();
        assert_eq!(r.orchestration_command, None);
    }

    #[tokio::test]
    async fn test_new_chat_reads_session_id() {
        let (url, server) = serve_once("200 OK", r#"{"session_id":"sess_1700000000"}"#).await;
        let id = client(url).new_chat().await.unwrap();
        assert_eq!(id.as_str(), "sess_1700000000");
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /new_chat "));
    }

    #[tokio::test]
    async fn test_new_chat_rejects_empty_id() {
        let (url, _server) = serve_once("200 OK", r#"{"session_id":""}"#).await;
        let err = client(url).new_chat().await.unwrap_err();
        assert!(matches!(err, TransportError::MissingSession));
    }

    #[tokio::test]
    async fn test_chat_posts_session_and_input() {
        let (url, server) = serve_once("200 OK", r#"{"response_text":"Hello!"}"#).await;
        let reply = client(url)
            .chat(&SessionId::new("sess_1"), "what is EMI?")
            .await
            .unwrap();
        assert_eq!(reply.response_text.as_deref(), Some("Hello!"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /chat "));
        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let json: Value = serde_json::from_str(body).unwrap();
        assert_eq!(json, serde_json::json!({"session_id": "sess_1", "user_input": "what is EMI?"}));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let (url, _server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let err = client(url)
            .chat(&SessionId::new("sess_1"), "hi")
            .await
            .unwrap_err();
        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status.as_u16(), 500);
                assert!(body.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_undecodable_body_is_reported() {
        let (url, _server) = serve_once("200 OK", "<html>not json</html>").await;
        let err = client(url)
            .run_step(&StepRequest::new(StepKind::Underwrite, SessionId::new("s")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_http_error() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = client(format!("http://{addr}")).new_chat().await.unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
    }
}
