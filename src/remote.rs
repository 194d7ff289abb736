use std::future::Future;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::models::{CreatedRecord, StoredObject, User};

pub const ISSUES_COLLECTION: &str = "issues";
pub const ISSUE_IMAGES_BUCKET: &str = "issue-images";

pub trait RecordStore {
    fn create(
        &self,
        collection: &str,
        fields: Value,
    ) -> impl Future<Output = Result<CreatedRecord, RemoteError>> + Send;
}

pub trait BlobStore {
    fn upload(
        &self,
        bucket: &str,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<StoredObject, RemoteError>> + Send;
}

pub trait Identity {
    /// `Ok(None)` means nobody is signed in.
    fn current_user(&self) -> impl Future<Output = Result<Option<User>, RemoteError>> + Send;
}

pub trait ConnectivityProbe {
    fn is_online(&self) -> impl Future<Output = bool> + Send;
}

/// REST client for the hosted backend.
pub struct HttpBackend {
    client: Client,
    config: RemoteConfig,
}

impl HttpBackend {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.api_key);
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(bearer)
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

impl RecordStore for HttpBackend {
    async fn create(&self, collection: &str, fields: Value) -> Result<CreatedRecord, RemoteError> {
        let url = self.endpoint(&format!("rest/v1/{}", collection));
        debug!(%url, "Creating record");

        let response = self
            .authorized(self.client.post(&url))
            .header("Prefer", "return=representation")
            .json(&fields)
            .send()
            .await?;
        let rows: Value = error_for_status(response).await?.json().await?;

        Ok(CreatedRecord {
            id: created_id(collection, &rows)?,
        })
    }
}

/// Id of the created row. The backend answers with the inserted rows, usually
/// as an array.
fn created_id(collection: &str, rows: &Value) -> Result<String, RemoteError> {
    let row = match rows {
        Value::Array(rows) => rows.first(),
        Value::Object(_) => Some(rows),
        _ => None,
    };
    let row =
        row.ok_or_else(|| RemoteError::Malformed(format!("no row returned from {}", collection)))?;

    match row.get("id") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(RemoteError::Malformed("created row has no id".to_string())),
    }
}

impl BlobStore for HttpBackend {
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, RemoteError> {
        let url = self.endpoint(&format!("storage/v1/object/{}/{}", bucket, name));
        debug!(%url, size = bytes.len(), "Uploading blob");

        let response = self
            .authorized(self.client.post(&url))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        error_for_status(response).await?;

        Ok(StoredObject {
            path: name.to_string(),
        })
    }
}

impl Identity for HttpBackend {
    async fn current_user(&self) -> Result<Option<User>, RemoteError> {
        if self.config.access_token.is_none() {
            return Ok(None);
        }

        let response = self
            .authorized(self.client.get(self.endpoint("auth/v1/user")))
            .send()
            .await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(None);
        }

        let user: User = error_for_status(response).await?.json().await?;
        Ok(Some(user))
    }
}

impl ConnectivityProbe for HttpBackend {
    async fn is_online(&self) -> bool {
        let request = self
            .client
            .get(self.endpoint("auth/v1/health"))
            .header("apikey", &self.config.api_key);
        match request.send().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Connectivity probe failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn backend(url: &str, token: Option<&str>) -> HttpBackend {
        HttpBackend::new(RemoteConfig {
            url: url.to_string(),
            api_key: "anon".to_string(),
            access_token: token.map(str::to_string),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    /// Answers exactly one request with `status` and `body`, and hands back
    /// the raw request it received.
    async fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
                    let length = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });

        (url, handle)
    }

    fn header<'a>(request: &'a str, name: &str) -> Option<&'a str> {
        request.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }

    // ==================== Unit Tests ====================

    #[test]
    fn test_created_id_from_first_row() {
        let rows = json!([{"id": "abc"}, {"id": "def"}]);
        assert_eq!(created_id("issues", &rows).unwrap(), "abc");
    }

    #[test]
    fn test_created_id_numeric_and_object() {
        assert_eq!(created_id("issues", &json!([{"id": 42}])).unwrap(), "42");
        assert_eq!(created_id("issues", &json!({"id": 7})).unwrap(), "7");
    }

    #[test]
    fn test_created_id_malformed() {
        assert!(matches!(
            created_id("issues", &json!([])),
            Err(RemoteError::Malformed(_))
        ));
        assert!(matches!(
            created_id("issues", &json!([{"title": "no id"}])),
            Err(RemoteError::Malformed(_))
        ));
        assert!(matches!(
            created_id("issues", &json!("ok")),
            Err(RemoteError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_create_posts_row_and_reads_id() {
        let (url, server) = serve_once(201, r#"[{"id":"issue-9","title":"Pothole"}]"#).await;
        let b = backend(&url, Some("session"));

        let record = b
            .create(ISSUES_COLLECTION, json!({"title": "Pothole"}))
            .await
            .unwrap();
        assert_eq!(record.id, "issue-9");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /rest/v1/issues HTTP/1.1"));
        assert_eq!(header(&request, "prefer"), Some("return=representation"));
        assert_eq!(header(&request, "apikey"), Some("anon"));
        assert_eq!(header(&request, "authorization"), Some("Bearer session"));
        assert!(request.ends_with(r#"{"title":"Pothole"}"#));
    }

    #[tokio::test]
    async fn test_create_empty_response_is_malformed() {
        let (url, server) = serve_once(201, "[]").await;
        let result = backend(&url, None).create(ISSUES_COLLECTION, json!({})).await;
        assert!(matches!(result, Err(RemoteError::Malformed(_))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_create_rejected_keeps_status_and_body() {
        let (url, server) = serve_once(422, r#"{"message":"bad category"}"#).await;
        let result = backend(&url, None).create(ISSUES_COLLECTION, json!({})).await;
        match result {
            Err(RemoteError::Status { status, body }) => {
                assert_eq!(status, 422);
                assert!(body.contains("bad category"));
            }
            other => panic!("expected a status error, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_path_and_content_type() {
        let (url, server) = serve_once(200, r#"{"Key":"issue-images/1-2.png"}"#).await;
        let b = backend(&url, Some("session"));

        let stored = b
            .upload(ISSUE_IMAGES_BUCKET, "1-2.png", "image/png", vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(stored.path, "1-2.png");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /storage/v1/object/issue-images/1-2.png HTTP/1.1"));
        assert_eq!(header(&request, "content-type"), Some("image/png"));
        assert_eq!(header(&request, "content-length"), Some("3"));
    }

    #[tokio::test]
    async fn test_upload_failure_is_status_error() {
        let (url, server) = serve_once(413, "too large").await;
        let result = backend(&url, None)
            .upload(ISSUE_IMAGES_BUCKET, "x.jpg", "image/jpeg", vec![0; 8])
            .await;
        assert!(matches!(result, Err(RemoteError::Status { status: 413, .. })));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_current_user_with_session() {
        let (url, server) = serve_once(200, r#"{"id":"citizen-7","email":"a@b.test"}"#).await;
        let user = backend(&url, Some("session")).current_user().await.unwrap();
        assert_eq!(
            user,
            Some(User {
                id: "citizen-7".to_string()
            })
        );

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /auth/v1/user HTTP/1.1"));
        assert_eq!(header(&request, "authorization"), Some("Bearer session"));
    }

    #[tokio::test]
    async fn test_expired_session_means_no_user() {
        for status in [401, 403] {
            let (url, server) = serve_once(status, r#"{"msg":"expired"}"#).await;
            let user = backend(&url, Some("stale")).current_user().await.unwrap();
            assert_eq!(user, None, "status {}", status);
            server.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_identity_server_error_is_reported() {
        let (url, server) = serve_once(500, "boom").await;
        let result = backend(&url, Some("session")).current_user().await;
        assert!(matches!(result, Err(RemoteError::Status { status: 500, .. })));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_any_response_means_online() {
        let (url, server) = serve_once(503, "").await;
        assert!(backend(&url, None).is_online().await);
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /auth/v1/health HTTP/1.1"));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let b = backend("https://example.test/", None);
        assert_eq!(
            b.endpoint("rest/v1/issues"),
            "https://example.test/rest/v1/issues"
        );
    }

    #[tokio::test]
    async fn test_no_token_means_no_user() {
        let b = backend("http://127.0.0.1:9", None);
        assert_eq!(b.current_user().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_offline() {
        // port 9 (discard) is closed on test machines
        let b = backend("http://127.0.0.1:9", None);
        assert!(!b.is_online().await);
    }
}
