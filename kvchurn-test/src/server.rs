//! Exposes an in-process fake of the store's JSON gateway for use in integration tests.
//!
//! ```
//! use kvchurn_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let endpoint = server.endpoint();
//!    // point a client at the endpoint...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use kvchurn::client::KvClient;
use kvchurn::memory::InMemoryStore;
use serde::{Deserialize, Serialize};

/// Version reported by the maintenance status endpoint.
pub const VERSION: &str = "3.5.0-kvchurn-test";

/// An in-process store server for use in integration tests.
///
/// The server speaks the subset of the v3 JSON gateway used by kvchurn and keeps its data in an
/// [`InMemoryStore`], which remains accessible through [`TestServer::store`]. It listens on a
/// random available port on localhost and stops when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    store: InMemoryStore,
}

impl TestServer {
    pub async fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let store = InMemoryStore::new();
        let router = Router::new()
            .route("/v3/kv/put", post(put))
            .route("/v3/kv/deleterange", post(delete_range))
            .route("/v3/maintenance/status", post(status))
            .with_state(store.clone());

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            handle,
            socket,
            store,
        }
    }

    /// Returns the address of this server in `host:port` form, without a scheme.
    pub fn endpoint(&self) -> String {
        format!("localhost:{}", self.socket.port())
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// The store backing this server.
    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Deserialize)]
struct KeyValueRequest {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResponseHeader {
    cluster_id: String,
    member_id: String,
    revision: String,
    raft_term: String,
}

impl ResponseHeader {
    fn new(revision: i64) -> Self {
        Self {
            cluster_id: "14841639068965178418".to_owned(),
            member_id: "10276657743932975437".to_owned(),
            revision: revision.to_string(),
            raft_term: "2".to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PutReply {
    header: ResponseHeader,
}

#[derive(Debug, Serialize)]
struct DeleteRangeReply {
    header: ResponseHeader,
    // Omitted when zero, like the real gateway does.
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusReply {
    header: ResponseHeader,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct GatewayErrorBody {
    error: String,
    code: i32,
    message: String,
}

#[derive(Debug)]
struct GatewayError {
    status: StatusCode,
    code: i32,
    message: String,
}

impl GatewayError {
    fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: 3,
            message: message.into(),
        }
    }
}

impl From<kvchurn::Error> for GatewayError {
    fn from(error: kvchurn::Error) -> Self {
        let status = match &error {
            kvchurn::Error::Status { status, .. } => {
                StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self {
            status,
            // `Unavailable` in gRPC terms.
            code: 14,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = GatewayErrorBody {
            error: self.message.clone(),
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn decode(field: &str, encoded: &str) -> Result<Vec<u8>, GatewayError> {
    STANDARD
        .decode(encoded)
        .map_err(|error| GatewayError::invalid_argument(format!("invalid {field}: {error}")))
}

fn decode_key(encoded: &str) -> Result<String, GatewayError> {
    String::from_utf8(decode("key", encoded)?)
        .map_err(|_| GatewayError::invalid_argument("key is not valid UTF-8"))
}

async fn put(
    State(store): State<InMemoryStore>,
    Json(request): Json<KeyValueRequest>,
) -> Result<Json<PutReply>, GatewayError> {
    let key = decode_key(&request.key)?;
    let value = match request.value {
        Some(value) => decode("value", &value)?,
        None => Vec::new(),
    };

    let response = store.put(&key, &value).await?;
    tracing::trace!(key, revision = response.revision, "put");

    Ok(Json(PutReply {
        header: ResponseHeader::new(response.revision),
    }))
}

async fn delete_range(
    State(store): State<InMemoryStore>,
    Json(request): Json<KeyValueRequest>,
) -> Result<Json<DeleteRangeReply>, GatewayError> {
    let key = decode_key(&request.key)?;

    let response = store.delete(&key).await?;
    tracing::trace!(key, deleted = response.deleted, "deleterange");

    Ok(Json(DeleteRangeReply {
        header: ResponseHeader::new(response.revision),
        deleted: (response.deleted != 0).then(|| response.deleted.to_string()),
    }))
}

async fn status(State(store): State<InMemoryStore>) -> Json<StatusReply> {
    Json(StatusReply {
        header: ResponseHeader::new(store.revision()),
        version: VERSION,
    })
}
