//! Contains a remote implementation using etcd's v3 JSON gateway to interact with the store.
//!
//! The gateway exposes the gRPC KV service over plain HTTP. Keys and values travel base64-encoded,
//! and 64-bit integers are rendered as JSON strings.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::{IntoUrl, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::client::{DeleteResponse, KvClient, PutResponse};
use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("kvchurn/", env!("CARGO_PKG_VERSION"));

/// Default time allowed for establishing a connection to the store.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(4);

/// Builder to create an [`EtcdClient`].
#[must_use]
#[derive(Debug)]
pub struct EtcdClientBuilder {
    endpoint: String,
    dial_timeout: Duration,
    request_timeout: Option<Duration>,
}

impl EtcdClientBuilder {
    /// Sets the time allowed for connecting to the store, including the startup probe.
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Sets an upper bound for every single request. Unbounded by default.
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builds the client without contacting the store.
    ///
    /// # Errors
    ///
    /// This method fails if the endpoint is not a valid address or the [`reqwest::Client`] fails
    /// to build.
    pub fn build(self) -> Result<EtcdClient> {
        let base_url = endpoint_url(&self.endpoint)?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.dial_timeout)
            .user_agent(USER_AGENT);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(EtcdClient {
            http: builder.build()?,
            base_url,
            dial_timeout: self.dial_timeout,
        })
    }

    /// Builds the client and verifies that the store answers within the dial timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the store cannot be reached or rejects the status request.
    pub async fn connect(self) -> Result<EtcdClient> {
        let client = self.build()?;
        client.probe().await.map_err(|source| Error::Connect {
            endpoint: client.base_url.clone(),
            source: Box::new(source),
        })?;
        Ok(client)
    }
}

/// A [`KvClient`] talking to a single etcd member through its JSON gateway.
#[derive(Clone, Debug)]
pub struct EtcdClient {
    http: reqwest::Client,
    base_url: String,
    dial_timeout: Duration,
}

impl EtcdClient {
    /// Creates a builder for the given endpoint.
    ///
    /// A bare `host:port` endpoint is treated as `http://host:port`.
    pub fn builder(endpoint: impl Into<String>) -> EtcdClientBuilder {
        EtcdClientBuilder {
            endpoint: endpoint.into(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            request_timeout: None,
        }
    }

    /// The base URL all requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn probe(&self) -> Result<()> {
        let status: StatusResponse = tokio::time::timeout(
            self.dial_timeout,
            self.call("/v3/maintenance/status", &serde_json::json!({})),
        )
        .await
        .map_err(|_| Error::Status {
            status: StatusCode::GATEWAY_TIMEOUT,
            message: format!("no response within {:?}", self.dial_timeout),
        })??;

        tracing::debug!(version = %status.version, "connected to store");
        Ok(())
    }

    async fn call<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<GatewayError>(&text) {
                Ok(error) => error.message.or(error.error).unwrap_or(text),
                Err(_) => text,
            };
            return Err(Error::Status { status, message });
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl KvClient for EtcdClient {
    async fn put(&self, key: &str, value: &[u8]) -> Result<PutResponse> {
        let request = KeyValueRequest {
            key: STANDARD.encode(key),
            value: Some(STANDARD.encode(value)),
        };
        let response: PutReply = self.call("/v3/kv/put", &request).await?;

        Ok(PutResponse {
            revision: response.header.revision,
        })
    }

    async fn delete(&self, key: &str) -> Result<DeleteResponse> {
        let request = KeyValueRequest {
            key: STANDARD.encode(key),
            value: None,
        };
        let response: DeleteRangeReply = self.call("/v3/kv/deleterange", &request).await?;

        Ok(DeleteResponse {
            deleted: response.deleted,
            revision: response.header.revision,
        })
    }
}

fn endpoint_url(endpoint: &str) -> Result<String> {
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_owned()
    } else {
        format!("http://{endpoint}")
    };

    let url = parse_url(with_scheme).map_err(|source| Error::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
        source,
    })?;

    Ok(url.as_str().trim_end_matches('/').to_owned())
}

fn parse_url(url: impl IntoUrl) -> reqwest::Result<Url> {
    url.into_url()
}

#[derive(Debug, Serialize)]
struct KeyValueRequest {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseHeader {
    #[serde(default, deserialize_with = "int64::deserialize")]
    revision: i64,
}

#[derive(Debug, Deserialize)]
struct PutReply {
    #[serde(default)]
    header: ResponseHeader,
}

#[derive(Debug, Deserialize)]
struct DeleteRangeReply {
    #[serde(default)]
    header: ResponseHeader,
    // Omitted by the gateway when zero.
    #[serde(default, deserialize_with = "int64::deserialize")]
    deleted: i64,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    error: Option<String>,
    message: Option<String>,
}

/// The gateway encodes `int64` as a string, but numbers are accepted as well.
mod int64 {
    use serde::{Deserialize, Deserializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(i64),
        String(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::String(value) => value.parse().map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_endpoint_gets_http_scheme() {
        assert_eq!(
            endpoint_url("localhost:2379").unwrap(),
            "http://localhost:2379"
        );
        assert_eq!(
            endpoint_url("https://etcd.internal:2379/").unwrap(),
            "https://etcd.internal:2379"
        );
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let err = EtcdClient::builder("http://").build().unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint { .. }), "{err:?}");
    }

    #[test]
    fn parses_gateway_replies() {
        let put: PutReply = serde_json::from_str(
            r#"{"header":{"cluster_id":"14841639068965178418","member_id":"10276657743932975437","revision":"42","raft_term":"2"}}"#,
        )
        .unwrap();
        assert_eq!(put.header.revision, 42);

        let delete: DeleteRangeReply =
            serde_json::from_str(r#"{"header":{"revision":"43"},"deleted":"1"}"#).unwrap();
        assert_eq!(delete.header.revision, 43);
        assert_eq!(delete.deleted, 1);

        let delete: DeleteRangeReply =
            serde_json::from_str(r#"{"header":{"revision":"43"}}"#).unwrap();
        assert_eq!(delete.deleted, 0);

        let delete: DeleteRangeReply =
            serde_json::from_str(r#"{"header":{"revision":44},"deleted":2}"#).unwrap();
        assert_eq!(delete.header.revision, 44);
        assert_eq!(delete.deleted, 2);
    }

    #[test]
    fn encodes_keys_as_base64() {
        let request = KeyValueRequest {
            key: STANDARD.encode("foo/abc"),
            value: None,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"key":"Zm9vL2FiYw=="}"#
        );
    }
}
