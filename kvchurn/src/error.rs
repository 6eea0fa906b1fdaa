//! Error types shared by the store clients and the driver.

use crate::phase::Phase;

/// Errors that can happen while driving a workload against a store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error emitted from the underlying [`reqwest`] client.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// The store answered a request with a non-success status.
    #[error("store responded with {status}: {message}")]
    Status {
        /// The HTTP status of the response.
        status: reqwest::StatusCode,
        /// The error message reported by the store, if any.
        message: String,
    },
    /// The configured endpoint cannot be turned into a URL.
    #[error("invalid endpoint `{endpoint}`")]
    InvalidEndpoint {
        /// The endpoint as configured.
        endpoint: String,
        /// The underlying URL error.
        #[source]
        source: reqwest::Error,
    },
    /// The store did not answer the startup probe.
    #[error("failed to connect to store at {endpoint}")]
    Connect {
        /// The endpoint that was probed.
        endpoint: String,
        /// The error returned by the probe.
        #[source]
        source: Box<Error>,
    },
    /// The phase is accepted in configuration but has no implementation.
    #[error("phase `{0}` is not implemented")]
    Unsupported(Phase),
    /// The workload parameters cannot be executed.
    #[error("invalid workload: {0}")]
    InvalidWorkload(&'static str),
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
