//! The HTTP seam between the sampler and the network.

use async_trait::async_trait;
use bytes::Bytes;
use http::{StatusCode, Uri};
use http_body_util::{BodyExt, Empty};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::Duration;
use tokio::time;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Issues GET requests.
#[async_trait]
pub trait Fetch {
    async fn get(&self, uri: &Uri) -> Result<Reply, FetchError>;
}

/// The parts of a response that matter for sampling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
}

/// Why a single attempt did not produce a usable response.
#[derive(Debug, thiserror::Error)]
pub enum Failure {
    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// A plain-HTTP client that bounds every request with a timeout.
#[derive(Clone, Debug)]
pub struct HttpFetch {
    client: Client<HttpConnector, Empty<Bytes>>,
    timeout: Duration,
}

// === impl Reply ===

impl Reply {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn status(status: StatusCode) -> Self {
        Self::new(status, Bytes::new())
    }
}

// === impl Failure ===

impl Failure {
    /// The HTTP status of the failed attempt, if the backend answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Fetch(_) => None,
        }
    }
}

// === impl HttpFetch ===

impl HttpFetch {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client, timeout }
    }
}

impl Default for HttpFetch {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Fetch for HttpFetch {
    async fn get(&self, uri: &Uri) -> Result<Reply, FetchError> {
        let request = async {
            let rsp = self
                .client
                .get(uri.clone())
                .await
                .map_err(|e| FetchError::Transport(e.into()))?;
            let status = rsp.status();
            let body = rsp
                .into_body()
                .collect()
                .await
                .map_err(|e| FetchError::Transport(e.into()))?
                .to_bytes();
            Ok::<_, FetchError>(Reply { status, body })
        };
        match time::timeout(self.timeout, request).await {
            Ok(res) => res,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }
}
