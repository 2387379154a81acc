//! Path-style HTTP object store (`PUT`/`GET /{bucket}/{key}`).

use std::fmt::Write as _;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use tracing::info;

use crate::client::BoxFuture;
use crate::error::{ObjectStoreError, ObjectStoreResult};
use crate::store::ObjectStore;
use crate::transport::{self, Endpoint};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// [`ObjectStore`] backed by an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    endpoint: Endpoint,
    timeout: Duration,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str) -> ObjectStoreResult<Self> {
        let endpoint = Endpoint::parse(endpoint).map_err(ObjectStoreError::InvalidEndpoint)?;
        Ok(Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn put_inner(&self, bucket: &str, key: &str, body: Bytes) -> ObjectStoreResult<()> {
        let size = body.len();
        let resp = transport::send(
            &self.endpoint,
            Method::PUT,
            &object_path(bucket, key),
            &[("content-type", "application/octet-stream")],
            body,
            self.timeout,
        )
        .await
        .map_err(ObjectStoreError::Transport)?;

        if !resp.status.is_success() {
            return Err(ObjectStoreError::Rejected {
                operation: "put",
                bucket: bucket.to_string(),
                key: key.to_string(),
                status: resp.status.as_u16(),
            });
        }
        info!(%bucket, %key, size, "object stored");
        Ok(())
    }

    async fn get_inner(&self, bucket: &str, key: &str) -> ObjectStoreResult<Bytes> {
        let resp = transport::send(
            &self.endpoint,
            Method::GET,
            &object_path(bucket, key),
            &[],
            Bytes::new(),
            self.timeout,
        )
        .await
        .map_err(ObjectStoreError::Transport)?;

        match resp.status {
            s if s.is_success() => Ok(resp.body),
            StatusCode::NOT_FOUND => Err(ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            s => Err(ObjectStoreError::Rejected {
                operation: "get",
                bucket: bucket.to_string(),
                key: key.to_string(),
                status: s.as_u16(),
            }),
        }
    }
}

impl ObjectStore for HttpObjectStore {
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: Bytes,
    ) -> BoxFuture<'a, ObjectStoreResult<()>> {
        Box::pin(self.put_inner(bucket, key, body))
    }

    fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> BoxFuture<'a, ObjectStoreResult<Bytes>> {
        Box::pin(self.get_inner(bucket, key))
    }
}

/// `/{bucket}/{key}` with everything outside the unreserved set escaped.
/// Slashes inside the key are kept as path separators.
fn object_path(bucket: &str, key: &str) -> String {
    let mut path = String::with_capacity(bucket.len() + key.len() + 2);
    path.push('/');
    escape_into(&mut path, bucket);
    path.push('/');
    for (i, segment) in key.split('/').enumerate() {
        if i > 0 {
            path.push('/');
        }
        escape_into(&mut path, segment);
    }
    path
}

fn escape_into(out: &mut String, segment: &str) {
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => {
                let _ = write!(out, "%{other:02X}");
            }
        }
    }
}
