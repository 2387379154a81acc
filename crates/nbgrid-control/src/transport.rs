//! Minimal HTTP/1.1 request helper shared by the HTTP adapters.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tracing::debug;

const USER_AGENT: &str = concat!("nbgrid/", env!("CARGO_PKG_VERSION"));

/// A parsed `http://host[:port][/base]` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    host: String,
    port: u16,
    base_path: String,
}

impl Endpoint {
    pub(crate) fn parse(raw: &str) -> Result<Self, String> {
        let uri: Uri = raw
            .trim()
            .parse()
            .map_err(|e| format!("invalid endpoint {raw:?}: {e}"))?;
        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(format!("unsupported endpoint scheme {other:?}: {raw}")),
            None => return Err(format!("endpoint has no scheme: {raw}")),
        }
        let host = uri
            .host()
            .ok_or_else(|| format!("endpoint has no host: {raw}"))?
            .to_string();
        let port = uri.port_u16().unwrap_or(80);
        let base_path = uri.path().trim_end_matches('/').to_string();
        Ok(Self {
            host,
            port,
            base_path,
        })
    }

    pub(crate) fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Origin-form request target for `path` under the base path.
    pub(crate) fn target(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            format!("{}/", self.base_path)
        } else {
            format!("{}/{}", self.base_path, path)
        }
    }
}

/// Status and collected body of a response.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Send one request over a fresh connection, bounded by `timeout`.
pub(crate) async fn send(
    endpoint: &Endpoint,
    method: Method,
    path: &str,
    headers: &[(&str, &str)],
    body: Bytes,
    timeout: Duration,
) -> Result<RawResponse, String> {
    let address = endpoint.address();
    let target = endpoint.target(path);

    let exchange = async {
        let stream = tokio::net::TcpStream::connect(&address)
            .await
            .map_err(|e| format!("connect {address}: {e}"))?;
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| format!("handshake {address}: {e}"))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut builder = Request::builder()
            .method(method)
            .uri(&target)
            .header("host", &address)
            .header("user-agent", USER_AGENT);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let req = builder
            .body(Full::new(body))
            .map_err(|e| format!("build request {target}: {e}"))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| format!("request {target}: {e}"))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| format!("read body {target}: {e}"))?
            .to_bytes();
        debug!(%target, %status, bytes = body.len(), "http exchange complete");
        Ok(RawResponse { status, body })
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(format!("request {target} timed out after {timeout:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port_and_base() {
        let ep = Endpoint::parse("http://127.0.0.1:4566/api/").unwrap();
        assert_eq!(ep.address(), "127.0.0.1:4566");
        assert_eq!(ep.target("/"), "/api/");
        assert_eq!(ep.target("bucket/key"), "/api/bucket/key");
    }

    #[test]
    fn default_port_is_80() {
        let ep = Endpoint::parse("http://proxy.local").unwrap();
        assert_eq!(ep.address(), "proxy.local:80");
        assert_eq!(ep.target(""), "/");
    }

    #[test]
    fn rejects_https_and_bare_hosts() {
        assert!(Endpoint::parse("https://example.com").is_err());
        assert!(Endpoint::parse("example.com").is_err());
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accept one connection, answer with `status` and `body`, and hand back
    /// the raw request text.
    pub(crate) async fn serve_once(status: u16, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status} Test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        (addr, handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}
