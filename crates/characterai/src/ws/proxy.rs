//! HTTP CONNECT tunneling for proxied WebSocket connections.
//!
//! tokio-tungstenite has no proxy support of its own, so a proxied session
//! opens a TCP connection to the proxy, issues a CONNECT for the target
//! host, and hands the established tunnel to the TLS/WebSocket handshake.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::http::Uri;
use tracing::debug;

use crate::error::{Error, Result};

/// Upper bound on the CONNECT response head we are willing to read.
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// Establishes a CONNECT tunnel to `host:port` through `proxy_url`.
pub(crate) async fn tunnel(proxy_url: &str, host: &str, port: u16) -> Result<TcpStream> {
    let uri: Uri = proxy_url
        .parse()
        .map_err(|e| Error::InvalidArgument(format!("invalid proxy url: {e}")))?;
    let proxy_host = uri
        .host()
        .ok_or_else(|| Error::InvalidArgument("proxy url has no host".into()))?;
    let proxy_port = uri.port_u16().unwrap_or(80);

    let mut stream = TcpStream::connect((proxy_host, proxy_port))
        .await
        .map_err(|e| Error::Request(format!("cannot reach proxy {proxy_host}:{proxy_port}: {e}")))?;

    let connect = format!(
        "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\nProxy-Connection: Keep-Alive\r\n\r\n"
    );
    stream
        .write_all(connect.as_bytes())
        .await
        .map_err(|e| Error::Request(format!("proxy CONNECT write failed: {e}")))?;

    // Read the response head byte-wise; the tunnel payload must not be
    // consumed past the blank line.
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| Error::Request(format!("proxy CONNECT read failed: {e}")))?;
        if n == 0 {
            return Err(Error::Request(
                "proxy closed the connection during CONNECT".into(),
            ));
        }
        head.extend_from_slice(&byte[..n]);
        if head.len() > MAX_RESPONSE_HEAD {
            return Err(Error::Request("oversized CONNECT response from proxy".into()));
        }
    }

    let head = String::from_utf8_lossy(&head);
    let status_line = head.lines().next().unwrap_or_default();
    let status = status_line.split_whitespace().nth(1);
    if status != Some("200") {
        return Err(Error::Request(format!(
            "proxy refused CONNECT: {status_line}"
        )));
    }

    debug!(host, port, "proxy tunnel established");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn tunnel_succeeds_on_200() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .await
                .unwrap();
        });

        let stream = tunnel(&format!("http://{addr}"), "example.test", 443).await;
        assert!(stream.is_ok());
    }

    #[tokio::test]
    async fn tunnel_fails_on_non_200() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
                .await
                .unwrap();
        });

        let err = tunnel(&format!("http://{addr}"), "example.test", 443)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Request(_)));
    }

    #[tokio::test]
    async fn tunnel_rejects_bad_proxy_url() {
        let err = tunnel("::::", "example.test", 443).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
