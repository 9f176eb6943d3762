//! Transparent forwarding to services on loopback.
//!
//! A thin hyper client per proxied request: connect to `127.0.0.1:<port>`,
//! hand the request over, stream the response back. Protocol upgrades
//! (websockets) are joined with a bidirectional byte copy once both sides
//! have switched protocols.

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::ProxyError;

/// Forwards one plain HTTP request to the loopback service on `port`.
///
/// The caller has already rewritten headers; this rewrites the URI to
/// origin form and the Host header to the loopback authority. The
/// response body streams back unbuffered.
///
/// # Errors
/// [`ProxyError::UpstreamUnavailable`] when the service refuses the
/// connection, [`ProxyError::Request`] for handshake or send failures.
pub async fn forward(
    port: u16,
    request: Request<Full<Bytes>>,
) -> Result<Response<Incoming>, ProxyError> {
    let mut sender = connect(port, false).await?;
    let request = into_origin_form(port, request)?;
    sender
        .send_request(request)
        .await
        .map_err(|e| ProxyError::Request(format!("forward to port {port}: {e}")))
}

/// Forwards a protocol-upgrade request and, on `101 Switching Protocols`,
/// splices the client and upstream connections together.
///
/// The request must still carry its server-side `OnUpgrade` extension;
/// building the forwarded request with `Request::from_parts` preserves it.
///
/// # Errors
/// Same surface as [`forward`].
pub async fn forward_upgrade(
    port: u16,
    mut request: Request<Full<Bytes>>,
) -> Result<Response<Incoming>, ProxyError> {
    let downstream = hyper::upgrade::on(&mut request);
    let mut sender = connect(port, true).await?;
    let request = into_origin_form(port, request)?;
    let mut response = sender
        .send_request(request)
        .await
        .map_err(|e| ProxyError::Request(format!("forward upgrade to port {port}: {e}")))?;

    if response.status() == StatusCode::SWITCHING_PROTOCOLS {
        let upstream = hyper::upgrade::on(&mut response);
        tokio::spawn(async move {
            let (downstream, upstream) = match tokio::join!(downstream, upstream) {
                (Ok(d), Ok(u)) => (d, u),
                (d, u) => {
                    tracing::warn!(
                        port,
                        downstream_ok = d.is_ok(),
                        upstream_ok = u.is_ok(),
                        "upgrade completion failed"
                    );
                    return;
                }
            };
            let mut downstream = TokioIo::new(downstream);
            let mut upstream = TokioIo::new(upstream);
            match tokio::io::copy_bidirectional(&mut downstream, &mut upstream).await {
                Ok((to_upstream, to_client)) => {
                    tracing::debug!(port, to_upstream, to_client, "upgraded stream closed");
                }
                Err(e) => tracing::debug!(port, "upgraded stream error: {e}"),
            }
        });
    }
    Ok(response)
}

/// Opens a loopback connection and performs the HTTP/1 handshake,
/// driving the connection in the background.
async fn connect(
    port: u16,
    upgrades: bool,
) -> Result<hyper::client::conn::http1::SendRequest<Full<Bytes>>, ProxyError> {
    let stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .map_err(|e| ProxyError::UpstreamUnavailable { port, reason: e.to_string() })?;
    let io = TokioIo::new(stream);
    let (sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| ProxyError::Request(format!("handshake with port {port}: {e}")))?;
    tokio::spawn(async move {
        let result = if upgrades { conn.with_upgrades().await } else { conn.await };
        if let Err(e) = result {
            tracing::debug!(port, "proxy connection closed: {e}");
        }
    });
    Ok(sender)
}

/// Rewrites the request URI to origin form and points Host at loopback.
fn into_origin_form(
    port: u16,
    request: Request<Full<Bytes>>,
) -> Result<Request<Full<Bytes>>, ProxyError> {
    let (mut parts, body) = request.into_parts();
    let path_and_query =
        parts.uri.path_and_query().map_or("/", hyper::http::uri::PathAndQuery::as_str);
    parts.uri = Uri::builder()
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ProxyError::Request(format!("origin-form uri: {e}")))?;
    let authority = format!("127.0.0.1:{port}");
    let host = authority
        .parse()
        .map_err(|e| ProxyError::Request(format!("host header: {e}")))?;
    parts.headers.insert(hyper::header::HOST, host);
    Ok(Request::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_request(uri: &str) -> Request<Full<Bytes>> {
        match Request::builder().uri(uri).body(Full::new(Bytes::new())) {
            Ok(r) => r,
            Err(e) => panic!("request build failed: {e}"),
        }
    }

    #[test]
    fn origin_form_rewrites_uri_and_host() {
        let request = empty_request("https://8080-box-tok.example.com/api/x?y=1");
        let rewritten = match into_origin_form(9999, request) {
            Ok(r) => r,
            Err(e) => panic!("rewrite failed: {e}"),
        };
        assert_eq!(rewritten.uri().to_string(), "/api/x?y=1");
        let host = rewritten.headers().get(hyper::header::HOST);
        assert_eq!(host.and_then(|h| h.to_str().ok()), Some("127.0.0.1:9999"));
    }

    #[test]
    fn origin_form_defaults_empty_path() {
        let request = empty_request("https://example.com");
        let rewritten = match into_origin_form(8080, request) {
            Ok(r) => r,
            Err(e) => panic!("rewrite failed: {e}"),
        };
        assert_eq!(rewritten.uri().to_string(), "/");
    }

    #[tokio::test]
    async fn refused_connection_maps_to_upstream_unavailable() {
        // Nothing listens on this port in the test environment.
        let result = forward(59999, empty_request("/")).await;
        assert!(
            matches!(result, Err(ProxyError::UpstreamUnavailable { port: 59999, .. })),
            "connection refusal must map to UpstreamUnavailable: {result:?}"
        );
    }

    #[tokio::test]
    async fn forward_round_trips_through_a_local_server() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
            Ok(l) => l,
            Err(e) => panic!("bind failed: {e}"),
        };
        let port = match listener.local_addr() {
            Ok(a) => a.port(),
            Err(e) => panic!("local_addr failed: {e}"),
        };
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello",
                    )
                    .await;
            }
        });

        let response = match forward(port, empty_request("/ping")).await {
            Ok(r) => r,
            Err(e) => panic!("forward failed: {e}"),
        };
        assert_eq!(response.status(), StatusCode::OK);
        let body = match http_body_util::BodyExt::collect(response.into_body()).await {
            Ok(b) => b.to_bytes(),
            Err(e) => panic!("body read failed: {e}"),
        };
        assert_eq!(&body[..], b"hello");
    }
}
