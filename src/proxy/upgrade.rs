//! Upgrade tunnel (§4.3): turns a WebSocket-handshake request into an
//! opaque bidirectional byte pipe.
//!
//! A raw `net.Hijacker`-style socket seizure has no hyper equivalent: the
//! server always needs a `Response` returned before it will hand over the
//! connection. This adapts the contract rather than breaking it: the
//! backend is dialed and its actual handshake response is read first, then
//! relayed to the client header-for-header, so the client still sees
//! exactly what a raw hijack would have produced. Both sides are then
//! promoted via `hyper::upgrade::on` and spliced with `copy_bidirectional`,
//! the same first-error/first-EOF-wins join the tunnel calls for.

use crate::proxy::context::{empty_body, BoxBody};
use crate::registry::Backend;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Dial `backend`, forward the original request verbatim, and read its
/// handshake response. Bounded by `timeout`, matching the same upstream
/// round-trip budget the non-upgrade forwarding path honors — this covers
/// only the dial/handshake/request phase, not the tunnel's lifetime once
/// bytes start flowing.
async fn dial_and_handshake(
    req: Request<Incoming>,
    backend: &Backend,
) -> Result<Response<Incoming>, String> {
    let stream = TcpStream::connect(&backend.address)
        .await
        .map_err(|e| format!("dial {}: {}", backend.address, e))?;
    let io = TokioIo::new(stream);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| format!("handshake {}: {}", backend.address, e))?;

    tokio::spawn(async move {
        if let Err(err) = conn.with_upgrades().await {
            debug!(error = %err, "upgrade: backend connection driver ended");
        }
    });

    sender
        .send_request(req)
        .await
        .map_err(|e| format!("round-trip {}: {}", backend.address, e))
}

/// Dial `backend`, forward `req` verbatim, and if the backend agrees to
/// switch protocols, splice the client and backend connections together in
/// a spawned task. Returns the response to hand back to the client.
pub async fn tunnel(
    mut req: Request<Incoming>,
    backend: &Backend,
    timeout: Duration,
) -> Response<BoxBody> {
    let client_upgrade = hyper::upgrade::on(&mut req);

    let backend_resp = match tokio::time::timeout(timeout, dial_and_handshake(req, backend)).await
    {
        Ok(Ok(resp)) => resp,
        Ok(Err(err)) => {
            warn!(backend_addr = %backend.address, error = %err, "upgrade: round-trip failed");
            return crate::responder::error_response(StatusCode::BAD_GATEWAY);
        }
        Err(_) => {
            warn!(backend_addr = %backend.address, ?timeout, "upgrade: round-trip timed out");
            return crate::responder::error_response(StatusCode::BAD_GATEWAY);
        }
    };

    if backend_resp.status() != StatusCode::SWITCHING_PROTOCOLS {
        // Backend declined the upgrade; relay its answer as-is and let the
        // never-awaited client_upgrade future drop harmlessly.
        let (parts, body) = backend_resp.into_parts();
        return Response::from_parts(parts, body.boxed());
    }

    let status = backend_resp.status();
    let version = backend_resp.version();
    let headers = backend_resp.headers().clone();
    let backend_upgrade = hyper::upgrade::on(backend_resp);

    let mut builder = Response::builder().status(status).version(version);
    for (name, value) in &headers {
        builder = builder.header(name, value);
    }
    let client_resp = builder
        .body(empty_body())
        .expect("relayed switching-protocols headers are well-formed");

    let backend_addr = backend.address.clone();
    tokio::spawn(async move {
        let (client_upgraded, backend_upgraded) =
            match tokio::join!(client_upgrade, backend_upgrade) {
                (Ok(c), Ok(b)) => (c, b),
                (Err(err), _) | (_, Err(err)) => {
                    warn!(backend_addr = %backend_addr, error = %err, "upgrade: promotion failed");
                    return;
                }
            };

        let mut client_io = TokioIo::new(client_upgraded);
        let mut backend_io = TokioIo::new(backend_upgraded);

        match tokio::io::copy_bidirectional(&mut client_io, &mut backend_io).await {
            Ok((to_backend, to_client)) => debug!(
                backend_addr = %backend_addr,
                bytes_to_backend = to_backend,
                bytes_to_client = to_client,
                "upgrade: tunnel closed"
            ),
            Err(err) => debug!(backend_addr = %backend_addr, error = %err, "upgrade: tunnel copy ended"),
        }
    });

    client_resp
}
