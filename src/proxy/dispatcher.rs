//! Dispatcher (§4.2): serves one HTTP/1.x request end-to-end — admission,
//! the health-probe shortcut, selection, header rewrite, the upstream
//! round-trip, and sticky-cookie emission. The upgrade branch delegates to
//! [`crate::proxy::upgrade`].

use crate::proxy::context::{full_body, BoxBody};
use crate::proxy::forward::{append_forwarded_for, inject_trace_headers, remove_hop_headers};
use crate::proxy::sticky;
use crate::proxy::upgrade;
use crate::registry::Backend;
use crate::responder::error_response;
use crate::selector::{select, Selection};
use crate::server::state::RouterState;
use http::header::{CONNECTION, HOST, USER_AGENT};
use http::{HeaderValue, Request, Response, StatusCode, Version};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpStream;

/// Health-probe User-Agent answered locally without consulting the Registry.
const HEALTH_PROBE_USER_AGENT: &str = "HTTP-Monitor/1.1";

/// True for any protocol version this core is willing to serve. The
/// original predicate was tautological (`!= 0 || != 1` is always true);
/// this expresses the corrected intent directly.
fn is_supported_version(version: Version) -> bool {
    matches!(version, Version::HTTP_10 | Version::HTTP_11)
}

fn is_upgrade_request(headers: &http::HeaderMap) -> bool {
    let has_connection_upgrade = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("upgrade")));

    let has_upgrade_websocket = headers
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));

    has_connection_upgrade && has_upgrade_websocket
}

/// Serve one request. Never returns an `Err` for an application-level
/// failure — every such case is translated into a response via the error
/// responder; the `Result` only covers transport-level failures hyper
/// itself can surface while reading the request.
pub async fn handle_request(
    req: Request<Incoming>,
    state: RouterState,
    peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    // Step 1: protocol admission. In practice unreachable — the listener is
    // built `.http1()`-only, so the wire parser itself refuses anything
    // else before a Request ever reaches this function. Kept as an
    // explicit, independently testable predicate rather than relying on
    // that implicit guarantee.
    if !is_supported_version(req.version()) {
        return Ok(error_response(StatusCode::BAD_REQUEST));
    }

    // Step 2: health probe shortcut.
    if req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        == Some(HEALTH_PROBE_USER_AGENT)
    {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .body(full_body("ok\n"))
            .expect("static health response is well-formed"));
    }

    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let trace_requested = req
        .headers()
        .get("x-vcap-trace")
        .map(|v| !v.as_bytes().is_empty())
        .unwrap_or(false);
    let sticky_hint = sticky::sticky_value(req.headers());

    // Step 3: selection.
    let start = Instant::now();
    let backend = match select(&*state.registry, &host, sticky_hint.as_deref()).await {
        Selection::Found(backend) => backend,
        Selection::NotFound | Selection::Unavailable => {
            state.varz.capture_bad_request();
            return Ok(error_response(StatusCode::NOT_FOUND));
        }
    };

    // Step 4: observation.
    state.registry.capture_backend_request(&backend, start);
    state.varz.capture_backend_request(&backend);

    let timeout = state.upstream_timeout();

    // Step 7: upgrade branch — detected before the forwarding header
    // transforms below, since the tunnel forwards headers verbatim.
    if is_upgrade_request(req.headers()) {
        return Ok(upgrade::tunnel(req, &backend, timeout).await);
    }

    let router_ip = state.router_ip();
    let (mut parts, body) = req.into_parts();

    // Step 6: X-Forwarded-For.
    append_forwarded_for(&mut parts.headers, peer_addr.ip());

    // Step 5: rewrite target; step 8: strip hop-by-hop, force close.
    if let Ok(host_value) = HeaderValue::from_str(&backend.address) {
        parts.headers.insert(HOST, host_value);
    }
    remove_hop_headers(&mut parts.headers);
    parts.headers.insert(CONNECTION, HeaderValue::from_static("close"));

    let upstream_req = Request::from_parts(parts, body.boxed());

    // Steps 9-10: round-trip, bounded by the configured upstream timeout.
    let upstream_elapsed_start = Instant::now();
    let forward_result = match tokio::time::timeout(timeout, forward(upstream_req, &backend)).await
    {
        Ok(result) => result,
        Err(_) => Err(format!(
            "upstream {} exceeded {:?} timeout",
            backend.address, timeout
        )),
    };
    let upstream_resp = match forward_result {
        Ok(resp) => resp,
        Err(err) => {
            state.varz.capture_backend_response(
                &backend,
                Some(err.as_str()),
                upstream_elapsed_start.elapsed(),
            );
            return Ok(error_response(StatusCode::BAD_GATEWAY));
        }
    };
    state
        .varz
        .capture_backend_response(&backend, None, upstream_elapsed_start.elapsed());

    // Step 11: header relay.
    let (mut resp_parts, resp_body) = upstream_resp.into_parts();

    // Step 12: trace headers.
    if trace_requested {
        inject_trace_headers(&mut resp_parts.headers, &router_ip, &backend);
    }

    // Step 13: stickiness emission.
    if sticky::response_starts_session(&resp_parts.headers) && !backend.private_instance_id.is_empty() {
        if let Ok(v) = HeaderValue::from_str(&sticky::sticky_set_cookie(&backend.private_instance_id)) {
            resp_parts.headers.append("set-cookie", v);
        }
    }

    // Step 14: status and body.
    Ok(Response::from_parts(resp_parts, resp_body.boxed()))
}

/// Open a fresh upstream connection and send one request on it (§1 Non-goals:
/// no persistent connections). Returns a description of the failure on error
/// so it can be reported to the Varz sink without allocating twice.
async fn forward(
    req: Request<BoxBody>,
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
        let _ = conn.await;
    });

    sender
        .send_request(req)
        .await
        .map_err(|e| format!("round-trip {}: {}", backend.address, e))
}
