//! Header transforms applied on the way to and from the backend: the
//! `X-Forwarded-For` append, hop-by-hop stripping, and the `X-Vcap-*` trace
//! headers. Patterns carried over from this codebase's header-rewriting
//! helpers, retargeted at the dispatch core's header set (§4.2).

use crate::registry::Backend;
use http::header::{HeaderName, HeaderValue, CONNECTION, TRANSFER_ENCODING};
use http::HeaderMap;
use std::net::IpAddr;

/// Append `peer_ip` to any existing `X-Forwarded-For` value.
pub fn append_forwarded_for(headers: &mut HeaderMap, peer_ip: IpAddr) {
    static XFF: HeaderName = HeaderName::from_static("x-forwarded-for");
    let peer_ip = peer_ip.to_string();

    if let Some(existing) = headers.get(&XFF).and_then(|v| v.to_str().ok()) {
        let combined = format!("{}, {}", existing, peer_ip);
        if let Ok(v) = HeaderValue::from_str(&combined) {
            headers.insert(XFF.clone(), v);
        }
    } else if let Ok(v) = HeaderValue::from_str(&peer_ip) {
        headers.insert(XFF.clone(), v);
    }
}

/// Strip headers that are meaningful only between one hop and the next.
/// Hardened beyond the historical minimal set (REDESIGN FLAGS): also
/// removes `Proxy-Connection` and `Trailer`, which the legacy
/// implementation left in place.
pub fn remove_hop_headers(headers: &mut HeaderMap) {
    let hop_headers: &[HeaderName] = &[
        CONNECTION,
        HeaderName::from_static("keep-alive"),
        HeaderName::from_static("proxy-connection"),
        HeaderName::from_static("te"),
        HeaderName::from_static("trailer"),
        HeaderName::from_static("trailers"),
        TRANSFER_ENCODING,
        HeaderName::from_static("upgrade"),
    ];
    for h in hop_headers {
        headers.remove(h);
    }
}

/// Attach the trace headers a sticky/observability-aware client may rely on:
/// `X-Vcap-Router` (this instance) and `X-Vcap-Backend` (chosen backend's
/// address).
pub fn inject_trace_headers(headers: &mut HeaderMap, router_ip: &str, backend: &Backend) {
    if let Ok(v) = HeaderValue::from_str(router_ip) {
        headers.insert(HeaderName::from_static("x-vcap-router"), v);
    }
    if let Ok(v) = HeaderValue::from_str(&backend.address) {
        headers.insert(HeaderName::from_static("x-vcap-backend"), v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_to_existing_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.1.1.1"));
        append_forwarded_for(&mut headers, "2.2.2.2".parse().unwrap());
        assert_eq!(
            headers.get("x-forwarded-for").unwrap(),
            "1.1.1.1, 2.2.2.2"
        );
    }

    #[test]
    fn sets_forwarded_for_when_absent() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "3.3.3.3".parse().unwrap());
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "3.3.3.3");
    }

    #[test]
    fn strips_hop_by_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("te", HeaderValue::from_static("trailers"));
        headers.insert("proxy-connection", HeaderValue::from_static("keep-alive"));
        headers.insert("x-custom", HeaderValue::from_static("kept"));
        remove_hop_headers(&mut headers);
        assert!(headers.get("connection").is_none());
        assert!(headers.get("te").is_none());
        assert!(headers.get("proxy-connection").is_none());
        assert_eq!(headers.get("x-custom").unwrap(), "kept");
    }
}
