//! Error responder (§4.4): a terminal response builder for paths that never
//! reach a backend. Bodies are the canonical `<code> <reason phrase>\n` —
//! deliberately uninformative, matching a transparent proxy that should not
//! leak selection or registry state to the client.

use crate::proxy::context::{full_body, BoxBody};
use http::{Response, StatusCode};

pub fn error_response(status: StatusCode) -> Response<BoxBody> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let body = format!("{} {}\n", status.as_u16(), reason);

    Response::builder()
        .status(status)
        .header("content-type", "text/plain")
        .header("connection", "close")
        .body(full_body(body))
        .expect("static error response is well-formed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_canonical_reason_phrase() {
        let resp = error_response(StatusCode::BAD_GATEWAY);
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(resp.headers().get("connection").unwrap(), "close");
    }

    #[test]
    fn not_found_has_plain_text_body_header() {
        let resp = error_response(StatusCode::NOT_FOUND);
        assert_eq!(resp.headers().get("content-type").unwrap(), "text/plain");
    }
}
