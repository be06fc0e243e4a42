//! Request plumbing shared by the handlers.
use axum::http::HeaderMap;
use lakeapps_core::RequestContext;
use tower_http::cors::CorsLayer;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn cors() -> CorsLayer {
    CorsLayer::permissive()
}

/// Copies inbound headers into a [`RequestContext`]. An incoming
/// `x-request-id` is kept; otherwise a fresh id is generated.
pub fn request_context(headers: &HeaderMap) -> RequestContext {
    let mut ctx = RequestContext::new();
    for (name, value) in headers {
        // Non-UTF-8 values cannot carry a token anyway.
        if let Ok(value) = value.to_str() {
            ctx.insert_header(name.as_str(), value);
        }
    }
    match ctx.non_blank_header(REQUEST_ID_HEADER).map(str::to_string) {
        Some(id) => ctx.with_request_id(id),
        None => ctx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_id_is_propagated() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req-42"));
        headers.insert("X-Forwarded-Access-Token", HeaderValue::from_static("tok"));

        let ctx = request_context(&headers);
        assert_eq!(ctx.request_id, "req-42");
        assert_eq!(ctx.header("x-forwarded-access-token"), Some("tok"));
    }

    #[test]
    fn test_request_id_generated_when_absent() {
        let ctx = request_context(&HeaderMap::new());
        assert!(!ctx.request_id.is_empty());
    }
}
