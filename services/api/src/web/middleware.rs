//! services/api/src/web/middleware.rs
//!
//! Tenant identification for the dashboard-facing routes.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use uuid::Uuid;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Middleware that reads the tenant id from the `x-tenant-id` header.
///
/// If valid, inserts the tenant id into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_tenant(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let tenant_id = tenant_from_headers(req.headers()).ok_or_else(|| {
        warn!("Rejected request without a valid {} header", TENANT_HEADER);
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(tenant_id);
    Ok(next.run(req).await)
}

fn tenant_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn tenant_header_must_be_a_uuid() {
        let tenant = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        assert_eq!(tenant_from_headers(&headers), None);

        headers.insert(TENANT_HEADER, HeaderValue::from_static("acme"));
        assert_eq!(tenant_from_headers(&headers), None);

        headers.insert(TENANT_HEADER, HeaderValue::from_str(&tenant.to_string()).unwrap());
        assert_eq!(tenant_from_headers(&headers), Some(tenant));
    }
}
