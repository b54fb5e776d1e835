//! community-board/crates/cb-api/src/middleware.rs Middleware
//!
//! Request logging and cross-origin policy.

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::Logger;

/// Access log line per request, emitted through `log` at `info`:
/// remote-ip "request-line" status size "referrer" "user-agent" time.
pub fn standard_middleware() -> Logger {
    Logger::default()
}

/// Front-ends may be served from another origin than the API.
pub fn cors_policy() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
        .allowed_header(header::CONTENT_TYPE)
        .max_age(3600)
}
