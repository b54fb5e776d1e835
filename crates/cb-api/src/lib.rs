//! # cb-api
//!
//! The web routing and orchestration layer for the community board.

pub mod error;
pub mod handlers;
pub mod middleware;

use actix_web::web;

pub use error::ApiError;
pub use handlers::AppState;

/// Registers the forum routes relative to whatever scope the binary mounts
/// them under (`/api` by default). Each resource answers unrouted methods
/// with a JSON 405.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(handlers::json_config())
        // The feed and the posting endpoint
        .service(
            web::resource("/posts")
                .route(web::get().to(handlers::list_posts))
                .route(web::post().to(handlers::create_post))
                .default_service(web::to(handlers::method_not_allowed)),
        )
        .service(
            web::resource("/posts/{post_id}")
                .route(web::delete().to(handlers::delete_post))
                .default_service(web::to(handlers::method_not_allowed)),
        )
        // Replies nested under their parent post
        .service(
            web::resource("/posts/{post_id}/replies")
                .route(web::post().to(handlers::add_reply))
                .default_service(web::to(handlers::method_not_allowed)),
        )
        .service(
            web::resource("/posts/{post_id}/replies/{reply_id}")
                .route(web::delete().to(handlers::delete_reply))
                .default_service(web::to(handlers::method_not_allowed)),
        )
        .service(web::resource("/health").route(web::get().to(handlers::health)));
}
