//! # cb-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the forum.
//! Bodies arrive fully buffered and are decoded once by the JSON extractor;
//! the forum never sees partial input.

use actix_web::{web, HttpRequest, HttpResponse};
use cb_core::models::{PostDraft, ReplyDraft};
use cb_core::Forum;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;

/// State shared across all actix-web workers.
pub struct AppState {
    pub forum: Forum,
}

/// Body of both delete endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub creator_id: Option<String>,
}

/// Undecodable bodies become `400 { "error": "Invalid JSON" }`.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .content_type_required(false)
        .error_handler(|err, _req| {
            log::debug!("rejecting request body: {err}");
            ApiError::BadRequest("Invalid JSON".into()).into()
        })
}

/// Clients that did not report a creator id get one derived from their
/// address, returned in the created entity so they can delete it later.
fn resolve_creator(data: &AppState, req: &HttpRequest, reported: Option<String>) -> String {
    match reported.filter(|c| !c.trim().is_empty()) {
        Some(creator) => creator,
        None => {
            let client_ip = req
                .peer_addr()
                .map(|a| a.ip().to_string())
                .unwrap_or_default();
            data.forum.identity().derive_creator_id(&client_ip)
        }
    }
}

/// `GET /posts`
pub async fn list_posts(data: web::Data<AppState>) -> HttpResponse {
    let posts = data.forum.list_posts().await;
    HttpResponse::Ok().json(json!({ "posts": posts }))
}

/// `POST /posts`
pub async fn create_post(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<PostDraft>,
) -> Result<HttpResponse, ApiError> {
    let mut draft = body.into_inner();
    draft.creator_id = Some(resolve_creator(&data, &req, draft.creator_id.take()));

    let post = data.forum.create_post(draft).await?;
    Ok(HttpResponse::Created().json(json!({ "success": true, "post": post })))
}

/// `DELETE /posts/{post_id}`
pub async fn delete_post(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<DeleteRequest>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    data.forum
        .delete_post(&post_id, body.creator_id.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

/// `POST /posts/{post_id}/replies`
pub async fn add_reply(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<ReplyDraft>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let mut draft = body.into_inner();
    draft.creator_id = Some(resolve_creator(&data, &req, draft.creator_id.take()));

    let reply = data.forum.add_reply(&post_id, draft).await?;
    Ok(HttpResponse::Created().json(json!({ "success": true, "reply": reply })))
}

/// `DELETE /posts/{post_id}/replies/{reply_id}`
pub async fn delete_reply(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<DeleteRequest>,
) -> Result<HttpResponse, ApiError> {
    let (post_id, reply_id) = path.into_inner();
    data.forum
        .delete_reply(&post_id, &reply_id, body.creator_id.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

/// `GET /health`
pub async fn health(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok", "backend": data.forum.store_kind() }))
}

/// Fallback for any method a resource does not route.
pub async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(json!({ "error": "Method not allowed" }))
}
