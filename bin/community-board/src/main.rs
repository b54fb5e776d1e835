//! # Community Board Binary
//!
//! Reads settings, picks a storage backend, and serves the JSON API.

mod config;
mod storage;

use actix_files::Files;
use actix_web::{web, App, HttpServer};
use anyhow::Context as _;
use cb_api::middleware::{cors_policy, standard_middleware};
use cb_api::{configure_routes, AppState};
use cb_core::Forum;
use cb_identity::SimpleIdentityProvider;

use crate::config::Settings;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = Settings::load().context("failed to load settings")?;

    // 1. Storage, chosen once for the whole session
    let store = storage::select_store(&settings).await?;

    // 2. Identity
    let salt = settings
        .identity
        .salt
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let identity = SimpleIdentityProvider::new(&salt);

    // 3. Forum state shared by every worker
    let forum = Forum::new(store, Box::new(identity), settings.storage.max_posts).await;
    let state = web::Data::new(AppState { forum });

    let api_prefix = settings.server.api_prefix.clone();
    let static_dir = settings.server.static_dir.clone();
    let bind = (settings.server.host.clone(), settings.server.port);

    log::info!(
        "Community board starting on http://{}:{}{} ({} store)",
        bind.0,
        bind.1,
        api_prefix,
        state.forum.store_kind()
    );

    let server_state = state.clone();
    let result = HttpServer::new(move || {
        let static_dir = static_dir.clone();
        App::new()
            .app_data(server_state.clone())
            .wrap(cors_policy())
            .wrap(standard_middleware())
            .service(web::scope(&api_prefix).configure(configure_routes))
            .configure(move |cfg| {
                if let Some(dir) = static_dir {
                    cfg.service(Files::new("/", dir).index_file("index.html"));
                }
            })
    })
    .bind(bind)
    .context("failed to bind the HTTP listener")?
    .run()
    .await;

    state.forum.close().await;
    log::info!("Community board stopped");

    result.context("HTTP server failed")
}
