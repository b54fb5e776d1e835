//! Backend selection, evaluated once at start-up.
//!
//! With `backend = "auto"` a hosted store is preferred when credentials are
//! configured and it answers a probe; the local tier for the configured
//! context then backs it for single failed operations. Otherwise the local
//! tier is used on its own for the whole session.

use anyhow::Context as _;
use cb_core::{MemoryStore, PostStore, TieredStore};

use crate::config::{Backend, Context, Settings};

pub async fn select_store(settings: &Settings) -> anyhow::Result<Box<dyn PostStore>> {
    match settings.storage.backend {
        Backend::File => file_store(settings),
        Backend::Kv => kv_store(settings).await,
        Backend::Memory => Ok(Box::new(MemoryStore::new())),
        Backend::Remote => remote_store(settings)?
            .context("remote backend selected but remote.url/remote.api_key are not set"),
        Backend::Auto => {
            let local = local_store(settings).await?;
            let Some(remote) = remote_store(settings)? else {
                log::info!("no hosted store configured, using the {} store", local.kind());
                return Ok(local);
            };
            match remote.ping().await {
                Ok(()) => {
                    log::info!("using the hosted store with the {} store as fallback", local.kind());
                    Ok(Box::new(TieredStore::new(remote).with_fallback(local)))
                }
                Err(err) => {
                    log::warn!(
                        "hosted store unreachable ({err:#}), using the {} store for this session",
                        local.kind()
                    );
                    remote.close().await;
                    Ok(local)
                }
            }
        }
    }
}

async fn local_store(settings: &Settings) -> anyhow::Result<Box<dyn PostStore>> {
    match settings.storage.context {
        Context::Server => file_store(settings),
        Context::Client => kv_store(settings).await,
    }
}

#[cfg(feature = "store-file")]
fn file_store(settings: &Settings) -> anyhow::Result<Box<dyn PostStore>> {
    let path = settings.storage.data_file.clone();
    Ok(Box::new(cb_store_file::FileStore::new(path)))
}

#[cfg(not(feature = "store-file"))]
fn file_store(_settings: &Settings) -> anyhow::Result<Box<dyn PostStore>> {
    anyhow::bail!("the file store is not compiled in (feature `store-file`)")
}

#[cfg(feature = "store-kv")]
async fn kv_store(settings: &Settings) -> anyhow::Result<Box<dyn PostStore>> {
    let store = cb_store_kv::KvStore::new(&settings.storage.kv_url).await?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "store-kv"))]
async fn kv_store(_settings: &Settings) -> anyhow::Result<Box<dyn PostStore>> {
    anyhow::bail!("the key/value store is not compiled in (feature `store-kv`)")
}

#[cfg(feature = "store-remote")]
fn remote_store(settings: &Settings) -> anyhow::Result<Option<Box<dyn PostStore>>> {
    use secrecy::{ExposeSecret, SecretString};

    let Some((url, key)) = settings.remote.credentials() else {
        return Ok(None);
    };
    let key = SecretString::from(key.expose_secret().to_string());
    let store: Box<dyn PostStore> = Box::new(cb_store_remote::RemoteStore::new(url, key)?);
    Ok(Some(store))
}

#[cfg(not(feature = "store-remote"))]
fn remote_store(settings: &Settings) -> anyhow::Result<Option<Box<dyn PostStore>>> {
    if settings.remote.credentials().is_some() {
        log::warn!("remote credentials are set but the hosted store is not compiled in");
    }
    Ok(None)
}
