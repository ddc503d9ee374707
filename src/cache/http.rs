//! Cache provider backed by a plain HTTP store
//!
//! The store answers `GET`/`PUT` on `{url}/index.json` and
//! `{url}/artifacts/<artifact-id>.tar.gz`. Requests are blocking and run on
//! the blocking thread pool.

use crate::cache::index::CacheIndex;
use crate::cache::provider::{validate_artifact_id, ArtifactReader, CacheProvider};
use crate::error::{GbuildError, GbuildResult};
use async_trait::async_trait;
use std::io::Read;
use tokio::io::AsyncReadExt;
use tracing::debug;

const PROVIDER: &str = "http";

/// Artifact store reachable over HTTP
pub struct HttpCacheProvider {
    base_url: String,
}

impl HttpCacheProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn index_url(&self) -> String {
        format!("{}/index.json", self.base_url)
    }

    pub fn artifact_url(&self, artifact_id: &str) -> GbuildResult<String> {
        if !validate_artifact_id(artifact_id) {
            return Err(GbuildError::provider(
                PROVIDER,
                format!("invalid artifact id {:?}", artifact_id),
            ));
        }
        Ok(format!("{}/artifacts/{}.tar.gz", self.base_url, artifact_id))
    }
}

/// Outcome of a blocking GET
enum Fetched {
    Body(Vec<u8>),
    NotFound,
}

fn blocking_get(url: &str) -> GbuildResult<Fetched> {
    debug!("GET {}", url);
    match ureq::get(url).call() {
        Ok(response) => {
            let mut body = Vec::new();
            response
                .into_body()
                .into_reader()
                .read_to_end(&mut body)
                .map_err(|e| GbuildError::provider(PROVIDER, format!("reading {}: {}", url, e)))?;
            Ok(Fetched::Body(body))
        }
        Err(ureq::Error::StatusCode(404)) => Ok(Fetched::NotFound),
        Err(e) => Err(GbuildError::provider(PROVIDER, format!("GET {}: {}", url, e))),
    }
}

fn blocking_put(url: &str, content_type: &str, body: &[u8]) -> GbuildResult<()> {
    debug!("PUT {} ({} bytes)", url, body.len());
    ureq::put(url)
        .header("Content-Type", content_type)
        .send(body)
        .map_err(|e| GbuildError::provider(PROVIDER, format!("PUT {}: {}", url, e)))?;
    Ok(())
}

async fn run_blocking<T, F>(f: F) -> GbuildResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> GbuildResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GbuildError::Internal(format!("HTTP worker panicked: {}", e)))?
}

#[async_trait]
impl CacheProvider for HttpCacheProvider {
    async fn get_index(&self) -> GbuildResult<CacheIndex> {
        let url = self.index_url();
        match run_blocking(move || blocking_get(&url)).await? {
            Fetched::Body(body) => Ok(serde_json::from_slice(&body)?),
            Fetched::NotFound => {
                debug!("Remote store has no index yet");
                Ok(CacheIndex::default())
            }
        }
    }

    async fn put_index(&self, index: &CacheIndex) -> GbuildResult<()> {
        let url = self.index_url();
        let body = serde_json::to_vec(index)?;
        run_blocking(move || blocking_put(&url, "application/json", &body)).await
    }

    async fn get_cache(&self, artifact_id: &str) -> GbuildResult<ArtifactReader> {
        let url = self.artifact_url(artifact_id)?;
        match run_blocking(move || blocking_get(&url)).await? {
            Fetched::Body(body) => Ok(Box::new(std::io::Cursor::new(body))),
            Fetched::NotFound => Err(GbuildError::CacheArtifactNotFound(artifact_id.to_string())),
        }
    }

    async fn put_cache(&self, artifact_id: &str, mut data: ArtifactReader) -> GbuildResult<()> {
        let url = self.artifact_url(artifact_id)?;
        let mut body = Vec::new();
        data.read_to_end(&mut body)
            .await
            .map_err(|e| GbuildError::io(format!("reading artifact {}", artifact_id), e))?;
        run_blocking(move || blocking_put(&url, "application/gzip", &body)).await
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}
