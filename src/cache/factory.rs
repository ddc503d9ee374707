//! Cache provider factory
//!
//! Selects the artifact store backend from the `[cache]` configuration.

use crate::cache::http::HttpCacheProvider;
use crate::cache::local::LocalCacheProvider;
use crate::cache::provider::CacheProvider;
use crate::config::schema::{CacheBackend, CacheConfig};
use crate::error::{GbuildError, GbuildResult};
use std::path::Path;
use std::sync::Arc;

/// Create the configured cache provider
///
/// A relative `dir` is resolved against the project root.
pub fn create_provider(
    config: &CacheConfig,
    project_root: &Path,
) -> GbuildResult<Arc<dyn CacheProvider>> {
    match config.backend {
        CacheBackend::Local => {
            let dir = match &config.dir {
                Some(dir) => project_root.join(dir),
                None => LocalCacheProvider::default_dir(),
            };
            Ok(Arc::new(LocalCacheProvider::new(dir)))
        }
        CacheBackend::Http => {
            let url = config.url.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| {
                GbuildError::provider("http", "cache.url must be set for the http backend")
            })?;
            Ok(Arc::new(HttpCacheProvider::new(url)))
        }
    }
}
