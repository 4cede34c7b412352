//! Asset Resolver - Get-or-Create Base Images
//!
//! Resolution order: a pre-supplied asset, then the on-disk cache keyed by
//! product name, then a fresh generation through the gateway. Re-runs never
//! regenerate an asset that already exists.

use image::ImageFormat;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::BaseAssetRequest;
use crate::brief::Product;
use crate::gateway::{Gateway, GatewayError};

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset generation failed: {0}")]
    Generation(#[from] GatewayError),

    #[error("generated asset is not a readable image: {0}")]
    InvalidImage(#[from] image::ImageError),

    #[error("asset storage error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub path: PathBuf,
    pub was_generated: bool,
}

/// Keep alphanumerics, `_` and spaces; everything else becomes `_`, then
/// spaces become `_`. Case is preserved.
pub fn safe_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == ' ' { c } else { '_' })
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

/// Cache key for a product's generated base image.
pub fn cache_key(product_name: &str) -> String {
    safe_file_stem(product_name).to_lowercase()
}

pub struct AssetResolver {
    gateway: Arc<Gateway>,
    assets_dir: PathBuf,
    products_dir: PathBuf,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AssetResolver {
    pub fn new(gateway: Arc<Gateway>, assets_dir: impl Into<PathBuf>) -> Self {
        let assets_dir = assets_dir.into();
        Self {
            gateway,
            products_dir: assets_dir.join("products"),
            assets_dir,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_path(&self, product_name: &str) -> PathBuf {
        self.products_dir.join(format!("{}.png", cache_key(product_name)))
    }

    pub fn resolve(
        &self,
        product: &Product,
        brand_theme: &str,
    ) -> Result<ResolvedAsset, AssetError> {
        if let Some(supplied) = product.asset_path.as_deref().filter(|p| !p.is_empty()) {
            let path = self.assets_dir.join(supplied);
            if path.is_file() {
                info!(product = %product.name, path = %path.display(), "Using supplied asset");
                return Ok(ResolvedAsset { path, was_generated: false });
            }
            warn!(
                product = %product.name,
                path = %path.display(),
                "Supplied asset not found, falling back to generation"
            );
        }

        let key = cache_key(&product.name);
        let path = self.cached_path(&product.name);

        // Check-then-create is serialized per cache key.
        let lock = self.key_lock(&key);
        let _guard = lock.lock();

        if path.is_file() {
            info!(product = %product.name, path = %path.display(), "Reusing cached asset");
            return Ok(ResolvedAsset { path, was_generated: false });
        }

        info!(product = %product.name, "Generating base asset");
        let bytes = self.gateway.generate_base_asset(BaseAssetRequest {
            product_name: product.name.clone(),
            product_description: product.description.clone(),
            brand_theme: brand_theme.to_string(),
        })?;

        fs::create_dir_all(&self.products_dir)?;
        persist_png(&bytes, &path)?;

        Ok(ResolvedAsset { path, was_generated: true })
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Write as PNG via a temp file and rename, re-encoding other formats.
fn persist_png(bytes: &[u8], path: &Path) -> Result<(), AssetError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = parent.join(format!(".{}.tmp", Uuid::new_v4()));

    let result = match image::guess_format(bytes)? {
        ImageFormat::Png => {
            image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
            fs::write(&tmp, bytes).map_err(AssetError::from)
        }
        _ => image::load_from_memory(bytes)?
            .save_with_format(&tmp, ImageFormat::Png)
            .map_err(AssetError::from),
    };

    if let Err(e) = result.and_then(|_| fs::rename(&tmp, path).map_err(AssetError::from)) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::ScriptedBackend;
    use crate::backend::BackendError;
    use crate::gateway::{ManualClock, RateLimiter, RetryPolicy};

    fn resolver(backend: Arc<ScriptedBackend>, dir: &Path) -> AssetResolver {
        let clock = Arc::new(ManualClock::new());
        let gateway = Gateway::new(
            backend,
            RateLimiter::per_minute(60, clock.clone()),
            RetryPolicy::default(),
            clock,
        );
        AssetResolver::new(Arc::new(gateway), dir)
    }

    fn product(name: &str) -> Product {
        Product {
            name: name.into(),
            description: "A thing".into(),
            asset_path: None,
        }
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("Eco Bottle 2.0!"), "eco_bottle_2_0_");
        assert_eq!(cache_key("Café_Latte"), "café_latte");
        assert_eq!(safe_file_stem("Trail Shoe/X"), "Trail_Shoe_X");
    }

    #[test]
    fn test_generate_then_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let resolver = resolver(backend.clone(), dir.path());

        let first = resolver.resolve(&product("Eco Bottle"), "minimal").unwrap();
        let second = resolver.resolve(&product("Eco Bottle"), "minimal").unwrap();

        assert!(first.was_generated);
        assert!(!second.was_generated);
        assert_eq!(first.path, second.path);
        assert_eq!(first.path, dir.path().join("products/eco_bottle.png"));
        assert_eq!(backend.call_count("generate_base_asset"), 1);
    }

    #[test]
    fn test_supplied_asset_is_used_unmodified() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("custom")).unwrap();
        fs::write(dir.path().join("custom/shoe.png"), b"not decoded").unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let resolver = resolver(backend.clone(), dir.path());

        let mut p = product("Trail Shoe");
        p.asset_path = Some("custom/shoe.png".into());
        let resolved = resolver.resolve(&p, "sport").unwrap();

        assert!(!resolved.was_generated);
        assert_eq!(resolved.path, dir.path().join("custom/shoe.png"));
        assert_eq!(fs::read(&resolved.path).unwrap(), b"not decoded");
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_missing_supplied_asset_falls_back_to_generation() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let resolver = resolver(backend, dir.path());

        let mut p = product("Trail Shoe");
        p.asset_path = Some("missing.png".into());
        assert!(resolver.resolve(&p, "sport").unwrap().was_generated);
    }

    #[test]
    fn test_generation_failure_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_generate(Err(BackendError::Failed("safety filter".into())));
        let resolver = resolver(backend, dir.path());

        let err = resolver.resolve(&product("Eco Bottle"), "minimal").unwrap_err();
        assert!(matches!(err, AssetError::Generation(_)));
        assert!(!resolver.cached_path("Eco Bottle").exists());
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_generate(Ok(b"definitely not an image".to_vec()));
        let resolver = resolver(backend, dir.path());

        let err = resolver.resolve(&product("Eco Bottle"), "minimal").unwrap_err();
        assert!(matches!(err, AssetError::InvalidImage(_)));
        let leftovers = fs::read_dir(dir.path().join("products")).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
