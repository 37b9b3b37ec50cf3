use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use object_store::{ObjectStore, aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory};
use url::Url;

use crate::config::StorageConfig;

/// Object stores keyed by storage strategy identifier.
pub type StrategyStores = HashMap<String, Arc<dyn ObjectStore>>;

/// Build one object store per configured storage strategy.
pub fn create_strategy_stores(storage_config: &StorageConfig) -> Result<StrategyStores> {
    let mut stores = StrategyStores::with_capacity(storage_config.strategies.len());
    for (strategy_id, strategy) in &storage_config.strategies {
        let store = create_object_store_from_dsn(&strategy.dsn)
            .with_context(|| format!("storage strategy '{strategy_id}'"))?;
        tracing::debug!(strategy_id = %strategy_id, dsn = %strategy.dsn, "Created object store");
        stores.insert(strategy_id.clone(), store);
    }
    Ok(stores)
}

/// Create an object store from a DSN string.
///
/// Supported schemes: `file:///path`, `memory://`, `s3://[key:secret@]host[:port]/bucket`.
pub fn create_object_store_from_dsn(dsn: &str) -> Result<Arc<dyn ObjectStore>> {
    let url = Url::parse(dsn).map_err(|e| anyhow!("Invalid storage DSN '{dsn}': {e}"))?;

    match url.scheme() {
        "file" => {
            let path = url.path();
            if path.is_empty() || path == "/" {
                bail!("File DSN must specify a path: file:///path/to/storage");
            }
            // file:///.data/x is relative to the working directory
            let path = path.strip_prefix('/').filter(|p| p.starts_with('.')).unwrap_or(path);
            std::fs::create_dir_all(path)
                .with_context(|| format!("creating storage directory {path}"))?;
            Ok(Arc::new(LocalFileSystem::new_with_prefix(path)?))
        }
        "memory" => Ok(Arc::new(InMemory::new())),
        "s3" => Ok(Arc::new(create_s3_builder_from_dsn(&url)?.build()?)),
        scheme => bail!("Unsupported storage scheme: {scheme}. Supported: file, memory, s3"),
    }
}

/// Create an S3 builder from a DSN.
///
/// Hosts outside `amazonaws.com` are treated as S3-compatible endpoints with path-style requests.
pub fn create_s3_builder_from_dsn(dsn: &Url) -> Result<AmazonS3Builder> {
    let host = dsn
        .host_str()
        .ok_or_else(|| anyhow!("Missing S3 host in DSN"))?;
    let bucket = dsn.path().trim_start_matches('/');
    if bucket.is_empty() {
        bail!("S3 DSN must specify a bucket: s3://host/bucket");
    }

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_region(std::env::var("AWS_DEFAULT_REGION").unwrap_or_else(|_| "us-east-1".into()));

    if !dsn.username().is_empty() {
        builder = builder
            .with_access_key_id(dsn.username())
            .with_secret_access_key(dsn.password().unwrap_or_default());
    }

    if !host.contains("amazonaws.com") {
        let scheme = if dsn.port() == Some(443) { "https" } else { "http" };
        let endpoint = match dsn.port() {
            Some(port) => format!("{scheme}://{host}:{port}"),
            None => format!("{scheme}://{host}"),
        };
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(true)
            .with_virtual_hosted_style_request(false);
    }

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use object_store::{PutPayload, path::Path};

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = create_object_store_from_dsn("memory://").unwrap();
        let path = Path::from("objects/a");
        store.put(&path, PutPayload::from_static(b"abc")).await.unwrap();
        let bytes = store.get(&path).await.unwrap().bytes().await.unwrap();
        assert_eq!(bytes.as_ref(), b"abc");
    }

    #[test]
    fn test_filesystem_store_creates_directory() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let root = temp_dir.path().join("strategy");
        let dsn = format!("file://{}", root.display());

        create_object_store_from_dsn(&dsn).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_strategy_stores_from_config() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = StorageConfig::default();
        config.strategies.insert(
            "archive".to_string(),
            StrategyConfig {
                dsn: format!("file://{}", temp_dir.path().display()),
            },
        );

        let stores = create_strategy_stores(&config).unwrap();
        assert_eq!(stores.len(), 2);
        assert!(stores.contains_key("default"));
        assert!(stores.contains_key("archive"));
    }

    #[test]
    fn test_strategy_error_names_strategy() {
        let mut config = StorageConfig::default();
        config.strategies.insert(
            "broken".to_string(),
            StrategyConfig {
                dsn: "gcs://bucket".to_string(),
            },
        );

        let err = create_strategy_stores(&config).unwrap_err();
        assert!(format!("{err:#}").contains("broken"));
        assert!(format!("{err:#}").contains("Unsupported storage scheme"));
    }

    #[test]
    fn test_invalid_dsn() {
        let err = create_object_store_from_dsn("not-a-url").unwrap_err();
        assert!(err.to_string().contains("Invalid storage DSN"));
    }

    #[test]
    fn test_file_dsn_without_path() {
        let err = create_object_store_from_dsn("file://").unwrap_err();
        assert!(err.to_string().contains("File DSN must specify a path"));
    }

    #[test]
    fn test_s3_dsn_parsing() {
        assert!(
            create_s3_builder_from_dsn(&Url::parse("s3://access:secret@localhost:9000/bucket").unwrap())
                .is_ok()
        );

        let err = create_s3_builder_from_dsn(&Url::parse("s3://localhost:9000/").unwrap()).unwrap_err();
        assert!(err.to_string().contains("must specify a bucket"));
    }
}
