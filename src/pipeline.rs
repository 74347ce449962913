//! Model fetch pipeline: cache lookup, download, extract, locate, store.

use std::path::PathBuf;

use tokio::sync::watch;
use tracing::info;

use crate::archive::{extract_zip, locate_model, AssetDownloader};
use crate::cache::ModelCache;
use crate::config::CacheConfig;
use crate::error::{ArkError, Result};
use crate::providers::GenerationApi;
use crate::tasks::TaskPoller;

/// A model file available on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedModel {
    /// Path of the cached model file.
    pub path: PathBuf,
    /// `file://` URL of `path`.
    pub file_url: String,
    pub cache_key: String,
    /// Served from cache without downloading.
    pub from_cache: bool,
}

impl FetchedModel {
    fn new(path: PathBuf, cache_key: String, from_cache: bool) -> Self {
        let file_url = url::Url::from_file_path(&path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("file://{}", path.display()));
        Self {
            path,
            file_url,
            cache_key,
            from_cache,
        }
    }
}

/// Resolves archive URLs to cached model files.
pub struct ModelFetcher<D: AssetDownloader> {
    cache: ModelCache,
    downloader: D,
    search_dirs: Vec<String>,
    model_extension: String,
}

impl<D: AssetDownloader> ModelFetcher<D> {
    pub fn new(cache: ModelCache, downloader: D, config: &CacheConfig) -> Self {
        Self {
            cache,
            downloader,
            search_dirs: config.search_dirs.clone(),
            model_extension: config.model_extension.clone(),
        }
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Return a local copy of the model packed in the archive at `url`.
    ///
    /// A fresh cache entry is returned as-is. Otherwise the archive is
    /// downloaded and unpacked in a temporary directory (removed on return,
    /// success or not) and the model file is copied into the cache.
    pub async fn fetch(&self, url: &str) -> Result<FetchedModel> {
        let key = self.cache.key_for(url);
        info!(url, key = %key, "Resolving model");

        if let Some(path) = self.cache.lookup(&key)? {
            return Ok(FetchedModel::new(path, key, true));
        }

        info!("Not cached, downloading");
        let work = tempfile::Builder::new().prefix("model_").tempdir()?;
        let archive_path = work.path().join("model.zip");
        let bytes = self.downloader.download(url, &archive_path).await?;
        info!(bytes, "Archive downloaded");

        let extract_dir = work.path().join("extracted");
        extract_zip(&archive_path, &extract_dir).await?;

        let model = locate_model(&extract_dir, &self.search_dirs, &self.model_extension)?
            .ok_or_else(|| ArkError::ModelNotFound(extract_dir.clone()))?;

        let cached = self.cache.store(url, &key, &model)?;
        Ok(FetchedModel::new(cached, key, false))
    }
}

/// Submit an image-to-3D task, wait for it, then fetch the result.
pub async fn generate_model<A, D>(
    api: &A,
    poller: &TaskPoller<'_, A>,
    fetcher: &ModelFetcher<D>,
    image_url: &str,
    shutdown: Option<watch::Receiver<bool>>,
) -> Result<FetchedModel>
where
    A: GenerationApi + ?Sized,
    D: AssetDownloader,
{
    let task = api.create_model_task(image_url).await?;
    info!(task_id = %task.id, "Model task submitted");

    let content = poller.wait_for_completion(&task.id, shutdown).await?;
    let file_url = content.file_url.ok_or_else(|| {
        ArkError::Task(format!("Task {} finished without a file URL", task.id))
    })?;
    fetcher.fetch(&file_url).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::download::MockDownloader;
    use crate::archive::extract::build_test_zip;
    use crate::providers::MockApi;
    use std::time::Duration;
    use tempfile::TempDir;

    const URL: &str = "https://cdn.example.com/tasks/cgt-1/model.zip";

    fn fetcher(tmp: &TempDir, downloader: MockDownloader) -> ModelFetcher<MockDownloader> {
        let config = CacheConfig {
            dir: Some(tmp.path().join("cache")),
            ..Default::default()
        };
        let cache = ModelCache::from_config(&config).unwrap();
        ModelFetcher::new(cache, downloader, &config)
    }

    fn model_zip() -> Vec<u8> {
        build_test_zip(&[
            ("pbr/model.glb", b"pbr-model"),
            ("rgb/", b""),
            ("rgb/out/model.glb", b"rgb-model"),
        ])
    }

    #[tokio::test]
    async fn test_fetch_downloads_and_caches() {
        let tmp = TempDir::new().unwrap();
        let f = fetcher(&tmp, MockDownloader::serving(model_zip()));

        let model = f.fetch(URL).await.unwrap();
        assert!(!model.from_cache);
        assert_eq!(model.path, f.cache().dir().join(&model.cache_key));
        assert_eq!(std::fs::read(&model.path).unwrap(), b"rgb-model");
        assert!(model.file_url.starts_with("file://"));
        assert!(model.cache_key.ends_with(".zip"));

        let records = f.cache().records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, URL);
    }

    #[tokio::test]
    async fn test_second_fetch_served_from_cache() {
        let tmp = TempDir::new().unwrap();
        let f = fetcher(&tmp, MockDownloader::serving(model_zip()));

        let first = f.fetch(URL).await.unwrap();
        let second = f.fetch(URL).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(first.path, second.path);
        assert_eq!(f.downloader.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_without_model_file_fails() {
        let tmp = TempDir::new().unwrap();
        let zip = build_test_zip(&[("textures/albedo.png", b"png")]);
        let f = fetcher(&tmp, MockDownloader::serving(zip));

        let err = f.fetch(URL).await.unwrap_err();
        assert!(matches!(err, ArkError::ModelNotFound(_)));
        assert!(f.cache().records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_download_failure_propagates() {
        let tmp = TempDir::new().unwrap();
        let f = fetcher(&tmp, MockDownloader::failing());
        let err = f.fetch(URL).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_corrupt_index_is_not_a_cache_hit_later() {
        let tmp = TempDir::new().unwrap();
        let f = fetcher(&tmp, MockDownloader::serving(model_zip()));
        std::fs::write(f.cache().dir().join("models.json"), "[{").unwrap();
        let key = f.cache().key_for(URL);

        let err = f.fetch(URL).await.unwrap_err();
        assert!(matches!(err, ArkError::Cache(_)));
        assert!(!f.cache().dir().join(&key).exists());

        // Still broken, so the next attempt downloads again and fails again.
        assert!(f.fetch(URL).await.is_err());
        assert_eq!(f.downloader.call_count(), 2);
    }

    #[tokio::test]
    async fn test_generate_model_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let api = MockApi::with_statuses("cgt-1", &["queued", "running", "succeeded"], Some(URL));
        let poller = TaskPoller::new(&api, Duration::from_millis(1));
        let f = fetcher(&tmp, MockDownloader::serving(model_zip()));

        let model = generate_model(&api, &poller, &f, "https://img.example.com/a.png", None)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&model.path).unwrap(), b"rgb-model");
        assert_eq!(api.poll_count(), 3);
    }

    #[tokio::test]
    async fn test_generate_model_without_file_url_fails() {
        let tmp = TempDir::new().unwrap();
        let api = MockApi::with_statuses("cgt-2", &["succeeded"], None);
        let poller = TaskPoller::new(&api, Duration::from_millis(1));
        let f = fetcher(&tmp, MockDownloader::serving(model_zip()));

        let err = generate_model(&api, &poller, &f, "https://img.example.com/a.png", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("without a file URL"));
        assert_eq!(f.downloader.call_count(), 0);
    }
}
