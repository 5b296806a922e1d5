//! Publication of laws and datasets.
//!
//! [`Publisher`] archives downloaded PDFs, exports datasets from storage and
//! publishes them together with a small manifest that predicts the public
//! download URLs.

pub mod archive;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use leizilla_shared::{AppConfig, ArchiveConfig, ExportFormat, LawFilter, LawRecord, LeizillaError, Result};
use leizilla_storage::Storage;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

pub use archive::{
    ArchiveService, ArchivedItem, InternetArchive, UploadRequest, dataset_identifier,
    law_identifier, ocr_url_for,
};

/// `leis_{origin}_{year|completo}`
pub fn dataset_id(origin: &str, year: Option<i32>) -> String {
    match year {
        Some(y) => format!("leis_{origin}_{y}"),
        None => format!("leis_{origin}_completo"),
    }
}

/// File name of an exported dataset.
pub fn dataset_file_name(origin: &str, year: Option<i32>, format: ExportFormat) -> String {
    format!("{}.{}", dataset_id(origin, year), format.extension())
}

/// Result of a dataset export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub rows: usize,
}

/// Manifest written next to an exported dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub dataset_id: String,
    pub generated_at: DateTime<Utc>,
    pub origin: String,
    pub year: Option<i32>,
    pub files: ManifestFiles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFiles {
    pub parquet: String,
    /// The archive publishes one torrent per item, named after the identifier.
    pub torrent: String,
}

pub struct Publisher {
    service: Arc<dyn ArchiveService>,
    config: ArchiveConfig,
    exports_dir: PathBuf,
}

impl Publisher {
    pub fn new(service: Arc<dyn ArchiveService>, config: ArchiveConfig, exports_dir: impl Into<PathBuf>) -> Self {
        Self {
            service,
            config,
            exports_dir: exports_dir.into(),
        }
    }

    /// Publisher backed by the Internet Archive client.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = InternetArchive::new(
            &config.archive,
            &config.crawler.user_agent,
            Duration::from_secs(config.crawler.timeout_secs),
        )?;
        Ok(Self::new(
            Arc::new(client),
            config.archive.clone(),
            config.paths.exports_dir.clone(),
        ))
    }

    pub fn service(&self) -> Arc<dyn ArchiveService> {
        Arc::clone(&self.service)
    }

    pub fn exports_dir(&self) -> &Path {
        &self.exports_dir
    }

    /// Upload a law's local PDF into the laws collection.
    #[instrument(skip_all, fields(id = %law.id))]
    pub async fn archive(&self, local_path: &Path, law: &LawRecord) -> Result<ArchivedItem> {
        if !local_path.is_file() {
            return Err(LeizillaError::io(
                local_path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "PDF not found"),
            ));
        }
        let request = UploadRequest::for_law(law, &self.config.collection);
        self.service.upload(local_path, &request).await
    }

    /// Export one origin (optionally one year) to `exports_dir`.
    #[instrument(skip(self, storage))]
    pub async fn export_dataset(
        &self,
        storage: &Storage,
        origin: &str,
        year: Option<i32>,
        format: ExportFormat,
    ) -> Result<ExportOutcome> {
        let filter = LawFilter {
            year,
            ..LawFilter::for_origin(origin)
        };
        let path = self.exports_dir.join(dataset_file_name(origin, year, format));
        let rows = storage.export(&filter, format, &path).await?;
        info!(rows, path = %path.display(), "dataset exported");
        Ok(ExportOutcome { path, rows })
    }

    /// Upload an exported dataset into the datasets collection.
    #[instrument(skip(self))]
    pub async fn upload_dataset(&self, path: &Path, origin: &str, year: Option<i32>) -> Result<ArchivedItem> {
        let request = UploadRequest::for_dataset(origin, year, &self.config.datasets_collection);
        self.service.upload(path, &request).await
    }

    /// Manifest for a dataset as it will appear once uploaded.
    pub fn manifest(&self, origin: &str, year: Option<i32>) -> DatasetManifest {
        let item = dataset_identifier(origin, year);
        let base = format!("{}/{item}", self.config.download_base.trim_end_matches('/'));
        DatasetManifest {
            dataset_id: dataset_id(origin, year),
            generated_at: Utc::now(),
            origin: origin.to_string(),
            year,
            files: ManifestFiles {
                parquet: format!("{base}/{}", dataset_file_name(origin, year, ExportFormat::Parquet)),
                torrent: format!("{base}/{item}_archive.torrent"),
            },
        }
    }

    /// Write `{dataset_id}.manifest.json` into `dir`.
    pub fn write_manifest(&self, origin: &str, year: Option<i32>, dir: &Path) -> Result<PathBuf> {
        let manifest = self.manifest(origin, year);
        std::fs::create_dir_all(dir).map_err(|e| LeizillaError::io(dir, e))?;
        let path = dir.join(format!("{}.manifest.json", manifest.dataset_id));
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| LeizillaError::Export(format!("serializing manifest: {e}")))?;
        std::fs::write(&path, json).map_err(|e| LeizillaError::io(&path, e))?;
        info!(path = %path.display(), "manifest written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingArchive {
        uploads: Mutex<Vec<(PathBuf, UploadRequest)>>,
    }

    #[async_trait]
    impl ArchiveService for RecordingArchive {
        async fn upload(&self, file: &Path, request: &UploadRequest) -> Result<ArchivedItem> {
            self.uploads
                .lock()
                .unwrap()
                .push((file.to_path_buf(), request.clone()));
            Ok(ArchivedItem {
                identifier: request.identifier.clone(),
                download_url: format!("https://archive.test/download/{}/f", request.identifier),
                details_url: format!("https://archive.test/details/{}", request.identifier),
                ocr_url: format!("https://archive.test/download/{}/f_djvu.txt", request.identifier),
            })
        }

        async fn fetch_text(&self, _ocr_url: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("lz_pub_{}", Uuid::now_v7()))
    }

    fn publisher(service: Arc<RecordingArchive>, dir: &Path) -> Publisher {
        Publisher::new(service, ArchiveConfig::default(), dir.join("exports"))
    }

    fn law(id: &str, year: i32) -> LawRecord {
        let mut law = LawRecord::new(id, format!("LEI {id}"), "rondonia");
        law.year = Some(year);
        law.number = Some(id.rsplit('-').next().unwrap_or("0").to_string());
        law
    }

    #[test]
    fn dataset_names() {
        assert_eq!(
            dataset_file_name("rondonia", Some(2023), ExportFormat::Parquet),
            "leis_rondonia_2023.parquet"
        );
        assert_eq!(
            dataset_file_name("rondonia", None, ExportFormat::Jsonl),
            "leis_rondonia_completo.jsonl"
        );
    }

    #[tokio::test]
    async fn archive_uses_laws_collection() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let pdf = dir.join("a.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();

        let service = Arc::new(RecordingArchive::default());
        let item = publisher(Arc::clone(&service), &dir)
            .archive(&pdf, &law("rondonia-lei-2023-7", 2023))
            .await
            .unwrap();
        assert_eq!(item.identifier, "leizilla-rondonia-lei-2023-7");

        let uploads = service.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert!(
            uploads[0]
                .1
                .metadata
                .contains(&("collection".to_string(), "leizilla".to_string()))
        );
        drop(uploads);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn archive_missing_file_does_not_upload() {
        let service = Arc::new(RecordingArchive::default());
        let err = publisher(Arc::clone(&service), &temp_dir())
            .archive(Path::new("/nonexistent/x.pdf"), &law("rondonia-lei-2023-7", 2023))
            .await
            .unwrap_err();
        assert!(matches!(err, LeizillaError::Io { .. }));
        assert!(service.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn export_then_upload_dataset() {
        let dir = temp_dir();
        let storage = Storage::open(&dir.join("lz.db")).await.unwrap();
        storage.upsert_law(&law("rondonia-lei-2022-1", 2022)).await.unwrap();
        storage.upsert_law(&law("rondonia-lei-2023-2", 2023)).await.unwrap();
        storage.upsert_law(&law("rondonia-lei-2023-3", 2023)).await.unwrap();

        let service = Arc::new(RecordingArchive::default());
        let publisher = publisher(Arc::clone(&service), &dir);

        let outcome = publisher
            .export_dataset(&storage, "rondonia", Some(2023), ExportFormat::Jsonl)
            .await
            .unwrap();
        assert_eq!(outcome.rows, 2);
        assert!(outcome.path.ends_with("exports/leis_rondonia_2023.jsonl"));
        assert_eq!(std::fs::read_to_string(&outcome.path).unwrap().lines().count(), 2);

        let item = publisher
            .upload_dataset(&outcome.path, "rondonia", Some(2023))
            .await
            .unwrap();
        assert_eq!(item.identifier, "leizilla-dataset-rondonia-2023");
        let uploads = service.uploads.lock().unwrap();
        assert!(
            uploads[0]
                .1
                .metadata
                .contains(&("collection".to_string(), "leizilla-datasets".to_string()))
        );
        drop(uploads);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn manifest_predicts_download_urls() {
        let dir = temp_dir();
        let publisher = publisher(Arc::new(RecordingArchive::default()), &dir);
        let path = publisher.write_manifest("rondonia", None, &dir).unwrap();
        assert!(path.ends_with("leis_rondonia_completo.manifest.json"));

        let manifest: DatasetManifest =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(manifest.dataset_id, "leis_rondonia_completo");
        assert_eq!(manifest.year, None);
        assert_eq!(
            manifest.files.parquet,
            "https://archive.org/download/leizilla-dataset-rondonia-completo/leis_rondonia_completo.parquet"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }
}
