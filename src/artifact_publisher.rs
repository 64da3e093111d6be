//! Artifact Publisher: upload the enriched spreadsheet, the DXF
//! drawing, and a zipped bundle of downloaded documents under a fixed
//! `jobs/<job_id>/` key prefix.
//!
//! Grounded on `worker.py::_upload_results` (artifact naming, `PRC/` folder
//! convention) and `storage/az.py` (`max_concurrency=4` bounded-parallelism
//! chunked upload, translated here to a `tokio::Semaphore`).

use crate::blob_store::BlobStore;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const EXCEL_FILENAME: &str = "parcels_enriched.xlsx";
pub const DXF_FILENAME: &str = "labels.dxf";
pub const PRC_BUNDLE_FILENAME: &str = "PRC.zip";

pub struct PublishedArtifacts {
    pub excel_key: String,
    pub dxf_key: String,
    pub prc_bundle_key: Option<String>,
}

/// Build the `PRC.zip` bundle (one top-level `PRC/` directory holding every
/// downloaded document, named by `<owner_filename_stub>_<parcel_id>.pdf`)
/// and upload all three artifacts under `jobs/<job_id>/`, at
/// `config.upload_concurrency()` parallelism.
pub async fn publish(
    blob_store: &Arc<dyn BlobStore>,
    config: &PipelineConfig,
    job_id: &str,
    excel_path: &Path,
    dxf_path: &Path,
    documents: &[(String, PathBuf)],
    work_dir: &Path,
) -> Result<PublishedArtifacts> {
    let excel_key = format!("jobs/{job_id}/{EXCEL_FILENAME}");
    let dxf_key = format!("jobs/{job_id}/{DXF_FILENAME}");

    let prc_bundle_key = if documents.is_empty() {
        None
    } else {
        let bundle_path = build_prc_bundle(documents, work_dir)?;
        Some((format!("jobs/{job_id}/{PRC_BUNDLE_FILENAME}"), bundle_path))
    };

    let semaphore = Arc::new(Semaphore::new(config.upload_concurrency().max(1)));
    let mut uploads = vec![
        upload_one(blob_store.clone(), semaphore.clone(), excel_key.clone(), excel_path.to_path_buf(), Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")),
        upload_one(blob_store.clone(), semaphore.clone(), dxf_key.clone(), dxf_path.to_path_buf(), Some("application/dxf")),
    ];
    if let Some((key, path)) = &prc_bundle_key {
        uploads.push(upload_one(blob_store.clone(), semaphore.clone(), key.clone(), path.clone(), Some("application/zip")));
    }

    futures::future::try_join_all(uploads).await?;

    Ok(PublishedArtifacts { excel_key, dxf_key, prc_bundle_key: prc_bundle_key.map(|(key, _)| key) })
}

async fn upload_one(
    blob_store: Arc<dyn BlobStore>,
    semaphore: Arc<Semaphore>,
    key: String,
    path: PathBuf,
    content_type: Option<&'static str>,
) -> Result<()> {
    let _permit = semaphore.acquire_owned().await.context("acquiring upload permit")?;
    blob_store
        .upload(&key, &path, content_type)
        .await
        .map_err(|source| PipelineError::UploadFailed { key, source })?;
    Ok(())
}

fn build_prc_bundle(documents: &[(String, PathBuf)], work_dir: &Path) -> Result<PathBuf> {
    let bundle_path = work_dir.join(PRC_BUNDLE_FILENAME);
    let file = std::fs::File::create(&bundle_path)
        .with_context(|| format!("creating {}", bundle_path.display()))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();

    for (name, path) in documents {
        let bytes = std::fs::read(path).with_context(|| format!("reading document {}", path.display()))?;
        writer
            .start_file(format!("PRC/{name}"), options)
            .with_context(|| format!("starting zip entry for {name}"))?;
        use std::io::Write;
        writer.write_all(&bytes).with_context(|| format!("writing zip entry for {name}"))?;
    }
    writer.finish().context("finalizing PRC.zip")?;
    Ok(bundle_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::LocalBlobStore;

    #[tokio::test]
    async fn publishes_all_three_artifacts_with_documents() {
        let dir = tempfile::tempdir().unwrap();
        let blob_root = dir.path().join("blobs");
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&work_dir).unwrap();

        let excel_path = work_dir.join("parcels_enriched.xlsx");
        let dxf_path = work_dir.join("labels.dxf");
        std::fs::write(&excel_path, b"xlsx").unwrap();
        std::fs::write(&dxf_path, b"dxf").unwrap();

        let doc_path = work_dir.join("doc1.pdf");
        std::fs::write(&doc_path, b"%PDF-1.4").unwrap();

        let store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&blob_root));
        let config = PipelineConfig::new();

        let result = publish(
            &store,
            &config,
            "job-1",
            &excel_path,
            &dxf_path,
            &[("SMITH_28-08-22-442-023.pdf".to_string(), doc_path)],
            &work_dir,
        )
        .await
        .unwrap();

        assert!(store.exists(&result.excel_key).await.unwrap());
        assert!(store.exists(&result.dxf_key).await.unwrap());
        assert!(result.prc_bundle_key.is_some());
        assert!(store.exists(result.prc_bundle_key.as_ref().unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn omits_prc_bundle_when_no_documents() {
        let dir = tempfile::tempdir().unwrap();
        let blob_root = dir.path().join("blobs");
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&work_dir).unwrap();

        let excel_path = work_dir.join("parcels_enriched.xlsx");
        let dxf_path = work_dir.join("labels.dxf");
        std::fs::write(&excel_path, b"xlsx").unwrap();
        std::fs::write(&dxf_path, b"dxf").unwrap();

        let store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&blob_root));
        let config = PipelineConfig::new();

        let result = publish(&store, &config, "job-2", &excel_path, &dxf_path, &[], &work_dir)
            .await
            .unwrap();

        assert!(result.prc_bundle_key.is_none());
    }
}
