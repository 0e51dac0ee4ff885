// SPDX-License-Identifier: Apache-2.0

//! # FathomNet Ingest Library
//!
//! Library backing the FathomNet dataset migration tools. It moves a
//! COCO-annotated marine imagery dataset into cloud object storage and
//! registers it with an external dataset catalog for machine-learning
//! experimentation. Three pipelines are provided:
//!
//! - **Auth checking**: resolve ambient cloud credentials and probe bucket
//!   reachability ([`ImageStore::probe`]).
//! - **Bulk upload**: stream manifest images from their source URLs into
//!   the bucket with bounded concurrency and skip-if-exists idempotence
//!   ([`Uploader`]).
//! - **Catalog ingestion**: convert COCO annotations into normalized
//!   sample records and register them in one bulk call ([`ingest`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fathomnet_ingest::{Error, ImageStore, Manifest, Settings, Uploader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let settings = Settings::new()?;
//!     let store = ImageStore::from_url(&settings.storage_url)?;
//!     let uploader = Uploader::new(store, &settings.object_prefix, settings.concurrency)?;
//!
//!     let manifest = Manifest::from_json("data/dataset_train.json")?;
//!     let report = uploader.upload_split(&manifest, "train", None, None).await?;
//!     println!("Split 'train' complete: {}", report);
//!
//!     Ok(())
//! }
//! ```

mod catalog;
mod error;
mod ingest;
pub mod manifest;
mod sample;
mod settings;
mod storage;
mod uploader;

pub use crate::{
    catalog::{CatalogClient, RecreatePolicy},
    error::Error,
    ingest::{IngestSummary, SplitSpec, ingest},
    manifest::{Manifest, ManifestIndex},
    sample::{Detection, SampleRecord, UNKNOWN_LABEL, build_samples, normalize_bbox},
    settings::Settings,
    storage::{ImageStore, credential_identity},
    uploader::{
        Progress, UploadItem, UploadOutcome, UploadPlan, UploadReport, Uploader, plan_uploads,
    },
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestImage;
    use bytes::Bytes;
    use tokio::{
        io::{AsyncReadExt as _, AsyncWriteExt as _},
        net::TcpListener,
        sync::mpsc,
    };

    #[ctor::ctor]
    fn init() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    /// Minimal HTTP server for upload tests. Serves 200 with PNG bytes for
    /// every path except those ending in `missing.png`, which return 404.
    async fn spawn_image_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut read = 0;
                    loop {
                        match socket.read(&mut buf[read..]).await {
                            Ok(0) => break,
                            Ok(n) => {
                                read += n;
                                if buf[..read].windows(4).any(|w| w == b"\r\n\r\n")
                                    || read == buf.len()
                                {
                                    break;
                                }
                            }
                            Err(_) => return,
                        }
                    }

                    let request = String::from_utf8_lossy(&buf[..read]);
                    let path = request.split_whitespace().nth(1).unwrap_or("/");

                    let response = if path.ends_with("missing.png") {
                        b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_vec()
                    } else {
                        let body = b"not really a png";
                        let mut response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\n\
                             Content-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        )
                        .into_bytes();
                        response.extend_from_slice(body);
                        response
                    };

                    let _ = socket.write_all(&response).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }

    fn image(id: u64, file_name: &str, url: Option<String>) -> ManifestImage {
        ManifestImage {
            id,
            width: 640,
            height: 480,
            file_name: file_name.to_string(),
            coco_url: url,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upload_split_skips_existing_and_is_idempotent() -> Result<(), Error> {
        let server = spawn_image_server().await;
        let store = ImageStore::from_url("memory:///")?;

        // One of three images is already present in the bucket.
        store
            .put(
                "fathomnet/train_images/b.png",
                Bytes::from_static(b"already here"),
                "image/png",
            )
            .await?;

        let manifest = Manifest {
            images: vec![
                image(1, "a.png", Some(format!("{}/a.png", server))),
                image(2, "b.png", Some(format!("{}/b.png", server))),
                image(3, "c.png", Some(format!("{}/c.png", server))),
            ],
            ..Default::default()
        };

        let uploader = Uploader::new(store.clone(), "fathomnet", 4)?;
        let (tx, mut rx) = mpsc::channel::<Progress>(8);
        let report = uploader
            .upload_split(&manifest, "train", None, Some(tx))
            .await?;

        assert_eq!(report.uploaded, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errors, 0);
        assert_eq!(report.total, 3);

        // Sends can interleave, so check the high-water mark rather than
        // the arrival order.
        let mut seen = Vec::new();
        while let Some(progress) = rx.recv().await {
            assert_eq!(progress.total, 2);
            seen.push(progress.current);
        }
        assert_eq!(seen.iter().max(), Some(&2));
        assert_eq!(seen.len(), 2);

        let existing = store.list_existing("fathomnet/train_images/").await?;
        assert_eq!(existing.len(), 3);

        // Second run against unchanged bucket state writes nothing.
        let report = uploader.upload_split(&manifest, "train", None, None).await?;
        assert_eq!(report.uploaded, 0);
        assert_eq!(report.skipped, 3);
        assert_eq!(report.errors, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_upload_split_tallies_errors() -> Result<(), Error> {
        let server = spawn_image_server().await;
        let store = ImageStore::from_url("memory:///")?;

        let manifest = Manifest {
            images: vec![
                image(1, "a.png", Some(format!("{}/a.png", server))),
                image(2, "gone.png", Some(format!("{}/missing.png", server))),
                image(3, "no-url.png", None),
            ],
            ..Default::default()
        };

        let uploader = Uploader::new(store.clone(), "fathomnet", 2)?;
        let report = uploader.upload_split(&manifest, "test", None, None).await?;

        assert_eq!(report.uploaded, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.errors, 2);
        assert_eq!(report.uploaded + report.skipped + report.errors, report.total);

        // Failed items leave no objects behind.
        let existing = store.list_existing("fathomnet/test_images/").await?;
        assert_eq!(existing.len(), 1);
        assert!(existing.contains("fathomnet/test_images/a.png"));

        Ok(())
    }

    #[tokio::test]
    async fn test_upload_split_applies_limit() -> Result<(), Error> {
        let server = spawn_image_server().await;
        let store = ImageStore::from_url("memory:///")?;

        let manifest = Manifest {
            images: (0..5)
                .map(|i| {
                    image(
                        i,
                        &format!("img-{}.png", i),
                        Some(format!("{}/img-{}.png", server, i)),
                    )
                })
                .collect(),
            ..Default::default()
        };

        let uploader = Uploader::new(store.clone(), "fathomnet", 8)?;
        let report = uploader
            .upload_split(&manifest, "train", Some(2), None)
            .await?;

        assert_eq!(report.total, 2);
        assert_eq!(report.uploaded, 2);

        let existing = store.list_existing("fathomnet/train_images/").await?;
        assert_eq!(existing.len(), 2);

        Ok(())
    }
}
