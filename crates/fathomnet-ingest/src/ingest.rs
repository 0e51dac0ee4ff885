// SPDX-License-Identifier: Apache-2.0

//! Catalog ingestion pipeline.
//!
//! For each configured split, reads the COCO manifest, builds sample
//! records pointing at the bucket objects written by the uploader, and
//! registers the accumulated batch with the catalog in one bulk call
//! before marking the dataset persistent.

use crate::{
    CatalogClient, Error, RecreatePolicy, Settings, manifest::Manifest, sample::build_samples,
};
use log::{info, warn};
use std::path::PathBuf;

/// One dataset split to ingest: its name and manifest path.
#[derive(Debug, Clone)]
pub struct SplitSpec {
    /// Split name, e.g. `train` or `test`.
    pub name: String,
    /// Path to the split's COCO manifest file.
    pub manifest_path: PathBuf,
}

/// Outcome of a full ingestion run.
#[derive(Debug, Clone)]
pub struct IngestSummary {
    /// Name of the registered dataset.
    pub dataset: String,
    /// Per-split sample counts, in the configured split order.
    pub splits: Vec<(String, usize)>,
    /// Total samples submitted; equals the sum of the per-split counts.
    pub total: usize,
}

/// Register every configured split with the catalog as one dataset.
///
/// If the target dataset name is taken, the policy decides between
/// delete-and-recreate and aborting with [`Error::DatasetExists`] before
/// any other action. Splits whose manifest file does not exist are skipped
/// with a warning, matching limited local checkouts. The accumulated batch
/// is submitted in a single call and the dataset is marked persistent.
pub async fn ingest(
    catalog: &CatalogClient,
    settings: &Settings,
    splits: &[SplitSpec],
    limit: Option<usize>,
    policy: RecreatePolicy,
) -> Result<IngestSummary, Error> {
    let name = &settings.dataset_name;

    if catalog.dataset_exists(name).await? {
        match policy {
            RecreatePolicy::Recreate => {
                info!("deleting existing dataset '{}'", name);
                catalog.delete_dataset(name).await?;
            }
            RecreatePolicy::Abort => return Err(Error::DatasetExists(name.clone())),
        }
    }

    info!("creating dataset '{}'", name);
    catalog.create_dataset(name).await?;

    let mut all_samples = Vec::new();
    let mut counts = Vec::new();
    for split in splits {
        if !split.manifest_path.exists() {
            warn!(
                "manifest {} not found, skipping split '{}'",
                split.manifest_path.display(),
                split.name
            );
            counts.push((split.name.clone(), 0));
            continue;
        }

        let manifest = Manifest::from_json(&split.manifest_path)?;
        let samples = build_samples(&manifest, &split.name, &settings.split_uri(&split.name), limit);
        info!("split '{}': {} samples", split.name, samples.len());
        counts.push((split.name.clone(), samples.len()));
        all_samples.extend(samples);
    }

    let total = all_samples.len();
    info!("adding {} samples to dataset '{}'", total, name);
    let registered = catalog.add_samples(name, &all_samples).await?;
    if registered != total {
        warn!(
            "catalog registered {} of {} submitted samples",
            registered, total
        );
    }

    catalog.set_persistent(name, true).await?;

    Ok(IngestSummary {
        dataset: name.clone(),
        splits: counts,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestImage;
    use std::{
        io::Write as _,
        sync::{Arc, Mutex},
    };
    use tokio::{
        io::{AsyncReadExt as _, AsyncWriteExt as _},
        net::TcpListener,
    };

    /// Minimal catalog server recording the RPC methods it receives, in
    /// order. Every dataset is reported as existing and `add_samples`
    /// acknowledges exactly the submitted batch size.
    async fn spawn_catalog_server() -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let recorded = calls.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    let body_start = loop {
                        match socket.read(&mut chunk).await {
                            Ok(0) => return,
                            Ok(n) => {
                                buf.extend_from_slice(&chunk[..n]);
                                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                                    break pos + 4;
                                }
                            }
                            Err(_) => return,
                        }
                    };

                    let headers = String::from_utf8_lossy(&buf[..body_start]).to_string();
                    let content_length = headers
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);

                    while buf.len() < body_start + content_length {
                        match socket.read(&mut chunk).await {
                            Ok(0) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                            Err(_) => return,
                        }
                    }

                    let request: serde_json::Value =
                        serde_json::from_slice(&buf[body_start..body_start + content_length])
                            .unwrap_or_default();
                    let method = request["method"].as_str().unwrap_or("").to_string();

                    let result = match method.as_str() {
                        "dataset.exists" => serde_json::json!({"exists": true}),
                        "dataset.add_samples" => serde_json::json!({
                            "count": request["params"]["samples"]
                                .as_array()
                                .map(|samples| samples.len())
                                .unwrap_or(0)
                        }),
                        _ => serde_json::Value::Null,
                    };
                    recorded.lock().unwrap().push(method);

                    let body = serde_json::json!({"error": null, "result": result}).to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{}", addr), calls)
    }

    fn write_manifest(images: &[(u64, &str)]) -> tempfile::NamedTempFile {
        let manifest = Manifest {
            images: images
                .iter()
                .map(|(id, file_name)| ManifestImage {
                    id: *id,
                    width: 640,
                    height: 480,
                    file_name: file_name.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&manifest).unwrap().as_bytes())
            .unwrap();
        file
    }

    fn settings(catalog_url: &str) -> Settings {
        Settings {
            storage_url: "gs://voxel51-test".to_string(),
            object_prefix: "fathomnet".to_string(),
            dataset_name: "fathomnet-2025".to_string(),
            catalog_url: catalog_url.to_string(),
            catalog_token: None,
            concurrency: 4,
        }
    }

    #[tokio::test]
    async fn test_ingest_recreates_existing_dataset() -> Result<(), Error> {
        let (url, calls) = spawn_catalog_server().await;
        let settings = settings(&url);
        let catalog = CatalogClient::new(&url, None)?;

        let train = write_manifest(&[(1, "a.png"), (2, "b.png")]);
        let test = write_manifest(&[(3, "c.png")]);
        let splits = vec![
            SplitSpec {
                name: "train".to_string(),
                manifest_path: train.path().to_path_buf(),
            },
            SplitSpec {
                name: "test".to_string(),
                manifest_path: test.path().to_path_buf(),
            },
        ];

        let summary = ingest(&catalog, &settings, &splits, None, RecreatePolicy::Recreate).await?;

        assert_eq!(summary.dataset, "fathomnet-2025");
        assert_eq!(
            summary.splits,
            vec![("train".to_string(), 2), ("test".to_string(), 1)]
        );
        assert_eq!(summary.total, 3);
        assert_eq!(
            summary.total,
            summary.splits.iter().map(|(_, count)| count).sum::<usize>()
        );

        // The existing dataset is deleted before anything is recreated or
        // registered.
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "dataset.exists",
                "dataset.delete",
                "dataset.create",
                "dataset.add_samples",
                "dataset.set_persistent",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_ingest_aborts_when_dataset_exists() {
        let (url, calls) = spawn_catalog_server().await;
        let settings = settings(&url);
        let catalog = CatalogClient::new(&url, None).unwrap();

        let train = write_manifest(&[(1, "a.png")]);
        let splits = vec![SplitSpec {
            name: "train".to_string(),
            manifest_path: train.path().to_path_buf(),
        }];

        let result = ingest(&catalog, &settings, &splits, None, RecreatePolicy::Abort).await;
        assert!(matches!(result, Err(Error::DatasetExists(name)) if name == "fathomnet-2025"));

        // Nothing is deleted, created, or registered after the abort.
        assert_eq!(*calls.lock().unwrap(), vec!["dataset.exists"]);
    }

    #[tokio::test]
    async fn test_ingest_skips_missing_manifest() -> Result<(), Error> {
        let (url, _calls) = spawn_catalog_server().await;
        let settings = settings(&url);
        let catalog = CatalogClient::new(&url, None)?;

        let train = write_manifest(&[(1, "a.png")]);
        let splits = vec![
            SplitSpec {
                name: "train".to_string(),
                manifest_path: train.path().to_path_buf(),
            },
            SplitSpec {
                name: "test".to_string(),
                manifest_path: PathBuf::from("/nonexistent/dataset_test.json"),
            },
        ];

        let summary = ingest(&catalog, &settings, &splits, None, RecreatePolicy::Recreate).await?;

        assert_eq!(
            summary.splits,
            vec![("train".to_string(), 1), ("test".to_string(), 0)]
        );
        assert_eq!(summary.total, 1);
        Ok(())
    }
}
