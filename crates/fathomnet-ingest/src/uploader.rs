// SPDX-License-Identifier: Apache-2.0

//! Bulk image uploader.
//!
//! Streams manifest images from their source URLs directly into object
//! storage. The destination prefix is listed once per run, already-present
//! objects are skipped, and the remaining images are fetched concurrently
//! under a bounded semaphore. Per-item failures are tallied as outcomes
//! and never fail the batch; re-running against unchanged bucket state
//! performs zero additional writes.

use crate::{
    Error, ImageStore,
    manifest::{Manifest, ManifestImage},
};
use futures::future::join_all;
use log::{info, warn};
use reqwest::{StatusCode, header::CONTENT_TYPE};
use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::{Semaphore, mpsc::Sender};

/// Progress information for long-running operations.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Current number of completed items.
    pub current: usize,
    /// Total number of items to process.
    pub total: usize,
}

/// Terminal outcome of one upload task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The image was fetched and written to the bucket.
    Uploaded,
    /// The destination object already existed; nothing was written.
    Skipped,
    /// The source URL returned a non-200 status.
    ErrorStatus(u16),
    /// The fetch or write failed for another reason.
    ErrorOther(String),
}

impl std::fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadOutcome::Uploaded => write!(f, "uploaded"),
            UploadOutcome::Skipped => write!(f, "skipped"),
            UploadOutcome::ErrorStatus(status) => write!(f, "error_status_{}", status),
            UploadOutcome::ErrorOther(reason) => write!(f, "error_{}", reason),
        }
    }
}

/// Aggregate outcome counts for one split.
///
/// Invariant: `uploaded + skipped + errors == total`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Images fetched and written this run.
    pub uploaded: usize,
    /// Images already present under the destination prefix.
    pub skipped: usize,
    /// Images that failed with a status or transport error.
    pub errors: usize,
    /// Total candidate images considered after the limit was applied.
    pub total: usize,
}

impl UploadReport {
    fn record(&mut self, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Uploaded => self.uploaded += 1,
            UploadOutcome::Skipped => self.skipped += 1,
            UploadOutcome::ErrorStatus(_) | UploadOutcome::ErrorOther(_) => self.errors += 1,
        }
    }
}

impl std::fmt::Display for UploadReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} uploaded, {} skipped, {} errors",
            self.uploaded, self.skipped, self.errors
        )
    }
}

/// One pending upload: destination key plus source URL.
#[derive(Debug, Clone)]
pub struct UploadItem {
    /// Destination object key under the storage root.
    pub key: String,
    /// Source URL from the manifest's `coco_url` field.
    pub url: Option<String>,
}

/// Result of partitioning a manifest against the existing bucket contents.
#[derive(Debug, Clone)]
pub struct UploadPlan {
    /// Images whose destination keys are absent from the bucket.
    pub pending: Vec<UploadItem>,
    /// Count of images already present under the prefix.
    pub skipped: usize,
    /// Total candidate images considered.
    pub total: usize,
}

/// Partition manifest images into pending uploads and skips.
///
/// The optional limit truncates the ordered image list before the
/// set-difference against `existing` is computed.
pub fn plan_uploads(
    images: &[ManifestImage],
    prefix: &str,
    existing: &HashSet<String>,
    limit: Option<usize>,
) -> UploadPlan {
    let images = match limit {
        Some(n) => &images[..n.min(images.len())],
        None => images,
    };

    let mut pending = Vec::new();
    let mut skipped = 0;
    for image in images {
        let key = format!("{}{}", prefix, image.file_name);
        if existing.contains(&key) {
            skipped += 1;
        } else {
            pending.push(UploadItem {
                key,
                url: image.coco_url.clone(),
            });
        }
    }

    UploadPlan {
        pending,
        skipped,
        total: images.len(),
    }
}

/// Bulk uploader for one storage bucket.
#[derive(Debug, Clone)]
pub struct Uploader {
    store: ImageStore,
    http: reqwest::Client,
    object_prefix: String,
    concurrency: usize,
}

impl Uploader {
    /// Create an uploader writing under `object_prefix` in the given store.
    pub fn new(store: ImageStore, object_prefix: &str, concurrency: usize) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            store,
            http,
            object_prefix: object_prefix.to_string(),
            concurrency: concurrency.max(1),
        })
    }

    /// Upload every manifest image of a split not already present in the
    /// bucket.
    ///
    /// Tasks run concurrently under the configured ceiling with no ordering
    /// or priority between them; outcomes are tallied in completion order.
    /// Each completed item is reported on the optional progress channel.
    pub async fn upload_split(
        &self,
        manifest: &Manifest,
        split: &str,
        limit: Option<usize>,
        progress: Option<Sender<Progress>>,
    ) -> Result<UploadReport, Error> {
        let prefix = format!("{}/{}_images/", self.object_prefix, split);

        let existing = self.store.list_existing(&prefix).await?;
        let plan = plan_uploads(&manifest.images, &prefix, &existing, limit);

        if plan.skipped > 0 {
            info!(
                "skipping {} already uploaded images under {}",
                plan.skipped, prefix
            );
        }

        let mut report = UploadReport {
            skipped: plan.skipped,
            total: plan.total,
            ..Default::default()
        };

        if plan.pending.is_empty() {
            return Ok(report);
        }

        info!(
            "stream-uploading {} images to {}/{}",
            plan.pending.len(),
            self.store.url(),
            prefix
        );

        let total = plan.pending.len();
        let current = Arc::new(AtomicUsize::new(0));
        let sem = Arc::new(Semaphore::new(self.concurrency));

        let tasks = plan
            .pending
            .into_iter()
            .map(|item| {
                let sem = sem.clone();
                let http = self.http.clone();
                let store = self.store.clone();
                let current = current.clone();
                let progress = progress.clone();

                tokio::spawn(async move {
                    let outcome = upload_one(&http, &store, &sem, item).await;

                    if let Some(progress) = &progress {
                        let current = current.fetch_add(1, Ordering::SeqCst);
                        let _ = progress
                            .send(Progress {
                                current: current + 1,
                                total,
                            })
                            .await;
                    }

                    outcome
                })
            })
            .collect::<Vec<_>>();

        for task in join_all(tasks).await {
            let outcome = task?;
            if let UploadOutcome::ErrorStatus(_) | UploadOutcome::ErrorOther(_) = &outcome {
                warn!("upload failed: {}", outcome);
            }
            report.record(&outcome);
        }

        Ok(report)
    }
}

/// Fetch one image and stream it into the bucket.
///
/// All failures are converted into outcomes; this function never returns
/// an error so one bad item cannot fail the batch.
async fn upload_one(
    http: &reqwest::Client,
    store: &ImageStore,
    sem: &Semaphore,
    item: UploadItem,
) -> UploadOutcome {
    let _permit = match sem.acquire().await {
        Ok(permit) => permit,
        Err(err) => return UploadOutcome::ErrorOther(err.to_string()),
    };

    let Some(url) = item.url else {
        return UploadOutcome::ErrorOther("missing_url".to_string());
    };

    let response = match http.get(&url).send().await {
        Ok(response) => response,
        Err(err) => return UploadOutcome::ErrorOther(err.to_string()),
    };

    if response.status() != StatusCode::OK {
        return UploadOutcome::ErrorStatus(response.status().as_u16());
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(err) => return UploadOutcome::ErrorOther(err.to_string()),
    };

    match store.put(&item.key, body, &content_type).await {
        Ok(()) => UploadOutcome::Uploaded,
        Err(err) => UploadOutcome::ErrorOther(err.to_string()),
    }
}
