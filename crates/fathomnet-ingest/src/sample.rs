// SPDX-License-Identifier: Apache-2.0

//! Catalog-bound sample records.
//!
//! A sample record represents one image in the external dataset catalog:
//! the storage path of the uploaded object, the split it belongs to, its
//! dimensions, and its detections with bounding boxes normalized to
//! `[0, 1]` coordinates.

use crate::manifest::{Manifest, ManifestIndex};
use serde::{Deserialize, Serialize};

/// Label assigned when an annotation references a category id missing from
/// the manifest's category table.
pub const UNKNOWN_LABEL: &str = "unknown";

/// A single detection within a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Resolved category name.
    pub label: String,
    /// Bounding box as `[x, y, width, height]` normalized to `[0, 1]`.
    pub bounding_box: [f64; 4],
    /// Original COCO annotation ID, kept as auxiliary metadata.
    pub annotation_id: u64,
}

/// One image's registration record for the dataset catalog.
///
/// Records are built in memory from a manifest entry, submitted once in a
/// bulk call, and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Storage URI of the uploaded image object.
    pub filepath: String,
    /// Split label (train/test), also used as a filter tag.
    pub split: String,
    /// Original COCO image ID.
    pub image_id: u64,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Date the image was captured, when the manifest provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_captured: Option<String>,
    /// Detections for this image, in manifest annotation order.
    pub detections: Vec<Detection>,
}

/// Convert a pixel-space COCO bbox `[x, y, w, h]` to normalized `[0, 1]`
/// coordinates by dividing by the image dimensions.
///
/// A full-image box maps to `[0, 0, 1, 1]`.
pub fn normalize_bbox(bbox: [f64; 4], width: u32, height: u32) -> [f64; 4] {
    let [x, y, w, h] = bbox;
    let width = width as f64;
    let height = height as f64;
    [x / width, y / height, w / width, h / height]
}

/// Build sample records for one split of a manifest.
///
/// The manifest's image ordering is preserved and `limit` truncates it
/// before any processing, so exactly `min(limit, total)` samples are
/// produced. Annotations referencing an undefined category are labeled
/// [`UNKNOWN_LABEL`] rather than rejected.
///
/// `storage_prefix` is the fully qualified URI prefix the split's images
/// were uploaded under, e.g. `gs://voxel51-test/fathomnet/train_images/`.
pub fn build_samples(
    manifest: &Manifest,
    split: &str,
    storage_prefix: &str,
    limit: Option<usize>,
) -> Vec<SampleRecord> {
    let index = ManifestIndex::from_manifest(manifest);

    manifest
        .limited_images(limit)
        .iter()
        .map(|image| {
            let detections = index
                .annotations_for_image(image.id)
                .iter()
                .map(|ann| Detection {
                    label: index
                        .label_name(ann.category_id)
                        .unwrap_or(UNKNOWN_LABEL)
                        .to_string(),
                    bounding_box: normalize_bbox(ann.bbox, image.width, image.height),
                    annotation_id: ann.id,
                })
                .collect();

            SampleRecord {
                filepath: format!("{}{}", storage_prefix, image.file_name),
                split: split.to_string(),
                image_id: image.id,
                width: image.width,
                height: image.height,
                date_captured: image.date_captured.clone(),
                detections,
            }
        })
        .collect()
}
