// SPDX-License-Identifier: Apache-2.0

//! COCO detection manifest parsing.
//!
//! A manifest is a COCO-format JSON file with `images`, `annotations`, and
//! `categories` arrays. Only the object-detection subset is modeled here;
//! segmentation, license, and info blocks are not consumed by the ingest
//! tools and are ignored during deserialization.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

/// Top-level COCO manifest structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Ordered list of images in the dataset split.
    pub images: Vec<ManifestImage>,
    /// List of annotations, one per object instance.
    #[serde(default)]
    pub annotations: Vec<ManifestAnnotation>,
    /// List of object categories.
    #[serde(default)]
    pub categories: Vec<ManifestCategory>,
}

/// Image metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestImage {
    /// Unique image ID.
    pub id: u64,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Filename within the split.
    pub file_name: String,
    /// Source URL the image is streamed from during upload.
    #[serde(default)]
    pub coco_url: Option<String>,
    /// Date the image was captured.
    #[serde(default)]
    pub date_captured: Option<String>,
}

/// Object detection annotation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestAnnotation {
    /// Unique annotation ID.
    pub id: u64,
    /// ID of the image containing this object.
    pub image_id: u64,
    /// Category ID of this object.
    pub category_id: u32,
    /// Bounding box as `[x, y, width, height]` in pixels (top-left corner).
    pub bbox: [f64; 4],
}

/// Category definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestCategory {
    /// Unique category ID.
    pub id: u32,
    /// Category name, e.g. "Actiniaria".
    pub name: String,
}

impl Manifest {
    /// Read a manifest from a COCO JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::with_capacity(64 * 1024, file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Return the image list truncated to the first `limit` entries.
    ///
    /// `None` returns the full list. The manifest ordering is preserved so
    /// limited test runs are deterministic.
    pub fn limited_images(&self, limit: Option<usize>) -> &[ManifestImage] {
        match limit {
            Some(n) => &self.images[..n.min(self.images.len())],
            None => &self.images,
        }
    }
}

/// Lookup tables built from a [`Manifest`] for O(1) access during sample
/// construction.
#[derive(Debug, Clone, Default)]
pub struct ManifestIndex {
    /// `category_id` → category name.
    categories: HashMap<u32, String>,
    /// `image_id` → annotations for that image.
    annotations_by_image: HashMap<u64, Vec<ManifestAnnotation>>,
}

impl ManifestIndex {
    /// Build the lookup index from a manifest.
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let categories = manifest
            .categories
            .iter()
            .map(|cat| (cat.id, cat.name.clone()))
            .collect();

        let mut annotations_by_image: HashMap<u64, Vec<ManifestAnnotation>> = HashMap::new();
        for ann in &manifest.annotations {
            annotations_by_image
                .entry(ann.image_id)
                .or_default()
                .push(ann.clone());
        }

        Self {
            categories,
            annotations_by_image,
        }
    }

    /// Get the label name for a category ID, if the category is defined.
    pub fn label_name(&self, category_id: u32) -> Option<&str> {
        self.categories.get(&category_id).map(String::as_str)
    }

    /// Get the annotations for an image, empty when the image has none.
    pub fn annotations_for_image(&self, image_id: u64) -> &[ManifestAnnotation] {
        self.annotations_by_image
            .get(&image_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
