// SPDX-License-Identifier: Apache-2.0

//! Runtime settings for the ingest tools.
//!
//! Settings are resolved from built-in defaults layered under a
//! `FATHOMNET_*` environment source, so every value can be overridden
//! without touching the command line (e.g. `FATHOMNET_STORAGE_URL`,
//! `FATHOMNET_DATASET_NAME`). Cloud credentials are not handled here;
//! they are resolved ambiently by the storage layer.

use crate::Error;
use config::{Config, Environment};
use serde::Deserialize;

/// Resolved runtime settings shared by the upload and ingest pipelines.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Object storage URL, e.g. `gs://voxel51-test`. Also accepts
    /// `file://` and `memory:///` URLs for local runs and tests.
    pub storage_url: String,
    /// Key namespace under which all splits are stored in the bucket.
    pub object_prefix: String,
    /// Name of the dataset registered in the external catalog.
    pub dataset_name: String,
    /// Base URL of the dataset catalog server.
    pub catalog_url: String,
    /// Optional bearer token for the catalog server.
    #[serde(default)]
    pub catalog_token: Option<String>,
    /// Maximum number of simultaneous in-flight uploads.
    pub concurrency: usize,
}

impl Settings {
    /// Load settings from defaults overridden by `FATHOMNET_*` environment
    /// variables.
    pub fn new() -> Result<Self, Error> {
        let settings = Config::builder()
            .set_default("storage_url", "gs://voxel51-test")?
            .set_default("object_prefix", "fathomnet")?
            .set_default("dataset_name", "fathomnet-2025")?
            .set_default("catalog_url", "http://localhost:5151")?
            .set_default("concurrency", 50)?
            .add_source(Environment::with_prefix("FATHOMNET"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Object key prefix for a split, e.g. `fathomnet/train_images/`.
    pub fn split_prefix(&self, split: &str) -> String {
        format!("{}/{}_images/", self.object_prefix, split)
    }

    /// Fully qualified storage URI prefix for a split, e.g.
    /// `gs://voxel51-test/fathomnet/train_images/`.
    pub fn split_uri(&self, split: &str) -> String {
        format!(
            "{}/{}",
            crate::storage::trim_url(&self.storage_url),
            self.split_prefix(split)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::new().unwrap();
        assert_eq!(settings.object_prefix, "fathomnet");
        assert_eq!(settings.dataset_name, "fathomnet-2025");
        assert_eq!(settings.concurrency, 50);
        assert!(settings.catalog_token.is_none());
    }

    #[test]
    fn test_split_prefix_and_uri() {
        let settings = Settings {
            storage_url: "gs://voxel51-test/".to_string(),
            object_prefix: "fathomnet".to_string(),
            dataset_name: "fathomnet-2025".to_string(),
            catalog_url: "http://localhost:5151".to_string(),
            catalog_token: None,
            concurrency: 50,
        };
        assert_eq!(settings.split_prefix("train"), "fathomnet/train_images/");
        assert_eq!(
            settings.split_uri("test"),
            "gs://voxel51-test/fathomnet/test_images/"
        );

        let settings = Settings {
            storage_url: "memory:///".to_string(),
            ..settings
        };
        assert_eq!(
            settings.split_uri("train"),
            "memory:///fathomnet/train_images/"
        );
    }
}
