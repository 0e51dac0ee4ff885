// SPDX-License-Identifier: Apache-2.0

//! Object storage access for uploaded images.
//!
//! [`ImageStore`] wraps an [`ObjectStore`] resolved from a URL. Production
//! runs use `gs://bucket` URLs; `file://` and `memory:///` URLs are
//! supported for local runs and tests. Cloud credentials are resolved
//! ambiently: any `GOOGLE_*` environment variables recognized by the GCS
//! builder (notably `GOOGLE_APPLICATION_CREDENTIALS`) are injected into
//! the store configuration, otherwise platform-default discovery applies.

use crate::Error;
use bytes::Bytes;
use futures::StreamExt as _;
use log::debug;
use object_store::{
    Attribute, Attributes, ObjectStore, ObjectStoreScheme, PutOptions, gcp::GoogleConfigKey,
    parse_url, parse_url_opts, path::Path,
};
use serde_json::Value;
use std::{collections::HashSet, sync::Arc};
use url::Url;

/// Object storage client addressed by bucket-relative keys.
#[derive(Clone)]
pub struct ImageStore {
    store: Arc<dyn ObjectStore>,
    root: Path,
    url: String,
    /// Local filesystem stores reject put attributes, so the content type
    /// is only attached for stores that accept it.
    supports_attributes: bool,
}

impl std::fmt::Debug for ImageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageStore")
            .field("url", &self.url)
            .field("root", &self.root)
            .finish()
    }
}

impl ImageStore {
    /// Build a store from a storage URL such as `gs://voxel51-test`.
    ///
    /// For GCS URLs, `GOOGLE_*` environment variables are forwarded to the
    /// store builder so explicit credential files take priority over
    /// instance-default credentials. Other schemes (`file://`,
    /// `memory:///`) are resolved directly from the URL.
    pub fn from_url(url_str: &str) -> Result<Self, Error> {
        let url = url_str.parse::<Url>()?;
        let (scheme, _) = ObjectStoreScheme::parse(&url).map_err(object_store::Error::from)?;

        let (store, root) = match scheme {
            ObjectStoreScheme::GoogleCloudStorage => {
                let opts: Vec<(GoogleConfigKey, String)> = std::env::vars_os()
                    .filter_map(|(os_key, os_value)| {
                        if let (Some(key), Some(value)) = (os_key.to_str(), os_value.to_str())
                            && key.starts_with("GOOGLE_")
                            && let Ok(config_key) = key.to_ascii_lowercase().parse()
                        {
                            return Some((config_key, value.to_string()));
                        }
                        None
                    })
                    .collect();
                parse_url_opts(&url, opts)?
            }
            _ => parse_url(&url)?,
        };

        debug!("ImageStore resolved from {} with root {:?}", url_str, root);
        Ok(Self {
            store: Arc::from(store),
            root,
            url: trim_url(url_str),
            supports_attributes: !matches!(scheme, ObjectStoreScheme::Local),
        })
    }

    /// The storage URL this store was built from, without a trailing slash.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn object_path(&self, key: &str) -> Path {
        if self.root.as_ref().is_empty() {
            Path::from(key)
        } else {
            Path::from(format!("{}/{}", self.root.as_ref(), key))
        }
    }

    fn relative_key(&self, location: &Path) -> String {
        let location = location.as_ref();
        if self.root.as_ref().is_empty() {
            location.to_string()
        } else {
            location
                .strip_prefix(&format!("{}/", self.root.as_ref()))
                .unwrap_or(location)
                .to_string()
        }
    }

    /// List all object keys under a prefix with a single listing call.
    ///
    /// Keys are returned relative to the storage root, matching the keys
    /// passed to [`put`][Self::put].
    pub async fn list_existing(&self, prefix: &str) -> Result<HashSet<String>, Error> {
        let prefix_path = self.object_path(prefix.trim_end_matches('/'));
        let mut listing = self.store.list(Some(&prefix_path));

        let mut existing = HashSet::new();
        while let Some(meta) = listing.next().await {
            let meta = meta?;
            existing.insert(self.relative_key(&meta.location));
        }

        debug!("found {} existing objects under {}", existing.len(), prefix);
        Ok(existing)
    }

    /// Write raw bytes to a key with the given content type.
    pub async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), Error> {
        let path = self.object_path(key);

        if self.supports_attributes {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());

            let opts = PutOptions {
                attributes,
                ..Default::default()
            };
            self.store.put_opts(&path, data.into(), opts).await?;
        } else {
            self.store.put(&path, data.into()).await?;
        }

        Ok(())
    }

    /// Probe bucket reachability with one listing request.
    ///
    /// An empty listing still proves the bucket is reachable with the
    /// resolved credentials; only a transport or authorization error fails
    /// the probe.
    pub async fn probe(&self) -> Result<(), Error> {
        let prefix = (!self.root.as_ref().is_empty()).then_some(&self.root);
        let mut listing = self.store.list(prefix);
        match listing.next().await {
            Some(Err(err)) => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// Trim trailing slashes from a storage URL so keys append cleanly, while
/// keeping the `://` scheme separator of authority-less URLs such as
/// `memory:///` intact.
pub(crate) fn trim_url(url_str: &str) -> String {
    let mut url = url_str.to_string();
    while url.ends_with('/') && !url.ends_with("://") {
        url.pop();
    }
    url
}

/// Describe the ambient cloud credentials for diagnostics.
///
/// When `GOOGLE_APPLICATION_CREDENTIALS` points at a service-account file,
/// the project id is read from it; otherwise platform-default discovery is
/// reported.
pub fn credential_identity() -> String {
    match std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
        Ok(path) => match project_id_from_credentials(&path) {
            Some(project) => format!("service account for project '{}' ({})", project, path),
            None => format!("credentials file {}", path),
        },
        Err(_) => "application default credentials".to_string(),
    }
}

fn project_id_from_credentials(path: &str) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    let value: Value = serde_json::from_str(&contents).ok()?;
    value.get("project_id")?.as_str().map(str::to_string)
}
