// SPDX-License-Identifier: Apache-2.0

//! Dataset catalog client.
//!
//! Talks JSON-RPC over HTTP to the external dataset catalog that tracks
//! registered samples for experimentation. The catalog exposes dataset
//! existence checks, creation, deletion, bulk sample registration, and a
//! persistence flag. Registration is a single bulk call with no partial
//! commit: it either succeeds or the error propagates to the caller.

use crate::{Error, SampleRecord};
use log::{Level, error, log_enabled, trace};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use url::Url;

/// Policy applied when the target dataset name already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreatePolicy {
    /// Delete the existing dataset and register from scratch.
    Recreate,
    /// Abort with [`Error::DatasetExists`] and take no action.
    Abort,
}

#[derive(Serialize)]
struct RpcRequest<Params> {
    id: u64,
    jsonrpc: String,
    method: String,
    params: Option<Params>,
}

impl<T> Default for RpcRequest<T> {
    fn default() -> Self {
        RpcRequest {
            id: 0,
            jsonrpc: "2.0".to_string(),
            method: "".to_string(),
            params: None,
        }
    }
}

#[derive(Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse<RpcResult> {
    error: Option<RpcError>,
    result: Option<RpcResult>,
}

#[derive(Serialize)]
struct DatasetParams<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct AddSamplesParams<'a> {
    name: &'a str,
    samples: &'a [SampleRecord],
}

#[derive(Serialize)]
struct PersistentParams<'a> {
    name: &'a str,
    persistent: bool,
}

#[derive(Default, Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Default, Deserialize)]
struct AddSamplesResult {
    count: usize,
}

#[derive(Default, Deserialize)]
struct EmptyResult {}

/// Client for the dataset catalog server.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl CatalogClient {
    /// Create a client for the catalog at `url`, with an optional bearer
    /// token.
    pub fn new(url: &str, token: Option<String>) -> Result<Self, Error> {
        // Validate early so a bad URL fails before the first RPC.
        Url::parse(url)?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// The catalog server URL, without a trailing slash.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn rpc<Params, RpcResult>(
        &self,
        method: &str,
        params: Option<Params>,
    ) -> Result<RpcResult, Error>
    where
        Params: Serialize,
        RpcResult: DeserializeOwned + Default,
    {
        let request = RpcRequest {
            method: method.to_string(),
            params,
            ..Default::default()
        };

        if log_enabled!(Level::Trace) {
            trace!(
                "RPC Request: {}",
                serde_json::ser::to_string_pretty(&request)?
            );
        }

        let mut req = self
            .http
            .post(format!("{}/api", self.url))
            .header("Accept", "application/json")
            .header("User-Agent", "FathomNet Ingest");
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        let res = req.json(&request).send().await?;
        let body = res.bytes().await?;

        if log_enabled!(Level::Trace) {
            trace!("RPC Response: {}", String::from_utf8_lossy(&body));
        }

        let response: RpcResponse<RpcResult> = match serde_json::from_slice(&body) {
            Ok(response) => response,
            Err(err) => {
                error!("Invalid JSON Response: {}", String::from_utf8_lossy(&body));
                return Err(err.into());
            }
        };

        if let Some(error) = response.error {
            Err(Error::RpcError(error.code, error.message))
        } else {
            // Void methods return no result payload.
            Ok(response.result.unwrap_or_default())
        }
    }

    /// Check whether a dataset with this name is registered.
    pub async fn dataset_exists(&self, name: &str) -> Result<bool, Error> {
        let result: ExistsResult = self
            .rpc("dataset.exists", Some(DatasetParams { name }))
            .await?;
        Ok(result.exists)
    }

    /// Create an empty dataset.
    pub async fn create_dataset(&self, name: &str) -> Result<(), Error> {
        let _: EmptyResult = self
            .rpc("dataset.create", Some(DatasetParams { name }))
            .await?;
        Ok(())
    }

    /// Delete a dataset and all of its registered samples.
    pub async fn delete_dataset(&self, name: &str) -> Result<(), Error> {
        let _: EmptyResult = self
            .rpc("dataset.delete", Some(DatasetParams { name }))
            .await?;
        Ok(())
    }

    /// Register a batch of samples in one bulk call.
    ///
    /// Returns the number of samples the catalog accepted.
    pub async fn add_samples(&self, name: &str, samples: &[SampleRecord]) -> Result<usize, Error> {
        let result: AddSamplesResult = self
            .rpc("dataset.add_samples", Some(AddSamplesParams { name, samples }))
            .await?;
        Ok(result.count)
    }

    /// Set the dataset's persistence flag so the catalog retains it across
    /// sessions.
    pub async fn set_persistent(&self, name: &str, persistent: bool) -> Result<(), Error> {
        let _: EmptyResult = self
            .rpc(
                "dataset.set_persistent",
                Some(PersistentParams { name, persistent }),
            )
            .await?;
        Ok(())
    }
}
