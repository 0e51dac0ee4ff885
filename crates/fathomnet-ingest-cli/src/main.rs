// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, Subcommand};
use fathomnet_ingest::{
    CatalogClient, Error, ImageStore, Manifest, Progress, RecreatePolicy, Settings, SplitSpec,
    Uploader, credential_identity, ingest,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Object storage URL, e.g. gs://voxel51-test
    #[clap(long, env = "FATHOMNET_STORAGE_URL")]
    storage_url: Option<String>,

    /// Dataset catalog server URL
    #[clap(long, env = "FATHOMNET_CATALOG_URL")]
    catalog_url: Option<String>,

    /// Name of the dataset registered in the catalog
    #[clap(long, env = "FATHOMNET_DATASET_NAME")]
    dataset_name: Option<String>,

    /// Ingest Command
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Verify cloud credentials and bucket reachability.  This is a
    /// diagnostic command: failures are printed with remediation guidance
    /// and never produce a non-zero exit.
    CheckAuth,
    /// Stream manifest images from their source URLs into the storage
    /// bucket.  Objects already present under the destination prefix are
    /// skipped, so re-running is safe and cheap.
    Upload {
        /// Path to the training split manifest.  Pass an empty string to
        /// skip the split.
        #[clap(long, default_value = "data/dataset_train.json")]
        train_json: String,

        /// Path to the test split manifest.  Pass an empty string to skip
        /// the split.
        #[clap(long, default_value = "data/dataset_test.json")]
        test_json: String,

        /// Process only the first N images per split.
        #[clap(long)]
        limit: Option<usize>,

        /// Maximum number of simultaneous in-flight uploads.  Defaults to
        /// the configured ceiling (FATHOMNET_CONCURRENCY, 50 out of the
        /// box).
        #[clap(long)]
        concurrency: Option<usize>,
    },
    /// Parse the manifests and register one sample per image with the
    /// dataset catalog, pointing at the bucket objects written by the
    /// upload command.
    Ingest {
        /// Path to the training split manifest.  Pass an empty string to
        /// skip the split.
        #[clap(long, default_value = "data/dataset_train.json")]
        train_json: String,

        /// Path to the test split manifest.  Pass an empty string to skip
        /// the split.
        #[clap(long, default_value = "data/dataset_test.json")]
        test_json: String,

        /// Register only the first N samples per split.
        #[clap(long)]
        limit: Option<usize>,

        /// Delete and recreate the dataset if it already exists.
        #[clap(long)]
        recreate: bool,
    },
}

/// Collect the enabled splits, skipping any disabled with an empty path.
fn split_paths(train_json: &str, test_json: &str) -> Vec<(String, PathBuf)> {
    [("train", train_json), ("test", test_json)]
        .into_iter()
        .filter(|(_, path)| !path.is_empty())
        .map(|(name, path)| (name.to_string(), PathBuf::from(path)))
        .collect()
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise} ETA: {eta}] {msg}: {wide_bar:.yellow} {human_pos}/{human_len}",
        )
        .unwrap()
        .progress_chars("█▇▆▅▄▃▂▁  "),
    );
    bar
}

async fn handle_check_auth(settings: &Settings) -> Result<(), Error> {
    println!("Checking auth for credentials: {}", credential_identity());

    let store = match ImageStore::from_url(&settings.storage_url) {
        Ok(store) => store,
        Err(err) => {
            println!("FAILED to construct storage client: {}", err);
            println!(
                "Tip: run 'gcloud auth application-default login' or set \
                 GOOGLE_APPLICATION_CREDENTIALS"
            );
            return Ok(());
        }
    };

    match store.probe().await {
        Ok(()) => println!("Verified access to bucket: {}", store.url()),
        Err(err) => {
            println!("Cannot reach bucket {}: {}", store.url(), err);
            println!(
                "Tip: run 'gcloud auth application-default login' or set \
                 GOOGLE_APPLICATION_CREDENTIALS"
            );
        }
    }

    Ok(())
}

async fn handle_upload(
    settings: &Settings,
    train_json: String,
    test_json: String,
    limit: Option<usize>,
    concurrency: Option<usize>,
) -> Result<(), Error> {
    let store = ImageStore::from_url(&settings.storage_url)?;
    let concurrency = concurrency.unwrap_or(settings.concurrency);
    let uploader = Uploader::new(store, &settings.object_prefix, concurrency)?;

    for (split, manifest_path) in split_paths(&train_json, &test_json) {
        println!(
            "Loading {} for split '{}'...",
            manifest_path.display(),
            split
        );
        let manifest = Manifest::from_json(&manifest_path)?;
        if let Some(limit) = limit {
            println!("Limiting to first {} images.", limit);
        }

        let bar = progress_bar();
        bar.set_message(format!("Uploading {}", split));

        let (tx, mut rx) = mpsc::channel::<Progress>(1);
        let bar_task = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                if progress.total > 0 {
                    bar.set_length(progress.total as u64);
                    bar.set_position(progress.current as u64);
                }
            }
            bar.finish_and_clear();
        });

        let report = uploader
            .upload_split(&manifest, &split, limit, Some(tx))
            .await?;
        let _ = bar_task.await;

        println!("Split '{}' complete: {}.", split, report);
    }

    Ok(())
}

async fn handle_ingest(
    settings: &Settings,
    train_json: String,
    test_json: String,
    limit: Option<usize>,
    recreate: bool,
) -> Result<(), Error> {
    let catalog = CatalogClient::new(&settings.catalog_url, settings.catalog_token.clone())?;

    let splits: Vec<SplitSpec> = split_paths(&train_json, &test_json)
        .into_iter()
        .map(|(name, manifest_path)| SplitSpec {
            name,
            manifest_path,
        })
        .collect();

    let policy = if recreate {
        RecreatePolicy::Recreate
    } else {
        RecreatePolicy::Abort
    };

    let summary = match ingest(&catalog, settings, &splits, limit, policy).await {
        Ok(summary) => summary,
        Err(Error::DatasetExists(name)) => {
            println!(
                "Dataset '{}' already exists. Use --recreate to replace.",
                name
            );
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    println!("Successfully created dataset '{}'", summary.dataset);
    for (split, count) in &summary.splits {
        println!("  {}: {} samples", split, count);
    }
    println!("Total samples: {}", summary.total);
    println!(
        "Images remain in {}. The catalog only stores metadata.",
        settings.storage_url
    );

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut settings = Settings::new()?;
    if let Some(storage_url) = args.storage_url {
        settings.storage_url = storage_url;
    }
    if let Some(catalog_url) = args.catalog_url {
        settings.catalog_url = catalog_url;
    }
    if let Some(dataset_name) = args.dataset_name {
        settings.dataset_name = dataset_name;
    }

    match args.cmd {
        Command::CheckAuth => handle_check_auth(&settings).await,
        Command::Upload {
            train_json,
            test_json,
            limit,
            concurrency,
        } => handle_upload(&settings, train_json, test_json, limit, concurrency).await,
        Command::Ingest {
            train_json,
            test_json,
            limit,
            recreate,
        } => handle_ingest(&settings, train_json, test_json, limit, recreate).await,
    }
}
