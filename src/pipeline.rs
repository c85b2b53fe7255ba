use crate::app::ports::FeedFetcherPort;
use crate::config::Config;
use crate::destination::TableRef;
use crate::error::{Result, StageError, StoreError};
use crate::parser;
use crate::run_lock::RunLock;
use crate::sanitizer;
use crate::storage::{Privilege, SpatialStore};
use crate::types::IncidentRecord;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

/// What the loader did to the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadAction {
    /// Existing rows were removed and the new set appended
    Replaced { removed: u64 },
    /// The table did not exist; it was created from the source and granted
    Created,
}

/// Result of one load into the destination.
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub source: PathBuf,
    pub destination: String,
    pub action: LoadAction,
    pub records: usize,
    pub skipped: usize,
    pub finished_at: DateTime<Utc>,
}

/// Result of a complete fetch + load run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_token: String,
    pub feed_bytes: usize,
    pub feed_sha256: String,
    pub load: LoadSummary,
}

/// Output of the fetch + sanitize stages.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub status: u16,
    pub bytes: usize,
    pub sha256: String,
}

/// Writes parsed records into a `SpatialStore`.
pub struct Loader<'s> {
    store: &'s dyn SpatialStore,
    viewer_role: String,
    editor_role: String,
}

impl<'s> Loader<'s> {
    pub fn new(store: &'s dyn SpatialStore, viewer_role: &str, editor_role: &str) -> Self {
        Self {
            store,
            viewer_role: viewer_role.to_string(),
            editor_role: editor_role.to_string(),
        }
    }

    pub fn from_config(store: &'s dyn SpatialStore, config: &Config) -> Self {
        Self::new(store, &config.viewer_role, &config.editor_role)
    }

    /// Removes every row of `table`; returns the number removed.
    pub fn truncate(&self, table: &str) -> Result<u64> {
        match self.store.truncate(table) {
            Ok(removed) => {
                info!(removed, "Truncated {}", table);
                Ok(removed)
            }
            Err(source) => {
                error!("Error truncating {}: {}", table, source);
                Err(StageError::Truncate {
                    table: table.to_string(),
                    source,
                })
            }
        }
    }

    /// Inserts records one at a time. Stops at the first failure; rows
    /// already written stay in the table.
    pub fn append<I>(&self, table: &str, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = IncidentRecord>,
    {
        let mut appended = 0;
        for record in records {
            if let Err(source) = self.store.insert(table, &record) {
                error!(appended, title = %record.title, "Error appending to {}: {}", table, source);
                counter!("georss_records_appended_total").increment(appended as u64);
                return Err(StageError::Append {
                    table: table.to_string(),
                    appended,
                    source,
                });
            }
            appended += 1;
        }
        info!("Appended {} records", appended);
        counter!("georss_records_appended_total").increment(appended as u64);
        Ok(appended)
    }

    /// Creates `table`, grants the viewer role read access and the editor
    /// role read/write access, then copies the records into it. Grants come
    /// first so a copy that stops part way still leaves a usable table.
    pub fn create_table<I>(&self, table: &str, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = IncidentRecord>,
    {
        let creation_error = |source: StoreError| {
            error!("Error creating table {}: {}", table, source);
            StageError::TableCreation {
                table: table.to_string(),
                source,
            }
        };

        self.store.create_table(table).map_err(creation_error)?;
        info!("Created table {}", table);

        self.store
            .grant(table, &self.viewer_role, Privilege::Read)
            .map_err(creation_error)?;
        self.store
            .grant(table, &self.editor_role, Privilege::ReadWrite)
            .map_err(creation_error)?;
        info!(
            viewer = %self.viewer_role,
            editor = %self.editor_role,
            "Granted privileges on {}", table
        );

        self.append(table, records)
    }

    /// Loads the feed file at `source` into `destination`: truncate and
    /// append when the table exists, create it otherwise.
    #[instrument(skip(self, destination), fields(destination = %destination))]
    pub fn load(&self, source: &Path, destination: &TableRef) -> Result<LoadSummary> {
        let (summary, result) = self.load_with_summary(source, destination)?;
        result.map(|_| summary)
    }

    /// Like `load`, but once the table has been touched the summary is
    /// returned next to the outcome so a failed truncate or append still
    /// reports what was written. The summary line is logged either way.
    /// Failures before the table is touched (missing or malformed source)
    /// are returned as the outer error and leave existing rows in place.
    pub fn load_with_summary(
        &self,
        source: &Path,
        destination: &TableRef,
    ) -> Result<(LoadSummary, Result<()>)> {
        let text = parser::read_feed_file(source).map_err(|e| {
            error!("Source file does not exist or is unreadable: {}", e);
            e
        })?;
        let doc = parser::parse_document(&text).map_err(|e| {
            error!("Error parsing {}: {}", source.display(), e);
            e
        })?;
        let mut records = parser::records(&doc);
        let table = destination.table_name();

        let exists = self.store.table_exists(table).map_err(|e| {
            error!("Error checking for table {}: {}", table, e);
            StageError::from(e)
        })?;

        let (action, result) = if exists {
            match self.truncate(table) {
                Ok(removed) => (
                    LoadAction::Replaced { removed },
                    self.append(table, records.by_ref()),
                ),
                Err(e) => (LoadAction::Replaced { removed: 0 }, Err(e)),
            }
        } else {
            (LoadAction::Created, self.create_table(table, records.by_ref()))
        };

        let skipped = records.skipped();
        counter!("georss_records_skipped_total").increment(skipped as u64);

        let written = match &result {
            Ok(n) => *n,
            Err(StageError::Append { appended, .. }) => *appended,
            Err(_) => 0,
        };
        let summary = LoadSummary {
            source: source.to_path_buf(),
            destination: destination.to_string(),
            action,
            records: written,
            skipped,
            finished_at: Utc::now(),
        };
        info!(
            records = summary.records,
            skipped = summary.skipped,
            at = %summary.finished_at,
            "Processed {} to {}",
            source.display(),
            destination
        );

        Ok((summary, result.map(|_| ())))
    }
}

pub struct Pipeline;

impl Pipeline {
    /// Fetches the feed and writes the sanitized document to the local path.
    #[instrument(skip(config, fetcher), fields(url = %config.feed_url))]
    pub async fn fetch(config: &Config, fetcher: &dyn FeedFetcherPort) -> Result<FetchedFile> {
        let fetched = fetcher.fetch(&config.feed_url).await.map_err(|e| {
            error!("Error fetching feed: {}", e);
            StageError::from(e)
        })?;
        if let Some(content_type) = &fetched.content_type {
            if !content_type.contains("xml") {
                warn!(content_type = %content_type, "Feed is not served as XML");
            }
        }
        counter!("georss_feed_bytes_total").increment(fetched.bytes.len() as u64);

        let sha256 = hex::encode(Sha256::digest(&fetched.bytes));
        sanitizer::write_sanitized(&fetched.bytes, &config.local_feed_path).map_err(|e| {
            error!("Error writing {}: {}", config.local_feed_path.display(), e);
            StageError::from(e)
        })?;
        info!(
            status = fetched.status,
            bytes = fetched.bytes.len(),
            sha256 = %sha256,
            "Downloaded updated file to {}",
            config.local_feed_path.display()
        );

        Ok(FetchedFile {
            path: config.local_feed_path.clone(),
            status: fetched.status,
            bytes: fetched.bytes.len(),
            sha256,
        })
    }

    /// Runs every stage under the single-flight lock.
    pub async fn run(
        config: &Config,
        fetcher: &dyn FeedFetcherPort,
        store: &dyn SpatialStore,
    ) -> Result<RunReport> {
        let result = Self::run_locked(config, fetcher, store).await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        counter!("georss_runs_total", "outcome" => outcome).increment(1);
        result
    }

    async fn run_locked(
        config: &Config,
        fetcher: &dyn FeedFetcherPort,
        store: &dyn SpatialStore,
    ) -> Result<RunReport> {
        let destination = TableRef::parse(&config.destination_table).map_err(|e| {
            error!("{}", e);
            e
        })?;
        let stale_after = config.lock_stale_after().map_err(|e| {
            error!("{}", e);
            e
        })?;
        let lock = RunLock::acquire(&config.lock_path, stale_after).map_err(|e| {
            error!("{}", e);
            e
        })?;
        info!(run_token = %lock.token(), "Processing GeoRSS feed");

        let fetched = Self::fetch(config, fetcher).await?;
        let load = Loader::from_config(store, config).load(&fetched.path, &destination)?;

        Ok(RunReport {
            run_token: lock.token().to_string(),
            feed_bytes: fetched.bytes,
            feed_sha256: fetched.sha256,
            load,
        })
    }
}
