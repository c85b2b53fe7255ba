// Only some helpers are used by each test binary
#![allow(dead_code)]

use async_trait::async_trait;
use georss_loader::app::ports::{FeedFetcherPort, FetchedFeed};
use georss_loader::config::Config;
use georss_loader::error::{FetchError, StoreError};
use georss_loader::storage::{InMemoryStorage, Privilege, SpatialStore, StoreResult};
use georss_loader::types::IncidentRecord;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const TABLE: &str = "INCIDENTS";

pub fn test_config(root: &Path) -> Config {
    Config {
        feed_url: "http://feed.test/uicds/rss".to_string(),
        local_feed_path: root.join("feeds").join("uicds.xml"),
        log_path: root.join("logs").join("run.log"),
        lock_path: root.join("run.lock"),
        destination_table: format!("{}/EVENTS.DBO.{}", root.join("events.sqlite").display(), TABLE),
        ..Config::default()
    }
}

/// Two-item feed in the shape the incident endpoint serves: a placeholder
/// followed by a real item with a GML point.
pub fn two_item_feed(long_description: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:georss="http://www.georss.org/georss" xmlns:gml="http://www.opengis.net/gml">
  <channel>
    <title>Incident feed</title>
    <item>
      <title>no title given</title>
      <description>placeholder</description>
    </item>
    <item>
      <title>Gas leak reported near the Portsmouth harbor bridge approach</title>
      <category>HAZMAT</category>
      <description>{long_description}</description>
      <link>http://uicds.example.org/incident/42</link>
      <pubDate>Fri, 18 Jul 2014 14:03:00 GMT</pubDate>
      <georss:where>
        <gml:Point>
          <gml:pos>43.04945, -70.81767</gml:pos>
        </gml:Point>
      </georss:where>
    </item>
  </channel>
</rss>"#
    )
}

pub struct StubFetcher {
    pub response: Result<Vec<u8>, u16>,
    pub calls: AtomicUsize,
}

impl StubFetcher {
    pub fn serving(body: &str) -> Self {
        Self {
            response: Ok(body.as_bytes().to_vec()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            response: Err(status),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedFetcherPort for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Ok(bytes) => Ok(FetchedFeed {
                status: 200,
                bytes: bytes.clone(),
                content_type: Some("application/rss+xml".to_string()),
            }),
            Err(status) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
        }
    }
}

/// In-memory store that can be told to fail truncation or an insert.
pub struct FlakyStore {
    pub inner: InMemoryStorage,
    pub fail_truncate: bool,
    pub fail_insert_at: Option<usize>,
    pub insert_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn empty() -> Self {
        Self {
            inner: InMemoryStorage::new(),
            fail_truncate: false,
            fail_insert_at: None,
            insert_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_table() -> Self {
        let store = Self::empty();
        store.inner.create_table(TABLE).unwrap();
        store
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }
}

impl SpatialStore for FlakyStore {
    fn table_exists(&self, table: &str) -> StoreResult<bool> {
        self.inner.table_exists(table)
    }

    fn create_table(&self, table: &str) -> StoreResult<()> {
        self.inner.create_table(table)
    }

    fn truncate(&self, table: &str) -> StoreResult<u64> {
        if self.fail_truncate {
            return Err(StoreError::Other {
                message: "table is locked by another editor".to_string(),
            });
        }
        self.inner.truncate(table)
    }

    fn insert(&self, table: &str, record: &IncidentRecord) -> StoreResult<()> {
        let call = self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_insert_at == Some(call) {
            return Err(StoreError::Other {
                message: "connection reset".to_string(),
            });
        }
        self.inner.insert(table, record)
    }

    fn grant(&self, table: &str, role: &str, privilege: Privilege) -> StoreResult<()> {
        self.inner.grant(table, role, privilege)
    }

    fn row_count(&self, table: &str) -> StoreResult<u64> {
        self.inner.row_count(table)
    }
}
