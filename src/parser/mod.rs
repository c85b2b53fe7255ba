//! Turns a feed document into `IncidentRecord`s.
//!
//! Elements are matched by local name, so the parser reads the sanitized file
//! as well as an untouched GeoRSS document with `gml:pos` or `georss:point`.

use crate::constants::DISCARDED_TITLE;
use crate::error::{Result, StageError};
use crate::types::IncidentRecord;
use roxmltree::{Descendants, Document, Node, ParsingOptions};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

const COORDINATE_TAGS: [&str; 3] = ["position", "pos", "point"];

/// Reads the local feed file. A missing file is reported as `SourceMissing`.
pub fn read_feed_file(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(StageError::SourceMissing(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn parse_document(text: &str) -> Result<Document<'_>> {
    // Older RSS feeds ship a DOCTYPE
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, options)?;
    Ok(doc)
}

/// Lazily yields one record per `item` nested under a `channel`, skipping
/// the placeholder items. One pass; call again to restart.
pub fn records<'a, 'input>(doc: &'a Document<'input>) -> Records<'a, 'input> {
    Records {
        nodes: doc.descendants(),
        skipped: 0,
    }
}

pub struct Records<'a, 'input> {
    nodes: Descendants<'a, 'input>,
    skipped: usize,
}

impl<'a, 'input> Records<'a, 'input> {
    /// Items dropped so far because of their placeholder title.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<'a, 'input> Iterator for Records<'a, 'input> {
    type Item = IncidentRecord;

    fn next(&mut self) -> Option<IncidentRecord> {
        for node in self.nodes.by_ref() {
            if !is_named(&node, "item") || !node.ancestors().any(|a| is_named(&a, "channel")) {
                continue;
            }
            match parse_item(node) {
                Some(record) => return Some(record),
                None => self.skipped += 1,
            }
        }
        None
    }
}

/// Extracts one item; `None` for the placeholder items the feed interleaves.
pub fn parse_item(item: Node) -> Option<IncidentRecord> {
    let title = child_text(item, "title");
    if title == DISCARDED_TITLE {
        debug!("Skipping placeholder item");
        return None;
    }

    let (latitude, longitude) = match coordinate_text(item) {
        Some(text) => split_coordinates(text).unwrap_or_else(|| {
            warn!(title, position = text, "Malformed coordinate, treating as absent");
            (String::new(), String::new())
        }),
        None => (String::new(), String::new()),
    };

    Some(IncidentRecord::new(
        title,
        child_text(item, "category"),
        child_text(item, "description"),
        child_text(item, "pubDate"),
        child_text(item, "link"),
        &latitude,
        &longitude,
    ))
}

/// Splits `"lat, lon"` (or `"lat lon"` for GeoRSS-Simple) into its two parts.
/// Extra components are ignored; fewer than two yields `None`.
pub fn split_coordinates(text: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = if text.contains(',') {
        text.split(',').collect()
    } else {
        text.split_whitespace().collect()
    };
    if parts.len() < 2 {
        return None;
    }
    Some((parts[0].trim().to_string(), parts[1].trim().to_string()))
}

fn is_named(node: &Node, local_name: &str) -> bool {
    node.is_element() && node.tag_name().name() == local_name
}

fn child_text<'a>(parent: Node<'a, '_>, local_name: &str) -> &'a str {
    parent
        .children()
        .find(|c| is_named(c, local_name))
        .and_then(|c| c.text())
        .unwrap_or("")
}

fn coordinate_text<'a>(item: Node<'a, '_>) -> Option<&'a str> {
    item.descendants()
        .filter(|n| n.is_element() && COORDINATE_TAGS.contains(&n.tag_name().name()))
        .find_map(|n| n.text().filter(|t| !t.trim().is_empty()))
}
