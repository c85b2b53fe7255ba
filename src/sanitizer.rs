//! Flattens the GeoRSS GML wrapper around each item's coordinate.
//!
//! `<georss:where><gml:Point><gml:pos>lat, lon</gml:pos></gml:Point></georss:where>`
//! becomes `<position>lat, lon</position>`. Tags are matched by local name, so
//! whatever prefix the feed binds to the GeoRSS and GML namespaces is accepted.
//! The output is no longer valid GeoRSS and is only meant for the parser.

use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, instrument};

static WRAPPER_TAG: OnceLock<Regex> = OnceLock::new();
static POS_OPEN_TAG: OnceLock<Regex> = OnceLock::new();
static POS_CLOSE_TAG: OnceLock<Regex> = OnceLock::new();

fn wrapper_tag() -> &'static Regex {
    WRAPPER_TAG.get_or_init(|| {
        Regex::new(r"</?[A-Za-z_][\w.-]*:(?:where|Point)\b[^>]*>").expect("wrapper tag pattern")
    })
}

fn pos_open_tag() -> &'static Regex {
    POS_OPEN_TAG.get_or_init(|| {
        Regex::new(r"<[A-Za-z_][\w.-]*:pos\b[^>]*?(/?)>").expect("pos open tag pattern")
    })
}

fn pos_close_tag() -> &'static Regex {
    POS_CLOSE_TAG
        .get_or_init(|| Regex::new(r"</[A-Za-z_][\w.-]*:pos\s*>").expect("pos close tag pattern"))
}

/// Rewrites the coordinate wrapper tags; everything else passes through untouched.
pub fn sanitize(text: &str) -> String {
    let stripped = wrapper_tag().replace_all(text, "");
    let opened = pos_open_tag().replace_all(&stripped, "<position${1}>");
    pos_close_tag()
        .replace_all(&opened, "</position>")
        .into_owned()
}

/// Sanitizes the fetched body and overwrites `path` with the result.
#[instrument(skip(body), fields(bytes = body.len()))]
pub fn write_sanitized(body: &[u8], path: &Path) -> io::Result<String> {
    let text = String::from_utf8_lossy(body);
    let sanitized = sanitize(&text);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, sanitized.as_bytes())?;
    debug!("Wrote sanitized feed to {}", path.display());

    Ok(sanitized)
}
