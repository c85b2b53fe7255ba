/// Defaults and fixed names shared across the loader.
/// Paths and names here are only defaults; `Config` can override all of them.

// Deployment defaults
pub const DEFAULT_FEED_URL: &str =
    "http://uicds.njit.edu/uicds/pub/search?productType=Incident&format=rss";
pub const DEFAULT_LOCAL_FEED_PATH: &str = "data/feeds/uicds.xml";
pub const DEFAULT_LOG_PATH: &str = "logs/georss_loader.log";
pub const DEFAULT_LOCK_PATH: &str = "data/georss_loader.lock";
pub const DEFAULT_DESTINATION_TABLE: &str = "data/events.sqlite/EVENTS.DBO.UICDS_PRIVATE_SECTOR";
pub const DEFAULT_VIEWER_ROLE: &str = "gis_viewer";
pub const DEFAULT_EDITOR_ROLE: &str = "gis_editor";
pub const DEFAULT_LOCK_STALE_AFTER_SECS: u64 = 3600;
/// Upper bound for `lock_stale_after_secs` (30 days).
pub const MAX_LOCK_STALE_AFTER_SECS: u64 = 30 * 24 * 3600;

// The feed alternates one real item with a placeholder carrying this title
pub const DISCARDED_TITLE: &str = "no title given";

// Column widths in the destination table
pub const TITLE_MAX: usize = 50;
pub const CATEGORY_MAX: usize = 50;
pub const DESCRIPTION_MAX: usize = 1000;
pub const PUB_DATE_MAX: usize = 50;
pub const LINK_MAX: usize = 255;
pub const LAT_MAX: usize = 50;
pub const LON_MAX: usize = 50;

// Destination columns; names are matched exactly, including case
pub const COL_OBJECT_ID: &str = "OBJECTID";
pub const COL_TITLE: &str = "TITLE";
pub const COL_CATEGORY: &str = "CATEGORY";
pub const COL_DESCRIPTION: &str = "DESCRIPT";
pub const COL_PUB_DATE: &str = "PUBDATE";
pub const COL_LINK: &str = "LINK";
pub const COL_LAT: &str = "LAT";
pub const COL_LON: &str = "LON";
pub const COL_SHAPE: &str = "SHAPE";
pub const COL_SHAPE_X: &str = "SHAPE_X";
pub const COL_SHAPE_Y: &str = "SHAPE_Y";

/// Table recording role grants on destination tables
pub const PRIVILEGES_TABLE: &str = "layer_privileges";
