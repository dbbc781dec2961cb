use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};

/// `chrono` format of run ids and of timestamped file names.
pub const RUN_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

const RUN_ID_LEN: usize = 15;

/// Parse a `YYYYMMDD_HHMMSS` run id.
pub fn parse_run_id(run_id: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(run_id, RUN_ID_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Extract a trailing run id from a file path.
///
/// Example: `"raw/comments_20250101_093000.json"` → `"20250101_093000"`
pub fn run_id_suffix(path: &Path) -> Option<String> {
    let stem = path.file_name()?.to_str()?;
    let stem = stem.split('.').next()?;
    if stem.len() < RUN_ID_LEN || !stem.is_char_boundary(stem.len() - RUN_ID_LEN) {
        return None;
    }
    let suffix = &stem[stem.len() - RUN_ID_LEN..];
    parse_run_id(suffix).map(|_| suffix.to_string())
}

/// Turn a display name into something safe to use in a file name.
pub fn file_slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug.to_string()
    }
}
