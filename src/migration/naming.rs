//! Copy-name synthesis for items copied under "rename"
//!
//! Names get a copy marker with a millisecond timestamp and a sequence
//! number. The sequence is monotonic for the lifetime of the namer, so two
//! renames in the same clock tick (or of two items with the same name) never
//! produce the same result.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::model::ItemKind;

const COPY_MARKER: &str = "copy";

#[derive(Debug, Default)]
pub struct CopyNamer {
    seq: AtomicU64,
}

impl CopyNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a new name for `original`. File extensions are preserved so
    /// the copy keeps its type ("report.csv" -> "report (copy ...).csv").
    pub fn copy_name(&self, original: &str, kind: ItemKind) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        let suffix = format!(" ({} {}-{})", COPY_MARKER, stamp, seq);

        match (kind, split_extension(original)) {
            (ItemKind::File, Some((stem, ext))) => format!("{}{}.{}", stem, suffix, ext),
            _ => format!("{}{}", original, suffix),
        }
    }
}

/// Split "name.ext" into ("name", "ext"). Dotfiles and trailing dots have
/// no extension.
fn split_extension(name: &str) -> Option<(&str, &str)> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.contains('/') {
        return None;
    }
    Some((stem, ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_file_keeps_extension() {
        let namer = CopyNamer::new();
        let name = namer.copy_name("report.csv", ItemKind::File);
        assert!(name.starts_with("report (copy "), "{name}");
        assert!(name.ends_with("-1).csv"), "{name}");
    }

    #[test]
    fn test_connection_and_folder_get_suffix() {
        let namer = CopyNamer::new();
        let conn = namer.copy_name("DB1", ItemKind::Connection);
        assert!(conn.starts_with("DB1 (copy "));
        let folder = namer.copy_name("raw.v2", ItemKind::Folder);
        assert!(folder.starts_with("raw.v2 (copy "));
        assert!(folder.ends_with("-2)"));
    }

    #[test]
    fn test_names_never_repeat() {
        let namer = CopyNamer::new();
        let names: HashSet<String> = (0..500)
            .map(|_| namer.copy_name("DB1", ItemKind::Connection))
            .collect();
        assert_eq!(names.len(), 500);
        assert!(!names.contains("DB1"));
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("a.csv"), Some(("a", "csv")));
        assert_eq!(split_extension("a.tar.gz"), Some(("a.tar", "gz")));
        assert_eq!(split_extension(".env"), None);
        assert_eq!(split_extension("trailing."), None);
        assert_eq!(split_extension("Makefile"), None);
    }
}
