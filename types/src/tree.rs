use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in a workspace directory listing.
///
/// Produced transiently per scan request; the listing is flat, with
/// directories sorted before files and case-insensitive lexical order within
/// each group. Timestamps serialize as RFC 3339.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    /// Path relative to the workspace root.
    pub path: String,
    pub is_dir: bool,
    /// File size in bytes; 0 for directories.
    pub size: u64,
    pub mod_time: DateTime<Utc>,
}

/// Result of a line-range read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub lines: Vec<String>,
    /// True when the file ended before the requested end line.
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::TreeNode;
    use chrono::{TimeZone, Utc};

    #[test]
    fn tree_node_serializes_mod_time_as_rfc3339() {
        let node = TreeNode {
            path: "src/main.rs".to_string(),
            is_dir: false,
            size: 42,
            mod_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["path"], "src/main.rs");
        assert_eq!(json["is_dir"], false);
        assert_eq!(json["mod_time"], "2024-05-01T12:00:00Z");
    }
}
