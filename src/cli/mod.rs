//! CLI commands for memsearch.
//!
//! - **Query commands**: search, read (run against the selected backend)
//! - **Maintenance commands**: status, sync
//! - **Utility commands**: backends (inspect discovery without constructing)

// Query commands
pub mod read;
pub mod search;

// Maintenance commands
pub mod status;
pub mod sync;

// Utility commands
pub mod backends_cmd;

pub use backends_cmd::BackendsCommand;
pub use read::ReadCommand;
pub use search::SearchCommand;
pub use status::StatusCommand;
pub use sync::SyncCommand;

use serde_json::json;

/// Format a failure that happened before any command could run.
pub fn format_failure(error: &str, json: bool, quiet: bool) -> String {
    if quiet {
        return String::new();
    }
    if json {
        let body = json!({ "success": false, "error": error });
        serde_json::to_string_pretty(&body).unwrap_or_else(|_| "{}".to_string())
    } else {
        format!("memsearch: {}\n", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_failure() {
        assert_eq!(
            format_failure("no backend", false, false),
            "memsearch: no backend\n"
        );
        assert!(format_failure("no backend", true, true).is_empty());

        let parsed: serde_json::Value =
            serde_json::from_str(&format_failure("no backend", true, false)).unwrap();
        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["error"], "no backend");
    }
}
