//! Request DTOs for the operational API

use serde::Deserialize;

/// Query string for the entry listing and bulk clear endpoints
/// (`GET /entries?prefix=`, `DELETE /entries?prefix=`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntriesQuery {
    /// Only entries whose key starts with this prefix; all entries if unset
    #[serde(default)]
    pub prefix: Option<String>,
}

impl EntriesQuery {
    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_query_with_prefix() {
        let query: EntriesQuery = serde_json::from_str(r#"{"prefix": "parks_"}"#).unwrap();
        assert_eq!(query.prefix(), "parks_");
    }

    #[test]
    fn test_entries_query_defaults_to_everything() {
        let query: EntriesQuery = serde_json::from_str("{}").unwrap();
        assert!(query.prefix.is_none());
        assert_eq!(query.prefix(), "");
    }
}
