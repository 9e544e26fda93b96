//! Severity normalization.
//!
//! Collapses the zoo of framework level names onto the five canonical
//! values. Unknown names pass through upper-cased; a missing level is INFO.

/// Normalizes a raw level token.
pub fn normalize_level(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return "INFO".to_string();
    };

    let upper = raw.trim().to_uppercase();
    match upper.as_str() {
        "WARNING" | "WARN" => "WARN".to_string(),
        "SEVERE" | "FATAL" | "CRITICAL" | "ALERT" | "EMERGENCY" => "ERROR".to_string(),
        "FINE" | "FINER" | "FINEST" | "VERBOSE" | "DBG" => "DEBUG".to_string(),
        "CONFIG" | "NOTICE" | "INFORMATIONAL" => "INFO".to_string(),
        "TRC" => "TRACE".to_string(),
        _ => upper,
    }
}

/// True iff the normalized level denotes an error.
pub fn is_error_level(level: &str) -> bool {
    level == "ERROR"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_collapse_aliases_onto_canonical_levels() {
        assert_eq!(normalize_level(Some("warning")), "WARN");
        assert_eq!(normalize_level(Some("SEVERE")), "ERROR");
        assert_eq!(normalize_level(Some("fatal")), "ERROR");
        assert_eq!(normalize_level(Some("EMERGENCY")), "ERROR");
        assert_eq!(normalize_level(Some("finest")), "DEBUG");
        assert_eq!(normalize_level(Some("dbg")), "DEBUG");
        assert_eq!(normalize_level(Some("notice")), "INFO");
        assert_eq!(normalize_level(Some("trc")), "TRACE");
    }

    #[test]
    fn should_uppercase_unknown_levels() {
        assert_eq!(normalize_level(Some("bizarre")), "BIZARRE");
    }

    #[test]
    fn should_default_missing_level_to_info() {
        assert_eq!(normalize_level(None), "INFO");
    }

    #[test]
    fn should_flag_only_error_as_error() {
        assert!(is_error_level("ERROR"));
        assert!(!is_error_level("WARN"));
        assert!(!is_error_level("INFO"));
    }
}
