// SPDX-License-Identifier: MIT OR Apache-2.0
//! Standalone matcher for `custom_routes` path patterns (§6, §12.2).
//!
//! Patterns use `:name` segments, e.g. `/status/:run_id`. Matching ignores
//! any query string on the candidate path and requires an exact segment
//! count.

use std::collections::BTreeMap;

/// Match `path` (optionally carrying a query string) against `pattern`.
///
/// Returns the captured `:name` segments on success, `None` on a length or
/// literal-segment mismatch.
#[must_use]
pub fn matches_pattern(pattern: &str, path: &str) -> Option<BTreeMap<String, String>> {
    let path_only = path.split('?').next().unwrap_or(path);
    let pattern_segments: Vec<&str> = pattern.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = path_only.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();

    if pattern_segments.len() != path_segments.len() {
        return None;
    }

    let mut params = BTreeMap::new();
    for (pat, seg) in pattern_segments.iter().zip(path_segments.iter()) {
        if let Some(name) = pat.strip_prefix(':') {
            params.insert(name.to_string(), (*seg).to_string());
        } else if pat != seg {
            return None;
        }
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern_matches_exactly() {
        assert!(matches_pattern("/health", "/health").is_some());
        assert!(matches_pattern("/health", "/healthz").is_none());
    }

    #[test]
    fn named_segment_is_captured() {
        let params = matches_pattern("/status/:run_id", "/status/abc123").unwrap();
        assert_eq!(params.get("run_id"), Some(&"abc123".to_string()));
    }

    #[test]
    fn query_string_is_ignored() {
        let params = matches_pattern("/status/:run_id", "/status/abc123?verbose=1").unwrap();
        assert_eq!(params.get("run_id"), Some(&"abc123".to_string()));
    }

    #[test]
    fn segment_count_mismatch_fails() {
        assert!(matches_pattern("/status/:run_id", "/status/abc/extra").is_none());
    }

    #[test]
    fn multiple_named_segments() {
        let params = matches_pattern("/teams/:team_id/runs/:run_id", "/teams/T1/runs/R9").unwrap();
        assert_eq!(params.get("team_id"), Some(&"T1".to_string()));
        assert_eq!(params.get("run_id"), Some(&"R9".to_string()));
    }
}
