//! Utility functions for minits

use std::time::{SystemTime, UNIX_EPOCH};

/// Separator between path nodes (`root.sg1.d1.s1`)
pub const PATH_SEPARATOR: char = '.';

/// Matches exactly one path node
pub const ONE_LEVEL_WILDCARD: &str = "*";

/// Matches any number (one or more) of path nodes
pub const MULTI_LEVEL_WILDCARD: &str = "**";

/// Split a series path into its nodes
pub fn path_nodes(path: &str) -> Vec<&str> {
    path.split(PATH_SEPARATOR).collect()
}

/// Does the path contain a wildcard node?
pub fn is_wildcard(path: &str) -> bool {
    path_nodes(path)
        .iter()
        .any(|n| *n == ONE_LEVEL_WILDCARD || *n == MULTI_LEVEL_WILDCARD)
}

/// Prefix of `path` naming its storage group at `level` (`root` is level 0).
///
/// Returns `None` when the path is too short or the prefix holds a wildcard.
pub fn storage_group_of(path: &str, level: usize) -> Option<String> {
    let nodes = path_nodes(path);
    if nodes.len() <= level {
        return None;
    }
    let prefix = &nodes[..=level];
    if prefix
        .iter()
        .any(|n| n.is_empty() || *n == ONE_LEVEL_WILDCARD || *n == MULTI_LEVEL_WILDCARD)
    {
        return None;
    }
    Some(prefix.join("."))
}

/// Does `pattern` (which may contain `*` and `**`) match the concrete `path`?
pub fn path_matches(pattern: &str, path: &str) -> bool {
    fn matches(pattern: &[&str], path: &[&str]) -> bool {
        match (pattern.first(), path.first()) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(&p), _) if p == MULTI_LEVEL_WILDCARD => {
                // `**` consumes at least one node
                (1..=path.len()).any(|taken| matches(&pattern[1..], &path[taken..]))
            }
            (Some(_), None) => false,
            (Some(&p), Some(&n)) => {
                (p == ONE_LEVEL_WILDCARD || p == n) && matches(&pattern[1..], &path[1..])
            }
        }
    }
    matches(&path_nodes(pattern), &path_nodes(path))
}

/// Time partition a timestamp falls into
pub fn time_partition(timestamp: i64, interval_ms: i64) -> i64 {
    if interval_ms <= 0 {
        return 0;
    }
    timestamp.div_euclid(interval_ms)
}

/// Parse duration string (e.g., "30s", "5m", "1h", "7d")
pub fn parse_duration(s: &str) -> crate::Result<std::time::Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else {
        s.split_at(s.len() - s.chars().last().map_or(0, |c| c.len_utf8()))
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let duration = match unit {
        "ms" => std::time::Duration::from_millis(num),
        "s" => std::time::Duration::from_secs(num),
        "m" => std::time::Duration::from_secs(num * 60),
        "h" => std::time::Duration::from_secs(num * 3600),
        "d" => std::time::Duration::from_secs(num * 86400),
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    Ok(duration)
}

/// Get current Unix timestamp (seconds)
pub fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
