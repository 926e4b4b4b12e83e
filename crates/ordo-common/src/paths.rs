//! Path helpers for the coordination service node tree
//!
//! Paths are absolute, `/`-separated and never end with a separator
//! (except the root itself).

use crate::error::PathError;

pub const PATH_SEPARATOR: char = '/';
pub const ROOT: &str = "/";

/// Validate an absolute node path
pub fn validate_path(path: &str) -> Result<(), PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    if !path.starts_with(PATH_SEPARATOR) {
        return Err(PathError::NotAbsolute(path.to_string()));
    }
    if path == ROOT {
        return Ok(());
    }
    if path.ends_with(PATH_SEPARATOR) {
        return Err(PathError::TrailingSeparator(path.to_string()));
    }

    for segment in path[1..].split(PATH_SEPARATOR) {
        if segment.is_empty() {
            return Err(PathError::EmptySegment(path.to_string()));
        }
        if segment == "." || segment == ".." {
            return Err(PathError::RelativeSegment(path.to_string()));
        }
    }

    Ok(())
}

/// Join a parent path and a child name, normalising separators
pub fn make_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches(PATH_SEPARATOR);
    let child = child.trim_matches(PATH_SEPARATOR);

    let mut path = String::with_capacity(parent.len() + child.len() + 2);
    if !parent.starts_with(PATH_SEPARATOR) {
        path.push(PATH_SEPARATOR);
    }
    path.push_str(parent);

    if !child.is_empty() {
        if !path.ends_with(PATH_SEPARATOR) {
            path.push(PATH_SEPARATOR);
        }
        path.push_str(child);
    }

    path
}

/// Last segment of a path (`/a/b/c` -> `c`)
pub fn node_from_path(path: &str) -> &str {
    match path.rfind(PATH_SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Parent of a path, `None` for the root
pub fn parent_of(path: &str) -> Option<&str> {
    if path == ROOT || path.is_empty() {
        return None;
    }
    match path.rfind(PATH_SEPARATOR) {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// All proper ancestors of a path, shallowest first (root excluded)
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut current = parent_of(path);
    while let Some(parent) = current {
        if parent == ROOT {
            break;
        }
        result.push(parent);
        current = parent_of(parent);
    }
    result.reverse();
    result
}

/// Prefix a path with a namespace (`ns` + `/a` -> `/ns/a`)
pub fn fix_for_namespace(namespace: Option<&str>, path: &str) -> String {
    match namespace {
        Some(ns) if !ns.trim_matches(PATH_SEPARATOR).is_empty() => make_path(ns, path),
        _ => path.to_string(),
    }
}

/// Strip a namespace prefix previously added by [`fix_for_namespace`]
pub fn strip_namespace<'a>(namespace: Option<&str>, path: &'a str) -> &'a str {
    let Some(ns) = namespace else {
        return path;
    };
    let prefix = make_path(ROOT, ns);
    match path.strip_prefix(prefix.as_str()) {
        Some("") => ROOT,
        Some(rest) if rest.starts_with(PATH_SEPARATOR) => rest,
        _ => path,
    }
}
