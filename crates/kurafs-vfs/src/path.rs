//! Path normalization and mount-prefix matching.
//!
//! Paths are POSIX-style, `/`-separated strings. Normalization works on an
//! owned sequence of segments, never aliasing into the input buffer.

/// Split a path into its non-empty segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Normalize an absolute path.
///
/// Drops `.` segments; a `..` removes the previous retained segment if one
/// exists and is otherwise dropped, so a path can never escape the root.
/// The result always starts with `/`; an empty result collapses to `/`.
pub fn normalize(path: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for segment in segments(path) {
        match segment {
            "." => {}
            ".." => {
                kept.pop();
            }
            other => kept.push(other),
        }
    }
    if kept.is_empty() {
        "/".to_owned()
    } else {
        let mut out = String::new();
        for segment in kept {
            out.push('/');
            out.push_str(segment);
        }
        out
    }
}

/// Resolve `path` against `cwd` and normalize.
pub fn absolute(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        normalize(path)
    } else {
        normalize(&format!("{cwd}/{path}"))
    }
}

/// True if mount target `target` covers `path`.
///
/// A target matches when it is a true prefix of `path`: the character
/// after the matched prefix is `/`, the strings are equal, or the target
/// is the root. Both inputs must be normalized.
pub fn is_mount_prefix(target: &str, path: &str) -> bool {
    if target == "/" {
        return true;
    }
    match path.strip_prefix(target) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// The part of `path` below mount target `target`, without a leading `/`.
/// Empty for the mount root itself.
pub fn relative_to<'a>(target: &str, path: &'a str) -> &'a str {
    let rest = if target == "/" {
        path
    } else {
        path.strip_prefix(target).unwrap_or("")
    };
    rest.trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_drops_dot_segments() {
        assert_eq!(normalize("/a/./b/../c"), "/a/c");
        assert_eq!(normalize("/a/b/."), "/a/b");
        assert_eq!(normalize("//a///b"), "/a/b");
    }

    #[test]
    fn normalize_never_escapes_root() {
        assert_eq!(normalize("/a/../../b"), "/b");
        assert_eq!(normalize("/.."), "/");
        assert_eq!(normalize("/../.."), "/");
    }

    #[test]
    fn normalize_empty_is_root() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn absolute_resolves_against_cwd() {
        assert_eq!(absolute("/user", "data/x.db"), "/user/data/x.db");
        assert_eq!(absolute("/user", "../sys/a"), "/sys/a");
        assert_eq!(absolute("/user", "/sys/a"), "/sys/a");
    }

    #[test]
    fn mount_prefix_matches_on_segment_boundary() {
        assert!(is_mount_prefix("/", "/anything/at/all"));
        assert!(is_mount_prefix("/sys", "/sys"));
        assert!(is_mount_prefix("/sys", "/sys/user/x"));
        assert!(!is_mount_prefix("/sys", "/system"));
        assert!(!is_mount_prefix("/sys/user", "/sys"));
    }

    #[test]
    fn relative_strips_the_target() {
        assert_eq!(relative_to("/", "/a/b"), "a/b");
        assert_eq!(relative_to("/sys", "/sys"), "");
        assert_eq!(relative_to("/sys", "/sys/user/x"), "user/x");
    }
}
