//! Base route matching.
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - A base route matches itself and anything below it on a segment boundary
//!   (`/api` matches `/api` and `/api/users`, never `/apiary`)
//! - `/` (or an empty route) matches every path
//! - Trailing slashes on the base route are ignored

/// Result of matching a module's base route against a requested path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    matched: bool,
    remainder: String,
}

impl RouteMatch {
    /// A failed match.
    pub fn none() -> Self {
        Self {
            matched: false,
            remainder: String::new(),
        }
    }

    fn matched(remainder: &str) -> Self {
        let remainder = if remainder.is_empty() { "/" } else { remainder };
        Self {
            matched: true,
            remainder: remainder.to_string(),
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched
    }

    /// Unmatched part of the path, always starting with `/` on a match.
    pub fn remainder(&self) -> &str {
        &self.remainder
    }
}

impl Default for RouteMatch {
    fn default() -> Self {
        Self::none()
    }
}

/// Normalize a configured base route: leading `/`, no trailing `/`.
pub fn normalize_base_route(route: &str) -> String {
    let trimmed = route.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Match `path` against a module's `base_route`.
pub fn match_base_route(base_route: &str, path: &str) -> RouteMatch {
    let base = base_route.trim_end_matches('/');
    if base.is_empty() {
        return RouteMatch::matched(path);
    }

    match path.strip_prefix(base) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => RouteMatch::matched(rest),
        _ => RouteMatch::none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_matches_everything() {
        let m = match_base_route("/", "/api/v1");
        assert!(m.is_match());
        assert_eq!(m.remainder(), "/api/v1");

        let m = match_base_route("", "/");
        assert!(m.is_match());
        assert_eq!(m.remainder(), "/");
    }

    #[test]
    fn prefix_matches_on_segment_boundary() {
        let m = match_base_route("/api", "/api/v1/users");
        assert!(m.is_match());
        assert_eq!(m.remainder(), "/v1/users");

        let m = match_base_route("/api", "/api");
        assert!(m.is_match());
        assert_eq!(m.remainder(), "/");

        assert!(!match_base_route("/api", "/apiary").is_match());
        assert!(!match_base_route("/api", "/images").is_match());
    }

    #[test]
    fn trailing_slash_on_base_is_ignored() {
        let m = match_base_route("/api/", "/api/x");
        assert!(m.is_match());
        assert_eq!(m.remainder(), "/x");
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!match_base_route("/api", "/API/x").is_match());
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_base_route(""), "/");
        assert_eq!(normalize_base_route("/"), "/");
        assert_eq!(normalize_base_route("api/"), "/api");
        assert_eq!(normalize_base_route(" /ws// "), "/ws");
    }
}
