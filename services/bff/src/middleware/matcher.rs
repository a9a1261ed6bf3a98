//! Whitelist of procedures that bypass authentication.
//!
//! Exact string matching only: no globs, no prefixes. An empty
//! configuration means every endpoint requires authentication.
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct PublicEndpointMatcher {
    endpoints: HashSet<String>,
}

impl PublicEndpointMatcher {
    pub fn new<I>(endpoints: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
        }
    }

    /// True iff `procedure` is exactly one of the configured public names.
    pub fn is_public(&self, procedure: &str) -> bool {
        self.endpoints.contains(procedure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_only() {
        let matcher = PublicEndpointMatcher::new(["/api.v1.Foo/Bar"]);
        assert!(matcher.is_public("/api.v1.Foo/Bar"));
        assert!(!matcher.is_public("/api.v1.Foo/BarExtra"));
        assert!(!matcher.is_public("api.v1.Foo/Bar"));
        assert!(!matcher.is_public("/api.v1.Foo/Ba"));
        assert!(!matcher.is_public("/api.v1.foo/bar"));
    }

    #[test]
    fn empty_configuration_matches_nothing() {
        let matcher = PublicEndpointMatcher::new(Vec::<String>::new());
        assert!(!matcher.is_public("/api.v1.Foo/Bar"));
        assert!(!matcher.is_public(""));
    }

    #[test]
    fn multiple_endpoints() {
        let matcher = PublicEndpointMatcher::new([
            "/api.v1.ProductService/ListProducts",
            "/api.v1.UserService/CreateUser",
        ]);
        assert!(matcher.is_public("/api.v1.ProductService/ListProducts"));
        assert!(matcher.is_public("/api.v1.UserService/CreateUser"));
        assert!(!matcher.is_public("/api.v1.UserService/GetUser"));
    }
}
