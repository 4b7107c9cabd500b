//! Parsed `Cache-Control` directives.
//!
//! Only the directives the engine consults are represented. Parsing is
//! lenient, as caches must be: unknown directives and malformed arguments are
//! ignored rather than rejected, and an absent header parses to the default
//! "no directives" value.

use std::time::Duration;

use http::header::CACHE_CONTROL;
use http::HeaderMap;

/// The cache-relevant directives of a `Cache-Control` header.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheControl {
    /// `no-cache`: the stored response may not be used without revalidation.
    pub no_cache: bool,
    /// `no-store`: the response (or the response to this request) may not be
    /// stored at all.
    pub no_store: bool,
    /// `max-age`: freshness lifetime relative to the response's generation.
    pub max_age: Option<Duration>,
    /// `s-maxage`: shared-cache freshness lifetime. Counts as freshness
    /// information for storability, but does not set this cache's expiry.
    pub s_maxage: Option<Duration>,
    /// `min-fresh`: the client wants a response that stays fresh at least
    /// this much longer.
    pub min_fresh: Option<Duration>,
    /// `max-stale` was present, with or without a bound.
    pub max_stale: bool,
    /// The bound given with `max-stale`, if any. `None` with `max_stale` set
    /// means the client accepts a stale response of any age.
    pub max_stale_limit: Option<Duration>,
    /// `only-if-cached`: the client wants no network traffic for this request.
    pub only_if_cached: bool,
}

impl CacheControl {
    /// Parse the combined `Cache-Control` directives out of a header map.
    ///
    /// Multiple `Cache-Control` headers are treated as one comma-joined list,
    /// per the usual HTTP list-header rules.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut directives = CacheControl::default();
        for value in headers.get_all(CACHE_CONTROL) {
            let Ok(value) = value.to_str() else { continue };
            for directive in value.split(',') {
                directives.apply(directive.trim());
            }
        }
        directives
    }

    fn apply(&mut self, directive: &str) {
        let (name, argument) = match directive.split_once('=') {
            Some((name, argument)) => (name.trim(), Some(argument.trim().trim_matches('"'))),
            None => (directive, None),
        };
        match name.to_ascii_lowercase().as_str() {
            "no-cache" => self.no_cache = true,
            "no-store" => self.no_store = true,
            "only-if-cached" => self.only_if_cached = true,
            "max-age" => self.max_age = parse_seconds(argument),
            "s-maxage" => self.s_maxage = parse_seconds(argument),
            "min-fresh" => self.min_fresh = parse_seconds(argument),
            "max-stale" => {
                self.max_stale = true;
                self.max_stale_limit = parse_seconds(argument);
            }
            _ => {}
        }
    }
}

fn parse_seconds(argument: Option<&str>) -> Option<Duration> {
    argument?.parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn parse(value: &'static str) -> CacheControl {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(value));
        CacheControl::from_headers(&headers)
    }

    #[test]
    fn absent_header_means_no_directives() {
        assert_eq!(CacheControl::from_headers(&HeaderMap::new()), CacheControl::default());
    }

    #[test]
    fn parses_flags_and_values() {
        let directives = parse("no-cache, no-store, max-age=60, s-maxage=120, min-fresh=5");
        assert!(directives.no_cache);
        assert!(directives.no_store);
        assert_eq!(directives.max_age, Some(Duration::from_secs(60)));
        assert_eq!(directives.s_maxage, Some(Duration::from_secs(120)));
        assert_eq!(directives.min_fresh, Some(Duration::from_secs(5)));
        assert!(!directives.max_stale);
    }

    #[test]
    fn max_stale_with_and_without_bound() {
        let bounded = parse("max-stale=30");
        assert!(bounded.max_stale);
        assert_eq!(bounded.max_stale_limit, Some(Duration::from_secs(30)));

        let unbounded = parse("max-stale");
        assert!(unbounded.max_stale);
        assert_eq!(unbounded.max_stale_limit, None);
    }

    #[test]
    fn directive_names_are_case_insensitive() {
        let directives = parse("No-Cache, Max-Age=10");
        assert!(directives.no_cache);
        assert_eq!(directives.max_age, Some(Duration::from_secs(10)));
    }

    #[test]
    fn only_if_cached_and_unknown_directives() {
        let directives = parse("only-if-cached, frobnicate=3, immutable");
        assert!(directives.only_if_cached);
        assert!(!directives.no_cache);
    }

    #[test]
    fn malformed_arguments_are_ignored() {
        let directives = parse("max-age=soon, min-fresh=");
        assert_eq!(directives.max_age, None);
        assert_eq!(directives.min_fresh, None);
    }

    #[test]
    fn multiple_headers_combine() {
        let mut headers = HeaderMap::new();
        headers.append(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.append(CACHE_CONTROL, HeaderValue::from_static("max-age=7"));
        let directives = CacheControl::from_headers(&headers);
        assert!(directives.no_cache);
        assert_eq!(directives.max_age, Some(Duration::from_secs(7)));
    }
}
