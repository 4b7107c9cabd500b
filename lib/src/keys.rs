//! Identity of cached resources and their variants.
//!
//! Cached responses are indexed at three levels:
//!
//! - a [`PrimaryKey`] identifies "this resource accessed this way" — method
//!   plus URI, independent of any header variation;
//! - a [`VaryKey`] identifies one `Vary` policy: the *set* of header names a
//!   stored response declared as its variation axes;
//! - a [`VariantKey`] extends the vary key with the values those headers took
//!   on a specific request, identifying one concrete variant.
//!
//! All three are plain value types: equality and hashing are structural, with
//! the single documented exception of the wildcard case below.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use http::Method;
use itertools::Itertools;

use crate::message::Request;

/// Identity of a resource: method plus URI, exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimaryKey {
    method: Method,
    uri: String,
}

impl PrimaryKey {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        PrimaryKey {
            method,
            uri: uri.into(),
        }
    }

    /// The primary key a request resolves to.
    pub fn of(request: &Request) -> Self {
        PrimaryKey::new(request.method.clone(), request.uri.to_string())
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.uri)
    }
}

/// Tokens distinguishing wildcard keys from one another.
static WILDCARD_TOKENS: AtomicU64 = AtomicU64::new(0);

/// Identity of a set of Vary axes.
///
/// `Fixed` holds the canonical form of the axis-name set: names lower-cased,
/// sorted, de-duplicated, and joined with `:` (not itself valid in a header
/// name). Two fixed keys are equal exactly when their axis-name sets are
/// equal, regardless of the order or casing the axes were listed in.
///
/// `Wildcard` is the `Vary: *` case: every wildcard-bearing response is its
/// own variant class. Each construction mints a fresh token, so two wildcard
/// keys built from identical input never compare equal. Clones share their
/// token — the store must be able to address the entry it created — but a key
/// derived from a later request can never match a stored one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VaryKey {
    Fixed(String),
    Wildcard(u64),
}

impl VaryKey {
    /// Canonicalize a collection of axis names into a key.
    ///
    /// Infallible: an empty collection is the (single) empty axis set.
    pub fn new<I, S>(axes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = axes
            .into_iter()
            .map(|name| name.as_ref().to_ascii_lowercase())
            .collect();
        if names.iter().any(|name| name == "*") {
            return VaryKey::Wildcard(WILDCARD_TOKENS.fetch_add(1, Ordering::Relaxed));
        }
        names.sort();
        names.dedup();
        VaryKey::Fixed(names.iter().join(":"))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, VaryKey::Wildcard(_))
    }
}

/// Identity of one concrete variant: a [`VaryKey`] plus the values its axes
/// took on a specific request.
///
/// The value serialization lists each axis in sorted order as
/// `name:value,value`, axes joined with `;`, the whole string lower-cased so
/// header-value casing does not create spurious variants. A wildcard variant
/// key inherits the wildcard vary key's never-matches behavior.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey {
    vary: VaryKey,
    values: String,
}

impl VariantKey {
    /// Derive the variant a request selects under the given Vary axes.
    ///
    /// Each axis resolves against the request headers first, then the request
    /// content headers; a header absent from both contributes an empty value
    /// list rather than an error.
    pub fn new<S: AsRef<str>>(axes: &[S], request: &Request) -> Self {
        let vary = VaryKey::new(axes.iter().map(AsRef::as_ref));
        let values = match &vary {
            VaryKey::Wildcard(_) => String::new(),
            VaryKey::Fixed(_) => {
                let mut names: Vec<String> = axes
                    .iter()
                    .map(|name| name.as_ref().to_ascii_lowercase())
                    .collect();
                names.sort();
                names.dedup();
                names
                    .iter()
                    .map(|name| format!("{name}:{}", axis_values(request, name).iter().join(",")))
                    .join(";")
                    .to_lowercase()
            }
        };
        VariantKey { vary, values }
    }

    /// The vary-policy portion of this key.
    pub fn vary(&self) -> &VaryKey {
        &self.vary
    }
}

/// Resolve one Vary axis against a request: request headers first, then
/// content headers, a miss in both degrading to no values.
fn axis_values<'a>(request: &'a Request, name: &str) -> Vec<&'a str> {
    let values: Vec<&str> = request
        .headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    if !values.is_empty() {
        return values;
    }
    request
        .content_headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect()
}
