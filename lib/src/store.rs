//! The pluggable content store and its data model.

use std::collections::HashSet;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::directives::CacheControl;
use crate::error::Error;
use crate::keys::{PrimaryKey, VariantKey, VaryKey};
use crate::message::{Request, Response};

pub mod memory;

/// All known variants of one resource under one Vary policy.
///
/// One entry exists per distinct (primary key, vary key) pair ever stored. It
/// is created on the first store of a response with that `Vary` header set and
/// grows as new variants are stored; entries are never explicitly deleted
/// (eviction is a store implementation concern).
#[derive(Debug, Clone)]
pub struct Entry {
    pub primary_key: PrimaryKey,
    /// The Vary axes this entry classifies by: lower-cased, sorted,
    /// de-duplicated header names.
    pub vary_axes: Vec<String>,
    pub variant_keys: HashSet<VariantKey>,
}

impl Entry {
    pub fn new<I, S>(primary_key: PrimaryKey, axes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Entry {
            primary_key,
            vary_axes: canonical_axes(axes),
            variant_keys: HashSet::new(),
        }
    }

    /// The vary-policy key this entry is filed under.
    ///
    /// Note that for a wildcard axis set this mints a fresh, never-matching
    /// key on every call; stores should file wildcard entries under the key
    /// they derived at insertion time.
    pub fn vary_key(&self) -> VaryKey {
        VaryKey::new(&self.vary_axes)
    }
}

/// Lower-case, sort, and de-duplicate an axis-name list.
pub(crate) fn canonical_axes<I, S>(axes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names: Vec<String> = axes
        .into_iter()
        .map(|name| name.as_ref().to_ascii_lowercase())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// One cached response: metadata plus the raw payload, addressed by
/// (primary key, variant key).
///
/// The originating request and raw response are mandatory fields: the request
/// is the source of the Vary-axis values a store needs at upsert time, so the
/// "item without its request" precondition failure of looser designs cannot be
/// expressed here.
#[derive(Debug, Clone)]
pub struct StoredItem {
    pub primary_key: PrimaryKey,
    pub variant_key: VariantKey,
    /// When this item stops being fresh.
    pub expires_at: SystemTime,
    /// True if the response carries an entity tag or last-modified timestamp.
    pub has_validator: bool,
    /// The response's `Cache-Control` directives as parsed at storage time.
    pub directives: CacheControl,
    /// The request this response answered.
    pub request: Request,
    /// The raw stored response.
    pub response: Response,
}

/// Backing store of a [`CacheEngine`](crate::CacheEngine): lookup and upsert
/// of entries and their stored variants.
///
/// Operations may suspend, to accommodate out-of-process backends. An `upsert`
/// that has returned is visible to subsequent `get_entries`/`get_content`
/// calls on the same store; no cross-key atomicity is implied. Backend
/// failures must surface as [`Error`]s, never as empty results — callers
/// need to tell a failing store apart from a cache miss.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// The entry for one (resource, vary policy) pair, if any.
    async fn get_entry(
        &self,
        primary_key: &PrimaryKey,
        vary_key: &VaryKey,
    ) -> Result<Option<Entry>, Error>;

    /// Every entry stored for a resource. An empty vector, never an error,
    /// when nothing is stored.
    async fn get_entries(&self, primary_key: &PrimaryKey) -> Result<Vec<Entry>, Error>;

    /// The stored item for one concrete variant, if any.
    async fn get_content(
        &self,
        primary_key: &PrimaryKey,
        variant_key: &VariantKey,
    ) -> Result<Option<StoredItem>, Error>;

    /// Insert or overwrite the stored item for its exact
    /// (primary key, variant key), creating the owning entry if needed and
    /// ensuring the entry's variant set contains the item's variant key.
    async fn upsert(&self, item: StoredItem) -> Result<(), Error>;
}
