//! The cache decision engine.
//!
//! [`CacheEngine`] is stateless apart from its injected clock and
//! configuration; every query and store call reads from and writes to the
//! shared [`ContentStore`], which owns all synchronization. It is safe to
//! invoke concurrently from any number of request-handling tasks.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use http::header::{AGE, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use http::{HeaderValue, Method};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::Error;
use crate::keys::{PrimaryKey, VariantKey};
use crate::message::{Request, Response};
use crate::store::{ContentStore, Entry, StoredItem};

/// Status codes that may be stored on the word of the heuristic predicate
/// alone, without explicit freshness information (RFC 7231's
/// cacheable-by-default codes).
const HEURISTICALLY_STORABLE: [u16; 11] = [200, 203, 204, 206, 300, 301, 404, 405, 410, 414, 501];

/// What the caller should do with a request, as decided by
/// [`CacheEngine::query`].
#[derive(Debug)]
pub enum Disposition {
    /// Nothing stored applies. Perform a full network fetch, then offer the
    /// response to [`CacheEngine::store_response`] (gated on
    /// [`CacheEngine::can_store`]).
    CannotUseCache,
    /// A stored item applies but must be revalidated. Build the conditional
    /// request with [`CacheEngine::conditional_request`]; route a 304 to
    /// [`CacheEngine::refresh`] and a full response to
    /// [`CacheEngine::store_response`].
    Revalidate(StoredItem),
    /// Serve the enclosed response. Its `Age` header has already been applied
    /// (when the response carries a `Date`).
    ReturnStored {
        item: StoredItem,
        response: Response,
    },
}

type HeuristicPredicate = dyn Fn(&Response) -> bool + Send + Sync;

/// The decision half of the cache: queries, storability policy, and
/// freshness/age arithmetic over a pluggable [`ContentStore`].
pub struct CacheEngine {
    store: Arc<dyn ContentStore>,
    clock: Arc<dyn Clock>,
    cacheable_methods: HashSet<Method>,
    heuristic: Box<HeuristicPredicate>,
}

impl CacheEngine {
    /// An engine over the given store, with the system clock, the default
    /// cacheable-method set (GET, HEAD, POST), and heuristic storability
    /// disabled.
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        CacheEngine {
            store,
            clock: Arc::new(SystemClock),
            cacheable_methods: [Method::GET, Method::HEAD, Method::POST]
                .into_iter()
                .collect(),
            heuristic: Box::new(|_| false),
        }
    }

    /// Replace the time source. Intended for tests and replay tooling.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the set of request methods whose responses may be stored.
    #[must_use]
    pub fn with_cacheable_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.cacheable_methods = methods.into_iter().collect();
        self
    }

    /// Install a heuristic-storability predicate: permission to store a
    /// response that lacks explicit freshness information. Only consulted for
    /// the fixed allow-list of heuristically storable status codes.
    #[must_use]
    pub fn with_heuristic(
        mut self,
        heuristic: impl Fn(&Response) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.heuristic = Box::new(heuristic);
        self
    }

    /// Decide the cache disposition for a request.
    pub async fn query(&self, request: &Request) -> Result<Disposition, Error> {
        let primary_key = PrimaryKey::of(request);

        // Anything stored for this method and URI?
        let entries = self.store.get_entries(&primary_key).await?;
        if entries.is_empty() {
            debug!(key = %primary_key, "no stored entries");
            return Ok(Disposition::CannotUseCache);
        }

        // A matching variant representation?
        let candidates = self.matching_items(&primary_key, &entries, request).await?;
        let Some(item) = prefer_earliest_date(candidates) else {
            debug!(key = %primary_key, "no matching variant");
            return Ok(Disposition::CannotUseCache);
        };

        // Do directives require revalidation regardless of freshness?
        let request_directives = request.cache_control();
        if request_directives.no_cache || item.directives.no_cache {
            debug!(key = %primary_key, "no-cache directive forces revalidation");
            return Ok(Disposition::Revalidate(item));
        }

        let now = self.clock.now();

        // Fresh?
        if item.expires_at > now {
            match request_directives.min_fresh {
                None => return Ok(self.return_stored(item)),
                Some(min_fresh) if self.age_at(now, &item.response) <= min_fresh => {
                    return Ok(self.return_stored(item));
                }
                Some(_) => {}
            }
        }

        // Did the client say it can be served stale?
        if request_directives.max_stale {
            let within_bound = match request_directives.max_stale_limit {
                None => true,
                Some(limit) => now.duration_since(item.expires_at).unwrap_or_default() <= limit,
            };
            if within_bound {
                return Ok(self.return_stored(item));
            }
        }

        // A validator to revalidate with?
        if item.has_validator {
            return Ok(Disposition::Revalidate(item));
        }

        debug!(key = %primary_key, "stale with no validator");
        Ok(Disposition::CannotUseCache)
    }

    /// Whether a response to the given request is allowed into the cache.
    pub fn can_store(&self, request: &Request, response: &Response) -> bool {
        // Only methods that allow their responses to be cached.
        if !self.cacheable_methods.contains(&request.method) {
            return false;
        }

        // Storing must not be explicitly prohibited on either side.
        let response_directives = response.cache_control();
        if response_directives.no_store || request.cache_control().no_store {
            return false;
        }

        // Explicit freshness information admits the response outright.
        if response.expires().is_some()
            || response_directives.max_age.is_some()
            || response_directives.s_maxage.is_some()
        {
            return true;
        }

        // Without it, storing takes the heuristic predicate's say-so, and only
        // for status codes that are cacheable by default.
        if HEURISTICALLY_STORABLE.contains(&response.status.as_u16()) {
            return (self.heuristic)(response);
        }

        false
    }

    /// Derive keys for a fetched response and upsert it into the store.
    pub async fn store_response(&self, request: &Request, response: &Response) -> Result<(), Error> {
        let primary_key = PrimaryKey::of(request);
        let axes = response.vary_axes();
        let item = StoredItem {
            variant_key: VariantKey::new(&axes, request),
            expires_at: self.expire_date(response),
            has_validator: response.has_validator(),
            directives: response.cache_control(),
            primary_key,
            request: request.clone(),
            response: response.clone(),
        };
        debug!(key = %item.primary_key, "storing response");
        self.store.upsert(item).await
    }

    /// After a "not modified" revalidation: extend the stored item's
    /// freshness if the fresh response grants a later expiry, and persist.
    ///
    /// Header merging from the 304 beyond expiration is future work; callers
    /// must not assume it happens.
    pub async fn refresh(&self, not_modified: &Response, item: &StoredItem) -> Result<(), Error> {
        let mut updated = item.clone();
        let new_expiry = self.expire_date(not_modified);
        if new_expiry > updated.expires_at {
            debug!(key = %updated.primary_key, "revalidation extends freshness");
            updated.expires_at = new_expiry;
        }
        self.store.upsert(updated).await
    }

    /// Turn a request into a conditional request against a stored item:
    /// `If-None-Match` from the item's entity tag if present, else
    /// `If-Modified-Since` from its last-modified timestamp.
    pub fn conditional_request(&self, request: &mut Request, item: &StoredItem) -> Result<(), Error> {
        if let Some(etag) = item.response.etag() {
            request
                .headers
                .append(IF_NONE_MATCH, HeaderValue::from_str(etag)?);
        } else if let Some(last_modified) = item.response.last_modified() {
            let value = HeaderValue::from_str(&httpdate::fmt_http_date(last_modified))?;
            request.headers.insert(IF_MODIFIED_SINCE, value);
        }
        Ok(())
    }

    /// The age of a response: now minus its `Date`, clamped to zero, rounded
    /// to whole seconds. `None` if the response carries no `Date`.
    pub fn age(&self, response: &Response) -> Option<Duration> {
        response.date()?;
        Some(self.age_at(self.clock.now(), response))
    }

    /// Set the `Age` header from the response's `Date`; a response with no
    /// `Date` is left untouched. Presence of `Age` is how a downstream
    /// consumer observes that a response came from this cache.
    pub fn apply_age(&self, response: &mut Response) {
        if let Some(age) = self.age(response) {
            response.headers.insert(AGE, HeaderValue::from(age.as_secs()));
        }
    }

    fn return_stored(&self, item: StoredItem) -> Disposition {
        let mut response = item.response.clone();
        self.apply_age(&mut response);
        Disposition::ReturnStored { item, response }
    }

    /// Age at a fixed instant; a missing `Date` counts as age zero.
    fn age_at(&self, now: SystemTime, response: &Response) -> Duration {
        let Some(date) = response.date() else {
            return Duration::ZERO;
        };
        let age = now.duration_since(date).unwrap_or(Duration::ZERO);
        round_to_seconds(age)
    }

    /// The expiry a response earns at storage time: `now + max-age` if given,
    /// else the `Expires` header, else `now` — stored but immediately stale,
    /// forcing revalidation on next use rather than refusing to store.
    fn expire_date(&self, response: &Response) -> SystemTime {
        let directives = response.cache_control();
        if let Some(max_age) = directives.max_age {
            return self.clock.now() + max_age;
        }
        if let Some(expires) = response.expires() {
            return expires;
        }
        self.clock.now()
    }

    async fn matching_items(
        &self,
        primary_key: &PrimaryKey,
        entries: &[Entry],
        request: &Request,
    ) -> Result<Vec<StoredItem>, Error> {
        let mut items = Vec::new();
        for entry in entries {
            let candidate = VariantKey::new(&entry.vary_axes, request);
            if !entry.variant_keys.contains(&candidate) {
                continue;
            }
            if let Some(item) = self.store.get_content(primary_key, &candidate).await? {
                items.push(item);
            }
        }
        Ok(items)
    }
}

/// Preferred-variant policy: order candidates by response `Date` ascending (a
/// missing `Date` sorts earliest) and take the first.
///
/// "Oldest Date wins" is almost certainly inverted from what a cache would
/// want, but it is the selection order this engine reproduces, and changing it
/// silently would change which variant callers observe. It lives here as one
/// named function so a deliberate correction stays a one-line change.
fn prefer_earliest_date(items: Vec<StoredItem>) -> Option<StoredItem> {
    items
        .into_iter()
        .min_by_key(|item| item.response.date().unwrap_or(SystemTime::UNIX_EPOCH))
}

fn round_to_seconds(duration: Duration) -> Duration {
    Duration::from_secs(((duration.as_millis() + 500) / 1000) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test::ManualClock;
    use crate::directives::CacheControl;
    use crate::store::memory::InMemoryStore;
    use http::header::{CACHE_CONTROL, DATE, ETAG, EXPIRES, LAST_MODIFIED};
    use http::{StatusCode, Uri};
    use std::time::UNIX_EPOCH;

    fn engine_at(start: SystemTime) -> CacheEngine {
        CacheEngine::new(Arc::new(InMemoryStore::new())).with_clock(Arc::new(ManualClock::at(start)))
    }

    fn http_date(time: SystemTime) -> HeaderValue {
        HeaderValue::from_str(&httpdate::fmt_http_date(time)).unwrap()
    }

    fn get_request() -> Request {
        Request::get(Uri::from_static("http://example.org/doc"))
    }

    fn stored_item(response: Response) -> StoredItem {
        let request = get_request();
        let axes = response.vary_axes();
        StoredItem {
            primary_key: PrimaryKey::of(&request),
            variant_key: VariantKey::new(&axes, &request),
            expires_at: UNIX_EPOCH,
            has_validator: response.has_validator(),
            directives: CacheControl::default(),
            request,
            response,
        }
    }

    #[test]
    fn can_store_requires_a_cacheable_method() {
        let engine = engine_at(UNIX_EPOCH);
        let response = Response::new(StatusCode::OK)
            .with_header(CACHE_CONTROL, HeaderValue::from_static("max-age=60"));

        assert!(engine.can_store(&get_request(), &response));

        let mut put = get_request();
        put.method = Method::PUT;
        assert!(!engine.can_store(&put, &response));
    }

    #[test]
    fn can_store_honors_no_store_on_either_side() {
        let engine = engine_at(UNIX_EPOCH);

        let forbidden = Response::new(StatusCode::OK)
            .with_header(CACHE_CONTROL, HeaderValue::from_static("no-store, max-age=60"));
        assert!(!engine.can_store(&get_request(), &forbidden));

        let response = Response::new(StatusCode::OK)
            .with_header(CACHE_CONTROL, HeaderValue::from_static("max-age=60"));
        let request = get_request()
            .with_header(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        assert!(!engine.can_store(&request, &response));
    }

    #[test]
    fn can_store_needs_freshness_or_heuristics() {
        let engine = engine_at(UNIX_EPOCH);

        // A bare 200 with no freshness information and the default
        // (always-false) heuristic predicate is not storable.
        let bare = Response::new(StatusCode::OK);
        assert!(!engine.can_store(&get_request(), &bare));

        let expires = Response::new(StatusCode::OK)
            .with_header(EXPIRES, http_date(UNIX_EPOCH + Duration::from_secs(60)));
        assert!(engine.can_store(&get_request(), &expires));

        let shared = Response::new(StatusCode::OK)
            .with_header(CACHE_CONTROL, HeaderValue::from_static("s-maxage=60"));
        assert!(engine.can_store(&get_request(), &shared));
    }

    #[test]
    fn heuristic_predicate_is_gated_by_status() {
        let engine = engine_at(UNIX_EPOCH).with_heuristic(|_| true);

        assert!(engine.can_store(&get_request(), &Response::new(StatusCode::OK)));
        assert!(engine.can_store(&get_request(), &Response::new(StatusCode::NOT_FOUND)));
        // 302 is not in the allow-list, heuristics or not.
        assert!(!engine.can_store(&get_request(), &Response::new(StatusCode::FOUND)));
    }

    #[test]
    fn expire_date_prefers_max_age_over_expires() {
        let engine = engine_at(UNIX_EPOCH);
        let response = Response::new(StatusCode::OK)
            .with_header(CACHE_CONTROL, HeaderValue::from_static("max-age=30"))
            .with_header(EXPIRES, http_date(UNIX_EPOCH + Duration::from_secs(300)));
        assert_eq!(engine.expire_date(&response), UNIX_EPOCH + Duration::from_secs(30));

        let expires_only = Response::new(StatusCode::OK)
            .with_header(EXPIRES, http_date(UNIX_EPOCH + Duration::from_secs(300)));
        assert_eq!(
            engine.expire_date(&expires_only),
            UNIX_EPOCH + Duration::from_secs(300)
        );

        // No freshness information: stored but immediately stale.
        assert_eq!(engine.expire_date(&Response::new(StatusCode::OK)), UNIX_EPOCH);
    }

    #[test]
    fn age_is_clamped_and_rounded() {
        let engine = engine_at(UNIX_EPOCH + Duration::from_secs(10));

        let response = Response::new(StatusCode::OK).with_header(DATE, http_date(UNIX_EPOCH));
        assert_eq!(engine.age(&response), Some(Duration::from_secs(10)));

        // A Date in the future clamps to zero rather than going negative.
        let future = Response::new(StatusCode::OK)
            .with_header(DATE, http_date(UNIX_EPOCH + Duration::from_secs(60)));
        assert_eq!(engine.age(&future), Some(Duration::ZERO));

        // No Date, no age.
        assert_eq!(engine.age(&Response::new(StatusCode::OK)), None);
    }

    #[test]
    fn apply_age_only_annotates_dated_responses() {
        let engine = engine_at(UNIX_EPOCH + Duration::from_secs(3));

        let mut dated = Response::new(StatusCode::OK).with_header(DATE, http_date(UNIX_EPOCH));
        engine.apply_age(&mut dated);
        assert_eq!(dated.headers.get(AGE).unwrap(), "3");

        let mut undated = Response::new(StatusCode::OK);
        engine.apply_age(&mut undated);
        assert!(undated.headers.get(AGE).is_none());
    }

    #[test]
    fn conditional_request_prefers_etag() {
        let engine = engine_at(UNIX_EPOCH);

        let item = stored_item(
            Response::new(StatusCode::OK)
                .with_header(ETAG, HeaderValue::from_static("\"v1\""))
                .with_header(LAST_MODIFIED, http_date(UNIX_EPOCH)),
        );
        let mut request = get_request();
        engine.conditional_request(&mut request, &item).unwrap();
        assert_eq!(request.headers.get(IF_NONE_MATCH).unwrap(), "\"v1\"");
        assert!(request.headers.get(IF_MODIFIED_SINCE).is_none());
    }

    #[test]
    fn conditional_request_falls_back_to_last_modified() {
        let engine = engine_at(UNIX_EPOCH);

        let item = stored_item(
            Response::new(StatusCode::OK).with_header(LAST_MODIFIED, http_date(UNIX_EPOCH)),
        );
        let mut request = get_request();
        engine.conditional_request(&mut request, &item).unwrap();
        assert_eq!(
            request.headers.get(IF_MODIFIED_SINCE).unwrap(),
            &http_date(UNIX_EPOCH)
        );

        // No validator at all: the request is left unconditional.
        let mut bare = get_request();
        engine
            .conditional_request(&mut bare, &stored_item(Response::new(StatusCode::OK)))
            .unwrap();
        assert!(bare.headers.get(IF_NONE_MATCH).is_none());
        assert!(bare.headers.get(IF_MODIFIED_SINCE).is_none());
    }

    #[test]
    fn preferred_variant_takes_the_earliest_date() {
        let old = stored_item(
            Response::new(StatusCode::OK)
                .with_header(DATE, http_date(UNIX_EPOCH + Duration::from_secs(10)))
                .with_body("old"),
        );
        let new = stored_item(
            Response::new(StatusCode::OK)
                .with_header(DATE, http_date(UNIX_EPOCH + Duration::from_secs(20)))
                .with_body("new"),
        );
        let undated = stored_item(Response::new(StatusCode::OK).with_body("undated"));

        let picked = prefer_earliest_date(vec![new.clone(), old.clone()]).unwrap();
        assert_eq!(picked.response.body.unwrap(), "old");

        // A missing Date sorts earliest of all.
        let picked = prefer_earliest_date(vec![new, old, undated]).unwrap();
        assert_eq!(picked.response.body.unwrap(), "undated");

        assert!(prefer_earliest_date(Vec::new()).is_none());
    }

    #[test]
    fn rounding_goes_to_the_nearest_second() {
        assert_eq!(round_to_seconds(Duration::from_millis(1499)), Duration::from_secs(1));
        assert_eq!(round_to_seconds(Duration::from_millis(1500)), Duration::from_secs(2));
        assert_eq!(round_to_seconds(Duration::ZERO), Duration::ZERO);
    }
}
