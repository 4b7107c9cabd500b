//! A private (client-side) HTTP response cache.
//!
//! This crate is the *decision and indexing* half of an HTTP cache: given an
//! outgoing request and a history of previously observed responses, it decides
//! whether the request can be answered from local storage, must be revalidated
//! with a conditional request, or must go to the network untouched. It does
//! not speak to a network itself; a transport interceptor drives it by calling
//! [`CacheEngine::query`] before sending a request and offering responses back
//! through [`CacheEngine::store_response`].
//!
//! Cached responses are indexed at three levels: a [`PrimaryKey`] names a
//! resource (method plus URI), a [`VaryKey`] names one `Vary` policy observed
//! for that resource, and a [`VariantKey`] names one concrete variant under
//! that policy. The [`ContentStore`] trait owns persistence of this index;
//! [`InMemoryStore`] is the reference implementation.

// When building the project in release mode:
//   (1): Promote warnings into errors.
//   (2): Deny broken documentation links.
//   (3): Promote warnings in examples into errors, except for unused variables.
#![cfg_attr(not(debug_assertions), deny(warnings))]
#![cfg_attr(not(debug_assertions), deny(clippy::all))]
#![cfg_attr(not(debug_assertions), deny(rustdoc::broken_intra_doc_links))]
#![cfg_attr(not(debug_assertions), doc(test(attr(deny(warnings)))))]
#![cfg_attr(not(debug_assertions), doc(test(attr(allow(unused_variables)))))]

pub mod clock;
pub mod directives;
pub mod engine;
pub mod error;
pub mod keys;
pub mod message;
pub mod store;

pub use {
    clock::{Clock, SystemClock},
    directives::CacheControl,
    engine::{CacheEngine, Disposition},
    error::Error,
    keys::{PrimaryKey, VariantKey, VaryKey},
    message::{Request, Response},
    store::{memory::InMemoryStore, ContentStore, Entry, StoredItem},
};
