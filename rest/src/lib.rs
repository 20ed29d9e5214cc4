//! # Raffle REST
//!
//! `RemoteStore` implementation for a hosted PostgREST-style data API.
//!
//! The API exposes every table under `{endpoint}/rest/v1/{table}` and is
//! authenticated with a single access key, sent both as the `apikey` header
//! and as a bearer token.
//!
//! | operation | request |
//! |---|---|
//! | `select_all` | `GET ?select=*` |
//! | `count` | `HEAD ?select=id` with `Prefer: count=exact`, read `Content-Range` |
//! | `upsert` | `POST ?on_conflict=id` with `Prefer: resolution=merge-duplicates` |
//! | `delete` | `DELETE ?id=eq.{id}` |
//! | `delete_all` | `DELETE ?id=not.is.null` with `Prefer: count=exact` |
//!
//! ## Example
//!
//! ```ignore
//! use raffle_rest::RestRemoteStore;
//!
//! let store = RestRemoteStore::new("https://project.example.co", "public-anon-key")?;
//! let sales = store.select_all("sales").await?;
//! ```

mod client;
mod error;

pub use client::{RestRemoteStore, DEFAULT_PAGE_SIZE};
pub use error::RestConfigError;
