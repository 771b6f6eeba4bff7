//! Version management layer
//!
//! Classifies updates, fetches package metadata and persists it across
//! sessions for the supported environments (npm, composer).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Registry   │────▶│   Client    │────▶│    Cache    │
//! │  (fetch)    │     │(cache-first)│     │ (TTL, store)│
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                                       │
//!        ▼                                       ▼
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Registries  │     │ Classifier  │     │    Store    │
//! │(npm,packag.)│     │ (buckets)   │     │  (SQLite)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`classifier`]: Update classification between a constraint and a candidate
//! - [`semver`]: Shared version parsing and coercion utilities
//! - [`store`]: Namespaced key/JSON store backed by SQLite
//! - [`cache`]: Version metadata cache with freshness window
//! - [`client`]: Cache-first registry lookups with timeouts
//! - [`history`]: Append-only log of applied updates
//! - [`registry`]: Registry trait for fetching metadata from remote sources
//! - [`registries`]: Concrete registry implementations (npm, Packagist)
//! - [`error`]: Error types for cache and registry operations
//! - [`types`]: Metadata records

pub mod cache;
pub mod classifier;
pub mod client;
pub mod error;
pub mod history;
pub mod registries;
pub mod registry;
pub mod semver;
pub mod store;
pub mod types;
