//! Registry implementations for fetching package metadata

pub mod http_client;
pub mod npm;
pub mod packagist;

pub use http_client::create_shared_client;
pub use npm::NpmRegistry;
pub use packagist::PackagistRegistry;
