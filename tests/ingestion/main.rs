//! Ingestion integration test suite.
//!
//! Exercises the repository, resolver, retention sweeper and HTTP routes
//! against a throwaway SQLite database and a temporary staging share.
//!
//! Run with: cargo test --test ingestion

mod test_helpers;

mod test_api;
mod test_repository;
