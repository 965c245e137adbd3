//! Result viewer server library.
//!
//! Resolves automated test runs across an in-process cache, the relational
//! store and the night-batch staging share, and exposes them over HTTP.

pub mod api;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
