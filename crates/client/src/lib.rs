//! Client code for marknav.
//!
//! This crate provides the HTTP implementation of the remote key-value store
//! consumed by the core data layer.

pub mod cloudflare;

pub use cloudflare::{CloudflareKv, KvHttpError};
