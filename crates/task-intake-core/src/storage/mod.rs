//! File storage abstraction.
//!
//! The [`FileStorage`] trait is the only way the ingestion pipeline touches
//! file bodies, enabling pluggable backends (local disk, in-memory, object
//! storage). The normalizer only calls the read operations; uploads use
//! [`save`](FileStorage::save) and [`delete`](FileStorage::delete).
//!
//! Paths are storage-relative, `/`-separated strings such as
//! `upload/7/1a2b3c4d-tasks.csv`.

pub mod memory;

use anyhow::Result;

/// Abstract byte store for uploaded files.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`open`](FileStorage::open) | Read a file body |
/// | [`exists`](FileStorage::exists) | Check whether a path is stored |
/// | [`public_url`](FileStorage::public_url) | URL under which the file is served |
/// | [`size`](FileStorage::size) | Stored size in bytes |
/// | [`save`](FileStorage::save) | Write a file body |
/// | [`delete`](FileStorage::delete) | Remove a file |
pub trait FileStorage: Send + Sync {
    fn open(&self, path: &str) -> Result<Vec<u8>>;

    fn exists(&self, path: &str) -> bool;

    fn public_url(&self, path: &str) -> String;

    fn size(&self, path: &str) -> Result<u64>;

    fn save(&self, path: &str, bytes: &[u8]) -> Result<()>;

    fn delete(&self, path: &str) -> Result<()>;
}
