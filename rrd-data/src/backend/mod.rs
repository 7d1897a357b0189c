//! Storage backend abstraction.
//!
//! The engine never touches the on-disk round-robin format itself; it
//! consumes consolidated rows through [RrdHandle::fetch] and leaves the
//! rollover/write logic to the backend. Handles are either pooled
//! ([pool::HandlePool]) or opened directly from a custom [RrdBackend]
//! carried by a single Def.

pub mod memory;
pub mod pool;

use std::{io, sync::Arc};

use indexmap::IndexMap;

use crate::consol_fun::ConsolFun;

/// A fetch window handed to an archive handle.
#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub consol_fun: ConsolFun,
    pub t_start: i64,
    pub t_end: i64,
    /// Desired archive resolution in seconds; backends pick the closest
    /// archive they hold.
    pub resolution: i64,
    /// Datasource names to fetch. Empty means all.
    pub datasources: Vec<Box<str>>,
}

/// Consolidated rows returned by [RrdHandle::fetch].
///
/// Each row timestamp marks the *end* of the `step`-wide interval the row
/// covers, mirroring how round-robin archives store consolidated rows.
#[derive(Clone, Debug)]
pub struct FetchData {
    pub timestamps: Arc<[i64]>,
    pub values: IndexMap<Box<str>, Arc<[f64]>>,
    pub step: i64,
    /// Timestamp of the last row the archive holds, past the request window.
    pub archive_end: i64,
}

/// Opens archive handles. Backend identity (the `Arc` pointer) scopes which
/// Defs can share a single fetch.
pub trait RrdBackend: Send + Sync {
    fn open(&self, path: &str) -> io::Result<Box<dyn RrdHandle>>;
}

/// An open archive.
pub trait RrdHandle: Send {
    fn fetch(&mut self, request: &FetchRequest) -> io::Result<FetchData>;
}
