//! Pooled archive handles with scoped acquisition.

use std::{
    collections::HashMap,
    io,
    ops::{Deref, DerefMut},
    path::Path,
    sync::Arc,
};

use parking_lot::Mutex;

use super::{RrdBackend, RrdHandle};

/// Idle handles kept per canonical path by default.
const DEFAULT_IDLE_PER_PATH: usize = 4;

/// Shared pool of open archive handles, keyed by canonical path.
///
/// [HandlePool::acquire] hands out a [PooledHandle] guard; dropping the
/// guard returns the handle to the pool (up to the idle bound), so a failed
/// fetch can never leak it. The pool is the only shared mutable resource in
/// the pipeline; concurrent processors sharing one may serialize on it but
/// no lock is held across a fetch.
pub struct HandlePool {
    backend: Arc<dyn RrdBackend>,
    idle: Mutex<HashMap<Box<str>, Vec<Box<dyn RrdHandle>>>>,
    idle_per_path: usize,
}

impl HandlePool {
    pub fn new(backend: Arc<dyn RrdBackend>) -> Self {
        Self::with_idle_bound(backend, DEFAULT_IDLE_PER_PATH)
    }

    pub fn with_idle_bound(backend: Arc<dyn RrdBackend>, idle_per_path: usize) -> Self {
        Self {
            backend,
            idle: Mutex::new(HashMap::new()),
            idle_per_path,
        }
    }

    /// Canonical form of an archive path, also used to group compatible
    /// Defs. Paths that don't resolve (virtual backends) are kept verbatim.
    pub fn canonical_path(path: &str) -> Box<str> {
        Path::new(path)
            .canonicalize()
            .ok()
            .and_then(|p| p.to_str().map(Box::from))
            .unwrap_or_else(|| path.into())
    }

    pub fn acquire(&self, path: &str) -> io::Result<PooledHandle<'_>> {
        let key = Self::canonical_path(path);

        let pooled = {
            let mut idle = self.idle.lock();
            idle.get_mut(&key).and_then(Vec::pop)
        };

        let handle = match pooled {
            Some(handle) => handle,
            None => {
                tracing::debug!(path, "opening archive handle");
                self.backend.open(path)?
            }
        };

        Ok(PooledHandle {
            pool: self,
            key,
            handle: Some(handle),
        })
    }

    fn release(&self, key: Box<str>, handle: Box<dyn RrdHandle>) {
        let mut idle = self.idle.lock();
        let slot = idle.entry(key).or_default();
        if slot.len() < self.idle_per_path {
            slot.push(handle);
        }
        // Past the bound the handle is simply dropped (closed).
    }
}

/// RAII guard around a pooled handle; returns it to the pool on drop.
pub struct PooledHandle<'a> {
    pool: &'a HandlePool,
    key: Box<str>,
    handle: Option<Box<dyn RrdHandle>>,
}

impl Deref for PooledHandle<'_> {
    type Target = dyn RrdHandle;

    fn deref(&self) -> &Self::Target {
        self.handle.as_deref().expect("handle taken before drop")
    }
}

impl DerefMut for PooledHandle<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.handle.as_deref_mut().expect("handle taken before drop")
    }
}

impl Drop for PooledHandle<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(std::mem::take(&mut self.key), handle);
        }
    }
}
