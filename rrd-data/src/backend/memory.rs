//! In-memory archive backend, used by tests and the command line tools.

use std::{collections::HashMap, io, sync::Arc};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::{FetchData, FetchRequest, RrdBackend, RrdHandle};
use crate::consol_fun::ConsolFun;

/// Consolidated rows of one archive. Row `i` of every datasource covers
/// `(start + i*step, start + (i+1)*step]`.
#[derive(Clone, Debug)]
pub struct MemoryArchive {
    start: i64,
    step: i64,
    datasources: IndexMap<Box<str>, Box<[f64]>>,
}

impl MemoryArchive {
    pub fn new(start: i64, step: i64) -> Self {
        Self {
            start,
            step,
            datasources: IndexMap::new(),
        }
    }

    pub fn with_datasource(mut self, name: &str, values: Vec<f64>) -> Self {
        self.datasources.insert(name.into(), values.into_boxed_slice());
        self
    }

    fn rows(&self) -> i64 {
        self.datasources
            .values()
            .map(|values| values.len())
            .max()
            .unwrap_or(0) as i64
    }
}

/// Archive store shared by every handle it opens.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    archives: Mutex<HashMap<Box<str>, HashMap<ConsolFun, MemoryArchive>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, consol_fun: ConsolFun, archive: MemoryArchive) {
        self.archives
            .lock()
            .entry(path.into())
            .or_default()
            .insert(consol_fun, archive);
    }
}

impl RrdBackend for MemoryBackend {
    fn open(&self, path: &str) -> io::Result<Box<dyn RrdHandle>> {
        let archives = self.archives.lock().get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no archive at '{path}'"))
        })?;

        Ok(Box::new(MemoryHandle { archives }))
    }
}

struct MemoryHandle {
    archives: HashMap<ConsolFun, MemoryArchive>,
}

impl RrdHandle for MemoryHandle {
    fn fetch(&mut self, request: &FetchRequest) -> io::Result<FetchData> {
        let archive = self.archives.get(&request.consol_fun).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {} archive", request.consol_fun),
            )
        })?;

        let rows = archive.rows();
        let step = archive.step;
        let archive_end = archive.start + rows * step;

        // Rows overlapping (t_start, t_end], right-extended to the next row
        // boundary so the final interval is fully covered.
        let first = (request.t_start - archive.start).div_euclid(step).clamp(0, rows);
        let last = (request.t_end - archive.start + step - 1)
            .div_euclid(step)
            .clamp(first, rows);

        let timestamps: Arc<[i64]> = (first..last)
            .map(|i| archive.start + (i + 1) * step)
            .collect();

        let mut values = IndexMap::new();
        for (name, series) in &archive.datasources {
            if !request.datasources.is_empty() && !request.datasources.contains(name) {
                continue;
            }
            let column: Arc<[f64]> = (first..last)
                .map(|i| series.get(i as usize).copied().unwrap_or(f64::NAN))
                .collect();
            values.insert(name.clone(), column);
        }

        for name in &request.datasources {
            if !values.contains_key(name) {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("unknown datasource '{name}'"),
                ));
            }
        }

        Ok(FetchData {
            timestamps,
            values,
            step,
            archive_end,
        })
    }
}
