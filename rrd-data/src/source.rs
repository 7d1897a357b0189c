//! Source model: the archive-backed, RPN-derived, aggregate-broadcast and
//! callback-backed series kinds, sharing one `name -> pixel values`
//! contract.

use std::{cmp::Ordering, sync::Arc};

use crate::{
    aggregator::nearest_rank_sorted,
    backend::RrdBackend,
    consol_fun::ConsolFun,
    rpn::RpnCalculator,
};

/// Per-timestamp callback backing a [SourceKind::PDef].
///
/// Implement whichever accessor matches the column selection used at
/// registration; the defaults return NaN.
pub trait Plottable {
    fn value(&self, timestamp: f64) -> f64 {
        let _ = timestamp;
        f64::NAN
    }

    fn indexed_value(&self, timestamp: f64, index: usize) -> f64 {
        let _ = (timestamp, index);
        f64::NAN
    }

    fn named_value(&self, timestamp: f64, name: &str) -> f64 {
        let _ = (timestamp, name);
        f64::NAN
    }
}

/// Column selection for multi-output callbacks.
#[derive(Clone, Debug)]
pub enum PlottableColumn {
    Single,
    Index(usize),
    Name(Box<str>),
}

/// Raw rows cached by a Def after its fetch, kept for high-precision
/// windowed queries on the unresampled series.
#[derive(Clone)]
pub struct RawData {
    pub timestamps: Arc<[i64]>,
    pub values: Arc<[f64]>,
    pub step: i64,
    pub archive_end: i64,
}

/// An archive-backed source.
#[derive(Clone)]
pub struct DefSource {
    pub path: Box<str>,
    pub canonical_path: Box<str>,
    pub ds_name: Box<str>,
    pub consol_fun: ConsolFun,
    pub backend: Option<Arc<dyn RrdBackend>>,
    pub fetched: Option<RawData>,
}

impl DefSource {
    /// Defs can share a single fetch when they read the same archive the
    /// same way: same canonical path, consolidation function and backend
    /// identity.
    pub fn is_compatible_with(&self, other: &DefSource) -> bool {
        let same_backend = match (&self.backend, &other.backend) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };

        same_backend
            && self.canonical_path == other.canonical_path
            && self.consol_fun == other.consol_fun
    }
}

pub enum SourceKind {
    Def(DefSource),
    CDef { calculator: RpnCalculator },
    SDef { source_name: Box<str>, consol_fun: ConsolFun },
    PDef {
        plottable: Box<dyn Plottable>,
        column: PlottableColumn,
    },
}

/// A named series on the pixel grid. `values` is only ever written by
/// resolution and always has pixel-grid length once set.
pub struct Source {
    pub name: Box<str>,
    pub kind: SourceKind,
    values: Option<Box<[f64]>>,
}

impl Source {
    pub fn new(name: &str, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            values: None,
        }
    }

    pub fn values(&self) -> Option<&[f64]> {
        self.values.as_deref()
    }

    pub(crate) fn set_values(&mut self, values: Box<[f64]>) {
        self.values = Some(values);
    }

    /// Nearest-rank percentile over the resampled pixel series. NaN pixels
    /// sort last and are trimmed off before ranking; fewer than two usable
    /// pixels give NaN. Independent of the raw-data percentile in
    /// [Aggregator](crate::aggregator::Aggregator).
    pub fn percentile(&self, percentile: f64) -> Option<f64> {
        let values = self.values.as_deref()?;

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => a.total_cmp(b),
        });

        while matches!(sorted.last(), Some(value) if value.is_nan()) {
            sorted.pop();
        }

        Some(nearest_rank_sorted(&sorted, percentile))
    }
}
