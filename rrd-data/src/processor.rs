//! Pipeline orchestration: the time window, the pixel grid, three-phase
//! source resolution and the query surface.

use std::{collections::HashMap, fmt::Write as _, io, sync::Arc};

use indexmap::IndexMap;

use crate::{
    aggregator::{Aggregates, Aggregator},
    backend::{pool::HandlePool, FetchData, FetchRequest, RrdBackend},
    consol_fun::ConsolFun,
    error::RrdError,
    normalizer::Normalizer,
    rpn::{RpnCalculator, RpnExpression},
    source::{DefSource, Plottable, PlottableColumn, RawData, Source, SourceKind},
};

/// Default pixel grid width.
pub const DEFAULT_PIXEL_COUNT: usize = 400;

/// Reconstructs uniform, gap-free series over `[t_start, t_end]` from
/// round-robin archives, derived RPN expressions, broadcast aggregates and
/// plottable callbacks.
///
/// Configure the grid, register sources, call [DataProcessor::process_data]
/// once, then query. Resolution is synchronous on the calling thread and a
/// failure leaves later sources unresolved; discard the processor in that
/// case.
pub struct DataProcessor {
    t_start: i64,
    t_end: i64,
    pixel_count: usize,
    step: Option<i64>,
    timestamps: Box<[f64]>,
    sources: IndexMap<Box<str>, Source>,
    pool: Option<Arc<HandlePool>>,
    processed: bool,
}

fn pixel_timestamps(t_start: i64, t_end: i64, pixel_count: usize) -> Box<[f64]> {
    let span = (t_end - t_start) as f64;

    (0..pixel_count)
        .map(|i| t_start as f64 + span * (i as f64 / (pixel_count - 1) as f64))
        .collect()
}

impl DataProcessor {
    pub fn new(t_start: i64, t_end: i64) -> Result<Self, RrdError> {
        if t_start >= t_end {
            return Err(RrdError::InvalidRange { t_start, t_end });
        }

        Ok(Self {
            t_start,
            t_end,
            pixel_count: DEFAULT_PIXEL_COUNT,
            step: None,
            timestamps: pixel_timestamps(t_start, t_end, DEFAULT_PIXEL_COUNT),
            sources: IndexMap::new(),
            pool: None,
            processed: false,
        })
    }

    pub fn t_start(&self) -> i64 {
        self.t_start
    }

    pub fn t_end(&self) -> i64 {
        self.t_end
    }

    pub fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    /// Pixel step of the current grid, in seconds.
    pub fn pixel_step(&self) -> f64 {
        (self.t_end - self.t_start) as f64 / (self.pixel_count - 1) as f64
    }

    /// Step floor applied to Def fetches: the fetch resolution hint and the
    /// one-step end extension of the fetch window.
    fn effective_step(&self) -> i64 {
        let grid_step = self.pixel_step().ceil() as i64;
        self.step.map_or(grid_step, |step| step.max(grid_step)).max(1)
    }

    fn ensure_configurable(&self) -> Result<(), RrdError> {
        if self.processed {
            Err(RrdError::AlreadyProcessed)
        } else {
            Ok(())
        }
    }

    /// Resize the pixel grid. Fails once data has been processed: resolved
    /// series would silently keep the old grid's length otherwise.
    pub fn set_pixel_count(&mut self, pixel_count: usize) -> Result<(), RrdError> {
        self.ensure_configurable()?;
        if pixel_count < 2 {
            return Err(RrdError::InvalidPixelCount(pixel_count));
        }

        self.pixel_count = pixel_count;
        self.timestamps = pixel_timestamps(self.t_start, self.t_end, pixel_count);
        Ok(())
    }

    /// Request a minimum archive step for Def fetches, batching runs of
    /// equal-average pixels when the archive is coarser than the grid.
    pub fn set_step(&mut self, step: i64) -> Result<(), RrdError> {
        self.ensure_configurable()?;
        self.step = Some(step);
        Ok(())
    }

    /// Share a handle pool with other processors. Defs without a custom
    /// backend need one.
    pub fn set_pool(&mut self, pool: Arc<HandlePool>) -> Result<(), RrdError> {
        self.ensure_configurable()?;
        self.pool = Some(pool);
        Ok(())
    }

    fn register(&mut self, source: Source) {
        self.sources.insert(source.name.clone(), source);
    }

    /// Register an archive-backed source, fetched through the shared pool.
    pub fn add_def(&mut self, name: &str, path: &str, ds_name: &str, consol_fun: ConsolFun) {
        self.register_def(name, path, ds_name, consol_fun, None);
    }

    /// Register an archive-backed source with its own backend, opened
    /// directly instead of through the pool.
    pub fn add_def_with_backend(
        &mut self,
        name: &str,
        path: &str,
        ds_name: &str,
        consol_fun: ConsolFun,
        backend: Arc<dyn RrdBackend>,
    ) {
        self.register_def(name, path, ds_name, consol_fun, Some(backend));
    }

    fn register_def(
        &mut self,
        name: &str,
        path: &str,
        ds_name: &str,
        consol_fun: ConsolFun,
        backend: Option<Arc<dyn RrdBackend>>,
    ) {
        self.register(Source::new(
            name,
            SourceKind::Def(DefSource {
                path: path.into(),
                canonical_path: HandlePool::canonical_path(path),
                ds_name: ds_name.into(),
                consol_fun,
                backend,
                fetched: None,
            }),
        ));
    }

    /// Register a derived source: the RPN expression is evaluated once per
    /// pixel, with previously resolved sources available by name. Bad
    /// references only fail at resolution.
    pub fn add_cdef(&mut self, name: &str, rpn: &str) {
        let calculator = RpnCalculator::new(RpnExpression::parse(rpn));
        self.register(Source::new(name, SourceKind::CDef { calculator }));
    }

    /// Register a broadcast source: one aggregate of another source's pixel
    /// series, repeated across all pixels.
    pub fn add_sdef(&mut self, name: &str, source_name: &str, consol_fun: ConsolFun) {
        self.register(Source::new(
            name,
            SourceKind::SDef {
                source_name: source_name.into(),
                consol_fun,
            },
        ));
    }

    /// Register a callback-backed source, sampled at each pixel timestamp.
    pub fn add_pdef(&mut self, name: &str, plottable: Box<dyn Plottable>, column: PlottableColumn) {
        self.register(Source::new(name, SourceKind::PDef { plottable, column }));
    }

    /// Resolve every registered source: first all Defs (batched by
    /// compatible archive), then all PDefs, then SDefs and CDefs
    /// interleaved in registration order. Must run before any query; may
    /// run again, in which case resolved Defs skip their fetch and derived
    /// sources recompute.
    pub fn process_data(&mut self) -> Result<(), RrdError> {
        self.processed = true;

        self.resolve_defs()?;
        self.resolve_pdefs();
        self.resolve_derived()
    }

    fn resolve_defs(&mut self) -> Result<(), RrdError> {
        let normalizer = Normalizer::new(&self.timestamps);

        loop {
            let Some(anchor) = self.sources.values().find_map(|source| match &source.kind {
                SourceKind::Def(def) if def.fetched.is_none() => Some(def.clone()),
                _ => None,
            }) else {
                break;
            };

            // One fetch covers every unresolved Def compatible with the
            // anchor, over the union of their datasource names.
            let mut members = Vec::new();
            let mut datasources: Vec<Box<str>> = Vec::new();
            for (i, source) in self.sources.values().enumerate() {
                if let SourceKind::Def(def) = &source.kind {
                    if def.fetched.is_none() && def.is_compatible_with(&anchor) {
                        members.push(i);
                        if !datasources.contains(&def.ds_name) {
                            datasources.push(def.ds_name.clone());
                        }
                    }
                }
            }

            let data = self.fetch_group(&anchor, datasources)?;
            self.distribute(&members, &data, &normalizer)?;
        }

        Ok(())
    }

    fn fetch_group(
        &self,
        anchor: &DefSource,
        datasources: Vec<Box<str>>,
    ) -> Result<FetchData, RrdError> {
        let step = self.effective_step();
        let request = FetchRequest {
            consol_fun: anchor.consol_fun,
            t_start: self.t_start,
            t_end: self.t_end + step,
            resolution: step,
            datasources,
        };

        tracing::debug!(
            path = anchor.path.as_ref(),
            consol_fun = %anchor.consol_fun,
            datasources = request.datasources.len(),
            "fetching archive group"
        );

        let data = match &anchor.backend {
            // Custom backend: a direct open, closed right after the fetch.
            Some(backend) => backend.open(&anchor.path)?.fetch(&request)?,
            None => {
                let pool = self.pool.as_ref().ok_or_else(|| {
                    RrdError::Storage(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "no handle pool configured",
                    ))
                })?;
                let mut handle = pool.acquire(&anchor.path)?;
                // The guard returns the handle to the pool even when the
                // fetch fails.
                handle.fetch(&request)?
            }
        };

        Ok(data)
    }

    fn distribute(
        &mut self,
        members: &[usize],
        data: &FetchData,
        normalizer: &Normalizer,
    ) -> Result<(), RrdError> {
        for &i in members {
            let Some((_, source)) = self.sources.get_index_mut(i) else {
                continue;
            };
            let SourceKind::Def(def) = &mut source.kind else {
                continue;
            };

            let Some(column) = data.values.get(&def.ds_name) else {
                return Err(RrdError::DataUnavailable(source.name.clone()));
            };

            let pixels = normalizer.normalize(&data.timestamps, column);
            def.fetched = Some(RawData {
                timestamps: Arc::clone(&data.timestamps),
                values: Arc::clone(column),
                step: data.step,
                archive_end: data.archive_end,
            });
            source.set_values(pixels);
        }

        Ok(())
    }

    fn resolve_pdefs(&mut self) {
        let timestamps = self.timestamps.clone();

        for source in self.sources.values_mut() {
            let SourceKind::PDef { plottable, column } = &source.kind else {
                continue;
            };

            let values: Box<[f64]> = timestamps
                .iter()
                .map(|&timestamp| match column {
                    PlottableColumn::Single => plottable.value(timestamp),
                    PlottableColumn::Index(index) => plottable.indexed_value(timestamp, *index),
                    PlottableColumn::Name(name) => plottable.named_value(timestamp, name),
                })
                .collect();

            source.set_values(values);
        }
    }

    fn resolve_derived(&mut self) -> Result<(), RrdError> {
        for i in 0..self.sources.len() {
            let computed = match &self.sources[i].kind {
                SourceKind::SDef {
                    source_name,
                    consol_fun,
                } => {
                    let values = self.dependency_values(source_name)?;
                    let scalar = Aggregator::new(&self.timestamps, values)
                        .get_aggregates(self.t_start, self.t_end)
                        .value_for(*consol_fun);
                    Some(vec![scalar; self.pixel_count].into_boxed_slice())
                }
                SourceKind::CDef { calculator } => Some(self.evaluate_cdef(calculator)?),
                _ => None,
            };

            if let Some(values) = computed {
                if let Some((_, source)) = self.sources.get_index_mut(i) {
                    source.set_values(values);
                }
            }
        }

        Ok(())
    }

    /// Values of a source referenced by a derived one. A name registered
    /// but not yet resolved is a forward reference.
    fn dependency_values(&self, name: &str) -> Result<&[f64], RrdError> {
        let source = self
            .sources
            .get(name)
            .ok_or_else(|| RrdError::UnknownSource(name.into()))?;
        source
            .values()
            .ok_or_else(|| RrdError::UnknownSource(name.into()))
    }

    fn evaluate_cdef(&self, calculator: &RpnCalculator) -> Result<Box<[f64]>, RrdError> {
        // Bind referenced sources once; non-source names are left to the
        // evaluator, which reports them as undefined variables.
        let mut referenced: Vec<(&str, &[f64])> = Vec::new();
        for name in calculator.expression().variable_names() {
            if self.sources.contains_key(name) {
                referenced.push((name, self.dependency_values(name)?));
            }
        }

        let mut vars: HashMap<Box<str>, f64> = referenced
            .iter()
            .map(|&(name, _)| (name.into(), f64::NAN))
            .collect();

        let mut values = Vec::with_capacity(self.pixel_count);
        for (i, &timestamp) in self.timestamps.iter().enumerate() {
            for &(name, series) in &referenced {
                if let Some(slot) = vars.get_mut(name) {
                    *slot = series[i];
                }
            }
            values.push(calculator.calculate(&vars, timestamp)?);
        }

        Ok(values.into_boxed_slice())
    }

    /// Registered source names, in registration order.
    pub fn get_source_names(&self) -> Vec<&str> {
        self.sources.keys().map(AsRef::as_ref).collect()
    }

    /// The pixel grid timestamps, in seconds.
    pub fn get_timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    fn resolved_values(&self, name: &str) -> Result<&[f64], RrdError> {
        let source = self
            .sources
            .get(name)
            .ok_or_else(|| RrdError::UnknownSource(name.into()))?;
        source
            .values()
            .ok_or_else(|| RrdError::DataUnavailable(name.into()))
    }

    /// Pixel values of a resolved source.
    pub fn get_values(&self, name: &str) -> Result<&[f64], RrdError> {
        self.resolved_values(name)
    }

    /// Consolidate a resolved source's pixel series down to one scalar.
    /// The first pixel covers zero width and is skipped, so FIRST lands on
    /// the second pixel and LAST on the final one.
    pub fn get_aggregate(&self, name: &str, consol_fun: ConsolFun) -> Result<f64, RrdError> {
        let values = self.resolved_values(name)?;

        Ok(Aggregator::new(&self.timestamps, values)
            .get_aggregates(self.t_start, self.t_end)
            .value_for(consol_fun))
    }

    /// Raw rows cached by a Def, as `f64` timestamp/value arrays. Non-Def
    /// sources have no raw series.
    fn raw_series(&self, name: &str) -> Result<Option<(Vec<f64>, Vec<f64>)>, RrdError> {
        let source = self
            .sources
            .get(name)
            .ok_or_else(|| RrdError::UnknownSource(name.into()))?;

        if let SourceKind::Def(def) = &source.kind {
            let raw = def
                .fetched
                .as_ref()
                .ok_or_else(|| RrdError::DataUnavailable(name.into()))?;
            let timestamps = raw.timestamps.iter().map(|&t| t as f64).collect();
            Ok(Some((timestamps, raw.values.to_vec())))
        } else {
            Ok(None)
        }
    }

    /// Windowed statistics over a sub-range. Defs are computed over their
    /// cached raw rows; other sources over their pixel series.
    pub fn get_aggregates(
        &self,
        name: &str,
        t_start: i64,
        t_end: i64,
    ) -> Result<Aggregates, RrdError> {
        match self.raw_series(name)? {
            Some((timestamps, values)) => {
                Ok(Aggregator::new(&timestamps, &values).get_aggregates(t_start, t_end))
            }
            None => {
                let values = self.resolved_values(name)?;
                Ok(Aggregator::new(&self.timestamps, values).get_aggregates(t_start, t_end))
            }
        }
    }

    /// Nearest-rank percentile over a resolved source's pixel series.
    pub fn get_percentile(&self, name: &str, percentile: f64) -> Result<f64, RrdError> {
        let source = self
            .sources
            .get(name)
            .ok_or_else(|| RrdError::UnknownSource(name.into()))?;
        source
            .percentile(percentile)
            .ok_or_else(|| RrdError::DataUnavailable(name.into()))
    }

    /// Nearest-rank percentile over a sub-range, computed on a Def's cached
    /// raw rows (pixel series for other sources).
    pub fn get_window_percentile(
        &self,
        name: &str,
        t_start: i64,
        t_end: i64,
        percentile: f64,
    ) -> Result<f64, RrdError> {
        match self.raw_series(name)? {
            Some((timestamps, values)) => {
                Ok(Aggregator::new(&timestamps, &values).get_percentile(t_start, t_end, percentile))
            }
            None => {
                let values = self.resolved_values(name)?;
                Ok(Aggregator::new(&self.timestamps, values)
                    .get_percentile(t_start, t_end, percentile))
            }
        }
    }

    /// Tabular dump of the pixel grid and every resolved series, for
    /// debugging.
    pub fn dump(&self) -> Result<String, RrdError> {
        let mut series: Vec<(&str, &[f64])> = Vec::with_capacity(self.sources.len());
        for (name, source) in &self.sources {
            let values = source
                .values()
                .ok_or_else(|| RrdError::DataUnavailable(name.clone()))?;
            series.push((name, values));
        }

        let mut out = String::from("timestamp");
        for (name, _) in &series {
            write!(out, " {name:>16}").ok();
        }
        out.push('\n');

        for (i, &timestamp) in self.timestamps.iter().enumerate() {
            write!(out, "{timestamp:9.0}").ok();
            for (_, values) in &series {
                write!(out, " {:>16.4}", values[i]).ok();
            }
            out.push('\n');
        }

        Ok(out)
    }
}
