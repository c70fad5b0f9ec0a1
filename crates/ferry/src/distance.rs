//! Pairwise systematic offsets between runs, estimated on shared precursors

use crate::ml::median;
use crate::store::RunStore;
use crate::table::{Dimension, OffsetModes, PrecursorTable, Source};
use crate::Error;
use dashmap::DashMap;
use fnv::FnvBuildHasher;
use rayon::prelude::*;
use std::sync::{mpsc, Arc};

/// Offset of one run relative to another
#[derive(Clone, Debug, PartialEq)]
pub struct Distance {
    /// Median paired difference for each dimension, in [`OffsetModes`] order.
    /// `None` when no shared precursor has a finite difference
    pub offsets: Vec<Option<f64>>,
    /// Number of precursors identified in both runs
    pub shared: usize,
}

impl Distance {
    pub fn is_defined(&self) -> bool {
        self.offsets.iter().all(Option::is_some)
    }
}

/// Estimate the offset of `lhs` relative to `rhs` on the precursors both
/// identified. Precursors seen in only one table are excluded.
pub fn distance(lhs: &PrecursorTable, rhs: &PrecursorTable, modes: &OffsetModes) -> Distance {
    let shared = lhs
        .iter()
        .filter_map(|(key, l)| rhs.get(key).map(|r| (l, r)))
        .collect::<Vec<_>>();

    let offsets = modes
        .iter()
        .map(|(dim, mode)| {
            median(shared.iter().filter_map(|(l, r)| {
                let (l, r) = (l.get(dim)?, r.get(dim)?);
                Some(mode.delta(l, r))
            }))
        })
        .collect();

    Distance {
        offsets,
        shared: shared.len(),
    }
}

/// Aggregated precursor tables, loaded at most once per run for the
/// lifetime of the cache. Create one per alignment pass.
pub struct DistanceCache {
    source: Source,
    tables: DashMap<String, Arc<PrecursorTable>, FnvBuildHasher>,
}

impl DistanceCache {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            tables: DashMap::default(),
        }
    }

    pub fn get_or_load<S>(&self, store: &S, run: &str) -> Result<Arc<PrecursorTable>, Error>
    where
        S: RunStore + ?Sized,
    {
        if let Some(table) = self.tables.get(run) {
            log::trace!("- {}: cached precursor table", run);
            return Ok(Arc::clone(table.value()));
        }
        let identifications = store.read_identifications(run)?;
        let table = Arc::new(PrecursorTable::aggregate(
            &identifications,
            self.source,
        ));
        log::trace!("- {}: aggregated {} precursors", run, table.len());
        Ok(Arc::clone(
            self.tables
                .entry(run.to_string())
                .or_insert(table)
                .value(),
        ))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Offsets for every unordered pair of runs
#[derive(Clone, Debug)]
pub struct OffsetMatrix {
    pub dimensions: Vec<Dimension>,
    /// Indices into the run list, `pairs[i].0 < pairs[i].1`
    pub pairs: Vec<(usize, usize)>,
    pub distances: Vec<Distance>,
}

impl OffsetMatrix {
    /// Number of shared precursors for each pair
    pub fn weights(&self) -> Vec<f64> {
        self.distances.iter().map(|d| d.shared as f64).collect()
    }
}

/// All combinations `(i, j)` with `i < j < n`, in lexicographic order
pub fn combinations(n: usize) -> Vec<(usize, usize)> {
    (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .collect()
}

/// Estimate offsets between every pair of `runs`.
///
/// When `parallel` is set, pairs are evaluated on the rayon thread pool.
/// Results are collected in pair order either way, and `progress` is called
/// on the calling thread with the completed fraction as each pair finishes.
pub fn pairwise<S>(
    store: &S,
    runs: &[String],
    modes: &OffsetModes,
    cache: &DistanceCache,
    parallel: bool,
    progress: &mut dyn FnMut(f64),
) -> Result<OffsetMatrix, Error>
where
    S: RunStore + Sync + ?Sized,
{
    let pairs = combinations(runs.len());
    let n_pairs = pairs.len();

    let compute = |&(i, j): &(usize, usize)| -> Result<Distance, Error> {
        let lhs = cache.get_or_load(store, &runs[i])?;
        let rhs = cache.get_or_load(store, &runs[j])?;
        let d = distance(&lhs, &rhs, modes);
        log::trace!(
            "- {} vs {}: {:?} on {} shared precursors",
            runs[i],
            runs[j],
            d.offsets,
            d.shared
        );
        Ok(d)
    };

    let distances = if parallel {
        // Workers signal each finished pair; the calling thread reports them
        let (tx, rx) = mpsc::channel();
        let (tasks, compute) = (&pairs, &compute);
        std::thread::scope(|scope| {
            let worker = scope.spawn(move || {
                tasks
                    .par_iter()
                    .map_with(tx, |tx, pair| {
                        let d = compute(pair);
                        let _ = tx.send(());
                        d
                    })
                    .collect::<Result<Vec<_>, Error>>()
            });
            for (done, _) in rx.iter().enumerate() {
                progress((done + 1) as f64 / n_pairs as f64);
            }
            worker
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        })?
    } else {
        let mut distances = Vec::with_capacity(n_pairs);
        for (done, pair) in pairs.iter().enumerate() {
            distances.push(compute(pair)?);
            progress((done + 1) as f64 / n_pairs as f64);
        }
        distances
    };

    Ok(OffsetMatrix {
        dimensions: modes.dimensions(),
        pairs,
        distances,
    })
}
