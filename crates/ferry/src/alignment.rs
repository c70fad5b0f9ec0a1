//! Global alignment: solve one offset per run and dimension that is
//! consistent with every pairwise comparison

use crate::calibration::{calibrate, RunOffsets};
use crate::distance::{pairwise, DistanceCache, OffsetMatrix};
use crate::ml::{matrix::Matrix, regression::LeastSquares};
use crate::settings::AlignSettings;
use crate::store::RunStore;
use crate::table::{Dimension, Source};
use crate::Error;
use rayon::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Alignment {
    pub runs: Vec<String>,
    pub dimensions: Vec<Dimension>,
    /// Offsets, one row per run and one column per dimension. Each column
    /// sums to zero
    pub offsets: Vec<Vec<f64>>,
    /// Coefficient of determination of the regression, if one was fit
    pub r2: Option<f64>,
    /// Number of pairwise comparisons with a defined offset
    pub comparisons: usize,
}

impl Alignment {
    pub fn run_offsets(&self, run: usize) -> RunOffsets {
        RunOffsets {
            offsets: self
                .dimensions
                .iter()
                .copied()
                .zip(self.offsets[run].iter().copied())
                .collect(),
        }
    }

    pub fn get(&self, run: &str) -> Option<RunOffsets> {
        self.runs
            .iter()
            .position(|r| r == run)
            .map(|idx| self.run_offsets(idx))
    }
}

/// Cumulative-difference design matrix: the row for a comparison `(a, b)`,
/// `a < b`, has ones in columns `a..b`. The offset of `a` relative to `b`
/// is then the sum of the per-step offsets between consecutive runs.
pub fn design_matrix(pairs: &[(usize, usize)], n_runs: usize) -> Matrix {
    let cols = n_runs.saturating_sub(1);
    let mut x = Matrix::zeros(pairs.len(), cols);
    for (row, &(a, b)) in pairs.iter().enumerate() {
        assert!(a < b && b < n_runs, "invalid comparison ({}, {})", a, b);
        for col in a..b {
            x[(row, col)] = 1.0;
        }
    }
    x
}

/// Solve the per-run offsets for `n_runs` runs from pairwise comparisons
pub fn solve(matrix: &OffsetMatrix, runs: &[String], weighted: bool) -> Alignment {
    let n_runs = runs.len();
    let n_dims = matrix.dimensions.len();

    // Comparisons without a defined offset in every dimension carry no
    // information about the system
    let valid = (0..matrix.pairs.len())
        .filter(|&i| matrix.distances[i].is_defined())
        .collect::<Vec<_>>();

    let pairs = valid.iter().map(|&i| matrix.pairs[i]).collect::<Vec<_>>();
    let y = valid
        .iter()
        .flat_map(|&i| matrix.distances[i].offsets.iter().flatten().copied())
        .collect::<Vec<_>>();
    let weights = valid
        .iter()
        .map(|&i| matrix.distances[i].shared as f64)
        .collect::<Vec<_>>();

    let unknowns = n_runs.saturating_sub(1);
    if valid.len() < unknowns {
        log::warn!(
            "alignment is under-determined: {} valid comparisons for {} unknowns",
            valid.len(),
            unknowns
        );
    }

    let mut offsets = vec![vec![0.0; n_dims]; n_runs];
    let mut r2 = None;

    let x = design_matrix(&pairs, n_runs);
    let y = Matrix::new(y, valid.len(), n_dims);
    let fit = match n_dims > 0 {
        true => LeastSquares::fit(&x, &y, weighted.then(|| weights.as_slice())),
        false => None,
    };

    match fit {
        Some(model) => {
            let score = model.score(&x, &y);
            log::info!(
                "alignment regression: R² = {:.4} over {} comparisons",
                score,
                valid.len()
            );
            r2 = Some(score);

            // Evaluate at unit basis vectors to recover the step between each
            // pair of consecutive runs
            let steps = model.predict(&Matrix::identity(unknowns));
            for run in 1..n_runs {
                for dim in 0..n_dims {
                    offsets[run][dim] = offsets[run - 1][dim] - steps[(run - 1, dim)];
                }
            }

            for dim in 0..n_dims {
                let mean = offsets.iter().map(|o| o[dim]).sum::<f64>() / n_runs as f64;
                offsets.iter_mut().for_each(|o| o[dim] -= mean);
            }
        }
        None if n_runs > 1 => {
            log::warn!("no usable comparisons between runs, offsets are set to zero");
        }
        None => {}
    }

    Alignment {
        runs: runs.to_vec(),
        dimensions: matrix.dimensions.clone(),
        offsets,
        r2,
        comparisons: valid.len(),
    }
}

/// Estimate offsets between `runs`, then write calibrated coordinates into
/// both datasets of every run.
///
/// Returns `None` without touching the store when there are fewer than two
/// runs.
pub fn align<S>(
    store: &S,
    runs: &[String],
    settings: &AlignSettings,
    progress: &mut dyn FnMut(f64),
) -> Result<Option<Alignment>, Error>
where
    S: RunStore + ?Sized,
{
    if runs.len() < 2 {
        log::info!("alignment requires at least two runs, skipping");
        return Ok(None);
    }
    log::info!("aligning {} runs", runs.len());

    let cache = DistanceCache::new(Source::Measured);
    let mut mobility = true;
    for run in runs {
        mobility &= cache.get_or_load(store, run)?.has_mobility();
    }

    let mut modes = settings.modes.clone();
    if !mobility && modes.get(Dimension::Mobility).is_some() {
        log::info!("ion mobility is not measured in every run, calibrating mz and rt only");
        modes = modes.without(Dimension::Mobility);
    }

    let matrix = pairwise(store, runs, &modes, &cache, settings.parallel, progress)?;
    let alignment = solve(&matrix, runs, settings.weighted);

    // Nothing is written until every run has been read and calibrated, so a
    // missing dataset leaves the store untouched
    let calibrated = runs
        .par_iter()
        .enumerate()
        .map(|(idx, run)| {
            let offsets = alignment.run_offsets(idx);
            let mut identifications = store.read_identifications(run)?;
            calibrate(&mut identifications, &offsets, &modes);
            let mut features = store.read_features(run)?;
            calibrate(&mut features, &offsets, &modes);
            Ok((identifications, features))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    for (idx, (run, (identifications, features))) in runs.iter().zip(calibrated).enumerate() {
        log::info!("- {}: {:?}", run, alignment.run_offsets(idx).offsets);
        store.write_identifications(run, &identifications)?;
        store.write_features(run, &features)?;
    }

    Ok(Some(alignment))
}
