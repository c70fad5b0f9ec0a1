//! Per-precursor reference distribution pooled across the runs of a
//! matching group

use crate::ml::{mean, median, std};
use crate::table::{Dimension, Identification, Provenance};
use fnv::{FnvHashMap, FnvHashSet};

#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceEntry {
    pub precursor: String,
    pub sequence: String,
    pub naked_sequence: String,
    pub db_idx: usize,
    pub charge: u8,
    pub score: f64,
    pub decoy: bool,
    pub target: bool,
    /// Mean calibrated coordinate, per reference dimension
    pub mean: Vec<f64>,
    /// Sample standard deviation per reference dimension, NaN if undefined
    pub std: Vec<f64>,
    /// Number of distinct runs the precursor was identified in
    pub n_runs: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reference {
    pub dimensions: Vec<Dimension>,
    pub entries: Vec<ReferenceEntry>,
    /// Median standard deviation of each dimension across precursors, used to
    /// put dimensions on a comparable scale
    pub scale: Vec<Option<f64>>,
}

/// Mean of 0/1 flags, mapped back to `true` only if every flag was set
fn all_set(flags: &[bool]) -> bool {
    let ones = flags.iter().map(|&f| f as u8 as f64).collect::<Vec<_>>();
    mean(&ones) == 1.0
}

impl Reference {
    /// Pool the MS/MS identifications of `runs` and summarise every
    /// precursor seen in at least `min_runs` distinct runs.
    ///
    /// Non-numeric metadata is taken from the first identification of the
    /// precursor, in run order.
    pub fn build(
        runs: &[(String, Vec<Identification>)],
        dimensions: &[Dimension],
        min_runs: usize,
    ) -> Self {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: FnvHashMap<&str, Vec<(usize, &Identification)>> = FnvHashMap::default();
        for (run_idx, (_, identifications)) in runs.iter().enumerate() {
            for id in identifications.iter().filter(|id| id.kind == Provenance::MsMs) {
                let group = groups.entry(id.precursor.as_str()).or_insert_with(|| {
                    order.push(id.precursor.as_str());
                    Vec::new()
                });
                group.push((run_idx, id));
            }
        }

        let entries = order
            .into_iter()
            .filter_map(|key| {
                let rows = &groups[key];
                let n_runs = rows
                    .iter()
                    .map(|(run, _)| *run)
                    .collect::<FnvHashSet<_>>()
                    .len();
                if n_runs < min_runs {
                    return None;
                }

                let coords = rows
                    .iter()
                    .filter_map(|(_, id)| id.coordinates().project(dimensions))
                    .collect::<Vec<_>>();
                if coords.is_empty() {
                    return None;
                }
                let (mu, sigma): (Vec<f64>, Vec<f64>) = (0..dimensions.len())
                    .map(|d| {
                        let values = coords.iter().map(|c| c[d]).collect::<Vec<_>>();
                        (mean(&values), std(&values).unwrap_or(f64::NAN))
                    })
                    .unzip();

                let scores = rows.iter().map(|(_, id)| id.score).collect::<Vec<_>>();
                let decoy = rows.iter().map(|(_, id)| id.decoy).collect::<Vec<_>>();
                let target = rows.iter().map(|(_, id)| id.target).collect::<Vec<_>>();
                let first = rows[0].1;

                Some(ReferenceEntry {
                    precursor: key.to_string(),
                    sequence: first.sequence.clone(),
                    naked_sequence: first.naked_sequence.clone(),
                    db_idx: first.db_idx,
                    charge: first.charge,
                    score: mean(&scores),
                    decoy: all_set(&decoy),
                    target: all_set(&target),
                    mean: mu,
                    std: sigma,
                    n_runs,
                })
            })
            .collect::<Vec<_>>();

        let scale = (0..dimensions.len())
            .map(|d| median(entries.iter().map(|e| e.std[d])))
            .collect();

        log::debug!(
            "reference: {} precursors from {} runs, scale {:?}",
            entries.len(),
            runs.len(),
            scale
        );

        Reference {
            dimensions: dimensions.to_vec(),
            entries,
            scale,
        }
    }

    /// Normalization scale, if every dimension has a strictly positive one
    pub fn normalization(&self) -> Option<Vec<f64>> {
        self.scale
            .iter()
            .map(|s| s.filter(|s| *s > 0.0))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::table::test::identification;

    const DIMS: [Dimension; 2] = [Dimension::Mz, Dimension::Rt];

    #[test]
    fn pooled_statistics() {
        let a = vec![
            identification("PEPTIDEK2", 500.0, 10.0, None),
            identification("LESLIEK2", 600.0, 20.0, None),
        ];
        let b = vec![
            identification("PEPTIDEK2", 500.002, 11.0, None),
            identification("LESLIEK2", 600.0, 22.0, None),
        ];
        let c = vec![identification("PEPTIDEK2", 500.004, 12.0, None)];
        let runs = vec![("a".to_string(), a), ("b".to_string(), b), ("c".to_string(), c)];

        let reference = Reference::build(&runs, &DIMS, 3);
        assert_eq!(reference.len(), 1);
        let entry = &reference.entries[0];
        assert_eq!(entry.precursor, "PEPTIDEK2");
        assert_eq!(entry.n_runs, 3);
        assert!((entry.mean[0] - 500.002).abs() < 1E-9);
        assert!((entry.mean[1] - 11.0).abs() < 1E-12);
        assert!((entry.std[1] - 1.0).abs() < 1E-12);
        assert_eq!(reference.scale[1], Some(1.0));

        // Two runs are enough when asked
        let reference = Reference::build(&runs, &DIMS, 2);
        assert_eq!(reference.len(), 2);
        assert_eq!(reference.entries[1].precursor, "LESLIEK2");
    }

    #[test]
    fn repeated_identifications_in_one_run() {
        let runs = vec![(
            "a".to_string(),
            vec![
                identification("PEPTIDEK2", 500.0, 10.0, None),
                identification("PEPTIDEK2", 500.0, 10.5, None),
                identification("PEPTIDEK2", 500.0, 11.0, None),
            ],
        )];
        assert!(Reference::build(&runs, &DIMS, 3).is_empty());
    }

    #[test]
    fn flags_require_unanimity() {
        let mut ids = (0..3)
            .map(|i| identification("PEPTIDEK2", 500.0, 10.0 + i as f64, None))
            .collect::<Vec<_>>();
        ids[2].decoy = true;
        ids[0].score = 20.0;
        let runs = ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| (format!("run{}", i), vec![id]))
            .collect::<Vec<_>>();

        let entry = &Reference::build(&runs, &DIMS, 3).entries[0];
        assert!(!entry.decoy);
        assert!(entry.target);
        assert!((entry.score - 40.0 / 3.0).abs() < 1E-12);
    }

    #[test]
    fn degenerate_scale() {
        let runs = (0..3)
            .map(|i| {
                (
                    format!("run{}", i),
                    vec![identification("PEPTIDEK2", 500.0, 10.0 + i as f64, None)],
                )
            })
            .collect::<Vec<_>>();
        let reference = Reference::build(&runs, &DIMS, 3);
        assert_eq!(reference.scale[0], Some(0.0));
        assert_eq!(reference.normalization(), None);
    }

    #[test]
    fn matched_rows_are_ignored() {
        let runs = (0..3)
            .map(|i| {
                let mut id = identification("PEPTIDEK2", 500.0, 10.0 + i as f64, None);
                if i == 2 {
                    id.kind = Provenance::Matched;
                }
                (format!("run{}", i), vec![id])
            })
            .collect::<Vec<_>>();
        assert!(Reference::build(&runs, &DIMS, 3).is_empty());
    }
}
