//! Match-between-runs: transfer identifications from a matching group's
//! reference onto unidentified MS1 features of each member run

use crate::ml::{kdtree::KdTree, probability::match_probability};
use crate::reference::{Reference, ReferenceEntry};
use crate::settings::{Experiment, MatchSettings, Run};
use crate::store::RunStore;
use crate::table::{Dimension, Feature, Identification, Provenance};
use crate::Error;
use fnv::FnvHashSet;
use rayon::prelude::*;
use serde::Serialize;

/// A reference precursor assigned to a feature of the target run
#[derive(Clone, Debug, PartialEq)]
pub struct Match<'a> {
    pub entry: &'a ReferenceEntry,
    /// Index into the run's feature table
    pub feature: usize,
    /// Euclidean distance in normalized coordinates
    pub distance: f64,
    /// Chi-squared CDF of the Mahalanobis distance; lower is better
    pub probability: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MatchSummary {
    /// Number of transferred identifications per matched run
    pub matched: Vec<(String, usize)>,
    /// Matching groups without enough source runs
    pub skipped_groups: Vec<u32>,
}

impl MatchSummary {
    pub fn total(&self) -> usize {
        self.matched.iter().map(|(_, n)| n).sum()
    }
}

/// Runs contributing to the reference of `group`: every run whose group
/// label is within `distance` of it
pub fn source_runs(runs: &[Run], group: u32, distance: u32) -> Vec<&Run> {
    runs.iter()
        .filter(|run| run.group.abs_diff(group) <= distance)
        .collect()
}

/// Runs that receive transferred identifications for `group`
pub fn target_runs(runs: &[Run], group: u32) -> Vec<&Run> {
    runs.iter().filter(|run| run.group == group).collect()
}

/// Find the closest feature for every reference precursor the run did not
/// identify, keeping those at most `match_d_min` away (normalized distance) and
/// with a probability below `match_p_min`.
///
/// Features lacking any reference dimension are not considered.
pub fn find_matches<'a>(
    reference: &'a Reference,
    scale: &[f64],
    identifications: &[Identification],
    features: &[Feature],
    settings: &MatchSettings,
) -> Vec<Match<'a>> {
    let dims = &reference.dimensions;
    let normalize =
        |point: Vec<f64>| -> Vec<f64> { point.iter().zip(scale).map(|(x, s)| x / s).collect() };

    let identified = identifications
        .iter()
        .filter(|id| id.kind == Provenance::MsMs)
        .map(|id| id.precursor.as_str())
        .collect::<FnvHashSet<_>>();

    let (indices, points): (Vec<usize>, Vec<Vec<f64>>) = features
        .iter()
        .enumerate()
        .filter_map(|(idx, feature)| {
            feature
                .coordinates()
                .project(dims)
                .map(|point| (idx, normalize(point)))
        })
        .unzip();
    let tree = KdTree::new(&points, dims.len());

    let mut matches = Vec::new();
    for entry in reference
        .entries
        .iter()
        .filter(|entry| !identified.contains(entry.precursor.as_str()))
    {
        let neighbour = match tree.nearest(&normalize(entry.mean.clone())) {
            Some(n) if n.distance <= settings.match_d_min => n,
            _ => continue,
        };
        let feature = indices[neighbour.index];
        let coords = match features[feature].coordinates().project(dims) {
            Some(coords) => coords,
            None => continue,
        };

        // An undefined probability never passes
        match match_probability(&coords, &entry.mean, &entry.std) {
            Some(p) if p < settings.match_p_min => matches.push(Match {
                entry,
                feature,
                distance: neighbour.distance,
                probability: p,
            }),
            _ => {}
        }
    }
    matches
}

/// Rows of the merged identification table: the run's own MS/MS
/// identifications followed by the transferred ones. Previously transferred
/// rows are replaced.
pub fn merge(
    identifications: Vec<Identification>,
    features: &[Feature],
    matches: &[Match<'_>],
) -> Vec<Identification> {
    let mut merged = identifications
        .into_iter()
        .filter(|id| id.kind == Provenance::MsMs)
        .map(|mut id| {
            id.probability = None;
            id
        })
        .collect::<Vec<_>>();

    merged.extend(matches.iter().map(|m| {
        let feature = &features[m.feature];
        Identification {
            precursor: m.entry.precursor.clone(),
            sequence: m.entry.sequence.clone(),
            naked_sequence: m.entry.naked_sequence.clone(),
            db_idx: m.entry.db_idx,
            charge: m.entry.charge,
            score: m.entry.score,
            decoy: m.entry.decoy,
            target: m.entry.target,
            measured: feature.apex,
            calibrated: feature.calibrated,
            kind: Provenance::Matched,
            probability: Some(m.probability),
            feature_idx: Some(feature.feature_idx),
            intensity: Some(feature.intensity),
        }
    }));
    merged
}

/// Dimensions shared by every source identification and target feature
fn matching_dimensions(
    sources: &[(String, Vec<Identification>)],
    targets: &[(String, Vec<Identification>, Vec<Feature>)],
) -> Vec<Dimension> {
    let mobility = sources
        .iter()
        .flat_map(|(_, ids)| ids.iter().filter(|id| id.kind == Provenance::MsMs))
        .all(|id| id.coordinates().mobility.is_some())
        && targets
            .iter()
            .flat_map(|(_, _, features)| features)
            .all(|f| f.coordinates().mobility.is_some());

    match mobility {
        true => Dimension::ALL.to_vec(),
        false => vec![Dimension::Mz, Dimension::Rt],
    }
}

/// Transfer identifications within every matching group of `experiment`,
/// writing the merged identification tables back to `store`.
///
/// `progress` is called with the completed fraction after each matched run.
pub fn match_runs<S>(
    store: &S,
    experiment: &Experiment,
    settings: &MatchSettings,
    progress: &mut dyn FnMut(f64),
) -> Result<MatchSummary, Error>
where
    S: RunStore + ?Sized,
{
    let mut summary = MatchSummary::default();
    if experiment.len() < settings.min_group_runs {
        log::info!(
            "matching requires at least {} runs, skipping",
            settings.min_group_runs
        );
        return Ok(summary);
    }

    let groups = experiment.groups();
    let n_targets = experiment.len();
    let mut done = 0;

    for group in groups {
        let sources = source_runs(&experiment.runs, group, settings.group_distance);
        let targets = target_runs(&experiment.runs, group);
        if sources.len() < settings.min_group_runs {
            log::warn!(
                "matching group {} has {} source runs, at least {} are required; skipping",
                group,
                sources.len(),
                settings.min_group_runs
            );
            summary.skipped_groups.push(group);
            done += targets.len();
            progress(done as f64 / n_targets as f64);
            continue;
        }
        log::info!(
            "matching group {}: {} source runs, {} target runs",
            group,
            sources.len(),
            targets.len()
        );

        let sources = sources
            .par_iter()
            .map(|run| Ok((run.name.clone(), store.read_identifications(&run.name)?)))
            .collect::<Result<Vec<_>, Error>>()?;
        let targets = targets
            .par_iter()
            .map(|run| {
                Ok((
                    run.name.clone(),
                    store.read_identifications(&run.name)?,
                    store.read_features(&run.name)?,
                ))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let dimensions = matching_dimensions(&sources, &targets);
        let reference = Reference::build(&sources, &dimensions, settings.min_group_runs);
        let scale = match reference.normalization() {
            Some(scale) => scale,
            None => {
                log::warn!(
                    "matching group {}: reference spread is degenerate ({:?}); skipping",
                    group,
                    reference.scale
                );
                summary.skipped_groups.push(group);
                done += targets.len();
                progress(done as f64 / n_targets as f64);
                continue;
            }
        };

        let merged = targets
            .into_par_iter()
            .map(|(name, identifications, features)| {
                let matches =
                    find_matches(&reference, &scale, &identifications, &features, settings);
                let n = matches.len();
                (name, merge(identifications, &features, &matches), n)
            })
            .collect::<Vec<_>>();

        for (name, identifications, n) in merged {
            log::info!("- {}: transferred {} identifications", name, n);
            store.write_identifications(&name, &identifications)?;
            summary.matched.push((name, n));
            done += 1;
            progress(done as f64 / n_targets as f64);
        }
    }

    log::info!(
        "matching finished: {} identifications transferred",
        summary.total()
    );
    Ok(summary)
}
