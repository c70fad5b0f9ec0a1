use crate::table::OffsetModes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound on the number of worker threads, regardless of the hint
pub const MAX_WORKERS: usize = 60;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignSettings {
    pub modes: OffsetModes,
    /// Weight each pairwise comparison by the number of shared precursors
    pub weighted: bool,
    /// Estimate pairwise distances on the rayon thread pool
    pub parallel: bool,
}

impl Default for AlignSettings {
    fn default() -> Self {
        Self {
            modes: OffsetModes::default(),
            weighted: true,
            parallel: true,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchSettings {
    /// Accept a match only if its probability is below this value
    pub match_p_min: f64,
    /// Discard a match when the normalized distance to the nearest feature
    /// exceeds this value
    pub match_d_min: f64,
    /// Runs whose matching group differs from the target group by at most
    /// this much contribute to the reference
    pub group_distance: u32,
    /// Minimum number of source runs required to build a reference
    pub min_group_runs: usize,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            match_p_min: 0.05,
            match_d_min: 3.0,
            group_distance: 0,
            min_group_runs: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub path: PathBuf,
    /// Short name, used to address the run's datasets
    pub name: String,
    pub group: u32,
}

/// The set of runs being aligned and matched together
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub runs: Vec<Run>,
    workers: usize,
}

impl Experiment {
    /// Build an experiment from run paths. Short names are the file stems,
    /// and runs without a group label are assigned to group 0
    pub fn new<P: AsRef<Path>>(paths: &[P], groups: Option<&[u32]>, workers: usize) -> Self {
        let runs = paths
            .iter()
            .enumerate()
            .map(|(idx, path)| {
                let path = path.as_ref();
                Run {
                    path: path.to_path_buf(),
                    name: short_name(path),
                    group: groups.and_then(|g| g.get(idx).copied()).unwrap_or_default(),
                }
            })
            .collect();
        Self {
            runs,
            workers: workers.clamp(1, MAX_WORKERS),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.runs.iter().map(|run| run.name.clone()).collect()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Distinct matching-group labels, ascending
    pub fn groups(&self) -> Vec<u32> {
        let mut groups = self.runs.iter().map(|run| run.group).collect::<Vec<_>>();
        groups.sort_unstable();
        groups.dedup();
        groups
    }
}

/// File name without directories or extensions, e.g. `/data/A.raw.ms_data.hdf` -> `A`
pub fn short_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    match name.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names_and_groups() {
        let exp = Experiment::new(
            &["/data/A.raw.ms_data.hdf", "B.d", "runs/C"],
            Some(&[1, 0]),
            128,
        );
        assert_eq!(exp.names(), vec!["A", "B", "C"]);
        assert_eq!(
            exp.runs.iter().map(|r| r.group).collect::<Vec<_>>(),
            vec![1, 0, 0]
        );
        assert_eq!(exp.groups(), vec![0, 1]);
        assert_eq!(exp.workers(), MAX_WORKERS);
        assert_eq!(Experiment::new::<&str>(&[], None, 0).workers(), 1);
    }

    #[test]
    fn hidden_files() {
        assert_eq!(short_name(Path::new(".hidden")), ".hidden");
    }

    #[test]
    fn defaults() {
        let settings = MatchSettings::default();
        assert_eq!(settings.match_p_min, 0.05);
        assert_eq!(settings.match_d_min, 3.0);
        assert_eq!(settings.min_group_runs, 3);
    }
}
