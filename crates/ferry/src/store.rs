//! Persistence boundary: per-run `peptide_fdr` and `feature_table` datasets

use crate::table::{Dataset, Feature, Identification};
use crate::Error;
use dashmap::DashMap;
use fnv::FnvBuildHasher;

/// Reads and writes the datasets of a run, addressed by its short name.
///
/// Implementations must be safe to read from multiple threads at once;
/// writes for a given run are never issued concurrently.
pub trait RunStore: Sync {
    fn read_identifications(&self, run: &str) -> Result<Vec<Identification>, Error>;

    fn write_identifications(&self, run: &str, rows: &[Identification]) -> Result<(), Error>;

    fn read_features(&self, run: &str) -> Result<Vec<Feature>, Error>;

    fn write_features(&self, run: &str, rows: &[Feature]) -> Result<(), Error>;
}

#[derive(Default)]
struct Datasets {
    identifications: Option<Vec<Identification>>,
    features: Option<Vec<Feature>>,
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    runs: DashMap<String, Datasets, FnvBuildHasher>,
}

impl MemoryStore {
    pub fn insert_identifications(&self, run: &str, rows: Vec<Identification>) {
        self.runs.entry(run.into()).or_default().identifications = Some(rows);
    }

    pub fn insert_features(&self, run: &str, rows: Vec<Feature>) {
        self.runs.entry(run.into()).or_default().features = Some(rows);
    }

    fn missing(&self, run: &str, dataset: Dataset) -> Error {
        match self.runs.contains_key(run) {
            true => Error::MissingDataset {
                run: run.into(),
                dataset,
            },
            false => Error::MissingRun(run.into()),
        }
    }
}

impl RunStore for MemoryStore {
    fn read_identifications(&self, run: &str) -> Result<Vec<Identification>, Error> {
        self.runs
            .get(run)
            .and_then(|d| d.identifications.clone())
            .ok_or_else(|| self.missing(run, Dataset::PeptideFdr))
    }

    fn write_identifications(&self, run: &str, rows: &[Identification]) -> Result<(), Error> {
        self.insert_identifications(run, rows.to_vec());
        Ok(())
    }

    fn read_features(&self, run: &str) -> Result<Vec<Feature>, Error> {
        self.runs
            .get(run)
            .and_then(|d| d.features.clone())
            .ok_or_else(|| self.missing(run, Dataset::FeatureTable))
    }

    fn write_features(&self, run: &str, rows: &[Feature]) -> Result<(), Error> {
        self.insert_features(run, rows.to_vec());
        Ok(())
    }
}
