//! Row types for the two per-run datasets, and per-precursor aggregation

use crate::Error;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Measured quantity that is corrected between runs
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Mz,
    Rt,
    Mobility,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Mz, Dimension::Rt, Dimension::Mobility];

    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Mz => "mz",
            Dimension::Rt => "rt",
            Dimension::Mobility => "mobility",
        }
    }

    pub fn calibrated_name(&self) -> &'static str {
        match self {
            Dimension::Mz => "mz_calib",
            Dimension::Rt => "rt_calib",
            Dimension::Mobility => "mobility_calib",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mz" => Ok(Dimension::Mz),
            "rt" => Ok(Dimension::Rt),
            "mobility" => Ok(Dimension::Mobility),
            _ => Err(Error::UnknownDimension(s.into())),
        }
    }
}

/// How a systematic offset is expressed and removed
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionMode {
    /// Offset is a difference in the measured unit and is subtracted
    Absolute,
    /// Offset is a fraction of the measured value and is applied as `x * (1 - offset)`
    Relative,
}

impl CorrectionMode {
    /// Signed distance between two measurements of the same analyte
    pub fn delta(&self, lhs: f64, rhs: f64) -> f64 {
        match self {
            CorrectionMode::Absolute => lhs - rhs,
            CorrectionMode::Relative => 2.0 * (lhs - rhs) / (lhs + rhs),
        }
    }

    /// Remove `offset` from `value`
    pub fn apply(&self, value: f64, offset: f64) -> f64 {
        match self {
            CorrectionMode::Absolute => value - offset,
            CorrectionMode::Relative => value * (1.0 - offset),
        }
    }
}

impl FromStr for CorrectionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "absolute" => Ok(CorrectionMode::Absolute),
            "relative" => Ok(CorrectionMode::Relative),
            _ => Err(Error::UnsupportedMode(s.into())),
        }
    }
}

/// Correction mode for each calibrated dimension. One mapping is used for
/// every run of an alignment pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>")]
pub struct OffsetModes(BTreeMap<Dimension, CorrectionMode>);

impl OffsetModes {
    pub fn new<I: IntoIterator<Item = (Dimension, CorrectionMode)>>(modes: I) -> Self {
        Self(modes.into_iter().collect())
    }

    /// Parse string pairs, e.g. `[("mz", "relative"), ("rt", "absolute")]`
    pub fn parse<'a, I>(modes: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        modes
            .into_iter()
            .map(|(dim, mode)| Ok((dim.parse()?, mode.parse()?)))
            .collect::<Result<BTreeMap<_, _>, Error>>()
            .map(Self)
    }

    pub fn get(&self, dimension: Dimension) -> Option<CorrectionMode> {
        self.0.get(&dimension).copied()
    }

    /// Dimensions in their canonical order (mz, rt, mobility)
    pub fn dimensions(&self) -> Vec<Dimension> {
        self.0.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, CorrectionMode)> + '_ {
        self.0.iter().map(|(d, m)| (*d, *m))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop a dimension, e.g. when not every run measured ion mobility
    pub fn without(&self, dimension: Dimension) -> Self {
        let mut modes = self.0.clone();
        modes.remove(&dimension);
        Self(modes)
    }
}

impl Default for OffsetModes {
    fn default() -> Self {
        Self::new([
            (Dimension::Mz, CorrectionMode::Relative),
            (Dimension::Rt, CorrectionMode::Absolute),
            (Dimension::Mobility, CorrectionMode::Relative),
        ])
    }
}

impl TryFrom<BTreeMap<String, String>> for OffsetModes {
    type Error = Error;

    fn try_from(value: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        Self::parse(value.iter().map(|(d, m)| (d.as_str(), m.as_str())))
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub mz: f64,
    pub rt: f64,
    pub mobility: Option<f64>,
}

impl Coordinates {
    pub fn get(&self, dimension: Dimension) -> Option<f64> {
        match dimension {
            Dimension::Mz => Some(self.mz),
            Dimension::Rt => Some(self.rt),
            Dimension::Mobility => self.mobility,
        }
    }

    pub fn set(&mut self, dimension: Dimension, value: f64) {
        match dimension {
            Dimension::Mz => self.mz = value,
            Dimension::Rt => self.rt = value,
            Dimension::Mobility => self.mobility = Some(value),
        }
    }

    /// Project onto `dimensions`, in order. Returns `None` if any is unmeasured
    pub fn project(&self, dimensions: &[Dimension]) -> Option<Vec<f64>> {
        dimensions.iter().map(|d| self.get(*d)).collect()
    }
}

/// Column layout a table stores its measurements under.
///
/// Identification tables report precursor-level values (`mz`, `rt`,
/// `mobility`), while feature tables report values at the peak apex
/// (`mz`, `rt_apex`, `mobility_apex`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Schema {
    Precursor,
    Apex,
}

impl Schema {
    pub fn column(&self, dimension: Dimension) -> &'static str {
        match (self, dimension) {
            (_, Dimension::Mz) => "mz",
            (Schema::Precursor, d) => d.name(),
            (Schema::Apex, Dimension::Rt) => "rt_apex",
            (Schema::Apex, Dimension::Mobility) => "mobility_apex",
        }
    }
}

/// A row carrying measured coordinates that can be calibrated
pub trait Measured {
    const SCHEMA: Schema;

    fn measured(&self) -> &Coordinates;

    fn calibrated_mut(&mut self) -> &mut Option<Coordinates>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Identified from an MS/MS spectrum in this run
    MsMs,
    /// Transferred from other runs onto an MS1 feature
    Matched,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::MsMs => "msms",
            Provenance::Matched => "matched",
        }
    }
}

impl FromStr for Provenance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "msms" => Ok(Provenance::MsMs),
            "matched" => Ok(Provenance::Matched),
            _ => Err(Error::Parse(format!("invalid identification type `{}`", s))),
        }
    }
}

/// Row of a run's `peptide_fdr` dataset
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    /// Precursor key (modified sequence + charge), unique across runs
    pub precursor: String,
    pub sequence: String,
    pub naked_sequence: String,
    pub db_idx: usize,
    pub charge: u8,
    pub score: f64,
    pub decoy: bool,
    pub target: bool,
    pub measured: Coordinates,
    pub calibrated: Option<Coordinates>,
    pub kind: Provenance,
    /// Match probability; only defined for transferred identifications
    pub probability: Option<f64>,
    pub feature_idx: Option<usize>,
    pub intensity: Option<f64>,
}

impl Identification {
    /// Calibrated coordinates, or the raw measurement for runs that were
    /// never aligned
    pub fn coordinates(&self) -> &Coordinates {
        self.calibrated.as_ref().unwrap_or(&self.measured)
    }
}

impl Measured for Identification {
    const SCHEMA: Schema = Schema::Precursor;

    fn measured(&self) -> &Coordinates {
        &self.measured
    }

    fn calibrated_mut(&mut self) -> &mut Option<Coordinates> {
        &mut self.calibrated
    }
}

/// Row of a run's `feature_table` dataset: an MS1 feature without identity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub feature_idx: usize,
    pub charge: u8,
    pub apex: Coordinates,
    pub calibrated: Option<Coordinates>,
    pub intensity: f64,
    pub fwhm: Option<f64>,
    pub n_isotopes: Option<u8>,
}

impl Feature {
    pub fn coordinates(&self) -> &Coordinates {
        self.calibrated.as_ref().unwrap_or(&self.apex)
    }
}

impl Measured for Feature {
    const SCHEMA: Schema = Schema::Apex;

    fn measured(&self) -> &Coordinates {
        &self.apex
    }

    fn calibrated_mut(&mut self) -> &mut Option<Coordinates> {
        &mut self.calibrated
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dataset {
    PeptideFdr,
    FeatureTable,
}

impl Dataset {
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::PeptideFdr => "peptide_fdr",
            Dataset::FeatureTable => "feature_table",
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which coordinates of an identification table to aggregate
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Measured,
    Calibrated,
}

/// Mean coordinates of every precursor identified in one run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrecursorTable {
    rows: FnvHashMap<String, Coordinates>,
    mobility: bool,
}

impl PrecursorTable {
    /// Collapse repeated identifications of a precursor into a single mean
    /// measurement. Transferred identifications are ignored.
    pub fn aggregate(identifications: &[Identification], source: Source) -> Self {
        #[derive(Default)]
        struct Acc {
            n: usize,
            mz: f64,
            rt: f64,
            n_mobility: usize,
            mobility: f64,
        }

        let mut acc: FnvHashMap<&str, Acc> = FnvHashMap::default();
        let mut mobility = !identifications.is_empty();
        for id in identifications.iter().filter(|id| id.kind == Provenance::MsMs) {
            let coords = match source {
                Source::Measured => &id.measured,
                Source::Calibrated => id.coordinates(),
            };
            let entry = acc.entry(id.precursor.as_str()).or_default();
            entry.n += 1;
            entry.mz += coords.mz;
            entry.rt += coords.rt;
            match coords.mobility {
                Some(im) => {
                    entry.n_mobility += 1;
                    entry.mobility += im;
                }
                None => mobility = false,
            }
        }

        let rows = acc
            .into_iter()
            .map(|(key, acc)| {
                let n = acc.n as f64;
                let coords = Coordinates {
                    mz: acc.mz / n,
                    rt: acc.rt / n,
                    mobility: (acc.n_mobility > 0).then(|| acc.mobility / acc.n_mobility as f64),
                };
                (key.to_string(), coords)
            })
            .collect();

        Self { rows, mobility }
    }

    pub fn get(&self, precursor: &str) -> Option<&Coordinates> {
        self.rows.get(precursor)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Did every aggregated row carry an ion mobility measurement?
    pub fn has_mobility(&self) -> bool {
        self.mobility
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Coordinates)> {
        self.rows.iter().map(|(k, v)| (k.as_str(), v))
    }
}
