use crate::Runner;
use csv::{ByteRecord, StringRecord};
use ferry_core::alignment::Alignment;
use ferry_core::store::RunStore;
use ferry_core::table::{
    Coordinates, Dataset, Dimension, Feature, Identification, Measured, Provenance, Schema,
};
use ferry_core::Error;
use fnv::FnvHashMap;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Tab-separated datasets in a single directory: `<run>.peptide_fdr.tsv`
/// and `<run>.feature_table.tsv`
pub struct TsvStore {
    directory: PathBuf,
    modification: Regex,
}

/// Header lookup for a single table
struct Columns<'a> {
    path: &'a Path,
    index: FnvHashMap<String, usize>,
}

impl<'a> Columns<'a> {
    fn new(path: &'a Path, headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.to_string(), idx))
            .collect();
        Self { path, index }
    }

    fn raw<'r>(&self, record: &'r StringRecord, column: &str) -> Option<&'r str> {
        self.index
            .get(column)
            .and_then(|&idx| record.get(idx))
            .filter(|s| !s.is_empty())
    }

    fn optional<T: FromStr>(&self, record: &StringRecord, column: &str) -> Result<Option<T>, Error> {
        self.raw(record, column)
            .map(|s| {
                s.parse::<T>().map_err(|_| {
                    Error::Parse(format!(
                        "{}: invalid value `{}` in column `{}`",
                        self.path.display(),
                        s,
                        column
                    ))
                })
            })
            .transpose()
    }

    fn required<T: FromStr>(&self, record: &StringRecord, column: &str) -> Result<T, Error> {
        self.optional(record, column)?.ok_or_else(|| {
            Error::Parse(format!(
                "{}: missing value in required column `{}`",
                self.path.display(),
                column
            ))
        })
    }

    fn flag(&self, record: &StringRecord, column: &str) -> Result<Option<bool>, Error> {
        match self.raw(record, column) {
            None => Ok(None),
            Some("1") | Some("true") | Some("True") | Some("TRUE") => Ok(Some(true)),
            Some("0") | Some("false") | Some("False") | Some("FALSE") => Ok(Some(false)),
            Some(s) => Err(Error::Parse(format!(
                "{}: invalid boolean `{}` in column `{}`",
                self.path.display(),
                s,
                column
            ))),
        }
    }

    fn measured(&self, record: &StringRecord, schema: Schema) -> Result<Coordinates, Error> {
        Ok(Coordinates {
            mz: self.required(record, schema.column(Dimension::Mz))?,
            rt: self.required(record, schema.column(Dimension::Rt))?,
            mobility: self.optional(record, schema.column(Dimension::Mobility))?,
        })
    }

    /// Calibrated coordinates, if the table was calibrated before
    fn calibrated(&self, record: &StringRecord, measured: &Coordinates) -> Result<Option<Coordinates>, Error> {
        let mut calibrated = *measured;
        let mut any = false;
        for dim in Dimension::ALL {
            if let Some(value) = self.optional::<f64>(record, dim.calibrated_name())? {
                calibrated.set(dim, value);
                any = true;
            }
        }
        Ok(any.then(|| calibrated))
    }
}

fn push_float(record: &mut ByteRecord, value: f64) {
    record.push_field(ryu::Buffer::new().format(value).as_bytes());
}

fn push_optional_float(record: &mut ByteRecord, value: Option<f64>) {
    match value {
        Some(value) => push_float(record, value),
        None => record.push_field(b""),
    }
}

fn push_bool(record: &mut ByteRecord, value: bool) {
    record.push_field(if value { "true" } else { "false" }.as_bytes());
}

fn coordinate_headers(schema: Schema) -> Vec<&'static str> {
    Dimension::ALL
        .iter()
        .map(|d| schema.column(*d))
        .chain(Dimension::ALL.iter().map(|d| d.calibrated_name()))
        .collect()
}

fn push_coordinates<T: Measured>(record: &mut ByteRecord, row: &T, calibrated: Option<&Coordinates>) {
    let measured = row.measured();
    push_float(record, measured.mz);
    push_float(record, measured.rt);
    push_optional_float(record, measured.mobility);
    push_optional_float(record, calibrated.map(|c| c.mz));
    push_optional_float(record, calibrated.map(|c| c.rt));
    push_optional_float(record, calibrated.and_then(|c| c.mobility));
}

impl TsvStore {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
            // Modifications are written as lowercase tags, e.g. `oxM`, `pS`
            modification: Regex::new("[a-z0-9]+").expect("valid regex"),
        }
    }

    pub fn path(&self, run: &str, dataset: Dataset) -> PathBuf {
        self.directory.join(format!("{}.{}.tsv", run, dataset))
    }

    /// Sequence without modification tags
    pub fn naked_sequence(&self, sequence: &str) -> String {
        self.modification.replace_all(sequence, "").into_owned()
    }

    fn reader(&self, run: &str, dataset: Dataset) -> Result<csv::Reader<std::fs::File>, Error> {
        let path = self.path(run, dataset);
        if !path.exists() {
            let other = match dataset {
                Dataset::PeptideFdr => Dataset::FeatureTable,
                Dataset::FeatureTable => Dataset::PeptideFdr,
            };
            return Err(match self.path(run, other).exists() {
                true => Error::MissingDataset {
                    run: run.into(),
                    dataset,
                },
                false => Error::MissingRun(run.into()),
            });
        }
        log::trace!("reading {}", path.display());
        csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(&path)
            .map_err(csv_error)
    }

    fn write(&self, run: &str, dataset: Dataset, headers: &[&str], records: Vec<ByteRecord>) -> Result<(), Error> {
        let path = self.path(run, dataset);
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        wtr.write_byte_record(&ByteRecord::from(headers.to_vec()))
            .map_err(csv_error)?;
        for record in records {
            wtr.write_byte_record(&record).map_err(csv_error)?;
        }
        wtr.flush()?;
        let bytes = wtr
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        std::fs::write(&path, bytes)?;
        log::trace!("wrote {}", path.display());
        Ok(())
    }

    fn identification_headers() -> Vec<&'static str> {
        let mut headers = vec![
            "precursor",
            "sequence",
            "naked_sequence",
            "db_idx",
            "charge",
            "score",
            "decoy",
            "target",
        ];
        headers.extend(coordinate_headers(Schema::Precursor));
        headers.extend(["type", "probability", "feature_idx", "intensity"]);
        headers
    }

    pub fn serialize_identification(&self, id: &Identification) -> ByteRecord {
        let mut record = ByteRecord::new();
        record.push_field(id.precursor.as_bytes());
        record.push_field(id.sequence.as_bytes());
        record.push_field(id.naked_sequence.as_bytes());
        record.push_field(itoa::Buffer::new().format(id.db_idx).as_bytes());
        record.push_field(itoa::Buffer::new().format(id.charge).as_bytes());
        push_float(&mut record, id.score);
        push_bool(&mut record, id.decoy);
        push_bool(&mut record, id.target);
        push_coordinates(&mut record, id, id.calibrated.as_ref());
        record.push_field(id.kind.as_str().as_bytes());
        push_optional_float(&mut record, id.probability);
        match id.feature_idx {
            Some(idx) => record.push_field(itoa::Buffer::new().format(idx).as_bytes()),
            None => record.push_field(b""),
        }
        push_optional_float(&mut record, id.intensity);
        record
    }

    fn deserialize_identification(&self, columns: &Columns, record: &StringRecord) -> Result<Identification, Error> {
        let sequence: String = columns.required(record, "sequence")?;
        let charge: u8 = columns.required(record, "charge")?;
        let precursor = columns
            .optional(record, "precursor")?
            .unwrap_or_else(|| format!("{}{}", sequence, charge));
        let naked_sequence = columns
            .optional(record, "naked_sequence")?
            .unwrap_or_else(|| self.naked_sequence(&sequence));
        let decoy = columns.flag(record, "decoy")?.unwrap_or(false);
        let measured = columns.measured(record, Schema::Precursor)?;

        Ok(Identification {
            precursor,
            naked_sequence,
            sequence,
            db_idx: columns.optional(record, "db_idx")?.unwrap_or_default(),
            charge,
            score: columns.optional(record, "score")?.unwrap_or_default(),
            decoy,
            target: columns.flag(record, "target")?.unwrap_or(!decoy),
            calibrated: columns.calibrated(record, &measured)?,
            measured,
            kind: columns
                .optional(record, "type")?
                .unwrap_or(Provenance::MsMs),
            probability: columns.optional(record, "probability")?,
            feature_idx: columns.optional(record, "feature_idx")?,
            intensity: columns.optional(record, "intensity")?,
        })
    }

    fn feature_headers() -> Vec<&'static str> {
        let mut headers = vec!["feature_idx", "charge"];
        headers.extend(coordinate_headers(Schema::Apex));
        headers.extend(["intensity", "fwhm", "n_isotopes"]);
        headers
    }

    pub fn serialize_feature(&self, feature: &Feature) -> ByteRecord {
        let mut record = ByteRecord::new();
        record.push_field(itoa::Buffer::new().format(feature.feature_idx).as_bytes());
        record.push_field(itoa::Buffer::new().format(feature.charge).as_bytes());
        push_coordinates(&mut record, feature, feature.calibrated.as_ref());
        push_float(&mut record, feature.intensity);
        push_optional_float(&mut record, feature.fwhm);
        match feature.n_isotopes {
            Some(n) => record.push_field(itoa::Buffer::new().format(n).as_bytes()),
            None => record.push_field(b""),
        }
        record
    }

    fn deserialize_feature(&self, columns: &Columns, record: &StringRecord) -> Result<Feature, Error> {
        let apex = columns.measured(record, Schema::Apex)?;
        Ok(Feature {
            feature_idx: columns.required(record, "feature_idx")?,
            charge: columns.optional(record, "charge")?.unwrap_or_default(),
            calibrated: columns.calibrated(record, &apex)?,
            apex,
            intensity: columns.optional(record, "intensity")?.unwrap_or_default(),
            fwhm: columns.optional(record, "fwhm")?,
            n_isotopes: columns.optional(record, "n_isotopes")?,
        })
    }
}

fn csv_error(e: csv::Error) -> Error {
    match e.into_kind() {
        csv::ErrorKind::Io(e) => Error::Io(e),
        kind => Error::Parse(format!("{:?}", kind)),
    }
}

impl RunStore for TsvStore {
    fn read_identifications(&self, run: &str) -> Result<Vec<Identification>, Error> {
        let path = self.path(run, Dataset::PeptideFdr);
        let mut rdr = self.reader(run, Dataset::PeptideFdr)?;
        let headers = rdr.headers().map_err(csv_error)?.clone();
        let columns = Columns::new(&path, &headers);
        rdr.records()
            .map(|record| {
                let record = record.map_err(csv_error)?;
                self.deserialize_identification(&columns, &record)
            })
            .collect()
    }

    fn write_identifications(&self, run: &str, rows: &[Identification]) -> Result<(), Error> {
        let records = rows
            .iter()
            .map(|id| self.serialize_identification(id))
            .collect();
        self.write(run, Dataset::PeptideFdr, &Self::identification_headers(), records)
    }

    fn read_features(&self, run: &str) -> Result<Vec<Feature>, Error> {
        let path = self.path(run, Dataset::FeatureTable);
        let mut rdr = self.reader(run, Dataset::FeatureTable)?;
        let headers = rdr.headers().map_err(csv_error)?.clone();
        let columns = Columns::new(&path, &headers);
        rdr.records()
            .map(|record| {
                let record = record.map_err(csv_error)?;
                self.deserialize_feature(&columns, &record)
            })
            .collect()
    }

    fn write_features(&self, run: &str, rows: &[Feature]) -> Result<(), Error> {
        let records = rows.iter().map(|f| self.serialize_feature(f)).collect();
        self.write(run, Dataset::FeatureTable, &Self::feature_headers(), records)
    }
}

impl Runner {
    pub fn serialize_alignment(&self, alignment: &Alignment, run: usize) -> ByteRecord {
        let mut record = ByteRecord::new();
        record.push_field(alignment.runs[run].as_bytes());
        for offset in &alignment.offsets[run] {
            push_float(&mut record, *offset);
        }
        record
    }

    pub fn write_alignment(&self, alignment: &Alignment) -> anyhow::Result<String> {
        let path = self.make_path("alignment.tsv");

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let mut headers = ByteRecord::from(vec!["run"]);
        for dim in &alignment.dimensions {
            headers.push_field(format!("{}_offset", dim).as_bytes());
        }
        wtr.write_byte_record(&headers)?;
        for run in 0..alignment.runs.len() {
            wtr.write_byte_record(&self.serialize_alignment(alignment, run))?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ferry-output-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn naked_sequence() {
        let store = TsvStore::new(".");
        assert_eq!(store.naked_sequence("aAoxMPEPpSTIDEK"), "AMPEPSTIDEK");
        assert_eq!(store.naked_sequence("PEPTIDE"), "PEPTIDE");
    }

    #[test]
    fn identification_round_trip() {
        let dir = scratch("ids");
        let store = TsvStore::new(&dir);
        let id = Identification {
            precursor: "PEPoxMTIDEK2".into(),
            sequence: "PEPoxMTIDEK".into(),
            naked_sequence: "PEPMTIDEK".into(),
            db_idx: 12,
            charge: 2,
            score: 0.75,
            decoy: false,
            target: true,
            measured: Coordinates {
                mz: 512.2561,
                rt: 31.25,
                mobility: None,
            },
            calibrated: Some(Coordinates {
                mz: 512.2556,
                rt: 30.5,
                mobility: None,
            }),
            kind: Provenance::Matched,
            probability: Some(0.0125),
            feature_idx: Some(4),
            intensity: Some(1.5e7),
        };
        store.write_identifications("a", &[id.clone()]).unwrap();
        assert_eq!(store.read_identifications("a").unwrap(), vec![id]);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn minimal_tables() {
        let dir = scratch("minimal");
        std::fs::write(
            dir.join("a.peptide_fdr.tsv"),
            "sequence\tcharge\tmz\trt\tdecoy\nPEPoxMTIDEK\t2\t500.5\t12.0\tFalse\n",
        )
        .unwrap();
        let store = TsvStore::new(&dir);

        let ids = store.read_identifications("a").unwrap();
        assert_eq!(ids[0].precursor, "PEPoxMTIDEK2");
        assert_eq!(ids[0].naked_sequence, "PEPMTIDEK");
        assert_eq!(ids[0].kind, Provenance::MsMs);
        assert!(ids[0].target && !ids[0].decoy);
        assert_eq!(ids[0].calibrated, None);

        assert!(matches!(
            store.read_features("a"),
            Err(Error::MissingDataset {
                dataset: Dataset::FeatureTable,
                ..
            })
        ));
        assert!(matches!(store.read_features("b"), Err(Error::MissingRun(_))));

        std::fs::write(
            dir.join("a.feature_table.tsv"),
            "feature_idx\tmz\trt_apex\tmobility_apex\tintensity\n0\t500.5\t12.0\t0.9\t1000\n",
        )
        .unwrap();
        let features = store.read_features("a").unwrap();
        assert_eq!(features[0].apex.mobility, Some(0.9));
        assert_eq!(features[0].fwhm, None);

        std::fs::write(
            dir.join("a.feature_table.tsv"),
            "feature_idx\tmz\trt\n0\t500.5\t12.0\n",
        )
        .unwrap();
        assert!(matches!(store.read_features("a"), Err(Error::Parse(_))));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
