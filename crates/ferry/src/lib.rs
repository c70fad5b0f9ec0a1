pub mod alignment;
pub mod calibration;
pub mod distance;
pub mod matching;
pub mod ml;
pub mod reference;
pub mod settings;
pub mod store;
pub mod table;

use table::Dataset;

#[derive(Debug)]
pub enum Error {
    /// Calibration mode other than `absolute` or `relative`
    UnsupportedMode(String),
    UnknownDimension(String),
    MissingRun(String),
    MissingDataset { run: String, dataset: Dataset },
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedMode(mode) => write!(
                f,
                "unsupported calibration mode `{}`, expected `absolute` or `relative`",
                mode
            ),
            Self::UnknownDimension(dim) => write!(f, "unknown calibration dimension `{}`", dim),
            Self::MissingRun(run) => write!(f, "run `{}` not found", run),
            Self::MissingDataset { run, dataset } => {
                write!(f, "dataset `{}` not found for run `{}`", dataset, run)
            }
            Self::Io(e) => e.fmt(f),
            Self::Parse(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
