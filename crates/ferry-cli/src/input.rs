use anyhow::{ensure, Context};
use clap::ArgMatches;
use ferry_core::settings::{AlignSettings, MatchSettings, MAX_WORKERS};
use ferry_core::table::{Dimension, OffsetModes};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize, Clone, Debug)]
/// Actual parameters - may include overrides or default values not set by user
pub struct Search {
    pub version: String,
    pub runs: Vec<String>,
    pub groups: Vec<u32>,
    pub align: AlignSettings,
    pub matching: MatchSettings,
    pub skip_align: bool,
    pub skip_match: bool,
    pub threads: usize,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub data_directory: PathBuf,
}

#[derive(Deserialize, Default, Debug)]
/// Input parameters deserialized from JSON file
pub struct Input {
    runs: Option<Vec<String>>,
    groups: Option<Vec<u32>>,
    data_directory: Option<String>,
    align: Option<AlignOptions>,
    matching: Option<MatchOptions>,
    skip_align: Option<bool>,
    skip_match: Option<bool>,
    threads: Option<usize>,
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct AlignOptions {
    modes: Option<OffsetModes>,
    weighted: Option<bool>,
    parallel: Option<bool>,
}

impl From<AlignOptions> for AlignSettings {
    fn from(value: AlignOptions) -> AlignSettings {
        let default = AlignSettings::default();
        let settings = AlignSettings {
            modes: value.modes.unwrap_or(default.modes),
            weighted: value.weighted.unwrap_or(default.weighted),
            parallel: value.parallel.unwrap_or(default.parallel),
        };
        if settings.modes.is_empty() {
            log::warn!("align.modes is empty, runs will not be calibrated");
        }
        if settings.modes.get(Dimension::Mz).is_none() {
            log::warn!("align.modes does not calibrate `mz`, is this correct?");
        }
        settings
    }
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct MatchOptions {
    match_p_min: Option<f64>,
    match_d_min: Option<f64>,
    group_distance: Option<u32>,
    min_group_runs: Option<usize>,
}

impl From<MatchOptions> for MatchSettings {
    fn from(value: MatchOptions) -> MatchSettings {
        let default = MatchSettings::default();
        let settings = MatchSettings {
            match_p_min: value.match_p_min.unwrap_or(default.match_p_min),
            match_d_min: value.match_d_min.unwrap_or(default.match_d_min),
            group_distance: value.group_distance.unwrap_or(default.group_distance),
            min_group_runs: value.min_group_runs.unwrap_or(default.min_group_runs),
        };
        if settings.match_p_min <= 0.0 {
            log::warn!(
                "matching.match_p_min = {} will reject every match; lower values are stricter",
                settings.match_p_min
            );
        } else if settings.match_p_min > 1.0 {
            log::warn!(
                "matching.match_p_min = {} accepts every candidate within matching.match_d_min",
                settings.match_p_min
            );
        }
        if settings.match_d_min <= 0.0 {
            log::warn!(
                "matching.match_d_min = {} only accepts features at the exact reference position",
                settings.match_d_min
            );
        }
        if settings.min_group_runs < default.min_group_runs {
            log::warn!(
                "matching.min_group_runs = {} is lower than expected, reference spread may be unreliable",
                settings.min_group_runs
            );
        }
        settings
    }
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .expect("required parameters");
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(data_directory) = matches.get_one::<String>("data_directory") {
            log::trace!("overriding `data_directory` parameter.");
            input.data_directory = Some(data_directory.into());
        }
        if let Some(runs) = matches.get_many::<String>("runs") {
            log::trace!("overriding `runs` parameter.");
            input.runs = Some(runs.into_iter().map(|p| p.into()).collect());
        }
        if let Some(threads) = matches.get_one::<u16>("threads").copied() {
            input.threads = Some(threads as usize);
        }
        if matches.get_flag("skip-align") {
            input.skip_align = Some(true);
        }
        if matches.get_flag("skip-match") {
            input.skip_match = Some(true);
        }

        ensure!(
            input.runs.as_ref().map(|r| !r.is_empty()).unwrap_or(false),
            "`runs` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        serde_json::from_str(contents).map_err(anyhow::Error::from)
    }

    pub fn build(self) -> anyhow::Result<Search> {
        let runs = self.runs.unwrap_or_default();
        ensure!(!runs.is_empty(), "at least one run must be provided");

        let groups = match self.groups {
            Some(groups) => {
                ensure!(
                    groups.len() == runs.len(),
                    "{} matching groups were provided for {} runs",
                    groups.len(),
                    runs.len()
                );
                groups
            }
            None => vec![0; runs.len()],
        };

        let data_directory = match self.data_directory {
            Some(path) => PathBuf::from(path),
            None => std::env::current_dir()?,
        };
        ensure!(
            data_directory.is_dir(),
            "`data_directory` {} is not a directory",
            data_directory.display()
        );

        let threads = self.threads.unwrap_or_else(num_cpus::get);
        if threads > MAX_WORKERS {
            log::warn!(
                "{} threads requested, using at most {}",
                threads,
                MAX_WORKERS
            );
        }

        Ok(Search {
            version: clap::crate_version!().into(),
            runs,
            groups,
            align: self.align.map(Into::into).unwrap_or_default(),
            matching: self.matching.map(Into::into).unwrap_or_default(),
            skip_align: self.skip_align.unwrap_or(false),
            skip_match: self.skip_match.unwrap_or(false),
            threads: threads.clamp(1, MAX_WORKERS),
            output_paths: Vec::new(),
            data_directory,
        })
    }
}
