use super::input::Search;
use super::output::TsvStore;
use anyhow::Context;
use ferry_core::alignment::align;
use ferry_core::matching::match_runs;
use ferry_core::settings::Experiment;
use log::info;
use std::path::PathBuf;
use std::time::Instant;

pub struct Runner {
    pub parameters: Search,
    store: TsvStore,
    start: Instant,
}

/// Log completed fractions, at most once per 10% step
fn progress(stage: &'static str) -> impl FnMut(f64) {
    let mut last = 0;
    move |fraction| {
        let step = (fraction * 10.0).floor() as usize;
        if step > last {
            last = step;
            log::debug!("{}: {:3}%", stage, step * 10);
        }
    }
}

impl Runner {
    pub fn new(parameters: Search) -> anyhow::Result<Self> {
        let store = TsvStore::new(&parameters.data_directory);
        Ok(Self {
            parameters,
            store,
            start: Instant::now(),
        })
    }

    // Create a path for `file_name` in the data directory
    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.data_directory.join(file_name.as_ref())
    }

    pub fn run(mut self) -> anyhow::Result<Search> {
        let experiment = Experiment::new(
            &self.parameters.runs,
            Some(self.parameters.groups.as_slice()),
            self.parameters.threads,
        );
        let runs = experiment.names();
        info!(
            "{} runs in {} matching groups",
            experiment.len(),
            experiment.groups().len()
        );

        if self.parameters.skip_align {
            info!("skipping alignment");
        } else {
            let start = Instant::now();
            let alignment = align(
                &self.store,
                &runs,
                &self.parameters.align,
                &mut progress("align"),
            )
            .context("Failed to align runs")?;
            info!("- align: {:8} ms", start.elapsed().as_millis());

            if let Some(alignment) = alignment {
                let path = self.write_alignment(&alignment)?;
                self.parameters.output_paths.push(path);
            }
        }

        if self.parameters.skip_match {
            info!("skipping match-between-runs");
        } else {
            let start = Instant::now();
            let summary = match_runs(
                &self.store,
                &experiment,
                &self.parameters.matching,
                &mut progress("match"),
            )
            .context("Failed to match between runs")?;
            info!("- match: {:8} ms", start.elapsed().as_millis());
            info!(
                "transferred {} identifications across {} runs",
                summary.total(),
                summary.matched.len()
            );
            if !summary.skipped_groups.is_empty() {
                info!("skipped matching groups: {:?}", summary.skipped_groups);
            }
        }

        let path = self.make_path("results.json");
        self.parameters
            .output_paths
            .push(path.to_string_lossy().into_owned());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);

        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        let run_time = (Instant::now() - self.start).as_secs();
        info!("finished in {}s", run_time);
        Ok(self.parameters)
    }
}
