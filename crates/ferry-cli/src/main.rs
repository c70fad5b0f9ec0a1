use clap::{value_parser, Arg, Command, ValueHint};
use ferry_cli::input::Input;
use ferry_cli::runner::Runner;
use rayon::ThreadPoolBuilder;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(
            env_logger::Env::default().filter_or("FERRY_LOG", "error,ferry=info,ferry_core=info"),
        )
        .init();

    let matches = Command::new("ferry")
        .version(clap::crate_version!())
        .about("Align LC-MS runs and transfer identifications between them")
        .arg(
            Arg::new("parameters")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("runs")
                .num_args(1..)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Paths or names of runs to process. Overrides runs listed in the \
                     configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("data_directory")
                .short('d')
                .long("data_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Directory holding `<run>.peptide_fdr.tsv` and `<run>.feature_table.tsv` \
                     files. Overrides the directory specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of worker threads (default = # of CPUs, at most 60)")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("skip-align")
                .long("skip-align")
                .action(clap::ArgAction::SetTrue)
                .help("Do not calibrate runs, match on previously calibrated values"),
        )
        .arg(
            Arg::new("skip-match")
                .long("skip-match")
                .action(clap::ArgAction::SetTrue)
                .help("Calibrate runs only, do not transfer identifications"),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let input = Input::from_arguments(matches)?;
    let parameters = input.build()?;

    ThreadPoolBuilder::new()
        .num_threads(parameters.threads)
        .build_global()?;

    Runner::new(parameters)?.run()?;
    Ok(())
}
