use aastat_cli::input::Input;
use aastat_cli::runner::Runner;
use anyhow::Context;
use clap::{value_parser, Arg, Command, ValueHint};
use rayon::ThreadPoolBuilder;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("AASTAT_LOG", "error,aastat=info"))
        .init();

    let matches = Command::new("aastat")
        .version(clap::crate_version!())
        .author("Michael Lazear <michaellazear92@gmail.com>")
        .about("Find, filter and localize amino acid mass shifts in open search results")
        .arg(
            Arg::new("psm_paths")
                .num_args(1..)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Paths to PSM tables (TSV, or CSV with a .csv extension). Overrides \
                     the tables listed in the configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("parameters")
                .short('p')
                .long("parameters")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("spectra")
                .short('s')
                .long("spectra")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to fragment spectra (JSON file). Mass shifts are only \
                     localized when spectra are available.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("modifications")
                .short('m')
                .long("modifications")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to a modification table (JSON file) replacing the built-in one")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output_directory")
                .short('o')
                .long("output_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where results will be written. Overrides the directory \
                     specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("fdr")
                .long("fdr")
                .value_parser(value_parser!(f64))
                .help("Per-interval target FDR")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("batch-size")
                .long("batch-size")
                .value_parser(value_parser!(usize))
                .help("Number of histogram windows fitted per parallel batch")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of worker threads (default = # of CPUs)")
                .value_hint(ValueHint::Other),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Written by {author-with-newline}Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let threads = matches
        .get_one::<u16>("threads")
        .copied()
        .map(usize::from)
        .unwrap_or_else(num_cpus::get);
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("Failed to configure thread pool")?;

    let input = Input::from_arguments(matches)?;
    let settings = input.build()?;
    Runner::new(settings).run()?;

    Ok(())
}
