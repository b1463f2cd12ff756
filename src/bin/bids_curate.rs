use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{ArgGroup, Parser};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use bids_curator::app::{CurateOptions, CurateReport, Curator};
use bids_curator::config::ConfigLoader;
use bids_curator::datasets;
use bids_curator::error::CurateError;
use bids_curator::materialize::{CommandProducer, NopProducer};
use bids_curator::output::{JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "bids-curate")]
#[command(about = "Curate an ad-hoc neuroimaging acquisition tree into a BIDS dataset")]
#[command(version, author)]
#[command(group = ArgGroup::new("spec").required(true).args(["dataset", "config"]))]
struct Cli {
    /// Path to the folder containing the dataset to convert to BIDS
    #[arg(short = 'i', long = "path-input")]
    path_input: Utf8PathBuf,

    /// Path to the output BIDS folder (default: <input>_curated)
    #[arg(short = 'o', long = "path-output")]
    path_output: Option<Utf8PathBuf>,

    /// Built-in dataset preset (inspired, axondeepseg-tem, dcm-zurich)
    #[arg(long)]
    dataset: Option<String>,

    /// Path to a JSON dataset config
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    /// Reuse a pre-existing output tree instead of clearing it first
    #[arg(long)]
    append: bool,

    /// Walk and report without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Remove directories extracted from per-subject archives after the run
    #[arg(long)]
    cleanup_extracted: bool,

    /// Print the machine-readable JSON report instead of the summary
    #[arg(long)]
    non_interactive: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(curate) = report.downcast_ref::<CurateError>() {
            return ExitCode::from(map_exit_code(curate));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CurateError) -> u8 {
    match error {
        CurateError::InputMissing(_)
        | CurateError::UnknownDataset(_)
        | CurateError::ConfigRead(_)
        | CurateError::ConfigParse(_)
        | CurateError::ConfigInvalid(_) => 2,
        CurateError::MissingTool(_) | CurateError::ProducerFailed(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = match (&cli.dataset, &cli.config) {
        (Some(name), _) => datasets::preset(name).into_diagnostic()?,
        (None, Some(path)) => {
            let dataset = ConfigLoader::resolve(path).into_diagnostic()?;
            return curate(dataset, &cli, output_mode);
        }
        (None, None) => unreachable!("clap group guarantees one of dataset/config"),
    };
    let dataset = ConfigLoader::resolve_config(config).into_diagnostic()?;
    curate(dataset, &cli, output_mode)
}

fn curate(
    dataset: bids_curator::config::ResolvedDataset,
    cli: &Cli,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let output = cli
        .path_output
        .clone()
        .unwrap_or_else(|| Utf8PathBuf::from(format!("{}_curated", cli.path_input)));
    let options = CurateOptions {
        append: cli.append,
        dry_run: cli.dry_run,
        cleanup_extracted: cli.cleanup_extracted,
    };

    let tool = dataset.stitch_tool.clone();
    let report = match tool {
        Some(tool) => Curator::new(
            dataset,
            CommandProducer::new(tool.program, tool.pre_args, tool.post_args),
        )
        .run(&cli.path_input, &output, &options),
        None => Curator::new(dataset, NopProducer).run(&cli.path_input, &output, &options),
    }
    .into_diagnostic()?;

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Interactive => print_summary(&report, &output),
    }
    Ok(())
}

fn print_summary(report: &CurateReport, output: &Utf8PathBuf) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}🧠 BIDS curation summary ({}){reset}", report.dataset);
    println!("{green}✅ Subjects: {}{reset}", report.subjects);
    println!(
        "{green}📄 Files copied: {} (sidecars created: {}, stitched: {}){reset}",
        report.files_copied, report.sidecars_created, report.stitched
    );
    if report.skipped > 0 {
        println!("{yellow}⚠️ Skipped files: {}{reset}", report.skipped);
    }
    println!("{cyan}📁 Output: {output}{reset}");
}
