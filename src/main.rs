use std::process::ExitCode;

use clap::Parser;
use log::{debug, error, info};

use misi_robot_lib::{input_loader, logger};
use misi_robot_lib::{AniClient, Cli, Config, CsvSink, Extractor, JobRunner, Throttle};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // The log file lives in the output directory, so that one is checked first.
    for dir in [&cli.qry_dir_path, &cli.ref_dir_path, &cli.out_dir_path] {
        if !dir.is_dir() {
            return startup_failure(format!(
                "Non-existent path entered: {}; exiting.",
                dir.display()
            ));
        }
    }

    let config = match Config::from_cli(cli) {
        Ok(config) => config,
        Err(e) => return startup_failure(e.to_string()),
    };

    if let Err(e) = logger::init(&config.log_path()) {
        return startup_failure(e.to_string());
    }

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Reports an error raised before the run logger exists.
fn startup_failure(message: String) -> ExitCode {
    if logger::init_console().is_ok() {
        error!("{}", message);
    } else {
        eprintln!("{}", message);
    }
    ExitCode::FAILURE
}

fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting misi-robot...");
    debug!("Configuration: {}", serde_json::to_string(config)?);

    debug!("Getting list of fasta files from query directory.");
    let queries = input_loader::scan_dir(&config.qry_dir)?;
    debug!("Getting list of fasta files from reference directory.");
    let references = input_loader::scan_dir(&config.ref_dir)?;
    let jobs = input_loader::build_jobs(&queries, &references);

    let submitter = AniClient::new(config)?;
    let sink = CsvSink::open(config.results_path())?;
    let throttle = Throttle::new(config.delay, config.jitter);
    let mut runner = JobRunner::new(submitter, Extractor::new(), sink, throttle);

    let summary = runner.run(&jobs, config.start)?;
    info!(
        "All submissions finished: {} written, {} self-comparisons skipped, {} resumed past.",
        summary.written, summary.skipped, summary.resumed_past
    );
    debug!("Run summary: {}", serde_json::to_string(&summary)?);
    info!("Results saved to {}", config.results_path().display());
    Ok(())
}
