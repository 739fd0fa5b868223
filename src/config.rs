use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_URL: &str = "https://ani.jgi-psf.org/html/calc_results.php";
pub const LOG_FILE_NAME: &str = "misi-robot_log.txt";
pub const RESULTS_FILE_NAME: &str = "misi-results.csv";

#[derive(Parser, Debug, Clone)]
#[command(name = "misi-robot", version)]
#[command(
    about = "Automatically submit jobs to the JGI MiSI tool. Query and reference fasta files \
             should contain the predicted genes (DNA) of specified genomes. No tRNA or rRNA \
             features should be included. No fasta files greater than 500MB in size will be accepted."
)]
pub struct Cli {
    /// The full path to a directory containing query genomes.
    pub qry_dir_path: PathBuf,

    /// The full path to a directory containing reference genomes.
    pub ref_dir_path: PathBuf,

    /// The full path to a directory for the output.
    pub out_dir_path: PathBuf,

    /// Start submitting jobs at this job number. Useful for restarting. Defaults to 1.
    #[arg(long, value_name = "NUMBER", default_value_t = 1,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub start: u64,

    /// Form endpoint of the ANI calculator.
    #[arg(long, env = "MISI_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Per-request timeout in seconds. 0 waits forever.
    #[arg(long, env = "MISI_TIMEOUT_SECS", default_value_t = 3600)]
    pub timeout_secs: u64,

    /// Extra attempts after a failed request.
    #[arg(long, env = "MISI_RETRIES", default_value_t = 0)]
    pub retries: u32,

    /// Seconds to wait before retrying a failed request.
    #[arg(long, env = "MISI_RETRY_WAIT_SECS", default_value_t = 30)]
    pub retry_wait_secs: u64,

    /// Seconds to pause after each written result.
    #[arg(long, env = "MISI_DELAY_SECS", default_value_t = 5)]
    pub delay_secs: u64,

    /// Upper bound of a random extra pause added to the delay, in seconds.
    #[arg(long, env = "MISI_JITTER_SECS", default_value_t = 0)]
    pub jitter_secs: u64,
}

/// Everything a run needs, resolved once at start-up.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub qry_dir: PathBuf,
    pub ref_dir: PathBuf,
    pub out_dir: PathBuf,
    pub start: usize,
    pub url: String,
    pub timeout: Option<Duration>,
    pub retries: u32,
    pub retry_wait: Duration,
    pub delay: Duration,
    pub jitter: Duration,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let url = validate_url(&cli.url)?;
        Ok(Self {
            qry_dir: cli.qry_dir_path,
            ref_dir: cli.ref_dir_path,
            out_dir: cli.out_dir_path,
            start: usize::try_from(cli.start).unwrap_or(usize::MAX),
            url,
            timeout: (cli.timeout_secs > 0).then(|| Duration::from_secs(cli.timeout_secs)),
            retries: cli.retries,
            retry_wait: Duration::from_secs(cli.retry_wait_secs),
            delay: Duration::from_secs(cli.delay_secs),
            jitter: Duration::from_secs(cli.jitter_secs),
        })
    }

    pub fn log_path(&self) -> PathBuf {
        self.out_dir.join(LOG_FILE_NAME)
    }

    pub fn results_path(&self) -> PathBuf {
        self.out_dir.join(RESULTS_FILE_NAME)
    }
}

fn validate_url(raw: &str) -> Result<String, ConfigError> {
    let parsed = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}
