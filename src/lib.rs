pub mod config;
pub mod delay_manager;
pub mod error;
pub mod extractor;
pub mod input_loader;
pub mod job_manager;
pub mod logger;
pub mod result_sink;
pub mod submitter;

// Exporting types for convenience
pub use config::{Cli, Config};
pub use delay_manager::{Pacing, Throttle};
pub use error::{ExtractError, InputError, JobError, NetworkError, RunError, SinkError};
pub use extractor::{Extractor, Outcome, Record, ResultParser, SmallTableParser};
pub use input_loader::{FastaFile, JobPair};
pub use job_manager::{JobRunner, RunSummary};
pub use result_sink::{CsvSink, Sink};
pub use submitter::{AniClient, Submitter};
