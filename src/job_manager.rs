use log::{debug, error, info, warn};
use serde::Serialize;

use crate::delay_manager::{Pacing, Throttle};
use crate::error::{JobError, RunError};
use crate::extractor::{Extractor, Outcome};
use crate::input_loader::JobPair;
use crate::result_sink::Sink;
use crate::submitter::Submitter;

/// Counts for one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    /// Jobs before `--start` that were not submitted again.
    pub resumed_past: usize,
    pub written: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.written + self.skipped
    }
}

/// Drives jobs one at a time: submit, extract, persist, pause.
pub struct JobRunner<S, K, P = Throttle> {
    submitter: S,
    extractor: Extractor,
    sink: K,
    throttle: P,
}

impl<S: Submitter, K: Sink, P: Pacing> JobRunner<S, K, P> {
    pub fn new(submitter: S, extractor: Extractor, sink: K, throttle: P) -> Self {
        JobRunner {
            submitter,
            extractor,
            sink,
            throttle,
        }
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Processes `jobs[start - 1..]`. Job indices are 1-based. The first
    /// failure stops the run; rows already written stay in place.
    pub fn run(&mut self, jobs: &[JobPair], start: usize) -> Result<RunSummary, RunError> {
        let total = jobs.len();
        let start = start.max(1);
        let mut summary = RunSummary {
            total,
            ..RunSummary::default()
        };

        info!("Total jobs to submit: {}", total);
        if start > total && total > 0 {
            warn!(
                "Start index {} is past the last job ({}), nothing to submit",
                start, total
            );
        }

        for (i, pair) in jobs.iter().enumerate() {
            let index = i + 1;
            if index < start {
                debug!("Skipping {}", pair);
                summary.resumed_past += 1;
                continue;
            }

            debug!("Attempting submission: {}/{} {}", index, total, pair);
            match self.process(pair) {
                Ok(Outcome::Skipped) => {
                    debug!("Self-comparison returned no results for {}", pair);
                    info!("Submission completed: {}/{}", index, total);
                    summary.skipped += 1;
                }
                Ok(Outcome::Record(_)) => {
                    info!("Submission completed: {}/{}", index, total);
                    summary.written += 1;
                    self.throttle.wait();
                }
                Err(source) => {
                    report_failure(index, total, pair, &source);
                    return Err(RunError::Job {
                        index,
                        total,
                        pair: pair.clone(),
                        source,
                    });
                }
            }
        }

        Ok(summary)
    }

    fn process(&mut self, pair: &JobPair) -> Result<Outcome, JobError> {
        let html = self.submitter.submit(pair)?;
        let outcome = self.extractor.extract(&html, pair)?;
        if let Outcome::Record(record) = &outcome {
            self.sink.append(record)?;
        }
        Ok(outcome)
    }
}

fn report_failure(index: usize, total: usize, pair: &JobPair, source: &JobError) {
    error!("Submission failed: {}/{} {}", index, total, pair);
    match source {
        JobError::Network(e) => {
            error!("There was an error submitting to the server:");
            error!("{}", e);
        }
        JobError::Extract(e) => error!("Could not read the server response: {}", e),
        JobError::Sink(e) => error!("Could not save the result: {}", e),
    }
    error!(
        "You can attempt restarting at this submission with --start {}. Exiting.",
        index
    );
}
