use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::InputError;

/// Extensions the calculator accepts. Matched as a case-sensitive suffix.
pub const FASTA_EXTENSIONS: [&str; 4] = [".fasta", ".fna", ".faa", ".fa"];

/// Files at or above this size are rejected by the service.
pub const MAX_FASTA_BYTES: u64 = 500_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaFile {
    path: PathBuf,
    size: u64,
}

impl FastaFile {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPair {
    pub query: FastaFile,
    pub reference: FastaFile,
}

impl JobPair {
    /// The service returns nothing useful when a genome is compared with itself.
    pub fn same_basename(&self) -> bool {
        self.query.basename() == self.reference.basename()
    }
}

impl fmt::Display for JobPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {})",
            self.query.path.display(),
            self.reference.path.display()
        )
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> InputError {
    let path = path.to_path_buf();
    move |source| InputError::Io { path, source }
}

pub fn has_fasta_extension(name: &str) -> bool {
    FASTA_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Lists the FASTA files directly inside `dir`, sorted by file name so that
/// job indices are stable between runs.
pub fn scan_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<FastaFile>, InputError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(InputError::InvalidPath {
            path: dir.to_path_buf(),
        });
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let entry = entry.map_err(io_error(dir))?;
        entries.push(entry.path());
    }
    entries.sort();

    let mut files = Vec::new();
    for path in entries {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let metadata = fs::metadata(&path).map_err(io_error(&path))?;

        if !metadata.is_file() || !has_fasta_extension(&name) {
            debug!("{} is not a valid fasta file, skipping.", path.display());
            continue;
        }

        let size = metadata.len();
        if size >= MAX_FASTA_BYTES {
            return Err(InputError::Oversized { path, size });
        }
        files.push(FastaFile { path, size });
    }

    if files.is_empty() {
        warn!("No fasta files found in {}", dir.display());
    } else {
        info!("Found {} fasta files in {}", files.len(), dir.display());
    }
    Ok(files)
}

/// Every (query, reference) combination, queries outer and references inner.
pub fn build_jobs(queries: &[FastaFile], references: &[FastaFile]) -> Vec<JobPair> {
    queries
        .iter()
        .flat_map(|query| {
            references.iter().map(move |reference| JobPair {
                query: query.clone(),
                reference: reference.clone(),
            })
        })
        .collect()
}
