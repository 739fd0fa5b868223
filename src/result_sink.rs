use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::SinkError;
use crate::extractor::Record;

pub trait Sink {
    fn append(&mut self, record: &Record) -> Result<(), SinkError>;
}

/// Append-only CSV table. The header is written once, with the first row,
/// and fixes the column order for every later row.
pub struct CsvSink {
    path: PathBuf,
    header: Option<Vec<String>>,
    /// The existing file stops mid-line, e.g. after an interrupted write.
    unterminated: bool,
}

impl CsvSink {
    /// Opens `path` for appending. An existing file keeps its header so a
    /// resumed run must produce the same columns.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let mut unterminated = false;
        let header = if path.exists() {
            unterminated = !ends_with_newline(&path)?;
            if unterminated {
                info!(
                    "Results file {} does not end with a newline, one will be added",
                    path.display()
                );
            }
            let header = read_header(&path)?;
            match &header {
                Some(columns) => info!(
                    "Appending to existing results file {} ({} columns)",
                    path.display(),
                    columns.len()
                ),
                None => info!("Results file {} exists but is empty", path.display()),
            }
            header
        } else {
            debug!("Results file {} will be created", path.display());
            None
        };
        Ok(CsvSink {
            path,
            header,
            unterminated,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    fn io_err(&self, source: std::io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_err(&self, source: csv::Error) -> SinkError {
        SinkError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}

impl Sink for CsvSink {
    fn append(&mut self, record: &Record) -> Result<(), SinkError> {
        let write_header = match &self.header {
            Some(expected) if expected.as_slice() != record.columns() => {
                return Err(SinkError::SchemaMismatch {
                    expected: expected.clone(),
                    found: record.columns().to_vec(),
                });
            }
            Some(_) => false,
            None => true,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;

        // Close the dangling line so the new row does not merge into it.
        if self.unterminated {
            file.write_all(b"\n").map_err(|e| self.io_err(e))?;
            self.unterminated = false;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if write_header {
            writer
                .write_record(record.columns())
                .map_err(|e| self.csv_err(e))?;
        }
        let fields = record
            .values()
            .iter()
            .map(|v| v.as_deref().unwrap_or(""));
        writer.write_record(fields).map_err(|e| self.csv_err(e))?;
        writer.flush().map_err(|e| self.io_err(e))?;

        if write_header {
            self.header = Some(record.columns().to_vec());
        }
        Ok(())
    }
}

/// True for an empty file or one whose last byte is `\n`.
fn ends_with_newline(path: &Path) -> Result<bool, SinkError> {
    let io_err = |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let len = file.metadata().map_err(io_err)?.len();
    if len == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1)).map_err(io_err)?;
    file.read_exact(&mut last).map_err(io_err)?;
    Ok(last[0] == b'\n')
}

fn read_header(path: &Path) -> Result<Option<Vec<String>>, SinkError> {
    let file = File::open(path).map_err(|source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);
    match reader.records().next() {
        Some(Ok(row)) => Ok(Some(row.iter().map(str::to_string).collect())),
        Some(Err(source)) => Err(SinkError::Csv {
            path: path.to_path_buf(),
            source,
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn record(pairs: &[(&str, Option<&str>)]) -> Record {
        let mut record = Record::new();
        for (column, value) in pairs {
            record.push(*column, value.map(str::to_string));
        }
        record
    }

    #[test]
    fn header_is_written_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::open(&path).unwrap();

        sink.append(&record(&[("ANI", Some("97.1")), ("AF", Some("0.8"))]))
            .unwrap();
        sink.append(&record(&[("ANI", Some("88.0")), ("AF", None)]))
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "ANI,AF\n97.1,0.8\n88.0,\n");
    }

    #[test]
    fn reopened_file_appends_without_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        CsvSink::open(&path)
            .unwrap()
            .append(&record(&[("Genome1", Some("a, b.fna"))]))
            .unwrap();

        let mut sink = CsvSink::open(&path).unwrap();
        assert_eq!(sink.header(), Some(&["Genome1".to_string()][..]));
        sink.append(&record(&[("Genome1", Some("c.fna"))])).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Genome1\n\"a, b.fna\"\nc.fna\n");
    }

    #[test]
    fn unterminated_last_row_is_not_merged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "ANI,AF\n97.1,0.8").unwrap();

        let mut sink = CsvSink::open(&path).unwrap();
        sink.append(&record(&[("ANI", Some("88.0")), ("AF", Some("0.5"))]))
            .unwrap();
        sink.append(&record(&[("ANI", Some("90.2")), ("AF", Some("0.7"))]))
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "ANI,AF\n97.1,0.8\n88.0,0.5\n90.2,0.7\n");
    }

    #[test]
    fn unterminated_header_only_file_keeps_its_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "ANI,AF").unwrap();

        let mut sink = CsvSink::open(&path).unwrap();
        assert_eq!(sink.header().map(<[String]>::len), Some(2));
        sink.append(&record(&[("ANI", Some("88.0")), ("AF", None)]))
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "ANI,AF\n88.0,\n");
    }

    #[test]
    fn column_drift_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::open(&path).unwrap();
        sink.append(&record(&[("A", Some("1")), ("B", Some("2"))]))
            .unwrap();

        let err = sink
            .append(&record(&[("A", Some("1")), ("C", Some("2"))]))
            .unwrap_err();
        match err {
            SinkError::SchemaMismatch { expected, found } => {
                assert_eq!(expected, vec!["A", "B"]);
                assert_eq!(found, vec!["A", "C"]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn written_rows_read_back_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let original = record(&[
            ("Genome1", Some("query one.fna")),
            ("ANI(1->2)", Some("97.85")),
            ("Note", Some("line \"quoted\"")),
            ("AF", None),
        ]);
        CsvSink::open(&path).unwrap().append(&original).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, original.columns());
        let row = reader.records().next().unwrap().unwrap();
        let values: Vec<Option<String>> = row
            .iter()
            .map(|v| (!v.is_empty()).then(|| v.to_string()))
            .collect();
        assert_eq!(values, original.values());
    }
}
