use std::collections::{HashMap, HashSet};

use log::debug;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::ExtractError;
use crate::input_loader::JobPair;

/// Cell texts read as missing values, after whitespace normalisation.
const MISSING_MARKERS: [&str; 18] = [
    "NaN", "nan", "-NaN", "-nan", "NA", "N/A", "n/a", "<NA>", "#NA", "#N/A", "#N/A N/A", "NULL",
    "null", "None", "1.#IND", "-1.#IND", "1.#QNAN", "-1.#QNAN",
];

/// Header row plus data rows, as read from the summary table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Row-labelled table. `values[i]` holds every cell after the label of row `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailsTable {
    pub labels: Vec<String>,
    pub values: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTables {
    pub primary: PrimaryTable,
    pub details: DetailsTable,
}

impl ParsedTables {
    fn all_missing(&self) -> bool {
        self.primary.rows.iter().flatten().all(Option::is_none)
            && self.details.values.iter().flatten().all(Option::is_none)
    }
}

/// Turns a response page into its two result tables. The markup of the
/// remote page is not under our control, so this is the seam to swap when it
/// changes.
pub trait ResultParser {
    fn parse(&self, html: &str) -> Result<ParsedTables, ExtractError>;
}

/// One flat result row with stable column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<Option<String>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: Option<String>) {
        self.columns.push(column.into());
        self.values.push(value);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values[idx].as_deref()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Record(Record),
    /// Self-comparison: the service answers with an empty page.
    Skipped,
}

pub struct SmallTableParser {
    table_selector: Selector,
    whitespace: Regex,
}

impl SmallTableParser {
    pub fn new() -> Self {
        SmallTableParser {
            table_selector: Selector::parse(r#"table[id="smallTable"]"#)
                .expect("table selector is valid"),
            whitespace: Regex::new(r"\s+").expect("whitespace pattern is valid"),
        }
    }

    fn cell_value(&self, cell: ElementRef) -> Option<String> {
        let text = cell.text().collect::<String>();
        let text = self.whitespace.replace_all(&text, " ");
        let text = text.trim();
        if text.is_empty() || MISSING_MARKERS.contains(&text) {
            None
        } else {
            Some(text.to_string())
        }
    }

    fn cell_text(&self, cell: ElementRef) -> String {
        self.cell_value(cell).unwrap_or_default()
    }

    /// Splits a table into header rows and body rows, ignoring nested tables.
    fn rows<'a>(&self, table: ElementRef<'a>) -> (Vec<Row<'a>>, Vec<Row<'a>>) {
        let mut header = Vec::new();
        let mut body = Vec::new();
        for child in table.children().filter_map(ElementRef::wrap) {
            match child.value().name() {
                "tr" => body.push(Row::from_tr(child)),
                "thead" => header.extend(child_rows(child)),
                "tbody" | "tfoot" => body.extend(child_rows(child)),
                _ => {}
            }
        }
        // Without a <thead>, leading rows made only of <th> cells are the header.
        if header.is_empty() {
            let split = body.iter().take_while(|row| row.all_th()).count();
            header = body.drain(..split).collect();
        }
        (header, body)
    }

    fn read_primary(&self, table: ElementRef) -> PrimaryTable {
        let (header, body) = self.rows(table);
        let rows: Vec<Vec<Option<String>>> = body
            .iter()
            .map(|row| row.cells.iter().map(|c| self.cell_value(*c)).collect())
            .collect();
        let columns = match header.first() {
            Some(row) => row.cells.iter().map(|c| self.cell_text(*c)).collect(),
            None => {
                let width = rows.iter().map(Vec::len).max().unwrap_or(0);
                (0..width).map(|i| i.to_string()).collect()
            }
        };
        PrimaryTable {
            columns: mangle_duplicates(columns),
            rows,
        }
    }

    fn read_details(&self, table: ElementRef) -> DetailsTable {
        let (_, body) = self.rows(table);
        let mut details = DetailsTable::default();
        for row in body {
            let Some((label, rest)) = row.cells.split_first() else {
                continue;
            };
            details.labels.push(self.cell_text(*label));
            details
                .values
                .push(rest.iter().map(|c| self.cell_value(*c)).collect());
        }
        details.labels = mangle_duplicates(details.labels);
        details
    }
}

impl Default for SmallTableParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultParser for SmallTableParser {
    fn parse(&self, html: &str) -> Result<ParsedTables, ExtractError> {
        let document = Html::parse_document(html);
        let tables: Vec<ElementRef> = document.select(&self.table_selector).collect();
        if tables.len() < 2 {
            return Err(ExtractError::MissingTables {
                found: tables.len(),
            });
        }
        if tables.len() > 2 {
            debug!("Ignoring {} extra result tables", tables.len() - 2);
        }
        Ok(ParsedTables {
            primary: self.read_primary(tables[0]),
            details: self.read_details(tables[1]),
        })
    }
}

struct Row<'a> {
    cells: Vec<ElementRef<'a>>,
}

impl<'a> Row<'a> {
    fn from_tr(tr: ElementRef<'a>) -> Self {
        let cells = tr
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "td" | "th"))
            .collect();
        Row { cells }
    }

    fn all_th(&self) -> bool {
        !self.cells.is_empty() && self.cells.iter().all(|c| c.value().name() == "th")
    }
}

fn child_rows<'a>(section: ElementRef<'a>) -> impl Iterator<Item = Row<'a>> {
    section
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == "tr")
        .map(Row::from_tr)
}

/// Repeated names get `.1`, `.2`, ... so every column stays addressable.
fn mangle_duplicates(names: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    names
        .into_iter()
        .map(|name| {
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                name
            } else {
                format!("{}.{}", name, *count - 1)
            }
        })
        .collect()
}

pub struct Extractor {
    parser: Box<dyn ResultParser>,
}

impl Extractor {
    pub fn new() -> Self {
        Self::with_parser(SmallTableParser::new())
    }

    pub fn with_parser(parser: impl ResultParser + 'static) -> Self {
        Extractor {
            parser: Box::new(parser),
        }
    }

    pub fn extract(&self, html: &str, pair: &JobPair) -> Result<Outcome, ExtractError> {
        let tables = self.parser.parse(html)?;
        merge(tables, pair)
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates the two tables and joins the single primary row with the
/// transposed details into one record.
pub fn merge(tables: ParsedTables, pair: &JobPair) -> Result<Outcome, ExtractError> {
    if tables.all_missing() {
        if pair.same_basename() {
            return Ok(Outcome::Skipped);
        }
        return Err(ExtractError::EmptyResult);
    }

    let ParsedTables { primary, details } = tables;

    let mut primary_rows = primary.rows.into_iter();
    let primary_row = match (primary_rows.next(), primary_rows.next()) {
        (Some(row), None) => row,
        (None, _) => {
            return Err(ExtractError::Cardinality {
                table: "primary",
                detail: "no data row".to_string(),
            })
        }
        (Some(_), Some(_)) => {
            return Err(ExtractError::Cardinality {
                table: "primary",
                detail: format!("{} data rows, expected 1", 2 + primary_rows.len()),
            })
        }
    };
    if primary_row.len() != primary.columns.len() {
        return Err(ExtractError::Cardinality {
            table: "primary",
            detail: format!(
                "{} values for {} columns",
                primary_row.len(),
                primary.columns.len()
            ),
        });
    }

    let mut detail_row = Vec::with_capacity(details.labels.len());
    for (label, mut values) in details.labels.iter().zip(details.values) {
        if values.len() != 1 {
            return Err(ExtractError::Cardinality {
                table: "details",
                detail: format!("row {:?} has {} values, expected 1", label, values.len()),
            });
        }
        detail_row.push(values.remove(0));
    }

    let primary_names: HashSet<&str> = primary.columns.iter().map(String::as_str).collect();
    let detail_names: HashSet<&str> = details.labels.iter().map(String::as_str).collect();

    let mut record = Record::new();
    for (column, value) in primary.columns.iter().zip(primary_row) {
        if detail_names.contains(column.as_str()) {
            record.push(format!("{}_x", column), value);
        } else {
            record.push(column.as_str(), value);
        }
    }
    for (label, value) in details.labels.iter().zip(detail_row) {
        if primary_names.contains(label.as_str()) {
            record.push(format!("{}_y", label), value);
        } else {
            record.push(label.as_str(), value);
        }
    }
    Ok(Outcome::Record(record))
}
