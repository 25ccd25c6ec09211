//! Tab-separated reader for the workflow's input resources.
//!
//! The first non-empty record is the header and every later record must have
//! exactly as many fields. A field wrapped in double quotes may contain tabs,
//! newlines and `""` escaped quotes. Unquoted fields are trimmed.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::mem;
use std::path::Path;

use crate::error::{Error, Result};

pub const DELIMITER: char = '\t';
const QUOTE: char = '"';

#[derive(Debug, Clone)]
pub struct TsvRow {
    /// 1-based line the record starts on, header included.
    pub line: usize,
    pub cells: Vec<String>,
}

impl TsvRow {
    pub fn get(&self, column: usize) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    fn is_blank(&self) -> bool {
        matches!(self.cells.as_slice(), [only] if only.is_empty())
    }
}

/// A record the reader could not accept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct TsvError {
    pub line: usize,
    /// First field of the offending record, usually its id.
    pub first_cell: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct TsvTable {
    columns: HashMap<String, usize>,
    rows: Vec<TsvRow>,
}

impl TsvTable {
    pub fn parse(content: &str) -> std::result::Result<Self, TsvError> {
        let mut records = split_records(content)?.into_iter().filter(|r| !r.is_blank());
        let Some(header) = records.next() else { return Ok(Self::default()) };
        let width = header.cells.len();
        let columns = header.cells.into_iter().enumerate().map(|(i, name)| (name, i)).collect();

        let rows = records
            .map(|row| {
                if row.cells.len() == width {
                    Ok(row)
                } else {
                    Err(TsvError {
                        line: row.line,
                        reason: format!("expected {width} fields, found {}", row.cells.len()),
                        first_cell: row.cells.into_iter().next().unwrap_or_default(),
                    })
                }
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { columns, rows })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.get(name).copied()
    }

    pub fn rows(&self) -> &[TsvRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read a whole resource. A missing file is `SourceNotFound`.
pub fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::SourceNotFound { path: path.to_path_buf() },
        _ => Error::Operation(format!("failed to read {}: {}", path.display(), e)),
    })
}

/// Read and parse a TSV file; a rejected record is `MalformedRow`.
pub fn read_tsv(path: &Path) -> Result<TsvTable> {
    let content = read_source(path)?;
    TsvTable::parse(&content).map_err(|e| Error::MalformedRow {
        path: path.to_path_buf(),
        line: e.line,
        reason: e.reason,
    })
}

#[derive(Default)]
struct Field {
    text: String,
    quoted: bool,
}

impl Field {
    fn finish(&mut self) -> String {
        let field = mem::take(self);
        if field.quoted {
            field.text
        } else {
            field.text.trim().to_string()
        }
    }
}

fn split_records(content: &str) -> std::result::Result<Vec<TsvRow>, TsvError> {
    let mut rows = Vec::new();
    let mut cells = Vec::new();
    let mut field = Field::default();
    let mut in_quotes = false;
    let mut line = 1;
    let mut start = 1;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                QUOTE if chars.peek() == Some(&QUOTE) => {
                    chars.next();
                    field.text.push(QUOTE);
                }
                QUOTE => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.text.push(c);
                }
                _ => field.text.push(c),
            }
            continue;
        }
        match c {
            QUOTE if !field.quoted && field.text.trim().is_empty() => {
                field.text.clear();
                field.quoted = true;
                in_quotes = true;
            }
            DELIMITER => cells.push(field.finish()),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                cells.push(field.finish());
                rows.push(TsvRow { line: start, cells: mem::take(&mut cells) });
                line += 1;
                start = line;
            }
            // Whitespace after a closing quote is padding.
            c if field.quoted && c.is_whitespace() => {}
            _ => field.text.push(c),
        }
    }

    if in_quotes {
        cells.push(field.finish());
        return Err(TsvError {
            line: start,
            first_cell: cells.into_iter().next().unwrap_or_default(),
            reason: "unterminated quoted field".to_string(),
        });
    }
    if !cells.is_empty() || !field.text.is_empty() || field.quoted {
        cells.push(field.finish());
        rows.push(TsvRow { line: start, cells });
    }
    Ok(rows)
}
