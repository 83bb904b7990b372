//! Writes an aggregated dataset to disk as JSON or CSV.
//!
//! JSON output is the record array verbatim, pretty-printed with two-space
//! indentation. CSV output is flattened:
//!   - the header is the key set of the first record, and later records are
//!     projected onto it (extra keys dropped, missing keys left blank)
//!   - nested objects and arrays become inline JSON text (`{"x": 1}`), with
//!     non-ASCII characters escaped (`"Caf\u00e9"`)
//!   - null becomes an empty cell
//!   - text loses zero-width spaces and has `\r`/`\n` turned into spaces
//!
//! If any text cell holds a character that cannot be carried through that
//! strict pass, the whole file is rendered again with every non-printable
//! character other than space and tab mapped to a space. U+FFFD counts as
//! non-printable: it marks text the decoder could not recover.

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{ExportFormat, ExportTarget};
use crate::contract::DatasetSink;
use crate::envelope::Record;
use crate::error::ExportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Written {
        path: PathBuf,
        records: usize,
        /// The CSV fallback pass was needed.
        lossy: bool,
    },
    /// CSV export of an empty dataset; nothing was written.
    SkippedEmpty,
}

pub fn export(records: &[Record], target: &ExportTarget) -> Result<ExportOutcome, ExportError> {
    info!(path = %target.path.display(), format = %target.format, "Saving data");
    let outcome = match target.format {
        ExportFormat::Json => export_json(records, &target.path)?,
        ExportFormat::Csv => export_csv(records, &target.path)?,
    };
    if let ExportOutcome::Written { path, records, lossy } = &outcome {
        info!(path = %path.display(), records, lossy, "Data saved");
    }
    Ok(outcome)
}

fn export_json(records: &[Record], path: &Path) -> Result<ExportOutcome, ExportError> {
    let mut writer = BufWriter::new(create_file(path)?);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"  ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
    records.serialize(&mut serializer)?;
    writer.flush().map_err(|source| io_error(path, source))?;
    Ok(ExportOutcome::Written {
        path: path.to_path_buf(),
        records: records.len(),
        lossy: false,
    })
}

fn export_csv(records: &[Record], path: &Path) -> Result<ExportOutcome, ExportError> {
    let Some(first) = records.first() else {
        warn!(path = %path.display(), "No data to save");
        return Ok(ExportOutcome::SkippedEmpty);
    };
    let fields: Vec<&str> = first.keys().map(String::as_str).collect();

    let (rows, lossy) = match render_rows(records, &fields, strict_cell) {
        Ok(rows) => (rows, false),
        Err(CellError::Json(e)) => return Err(e.into()),
        Err(CellError::Unencodable(failure)) => {
            warn!(
                path = %path.display(),
                error = %failure,
                "Error encoding characters, saving with character replacement"
            );
            (render_rows(records, &fields, lossy_cell)?, true)
        }
    };

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(create_file(path)?);
    writer.write_record(&fields)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush().map_err(|source| io_error(path, source))?;

    Ok(ExportOutcome::Written {
        path: path.to_path_buf(),
        records: rows.len(),
        lossy,
    })
}

fn create_file(path: &Path) -> Result<File, ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    File::create(path).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: io::Error) -> ExportError {
    ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A character the strict CSV pass refuses to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EncodingFailure(char);

impl fmt::Display for EncodingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot encode character U+{:04X}", u32::from(self.0))
    }
}

enum CellError {
    Unencodable(EncodingFailure),
    Json(serde_json::Error),
}

impl From<serde_json::Error> for CellError {
    fn from(e: serde_json::Error) -> Self {
        CellError::Json(e)
    }
}

fn render_rows<E>(
    records: &[Record],
    fields: &[&str],
    encode: impl Fn(&Value) -> Result<String, E>,
) -> Result<Vec<Vec<String>>, E> {
    records
        .iter()
        .map(|record| {
            fields
                .iter()
                .map(|field| match record.get(*field) {
                    Some(value) => encode(value),
                    None => Ok(String::new()),
                })
                .collect::<Result<Vec<String>, E>>()
        })
        .collect()
}

fn strict_cell(value: &Value) -> Result<String, CellError> {
    match value {
        Value::String(text) => strict_text(text).map_err(CellError::Unencodable),
        other => Ok(scalar_or_nested(other)?),
    }
}

fn lossy_cell(value: &Value) -> Result<String, serde_json::Error> {
    match value {
        Value::String(text) => Ok(lossy_text(text)),
        other => scalar_or_nested(other),
    }
}

fn scalar_or_nested(value: &Value) -> Result<String, serde_json::Error> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::Array(_) | Value::Object(_) => inline_json(value),
    }
}

fn strict_text(text: &str) -> Result<String, EncodingFailure> {
    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{200B}' => {}
            '\r' | '\n' => cleaned.push(' '),
            '\t' => cleaned.push(c),
            c if c.is_control() || is_invisible_format(c) || c == char::REPLACEMENT_CHARACTER => {
                return Err(EncodingFailure(c))
            }
            c => cleaned.push(c),
        }
    }
    Ok(cleaned)
}

fn lossy_text(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c == ' ' || c == '\t' || is_printable(c) {
                c
            } else {
                ' '
            }
        })
        .collect()
}

fn is_printable(c: char) -> bool {
    !(c.is_control()
        || c.is_whitespace()
        || is_invisible_format(c)
        || c == char::REPLACEMENT_CHARACTER)
}

/// Format and line/paragraph separator characters that render as nothing.
fn is_invisible_format(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{061C}'
            | '\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{2028}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{206F}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFB}'
    )
}

/// ASCII-only JSON text with `", "` and `": "` separators, e.g. `{"x": 1, "y": [1, 2]}`.
fn inline_json(value: &Value) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        let mut units = [0u16; 2];
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            if c.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            for unit in c.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + c.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Writes each named dataset to `doge_<name>_data.<ext>` under one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySink {
    format: ExportFormat,
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(format: ExportFormat, dir: impl Into<PathBuf>) -> Self {
        Self {
            format,
            dir: dir.into(),
        }
    }

    pub fn target_for(&self, name: &str) -> ExportTarget {
        ExportTarget::default_for(name, self.format, &self.dir)
    }
}

impl DatasetSink for DirectorySink {
    fn persist(&self, name: &str, records: &[Record]) -> Result<ExportOutcome, ExportError> {
        export(records, &self.target_for(name))
    }
}

