//! Delimited (BCP) rendering and parsing of cache rows.

use std::io::Write;

use crate::config::Delimiters;
use crate::constants::bcp::{COLUMNS, TEXT_COLUMNS};
use crate::data::{CacheRecord, CacheRow};
use crate::errors::CacheError;
use crate::utils::format_age_bound;

/// Bulk-mode sink collaborator: receives cache rows in identifier order.
pub trait RecordSink {
    /// Append one row to the output.
    fn emit(&mut self, row: &CacheRow) -> Result<(), CacheError>;

    /// Flush buffered output once the last row has been emitted.
    fn finish(&mut self) -> Result<(), CacheError> {
        Ok(())
    }
}

impl RecordSink for Vec<CacheRow> {
    fn emit(&mut self, row: &CacheRow) -> Result<(), CacheError> {
        self.push(row.clone());
        Ok(())
    }
}

/// Writes cache rows as delimited records for an external bulk loader.
pub struct BcpWriter<W: Write> {
    writer: W,
    delimiters: Delimiters,
    written: usize,
}

impl<W: Write> BcpWriter<W> {
    /// Wrap `writer` using `delimiters`.
    pub fn new(writer: W, delimiters: Delimiters) -> Self {
        Self {
            writer,
            delimiters,
            written: 0,
        }
    }

    /// Records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for BcpWriter<W> {
    fn emit(&mut self, row: &CacheRow) -> Result<(), CacheError> {
        let line = format_row(row, &self.delimiters);
        self.writer.write_all(line.as_bytes())?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CacheError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Field values of `row` in column order; `None` marks a null.
pub fn row_fields(row: &CacheRow) -> Vec<Option<String>> {
    let r = &row.record;
    vec![
        Some(row.expression_key.to_string()),
        Some(r.assay_key.to_string()),
        Some(r.refs_key.to_string()),
        Some(r.assay_type_key.to_string()),
        r.genotype_key.map(|v| v.to_string()),
        Some(r.marker_key.to_string()),
        Some(r.structure_key.to_string()),
        r.emaps_key.map(|v| v.to_string()),
        r.stage_key.map(|v| v.to_string()),
        r.specimen_key.map(|v| v.to_string()),
        r.gel_lane_key.map(|v| v.to_string()),
        Some(flag(r.expressed)),
        Some(r.strength.clone()),
        Some(r.age.clone()),
        r.age_min.map(format_age_bound),
        r.age_max.map(format_age_bound),
        Some(flag(r.is_recombinase)),
        Some(flag(r.is_for_gxd)),
        Some(flag(r.has_image)),
        r.result_note.clone(),
    ]
}

fn flag(value: bool) -> String {
    let text = if value { "1" } else { "0" };
    text.to_string()
}

/// Render one delimited record, record delimiter included. Nulls are empty fields.
///
/// Text fields are passed through [`escape_field`], so a field never holds a raw
/// delimiter character.
pub fn format_row(row: &CacheRow, delimiters: &Delimiters) -> String {
    let mut line = row_fields(row)
        .into_iter()
        .zip(COLUMNS)
        .map(|(value, column)| match value {
            None => String::new(),
            Some(text) if TEXT_COLUMNS.contains(&column) => escape_field(&text, delimiters),
            Some(number) => number,
        })
        .collect::<Vec<_>>()
        .join(&delimiters.column);
    line.push_str(&delimiters.line);
    line
}

/// Backslash-escape a text field for a delimited record.
///
/// Backslash becomes `\\`; newline, carriage return and tab become `\n`, `\r`
/// and `\t`; any other character used by either delimiter gets a backslash
/// prefix. [`unescape_field`] reverses it.
pub fn escape_field(text: &str, delimiters: &Delimiters) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if delimiters.column.contains(ch) || delimiters.line.contains(ch) => {
                out.push('\\');
                out.push(ch);
            }
            ch => out.push(ch),
        }
    }
    out
}

/// Undo [`escape_field`].
pub fn unescape_field(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Parse one record written by `format_row` (without its record delimiter).
///
/// Fields are split on unescaped column delimiters; text fields are unescaped.
pub fn parse_row(
    line: &str,
    delimiters: &Delimiters,
    line_no: usize,
) -> Result<CacheRow, CacheError> {
    let fields = split_escaped(line, &delimiters.column);
    if fields.len() != COLUMNS.len() {
        return Err(CacheError::Parse {
            line: line_no,
            details: format!("expected {} fields, found {}", COLUMNS.len(), fields.len()),
        });
    }
    let mut cursor = FieldCursor {
        fields: &fields,
        pos: 0,
        line: line_no,
    };
    let expression_key = cursor.required_int()?;
    let record = CacheRecord {
        assay_key: cursor.required_int()?,
        refs_key: cursor.required_int()?,
        assay_type_key: cursor.required_int()?,
        genotype_key: cursor.optional_int()?,
        marker_key: cursor.required_int()?,
        structure_key: cursor.required_int()?,
        emaps_key: cursor.optional_int()?,
        stage_key: cursor.optional_int()?,
        specimen_key: cursor.optional_int()?,
        gel_lane_key: cursor.optional_int()?,
        expressed: cursor.flag()?,
        strength: cursor.text(),
        age: cursor.text(),
        age_min: cursor.optional_float()?,
        age_max: cursor.optional_float()?,
        is_recombinase: cursor.flag()?,
        is_for_gxd: cursor.flag()?,
        has_image: cursor.flag()?,
        result_note: cursor.optional_text(),
    };
    Ok(CacheRow::new(expression_key, record))
}

fn split_escaped(line: &str, delimiter: &str) -> Vec<String> {
    if delimiter.is_empty() {
        return vec![line.to_string()];
    }
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut rest = line;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('\\') {
            current.push('\\');
            if let Some(next) = after.chars().next() {
                current.push(next);
                rest = &after[next.len_utf8()..];
            } else {
                rest = after;
            }
        } else if let Some(after) = rest.strip_prefix(delimiter) {
            fields.push(std::mem::take(&mut current));
            rest = after;
        } else if let Some(ch) = rest.chars().next() {
            current.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }
    fields.push(current);
    fields
}

struct FieldCursor<'a> {
    fields: &'a [String],
    pos: usize,
    line: usize,
}

impl<'a> FieldCursor<'a> {
    fn next(&mut self) -> &'a str {
        let value = self.fields[self.pos].as_str();
        self.pos += 1;
        value
    }

    fn error(&self, details: String) -> CacheError {
        CacheError::Parse {
            line: self.line,
            details: format!("column {}: {}", COLUMNS[self.pos - 1], details),
        }
    }

    fn required_int(&mut self) -> Result<i64, CacheError> {
        let raw = self.next().to_string();
        raw.parse::<i64>()
            .map_err(|_| self.error(format!("'{raw}' is not an integer")))
    }

    fn optional_int(&mut self) -> Result<Option<i64>, CacheError> {
        let raw = self.next().to_string();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<i64>()
            .map(Some)
            .map_err(|_| self.error(format!("'{raw}' is not an integer")))
    }

    fn optional_float(&mut self) -> Result<Option<f64>, CacheError> {
        let raw = self.next().to_string();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<f64>()
            .map(Some)
            .map_err(|_| self.error(format!("'{raw}' is not a number")))
    }

    fn flag(&mut self) -> Result<bool, CacheError> {
        match self.next() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => {
                let other = other.to_string();
                Err(self.error(format!("'{other}' is not a 0/1 flag")))
            }
        }
    }

    fn text(&mut self) -> String {
        unescape_field(self.next())
    }

    fn optional_text(&mut self) -> Option<String> {
        let raw = self.next();
        if raw.is_empty() {
            None
        } else {
            Some(unescape_field(raw))
        }
    }
}
