use std::borrow::Cow;

use regex::{Captures, Regex};

use super::detect::detect_text;
use super::encoding::decode;
use super::registry::{CompiledDialect, CompiledMethod, Dialect, Registry, SplitIndices};
use super::table::CanonicalTable;
use crate::error::{ProcessingError, Result};

/// A converted file together with the dialect it was recognised as.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub dialect: Dialect,
    pub table: CanonicalTable,
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Decode, detect and convert a raw instrument file.
pub fn convert(registry: &Registry, bytes: &[u8]) -> Result<Conversion> {
    let text = decode(bytes)?;
    convert_text(registry, &text)
}

/// Detect and convert already-decoded text.
pub fn convert_text(registry: &Registry, text: &str) -> Result<Conversion> {
    let dialect = detect_text(registry, text)?;
    let table = convert_with(dialect, text)?;
    log::debug!("converted {} rows as {}", table.len(), dialect.dialect);
    Ok(Conversion {
        dialect: dialect.dialect,
        table,
    })
}

/// Convert text known to be in `dialect`. Any bad line fails the whole file.
pub fn convert_with(dialect: &CompiledDialect, text: &str) -> Result<CanonicalTable> {
    match &dialect.method {
        CompiledMethod::SingleColumn {
            header_lines,
            domain,
        } => single_column(text, *header_lines, *domain),
        CompiledMethod::Delimited {
            substitution,
            split,
            columns,
        } => delimited(text, substitution, *split, columns),
    }
}

/// Name of the uploaded canonical file: `<stem>.csv`.
///
/// OPUS exports carry a numeric inner extension (`sample.0.dpt`) which is
/// dropped along with the outer one.
pub fn output_name(filename: &str) -> String {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    };
    let stem = match stem.rsplit_once('.') {
        Some((inner, ext))
            if !inner.is_empty() && !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_digit()) =>
        {
            inner
        }
        _ => stem,
    };
    format!("{stem}.csv")
}

// ---------------------------------------------------------------------------
// Single-column (amplitude only) files
// ---------------------------------------------------------------------------

fn single_column(text: &str, header_lines: usize, domain: (f64, f64)) -> Result<CanonicalTable> {
    let data: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .skip(header_lines)
        .collect();
    if data.len() < 2 {
        return Err(ProcessingError::decoding(format!(
            "single-column file needs at least two data lines, found {}",
            data.len()
        )));
    }

    let y = data
        .iter()
        .enumerate()
        .map(|(i, line)| parse_number(line, header_lines + i))
        .collect::<Result<Vec<f64>>>()?;

    // N data lines give N - 1 evenly spaced channels over the domain.
    let x = linspace(domain.0, domain.1, data.len() - 1);
    CanonicalTable::from_pairs(&x, &y[..x.len()])
}

/// `n` evenly spaced points from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// Delimited text files
// ---------------------------------------------------------------------------

fn delimited(
    text: &str,
    substitution: &Regex,
    split: SplitIndices,
    columns: &[usize],
) -> Result<CanonicalTable> {
    let lines: Vec<&str> = text.lines().collect();
    let body = split.body(lines.len());
    let first_line = body.start;

    let mut rows = Vec::with_capacity(body.len());
    for (offset, line) in lines[body].iter().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let normalized = normalize(substitution, line);
        let fields: Vec<&str> = normalized.split(',').map(str::trim).collect();
        let row = columns
            .iter()
            .map(|&c| {
                let field = fields.get(c).ok_or_else(|| {
                    log::debug!("line {}: {:?} has no column {c}", first_line + offset, line);
                    ProcessingError::decoding(format!(
                        "line {} has {} fields, column {c} requested",
                        first_line + offset,
                        fields.len()
                    ))
                })?;
                parse_number(field, first_line + offset)
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(ProcessingError::decoding("file has no data rows"));
    }
    CanonicalTable::new(rows)
}

/// Replace field delimiters with `,` and radix points with `.` in one pass,
/// so a comma that is a decimal separator is never read as a delimiter.
fn normalize<'a>(substitution: &Regex, line: &'a str) -> Cow<'a, str> {
    substitution.replace_all(line, |caps: &Captures| {
        if caps.name("delim").is_some() {
            ","
        } else {
            "."
        }
    })
}

fn parse_number(field: &str, line_no: usize) -> Result<f64> {
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => {
            log::debug!("line {line_no}: {field:?} is not a number");
            Err(ProcessingError::decoding(format!("line {line_no}: non-numeric field")))
        }
    }
}
