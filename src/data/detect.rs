use std::io::{BufRead, Cursor, Seek, SeekFrom};

use super::registry::{CompiledDialect, Registry};
use crate::error::{ProcessingError, Result};

/// Find the dialect of a decoded text buffer.
///
/// Dialects are tried in registry order. A dialect matches when each of its
/// line matchers accepts the corresponding leading line (whitespace-stripped);
/// a buffer shorter than the matcher list never matches. The buffer is rewound
/// to its start before returning, whatever the outcome.
pub fn detect<'r, R: BufRead + Seek>(
    registry: &'r Registry,
    buffer: &mut R,
) -> Result<&'r CompiledDialect> {
    let outcome = first_match(registry, buffer);
    let rewind = buffer
        .seek(SeekFrom::Start(0))
        .map_err(|e| ProcessingError::decoding(format!("rewinding buffer: {e}")));
    let dialect = outcome?;
    rewind?;
    match dialect {
        Some(d) => {
            log::debug!("detected dialect {}", d.dialect);
            Ok(d)
        }
        None => Err(ProcessingError::UnsupportedFiletype),
    }
}

/// [`detect`] over an in-memory string.
pub fn detect_text<'r>(registry: &'r Registry, text: &str) -> Result<&'r CompiledDialect> {
    detect(registry, &mut Cursor::new(text.as_bytes()))
}

fn first_match<'r, R: BufRead + Seek>(
    registry: &'r Registry,
    buffer: &mut R,
) -> Result<Option<&'r CompiledDialect>> {
    for dialect in registry.iter() {
        buffer
            .seek(SeekFrom::Start(0))
            .map_err(|e| ProcessingError::decoding(format!("rewinding buffer: {e}")))?;
        let lines = leading_lines(buffer, dialect.matchers.len())?;
        if lines.len() < dialect.matchers.len() {
            continue;
        }
        let all_match = dialect
            .matchers
            .iter()
            .zip(&lines)
            .all(|(matcher, line)| matcher.is_match(line.trim()));
        if all_match {
            return Ok(Some(dialect));
        }
    }
    Ok(None)
}

fn leading_lines<R: BufRead>(buffer: &mut R, count: usize) -> Result<Vec<String>> {
    let mut lines = Vec::with_capacity(count);
    let mut line = String::new();
    while lines.len() < count {
        line.clear();
        let read = buffer
            .read_line(&mut line)
            .map_err(|e| ProcessingError::decoding(format!("reading line {}: {e}", lines.len())))?;
        if read == 0 {
            break;
        }
        lines.push(line.clone());
    }
    Ok(lines)
}
