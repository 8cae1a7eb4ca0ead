use crate::error::{ProcessingError, Result};

// ---------------------------------------------------------------------------
// CanonicalTable – dialect-independent numeric rows
// ---------------------------------------------------------------------------

/// Rows of finite numbers, all of the same width.
///
/// Serialised as comma-separated, `.`-decimal, LF-terminated UTF-8 text. The
/// first column is the x axis (wavenumber, 2θ, energy, optical delay…).
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTable {
    header: Option<Vec<String>>,
    rows: Vec<Vec<f64>>,
}

impl CanonicalTable {
    /// Build a table, rejecting ragged rows and non-finite values.
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(first) = rows.first() {
            let width = first.len();
            for (i, row) in rows.iter().enumerate() {
                if row.len() != width {
                    return Err(ProcessingError::decoding(format!(
                        "row {i} has {} fields, expected {width}",
                        row.len()
                    )));
                }
                if row.iter().any(|v| !v.is_finite()) {
                    let msg = format!("row {i} holds a non-finite value");
                    return Err(ProcessingError::decoding(msg));
                }
            }
        }
        Ok(Self { header: None, rows })
    }

    /// Two-column table from matching x and y slices.
    pub fn from_pairs(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(ProcessingError::decoding(format!(
                "x has {} values but y has {}",
                x.len(),
                y.len()
            )));
        }
        Self::new(x.iter().zip(y).map(|(&x, &y)| vec![x, y]).collect())
    }

    /// Attach a header line naming each column.
    pub fn with_header(mut self, header: &[&str]) -> Result<Self> {
        if let Some(width) = self.width() {
            if width != header.len() {
                return Err(ProcessingError::decoding(format!(
                    "header names {} columns, rows have {width}",
                    header.len()
                )));
            }
        }
        self.header = Some(header.iter().map(|h| h.to_string()).collect());
        Ok(self)
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Number of columns, `None` for an empty table.
    pub fn width(&self) -> Option<usize> {
        self.rows.first().map(Vec::len)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Copy out one column. Empty when `index` is out of range.
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows.iter().filter_map(|r| r.get(index).copied()).collect()
    }

    pub fn x(&self) -> Vec<f64> {
        self.column(0)
    }

    pub fn y(&self) -> Vec<f64> {
        self.column(1)
    }

    /// Encode as canonical CSV text.
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b',')
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        let encode = |e: csv::Error| ProcessingError::decoding(format!("writing CSV: {e}"));
        if let Some(header) = &self.header {
            writer.write_record(header).map_err(encode)?;
        }
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|v| format_number(*v)))
                .map_err(encode)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ProcessingError::decoding(format!("flushing CSV: {e}")))?;
        String::from_utf8(bytes).map_err(|e| ProcessingError::decoding(e.to_string()))
    }
}

/// Shortest round-trip representation that always carries a decimal point,
/// so `100` is written as `100.0`.
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_csv_keeps_decimal_points() {
        let table = CanonicalTable::from_pairs(&[100.0, 101.0], &[0.01, 0.02]).unwrap();
        assert_eq!(table.to_csv().unwrap(), "100.0,0.01\n101.0,0.02\n");
    }

    #[test]
    fn header_is_written_first() {
        let table = CanonicalTable::new(vec![vec![0.5, 1.25, -3.0]])
            .unwrap()
            .with_header(&["a", "b", "c"])
            .unwrap();
        assert_eq!(table.to_csv().unwrap(), "a,b,c\n0.5,1.25,-3.0\n");
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = CanonicalTable::new(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, ProcessingError::Decoding(_)));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        assert!(CanonicalTable::from_pairs(&[1.0], &[f64::NAN]).is_err());
    }

    #[test]
    fn header_width_must_match() {
        let table = CanonicalTable::from_pairs(&[1.0], &[2.0]).unwrap();
        assert!(table.with_header(&["only"]).is_err());
    }

    #[test]
    fn columns_are_copied_in_row_order() {
        let table = CanonicalTable::from_pairs(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).unwrap();
        assert_eq!(table.x(), vec![1.0, 2.0, 3.0]);
        assert_eq!(table.y(), vec![4.0, 5.0, 6.0]);
        assert!(table.column(5).is_empty());
    }
}
