use std::fmt;
use std::ops::Range;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;

use crate::error::RegistryError;

// ---------------------------------------------------------------------------
// Dialect catalogue
// ---------------------------------------------------------------------------

/// Every instrument file format the processor understands.
///
/// Detection walks [`Dialect::ALL`] front to back and the first dialect whose
/// line matchers all succeed wins, so the order of this list is part of the
/// contract: dialects sharing a matcher prefix are disambiguated by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Dialect {
    #[serde(rename = "libs.spectable")]
    LibsSpectable,
    #[serde(rename = "libs.spec")]
    LibsSpec,
    #[serde(rename = "reflectance.mon")]
    ReflectanceMon,
    #[serde(rename = "reflectance.csv")]
    ReflectanceCsv,
    #[serde(rename = "raman.txt")]
    RamanTxt,
    #[serde(rename = "ftir.dpt")]
    FtirDpt,
    #[serde(rename = "xrd.txt")]
    XrdTxt,
    #[serde(rename = "xrf.txt")]
    XrfTxt,
    #[serde(rename = "xrf.dat")]
    XrfDat,
    #[serde(rename = "xrd.xy")]
    XrdXy,
    #[serde(rename = "thz.txt")]
    ThzTxt,
}

impl Dialect {
    pub const ALL: [Dialect; 11] = [
        Dialect::LibsSpectable,
        Dialect::LibsSpec,
        Dialect::ReflectanceMon,
        Dialect::ReflectanceCsv,
        Dialect::RamanTxt,
        Dialect::FtirDpt,
        Dialect::XrdTxt,
        Dialect::XrfTxt,
        Dialect::XrfDat,
        Dialect::XrdXy,
        Dialect::ThzTxt,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Dialect::LibsSpectable => "libs.spectable",
            Dialect::LibsSpec => "libs.spec",
            Dialect::ReflectanceMon => "reflectance.mon",
            Dialect::ReflectanceCsv => "reflectance.csv",
            Dialect::RamanTxt => "raman.txt",
            Dialect::FtirDpt => "ftir.dpt",
            Dialect::XrdTxt => "xrd.txt",
            Dialect::XrfTxt => "xrf.txt",
            Dialect::XrfDat => "xrf.dat",
            Dialect::XrdXy => "xrd.xy",
            Dialect::ThzTxt => "thz.txt",
        }
    }

    /// Static structural rules for this dialect.
    pub fn spec(self) -> FiletypeSpec {
        match self {
            Dialect::LibsSpectable => FiletypeSpec::delimited(
                &[
                    r"^Wavelenght[ \t]+Spectrum$",
                    r"^Integration delay[ \t]+[+-]?([0-9]*[,])?[0-9]+$",
                    r"^[+-]?([0-9]*[,])?[0-9]+\t[+-]?([0-9]*[,])?[0-9]+$",
                ],
                "\t",
                ",",
                SplitIndices::from(2),
            ),
            // The matcher accepts spaces as well as tabs between the fields,
            // so the delimiter has to as well.
            Dialect::LibsSpec => FiletypeSpec::delimited(
                &[
                    r"^[0-9]+$",
                    r"^[0-9]+$",
                    r"^[+-]?([0-9]*[,])?[0-9]+[ \t]+[+-]?([0-9]*[,])?[0-9]+$",
                ],
                r"[ \t]+",
                ",",
                SplitIndices::from(2),
            ),
            Dialect::ReflectanceMon => FiletypeSpec::delimited(
                &["^//Монохроматор: результаты регистрации$"],
                " +",
                r"\.",
                SplitIndices::between(14, -4),
            ),
            Dialect::ReflectanceCsv => FiletypeSpec::delimited(
                &[
                    r"^nm; ((%R)|A)$",
                    r"[+-]?([0-9]*[,])?[0-9]+; [+-]?([0-9]*[,])?[0-9]+",
                    r"[+-]?([0-9]*[,])?[0-9]+; [+-]?([0-9]*[,])?[0-9]+",
                ],
                "; ",
                ",",
                SplitIndices::from(1),
            ),
            Dialect::RamanTxt => FiletypeSpec::delimited(
                &[r"^[+-]?([0-9]*[.])?[0-9]+[\t][+-]?([0-9]*[.])?[0-9]+$"],
                "\t",
                r"\.",
                SplitIndices::from(0),
            ),
            Dialect::FtirDpt => FiletypeSpec::delimited(
                &[r"^[+-]?([0-9]*[.])?[0-9]+[,][+-]?([0-9]*[.])?[0-9]+$"],
                ",",
                r"\.",
                SplitIndices::from(0),
            ),
            Dialect::XrdTxt => FiletypeSpec::delimited(
                &[
                    r"^[+-]?([0-9]*[.])?[0-9]+ +[0-9]+$",
                    r"^[+-]?([0-9]*[.])?[0-9]+ +[0-9]+$",
                    r"^[+-]?([0-9]*[.])?[0-9]+ +[0-9]+$",
                ],
                " +",
                r"\.",
                SplitIndices::from(0),
            ),
            Dialect::XrfTxt => FiletypeSpec::delimited(
                &[
                    r"^[+-]?([0-9]*[.])?[0-9]+\t +[+-]?([0-9]*[.])?[0-9]+$",
                    r"^[+-]?([0-9]*[.])?[0-9]+\t +[+-]?([0-9]*[.])?[0-9]+$",
                    r"^[+-]?([0-9]*[.])?[0-9]+\t +[+-]?([0-9]*[.])?[0-9]+$",
                ],
                "[\t][ ]+",
                r"\.",
                SplitIndices::from(0),
            ),
            Dialect::XrfDat => FiletypeSpec {
                line_matchers: &[
                    r"^[+-]?([0-9]*[.])?[0-9]+ [+-]?([0-9]*[.])?[0-9]+$",
                    r"^[0-9]+$",
                    r"^[0-9]+$",
                ],
                method: Method::SingleColumn {
                    header_lines: 1,
                    domain: (0.0, 40.0),
                },
            },
            Dialect::XrdXy => FiletypeSpec::delimited(
                &[
                    r"^[+-]?([0-9]*[.])?[0-9]+ [+-]?([0-9]*[.])?[0-9]+$",
                    r"^[+-]?([0-9]*[.])?[0-9]+ [+-]?([0-9]*[.])?[0-9]+$",
                    r"^[+-]?([0-9]*[.])?[0-9]+ [+-]?([0-9]*[.])?[0-9]+$",
                ],
                " +",
                r"\.",
                SplitIndices::from(0),
            ),
            Dialect::ThzTxt => FiletypeSpec::delimited(
                &[
                    r"^[+-]?([0-9]*[,])?[0-9]+\t[+-]?([0-9]*[,])?[0-9]+$",
                    r"^[+-]?([0-9]*[,])?[0-9]+\t[+-]?([0-9]*[,])?[0-9]+$",
                    r"^[+-]?([0-9]*[,])?[0-9]+\t[+-]?([0-9]*[,])?[0-9]+$",
                ],
                "\t",
                ",",
                SplitIndices::from(0),
            ),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

// ---------------------------------------------------------------------------
// FiletypeSpec – raw, uncompiled rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FiletypeSpec {
    /// Patterns applied, in order, to the first `line_matchers.len()` stripped lines.
    pub line_matchers: &'static [&'static str],
    pub method: Method,
}

impl FiletypeSpec {
    fn delimited(
        line_matchers: &'static [&'static str],
        field_delimiter: &'static str,
        radix_point: &'static str,
        split: SplitIndices,
    ) -> Self {
        Self {
            line_matchers,
            method: Method::Delimited(DelimitedSpec {
                field_delimiter,
                radix_point,
                split,
                columns: &[0, 1],
            }),
        }
    }
}

/// How a matched buffer is turned into canonical rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    /// Amplitude-only files: the x axis is rebuilt over `domain`.
    SingleColumn {
        header_lines: usize,
        domain: (f64, f64),
    },
    Delimited(DelimitedSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DelimitedSpec {
    pub field_delimiter: &'static str,
    /// Decimal separator as written in the source file.
    pub radix_point: &'static str,
    pub split: SplitIndices,
    /// Parsed fields kept, in output order.
    pub columns: &'static [usize],
}

/// Header/body/footer boundaries in line numbers, Python-slice style:
/// negative values count from the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitIndices {
    pub start: isize,
    pub end: Option<isize>,
}

impl SplitIndices {
    pub const fn from(start: isize) -> Self {
        Self { start, end: None }
    }

    pub const fn between(start: isize, end: isize) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Resolve to the body line range of a buffer with `len` lines.
    pub fn body(&self, len: usize) -> Range<usize> {
        let resolve = |i: isize| -> usize {
            if i < 0 {
                len.saturating_sub(i.unsigned_abs())
            } else {
                (i as usize).min(len)
            }
        };
        let start = resolve(self.start);
        let end = self.end.map_or(len, resolve);
        start..end.max(start)
    }

    fn is_consistent(&self) -> bool {
        match self.end {
            None => true,
            Some(end) if (self.start >= 0) == (end >= 0) => end > self.start,
            // Mixed signs depend on the buffer length; only a negative start
            // with a positive end is unsatisfiable for long inputs.
            Some(_) => self.start >= 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Compiled registry
// ---------------------------------------------------------------------------

/// A dialect with its patterns compiled, ready for detection and conversion.
#[derive(Debug)]
pub struct CompiledDialect {
    pub dialect: Dialect,
    pub matchers: Vec<Regex>,
    pub method: CompiledMethod,
}

#[derive(Debug)]
pub enum CompiledMethod {
    SingleColumn {
        header_lines: usize,
        domain: (f64, f64),
    },
    Delimited {
        /// `(?P<delim>..)|(?P<radix>..)`: both substitutions in one pass.
        substitution: Regex,
        split: SplitIndices,
        columns: &'static [usize],
    },
}

/// Read-only catalogue of compiled dialects in detection order.
#[derive(Debug)]
pub struct Registry {
    dialects: Vec<CompiledDialect>,
}

static BUILTIN: OnceCell<Registry> = OnceCell::new();

impl Registry {
    /// Compile and validate every dialect in [`Dialect::ALL`].
    pub fn load() -> Result<Self, RegistryError> {
        Self::from_dialects(Dialect::ALL)
    }

    /// Process-wide registry, compiled on first use.
    pub fn builtin() -> Result<&'static Registry, RegistryError> {
        BUILTIN.get_or_try_init(Self::load)
    }

    pub fn from_dialects(
        dialects: impl IntoIterator<Item = Dialect>,
    ) -> Result<Self, RegistryError> {
        let dialects = dialects
            .into_iter()
            .map(|d| compile(d, d.spec()))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("dialect registry loaded with {} entries", dialects.len());
        Ok(Self { dialects })
    }

    /// Dialects in detection order.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledDialect> {
        self.dialects.iter()
    }

    pub fn get(&self, dialect: Dialect) -> Option<&CompiledDialect> {
        self.dialects.iter().find(|d| d.dialect == dialect)
    }

    pub fn len(&self) -> usize {
        self.dialects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialects.is_empty()
    }
}

/// Validate a spec and compile its patterns.
pub fn compile(dialect: Dialect, spec: FiletypeSpec) -> Result<CompiledDialect, RegistryError> {
    let name = dialect.id();
    if spec.line_matchers.is_empty() {
        return Err(RegistryError::NoLineMatchers(name));
    }
    let pattern = |p: &str| {
        Regex::new(p).map_err(|source| RegistryError::InvalidPattern {
            dialect: name,
            pattern: p.to_string(),
            source,
        })
    };
    let matchers = spec
        .line_matchers
        .iter()
        .map(|p| pattern(p))
        .collect::<Result<Vec<_>, _>>()?;

    let method = match spec.method {
        Method::SingleColumn {
            header_lines,
            domain,
        } => {
            if !(domain.0.is_finite() && domain.1.is_finite() && domain.0 < domain.1) {
                return Err(RegistryError::InvalidDomain(name));
            }
            CompiledMethod::SingleColumn {
                header_lines,
                domain,
            }
        }
        Method::Delimited(d) => {
            if !d.split.is_consistent() {
                return Err(RegistryError::InvalidSplit {
                    dialect: name,
                    start: d.split.start,
                    end: d.split.end,
                });
            }
            let distinct = d.columns.iter().enumerate().all(|(i, c)| !d.columns[..i].contains(c));
            if d.columns.len() < 2 || !distinct {
                return Err(RegistryError::InvalidColumns(name));
            }
            let combined = format!("(?P<delim>{})|(?P<radix>{})", d.field_delimiter, d.radix_point);
            CompiledMethod::Delimited {
                substitution: pattern(&combined)?,
                split: d.split,
                columns: d.columns,
            }
        }
    };

    Ok(CompiledDialect {
        dialect,
        matchers,
        method,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_loads_in_declared_order() {
        let registry = Registry::load().unwrap();
        let order: Vec<Dialect> = registry.iter().map(|d| d.dialect).collect();
        assert_eq!(order, Dialect::ALL.to_vec());
    }

    #[test]
    fn every_dialect_has_matchers() {
        for d in Dialect::ALL {
            assert!(!d.spec().line_matchers.is_empty(), "{d}");
        }
    }

    #[test]
    fn split_indices_follow_slice_semantics() {
        assert_eq!(SplitIndices::from(0).body(5), 0..5);
        assert_eq!(SplitIndices::from(2).body(5), 2..5);
        assert_eq!(SplitIndices::from(7).body(5), 5..5);
        assert_eq!(SplitIndices::between(14, -4).body(30), 14..26);
        assert_eq!(SplitIndices::between(14, -4).body(10), 10..10);
    }

    #[test]
    fn empty_matchers_are_rejected_at_load() {
        let spec = FiletypeSpec {
            line_matchers: &[],
            method: Dialect::FtirDpt.spec().method,
        };
        let err = compile(Dialect::FtirDpt, spec).unwrap_err();
        assert!(matches!(err, RegistryError::NoLineMatchers("ftir.dpt")));
    }

    #[test]
    fn inverted_split_is_rejected_at_load() {
        let spec = FiletypeSpec {
            line_matchers: &["^x$"],
            method: Method::Delimited(DelimitedSpec {
                field_delimiter: ",",
                radix_point: r"\.",
                split: SplitIndices::between(5, 2),
                columns: &[0, 1],
            }),
        };
        assert!(matches!(
            compile(Dialect::FtirDpt, spec),
            Err(RegistryError::InvalidSplit { .. })
        ));
    }

    #[test]
    fn duplicate_columns_are_rejected_at_load() {
        let spec = FiletypeSpec {
            line_matchers: &["^x$"],
            method: Method::Delimited(DelimitedSpec {
                field_delimiter: ",",
                radix_point: r"\.",
                split: SplitIndices::from(0),
                columns: &[1, 1],
            }),
        };
        assert!(matches!(
            compile(Dialect::FtirDpt, spec),
            Err(RegistryError::InvalidColumns("ftir.dpt"))
        ));
    }
}
