//! Normalises instrument output files (FTIR, Raman, XRD, XRF, reflectance,
//! LIBS, THz-TDS) into canonical CSV and extracts spectral peaks or THz
//! optical constants from them.

pub mod config;
pub mod data;
pub mod error;
pub mod peaks;
pub mod processing;
pub mod store;
pub mod thz;

pub use config::{PeakConfig, ProcessorConfig};
pub use data::convert::{convert, Conversion};
pub use data::registry::{Dialect, Registry};
pub use data::table::CanonicalTable;
pub use error::{ProcessingError, RegistryError};
pub use peaks::{find_peaks, PeakSet};
pub use processing::{ProcessingOutcome, ProcessingReport, Processor, SpectraStore, Status};
pub use thz::{analyze, ThzResult};
