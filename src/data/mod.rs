//! Data layer: dialect registry, detection, conversion, canonical table.
//!
//! Architecture:
//! ```text
//!  raw instrument bytes
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ encoding  │  charset guess → text
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  detect   │  registry line matchers → Dialect
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ convert   │  split, normalise, select columns → CanonicalTable
//!   └──────────┘
//! ```

pub mod convert;
pub mod detect;
pub mod encoding;
pub mod registry;
pub mod table;
