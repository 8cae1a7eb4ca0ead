use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Processor configuration
// ---------------------------------------------------------------------------

/// Tunables of the processor, loadable from a JSON file.
///
/// ```json
/// { "peaks": { "min_height": 0.03, "max_rank": 40 } }
/// ```
///
/// Missing fields fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub peaks: PeakConfig,
}

impl ProcessorConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.peaks.validate()?;
        Ok(config)
    }
}

/// Peak detection and filtering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// A candidate must dominate this many samples on each side.
    pub lookahead: usize,
    /// Highest persistence rank reported.
    pub max_rank: usize,
    /// Noise floor on the max-normalised signal.
    pub min_height: f64,
    /// Bilateral denoising window, in samples.
    pub denoise_window: usize,
    /// Bilateral range kernel width, in normalised intensity.
    pub sigma_range: f64,
    /// Bilateral spatial kernel width, in samples.
    pub sigma_spatial: f64,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            lookahead: 2,
            max_rank: 40,
            min_height: 0.005,
            denoise_window: 3,
            sigma_range: 0.1,
            sigma_spatial: 1.0,
        }
    }
}

impl PeakConfig {
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.min_height.is_finite(), "peaks.min_height must be finite");
        anyhow::ensure!(
            self.sigma_range > 0.0 && self.sigma_spatial > 0.0,
            "bilateral sigmas must be positive"
        );
        anyhow::ensure!(self.denoise_window % 2 == 1, "peaks.denoise_window must be odd");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ProcessorConfig::from_json(r#"{"peaks": {"min_height": 0.03}}"#).unwrap();
        assert_eq!(config.peaks.min_height, 0.03);
        assert_eq!(config.peaks.max_rank, 40);
        assert_eq!(config.peaks.lookahead, 2);
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(ProcessorConfig::from_json("{}").unwrap(), ProcessorConfig::default());
    }

    #[test]
    fn even_window_is_rejected() {
        assert!(ProcessorConfig::from_json(r#"{"peaks": {"denoise_window": 4}}"#).is_err());
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"peaks": {"max_rank": 10}}"#).unwrap();
        assert_eq!(ProcessorConfig::from_file(&path).unwrap().peaks.max_rank, 10);
    }
}
