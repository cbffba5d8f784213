//! Processing configuration
//!
//! Every knob defaults to automatic or off. Loaded from JSON by the tool;
//! library users can build it directly.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::geometry::InstallationGeometry;
use crate::mosaic::{BackscatterSource, MosaicOptions};
use crate::protocol::codec::DEFAULT_FRAMER_LIMIT;
use crate::solver::quality::MIN_SIGNAL_STRENGTH;

/// Null runs up to this many pixels are interpolated
pub const DEFAULT_GAP_BOUND: usize = 1;

/// Fewest history samples for per-beam attitude interpolation
pub const DEFAULT_MIN_HISTORY_SAMPLES: usize = 2;

/// Seconds a history series may be held past either end
pub const DEFAULT_MAX_EXTRAPOLATION: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingConfig {
    /// Mosaic pixel size in metres; `None` adapts per ping
    pub pixel_size: Option<f64>,
    /// Mosaic half swath in degrees; `None` follows the beams
    pub swath_width: Option<f64>,
    /// Preferred backscatter source for the mosaic
    pub sidescan_source: Option<BackscatterSource>,
    /// Snell factor applied to steering angles
    pub sound_speed_ratio: Option<f64>,
    /// Ignore vessel roll and pitch
    pub zero_attitude_correction: bool,
    /// Force transmit steering to zero
    pub zero_alongtrack_angle: bool,
    pub gap_bound: usize,
    pub min_history_samples: usize,
    pub min_signal_strength: f64,
    pub max_extrapolation: f64,
    /// Attach a deep copy of the aggregate to every emitted ping
    pub snapshot_records: bool,
    /// Geometry to use instead of the stream's installation record
    pub installation: Option<InstallationGeometry>,
    /// Most bytes the framer may hold waiting for a record to complete
    pub framer_limit: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            pixel_size: None,
            swath_width: None,
            sidescan_source: None,
            sound_speed_ratio: None,
            zero_attitude_correction: false,
            zero_alongtrack_angle: false,
            gap_bound: DEFAULT_GAP_BOUND,
            min_history_samples: DEFAULT_MIN_HISTORY_SAMPLES,
            min_signal_strength: MIN_SIGNAL_STRENGTH,
            max_extrapolation: DEFAULT_MAX_EXTRAPOLATION,
            snapshot_records: false,
            installation: None,
            framer_limit: DEFAULT_FRAMER_LIMIT,
        }
    }
}

impl ProcessingConfig {
    pub fn from_json(s: &str) -> Result<Self, SessionError> {
        let config: ProcessingConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        let bad = |msg: String| Err(SessionError::Config(msg));
        if let Some(p) = self.pixel_size {
            if !(p.is_finite() && p > 0.0) {
                return bad(format!("pixel size {} must be positive", p));
            }
        }
        if let Some(w) = self.swath_width {
            if !(w.is_finite() && w > 0.0 && w < 90.0) {
                return bad(format!("swath width {} must be within (0, 90) degrees", w));
            }
        }
        if let Some(r) = self.sound_speed_ratio {
            if !(r.is_finite() && r > 0.0) {
                return bad(format!("sound speed ratio {} must be positive", r));
            }
        }
        if !(self.max_extrapolation.is_finite() && self.max_extrapolation >= 0.0) {
            return bad(format!(
                "max extrapolation {} must not be negative",
                self.max_extrapolation
            ));
        }
        if self.framer_limit == 0 {
            return bad("framer limit must not be zero".to_string());
        }
        Ok(())
    }

    pub fn mosaic_options(&self) -> MosaicOptions {
        MosaicOptions {
            pixel_size: self.pixel_size,
            swath_width: self.swath_width,
            source: self.sidescan_source,
            gap_bound: self.gap_bound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_automatic() {
        let c = ProcessingConfig::default();
        assert!(c.pixel_size.is_none());
        assert!(c.swath_width.is_none());
        assert!(c.sidescan_source.is_none());
        assert!(!c.zero_attitude_correction);
        assert_eq!(c.gap_bound, 1);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let c = ProcessingConfig::from_json(
            r#"{ "pixelSize": 0.25, "sidescanSource": "snippet", "zeroAlongtrackAngle": true }"#,
        )
        .unwrap();
        assert_eq!(c.pixel_size, Some(0.25));
        assert_eq!(c.sidescan_source, Some(BackscatterSource::Snippet));
        assert!(c.zero_alongtrack_angle);
        assert_eq!(c.min_history_samples, DEFAULT_MIN_HISTORY_SAMPLES);
    }

    #[test]
    fn test_installation_from_json() {
        let c = ProcessingConfig::from_json(
            r#"{ "installation": { "receive": { "z": 1.5, "heading": 3.14159 } } }"#,
        )
        .unwrap();
        let g = c.installation.unwrap();
        assert_eq!(g.receive.z, 1.5);
        assert!(g.receive.is_reversed());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            ProcessingConfig::from_json(r#"{ "pixelSize": -1.0 }"#),
            Err(SessionError::Config(_))
        ));
        assert!(matches!(
            ProcessingConfig::from_json(r#"{ "swathWidth": 95.0 }"#),
            Err(SessionError::Config(_))
        ));
        assert!(matches!(
            ProcessingConfig::from_json("{ not json"),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn test_mosaic_options() {
        let c = ProcessingConfig {
            swath_width: Some(60.0),
            gap_bound: 3,
            ..Default::default()
        };
        let o = c.mosaic_options();
        assert_eq!(o.swath_width, Some(60.0));
        assert_eq!(o.gap_bound, 3);
    }
}
