//! Installation geometry: where the arrays sit on the vessel and how they
//! are rotated
//!
//! Loaded once per session, either from configuration or from the first
//! installation record (7030) in the stream.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::history::wrap_pi;
use crate::protocol::sonar::{ArrayOffset, InstallationParameters};
use crate::solver::orientation::Orientation;

const ANGLE_EPSILON: f64 = 1e-9;

/// Offset and alignment of one array or sensor (metres, radians)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MountOffset {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub heading: f64,
}

impl MountOffset {
    /// Heading offset pointing the array backwards (strictly between 90°
    /// and 270°)
    pub fn is_reversed(&self) -> bool {
        wrap_pi(self.heading).abs() > PI / 2.0 + ANGLE_EPSILON
    }

    /// Rotation part of the mount
    pub fn alignment(&self) -> Orientation {
        Orientation::new(self.roll, self.pitch, self.heading)
    }

    /// Fold a reversed mount back to a forward one
    ///
    /// Heading is turned by 180°, roll and pitch offsets change sign; the
    /// caller must also invert the array's steering angles.
    pub fn normalised(&self) -> (MountOffset, bool) {
        if self.is_reversed() {
            (
                MountOffset {
                    heading: wrap_pi(self.heading - PI),
                    roll: -self.roll,
                    pitch: -self.pitch,
                    ..*self
                },
                true,
            )
        } else {
            (*self, false)
        }
    }
}

impl From<&ArrayOffset> for MountOffset {
    fn from(o: &ArrayOffset) -> Self {
        MountOffset {
            x: f64::from(o.x),
            y: f64::from(o.y),
            z: f64::from(o.z),
            roll: f64::from(o.roll),
            pitch: f64::from(o.pitch),
            heading: f64::from(o.heading),
        }
    }
}

/// Static geometry of a sonar installation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallationGeometry {
    pub transmit: MountOffset,
    pub receive: MountOffset,
    pub motion: MountOffset,
    /// Vertical offset from the reference point to the waterline
    pub waterline_z: f64,
}

impl InstallationGeometry {
    /// Depth of the receive array below the waterline
    pub fn draft(&self) -> f64 {
        self.receive.z - self.waterline_z
    }
}

impl From<&InstallationParameters> for InstallationGeometry {
    fn from(p: &InstallationParameters) -> Self {
        InstallationGeometry {
            transmit: MountOffset::from(&p.transmit),
            receive: MountOffset::from(&p.receive),
            motion: MountOffset::from(&p.motion),
            waterline_z: f64::from(p.waterline_z),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reversed_range() {
        let m = |deg: f64| MountOffset {
            heading: deg.to_radians(),
            ..Default::default()
        };
        assert!(!m(0.0).is_reversed());
        assert!(!m(90.0).is_reversed());
        assert!(m(91.0).is_reversed());
        assert!(m(180.0).is_reversed());
        assert!(m(269.0).is_reversed());
        assert!(!m(270.0).is_reversed());
        assert!(!m(-45.0).is_reversed());
    }

    #[test]
    fn test_normalised_flips_alignment() {
        let m = MountOffset {
            z: 2.0,
            roll: 0.1,
            pitch: -0.05,
            heading: PI + 0.01,
            ..Default::default()
        };
        let (n, reversed) = m.normalised();
        assert!(reversed);
        assert!((n.heading - 0.01).abs() < 1e-12);
        assert_eq!(n.roll, -0.1);
        assert_eq!(n.pitch, 0.05);
        assert_eq!(n.z, 2.0);
    }

    #[test]
    fn test_folded_mounts_see_the_same_sounding() {
        use crate::solver::orientation::{line_of_sight, SteeredArray};

        let vessel = Orientation::new(0.04, -0.02, 0.3);
        let tx = MountOffset {
            roll: 0.02,
            pitch: 0.03,
            heading: PI + 0.01,
            ..Default::default()
        };
        let rx = MountOffset {
            roll: -0.05,
            pitch: 0.01,
            heading: PI - 0.02,
            ..Default::default()
        };
        for (tx_steer, rx_steer) in [(0.0, 0.0), (0.05, -0.4), (-0.03, 0.7)] {
            let raw = line_of_sight(
                &SteeredArray {
                    alignment: tx.alignment(),
                    vessel,
                    steer: tx_steer,
                },
                &SteeredArray {
                    alignment: rx.alignment(),
                    vessel,
                    steer: rx_steer,
                },
                vessel.heading,
            )
            .unwrap();

            let (tx_n, _) = tx.normalised();
            let (rx_n, _) = rx.normalised();
            let folded = line_of_sight(
                &SteeredArray {
                    alignment: tx_n.alignment(),
                    vessel,
                    steer: -tx_steer,
                },
                &SteeredArray {
                    alignment: rx_n.alignment(),
                    vessel,
                    steer: -rx_steer,
                },
                vessel.heading,
            )
            .unwrap();

            assert!((raw.pointing - folded.pointing).abs() < 1e-9);
            assert!((raw.azimuth - folded.azimuth).abs() < 1e-9);
        }
    }

    #[test]
    fn test_from_installation_record() {
        let mut p = InstallationParameters::default();
        p.receive.z = 1.5;
        p.waterline_z = -0.5;
        let g = InstallationGeometry::from(&p);
        assert!((g.draft() - 2.0).abs() < 1e-6);
    }
}
