//! Beam line of sight from transmit and receive array orientation
//!
//! Body frame: x forward, y starboard, z down. An orientation is applied as
//! R = Rz(heading) · Ry(pitch) · Rx(roll) with roll port-up positive and
//! pitch bow-up positive.
//!
//! A steered array constrains the beam to a cone around the array axis:
//! the transmit array lies along x, the receive array along y, and a beam
//! steered by `s` satisfies `u · axis = sin(s)`. The beam direction is the
//! downward intersection of the transmit and receive cones.
//!
//! ```text
//!          tx axis
//!            ^     u (beam)
//!            |    /
//!            |   /      u·tx = sin(tx_steer)
//!            |  /       u·rx = sin(rx_steer)
//!            | /        u·z  > 0
//!            +---------> rx axis
//! ```

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

type Vec3 = Vector3<f64>;
type Rot3 = Rotation3<f64>;

/// Cones closer to parallel than this have no usable intersection
const MIN_CONE_SEPARATION: f64 = 1e-9;

/// Roll, pitch and heading (radians)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub roll: f64,
    pub pitch: f64,
    pub heading: f64,
}

impl Orientation {
    pub fn new(roll: f64, pitch: f64, heading: f64) -> Self {
        Self {
            roll,
            pitch,
            heading,
        }
    }

    fn rotation(&self) -> Rot3 {
        Rot3::from_euler_angles(self.roll, self.pitch, self.heading)
    }
}

/// One array at one instant: its mount alignment, the vessel orientation
/// and the applied steering angle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SteeredArray {
    pub alignment: Orientation,
    pub vessel: Orientation,
    pub steer: f64,
}

impl SteeredArray {
    fn axis(&self, body_axis: Vec3) -> Vec3 {
        self.vessel.rotation() * self.alignment.rotation() * body_axis
    }
}

/// Beam direction relative to the reference heading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TakeoffAngles {
    /// Angle from vertical (radians)
    pub pointing: f64,
    /// Angle from the starboard axis towards forward (radians)
    pub azimuth: f64,
}

/// Intersect the transmit and receive cones
///
/// Returns `None` when the cones don't intersect below the arrays or the
/// result isn't finite.
pub fn line_of_sight(
    tx: &SteeredArray,
    rx: &SteeredArray,
    reference_heading: f64,
) -> Option<TakeoffAngles> {
    let tx_axis = tx.axis(Vec3::x());
    let rx_axis = rx.axis(Vec3::y());

    let s1 = tx.steer.sin();
    let s2 = rx.steer.sin();
    let d = tx_axis.dot(&rx_axis);
    let det = 1.0 - d * d;
    if det < MIN_CONE_SEPARATION {
        return None;
    }

    let a = (s1 - d * s2) / det;
    let b = (s2 - d * s1) / det;
    let c2 = (1.0 - a * a - b * b - 2.0 * a * b * d) / det;
    if c2.is_nan() || c2 < -MIN_CONE_SEPARATION {
        return None;
    }

    let c = c2.max(0.0).sqrt();
    let normal = tx_axis.cross(&rx_axis);
    let mut u = a * tx_axis + b * rx_axis + c * normal;
    if u.z < 0.0 {
        u -= 2.0 * c * normal;
    }
    if u.z < 0.0 {
        return None;
    }

    let u = Rot3::from_euler_angles(0.0, 0.0, -reference_heading) * u;
    let pointing = u.z.clamp(-1.0, 1.0).acos();
    let azimuth = u.x.atan2(u.y);
    if !pointing.is_finite() || !azimuth.is_finite() {
        return None;
    }
    Some(TakeoffAngles { pointing, azimuth })
}

/// Rescale a steering angle for a changed sound speed at the array (Snell)
pub fn snell_rescale(angle: f64, ratio: f64) -> f64 {
    (ratio * angle.sin()).clamp(-1.0, 1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(steer: f64) -> SteeredArray {
        SteeredArray {
            steer,
            ..Default::default()
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_nadir() {
        let t = line_of_sight(&level(0.0), &level(0.0), 0.0).unwrap();
        assert!(close(t.pointing, 0.0));
    }

    #[test]
    fn test_receive_steering_goes_across_track() {
        let s = 30f64.to_radians();
        let t = line_of_sight(&level(0.0), &level(s), 0.0).unwrap();
        assert!(close(t.pointing, s));
        assert!(close(t.azimuth, 0.0));

        let t = line_of_sight(&level(0.0), &level(-s), 0.0).unwrap();
        assert!(close(t.pointing, s));
        assert!(close(t.azimuth.abs(), std::f64::consts::PI));
    }

    #[test]
    fn test_transmit_steering_goes_along_track() {
        let s = 10f64.to_radians();
        let t = line_of_sight(&level(s), &level(0.0), 0.0).unwrap();
        assert!(close(t.pointing, s));
        assert!(close(t.azimuth, std::f64::consts::FRAC_PI_2));
    }

    #[test]
    fn test_roll_moves_beam_to_port() {
        let roll = 5f64.to_radians();
        let rx = SteeredArray {
            vessel: Orientation::new(roll, 0.0, 0.0),
            ..Default::default()
        };
        let tx = SteeredArray {
            vessel: Orientation::new(roll, 0.0, 0.0),
            ..Default::default()
        };
        let t = line_of_sight(&tx, &rx, 0.0).unwrap();
        assert!(close(t.pointing, roll));
        // starboard down tilts an unsteered beam to port
        assert!(close(t.azimuth.abs(), std::f64::consts::PI));

        // steering by the roll angle brings it back to nadir
        let rx = SteeredArray { steer: roll, ..rx };
        let t = line_of_sight(&tx, &rx, 0.0).unwrap();
        assert!(close(t.pointing, 0.0));
    }

    #[test]
    fn test_heading_cancels_with_reference() {
        let heading = 1.2;
        let s = 20f64.to_radians();
        let at = |steer| SteeredArray {
            vessel: Orientation::new(0.0, 0.0, heading),
            steer,
            ..Default::default()
        };
        let t = line_of_sight(&at(0.0), &at(s), heading).unwrap();
        assert!(close(t.pointing, s));
        assert!(close(t.azimuth, 0.0));
    }

    #[test]
    fn test_unresolvable() {
        // both cones at 60 degrees can't meet on the unit sphere
        let s = 60f64.to_radians();
        assert!(line_of_sight(&level(s), &level(s), 0.0).is_none());
    }

    #[test]
    fn test_snell() {
        let a = 0.3;
        assert!(close(snell_rescale(a, 1.0), a));
        assert!(snell_rescale(a, 1.1) > a);
        assert!(close(snell_rescale(1.5, 10.0), std::f64::consts::FRAC_PI_2));
    }
}
