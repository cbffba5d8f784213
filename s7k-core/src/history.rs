//! Navigation and attitude history
//!
//! The solver queries position, heading, attitude and sensor depth at
//! arbitrary times (transmit time, each beam's bottom-return time). Any
//! source implementing [`NavAttitudeSource`] can serve those queries;
//! [`NavAttitudeHistory`] is the append-only implementation a session fills
//! from the navigation records it sees.
//!
//! Times are seconds since the Unix epoch, angles radians.

use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use thiserror::Error;

use crate::protocol::{Record, RecordKind};

/// Query time not covered by the history
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum Extrapolated {
    #[error("no samples")]
    NoSamples,
    #[error("time {t:.3} outside samples {first:.3}..{last:.3}")]
    OutOfRange { t: f64, first: f64, last: f64 },
}

/// Geographic position (radians)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// Vessel motion at one instant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Motion {
    /// Port up positive
    pub roll: f64,
    /// Bow up positive
    pub pitch: f64,
    /// Up positive (m)
    pub heave: f64,
}

/// Source of navigation and attitude at a given time
pub trait NavAttitudeSource {
    fn position(&self, t: f64) -> Result<GeoPosition, Extrapolated>;
    fn heading(&self, t: f64) -> Result<f64, Extrapolated>;
    fn attitude(&self, t: f64) -> Result<Motion, Extrapolated>;
    /// Depth of the sensor below the surface (m)
    fn sensor_depth(&self, t: f64) -> Result<f64, Extrapolated>;
    /// Speed over ground (m/s)
    fn speed(&self, t: f64) -> Result<f64, Extrapolated>;
    fn attitude_samples(&self) -> usize;
    fn heading_samples(&self) -> usize;
}

/// Wrap an angle difference into (-π, π]
pub fn wrap_pi(a: f64) -> f64 {
    let mut a = a % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

/// Wrap a heading into [0, 2π)
pub fn wrap_two_pi(a: f64) -> f64 {
    let a = a % TAU;
    if a < 0.0 {
        a + TAU
    } else {
        a
    }
}

// =============================================================================
// Time series
// =============================================================================

/// Append-only series of time stamped samples
#[derive(Debug, Clone, Default)]
pub struct TimeSeries<T> {
    samples: Vec<(f64, T)>,
    /// How far past either end a query may be answered with the end sample
    tolerance: f64,
}

impl<T: Copy> TimeSeries<T> {
    pub fn new(tolerance: f64) -> Self {
        Self {
            samples: Vec::new(),
            tolerance,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<(f64, T)> {
        self.samples.last().copied()
    }

    /// Append a sample; samples older than the newest are dropped, a sample
    /// at the newest time replaces it
    pub fn push(&mut self, t: f64, value: T) {
        match self.samples.last_mut() {
            Some(last) if t < last.0 => {
                log::debug!("Dropping out of order sample at {:.3} (newest {:.3})", t, last.0);
            }
            Some(last) if t == last.0 => last.1 = value,
            _ => self.samples.push((t, value)),
        }
    }

    /// Value at `t`, interpolated between the bracketing samples by `lerp`
    pub fn at(&self, t: f64, lerp: impl Fn(&T, &T, f64) -> T) -> Result<T, Extrapolated> {
        let (first, last) = match (self.samples.first(), self.samples.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err(Extrapolated::NoSamples),
        };
        if t <= first.0 {
            return if first.0 - t <= self.tolerance {
                Ok(first.1)
            } else {
                Err(self.out_of_range(t))
            };
        }
        if t >= last.0 {
            return if t - last.0 <= self.tolerance {
                Ok(last.1)
            } else {
                Err(self.out_of_range(t))
            };
        }
        // first.0 < t < last.0, so idx is in 1..len
        let idx = self.samples.partition_point(|(st, _)| *st <= t);
        let (t0, v0) = &self.samples[idx - 1];
        let (t1, v1) = &self.samples[idx];
        let f = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
        Ok(lerp(v0, v1, f))
    }

    fn out_of_range(&self, t: f64) -> Extrapolated {
        Extrapolated::OutOfRange {
            t,
            first: self.samples.first().map(|s| s.0).unwrap_or(f64::NAN),
            last: self.samples.last().map(|s| s.0).unwrap_or(f64::NAN),
        }
    }
}

fn lerp(a: &f64, b: &f64, f: f64) -> f64 {
    a + (b - a) * f
}

fn lerp_heading(a: &f64, b: &f64, f: f64) -> f64 {
    wrap_two_pi(a + wrap_pi(b - a) * f)
}

fn lerp_position(a: &GeoPosition, b: &GeoPosition, f: f64) -> GeoPosition {
    GeoPosition {
        latitude: lerp(&a.latitude, &b.latitude, f),
        longitude: a.longitude + wrap_pi(b.longitude - a.longitude) * f,
    }
}

fn lerp_motion(a: &Motion, b: &Motion, f: f64) -> Motion {
    Motion {
        roll: lerp(&a.roll, &b.roll, f),
        pitch: lerp(&a.pitch, &b.pitch, f),
        heave: lerp(&a.heave, &b.heave, f),
    }
}

// =============================================================================
// History
// =============================================================================

/// Navigation and attitude collected from a record stream
#[derive(Debug, Clone, Default)]
pub struct NavAttitudeHistory {
    pub position: TimeSeries<GeoPosition>,
    pub heading: TimeSeries<f64>,
    pub attitude: TimeSeries<Motion>,
    pub sensor_depth: TimeSeries<f64>,
    pub speed: TimeSeries<f64>,
}

impl NavAttitudeHistory {
    /// Empty history answering queries up to `tolerance` seconds beyond
    /// either end of a series
    pub fn new(tolerance: f64) -> Self {
        Self {
            position: TimeSeries::new(tolerance),
            heading: TimeSeries::new(tolerance),
            attitude: TimeSeries::new(tolerance),
            sensor_depth: TimeSeries::new(tolerance),
            speed: TimeSeries::new(tolerance),
        }
    }

    /// Append whatever navigation the record carries; returns whether
    /// anything was added
    pub fn ingest(&mut self, record: &Record) -> bool {
        let Some(t) = record.header.time.timestamp() else {
            return false;
        };
        match &record.kind {
            RecordKind::Position(p) => {
                if !p.is_geographic() {
                    log::debug!("Ignoring grid position record {}", record.header.record_number);
                    return false;
                }
                self.position.push(
                    t - f64::from(p.latency),
                    GeoPosition {
                        latitude: p.latitude,
                        longitude: p.longitude,
                    },
                );
            }
            RecordKind::Navigation(n) => {
                self.position.push(
                    t,
                    GeoPosition {
                        latitude: n.latitude,
                        longitude: n.longitude,
                    },
                );
                self.heading.push(t, wrap_two_pi(f64::from(n.heading)));
                self.speed.push(t, f64::from(n.speed));
            }
            RecordKind::Heading(h) => self.heading.push(t, wrap_two_pi(f64::from(h.heading))),
            RecordKind::RollPitchHeave(m) => self.attitude.push(
                t,
                Motion {
                    roll: f64::from(m.roll),
                    pitch: f64::from(m.pitch),
                    heave: f64::from(m.heave),
                },
            ),
            RecordKind::Attitude(a) => {
                for s in &a.samples {
                    let ts = t + f64::from(s.time_offset_ms) / 1000.0;
                    self.attitude.push(
                        ts,
                        Motion {
                            roll: f64::from(s.roll),
                            pitch: f64::from(s.pitch),
                            heave: f64::from(s.heave),
                        },
                    );
                    self.heading.push(ts, wrap_two_pi(f64::from(s.heading)));
                }
            }
            RecordKind::Depth(d) if d.descriptor == 0 => {
                self.sensor_depth.push(t, f64::from(d.depth))
            }
            _ => return false,
        }
        true
    }
}

impl NavAttitudeSource for NavAttitudeHistory {
    fn position(&self, t: f64) -> Result<GeoPosition, Extrapolated> {
        self.position.at(t, lerp_position)
    }

    fn heading(&self, t: f64) -> Result<f64, Extrapolated> {
        self.heading.at(t, lerp_heading)
    }

    fn attitude(&self, t: f64) -> Result<Motion, Extrapolated> {
        self.attitude.at(t, lerp_motion)
    }

    fn sensor_depth(&self, t: f64) -> Result<f64, Extrapolated> {
        self.sensor_depth.at(t, lerp)
    }

    fn speed(&self, t: f64) -> Result<f64, Extrapolated> {
        self.speed.at(t, lerp)
    }

    fn attitude_samples(&self) -> usize {
        self.attitude.len()
    }

    fn heading_samples(&self) -> usize {
        self.heading.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::nav::{Attitude, AttitudeSample, Heading};
    use crate::protocol::{RecordHeader, RecordTime};

    fn record_at(t: f64, kind: RecordKind) -> Record {
        let time = RecordTime::from_timestamp(t).unwrap();
        Record::new(RecordHeader::new(0, time), kind)
    }

    #[test]
    fn test_wrap() {
        assert!((wrap_pi(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((wrap_two_pi(-0.1) - (TAU - 0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_linear_interpolation() {
        let mut s = TimeSeries::new(0.0);
        s.push(10.0, 1.0);
        s.push(20.0, 3.0);
        assert_eq!(s.at(15.0, lerp), Ok(2.0));
        assert_eq!(s.at(10.0, lerp), Ok(1.0));
        assert_eq!(s.at(20.0, lerp), Ok(3.0));
        assert!(matches!(s.at(25.0, lerp), Err(Extrapolated::OutOfRange { .. })));
        assert_eq!(TimeSeries::<f64>::new(1.0).at(0.0, lerp), Err(Extrapolated::NoSamples));
    }

    #[test]
    fn test_tolerance_holds_end_samples() {
        let mut s = TimeSeries::new(0.5);
        s.push(10.0, 1.0);
        s.push(11.0, 2.0);
        assert_eq!(s.at(11.4, lerp), Ok(2.0));
        assert_eq!(s.at(9.6, lerp), Ok(1.0));
        assert!(s.at(11.6, lerp).is_err());
    }

    #[test]
    fn test_append_only() {
        let mut s = TimeSeries::new(0.0);
        s.push(10.0, 1.0);
        s.push(5.0, 9.0);
        s.push(10.0, 2.0);
        assert_eq!(s.len(), 1);
        assert_eq!(s.last(), Some((10.0, 2.0)));
    }

    #[test]
    fn test_heading_crosses_north() {
        let mut s = TimeSeries::new(0.0);
        s.push(0.0, 350f64.to_radians());
        s.push(1.0, 10f64.to_radians());
        let h = s.at(0.5, lerp_heading).unwrap();
        assert!(h.to_degrees().abs() < 1e-9 || (h.to_degrees() - 360.0).abs() < 1e-9);
        let h = s.at(0.75, lerp_heading).unwrap();
        assert!((h.to_degrees() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_ingest_records() {
        let t0 = 1_500_000_000.0;
        let mut history = NavAttitudeHistory::new(0.0);
        assert!(history.ingest(&record_at(t0, RecordKind::Heading(Heading { heading: 1.0 }))));
        assert!(history.ingest(&record_at(
            t0,
            RecordKind::Attitude(Attitude {
                samples: vec![
                    AttitudeSample {
                        time_offset_ms: 0,
                        roll: 0.1,
                        heading: 1.0,
                        ..Default::default()
                    },
                    AttitudeSample {
                        time_offset_ms: 100,
                        roll: 0.2,
                        heading: 1.1,
                        ..Default::default()
                    },
                ],
            })
        )));
        assert_eq!(history.attitude_samples(), 2);
        assert_eq!(history.heading_samples(), 2);
        let m = history.attitude(t0 + 0.05).unwrap();
        assert!((m.roll - 0.15).abs() < 1e-6);
    }
}
