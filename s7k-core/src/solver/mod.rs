//! Bathymetry solver
//!
//! Turns one ping's detections into depth, across track and along track
//! positions relative to the sonar reference point at transmit time.
//!
//! Per beam:
//!
//! 1. take travel time and steering from the ping's [`DetectionSource`]
//! 2. look up vessel attitude at transmit time and at the beam's
//!    bottom-return time
//! 3. fold reverse-mounted arrays back to forward mounts
//! 4. optionally rescale steering for a sound speed change
//! 5. intersect the transmit and receive cones to get the takeoff angles
//! 6. project the slant range onto depth and horizontal offsets
//!
//! Quality follows the epoch of the core record, see [`quality`].

pub mod detection;
pub mod orientation;
pub mod quality;

use serde::{Deserialize, Serialize};

pub use crate::error::SolveError;
pub use detection::{BeamDetection, DetectionSource};
pub use orientation::{line_of_sight, snell_rescale, Orientation, SteeredArray, TakeoffAngles};
pub use quality::{QualityEpoch, QualityFlags};

use crate::config::ProcessingConfig;
use crate::geometry::InstallationGeometry;
use crate::history::{GeoPosition, Motion, NavAttitudeSource};
use crate::ping::{PingAggregate, PresenceFlags};
use crate::protocol::sonar::{OptionalBathymetry, OptionalBeam};

/// Sound speed when no record supplies one (m/s)
pub const DEFAULT_SOUND_SPEED: f64 = 1500.0;

/// Where the vessel attitude came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttitudeMode {
    /// Interpolated from history at each beam's own time
    Interpolated,
    /// One value for the whole ping, from the ping's own records
    PingTime,
    /// Nothing available; level and steady assumed
    Zero,
}

/// Geometry of one beam (metres, radians)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeamSolution {
    /// Below the surface, positive down
    pub depth: f64,
    /// Starboard positive
    pub across_track: f64,
    /// Forward positive
    pub along_track: f64,
    pub pointing_angle: f64,
    pub azimuth: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolvedBeam {
    pub beam_number: usize,
    pub two_way_time: f64,
    pub quality: QualityFlags,
    /// `None` when the beam is NULL
    pub solution: Option<BeamSolution>,
}

impl SolvedBeam {
    fn null(beam_number: usize, two_way_time: f64, quality: QualityFlags) -> Self {
        SolvedBeam {
            beam_number,
            two_way_time,
            quality: quality | QualityFlags::NULL,
            solution: None,
        }
    }

    /// Geometry of a beam nobody rejected
    pub fn good(&self) -> Option<&BeamSolution> {
        if self.quality.is_good() {
            self.solution.as_ref()
        } else {
            None
        }
    }
}

/// Solved ping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolvedBathymetry {
    pub source: DetectionSource,
    pub epoch: QualityEpoch,
    pub attitude_mode: AttitudeMode,
    /// Sound speed used for ranges (m/s)
    pub sound_speed: f64,
    /// Sensor depth plus draft (m)
    pub sensor_depth: f64,
    /// Vessel heading at transmit (radians)
    pub heading: f64,
    /// Vessel motion at transmit
    pub motion: Motion,
    pub beams: Vec<SolvedBeam>,
}

impl SolvedBathymetry {
    pub fn good_beams(&self) -> impl Iterator<Item = &BeamSolution> + '_ {
        self.beams.iter().filter_map(SolvedBeam::good)
    }

    pub fn good_count(&self) -> usize {
        self.good_beams().count()
    }

    /// Median depth over good beams
    pub fn median_depth(&self) -> Option<f64> {
        let mut depths: Vec<f64> = self.good_beams().map(|b| b.depth).collect();
        if depths.is_empty() {
            return None;
        }
        depths.sort_by(f64::total_cmp);
        let mid = depths.len() / 2;
        Some(if depths.len() % 2 == 0 {
            0.5 * (depths[mid - 1] + depths[mid])
        } else {
            depths[mid]
        })
    }

    pub fn depth_range(&self) -> Option<(f64, f64)> {
        self.good_beams().map(|b| b.depth).fold(None, |acc, d| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
        })
    }

    /// Solution in the layout of the 7006 optional data block
    pub fn to_optional(&self, frequency: f32, position: GeoPosition) -> OptionalBathymetry {
        OptionalBathymetry {
            frequency,
            latitude: position.latitude,
            longitude: position.longitude,
            heading: self.heading as f32,
            height_source: 0,
            tide: 0.0,
            roll: self.motion.roll as f32,
            pitch: self.motion.pitch as f32,
            heave: self.motion.heave as f32,
            vehicle_depth: self.sensor_depth as f32,
            beams: self
                .beams
                .iter()
                .map(|b| match &b.solution {
                    Some(s) => OptionalBeam {
                        depth: s.depth as f32,
                        alongtrack: s.along_track as f32,
                        acrosstrack: s.across_track as f32,
                        pointing_angle: s.pointing_angle as f32,
                        azimuth_angle: s.azimuth as f32,
                    },
                    None => OptionalBeam::default(),
                })
                .collect(),
        }
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// Sound speed at the transducer: 7006, then 7000, then 7610, then 1500
pub fn select_sound_speed(agg: &PingAggregate) -> f64 {
    let candidates = [
        (PresenceFlags::BATHYMETRY, agg.bathymetry.sound_velocity),
        (PresenceFlags::SONAR_SETTINGS, agg.sonar_settings.sound_velocity),
        (PresenceFlags::SOUND_VELOCITY, agg.sound_velocity.sound_velocity),
    ];
    candidates
        .iter()
        .find(|(flag, c)| agg.has(*flag) && c.is_finite() && *c > 0.0)
        .map(|(_, c)| f64::from(*c))
        .unwrap_or(DEFAULT_SOUND_SPEED)
}

/// Navigation carried by the ping itself
fn embedded(agg: &PingAggregate) -> Option<&OptionalBathymetry> {
    agg.bathymetry_optional
        .as_ref()
        .or(agg.raw_detection_optional.as_ref())
}

/// Attitude referenced to the ping time, from the ping's own records
fn ping_time_motion(agg: &PingAggregate) -> Option<Motion> {
    if let Some(o) = embedded(agg) {
        return Some(Motion {
            roll: f64::from(o.roll),
            pitch: f64::from(o.pitch),
            heave: f64::from(o.heave),
        });
    }
    if agg.has(PresenceFlags::ROLL_PITCH_HEAVE) {
        let m = &agg.roll_pitch_heave;
        return Some(Motion {
            roll: f64::from(m.roll),
            pitch: f64::from(m.pitch),
            heave: f64::from(m.heave),
        });
    }
    if agg.has(PresenceFlags::ATTITUDE) {
        return agg.attitude.samples.last().map(|s| Motion {
            roll: f64::from(s.roll),
            pitch: f64::from(s.pitch),
            heave: f64::from(s.heave),
        });
    }
    None
}

fn ping_time_heading(agg: &PingAggregate) -> Option<f64> {
    if let Some(o) = embedded(agg) {
        return Some(f64::from(o.heading));
    }
    if agg.has(PresenceFlags::HEADING) {
        Some(f64::from(agg.heading.heading))
    } else if agg.has(PresenceFlags::NAVIGATION) {
        Some(f64::from(agg.navigation.heading))
    } else if agg.has(PresenceFlags::ATTITUDE) {
        agg.attitude.samples.last().map(|s| f64::from(s.heading))
    } else {
        None
    }
}

/// Attitude and heading lookups with the ping-time fallback applied
struct VesselMotion<'a, N> {
    nav: &'a N,
    interpolate: bool,
    motion: Motion,
    heading: f64,
    zero_attitude: bool,
}

impl<'a, N: NavAttitudeSource> VesselMotion<'a, N> {
    fn new(agg: &PingAggregate, nav: &'a N, config: &ProcessingConfig) -> (Self, AttitudeMode) {
        let interpolate = nav.attitude_samples() >= config.min_history_samples
            && nav.heading_samples() >= config.min_history_samples;
        let fallback = ping_time_motion(agg);
        let mode = if interpolate {
            AttitudeMode::Interpolated
        } else if fallback.is_some() {
            AttitudeMode::PingTime
        } else {
            AttitudeMode::Zero
        };
        (
            VesselMotion {
                nav,
                interpolate,
                motion: fallback.unwrap_or_default(),
                heading: ping_time_heading(agg).unwrap_or(0.0),
                zero_attitude: config.zero_attitude_correction,
            },
            mode,
        )
    }

    fn motion(&self, t: f64) -> Motion {
        let mut m = if self.interpolate {
            self.nav.attitude(t).unwrap_or(self.motion)
        } else {
            self.motion
        };
        if self.zero_attitude {
            m.roll = 0.0;
            m.pitch = 0.0;
        }
        m
    }

    fn heading(&self, t: f64) -> f64 {
        if self.interpolate {
            self.nav.heading(t).unwrap_or(self.heading)
        } else {
            self.heading
        }
    }
}

// =============================================================================
// Solve
// =============================================================================

/// Solve the aggregate's current ping
///
/// Beams without a detection, with a non-positive travel time or whose
/// cones don't intersect come back NULL with no solution; the rest of the
/// ping is still solved.
pub fn solve<N: NavAttitudeSource>(
    agg: &PingAggregate,
    nav: &N,
    geometry: &InstallationGeometry,
    config: &ProcessingConfig,
) -> Result<SolvedBathymetry, SolveError> {
    if !agg.is_complete() {
        return Err(SolveError::MissingCoreRecord);
    }
    let t0 = agg.ping_time().ok_or(SolveError::InvalidPingTime)?;

    let header = &agg.bathymetry_header;
    let epoch = QualityEpoch::classify(header.version, header.time.year);
    let source = DetectionSource::select(agg);
    let detections = source.detections(agg, agg.bathymetry.number_beams());
    let sound_speed = select_sound_speed(agg);

    let (vessel, attitude_mode) = VesselMotion::new(agg, nav, config);
    let heading = vessel.heading(t0);
    let tx_motion = vessel.motion(t0);
    let sensor_depth = nav
        .sensor_depth(t0)
        .ok()
        .or_else(|| embedded(agg).map(|o| f64::from(o.vehicle_depth)))
        .unwrap_or(0.0)
        + geometry.draft();

    let (tx_mount, tx_reversed) = geometry.transmit.normalised();
    let (rx_mount, rx_reversed) = geometry.receive.normalised();

    let mut unresolved = 0;
    let mut beams = Vec::with_capacity(detections.len());
    for (beam_number, detection) in detections.iter().enumerate() {
        let Some(d) = detection else {
            beams.push(SolvedBeam::null(beam_number, 0.0, QualityFlags::empty()));
            continue;
        };
        let t = d.two_way_time;
        let mut quality =
            epoch.classify_beam(d.raw_quality, t, d.signal_strength, config.min_signal_strength);
        if d.setup_rejected {
            quality |= QualityFlags::AUTO_FLAGGED;
        }
        if !quality.has_detection() || !t.is_finite() || t <= 0.0 {
            beams.push(SolvedBeam::null(beam_number, t, quality));
            continue;
        }

        let mut tx_steer = if config.zero_alongtrack_angle {
            0.0
        } else {
            d.tx_steer
        };
        let mut rx_steer = d.rx_steer;
        if tx_reversed {
            tx_steer = -tx_steer;
        }
        if rx_reversed {
            rx_steer = -rx_steer;
        }
        if let Some(ratio) = config.sound_speed_ratio {
            tx_steer = snell_rescale(tx_steer, ratio);
            rx_steer = snell_rescale(rx_steer, ratio);
        }

        let t_rx = t0 + t;
        let rx_motion = vessel.motion(t_rx);
        let tx = SteeredArray {
            alignment: tx_mount.alignment(),
            vessel: Orientation::new(tx_motion.roll, tx_motion.pitch, heading),
            steer: tx_steer,
        };
        let rx = SteeredArray {
            alignment: rx_mount.alignment(),
            vessel: Orientation::new(rx_motion.roll, rx_motion.pitch, vessel.heading(t_rx)),
            steer: rx_steer,
        };

        let Some(angles) = line_of_sight(&tx, &rx, heading) else {
            unresolved += 1;
            beams.push(SolvedBeam::null(beam_number, t, quality));
            continue;
        };

        let range = 0.5 * sound_speed * t;
        let horizontal = range * angles.pointing.sin();
        let vertical = range * angles.pointing.cos();
        let solution = BeamSolution {
            depth: vertical + sensor_depth - 0.5 * (tx_motion.heave + rx_motion.heave),
            across_track: horizontal * angles.azimuth.cos(),
            along_track: horizontal * angles.azimuth.sin(),
            pointing_angle: angles.pointing,
            azimuth: angles.azimuth,
        };
        if [solution.depth, solution.across_track, solution.along_track]
            .iter()
            .any(|v| !v.is_finite())
        {
            unresolved += 1;
            beams.push(SolvedBeam::null(beam_number, t, quality));
            continue;
        }
        beams.push(SolvedBeam {
            beam_number,
            two_way_time: t,
            quality,
            solution: Some(solution),
        });
    }

    if unresolved > 0 {
        log::warn!(
            "Ping {}: {} of {} beams have no resolvable geometry",
            agg.bathymetry.ping_number,
            unresolved,
            beams.len()
        );
    }

    Ok(SolvedBathymetry {
        source,
        epoch,
        attitude_mode,
        sound_speed,
        sensor_depth,
        heading,
        motion: tx_motion,
        beams,
    })
}
