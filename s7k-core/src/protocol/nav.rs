//! Navigation and sensor records (1000 series)
//!
//! Angles are radians, distances metres, latitude/longitude radians when the
//! record says the position is geographic.

use serde::{Deserialize, Serialize};

use super::codec::Payload;
use super::{count, len_u32, len_u8, ByteReader, ByteWriter};
use crate::error::CodecError;

// =============================================================================
// Record identifiers
// =============================================================================

pub const REFERENCE_POINT: u32 = 1000;
pub const UNCALIBRATED_SENSOR_OFFSET: u32 = 1001;
pub const CALIBRATED_SENSOR_OFFSET: u32 = 1002;
pub const POSITION: u32 = 1003;
pub const ALTITUDE: u32 = 1006;
pub const DEPTH: u32 = 1008;
pub const SOUND_VELOCITY_PROFILE: u32 = 1009;
pub const CTD: u32 = 1010;
pub const ROLL_PITCH_HEAVE: u32 = 1012;
pub const HEADING: u32 = 1013;
pub const NAVIGATION: u32 = 1015;
pub const ATTITUDE: u32 = 1016;

// =============================================================================
// 1000 / 1001 / 1002
// =============================================================================

/// Vehicle reference point relative to centre of gravity (1000)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Vertical offset from reference point to waterline
    pub water_z: f32,
}

impl Payload for ReferencePoint {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            x: r.f32()?,
            y: r.f32()?,
            z: r.f32()?,
            water_z: r.f32()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.f32(self.x);
        w.f32(self.y);
        w.f32(self.z);
        w.f32(self.water_z);
    }
}

/// Sensor offset, uncalibrated (1001) or calibrated (1002)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorOffset {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl Payload for SensorOffset {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            x: r.f32()?,
            y: r.f32()?,
            z: r.f32()?,
            roll: r.f32()?,
            pitch: r.f32()?,
            yaw: r.f32()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        for v in [self.x, self.y, self.z, self.roll, self.pitch, self.yaw] {
            w.f32(v);
        }
    }
}

// =============================================================================
// 1003 Position
// =============================================================================

/// Position fix (1003)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// 0 = WGS84
    pub datum: u32,
    /// Position sensor latency (seconds)
    pub latency: f32,
    /// Latitude (radians) or northing (metres)
    pub latitude: f64,
    /// Longitude (radians) or easting (metres)
    pub longitude: f64,
    pub height: f64,
    /// 0 = geographic, 1 = grid
    pub position_type: u8,
    pub utm_zone: u8,
    pub quality: u8,
    pub method: u8,
    pub satellites: u8,
}

impl Position {
    pub fn is_geographic(&self) -> bool {
        self.position_type == 0
    }
}

impl Payload for Position {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            datum: r.u32()?,
            latency: r.f32()?,
            latitude: r.f64()?,
            longitude: r.f64()?,
            height: r.f64()?,
            position_type: r.u8()?,
            utm_zone: r.u8()?,
            quality: r.u8()?,
            method: r.u8()?,
            satellites: r.u8()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.u32(self.datum);
        w.f32(self.latency);
        w.f64(self.latitude);
        w.f64(self.longitude);
        w.f64(self.height);
        w.u8(self.position_type);
        w.u8(self.utm_zone);
        w.u8(self.quality);
        w.u8(self.method);
        w.u8(self.satellites);
    }
}

// =============================================================================
// 1006 / 1008
// =============================================================================

/// Altitude above seafloor (1006)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Altitude {
    pub altitude: f32,
}

impl Payload for Altitude {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self { altitude: r.f32()? })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.f32(self.altitude);
    }
}

/// Sensor depth (1008)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Depth {
    /// 0 = depth to sensor, 1 = water depth below sensor
    pub descriptor: u8,
    /// 0 = raw, 1 = corrected for sound velocity
    pub correction: u8,
    pub reserved: u16,
    pub depth: f32,
}

impl Payload for Depth {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            descriptor: r.u8()?,
            correction: r.u8()?,
            reserved: r.u16()?,
            depth: r.f32()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.u8(self.descriptor);
        w.u8(self.correction);
        w.u16(self.reserved);
        w.f32(self.depth);
    }
}

// =============================================================================
// 1009 / 1010 profiles
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SvpSample {
    pub depth: f32,
    pub sound_velocity: f32,
}

/// Sound velocity profile (1009)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SoundVelocityProfile {
    pub position_flag: u8,
    pub reserved1: u8,
    pub reserved2: u16,
    pub latitude: f64,
    pub longitude: f64,
    pub samples: Vec<SvpSample>,
}

impl Payload for SoundVelocityProfile {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let position_flag = r.u8()?;
        let reserved1 = r.u8()?;
        let reserved2 = r.u16()?;
        let latitude = r.f64()?;
        let longitude = r.f64()?;
        let n = count(r.u32()?);
        r.check_count(n, 8)?;
        let mut samples = Vec::with_capacity(n);
        for _ in 0..n {
            samples.push(SvpSample {
                depth: r.f32()?,
                sound_velocity: r.f32()?,
            });
        }
        Ok(Self {
            position_flag,
            reserved1,
            reserved2,
            latitude,
            longitude,
            samples,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.u8(self.position_flag);
        w.u8(self.reserved1);
        w.u16(self.reserved2);
        w.f64(self.latitude);
        w.f64(self.longitude);
        w.u32(len_u32(self.samples.len()));
        for s in &self.samples {
            w.f32(s.depth);
            w.f32(s.sound_velocity);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CtdSample {
    /// Conductivity (S/m) or salinity (ppt), see `conductivity_flag`
    pub conductivity_salinity: f32,
    /// Water temperature (Celsius)
    pub temperature: f32,
    /// Pressure (Pascal) or depth (metres), see `pressure_flag`
    pub pressure_depth: f32,
    pub sound_velocity: f32,
    /// Absorption (dB/km)
    pub absorption: f32,
}

/// Conductivity-temperature-depth cast (1010)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Ctd {
    pub frequency: f32,
    pub velocity_source: u8,
    pub velocity_algorithm: u8,
    pub conductivity_flag: u8,
    pub pressure_flag: u8,
    pub position_flag: u8,
    pub validity: u8,
    pub reserved: u16,
    pub latitude: f64,
    pub longitude: f64,
    pub sample_rate: f32,
    pub samples: Vec<CtdSample>,
}

impl Payload for Ctd {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let frequency = r.f32()?;
        let velocity_source = r.u8()?;
        let velocity_algorithm = r.u8()?;
        let conductivity_flag = r.u8()?;
        let pressure_flag = r.u8()?;
        let position_flag = r.u8()?;
        let validity = r.u8()?;
        let reserved = r.u16()?;
        let latitude = r.f64()?;
        let longitude = r.f64()?;
        let sample_rate = r.f32()?;
        let n = count(r.u32()?);
        r.check_count(n, 20)?;
        let mut samples = Vec::with_capacity(n);
        for _ in 0..n {
            samples.push(CtdSample {
                conductivity_salinity: r.f32()?,
                temperature: r.f32()?,
                pressure_depth: r.f32()?,
                sound_velocity: r.f32()?,
                absorption: r.f32()?,
            });
        }
        Ok(Self {
            frequency,
            velocity_source,
            velocity_algorithm,
            conductivity_flag,
            pressure_flag,
            position_flag,
            validity,
            reserved,
            latitude,
            longitude,
            sample_rate,
            samples,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.f32(self.frequency);
        w.u8(self.velocity_source);
        w.u8(self.velocity_algorithm);
        w.u8(self.conductivity_flag);
        w.u8(self.pressure_flag);
        w.u8(self.position_flag);
        w.u8(self.validity);
        w.u16(self.reserved);
        w.f64(self.latitude);
        w.f64(self.longitude);
        w.f32(self.sample_rate);
        w.u32(len_u32(self.samples.len()));
        for s in &self.samples {
            w.f32(s.conductivity_salinity);
            w.f32(s.temperature);
            w.f32(s.pressure_depth);
            w.f32(s.sound_velocity);
            w.f32(s.absorption);
        }
    }
}

// =============================================================================
// Motion records
// =============================================================================

/// Roll, pitch and heave (1012)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RollPitchHeave {
    pub roll: f32,
    pub pitch: f32,
    pub heave: f32,
}

impl Payload for RollPitchHeave {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            roll: r.f32()?,
            pitch: r.f32()?,
            heave: r.f32()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.f32(self.roll);
        w.f32(self.pitch);
        w.f32(self.heave);
    }
}

/// Vessel heading (1013)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Heading {
    pub heading: f32,
}

impl Payload for Heading {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self { heading: r.f32()? })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.f32(self.heading);
    }
}

/// Navigation solution (1015)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Navigation {
    pub vertical_reference: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy: f32,
    pub vessel_height: f32,
    pub height_accuracy: f32,
    /// Speed over ground (m/s)
    pub speed: f32,
    pub course: f32,
    pub heading: f32,
}

impl Payload for Navigation {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            vertical_reference: r.u8()?,
            latitude: r.f64()?,
            longitude: r.f64()?,
            horizontal_accuracy: r.f32()?,
            vessel_height: r.f32()?,
            height_accuracy: r.f32()?,
            speed: r.f32()?,
            course: r.f32()?,
            heading: r.f32()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.u8(self.vertical_reference);
        w.f64(self.latitude);
        w.f64(self.longitude);
        w.f32(self.horizontal_accuracy);
        w.f32(self.vessel_height);
        w.f32(self.height_accuracy);
        w.f32(self.speed);
        w.f32(self.course);
        w.f32(self.heading);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AttitudeSample {
    /// Milliseconds after the record time stamp
    pub time_offset_ms: u16,
    pub roll: f32,
    pub pitch: f32,
    pub heave: f32,
    pub heading: f32,
}

/// Burst of attitude samples (1016)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attitude {
    pub samples: Vec<AttitudeSample>,
}

impl Payload for Attitude {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let n = count(r.u8()?);
        r.check_count(n, 18)?;
        let mut samples = Vec::with_capacity(n);
        for _ in 0..n {
            samples.push(AttitudeSample {
                time_offset_ms: r.u16()?,
                roll: r.f32()?,
                pitch: r.f32()?,
                heave: r.f32()?,
                heading: r.f32()?,
            });
        }
        Ok(Self { samples })
    }

    fn write(&self, w: &mut ByteWriter) {
        // count field is a single byte
        let n = self.samples.len().min(usize::from(u8::MAX));
        w.u8(len_u8(n));
        for s in &self.samples[..n] {
            w.u16(s.time_offset_ms);
            w.f32(s.roll);
            w.f32(s.pitch);
            w.f32(s.heave);
            w.f32(s.heading);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Payload + PartialEq + std::fmt::Debug>(value: &T, expected_len: usize) {
        let mut w = ByteWriter::default();
        value.write(&mut w);
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), expected_len);
        let mut r = ByteReader::new(&bytes, 0);
        assert_eq!(&T::read(&mut r).unwrap(), value);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_fixed_sizes() {
        roundtrip(&ReferencePoint::default(), 16);
        roundtrip(&SensorOffset::default(), 24);
        roundtrip(&Position::default(), 37);
        roundtrip(&Depth::default(), 8);
        roundtrip(&RollPitchHeave::default(), 12);
        roundtrip(&Navigation::default(), 41);
    }

    #[test]
    fn test_svp_layout() {
        let svp = SoundVelocityProfile {
            latitude: 0.5,
            samples: vec![
                SvpSample {
                    depth: 0.0,
                    sound_velocity: 1500.0,
                },
                SvpSample {
                    depth: 100.0,
                    sound_velocity: 1490.0,
                },
            ],
            ..Default::default()
        };
        roundtrip(&svp, 24 + 16);
    }

    #[test]
    fn test_svp_count_overflow() {
        let mut w = ByteWriter::default();
        SoundVelocityProfile::default().write(&mut w);
        let mut bytes = w.into_inner();
        bytes[20..24].copy_from_slice(&1000u32.to_le_bytes());
        let mut r = ByteReader::new(&bytes, SOUND_VELOCITY_PROFILE);
        assert!(matches!(
            SoundVelocityProfile::read(&mut r),
            Err(CodecError::CountOverflow { count: 1000, .. })
        ));
    }

    #[test]
    fn test_attitude_interleaved() {
        let att = Attitude {
            samples: vec![
                AttitudeSample {
                    time_offset_ms: 0,
                    roll: 0.01,
                    ..Default::default()
                },
                AttitudeSample {
                    time_offset_ms: 20,
                    heading: 1.0,
                    ..Default::default()
                },
            ],
        };
        roundtrip(&att, 1 + 2 * 18);
    }

    #[test]
    fn test_ctd_layout() {
        let ctd = Ctd {
            samples: vec![CtdSample {
                temperature: 12.0,
                sound_velocity: 1495.0,
                ..Default::default()
            }],
            ..Default::default()
        };
        roundtrip(&ctd, 36 + 20);
    }
}
