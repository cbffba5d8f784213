//! Sonar records: settings, beam geometry, bathymetry, sidescan,
//! installation and surface sound velocity

use serde::{Deserialize, Serialize};

use super::codec::Payload;
use super::{count, len_u32, ByteReader, ByteWriter};
use crate::error::CodecError;

// =============================================================================
// Record identifiers
// =============================================================================

pub const SONAR_SETTINGS: u32 = 7000;
pub const BEAM_GEOMETRY: u32 = 7004;
pub const BATHYMETRY: u32 = 7006;
pub const SIDESCAN: u32 = 7007;
pub const INSTALLATION: u32 = 7030;
pub const SOUND_VELOCITY: u32 = 7610;

/// Fixed part of the 7006 optional data block (before the per-beam arrays)
pub const BATHYMETRY_OPTIONAL_SIZE: usize = 45;

// =============================================================================
// 7000 Sonar settings
// =============================================================================

/// Volatile sonar settings for the current ping (7000)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SonarSettings {
    pub serial_number: u64,
    pub ping_number: u32,
    pub multi_ping: u16,
    pub frequency: f32,
    /// Sample rate (Hz)
    pub sample_rate: f32,
    pub receiver_bandwidth: f32,
    pub tx_pulse_width: f32,
    pub tx_pulse_type: u32,
    pub tx_pulse_envelope: u32,
    pub tx_pulse_envelope_par: f32,
    pub tx_pulse_mode: u32,
    pub max_ping_rate: f32,
    pub ping_period: f32,
    pub range_selection: f32,
    pub power_selection: f32,
    pub gain_selection: f32,
    pub control_flags: u32,
    pub projector_magic_no: u32,
    pub steering_vertical: f32,
    pub steering_horizontal: f32,
    /// Projector -3 dB beamwidth vertical (radians)
    pub beamwidth_vertical: f32,
    /// Projector -3 dB beamwidth horizontal (radians)
    pub beamwidth_horizontal: f32,
    pub focal_point: f32,
    pub projector_weighting: u32,
    pub projector_weighting_par: f32,
    pub transmit_flags: u32,
    pub hydrophone_magic_no: u32,
    pub receive_weighting: u32,
    pub receive_weighting_par: f32,
    pub receive_flags: u32,
    /// Receive beam width (radians)
    pub receive_width: f32,
    pub range_minimum: f32,
    pub range_maximum: f32,
    pub depth_minimum: f32,
    pub depth_maximum: f32,
    pub absorption: f32,
    /// Sound velocity (m/s)
    pub sound_velocity: f32,
    pub spreading: f32,
    pub reserved: u16,
}

impl Payload for SonarSettings {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            serial_number: r.u64()?,
            ping_number: r.u32()?,
            multi_ping: r.u16()?,
            frequency: r.f32()?,
            sample_rate: r.f32()?,
            receiver_bandwidth: r.f32()?,
            tx_pulse_width: r.f32()?,
            tx_pulse_type: r.u32()?,
            tx_pulse_envelope: r.u32()?,
            tx_pulse_envelope_par: r.f32()?,
            tx_pulse_mode: r.u32()?,
            max_ping_rate: r.f32()?,
            ping_period: r.f32()?,
            range_selection: r.f32()?,
            power_selection: r.f32()?,
            gain_selection: r.f32()?,
            control_flags: r.u32()?,
            projector_magic_no: r.u32()?,
            steering_vertical: r.f32()?,
            steering_horizontal: r.f32()?,
            beamwidth_vertical: r.f32()?,
            beamwidth_horizontal: r.f32()?,
            focal_point: r.f32()?,
            projector_weighting: r.u32()?,
            projector_weighting_par: r.f32()?,
            transmit_flags: r.u32()?,
            hydrophone_magic_no: r.u32()?,
            receive_weighting: r.u32()?,
            receive_weighting_par: r.f32()?,
            receive_flags: r.u32()?,
            receive_width: r.f32()?,
            range_minimum: r.f32()?,
            range_maximum: r.f32()?,
            depth_minimum: r.f32()?,
            depth_maximum: r.f32()?,
            absorption: r.f32()?,
            sound_velocity: r.f32()?,
            spreading: r.f32()?,
            reserved: r.u16()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.u64(self.serial_number);
        w.u32(self.ping_number);
        w.u16(self.multi_ping);
        w.f32(self.frequency);
        w.f32(self.sample_rate);
        w.f32(self.receiver_bandwidth);
        w.f32(self.tx_pulse_width);
        w.u32(self.tx_pulse_type);
        w.u32(self.tx_pulse_envelope);
        w.f32(self.tx_pulse_envelope_par);
        w.u32(self.tx_pulse_mode);
        w.f32(self.max_ping_rate);
        w.f32(self.ping_period);
        w.f32(self.range_selection);
        w.f32(self.power_selection);
        w.f32(self.gain_selection);
        w.u32(self.control_flags);
        w.u32(self.projector_magic_no);
        w.f32(self.steering_vertical);
        w.f32(self.steering_horizontal);
        w.f32(self.beamwidth_vertical);
        w.f32(self.beamwidth_horizontal);
        w.f32(self.focal_point);
        w.u32(self.projector_weighting);
        w.f32(self.projector_weighting_par);
        w.u32(self.transmit_flags);
        w.u32(self.hydrophone_magic_no);
        w.u32(self.receive_weighting);
        w.f32(self.receive_weighting_par);
        w.u32(self.receive_flags);
        w.f32(self.receive_width);
        w.f32(self.range_minimum);
        w.f32(self.range_maximum);
        w.f32(self.depth_minimum);
        w.f32(self.depth_maximum);
        w.f32(self.absorption);
        w.f32(self.sound_velocity);
        w.f32(self.spreading);
        w.u16(self.reserved);
    }
}

// =============================================================================
// 7004 Beam geometry
// =============================================================================

/// Receive beam steering and widths (7004)
///
/// Arrays are stored one after another, each `number_beams` long.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BeamGeometry {
    pub serial_number: u64,
    /// Beam steering angle along track (radians)
    pub angle_alongtrack: Vec<f32>,
    /// Beam steering angle across track (radians)
    pub angle_acrosstrack: Vec<f32>,
    pub beamwidth_alongtrack: Vec<f32>,
    pub beamwidth_acrosstrack: Vec<f32>,
}

impl BeamGeometry {
    pub fn number_beams(&self) -> usize {
        self.angle_acrosstrack.len()
    }
}

impl Payload for BeamGeometry {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let serial_number = r.u64()?;
        let n = count(r.u32()?);
        r.check_count(n, 16)?;
        Ok(Self {
            serial_number,
            angle_alongtrack: r.f32_vec(n)?,
            angle_acrosstrack: r.f32_vec(n)?,
            beamwidth_alongtrack: r.f32_vec(n)?,
            beamwidth_acrosstrack: r.f32_vec(n)?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        let n = self.number_beams();
        w.u64(self.serial_number);
        w.u32(len_u32(n));
        for v in [
            &self.angle_alongtrack,
            &self.angle_acrosstrack,
            &self.beamwidth_alongtrack,
            &self.beamwidth_acrosstrack,
        ] {
            write_padded(w, v, n);
        }
    }
}

/// Write exactly `n` values, zero filling a short array
fn write_padded(w: &mut ByteWriter, v: &[f32], n: usize) {
    let m = v.len().min(n);
    w.f32_slice(&v[..m]);
    for _ in m..n {
        w.f32(0.0);
    }
}

// =============================================================================
// 7006 Bathymetry
// =============================================================================

/// Sonar bathymetry for one ping (7006), the record that completes a ping
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bathymetry {
    pub serial_number: u64,
    pub ping_number: u32,
    pub multi_ping: u16,
    /// Layer compensation applied
    pub layer_comp_flag: u8,
    /// 0 = measured surface sound velocity, 1 = manually entered
    pub sound_velocity_flag: u8,
    pub sound_velocity: f32,
    /// Two-way travel time per beam (seconds)
    pub range: Vec<f32>,
    /// Raw per-beam quality byte
    pub quality: Vec<u8>,
    /// Per-beam intensity; empty when the record doesn't carry it
    pub intensity: Vec<f32>,
    pub min_depth_gate: Vec<f32>,
    pub max_depth_gate: Vec<f32>,
}

impl Bathymetry {
    pub fn number_beams(&self) -> usize {
        self.range.len()
    }
}

impl Payload for Bathymetry {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let serial_number = r.u64()?;
        let ping_number = r.u32()?;
        let multi_ping = r.u16()?;
        let n = count(r.u32()?);
        let layer_comp_flag = r.u8()?;
        let sound_velocity_flag = r.u8()?;
        let sound_velocity = r.f32()?;
        r.check_count(n, 5)?;
        let range = r.f32_vec(n)?;
        let quality = r.bytes(n)?;

        // The gate and intensity arrays are only present on later record versions
        let mut optional = || {
            if n > 0 && r.check_count(n, 4).is_ok() {
                r.f32_vec(n)
            } else {
                Ok(Vec::new())
            }
        };
        let intensity = optional()?;
        let min_depth_gate = optional()?;
        let max_depth_gate = optional()?;

        Ok(Self {
            serial_number,
            ping_number,
            multi_ping,
            layer_comp_flag,
            sound_velocity_flag,
            sound_velocity,
            range,
            quality,
            intensity,
            min_depth_gate,
            max_depth_gate,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        let n = self.number_beams();
        w.u64(self.serial_number);
        w.u32(self.ping_number);
        w.u16(self.multi_ping);
        w.u32(len_u32(n));
        w.u8(self.layer_comp_flag);
        w.u8(self.sound_velocity_flag);
        w.f32(self.sound_velocity);
        w.f32_slice(&self.range);
        for i in 0..n {
            w.u8(self.quality.get(i).copied().unwrap_or(0));
        }
        // each optional array is written only if all earlier ones are
        for v in [&self.intensity, &self.min_depth_gate, &self.max_depth_gate] {
            if v.is_empty() {
                break;
            }
            write_padded(w, v, n);
        }
    }
}

/// Per-beam solution carried in the optional data block
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OptionalBeam {
    pub depth: f32,
    pub alongtrack: f32,
    pub acrosstrack: f32,
    pub pointing_angle: f32,
    pub azimuth_angle: f32,
}

/// Optional data block of 7006 and 7027: vessel state at transmit time and
/// the sonar's own per-beam solution
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OptionalBathymetry {
    pub frequency: f32,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f32,
    pub height_source: u8,
    pub tide: f32,
    pub roll: f32,
    pub pitch: f32,
    pub heave: f32,
    pub vehicle_depth: f32,
    pub beams: Vec<OptionalBeam>,
}

impl OptionalBathymetry {
    /// Parse an optional data block for a record with `number_beams` beams
    ///
    /// The per-beam solution is interleaved, five values per beam.
    pub fn parse(data: &[u8], number_beams: usize) -> Result<Self, CodecError> {
        let mut r = ByteReader::new(data, BATHYMETRY);
        let frequency = r.f32()?;
        let latitude = r.f64()?;
        let longitude = r.f64()?;
        let heading = r.f32()?;
        let height_source = r.u8()?;
        let tide = r.f32()?;
        let roll = r.f32()?;
        let pitch = r.f32()?;
        let heave = r.f32()?;
        let vehicle_depth = r.f32()?;
        r.check_count(number_beams, 20)?;
        let mut beams = Vec::with_capacity(number_beams);
        for _ in 0..number_beams {
            beams.push(OptionalBeam {
                depth: r.f32()?,
                alongtrack: r.f32()?,
                acrosstrack: r.f32()?,
                pointing_angle: r.f32()?,
                azimuth_angle: r.f32()?,
            });
        }
        Ok(Self {
            frequency,
            latitude,
            longitude,
            heading,
            height_source,
            tide,
            roll,
            pitch,
            heave,
            vehicle_depth,
            beams,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(BATHYMETRY_OPTIONAL_SIZE + 20 * self.beams.len());
        w.f32(self.frequency);
        w.f64(self.latitude);
        w.f64(self.longitude);
        w.f32(self.heading);
        w.u8(self.height_source);
        w.f32(self.tide);
        w.f32(self.roll);
        w.f32(self.pitch);
        w.f32(self.heave);
        w.f32(self.vehicle_depth);
        for b in &self.beams {
            w.f32(b.depth);
            w.f32(b.alongtrack);
            w.f32(b.acrosstrack);
            w.f32(b.pointing_angle);
            w.f32(b.azimuth_angle);
        }
        w.into_inner()
    }
}

// =============================================================================
// 7007 Sidescan
// =============================================================================

/// Wide-beam port/starboard sidescan series (7007)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Sidescan {
    pub serial_number: u64,
    pub ping_number: u32,
    pub multi_ping: u16,
    /// Beam position forward from the reference point (m)
    pub beam_position: f32,
    pub control_flags: u32,
    /// Number of samples per side
    pub samples: u32,
    /// Nadir depth in samples
    pub nadir_depth: u32,
    pub reserved: [u32; 7],
    pub number_beams: u16,
    pub current_beam: u16,
    /// Bytes per sample: 1, 2 or 4
    pub sample_size: u8,
    pub data_type: u8,
    pub port: Vec<u8>,
    pub starboard: Vec<u8>,
}

impl Sidescan {
    fn series_len(&self) -> usize {
        count(self.samples) * usize::from(self.sample_size)
    }

    fn decode_series(&self, raw: &[u8]) -> Vec<f64> {
        match self.sample_size {
            1 => raw.iter().map(|&b| f64::from(b)).collect(),
            2 => raw
                .chunks_exact(2)
                .map(|c| f64::from(u16::from_le_bytes([c[0], c[1]])))
                .collect(),
            _ => raw
                .chunks_exact(4)
                .map(|c| f64::from(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                .collect(),
        }
    }

    /// Port amplitudes, nearest sample first
    pub fn port_amplitudes(&self) -> Vec<f64> {
        self.decode_series(&self.port)
    }

    /// Starboard amplitudes, nearest sample first
    pub fn starboard_amplitudes(&self) -> Vec<f64> {
        self.decode_series(&self.starboard)
    }
}

impl Payload for Sidescan {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let serial_number = r.u64()?;
        let ping_number = r.u32()?;
        let multi_ping = r.u16()?;
        let beam_position = r.f32()?;
        let control_flags = r.u32()?;
        let samples = r.u32()?;
        let nadir_depth = r.u32()?;
        let reserved = r.u32_array()?;
        let number_beams = r.u16()?;
        let current_beam = r.u16()?;
        let sample_size = r.u8()?;
        let data_type = r.u8()?;
        if !matches!(sample_size, 1 | 2 | 4) {
            return Err(r.invalid(format!("sample size {}", sample_size)));
        }
        let len = count(samples)
            .checked_mul(usize::from(sample_size))
            .unwrap_or(usize::MAX);
        r.check_count(len, 2)?;
        let port = r.bytes(len)?;
        let starboard = r.bytes(len)?;
        Ok(Self {
            serial_number,
            ping_number,
            multi_ping,
            beam_position,
            control_flags,
            samples,
            nadir_depth,
            reserved,
            number_beams,
            current_beam,
            sample_size,
            data_type,
            port,
            starboard,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.u64(self.serial_number);
        w.u32(self.ping_number);
        w.u16(self.multi_ping);
        w.f32(self.beam_position);
        w.u32(self.control_flags);
        w.u32(self.samples);
        w.u32(self.nadir_depth);
        w.u32_slice(&self.reserved);
        w.u16(self.number_beams);
        w.u16(self.current_beam);
        w.u8(self.sample_size);
        w.u8(self.data_type);
        let len = self.series_len();
        w.fixed(&self.port, len);
        w.fixed(&self.starboard, len);
    }
}

// =============================================================================
// 7030 Installation parameters
// =============================================================================

/// Array or sensor offset from the vessel reference point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ArrayOffset {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub roll: f32,
    pub pitch: f32,
    pub heading: f32,
}

impl ArrayOffset {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            x: r.f32()?,
            y: r.f32()?,
            z: r.f32()?,
            roll: r.f32()?,
            pitch: r.f32()?,
            heading: r.f32()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        for v in [self.x, self.y, self.z, self.roll, self.pitch, self.heading] {
            w.f32(v);
        }
    }
}

/// Length-prefixed version string in a fixed 128 byte field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionField {
    pub length: u16,
    pub bytes: Vec<u8>,
}

impl Default for VersionField {
    fn default() -> Self {
        Self {
            length: 0,
            bytes: vec![0; Self::WIDTH],
        }
    }
}

impl VersionField {
    const WIDTH: usize = 128;

    pub fn new(s: &str) -> Self {
        let bytes = super::fixed_string(s, Self::WIDTH);
        Self {
            length: super::len_u16(s.len().min(Self::WIDTH - 1)),
            bytes,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        super::c_string(&self.bytes)
    }
}

/// Installation offsets (7030)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstallationParameters {
    pub frequency: f32,
    pub firmware_version: VersionField,
    pub software_version: VersionField,
    pub s7k_version: VersionField,
    pub protocol_version: VersionField,
    pub transmit: ArrayOffset,
    pub receive: ArrayOffset,
    pub motion: ArrayOffset,
    /// Motion sensor time delay (ms)
    pub motion_time_delay: u16,
    pub position_x: f32,
    pub position_y: f32,
    pub position_z: f32,
    pub position_time_delay: u16,
    /// Vertical offset from reference point to waterline
    pub waterline_z: f32,
}

impl Payload for InstallationParameters {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let frequency = r.f32()?;
        let mut version = || -> Result<VersionField, CodecError> {
            Ok(VersionField {
                length: r.u16()?,
                bytes: r.bytes(VersionField::WIDTH)?,
            })
        };
        let firmware_version = version()?;
        let software_version = version()?;
        let s7k_version = version()?;
        let protocol_version = version()?;
        Ok(Self {
            frequency,
            firmware_version,
            software_version,
            s7k_version,
            protocol_version,
            transmit: ArrayOffset::read(r)?,
            receive: ArrayOffset::read(r)?,
            motion: ArrayOffset::read(r)?,
            motion_time_delay: r.u16()?,
            position_x: r.f32()?,
            position_y: r.f32()?,
            position_z: r.f32()?,
            position_time_delay: r.u16()?,
            waterline_z: r.f32()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.f32(self.frequency);
        for v in [
            &self.firmware_version,
            &self.software_version,
            &self.s7k_version,
            &self.protocol_version,
        ] {
            w.u16(v.length);
            w.fixed(&v.bytes, VersionField::WIDTH);
        }
        self.transmit.write(w);
        self.receive.write(w);
        self.motion.write(w);
        w.u16(self.motion_time_delay);
        w.f32(self.position_x);
        w.f32(self.position_y);
        w.f32(self.position_z);
        w.u16(self.position_time_delay);
        w.f32(self.waterline_z);
    }
}

// =============================================================================
// 7610 Surface sound velocity
// =============================================================================

/// Sound velocity at the array (7610), optionally with temperature and pressure
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SoundVelocity {
    pub sound_velocity: f32,
    /// Kelvin
    pub temperature: Option<f32>,
    /// Pascal
    pub pressure: Option<f32>,
}

impl Payload for SoundVelocity {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let sound_velocity = r.f32()?;
        let (temperature, pressure) = if r.remaining() >= 8 {
            (Some(r.f32()?), Some(r.f32()?))
        } else {
            (None, None)
        };
        Ok(Self {
            sound_velocity,
            temperature,
            pressure,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.f32(self.sound_velocity);
        if let (Some(t), Some(p)) = (self.temperature, self.pressure) {
            w.f32(t);
            w.f32(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<T: Payload>(value: &T) -> Vec<u8> {
        let mut w = ByteWriter::default();
        value.write(&mut w);
        w.into_inner()
    }

    fn decode<T: Payload>(bytes: &[u8], record_type: u32) -> Result<T, CodecError> {
        let mut r = ByteReader::new(bytes, record_type);
        T::read(&mut r)
    }

    #[test]
    fn test_settings_size() {
        let settings = SonarSettings {
            sample_rate: 34482.0,
            sound_velocity: 1502.5,
            receive_width: 0.0087,
            ..Default::default()
        };
        let bytes = encode(&settings);
        assert_eq!(bytes.len(), 156);
        assert_eq!(decode::<SonarSettings>(&bytes, SONAR_SETTINGS).unwrap(), settings);
    }

    #[test]
    fn test_installation_size() {
        let inst = InstallationParameters {
            firmware_version: VersionField::new("fw 1.2"),
            receive: ArrayOffset {
                z: 1.25,
                heading: std::f32::consts::PI,
                ..Default::default()
            },
            waterline_z: -0.5,
            ..Default::default()
        };
        let bytes = encode(&inst);
        assert_eq!(bytes.len(), 616);
        let back: InstallationParameters = decode(&bytes, INSTALLATION).unwrap();
        assert_eq!(back, inst);
        assert_eq!(back.firmware_version.as_string(), Some("fw 1.2".to_string()));
    }

    #[test]
    fn test_beam_geometry_array_major() {
        let geo = BeamGeometry {
            serial_number: 1,
            angle_alongtrack: vec![0.0, 0.01],
            angle_acrosstrack: vec![-0.5, 0.5],
            beamwidth_alongtrack: vec![0.01, 0.01],
            beamwidth_acrosstrack: vec![0.005, 0.005],
        };
        let bytes = encode(&geo);
        assert_eq!(bytes.len(), 12 + 4 * 2 * 4);
        // second array starts right after the first
        assert_eq!(f32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]), -0.5);
        assert_eq!(decode::<BeamGeometry>(&bytes, BEAM_GEOMETRY).unwrap(), geo);
    }

    #[test]
    fn test_bathymetry_with_and_without_intensity() {
        let mut bath = Bathymetry {
            ping_number: 17,
            sound_velocity: 1500.0,
            range: vec![0.01, 0.012],
            quality: vec![15, 3],
            ..Default::default()
        };
        let bytes = encode(&bath);
        assert_eq!(bytes.len(), 24 + 2 * 5);
        assert_eq!(decode::<Bathymetry>(&bytes, BATHYMETRY).unwrap(), bath);

        bath.intensity = vec![100.0, 200.0];
        bath.min_depth_gate = vec![1.0, 1.0];
        bath.max_depth_gate = vec![50.0, 50.0];
        let bytes = encode(&bath);
        assert_eq!(bytes.len(), 24 + 2 * 17);
        assert_eq!(decode::<Bathymetry>(&bytes, BATHYMETRY).unwrap(), bath);
    }

    #[test]
    fn test_bathymetry_count_exceeds_payload() {
        let bath = Bathymetry {
            range: vec![0.01; 4],
            quality: vec![15; 4],
            ..Default::default()
        };
        let mut bytes = encode(&bath);
        bytes[14..18].copy_from_slice(&1_000_000u32.to_le_bytes());
        assert!(matches!(
            decode::<Bathymetry>(&bytes, BATHYMETRY),
            Err(CodecError::CountOverflow { count: 1_000_000, .. })
        ));
    }

    #[test]
    fn test_optional_block_interleaved() {
        let opt = OptionalBathymetry {
            frequency: 400_000.0,
            heading: 1.0,
            vehicle_depth: 3.5,
            beams: vec![
                OptionalBeam {
                    depth: 10.0,
                    ..Default::default()
                },
                OptionalBeam {
                    depth: 11.0,
                    acrosstrack: 2.0,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let bytes = opt.to_bytes();
        assert_eq!(bytes.len(), BATHYMETRY_OPTIONAL_SIZE + 40);
        assert_eq!(OptionalBathymetry::parse(&bytes, 2).unwrap(), opt);
        assert!(OptionalBathymetry::parse(&bytes, 3).is_err());
    }

    #[test]
    fn test_sidescan_sample_sizes() {
        let ss = Sidescan {
            samples: 3,
            sample_size: 2,
            port: vec![1, 0, 2, 0, 3, 0],
            starboard: vec![4, 0, 5, 0, 0, 1],
            ..Default::default()
        };
        let bytes = encode(&ss);
        assert_eq!(bytes.len(), 64 + 12);
        let back: Sidescan = decode(&bytes, SIDESCAN).unwrap();
        assert_eq!(back.port_amplitudes(), vec![1.0, 2.0, 3.0]);
        assert_eq!(back.starboard_amplitudes(), vec![4.0, 5.0, 256.0]);

        let mut bad = bytes.clone();
        bad[62] = 3;
        assert!(matches!(
            decode::<Sidescan>(&bad, SIDESCAN),
            Err(CodecError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_sound_velocity_optional_fields() {
        let sv = SoundVelocity {
            sound_velocity: 1480.0,
            temperature: None,
            pressure: None,
        };
        assert_eq!(encode(&sv).len(), 4);
        let sv = SoundVelocity {
            temperature: Some(283.0),
            pressure: Some(101_325.0),
            ..sv
        };
        let bytes = encode(&sv);
        assert_eq!(bytes.len(), 12);
        assert_eq!(decode::<SoundVelocity>(&bytes, SOUND_VELOCITY).unwrap(), sv);
    }
}
