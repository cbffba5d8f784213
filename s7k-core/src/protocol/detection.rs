//! Detection records: setup (7017), raw detections (7027) and segmented raw
//! detections (7047)
//!
//! Each record declares the size of its per-item block. Items larger than
//! the layout modelled here keep their extra bytes in `extra`, so records
//! from newer firmware still encode back to the same bytes.

use serde::{Deserialize, Serialize};

use super::codec::Payload;
use super::{count, len_u32, ByteReader, ByteWriter};
use crate::error::CodecError;

pub const DETECTION_SETUP: u32 = 7017;
pub const RAW_DETECTION: u32 = 7027;
pub const SEGMENTED_RAW_DETECTION: u32 = 7047;

/// Modelled size of one 7017 beam block
pub const SETUP_BEAM_SIZE: usize = 34;
/// Modelled size of one 7027 detection block
pub const RAW_DETECTION_SIZE: usize = 34;
/// Modelled size of the 7047 record header
pub const SEGMENTED_HEADER_SIZE: usize = 36;
/// Modelled size of one 7047 transmit segment
pub const SEGMENT_SIZE: usize = 68;
/// Modelled size of one 7047 receive detection
pub const SEGMENTED_RX_SIZE: usize = 32;

/// 7017 beam flag: detection passed the user-defined depth/range criteria
pub const SETUP_PASSED_USER_CRITERIA: u32 = 1 << 9;

/// 7027 detection flags
pub const DETECT_MAGNITUDE: u32 = 1 << 0;
pub const DETECT_PHASE: u32 = 1 << 1;

/// 7027 quality bits
pub const QUALITY_BRIGHTNESS: u32 = 1 << 0;
pub const QUALITY_COLINEARITY: u32 = 1 << 1;

/// Fold 7027/7047 detection flags and quality bits into the 7006 quality
/// byte: brightness, colinearity, magnitude, phase
pub fn quality_byte(flags: u32, quality: u32) -> u8 {
    let mut q = (quality & (QUALITY_BRIGHTNESS | QUALITY_COLINEARITY)) as u8;
    if flags & DETECT_MAGNITUDE != 0 {
        q |= 4;
    }
    if flags & DETECT_PHASE != 0 {
        q |= 8;
    }
    q
}

/// Read an item block of `size` bytes: the modelled prefix through `read`,
/// whatever follows into the returned extra bytes
fn read_item<'a, T>(
    r: &mut ByteReader<'a>,
    size: usize,
    modelled: usize,
    read: impl FnOnce(&mut ByteReader<'a>) -> Result<T, CodecError>,
) -> Result<(T, Vec<u8>), CodecError> {
    let item = read(r)?;
    let extra = r.bytes(size - modelled)?;
    Ok((item, extra))
}

fn check_block_size(r: &ByteReader<'_>, size: usize, modelled: usize) -> Result<(), CodecError> {
    if size < modelled {
        return Err(r.invalid(format!(
            "item size {} smaller than {} byte layout",
            size, modelled
        )));
    }
    Ok(())
}

// =============================================================================
// 7017 Detection setup
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SetupBeam {
    pub beam_descriptor: u16,
    /// Fractional sample number of the detection
    pub detection_point: f32,
    pub flags: u32,
    pub auto_limits_min_sample: f32,
    pub auto_limits_max_sample: f32,
    pub user_limits_min_sample: f32,
    pub user_limits_max_sample: f32,
    pub quality: u32,
    pub uncertainty: f32,
    pub extra: Vec<u8>,
}

impl SetupBeam {
    pub fn passed_user_criteria(&self) -> bool {
        self.flags & SETUP_PASSED_USER_CRITERIA != 0
    }
}

/// Bottom detection setup for one ping (7017)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSetup {
    pub serial_number: u64,
    pub ping_number: u32,
    pub multi_ping: u16,
    /// Declared per-beam block size
    pub data_block_size: u32,
    pub detection_algorithm: u8,
    pub detection_flags: u32,
    pub minimum_depth: f32,
    pub maximum_depth: f32,
    pub minimum_range: f32,
    pub maximum_range: f32,
    pub minimum_nadir_search: f32,
    pub maximum_nadir_search: f32,
    pub automatic_filter_window: u8,
    pub applied_roll: f32,
    pub depth_gate_tilt: f32,
    pub nadir_depth: f32,
    pub reserved: [u32; 13],
    pub beams: Vec<SetupBeam>,
}

impl Default for DetectionSetup {
    fn default() -> Self {
        Self {
            serial_number: 0,
            ping_number: 0,
            multi_ping: 0,
            data_block_size: SETUP_BEAM_SIZE as u32,
            detection_algorithm: 0,
            detection_flags: 0,
            minimum_depth: 0.0,
            maximum_depth: 0.0,
            minimum_range: 0.0,
            maximum_range: 0.0,
            minimum_nadir_search: 0.0,
            maximum_nadir_search: 0.0,
            automatic_filter_window: 0,
            applied_roll: 0.0,
            depth_gate_tilt: 0.0,
            nadir_depth: 0.0,
            reserved: [0; 13],
            beams: Vec::new(),
        }
    }
}

impl Payload for DetectionSetup {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let serial_number = r.u64()?;
        let ping_number = r.u32()?;
        let multi_ping = r.u16()?;
        let n = count(r.u32()?);
        let data_block_size = r.u32()?;
        let mut setup = Self {
            serial_number,
            ping_number,
            multi_ping,
            data_block_size,
            detection_algorithm: r.u8()?,
            detection_flags: r.u32()?,
            minimum_depth: r.f32()?,
            maximum_depth: r.f32()?,
            minimum_range: r.f32()?,
            maximum_range: r.f32()?,
            minimum_nadir_search: r.f32()?,
            maximum_nadir_search: r.f32()?,
            automatic_filter_window: r.u8()?,
            applied_roll: r.f32()?,
            depth_gate_tilt: r.f32()?,
            nadir_depth: r.f32()?,
            reserved: r.u32_array()?,
            beams: Vec::new(),
        };

        let block = count(data_block_size);
        check_block_size(r, block, SETUP_BEAM_SIZE)?;
        r.check_count(n, block)?;
        setup.beams.reserve_exact(n);
        for _ in 0..n {
            let (mut beam, extra) = read_item(r, block, SETUP_BEAM_SIZE, |r| {
                Ok(SetupBeam {
                    beam_descriptor: r.u16()?,
                    detection_point: r.f32()?,
                    flags: r.u32()?,
                    auto_limits_min_sample: r.f32()?,
                    auto_limits_max_sample: r.f32()?,
                    user_limits_min_sample: r.f32()?,
                    user_limits_max_sample: r.f32()?,
                    quality: r.u32()?,
                    uncertainty: r.f32()?,
                    extra: Vec::new(),
                })
            })?;
            beam.extra = extra;
            setup.beams.push(beam);
        }
        Ok(setup)
    }

    fn write(&self, w: &mut ByteWriter) {
        let block = count(self.data_block_size).max(SETUP_BEAM_SIZE);
        w.u64(self.serial_number);
        w.u32(self.ping_number);
        w.u16(self.multi_ping);
        w.u32(len_u32(self.beams.len()));
        w.u32(len_u32(block));
        w.u8(self.detection_algorithm);
        w.u32(self.detection_flags);
        w.f32(self.minimum_depth);
        w.f32(self.maximum_depth);
        w.f32(self.minimum_range);
        w.f32(self.maximum_range);
        w.f32(self.minimum_nadir_search);
        w.f32(self.maximum_nadir_search);
        w.u8(self.automatic_filter_window);
        w.f32(self.applied_roll);
        w.f32(self.depth_gate_tilt);
        w.f32(self.nadir_depth);
        w.u32_slice(&self.reserved);
        for b in &self.beams {
            w.u16(b.beam_descriptor);
            w.f32(b.detection_point);
            w.u32(b.flags);
            w.f32(b.auto_limits_min_sample);
            w.f32(b.auto_limits_max_sample);
            w.f32(b.user_limits_min_sample);
            w.f32(b.user_limits_max_sample);
            w.u32(b.quality);
            w.f32(b.uncertainty);
            w.fixed(&b.extra, block - SETUP_BEAM_SIZE);
        }
    }
}

// =============================================================================
// 7027 Raw detection data
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawDetectionPoint {
    pub beam_descriptor: u16,
    /// Fractional sample number of the detection
    pub detection_point: f32,
    /// Receive steering angle (radians)
    pub rx_angle: f32,
    pub flags: u32,
    pub quality: u32,
    pub uncertainty: f32,
    pub signal_strength: f32,
    pub min_limit: f32,
    pub max_limit: f32,
    pub extra: Vec<u8>,
}

impl RawDetectionPoint {
    /// Quality byte in the 7006 layout, see [`quality_byte`]
    pub fn quality_byte(&self) -> u8 {
        quality_byte(self.flags, self.quality)
    }
}

/// Raw bottom detections for one ping (7027)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub serial_number: u64,
    pub ping_number: u32,
    pub multi_ping: u16,
    pub data_field_size: u32,
    pub detection_algorithm: u8,
    pub flags: u32,
    /// Sampling rate (Hz)
    pub sampling_rate: f32,
    /// Transmit steering angle (radians)
    pub tx_angle: f32,
    pub applied_roll: f32,
    pub reserved: [u32; 15],
    pub detections: Vec<RawDetectionPoint>,
}

impl Default for RawDetection {
    fn default() -> Self {
        Self {
            serial_number: 0,
            ping_number: 0,
            multi_ping: 0,
            data_field_size: RAW_DETECTION_SIZE as u32,
            detection_algorithm: 0,
            flags: 0,
            sampling_rate: 0.0,
            tx_angle: 0.0,
            applied_roll: 0.0,
            reserved: [0; 15],
            detections: Vec::new(),
        }
    }
}

impl Payload for RawDetection {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let serial_number = r.u64()?;
        let ping_number = r.u32()?;
        let multi_ping = r.u16()?;
        let n = count(r.u32()?);
        let data_field_size = r.u32()?;
        let mut raw = Self {
            serial_number,
            ping_number,
            multi_ping,
            data_field_size,
            detection_algorithm: r.u8()?,
            flags: r.u32()?,
            sampling_rate: r.f32()?,
            tx_angle: r.f32()?,
            applied_roll: r.f32()?,
            reserved: r.u32_array()?,
            detections: Vec::new(),
        };

        let block = count(data_field_size);
        check_block_size(r, block, RAW_DETECTION_SIZE)?;
        r.check_count(n, block)?;
        raw.detections.reserve_exact(n);
        for _ in 0..n {
            let (mut d, extra) = read_item(r, block, RAW_DETECTION_SIZE, |r| {
                Ok(RawDetectionPoint {
                    beam_descriptor: r.u16()?,
                    detection_point: r.f32()?,
                    rx_angle: r.f32()?,
                    flags: r.u32()?,
                    quality: r.u32()?,
                    uncertainty: r.f32()?,
                    signal_strength: r.f32()?,
                    min_limit: r.f32()?,
                    max_limit: r.f32()?,
                    extra: Vec::new(),
                })
            })?;
            d.extra = extra;
            raw.detections.push(d);
        }
        Ok(raw)
    }

    fn write(&self, w: &mut ByteWriter) {
        let block = count(self.data_field_size).max(RAW_DETECTION_SIZE);
        w.u64(self.serial_number);
        w.u32(self.ping_number);
        w.u16(self.multi_ping);
        w.u32(len_u32(self.detections.len()));
        w.u32(len_u32(block));
        w.u8(self.detection_algorithm);
        w.u32(self.flags);
        w.f32(self.sampling_rate);
        w.f32(self.tx_angle);
        w.f32(self.applied_roll);
        w.u32_slice(&self.reserved);
        for d in &self.detections {
            w.u16(d.beam_descriptor);
            w.f32(d.detection_point);
            w.f32(d.rx_angle);
            w.u32(d.flags);
            w.u32(d.quality);
            w.f32(d.uncertainty);
            w.f32(d.signal_strength);
            w.f32(d.min_limit);
            w.f32(d.max_limit);
            w.fixed(&d.extra, block - RAW_DETECTION_SIZE);
        }
    }
}

// =============================================================================
// 7047 Segmented raw detection data
// =============================================================================

/// Transmit segment descriptor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TxSegment {
    pub segment_number: u16,
    /// Transmit steering along track (radians)
    pub tx_angle_along: f32,
    pub tx_angle_across: f32,
    /// Delay of this segment's pulse after the first (seconds)
    pub tx_delay: f32,
    pub frequency: f32,
    pub pulse_type: u32,
    pub pulse_bandwidth: f32,
    pub tx_pulse_width: f32,
    pub tx_pulse_width_across: f32,
    pub tx_pulse_width_along: f32,
    pub tx_pulse_envelope: u32,
    pub tx_pulse_envelope_parameter: f32,
    pub tx_relative_src_level: f32,
    pub rx_beam_width: f32,
    pub detection_algorithm: u8,
    pub flags: u32,
    /// Sampling rate (Hz)
    pub sampling_rate: f32,
    pub tvg: u8,
    pub rx_bandwidth: f32,
    pub extra: Vec<u8>,
}

/// Receive detection referencing a transmit segment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RxDetection {
    pub beam_number: u16,
    /// Segment number this detection was received on
    pub used_segment: u16,
    pub detection_point: f32,
    /// Receive steering angle across track (radians)
    pub rx_angle_cross: f32,
    pub flags: u32,
    pub quality: u32,
    pub uncertainty: f32,
    pub signal_strength: f32,
    pub sn_ratio: f32,
    pub extra: Vec<u8>,
}

impl RxDetection {
    /// Quality byte in the 7006 layout, see [`quality_byte`]
    pub fn quality_byte(&self) -> u8 {
        quality_byte(self.flags, self.quality)
    }
}

/// Multi-sector detections for one ping (7047)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentedRawDetection {
    pub record_header_size: u16,
    pub segment_field_size: u16,
    pub rx_field_size: u16,
    pub serial_number: u64,
    pub ping_number: u32,
    pub multi_ping: u16,
    pub sound_velocity: f32,
    /// Delay between first transmit and start of sampling (seconds)
    pub rx_delay: f32,
    /// Header bytes beyond the modelled layout
    pub header_extra: Vec<u8>,
    pub segments: Vec<TxSegment>,
    pub detections: Vec<RxDetection>,
}

impl Default for SegmentedRawDetection {
    fn default() -> Self {
        Self {
            record_header_size: SEGMENTED_HEADER_SIZE as u16,
            segment_field_size: SEGMENT_SIZE as u16,
            rx_field_size: SEGMENTED_RX_SIZE as u16,
            serial_number: 0,
            ping_number: 0,
            multi_ping: 0,
            sound_velocity: 0.0,
            rx_delay: 0.0,
            header_extra: Vec::new(),
            segments: Vec::new(),
            detections: Vec::new(),
        }
    }
}

impl SegmentedRawDetection {
    /// Segment a detection was received on
    pub fn segment_for(&self, detection: &RxDetection) -> Option<&TxSegment> {
        self.segments
            .iter()
            .find(|s| s.segment_number == detection.used_segment)
    }
}

impl Payload for SegmentedRawDetection {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let record_header_size = r.u16()?;
        let n_segments = count(r.u32()?);
        let segment_field_size = r.u16()?;
        let n_rx = count(r.u32()?);
        let rx_field_size = r.u16()?;
        let serial_number = r.u64()?;
        let ping_number = r.u32()?;
        let multi_ping = r.u16()?;
        let sound_velocity = r.f32()?;
        let rx_delay = r.f32()?;

        let header_size = usize::from(record_header_size);
        check_block_size(r, header_size, SEGMENTED_HEADER_SIZE)?;
        let header_extra = r.bytes(header_size - SEGMENTED_HEADER_SIZE)?;

        let seg_size = usize::from(segment_field_size);
        check_block_size(r, seg_size, SEGMENT_SIZE)?;
        r.check_count(n_segments, seg_size)?;
        let mut segments = Vec::with_capacity(n_segments);
        for _ in 0..n_segments {
            let (mut s, extra) = read_item(r, seg_size, SEGMENT_SIZE, |r| {
                Ok(TxSegment {
                    segment_number: r.u16()?,
                    tx_angle_along: r.f32()?,
                    tx_angle_across: r.f32()?,
                    tx_delay: r.f32()?,
                    frequency: r.f32()?,
                    pulse_type: r.u32()?,
                    pulse_bandwidth: r.f32()?,
                    tx_pulse_width: r.f32()?,
                    tx_pulse_width_across: r.f32()?,
                    tx_pulse_width_along: r.f32()?,
                    tx_pulse_envelope: r.u32()?,
                    tx_pulse_envelope_parameter: r.f32()?,
                    tx_relative_src_level: r.f32()?,
                    rx_beam_width: r.f32()?,
                    detection_algorithm: r.u8()?,
                    flags: r.u32()?,
                    sampling_rate: r.f32()?,
                    tvg: r.u8()?,
                    rx_bandwidth: r.f32()?,
                    extra: Vec::new(),
                })
            })?;
            s.extra = extra;
            segments.push(s);
        }

        let rx_size = usize::from(rx_field_size);
        check_block_size(r, rx_size, SEGMENTED_RX_SIZE)?;
        r.check_count(n_rx, rx_size)?;
        let mut detections = Vec::with_capacity(n_rx);
        for _ in 0..n_rx {
            let (mut d, extra) = read_item(r, rx_size, SEGMENTED_RX_SIZE, |r| {
                Ok(RxDetection {
                    beam_number: r.u16()?,
                    used_segment: r.u16()?,
                    detection_point: r.f32()?,
                    rx_angle_cross: r.f32()?,
                    flags: r.u32()?,
                    quality: r.u32()?,
                    uncertainty: r.f32()?,
                    signal_strength: r.f32()?,
                    sn_ratio: r.f32()?,
                    extra: Vec::new(),
                })
            })?;
            d.extra = extra;
            detections.push(d);
        }

        Ok(Self {
            record_header_size,
            segment_field_size,
            rx_field_size,
            serial_number,
            ping_number,
            multi_ping,
            sound_velocity,
            rx_delay,
            header_extra,
            segments,
            detections,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        let header_size = usize::from(self.record_header_size).max(SEGMENTED_HEADER_SIZE);
        let seg_size = usize::from(self.segment_field_size).max(SEGMENT_SIZE);
        let rx_size = usize::from(self.rx_field_size).max(SEGMENTED_RX_SIZE);
        w.u16(super::len_u16(header_size));
        w.u32(len_u32(self.segments.len()));
        w.u16(super::len_u16(seg_size));
        w.u32(len_u32(self.detections.len()));
        w.u16(super::len_u16(rx_size));
        w.u64(self.serial_number);
        w.u32(self.ping_number);
        w.u16(self.multi_ping);
        w.f32(self.sound_velocity);
        w.f32(self.rx_delay);
        w.fixed(&self.header_extra, header_size - SEGMENTED_HEADER_SIZE);
        for s in &self.segments {
            w.u16(s.segment_number);
            w.f32(s.tx_angle_along);
            w.f32(s.tx_angle_across);
            w.f32(s.tx_delay);
            w.f32(s.frequency);
            w.u32(s.pulse_type);
            w.f32(s.pulse_bandwidth);
            w.f32(s.tx_pulse_width);
            w.f32(s.tx_pulse_width_across);
            w.f32(s.tx_pulse_width_along);
            w.u32(s.tx_pulse_envelope);
            w.f32(s.tx_pulse_envelope_parameter);
            w.f32(s.tx_relative_src_level);
            w.f32(s.rx_beam_width);
            w.u8(s.detection_algorithm);
            w.u32(s.flags);
            w.f32(s.sampling_rate);
            w.u8(s.tvg);
            w.f32(s.rx_bandwidth);
            w.fixed(&s.extra, seg_size - SEGMENT_SIZE);
        }
        for d in &self.detections {
            w.u16(d.beam_number);
            w.u16(d.used_segment);
            w.f32(d.detection_point);
            w.f32(d.rx_angle_cross);
            w.u32(d.flags);
            w.u32(d.quality);
            w.f32(d.uncertainty);
            w.f32(d.signal_strength);
            w.f32(d.sn_ratio);
            w.fixed(&d.extra, rx_size - SEGMENTED_RX_SIZE);
        }
    }
}
