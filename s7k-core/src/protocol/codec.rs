//! Record codec: tagged union of record kinds, whole-record decode/encode,
//! and a push-based stream framer with resynchronisation

use serde::{Deserialize, Serialize};

use super::detection::{self, DetectionSetup, RawDetection, SegmentedRawDetection};
use super::event::{self, FileHeader, SystemEventMessage};
use super::header::{
    checksum, HeaderFlags, RecordHeader, CHECKSUM_SIZE, HEADER_SIZE, MAX_RECORD_SIZE,
};
use super::nav::{self, *};
use super::snippet::{self, Snippet, SnippetBackscatter};
use super::sonar::{self, *};
use super::{ByteReader, ByteWriter};
use crate::error::{CodecError, SessionError};

/// Fixed layout plus variable arrays of one record type
pub(crate) trait Payload: Sized {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError>;
    fn write(&self, w: &mut ByteWriter);
}

// =============================================================================
// Record kinds
// =============================================================================

/// Decoded payload of a record, one variant per supported record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum RecordKind {
    ReferencePoint(ReferencePoint),
    UncalibratedSensorOffset(SensorOffset),
    CalibratedSensorOffset(SensorOffset),
    Position(Position),
    Altitude(Altitude),
    Depth(Depth),
    SoundVelocityProfile(SoundVelocityProfile),
    Ctd(Ctd),
    RollPitchHeave(RollPitchHeave),
    Heading(Heading),
    Navigation(Navigation),
    Attitude(Attitude),
    SonarSettings(SonarSettings),
    BeamGeometry(BeamGeometry),
    Bathymetry(Bathymetry),
    Sidescan(Sidescan),
    DetectionSetup(DetectionSetup),
    RawDetection(RawDetection),
    Snippet(Snippet),
    InstallationParameters(InstallationParameters),
    SegmentedRawDetection(SegmentedRawDetection),
    SystemEventMessage(SystemEventMessage),
    SnippetBackscatter(SnippetBackscatter),
    FileHeader(FileHeader),
    SoundVelocity(SoundVelocity),
    /// Record type this codec doesn't model; payload kept verbatim
    Unhandled { record_type: u32, payload: Vec<u8> },
}

impl RecordKind {
    /// Record type identifier of this kind
    pub fn record_type(&self) -> u32 {
        match self {
            RecordKind::ReferencePoint(_) => nav::REFERENCE_POINT,
            RecordKind::UncalibratedSensorOffset(_) => nav::UNCALIBRATED_SENSOR_OFFSET,
            RecordKind::CalibratedSensorOffset(_) => nav::CALIBRATED_SENSOR_OFFSET,
            RecordKind::Position(_) => nav::POSITION,
            RecordKind::Altitude(_) => nav::ALTITUDE,
            RecordKind::Depth(_) => nav::DEPTH,
            RecordKind::SoundVelocityProfile(_) => nav::SOUND_VELOCITY_PROFILE,
            RecordKind::Ctd(_) => nav::CTD,
            RecordKind::RollPitchHeave(_) => nav::ROLL_PITCH_HEAVE,
            RecordKind::Heading(_) => nav::HEADING,
            RecordKind::Navigation(_) => nav::NAVIGATION,
            RecordKind::Attitude(_) => nav::ATTITUDE,
            RecordKind::SonarSettings(_) => sonar::SONAR_SETTINGS,
            RecordKind::BeamGeometry(_) => sonar::BEAM_GEOMETRY,
            RecordKind::Bathymetry(_) => sonar::BATHYMETRY,
            RecordKind::Sidescan(_) => sonar::SIDESCAN,
            RecordKind::DetectionSetup(_) => detection::DETECTION_SETUP,
            RecordKind::RawDetection(_) => detection::RAW_DETECTION,
            RecordKind::Snippet(_) => snippet::SNIPPET,
            RecordKind::InstallationParameters(_) => sonar::INSTALLATION,
            RecordKind::SegmentedRawDetection(_) => detection::SEGMENTED_RAW_DETECTION,
            RecordKind::SystemEventMessage(_) => event::SYSTEM_EVENT_MESSAGE,
            RecordKind::SnippetBackscatter(_) => snippet::SNIPPET_BACKSCATTER,
            RecordKind::FileHeader(_) => event::FILE_HEADER,
            RecordKind::SoundVelocity(_) => sonar::SOUND_VELOCITY,
            RecordKind::Unhandled { record_type, .. } => *record_type,
        }
    }

    /// Short human readable name
    pub fn name(&self) -> &'static str {
        match self {
            RecordKind::ReferencePoint(_) => "ReferencePoint",
            RecordKind::UncalibratedSensorOffset(_) => "UncalibratedSensorOffset",
            RecordKind::CalibratedSensorOffset(_) => "CalibratedSensorOffset",
            RecordKind::Position(_) => "Position",
            RecordKind::Altitude(_) => "Altitude",
            RecordKind::Depth(_) => "Depth",
            RecordKind::SoundVelocityProfile(_) => "SoundVelocityProfile",
            RecordKind::Ctd(_) => "Ctd",
            RecordKind::RollPitchHeave(_) => "RollPitchHeave",
            RecordKind::Heading(_) => "Heading",
            RecordKind::Navigation(_) => "Navigation",
            RecordKind::Attitude(_) => "Attitude",
            RecordKind::SonarSettings(_) => "SonarSettings",
            RecordKind::BeamGeometry(_) => "BeamGeometry",
            RecordKind::Bathymetry(_) => "Bathymetry",
            RecordKind::Sidescan(_) => "Sidescan",
            RecordKind::DetectionSetup(_) => "DetectionSetup",
            RecordKind::RawDetection(_) => "RawDetection",
            RecordKind::Snippet(_) => "Snippet",
            RecordKind::InstallationParameters(_) => "InstallationParameters",
            RecordKind::SegmentedRawDetection(_) => "SegmentedRawDetection",
            RecordKind::SystemEventMessage(_) => "SystemEventMessage",
            RecordKind::SnippetBackscatter(_) => "SnippetBackscatter",
            RecordKind::FileHeader(_) => "FileHeader",
            RecordKind::SoundVelocity(_) => "SoundVelocity",
            RecordKind::Unhandled { .. } => "Unhandled",
        }
    }

    fn read(record_type: u32, r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(match record_type {
            nav::REFERENCE_POINT => RecordKind::ReferencePoint(Payload::read(r)?),
            nav::UNCALIBRATED_SENSOR_OFFSET => RecordKind::UncalibratedSensorOffset(Payload::read(r)?),
            nav::CALIBRATED_SENSOR_OFFSET => RecordKind::CalibratedSensorOffset(Payload::read(r)?),
            nav::POSITION => RecordKind::Position(Payload::read(r)?),
            nav::ALTITUDE => RecordKind::Altitude(Payload::read(r)?),
            nav::DEPTH => RecordKind::Depth(Payload::read(r)?),
            nav::SOUND_VELOCITY_PROFILE => RecordKind::SoundVelocityProfile(Payload::read(r)?),
            nav::CTD => RecordKind::Ctd(Payload::read(r)?),
            nav::ROLL_PITCH_HEAVE => RecordKind::RollPitchHeave(Payload::read(r)?),
            nav::HEADING => RecordKind::Heading(Payload::read(r)?),
            nav::NAVIGATION => RecordKind::Navigation(Payload::read(r)?),
            nav::ATTITUDE => RecordKind::Attitude(Payload::read(r)?),
            sonar::SONAR_SETTINGS => RecordKind::SonarSettings(Payload::read(r)?),
            sonar::BEAM_GEOMETRY => RecordKind::BeamGeometry(Payload::read(r)?),
            sonar::BATHYMETRY => RecordKind::Bathymetry(Payload::read(r)?),
            sonar::SIDESCAN => RecordKind::Sidescan(Payload::read(r)?),
            detection::DETECTION_SETUP => RecordKind::DetectionSetup(Payload::read(r)?),
            detection::RAW_DETECTION => RecordKind::RawDetection(Payload::read(r)?),
            snippet::SNIPPET => RecordKind::Snippet(Payload::read(r)?),
            sonar::INSTALLATION => RecordKind::InstallationParameters(Payload::read(r)?),
            detection::SEGMENTED_RAW_DETECTION => {
                RecordKind::SegmentedRawDetection(Payload::read(r)?)
            }
            event::SYSTEM_EVENT_MESSAGE => RecordKind::SystemEventMessage(Payload::read(r)?),
            snippet::SNIPPET_BACKSCATTER => RecordKind::SnippetBackscatter(Payload::read(r)?),
            event::FILE_HEADER => RecordKind::FileHeader(Payload::read(r)?),
            sonar::SOUND_VELOCITY => RecordKind::SoundVelocity(Payload::read(r)?),
            _ => RecordKind::Unhandled {
                record_type,
                payload: r.rest(),
            },
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        match self {
            RecordKind::ReferencePoint(v) => v.write(w),
            RecordKind::UncalibratedSensorOffset(v) => v.write(w),
            RecordKind::CalibratedSensorOffset(v) => v.write(w),
            RecordKind::Position(v) => v.write(w),
            RecordKind::Altitude(v) => v.write(w),
            RecordKind::Depth(v) => v.write(w),
            RecordKind::SoundVelocityProfile(v) => v.write(w),
            RecordKind::Ctd(v) => v.write(w),
            RecordKind::RollPitchHeave(v) => v.write(w),
            RecordKind::Heading(v) => v.write(w),
            RecordKind::Navigation(v) => v.write(w),
            RecordKind::Attitude(v) => v.write(w),
            RecordKind::SonarSettings(v) => v.write(w),
            RecordKind::BeamGeometry(v) => v.write(w),
            RecordKind::Bathymetry(v) => v.write(w),
            RecordKind::Sidescan(v) => v.write(w),
            RecordKind::DetectionSetup(v) => v.write(w),
            RecordKind::RawDetection(v) => v.write(w),
            RecordKind::Snippet(v) => v.write(w),
            RecordKind::InstallationParameters(v) => v.write(w),
            RecordKind::SegmentedRawDetection(v) => v.write(w),
            RecordKind::SystemEventMessage(v) => v.write(w),
            RecordKind::SnippetBackscatter(v) => v.write(w),
            RecordKind::FileHeader(v) => v.write(w),
            RecordKind::SoundVelocity(v) => v.write(w),
            RecordKind::Unhandled { payload, .. } => w.bytes(payload),
        }
    }
}

// =============================================================================
// Record
// =============================================================================

/// One decoded 7k record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub header: RecordHeader,
    pub kind: RecordKind,
    /// Payload bytes after the modelled layout
    pub trailing: Vec<u8>,
    /// Optional data block, verbatim
    pub optional: Vec<u8>,
}

impl Record {
    /// Build a record for `kind`; size and offsets are filled in by [`encode`]
    pub fn new(mut header: RecordHeader, kind: RecordKind) -> Self {
        header.record_type = kind.record_type();
        Self {
            header,
            kind,
            trailing: Vec::new(),
            optional: Vec::new(),
        }
    }

    pub fn with_optional(mut self, optional: Vec<u8>) -> Self {
        self.optional = optional;
        self
    }

    pub fn record_kind_id(&self) -> u32 {
        self.kind.record_type()
    }

    /// Parsed optional data block of a 7006 or 7027 record
    pub fn optional_bathymetry(&self) -> Option<OptionalBathymetry> {
        if self.optional.is_empty() {
            return None;
        }
        let beams = match &self.kind {
            RecordKind::Bathymetry(b) => b.number_beams(),
            RecordKind::RawDetection(r) => r.detections.len(),
            _ => return None,
        };
        match OptionalBathymetry::parse(&self.optional, beams) {
            Ok(opt) => Some(opt),
            Err(e) => {
                log::debug!("Record {}: unusable optional data: {}", self.header.record_number, e);
                None
            }
        }
    }
}

/// Decode one complete record
///
/// `data` must be exactly the record: its length has to equal the size field.
pub fn decode(data: &[u8]) -> Result<Record, CodecError> {
    let header = RecordHeader::parse(data)?;
    let size = header.size as usize;
    if size != data.len() {
        return Err(CodecError::SizeMismatch {
            header_len: size,
            actual_len: data.len(),
        });
    }

    let body_end = size - CHECKSUM_SIZE;
    if header.flags.contains(HeaderFlags::CHECKSUM) {
        let mut stored = [0u8; CHECKSUM_SIZE];
        stored.copy_from_slice(&data[body_end..size]);
        let stored = u32::from_le_bytes(stored);
        let computed = checksum(&data[..body_end]);
        if stored != computed {
            return Err(CodecError::ChecksumMismatch { stored, computed });
        }
    }

    let payload_end = header.payload_end();
    let mut r = ByteReader::new(&data[HEADER_SIZE..payload_end], header.record_type);
    let kind = RecordKind::read(header.record_type, &mut r)?;
    let trailing = r.rest();
    let optional = data[payload_end..body_end].to_vec();

    Ok(Record {
        header,
        kind,
        trailing,
        optional,
    })
}

/// Encode a record
///
/// Size, optional data offset and record type in the header are derived
/// from the content; the checksum is always written.
pub fn encode(record: &Record) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(HEADER_SIZE + 256);
    w.bytes(&[0u8; HEADER_SIZE]);
    record.kind.write(&mut w);
    w.bytes(&record.trailing);

    let payload_end = w.len();
    w.bytes(&record.optional);

    let mut header = record.header.clone();
    header.record_type = record.kind.record_type();
    header.size = super::len_u32(w.len() + CHECKSUM_SIZE);
    header.optional_offset = if record.optional.is_empty() && record.header.optional_offset == 0 {
        0
    } else {
        super::len_u32(payload_end)
    };
    w.as_mut_slice()[..HEADER_SIZE].copy_from_slice(&header.to_bytes());

    let sum = checksum(w.as_mut_slice());
    w.u32(sum);
    w.into_inner()
}

// =============================================================================
// Stream framing
// =============================================================================

/// Default cap on bytes buffered while waiting for a record to complete
pub const DEFAULT_FRAMER_LIMIT: usize = MAX_RECORD_SIZE + HEADER_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FramerStats {
    /// Records decoded
    pub records: u64,
    /// Bytes skipped while hunting for a valid header
    pub skipped_bytes: u64,
    /// Candidate records rejected by the decoder
    pub framing_errors: u64,
}

/// Splits a byte stream into records
///
/// Bytes are pushed in arbitrary chunks. When a candidate record fails to
/// decode, the framer advances one byte and scans for the next valid header.
#[derive(Debug)]
pub struct RecordFramer {
    buffer: Vec<u8>,
    pos: usize,
    limit: usize,
    skipping: u64,
    stats: FramerStats,
}

impl Default for RecordFramer {
    fn default() -> Self {
        Self::new(DEFAULT_FRAMER_LIMIT)
    }
}

impl RecordFramer {
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            pos: 0,
            limit,
            skipping: 0,
            stats: FramerStats::default(),
        }
    }

    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Bytes buffered and not yet consumed
    pub fn pending(&self) -> usize {
        self.buffer.len() - self.pos
    }

    /// Append stream bytes
    ///
    /// Fails only when the buffer can't grow; that ends the session.
    pub fn push(&mut self, data: &[u8]) -> Result<(), SessionError> {
        if self.pos > 0 {
            self.buffer.drain(..self.pos);
            self.pos = 0;
        }
        if self.buffer.len() + data.len() > self.limit {
            return Err(SessionError::Resource(format!(
                "stream buffer would hold {} bytes, limit is {}",
                self.buffer.len() + data.len(),
                self.limit
            )));
        }
        self.buffer
            .try_reserve(data.len())
            .map_err(|e| SessionError::Resource(e.to_string()))?;
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Next complete record, or `None` when more bytes are needed
    pub fn next_record(&mut self) -> Option<Record> {
        self.scan(false)
    }

    /// Next record at end of stream: a truncated candidate is skipped instead
    /// of waited for
    pub fn next_record_at_end(&mut self) -> Option<Record> {
        self.scan(true)
    }

    fn skip(&mut self, err: &CodecError) {
        if self.skipping == 0 {
            log::debug!("Lost record sync: {}", err);
        }
        self.pos += 1;
        self.skipping += 1;
        self.stats.skipped_bytes += 1;
    }

    fn scan(&mut self, at_end: bool) -> Option<Record> {
        loop {
            let avail = &self.buffer[self.pos..];
            if avail.len() < HEADER_SIZE {
                if at_end && !avail.is_empty() {
                    self.stats.skipped_bytes += avail.len() as u64;
                    log::debug!("Discarding {} bytes at end of stream", avail.len());
                    self.pos = self.buffer.len();
                }
                return None;
            }

            let header = match RecordHeader::parse(avail) {
                Ok(header) => header,
                Err(e) => {
                    self.skip(&e);
                    continue;
                }
            };

            let size = header.size as usize;
            if avail.len() < size {
                if at_end {
                    self.skip(&CodecError::TooShort {
                        expected: size,
                        actual: avail.len(),
                    });
                    continue;
                }
                return None;
            }

            match decode(&avail[..size]) {
                Ok(record) => {
                    if self.skipping > 0 {
                        log::debug!("Resynchronised after skipping {} bytes", self.skipping);
                        self.skipping = 0;
                    }
                    self.pos += size;
                    self.stats.records += 1;
                    return Some(record);
                }
                Err(e) => {
                    self.stats.framing_errors += 1;
                    self.skip(&e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::RecordTime;

    fn time() -> RecordTime {
        RecordTime {
            year: 2015,
            day: 123,
            seconds: 30.0,
            hours: 10,
            minutes: 20,
        }
    }

    fn bathymetry_record(ping: u32) -> Record {
        Record::new(
            RecordHeader::new(0, time()),
            RecordKind::Bathymetry(Bathymetry {
                ping_number: ping,
                sound_velocity: 1500.0,
                range: vec![0.01, 0.02, 0.03],
                quality: vec![15, 15, 3],
                ..Default::default()
            }),
        )
    }

    #[test]
    fn test_encode_decode_bathymetry() {
        let record = bathymetry_record(7);
        let bytes = encode(&record);
        assert_eq!(bytes.len(), 64 + 24 + 15 + 4);
        let back = decode(&bytes).unwrap();
        assert_eq!(back.header.size as usize, bytes.len());
        assert_eq!(back.kind, record.kind);
        assert_eq!(back.record_kind_id(), 7006);
        assert_eq!(encode(&back), bytes);
    }

    #[test]
    fn test_size_mismatch() {
        let bytes = encode(&bathymetry_record(1));
        let mut longer = bytes.clone();
        longer.push(0);
        assert_eq!(
            decode(&longer),
            Err(CodecError::SizeMismatch {
                header_len: bytes.len(),
                actual_len: bytes.len() + 1
            })
        );
        assert!(decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_checksum_checked_only_when_flagged() {
        let mut bytes = encode(&bathymetry_record(1));
        let n = bytes.len();
        bytes[n - 1] ^= 0xFF;
        assert!(matches!(
            decode(&bytes),
            Err(CodecError::ChecksumMismatch { .. })
        ));

        let mut record = bathymetry_record(1);
        record.header.flags = HeaderFlags::RECORDED;
        let mut bytes = encode(&record);
        let n = bytes.len();
        bytes[n - 1] ^= 0xFF;
        assert!(decode(&bytes).is_ok());
    }

    #[test]
    fn test_unhandled_kept_verbatim() {
        let mut header = RecordHeader::new(0, time());
        header.record_version = 3;
        let record = Record::new(
            header,
            RecordKind::Unhandled {
                record_type: 7503,
                payload: vec![9, 8, 7, 6, 5],
            },
        );
        let bytes = encode(&record);
        let back = decode(&bytes).unwrap();
        assert_eq!(back.record_kind_id(), 7503);
        assert_eq!(back.kind.name(), "Unhandled");
        assert_eq!(encode(&back), bytes);
    }

    #[test]
    fn test_trailing_and_optional_round_trip() {
        let mut record = Record::new(
            RecordHeader::new(0, time()),
            RecordKind::BeamGeometry(BeamGeometry {
                angle_alongtrack: vec![0.0],
                angle_acrosstrack: vec![0.1],
                beamwidth_alongtrack: vec![0.01],
                beamwidth_acrosstrack: vec![0.01],
                ..Default::default()
            }),
        );
        // tx delay words after the modelled arrays
        record.trailing = vec![1, 2, 3, 4];
        let bytes = encode(&record);
        let back = decode(&bytes).unwrap();
        assert_eq!(back.trailing, vec![1, 2, 3, 4]);
        assert_eq!(encode(&back), bytes);

        let opt = OptionalBathymetry {
            heading: 0.5,
            beams: vec![Default::default(); 3],
            ..Default::default()
        };
        let record = bathymetry_record(3).with_optional(opt.to_bytes());
        let bytes = encode(&record);
        let back = decode(&bytes).unwrap();
        assert_eq!(back.header.optional_offset as usize, 64 + 24 + 15);
        assert_eq!(back.optional_bathymetry(), Some(opt));
        assert_eq!(encode(&back), bytes);
    }

    #[test]
    fn test_framer_chunked_input() {
        let a = encode(&bathymetry_record(1));
        let b = encode(&bathymetry_record(2));
        let stream: Vec<u8> = a.iter().chain(b.iter()).copied().collect();

        let mut framer = RecordFramer::default();
        let mut pings = Vec::new();
        for chunk in stream.chunks(7) {
            framer.push(chunk).unwrap();
            while let Some(record) = framer.next_record() {
                if let RecordKind::Bathymetry(b) = record.kind {
                    pings.push(b.ping_number);
                }
            }
        }
        assert_eq!(pings, vec![1, 2]);
        assert_eq!(framer.stats().records, 2);
        assert_eq!(framer.stats().skipped_bytes, 0);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_framer_resyncs_past_garbage() {
        let a = encode(&bathymetry_record(1));
        let mut corrupt = encode(&bathymetry_record(2));
        // break the checksum of the middle record
        corrupt[70] ^= 0x55;
        let c = encode(&bathymetry_record(3));

        let mut stream = vec![0xFFu8, 0xFF, 0x00, 0x00, 0x12];
        stream.extend_from_slice(&a);
        stream.extend_from_slice(&corrupt);
        stream.extend_from_slice(&c);

        let mut framer = RecordFramer::default();
        framer.push(&stream).unwrap();
        let mut pings = Vec::new();
        while let Some(record) = framer.next_record_at_end() {
            if let RecordKind::Bathymetry(b) = record.kind {
                pings.push(b.ping_number);
            }
        }
        assert_eq!(pings, vec![1, 3]);
        let stats = framer.stats();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.skipped_bytes, 5 + corrupt.len() as u64);
        assert!(stats.framing_errors >= 1);
    }

    #[test]
    fn test_framer_truncated_tail() {
        let a = encode(&bathymetry_record(1));
        let b = encode(&bathymetry_record(2));
        let mut framer = RecordFramer::default();
        framer.push(&a).unwrap();
        framer.push(&b[..b.len() - 10]).unwrap();
        assert!(framer.next_record().is_some());
        assert!(framer.next_record().is_none());
        assert!(framer.next_record_at_end().is_none());
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_framer_limit() {
        let mut framer = RecordFramer::new(16);
        assert!(framer.push(&[0u8; 10]).is_ok());
        assert!(matches!(
            framer.push(&[0u8; 10]),
            Err(SessionError::Resource(_))
        ));
    }
}
