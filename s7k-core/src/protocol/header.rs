//! 7k data record frame: 64 byte header and trailing checksum

use bitflags::bitflags;
use chrono::{DateTime, Datelike, Days, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

// =============================================================================
// Constants
// =============================================================================

/// Sync pattern at bytes 4..8 of every record
pub const SYNC_PATTERN: u32 = 0x0000_FFFF;

/// Size of the record frame header
pub const HEADER_SIZE: usize = 64;

/// Size of the checksum that ends every record
pub const CHECKSUM_SIZE: usize = 4;

/// Smallest possible record: header plus checksum
pub const MIN_RECORD_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Largest record the decoder accepts
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Protocol version written by current 7k systems
pub const PROTOCOL_VERSION: u16 = 5;

/// Offset from the sync pattern to the record type header
pub const SYNC_OFFSET: u16 = 60;

// =============================================================================
// Raw frame
// =============================================================================

/// Frame header as it sits on the wire
#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(C, packed)]
struct RawHeader {
    version: [u8; 2],           // 0
    offset: [u8; 2],            // 2
    sync: [u8; 4],              // 4
    size: [u8; 4],              // 8
    optional_offset: [u8; 4],   // 12
    optional_id: [u8; 4],       // 16
    year: [u8; 2],              // 20
    day: [u8; 2],               // 22
    seconds: [u8; 4],           // 24
    hours: u8,                  // 28
    minutes: u8,                // 29
    record_version: [u8; 2],    // 30
    record_type: [u8; 4],       // 32
    device_id: [u8; 4],         // 36
    reserved: [u8; 2],          // 40
    system_enumerator: [u8; 2], // 42
    record_number: [u8; 4],     // 44
    flags: [u8; 2],             // 48
    reserved2: [u8; 2],         // 50
    reserved3: [u8; 4],         // 52
    total_fragments: [u8; 4],   // 56
    fragment_number: [u8; 4],   // 60
}

bitflags! {
    /// Header flag word
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct HeaderFlags: u16 {
        /// Checksum field is valid and must be verified
        const CHECKSUM = 0x0001;
        /// Record was played back from storage rather than sent live
        const RECORDED = 0x8000;
    }
}

// =============================================================================
// Record time
// =============================================================================

/// 7k time stamp: UTC year, day of year and time of day
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordTime {
    pub year: u16,
    /// Day of year, 1..=366
    pub day: u16,
    /// Seconds within the minute, [0, 60)
    pub seconds: f32,
    pub hours: u8,
    pub minutes: u8,
}

impl RecordTime {
    /// Reject time fields no valid record can carry
    pub fn validate(&self) -> Result<(), CodecError> {
        if !(1..=366).contains(&self.day) {
            return Err(CodecError::InvalidTime(format!("day {}", self.day)));
        }
        if !self.seconds.is_finite() || !(0.0..60.0).contains(&self.seconds) {
            return Err(CodecError::InvalidTime(format!("seconds {}", self.seconds)));
        }
        if self.hours > 23 {
            return Err(CodecError::InvalidTime(format!("hours {}", self.hours)));
        }
        if self.minutes > 59 {
            return Err(CodecError::InvalidTime(format!("minutes {}", self.minutes)));
        }
        Ok(())
    }

    /// Convert to a UTC date-time
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let whole = self.seconds.trunc();
        let nanos = ((self.seconds - whole) as f64 * 1e9).round() as u32;
        let date = NaiveDate::from_yo_opt(i32::from(self.year), 1)?
            .checked_add_days(Days::new(u64::from(self.day.checked_sub(1)?)))?;
        let dt = date.and_hms_nano_opt(
            u32::from(self.hours),
            u32::from(self.minutes),
            whole as u32,
            nanos.min(999_999_999),
        )?;
        Some(dt.and_utc())
    }

    /// Seconds since the Unix epoch, used as the time key for history lookups
    pub fn timestamp(&self) -> Option<f64> {
        let date = NaiveDate::from_yo_opt(i32::from(self.year), 1)?
            .checked_add_days(Days::new(u64::from(self.day.checked_sub(1)?)))?;
        let midnight = date.and_hms_opt(0, 0, 0)?.and_utc().timestamp() as f64;
        Some(
            midnight
                + f64::from(self.hours) * 3600.0
                + f64::from(self.minutes) * 60.0
                + f64::from(self.seconds),
        )
    }

    /// Seconds are kept below 60 even when f32 rounding or a leap second
    /// would carry them over
    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        let seconds = dt.second() as f32 + dt.nanosecond() as f32 * 1e-9;
        RecordTime {
            year: dt.year() as u16,
            day: dt.ordinal() as u16,
            seconds: seconds.min(MAX_SECONDS),
            hours: dt.hour() as u8,
            minutes: dt.minute() as u8,
        }
    }

    /// Inverse of [`RecordTime::timestamp`]
    pub fn from_timestamp(t: f64) -> Option<Self> {
        let secs = t.floor();
        let nanos = ((t - secs) * 1e9).round().min(999_999_999.0) as u32;
        DateTime::from_timestamp(secs as i64, nanos).map(|dt| Self::from_datetime(&dt))
    }
}

/// Largest f32 below 60
const MAX_SECONDS: f32 = 59.999_996;

impl std::fmt::Display for RecordTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}/{:03} {:02}:{:02}:{:06.3}",
            self.year, self.day, self.hours, self.minutes, self.seconds
        )
    }
}

// =============================================================================
// Record header
// =============================================================================

/// Decoded record frame header
///
/// The sync pattern is not stored; it is checked on decode and always written
/// as [`SYNC_PATTERN`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub version: u16,
    pub offset: u16,
    /// Total record size including header and checksum
    pub size: u32,
    /// Offset of the optional data block from record start, 0 = none
    pub optional_offset: u32,
    pub optional_id: u32,
    pub time: RecordTime,
    pub record_version: u16,
    pub record_type: u32,
    pub device_id: u32,
    pub reserved: u16,
    pub system_enumerator: u16,
    pub record_number: u32,
    pub flags: HeaderFlags,
    pub reserved2: u16,
    pub reserved3: u32,
    pub total_fragments: u32,
    pub fragment_number: u32,
}

impl Default for RecordHeader {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            offset: SYNC_OFFSET,
            size: MIN_RECORD_SIZE as u32,
            optional_offset: 0,
            optional_id: 0,
            time: RecordTime {
                year: 2020,
                day: 1,
                ..Default::default()
            },
            record_version: 1,
            record_type: 0,
            device_id: 0,
            reserved: 0,
            system_enumerator: 0,
            record_number: 0,
            flags: HeaderFlags::CHECKSUM,
            reserved2: 0,
            reserved3: 0,
            total_fragments: 0,
            fragment_number: 0,
        }
    }
}

impl RecordHeader {
    pub fn new(record_type: u32, time: RecordTime) -> Self {
        Self {
            record_type,
            time,
            ..Default::default()
        }
    }

    /// Parse and validate a frame header from the start of `data`
    ///
    /// Checks sync, size bounds, optional data offset and time fields; the
    /// checksum and the size-versus-span check need the whole record and are
    /// done by [`crate::protocol::decode`].
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < HEADER_SIZE {
            return Err(CodecError::TooShort {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }

        let raw: RawHeader = bincode::deserialize(&data[..HEADER_SIZE])?;

        let sync = u32::from_le_bytes(raw.sync);
        if sync != SYNC_PATTERN {
            return Err(CodecError::BadSync(sync));
        }

        let header = RecordHeader {
            version: u16::from_le_bytes(raw.version),
            offset: u16::from_le_bytes(raw.offset),
            size: u32::from_le_bytes(raw.size),
            optional_offset: u32::from_le_bytes(raw.optional_offset),
            optional_id: u32::from_le_bytes(raw.optional_id),
            time: RecordTime {
                year: u16::from_le_bytes(raw.year),
                day: u16::from_le_bytes(raw.day),
                seconds: f32::from_le_bytes(raw.seconds),
                hours: raw.hours,
                minutes: raw.minutes,
            },
            record_version: u16::from_le_bytes(raw.record_version),
            record_type: u32::from_le_bytes(raw.record_type),
            device_id: u32::from_le_bytes(raw.device_id),
            reserved: u16::from_le_bytes(raw.reserved),
            system_enumerator: u16::from_le_bytes(raw.system_enumerator),
            record_number: u32::from_le_bytes(raw.record_number),
            flags: HeaderFlags::from_bits_retain(u16::from_le_bytes(raw.flags)),
            reserved2: u16::from_le_bytes(raw.reserved2),
            reserved3: u32::from_le_bytes(raw.reserved3),
            total_fragments: u32::from_le_bytes(raw.total_fragments),
            fragment_number: u32::from_le_bytes(raw.fragment_number),
        };

        header.validate()?;
        Ok(header)
    }

    /// Check size bounds, optional data offset and time
    pub fn validate(&self) -> Result<(), CodecError> {
        let size = self.size as usize;
        if !(MIN_RECORD_SIZE..=MAX_RECORD_SIZE).contains(&size) {
            return Err(CodecError::InvalidSize(self.size));
        }
        if self.optional_offset != 0
            && !(HEADER_SIZE..=size - CHECKSUM_SIZE).contains(&(self.optional_offset as usize))
        {
            return Err(CodecError::InvalidOptionalOffset {
                offset: self.optional_offset,
                size: self.size,
            });
        }
        self.time.validate()
    }

    /// End of the record type data (start of optional data or checksum)
    pub fn payload_end(&self) -> usize {
        if self.optional_offset != 0 {
            self.optional_offset as usize
        } else {
            self.size as usize - CHECKSUM_SIZE
        }
    }

    /// Serialize the header
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..2].copy_from_slice(&self.version.to_le_bytes());
        buf[2..4].copy_from_slice(&self.offset.to_le_bytes());
        buf[4..8].copy_from_slice(&SYNC_PATTERN.to_le_bytes());
        buf[8..12].copy_from_slice(&self.size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.optional_offset.to_le_bytes());
        buf[16..20].copy_from_slice(&self.optional_id.to_le_bytes());
        buf[20..22].copy_from_slice(&self.time.year.to_le_bytes());
        buf[22..24].copy_from_slice(&self.time.day.to_le_bytes());
        buf[24..28].copy_from_slice(&self.time.seconds.to_le_bytes());
        buf[28] = self.time.hours;
        buf[29] = self.time.minutes;
        buf[30..32].copy_from_slice(&self.record_version.to_le_bytes());
        buf[32..36].copy_from_slice(&self.record_type.to_le_bytes());
        buf[36..40].copy_from_slice(&self.device_id.to_le_bytes());
        buf[40..42].copy_from_slice(&self.reserved.to_le_bytes());
        buf[42..44].copy_from_slice(&self.system_enumerator.to_le_bytes());
        buf[44..48].copy_from_slice(&self.record_number.to_le_bytes());
        buf[48..50].copy_from_slice(&self.flags.bits().to_le_bytes());
        buf[50..52].copy_from_slice(&self.reserved2.to_le_bytes());
        buf[52..56].copy_from_slice(&self.reserved3.to_le_bytes());
        buf[56..60].copy_from_slice(&self.total_fragments.to_le_bytes());
        buf[60..64].copy_from_slice(&self.fragment_number.to_le_bytes());

        buf
    }
}

/// Record checksum: wrapping 32 bit sum of every byte
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> RecordHeader {
        RecordHeader {
            size: 100,
            record_type: 7006,
            record_number: 42,
            device_id: 7125,
            time: RecordTime {
                year: 2019,
                day: 200,
                seconds: 12.5,
                hours: 13,
                minutes: 7,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_header_bytes_parse_back() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(&bytes[4..8], &[0xFF, 0xFF, 0x00, 0x00]);
        assert_eq!(u32::from_le_bytes([bytes[32], bytes[33], bytes[34], bytes[35]]), 7006);
        assert_eq!(RecordHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_bad_sync() {
        let mut bytes = sample_header().to_bytes();
        bytes[4] = 0;
        assert_eq!(RecordHeader::parse(&bytes), Err(CodecError::BadSync(0xFF00)));
    }

    #[test]
    fn test_rejects_hour_30() {
        let mut header = sample_header();
        header.time.hours = 30;
        let bytes = header.to_bytes();
        assert!(matches!(
            RecordHeader::parse(&bytes),
            Err(CodecError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_rejects_bad_time_fields() {
        for time in [
            RecordTime { day: 0, ..sample_header().time },
            RecordTime { day: 367, ..sample_header().time },
            RecordTime { seconds: 60.0, ..sample_header().time },
            RecordTime { seconds: f32::NAN, ..sample_header().time },
            RecordTime { minutes: 60, ..sample_header().time },
        ] {
            assert!(time.validate().is_err(), "{:?}", time);
        }
    }

    #[test]
    fn test_end_of_second_stays_valid() {
        let dt = DateTime::from_timestamp(1_600_000_019, 999_999_900).unwrap();
        let time = RecordTime::from_datetime(&dt);
        assert!(time.seconds < 60.0);
        assert_eq!(time.minutes, dt.minute() as u8);
        assert!(time.validate().is_ok());

        let time = RecordTime::from_timestamp(1_600_000_019.999_999_9).unwrap();
        assert!(time.validate().is_ok());
    }

    #[test]
    fn test_leap_second_stays_valid() {
        let dt = DateTime::from_timestamp(1_483_228_799, 1_500_000_000).unwrap();
        let time = RecordTime::from_datetime(&dt);
        assert!(time.validate().is_ok());
    }

    #[test]
    fn test_rejects_size_bounds() {
        let mut header = sample_header();
        header.size = 67;
        assert_eq!(
            RecordHeader::parse(&header.to_bytes()),
            Err(CodecError::InvalidSize(67))
        );
        header.size = u32::MAX;
        assert!(RecordHeader::parse(&header.to_bytes()).is_err());
    }

    #[test]
    fn test_optional_offset_bounds() {
        let mut header = sample_header();
        header.optional_offset = 97;
        assert!(matches!(
            RecordHeader::parse(&header.to_bytes()),
            Err(CodecError::InvalidOptionalOffset { .. })
        ));
        header.optional_offset = 80;
        assert_eq!(RecordHeader::parse(&header.to_bytes()).unwrap().payload_end(), 80);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[1, 2, 3]), 6);
        let big = vec![0xFFu8; 20_000_000];
        assert_eq!(checksum(&big), (255u64 * 20_000_000 % (1u64 << 32)) as u32);
    }

    #[test]
    fn test_time_conversions() {
        let t = RecordTime {
            year: 2008,
            day: 366,
            seconds: 59.25,
            hours: 23,
            minutes: 59,
        };
        let dt = t.to_datetime().unwrap();
        assert_eq!(dt.to_rfc3339(), "2008-12-31T23:59:59.250+00:00");
        let ts = t.timestamp().unwrap();
        let back = RecordTime::from_timestamp(ts).unwrap();
        assert_eq!(back.year, 2008);
        assert_eq!(back.day, 366);
        assert!((back.seconds - 59.25).abs() < 1e-3);
    }
}
