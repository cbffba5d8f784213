//! System event messages (7051) and the file header record (7200)

use serde::{Deserialize, Serialize};

use super::codec::Payload;
use super::{c_string, count, fixed_string, len_u16, len_u32, ByteReader, ByteWriter};
use crate::error::CodecError;

pub const SYSTEM_EVENT_MESSAGE: u32 = 7051;
pub const FILE_HEADER: u32 = 7200;

/// Event id of a free-text comment
pub const EVENT_COMMENT: u16 = 1;

// =============================================================================
// 7051 System event message
// =============================================================================

/// System event or comment (7051)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemEventMessage {
    pub serial_number: u64,
    /// 0 = system event, 1 = comment, 2 = warning, 3 = error
    pub event_id: u16,
    pub event_identifier: u16,
    /// Message bytes exactly as carried, including NUL padding
    pub message: Vec<u8>,
}

impl SystemEventMessage {
    /// Build a comment: text, terminating NUL, padded with NUL to an even length
    pub fn comment(text: &str) -> Self {
        let mut message = text.as_bytes().to_vec();
        message.push(0);
        if message.len() % 2 != 0 {
            message.push(0);
        }
        Self {
            serial_number: 0,
            event_id: EVENT_COMMENT,
            event_identifier: 0,
            message,
        }
    }

    pub fn is_comment(&self) -> bool {
        self.event_id == EVENT_COMMENT
    }

    /// Message text up to the first NUL
    pub fn text(&self) -> Option<String> {
        c_string(&self.message)
    }
}

impl Payload for SystemEventMessage {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let serial_number = r.u64()?;
        let event_id = r.u16()?;
        let message_length = usize::from(r.u16()?);
        let event_identifier = r.u16()?;
        let message = r.bytes(message_length)?;
        Ok(Self {
            serial_number,
            event_id,
            event_identifier,
            message,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        let n = self.message.len().min(usize::from(u16::MAX));
        w.u64(self.serial_number);
        w.u16(self.event_id);
        w.u16(len_u16(n));
        w.u16(self.event_identifier);
        w.bytes(&self.message[..n]);
    }
}

// =============================================================================
// 7200 File header
// =============================================================================

pub const RECORDING_NAME_WIDTH: usize = 64;
pub const RECORDING_VERSION_WIDTH: usize = 16;
pub const USER_NAME_WIDTH: usize = 64;
pub const NOTES_WIDTH: usize = 128;

/// Device entry of the file header
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FileDevice {
    pub device_id: u32,
    pub system_enumerator: u16,
}

/// First record of a .s7k file (7200)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub file_identifier: [u8; 16],
    pub version: u16,
    pub reserved: u16,
    pub session_identifier: [u8; 16],
    pub record_data_size: u32,
    /// Fixed-width NUL padded fields, kept verbatim
    pub recording_name: Vec<u8>,
    pub recording_version: Vec<u8>,
    pub user_defined_name: Vec<u8>,
    pub notes: Vec<u8>,
    pub devices: Vec<FileDevice>,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            file_identifier: [0; 16],
            version: 1,
            reserved: 0,
            session_identifier: [0; 16],
            record_data_size: 0,
            recording_name: vec![0; RECORDING_NAME_WIDTH],
            recording_version: vec![0; RECORDING_VERSION_WIDTH],
            user_defined_name: vec![0; USER_NAME_WIDTH],
            notes: vec![0; NOTES_WIDTH],
            devices: Vec::new(),
        }
    }
}

impl FileHeader {
    pub fn with_recording_name(mut self, name: &str, version: &str) -> Self {
        self.recording_name = fixed_string(name, RECORDING_NAME_WIDTH);
        self.recording_version = fixed_string(version, RECORDING_VERSION_WIDTH);
        self
    }

    pub fn recording_name(&self) -> Option<String> {
        c_string(&self.recording_name)
    }

    pub fn recording_version(&self) -> Option<String> {
        c_string(&self.recording_version)
    }

    pub fn user_defined_name(&self) -> Option<String> {
        c_string(&self.user_defined_name)
    }

    pub fn notes(&self) -> Option<String> {
        c_string(&self.notes)
    }
}

impl Payload for FileHeader {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let mut file_identifier = [0u8; 16];
        file_identifier.copy_from_slice(r.take(16)?);
        let version = r.u16()?;
        let reserved = r.u16()?;
        let mut session_identifier = [0u8; 16];
        session_identifier.copy_from_slice(r.take(16)?);
        let record_data_size = r.u32()?;
        let n = count(r.u32()?);
        let recording_name = r.bytes(RECORDING_NAME_WIDTH)?;
        let recording_version = r.bytes(RECORDING_VERSION_WIDTH)?;
        let user_defined_name = r.bytes(USER_NAME_WIDTH)?;
        let notes = r.bytes(NOTES_WIDTH)?;
        r.check_count(n, 6)?;
        let mut devices = Vec::with_capacity(n);
        for _ in 0..n {
            devices.push(FileDevice {
                device_id: r.u32()?,
                system_enumerator: r.u16()?,
            });
        }
        Ok(Self {
            file_identifier,
            version,
            reserved,
            session_identifier,
            record_data_size,
            recording_name,
            recording_version,
            user_defined_name,
            notes,
            devices,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.bytes(&self.file_identifier);
        w.u16(self.version);
        w.u16(self.reserved);
        w.bytes(&self.session_identifier);
        w.u32(self.record_data_size);
        w.u32(len_u32(self.devices.len()));
        w.fixed(&self.recording_name, RECORDING_NAME_WIDTH);
        w.fixed(&self.recording_version, RECORDING_VERSION_WIDTH);
        w.fixed(&self.user_defined_name, USER_NAME_WIDTH);
        w.fixed(&self.notes, NOTES_WIDTH);
        for d in &self.devices {
            w.u32(d.device_id);
            w.u16(d.system_enumerator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_padding() {
        // "abc" + NUL is already even
        assert_eq!(SystemEventMessage::comment("abc").message, b"abc\0".to_vec());
        // "abcd" + NUL is odd, one more NUL
        assert_eq!(SystemEventMessage::comment("abcd").message, b"abcd\0\0".to_vec());
        assert_eq!(SystemEventMessage::comment("").message, b"\0\0".to_vec());
    }

    #[test]
    fn test_comment_layout() {
        let c = SystemEventMessage::comment("survey line 12");
        let mut w = ByteWriter::default();
        c.write(&mut w);
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), 14 + 16);
        assert_eq!(u16::from_le_bytes([bytes[8], bytes[9]]), EVENT_COMMENT);
        assert_eq!(u16::from_le_bytes([bytes[10], bytes[11]]), 16);
        let mut r = ByteReader::new(&bytes, SYSTEM_EVENT_MESSAGE);
        let back = SystemEventMessage::read(&mut r).unwrap();
        assert!(back.is_comment());
        assert_eq!(back.text(), Some("survey line 12".to_string()));
    }

    #[test]
    fn test_file_header_layout() {
        let mut fh = FileHeader::default().with_recording_name("7k IO", "4.1");
        fh.devices.push(FileDevice {
            device_id: 7125,
            system_enumerator: 0,
        });
        let mut w = ByteWriter::default();
        fh.write(&mut w);
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), 44 + 272 + 6);
        let mut r = ByteReader::new(&bytes, FILE_HEADER);
        let back = FileHeader::read(&mut r).unwrap();
        assert_eq!(back, fh);
        assert_eq!(back.recording_name(), Some("7k IO".to_string()));
        assert_eq!(back.notes(), None);
    }
}
