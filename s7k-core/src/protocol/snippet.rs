//! Per-beam backscatter snippets (7028) and calibrated snippet
//! backscattering strength (7058)

use serde::{Deserialize, Serialize};

use super::codec::Payload;
use super::{count, len_u16, ByteReader, ByteWriter};
use crate::error::CodecError;

pub const SNIPPET: u32 = 7028;
pub const SNIPPET_BACKSCATTER: u32 = 7058;

/// 7028 flag: amplitudes are 32 bit
pub const SNIPPET_32BIT: u32 = 1 << 0;

/// 7058 control flag: footprint series follow the strength series
pub const BACKSCATTER_FOOTPRINTS: u32 = 1 << 6;

/// Sample window of one beam's snippet
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SnippetWindow {
    pub beam_number: u16,
    pub begin_sample: u32,
    /// Detection sample (7028) or bottom sample (7058)
    pub detect_sample: u32,
    pub end_sample: u32,
}

impl SnippetWindow {
    /// Samples in the window, `end - begin + 1`
    pub fn sample_count(&self) -> Result<usize, CodecError> {
        if self.end_sample < self.begin_sample {
            return Err(CodecError::InvalidField {
                record_type: SNIPPET,
                reason: format!(
                    "beam {} window {}..{}",
                    self.beam_number, self.begin_sample, self.end_sample
                ),
            });
        }
        Ok(count(self.end_sample - self.begin_sample) + 1)
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            beam_number: r.u16()?,
            begin_sample: r.u32()?,
            detect_sample: r.u32()?,
            end_sample: r.u32()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.u16(self.beam_number);
        w.u32(self.begin_sample);
        w.u32(self.detect_sample);
        w.u32(self.end_sample);
    }
}

fn read_windows(r: &mut ByteReader<'_>, n: usize) -> Result<Vec<SnippetWindow>, CodecError> {
    r.check_count(n, 14)?;
    let mut windows = Vec::with_capacity(n);
    for _ in 0..n {
        windows.push(SnippetWindow::read(r)?);
    }
    Ok(windows)
}

// =============================================================================
// 7028 Snippet
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SnippetBeam {
    pub window: SnippetWindow,
    pub amplitude: Vec<u32>,
}

/// Amplitude snippets around each detection (7028)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snippet {
    pub serial_number: u64,
    pub ping_number: u32,
    pub multi_ping: u16,
    /// When set the record carries no data
    pub error_flag: u8,
    pub control_flags: u8,
    pub flags: u32,
    pub reserved: [u32; 6],
    pub beams: Vec<SnippetBeam>,
}

impl Snippet {
    pub fn is_32bit(&self) -> bool {
        self.flags & SNIPPET_32BIT != 0
    }
}

impl Payload for Snippet {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let serial_number = r.u64()?;
        let ping_number = r.u32()?;
        let multi_ping = r.u16()?;
        let n = usize::from(r.u16()?);
        let error_flag = r.u8()?;
        let control_flags = r.u8()?;
        let flags = r.u32()?;
        let reserved = r.u32_array()?;

        let windows = read_windows(r, n)?;
        let mut beams = Vec::with_capacity(n);
        for window in windows {
            let samples = window.sample_count()?;
            let amplitude = if flags & SNIPPET_32BIT != 0 {
                r.u32_vec(samples)?
            } else {
                r.u16_vec(samples)?.into_iter().map(u32::from).collect()
            };
            beams.push(SnippetBeam { window, amplitude });
        }

        Ok(Self {
            serial_number,
            ping_number,
            multi_ping,
            error_flag,
            control_flags,
            flags,
            reserved,
            beams,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.u64(self.serial_number);
        w.u32(self.ping_number);
        w.u16(self.multi_ping);
        w.u16(len_u16(self.beams.len()));
        w.u8(self.error_flag);
        w.u8(self.control_flags);
        w.u32(self.flags);
        w.u32_slice(&self.reserved);
        for b in &self.beams {
            b.window.write(w);
        }
        for b in &self.beams {
            if self.is_32bit() {
                w.u32_slice(&b.amplitude);
            } else {
                for a in &b.amplitude {
                    w.u16(*a as u16);
                }
            }
        }
    }
}

// =============================================================================
// 7058 Snippet backscattering strength
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BackscatterBeam {
    pub window: SnippetWindow,
    /// Backscattering strength, 10 log10(sigma)
    pub strength: Vec<f32>,
    /// Footprint area per sample (m^2); empty unless the record carries them
    pub footprints: Vec<f32>,
}

/// Calibrated snippet backscattering strength (7058)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SnippetBackscatter {
    pub serial_number: u64,
    pub ping_number: u32,
    pub multi_ping: u16,
    pub error_flag: u8,
    pub control_flags: u32,
    /// Absorption (dB/km)
    pub absorption: f32,
    pub reserved: [u32; 6],
    pub beams: Vec<BackscatterBeam>,
}

impl SnippetBackscatter {
    pub fn has_footprints(&self) -> bool {
        self.control_flags & BACKSCATTER_FOOTPRINTS != 0
    }
}

impl Payload for SnippetBackscatter {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let serial_number = r.u64()?;
        let ping_number = r.u32()?;
        let multi_ping = r.u16()?;
        let n = usize::from(r.u16()?);
        let error_flag = r.u8()?;
        let control_flags = r.u32()?;
        let absorption = r.f32()?;
        let reserved = r.u32_array()?;

        let windows = read_windows(r, n)?;
        let mut beams = Vec::with_capacity(n);
        for window in windows {
            let samples = window.sample_count()?;
            beams.push(BackscatterBeam {
                window,
                strength: r.f32_vec(samples)?,
                footprints: Vec::new(),
            });
        }
        // footprints follow all strength series
        if control_flags & BACKSCATTER_FOOTPRINTS != 0 {
            for beam in beams.iter_mut() {
                let samples = beam.strength.len();
                beam.footprints = r.f32_vec(samples)?;
            }
        }

        Ok(Self {
            serial_number,
            ping_number,
            multi_ping,
            error_flag,
            control_flags,
            absorption,
            reserved,
            beams,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.u64(self.serial_number);
        w.u32(self.ping_number);
        w.u16(self.multi_ping);
        w.u16(len_u16(self.beams.len()));
        w.u8(self.error_flag);
        w.u32(self.control_flags);
        w.f32(self.absorption);
        w.u32_slice(&self.reserved);
        for b in &self.beams {
            b.window.write(w);
        }
        for b in &self.beams {
            w.f32_slice(&b.strength);
        }
        if self.has_footprints() {
            for b in &self.beams {
                w.f32_slice(&b.footprints);
            }
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

    fn window(beam: u16, begin: u32, end: u32) -> SnippetWindow {
        SnippetWindow {
            beam_number: beam,
            begin_sample: begin,
            detect_sample: (begin + end) / 2,
            end_sample: end,
        }
    }

    #[test]
    fn test_snippet_16_and_32_bit() {
        let mut snip = Snippet {
            ping_number: 4,
            beams: vec![
                SnippetBeam {
                    window: window(0, 10, 12),
                    amplitude: vec![1, 2, 3],
                },
                SnippetBeam {
                    window: window(1, 5, 5),
                    amplitude: vec![7],
                },
            ],
            ..Default::default()
        };
        let bytes = encode(&snip);
        assert_eq!(bytes.len(), 46 + 2 * 14 + 4 * 2);
        let mut r = ByteReader::new(&bytes, SNIPPET);
        assert_eq!(Snippet::read(&mut r).unwrap(), snip);

        snip.flags = SNIPPET_32BIT;
        snip.beams[0].amplitude[0] = 100_000;
        let bytes = encode(&snip);
        assert_eq!(bytes.len(), 46 + 2 * 14 + 4 * 4);
        let mut r = ByteReader::new(&bytes, SNIPPET);
        assert_eq!(Snippet::read(&mut r).unwrap(), snip);
    }

    #[test]
    fn test_snippet_inverted_window() {
        let snip = Snippet {
            beams: vec![SnippetBeam {
                window: window(0, 10, 10),
                amplitude: vec![1],
            }],
            ..Default::default()
        };
        let mut bytes = encode(&snip);
        // end sample below begin
        bytes[46 + 10..46 + 14].copy_from_slice(&2u32.to_le_bytes());
        let mut r = ByteReader::new(&bytes, SNIPPET);
        assert!(Snippet::read(&mut r).is_err());
    }

    #[test]
    fn test_backscatter_footprints() {
        let mut bs = SnippetBackscatter {
            absorption: 30.0,
            beams: vec![BackscatterBeam {
                window: window(3, 0, 1),
                strength: vec![-20.0, -21.0],
                footprints: Vec::new(),
            }],
            ..Default::default()
        };
        let bytes = encode(&bs);
        assert_eq!(bytes.len(), 49 + 14 + 8);
        let mut r = ByteReader::new(&bytes, SNIPPET_BACKSCATTER);
        assert_eq!(SnippetBackscatter::read(&mut r).unwrap(), bs);

        bs.control_flags = BACKSCATTER_FOOTPRINTS;
        bs.beams[0].footprints = vec![0.5, 0.6];
        let bytes = encode(&bs);
        assert_eq!(bytes.len(), 49 + 14 + 16);
        let mut r = ByteReader::new(&bytes, SNIPPET_BACKSCATTER);
        assert_eq!(SnippetBackscatter::read(&mut r).unwrap(), bs);
    }
}
