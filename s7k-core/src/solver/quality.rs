//! Beam quality flags and the per-epoch normalisation of raw quality bytes
//!
//! The sonar's quality byte changed meaning over the protocol's lifetime.
//! Four epochs are distinguished by the core record's protocol version and
//! year:
//!
//! | Epoch     | Condition                  | Raw meaning                        |
//! |-----------|----------------------------|------------------------------------|
//! | `Legacy`  | version < 5                | 0..15 only, travel time decides    |
//! | `EarlyV5` | version 5, year < 2006     | 8 = phase, 4 = amplitude           |
//! | `MidV5`   | version 5, year < 2008     | 4 = phase, 2 = amplitude           |
//! | `Current` | otherwise                  | bit field, see [`QualityFlags`]    |

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Normalised per-beam quality
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct QualityFlags: u16 {
        /// Brightness test passed
        const BRIGHTNESS = 0x0001;
        /// Colinearity test passed
        const COLINEARITY = 0x0002;
        /// Magnitude detection used
        const MAGNITUDE_USED = 0x0004;
        /// Phase detection used
        const PHASE_USED = 0x0008;
        /// Amplitude detect
        const AMPLITUDE = 0x0010;
        /// Phase detect
        const PHASE = 0x0020;
        /// Rejected by the sonar
        const SONAR_FLAGGED = 0x0040;
        /// Rejected by the signal strength filter
        const AUTO_FLAGGED = 0x0080;
        /// Rejected by an operator
        const MANUAL_FLAGGED = 0x0100;
        /// No usable geometry
        const NULL = 0x0200;
    }
}

/// Low nibble: the bits that say a detection exists
const VALIDITY_MASK: u16 = 0x000F;

/// Travel time below which a legacy beam counts as a near-surface detection
const LEGACY_MIN_TRAVEL_TIME: f64 = 0.007;

/// Signal strength at or below which a current-epoch beam is auto-flagged
pub const MIN_SIGNAL_STRENGTH: f64 = 0.0;

impl QualityFlags {
    /// Detection exists and can carry geometry
    pub fn has_detection(&self) -> bool {
        self.bits() & VALIDITY_MASK != 0 && !self.contains(QualityFlags::NULL)
    }

    /// Valid for geometry and not rejected by anyone
    pub fn is_good(&self) -> bool {
        self.has_detection()
            && !self.intersects(
                QualityFlags::SONAR_FLAGGED
                    | QualityFlags::AUTO_FLAGGED
                    | QualityFlags::MANUAL_FLAGGED,
            )
    }
}

/// Quality byte convention in force for a ping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityEpoch {
    Legacy,
    EarlyV5,
    MidV5,
    Current,
}

impl QualityEpoch {
    /// Pick the epoch from the core record's protocol version and year
    pub fn classify(protocol_version: u16, year: u16) -> Self {
        match protocol_version {
            v if v < 5 => QualityEpoch::Legacy,
            5 if year < 2006 => QualityEpoch::EarlyV5,
            5 if year < 2008 => QualityEpoch::MidV5,
            _ => QualityEpoch::Current,
        }
    }

    /// Whether the signal strength filter applies in this epoch
    pub fn auto_flags_weak_signal(&self) -> bool {
        matches!(self, QualityEpoch::Current)
    }

    /// Normalise a raw quality byte
    ///
    /// `two_way_time` is only consulted by the legacy epoch.
    pub fn normalise(&self, raw: u8, two_way_time: f64) -> QualityFlags {
        let q = u16::from(raw);
        let bits = match self {
            QualityEpoch::Legacy => {
                if q < 16 {
                    if two_way_time > LEGACY_MIN_TRAVEL_TIME {
                        23
                    } else if two_way_time > 0.0 {
                        20
                    } else {
                        0
                    }
                } else {
                    q
                }
            }
            QualityEpoch::EarlyV5 => match q {
                8 => 32 + 15,
                4 => 16 + 15,
                _ => q,
            },
            QualityEpoch::MidV5 => match q {
                4 => 32 + 15,
                2 => 16 + 15,
                _ => q,
            },
            QualityEpoch::Current => {
                let mut q = q & VALIDITY_MASK;
                if q & 8 != 0 {
                    q += 32;
                } else if q & 4 != 0 {
                    q += 16;
                }
                if q & 3 < 3 {
                    q += 64;
                }
                q
            }
        };
        QualityFlags::from_bits_retain(bits)
    }

    /// Normalise and apply the signal strength filter where it applies
    pub fn classify_beam(
        &self,
        raw: u8,
        two_way_time: f64,
        signal_strength: Option<f64>,
        min_signal_strength: f64,
    ) -> QualityFlags {
        let mut flags = self.normalise(raw, two_way_time);
        if self.auto_flags_weak_signal() {
            if let Some(s) = signal_strength {
                if s <= min_signal_strength {
                    flags |= QualityFlags::AUTO_FLAGGED;
                }
            }
        }
        if !flags.has_detection() {
            flags |= QualityFlags::NULL;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_epochs() {
        assert_eq!(QualityEpoch::classify(4, 2010), QualityEpoch::Legacy);
        assert_eq!(QualityEpoch::classify(5, 2005), QualityEpoch::EarlyV5);
        assert_eq!(QualityEpoch::classify(5, 2006), QualityEpoch::MidV5);
        assert_eq!(QualityEpoch::classify(5, 2007), QualityEpoch::MidV5);
        assert_eq!(QualityEpoch::classify(5, 2008), QualityEpoch::Current);
        assert_eq!(QualityEpoch::classify(6, 2004), QualityEpoch::Current);
    }

    #[test]
    fn test_legacy_uses_travel_time() {
        let e = QualityEpoch::Legacy;
        assert_eq!(e.normalise(3, 0.01).bits(), 23);
        assert_eq!(e.normalise(3, 0.005).bits(), 20);
        assert_eq!(e.normalise(3, 0.0).bits(), 0);
        assert_eq!(e.normalise(40, 0.01).bits(), 40);
    }

    #[test]
    fn test_early_and_mid_v5_differ() {
        // the same raw byte means different things in the two epochs
        assert_eq!(QualityEpoch::EarlyV5.normalise(4, 0.1).bits(), 31);
        assert_eq!(QualityEpoch::MidV5.normalise(4, 0.1).bits(), 47);
        assert_eq!(QualityEpoch::EarlyV5.normalise(8, 0.1).bits(), 47);
        assert_eq!(QualityEpoch::MidV5.normalise(2, 0.1).bits(), 31);
        assert_eq!(QualityEpoch::MidV5.normalise(8, 0.1).bits(), 8);
    }

    #[test]
    fn test_current_bit_field() {
        let e = QualityEpoch::Current;
        // phase, both tests passed
        assert_eq!(e.normalise(0b1011, 0.1).bits(), 11 + 32);
        // amplitude, brightness only: flagged by sonar
        assert_eq!(e.normalise(0b0101, 0.1).bits(), 5 + 16 + 64);
        // high nibble discarded
        assert_eq!(e.normalise(0xF3, 0.1).bits(), 3);
        assert!(e.normalise(0b1011, 0.1).is_good());
        assert!(!e.normalise(0b0101, 0.1).is_good());
    }

    #[test]
    fn test_signal_strength_only_in_current_epoch() {
        let weak = Some(0.0);
        let q = QualityEpoch::Current.classify_beam(0b1011, 0.1, weak, MIN_SIGNAL_STRENGTH);
        assert!(q.contains(QualityFlags::AUTO_FLAGGED));
        let q = QualityEpoch::MidV5.classify_beam(4, 0.1, weak, MIN_SIGNAL_STRENGTH);
        assert!(!q.contains(QualityFlags::AUTO_FLAGGED));
        let q = QualityEpoch::Current.classify_beam(0b1011, 0.1, Some(5.0), MIN_SIGNAL_STRENGTH);
        assert!(q.is_good());
    }

    #[test]
    fn test_no_detection_is_null() {
        let q = QualityEpoch::Current.classify_beam(0, 0.1, None, MIN_SIGNAL_STRENGTH);
        assert!(q.contains(QualityFlags::NULL));
        assert!(!q.has_detection());
    }
}
