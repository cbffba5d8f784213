//! Ping aggregate
//!
//! The aggregate holds the most recent instance of every record kind seen in
//! the stream, a presence bit per kind and the products derived from one
//! ping. Records are applied through [`PingAggregate::dispatch`]; the caller
//! decides what to do when a record belongs to a different ping.
//!
//! Two kinds of slot exist:
//!
//! - sticky: navigation, settings and installation records. Their presence
//!   bits stay set once seen.
//! - ping scoped: records carrying a ping number, the per-ping comments and
//!   the derived bathymetry and mosaic. Cleared by [`PingAggregate::begin_ping`].

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::mosaic::{Mosaic, MosaicBaseline};
use crate::protocol::detection::{DetectionSetup, RawDetection, SegmentedRawDetection};
use crate::protocol::event::FileHeader;
use crate::protocol::nav::{
    Altitude, Attitude, Ctd, Depth, Heading, Navigation, Position, ReferencePoint, RollPitchHeave,
    SensorOffset, SoundVelocityProfile,
};
use crate::protocol::snippet::{Snippet, SnippetBackscatter};
use crate::protocol::sonar::{
    Bathymetry, BeamGeometry, InstallationParameters, OptionalBathymetry, SonarSettings,
    Sidescan, SoundVelocity,
};
use crate::protocol::{Record, RecordHeader, RecordKind};
use crate::solver::SolvedBathymetry;

bitflags! {
    /// Which slots of the aggregate hold data for the current ping
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PresenceFlags: u32 {
        const REFERENCE_POINT = 1 << 0;
        const UNCALIBRATED_OFFSET = 1 << 1;
        const CALIBRATED_OFFSET = 1 << 2;
        const POSITION = 1 << 3;
        const ALTITUDE = 1 << 4;
        const DEPTH = 1 << 5;
        const SOUND_VELOCITY_PROFILE = 1 << 6;
        const CTD = 1 << 7;
        const ROLL_PITCH_HEAVE = 1 << 8;
        const HEADING = 1 << 9;
        const NAVIGATION = 1 << 10;
        const ATTITUDE = 1 << 11;
        const SONAR_SETTINGS = 1 << 12;
        const BEAM_GEOMETRY = 1 << 13;
        const BATHYMETRY = 1 << 14;
        const SIDESCAN = 1 << 15;
        const DETECTION_SETUP = 1 << 16;
        const RAW_DETECTION = 1 << 17;
        const SNIPPET = 1 << 18;
        const INSTALLATION = 1 << 19;
        const SEGMENTED_RAW_DETECTION = 1 << 20;
        const COMMENT = 1 << 21;
        const SNIPPET_BACKSCATTER = 1 << 22;
        const FILE_HEADER = 1 << 23;
        const SOUND_VELOCITY = 1 << 24;
        /// Derived: bathymetry solved for this ping
        const SOLVED = 1 << 25;
        /// Derived: mosaic built for this ping
        const MOSAIC = 1 << 26;

        /// Cleared when a new ping begins
        const PING_SCOPED = Self::BATHYMETRY.bits()
            | Self::SIDESCAN.bits()
            | Self::DETECTION_SETUP.bits()
            | Self::RAW_DETECTION.bits()
            | Self::SNIPPET.bits()
            | Self::SEGMENTED_RAW_DETECTION.bits()
            | Self::COMMENT.bits()
            | Self::SNIPPET_BACKSCATTER.bits()
            | Self::SOLVED.bits()
            | Self::MOSAIC.bits();
    }
}

/// Identity of one ping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingId {
    pub serial_number: u64,
    pub ping_number: u32,
    pub multi_ping: u16,
}

impl PingId {
    fn same_ping(&self, other: &PingId) -> bool {
        self.ping_number == other.ping_number && self.multi_ping == other.multi_ping
    }
}

impl std::fmt::Display for PingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.multi_ping == 0 {
            write!(f, "{}", self.ping_number)
        } else {
            write!(f, "{}.{}", self.ping_number, self.multi_ping)
        }
    }
}

/// Outcome of applying one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Sticky state updated
    Sticky,
    /// Applied to the current ping
    Ping,
    /// Core record applied; the current ping can be solved
    Core,
    /// Record belongs to another ping and was NOT applied. Close the current
    /// ping, call [`PingAggregate::begin_ping`] and dispatch it again.
    NewPing(PingId),
    /// Record for a ping that was already closed; dropped
    Late(PingId),
    /// Record kind not modelled
    Ignored,
}

/// Latest state of every record kind plus the products of the current ping
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingAggregate {
    pub present: PresenceFlags,
    /// Ping the ping-scoped slots belong to
    pub ping: Option<PingId>,
    /// Last ping closed by `begin_ping`
    pub previous: Option<PingId>,
    /// Number of records applied to the current ping
    pub ping_records: usize,

    // sticky
    pub reference_point: ReferencePoint,
    pub uncalibrated_offset: SensorOffset,
    pub calibrated_offset: SensorOffset,
    pub position: Position,
    pub altitude: Altitude,
    pub depth: Depth,
    pub sound_velocity_profile: SoundVelocityProfile,
    pub ctd: Ctd,
    pub roll_pitch_heave: RollPitchHeave,
    pub heading: Heading,
    pub navigation: Navigation,
    pub attitude: Attitude,
    pub sonar_settings: SonarSettings,
    pub beam_geometry: BeamGeometry,
    pub installation: InstallationParameters,
    pub file_header: FileHeader,
    pub sound_velocity: SoundVelocity,

    // ping scoped
    /// Header of the core record
    pub bathymetry_header: RecordHeader,
    pub bathymetry: Bathymetry,
    /// Navigation and attitude embedded in the core record
    pub bathymetry_optional: Option<OptionalBathymetry>,
    pub sidescan: Sidescan,
    pub detection_setup: DetectionSetup,
    pub raw_detection: RawDetection,
    pub raw_detection_optional: Option<OptionalBathymetry>,
    pub snippet: Snippet,
    pub segmented_raw_detection: SegmentedRawDetection,
    pub snippet_backscatter: SnippetBackscatter,
    pub comments: Vec<String>,

    // derived
    pub solved: Option<SolvedBathymetry>,
    pub mosaic: Option<Mosaic>,
    /// Pixel size and swath width of the last mosaic; survives `begin_ping`
    pub mosaic_baseline: MosaicBaseline,
}

impl PingAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, flags: PresenceFlags) -> bool {
        self.present.contains(flags)
    }

    /// Core record seen for the current ping
    pub fn is_complete(&self) -> bool {
        self.has(PresenceFlags::BATHYMETRY)
    }

    /// Apply one record
    pub fn dispatch(&mut self, record: &Record) -> Dispatch {
        if let Some(id) = ping_id(&record.kind) {
            match self.ping {
                Some(current) if current.same_ping(&id) => {}
                _ if self.previous.is_some_and(|p| p.same_ping(&id)) => {
                    log::debug!(
                        "Late record {} for closed ping {}",
                        record.record_kind_id(),
                        id
                    );
                    return Dispatch::Late(id);
                }
                _ => return Dispatch::NewPing(id),
            }
        }

        let flag = match &record.kind {
            RecordKind::ReferencePoint(v) => {
                self.reference_point = *v;
                PresenceFlags::REFERENCE_POINT
            }
            RecordKind::UncalibratedSensorOffset(v) => {
                self.uncalibrated_offset = *v;
                PresenceFlags::UNCALIBRATED_OFFSET
            }
            RecordKind::CalibratedSensorOffset(v) => {
                self.calibrated_offset = *v;
                PresenceFlags::CALIBRATED_OFFSET
            }
            RecordKind::Position(v) => {
                self.position = *v;
                PresenceFlags::POSITION
            }
            RecordKind::Altitude(v) => {
                self.altitude = *v;
                PresenceFlags::ALTITUDE
            }
            RecordKind::Depth(v) => {
                self.depth = *v;
                PresenceFlags::DEPTH
            }
            RecordKind::SoundVelocityProfile(v) => {
                self.sound_velocity_profile.clone_from(v);
                PresenceFlags::SOUND_VELOCITY_PROFILE
            }
            RecordKind::Ctd(v) => {
                self.ctd.clone_from(v);
                PresenceFlags::CTD
            }
            RecordKind::RollPitchHeave(v) => {
                self.roll_pitch_heave = *v;
                PresenceFlags::ROLL_PITCH_HEAVE
            }
            RecordKind::Heading(v) => {
                self.heading = *v;
                PresenceFlags::HEADING
            }
            RecordKind::Navigation(v) => {
                self.navigation = *v;
                PresenceFlags::NAVIGATION
            }
            RecordKind::Attitude(v) => {
                self.attitude.samples.clone_from(&v.samples);
                PresenceFlags::ATTITUDE
            }
            RecordKind::SonarSettings(v) => {
                self.sonar_settings = *v;
                PresenceFlags::SONAR_SETTINGS
            }
            RecordKind::BeamGeometry(v) => {
                self.beam_geometry.clone_from(v);
                PresenceFlags::BEAM_GEOMETRY
            }
            RecordKind::InstallationParameters(v) => {
                self.installation.clone_from(v);
                PresenceFlags::INSTALLATION
            }
            RecordKind::FileHeader(v) => {
                self.file_header.clone_from(v);
                PresenceFlags::FILE_HEADER
            }
            RecordKind::SoundVelocity(v) => {
                self.sound_velocity = *v;
                PresenceFlags::SOUND_VELOCITY
            }
            RecordKind::SystemEventMessage(v) => {
                if !v.is_comment() {
                    return Dispatch::Ignored;
                }
                if let Some(text) = v.text() {
                    self.comments.push(text);
                }
                PresenceFlags::COMMENT
            }
            RecordKind::Bathymetry(v) => {
                self.bathymetry_header = record.header.clone();
                self.bathymetry.clone_from(v);
                self.bathymetry_optional = record.optional_bathymetry();
                PresenceFlags::BATHYMETRY
            }
            RecordKind::Sidescan(v) => {
                self.sidescan.clone_from(v);
                PresenceFlags::SIDESCAN
            }
            RecordKind::DetectionSetup(v) => {
                self.detection_setup.clone_from(v);
                PresenceFlags::DETECTION_SETUP
            }
            RecordKind::RawDetection(v) => {
                self.raw_detection.clone_from(v);
                self.raw_detection_optional = record.optional_bathymetry();
                PresenceFlags::RAW_DETECTION
            }
            RecordKind::Snippet(v) => {
                self.snippet.clone_from(v);
                PresenceFlags::SNIPPET
            }
            RecordKind::SegmentedRawDetection(v) => {
                self.segmented_raw_detection.clone_from(v);
                PresenceFlags::SEGMENTED_RAW_DETECTION
            }
            RecordKind::SnippetBackscatter(v) => {
                self.snippet_backscatter.clone_from(v);
                PresenceFlags::SNIPPET_BACKSCATTER
            }
            RecordKind::Unhandled { record_type, .. } => {
                log::debug!("Skipping unhandled record type {}", record_type);
                return Dispatch::Ignored;
            }
        };
        self.present |= flag;

        if PresenceFlags::PING_SCOPED.contains(flag) {
            self.ping_records += 1;
        }
        if flag == PresenceFlags::BATHYMETRY {
            Dispatch::Core
        } else if PresenceFlags::PING_SCOPED.contains(flag) {
            Dispatch::Ping
        } else {
            Dispatch::Sticky
        }
    }

    /// Start collecting a new ping
    ///
    /// Clears ping-scoped presence bits, comments and derived products. The
    /// ping-scoped slots keep their last contents until overwritten; read
    /// them only through the presence bits. Comments seen before the first
    /// ping carry into it.
    pub fn begin_ping(&mut self, id: PingId) {
        let first = self.ping.is_none();
        if !first {
            self.previous = self.ping;
        }
        self.ping = Some(id);
        self.ping_records = 0;
        self.present.remove(PresenceFlags::PING_SCOPED);
        self.bathymetry_optional = None;
        self.raw_detection_optional = None;
        if first && !self.comments.is_empty() {
            self.present |= PresenceFlags::COMMENT;
        } else {
            self.comments.clear();
        }
        self.solved = None;
        self.mosaic = None;
    }

    /// Independent deep copy of the aggregate
    pub fn snapshot(&self) -> PingAggregate {
        self.clone()
    }

    /// Time of the core record (epoch seconds)
    pub fn ping_time(&self) -> Option<f64> {
        if self.is_complete() {
            self.bathymetry_header.time.timestamp()
        } else {
            None
        }
    }
}

/// Ping identity carried by a ping-scoped record
pub fn ping_id(kind: &RecordKind) -> Option<PingId> {
    let (serial_number, ping_number, multi_ping) = match kind {
        RecordKind::Bathymetry(v) => (v.serial_number, v.ping_number, v.multi_ping),
        RecordKind::Sidescan(v) => (v.serial_number, v.ping_number, v.multi_ping),
        RecordKind::DetectionSetup(v) => (v.serial_number, v.ping_number, v.multi_ping),
        RecordKind::RawDetection(v) => (v.serial_number, v.ping_number, v.multi_ping),
        RecordKind::Snippet(v) => (v.serial_number, v.ping_number, v.multi_ping),
        RecordKind::SegmentedRawDetection(v) => (v.serial_number, v.ping_number, v.multi_ping),
        RecordKind::SnippetBackscatter(v) => (v.serial_number, v.ping_number, v.multi_ping),
        _ => return None,
    };
    Some(PingId {
        serial_number,
        ping_number,
        multi_ping,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::event::SystemEventMessage;
    use crate::protocol::{RecordHeader, RecordTime};

    fn record(kind: RecordKind) -> Record {
        Record::new(RecordHeader::new(0, RecordTime::default()), kind)
    }

    fn bathymetry(ping_number: u32, ranges: &[f32]) -> Record {
        record(RecordKind::Bathymetry(Bathymetry {
            ping_number,
            range: ranges.to_vec(),
            quality: vec![0x0F; ranges.len()],
            ..Default::default()
        }))
    }

    /// Dispatch, starting a new ping when asked
    fn feed(agg: &mut PingAggregate, r: &Record) -> Dispatch {
        match agg.dispatch(r) {
            Dispatch::NewPing(id) => {
                agg.begin_ping(id);
                agg.dispatch(r)
            }
            d => d,
        }
    }

    #[test]
    fn test_core_record_completes_ping() {
        let mut agg = PingAggregate::new();
        assert!(!agg.is_complete());
        assert_eq!(feed(&mut agg, &bathymetry(1, &[0.1, 0.2])), Dispatch::Core);
        assert!(agg.is_complete());
        assert_eq!(agg.ping.map(|p| p.ping_number), Some(1));
        assert_eq!(agg.bathymetry.range, vec![0.1, 0.2]);
    }

    #[test]
    fn test_other_ping_is_not_applied() {
        let mut agg = PingAggregate::new();
        feed(&mut agg, &bathymetry(1, &[0.1]));
        let next = bathymetry(2, &[0.3]);
        assert!(matches!(agg.dispatch(&next), Dispatch::NewPing(id) if id.ping_number == 2));
        assert_eq!(agg.bathymetry.range, vec![0.1]);
    }

    #[test]
    fn test_sticky_survives_begin_ping() {
        let mut agg = PingAggregate::new();
        assert_eq!(
            feed(&mut agg, &record(RecordKind::Heading(Heading { heading: 1.0 }))),
            Dispatch::Sticky
        );
        feed(&mut agg, &bathymetry(1, &[0.1]));
        feed(
            &mut agg,
            &record(RecordKind::SystemEventMessage(SystemEventMessage::comment("line 1"))),
        );
        assert_eq!(agg.comments, vec!["line 1".to_string()]);

        agg.begin_ping(PingId {
            ping_number: 2,
            ..Default::default()
        });
        assert!(agg.has(PresenceFlags::HEADING));
        assert!(!agg.has(PresenceFlags::BATHYMETRY));
        assert!(!agg.has(PresenceFlags::COMMENT));
        assert!(agg.comments.is_empty());
        assert_eq!(agg.previous.map(|p| p.ping_number), Some(1));
    }

    #[test]
    fn test_comments_before_first_ping_carry() {
        let mut agg = PingAggregate::new();
        feed(
            &mut agg,
            &record(RecordKind::SystemEventMessage(SystemEventMessage::comment("start"))),
        );
        feed(&mut agg, &bathymetry(1, &[0.1]));
        assert_eq!(agg.comments, vec!["start".to_string()]);
        assert!(agg.has(PresenceFlags::COMMENT));
    }

    #[test]
    fn test_late_record_dropped() {
        let mut agg = PingAggregate::new();
        feed(&mut agg, &bathymetry(1, &[0.1]));
        feed(&mut agg, &bathymetry(2, &[0.2]));
        let late = record(RecordKind::Snippet(Snippet {
            ping_number: 1,
            ..Default::default()
        }));
        assert!(matches!(agg.dispatch(&late), Dispatch::Late(_)));
        assert!(!agg.has(PresenceFlags::SNIPPET));
    }

    #[test]
    fn test_unhandled_ignored() {
        let mut agg = PingAggregate::new();
        let r = record(RecordKind::Unhandled {
            record_type: 9999,
            payload: vec![1, 2, 3],
        });
        assert_eq!(agg.dispatch(&r), Dispatch::Ignored);
        assert!(agg.present.is_empty());
    }

    #[test]
    fn test_snapshot_is_deep() {
        let mut agg = PingAggregate::new();
        feed(&mut agg, &bathymetry(1, &[0.1, 0.2]));
        let snap = agg.snapshot();
        agg.bathymetry.range[0] = 9.0;
        agg.begin_ping(PingId::default());
        assert_eq!(snap.bathymetry.range, vec![0.1, 0.2]);
        assert!(snap.is_complete());
    }
}
