//! Stream session
//!
//! A [`Session`] owns everything one input stream needs: the framer, the
//! ping aggregate, the navigation history and the installation geometry.
//! Bytes go in through [`Session::feed`]; solved pings come out in stream
//! order as [`SessionEvent`]s.
//!
//! A ping is closed when a record for a different ping arrives or the
//! stream ends. Closing solves it when its bathymetry record arrived and
//! reports it as incomplete otherwise.

use serde::Serialize;

use crate::config::ProcessingConfig;
use crate::error::SessionError;
use crate::geometry::InstallationGeometry;
use crate::history::{GeoPosition, NavAttitudeHistory, NavAttitudeSource};
use crate::mosaic::{build_mosaic, Mosaic};
use crate::ping::{Dispatch, PingAggregate, PingId, PresenceFlags};
use crate::protocol::nav::SvpSample;
use crate::protocol::{FramerStats, Record, RecordFramer, RecordKind, RecordTime};
use crate::solver::{solve, SolvedBathymetry};

/// A solved ping with the metadata downstream consumers need
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmittedPing {
    pub ping: PingId,
    pub time: RecordTime,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    /// Radians
    pub position: Option<GeoPosition>,
    /// Radians
    pub heading: f64,
    /// m/s
    pub speed: Option<f64>,
    /// Receive array depth below the waterline (m)
    pub draft: f64,
    pub sound_speed: f64,
    pub sound_velocity_profile: Vec<SvpSample>,
    pub comments: Vec<String>,
    pub bathymetry: SolvedBathymetry,
    pub mosaic: Option<Mosaic>,
    /// The bathymetry record with the solution in its optional data block
    #[serde(skip)]
    pub processed: Record,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Box<PingAggregate>>,
}

/// A ping closed without its bathymetry record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncompletePing {
    pub ping: PingId,
    /// Records collected for it
    pub records: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    Ping(Box<EmittedPing>),
    Incomplete(IncompletePing),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub framer: FramerStats,
    pub pings: u64,
    pub incomplete: u64,
    pub late_records: u64,
    pub ignored_records: u64,
}

pub struct Session {
    config: ProcessingConfig,
    framer: RecordFramer,
    agg: PingAggregate,
    history: NavAttitudeHistory,
    geometry: Option<InstallationGeometry>,
    /// A ping has been begun and not yet closed
    open: bool,
    warned_geometry: bool,
    stats: SessionStats,
}

impl Session {
    pub fn new(config: ProcessingConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Session {
            framer: RecordFramer::new(config.framer_limit),
            agg: PingAggregate::new(),
            history: NavAttitudeHistory::new(config.max_extrapolation),
            geometry: config.installation,
            open: false,
            warned_geometry: false,
            stats: SessionStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn history(&self) -> &NavAttitudeHistory {
        &self.history
    }

    pub fn geometry(&self) -> Option<&InstallationGeometry> {
        self.geometry.as_ref()
    }

    pub fn aggregate(&self) -> &PingAggregate {
        &self.agg
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            framer: self.framer.stats(),
            ..self.stats
        }
    }

    /// Push stream bytes; returns the pings they completed
    ///
    /// Corrupt records are skipped. The only error is a resource failure,
    /// after which the session must not be fed again.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<SessionEvent>, SessionError> {
        self.framer.push(bytes)?;
        let mut events = Vec::new();
        while let Some(record) = self.framer.next_record() {
            self.process_record(&record, &mut events);
        }
        Ok(events)
    }

    /// End of stream: drain what's buffered and close the last ping
    pub fn finish(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(record) = self.framer.next_record_at_end() {
            self.process_record(&record, &mut events);
        }
        if let Some(event) = self.close_ping() {
            events.push(event);
        }
        events
    }

    /// Apply an already decoded record
    pub fn process_record(&mut self, record: &Record, events: &mut Vec<SessionEvent>) {
        self.history.ingest(record);
        if let RecordKind::InstallationParameters(p) = &record.kind {
            self.install(InstallationGeometry::from(p));
        }

        let outcome = match self.agg.dispatch(record) {
            Dispatch::NewPing(id) => {
                events.extend(self.close_ping());
                self.agg.begin_ping(id);
                self.open = true;
                self.agg.dispatch(record)
            }
            d => d,
        };
        match outcome {
            Dispatch::Late(_) => self.stats.late_records += 1,
            Dispatch::Ignored => self.stats.ignored_records += 1,
            _ => {}
        }
    }

    fn install(&mut self, geometry: InstallationGeometry) {
        match self.geometry {
            None => {
                log::info!("Using installation geometry from the stream");
                self.geometry = Some(geometry);
            }
            Some(current) if current != geometry => {
                if self.config.installation.is_some() {
                    log::debug!("Configured installation geometry overrides the stream");
                } else {
                    log::warn!("Ignoring installation record that differs from the first one");
                }
            }
            Some(_) => {}
        }
    }

    fn close_ping(&mut self) -> Option<SessionEvent> {
        if !self.open {
            return None;
        }
        self.open = false;
        let id = self.agg.ping.unwrap_or_default();

        if !self.agg.is_complete() {
            log::warn!(
                "Ping {} incomplete: no bathymetry record in {} records",
                id,
                self.agg.ping_records
            );
            self.stats.incomplete += 1;
            return Some(SessionEvent::Incomplete(IncompletePing {
                ping: id,
                records: self.agg.ping_records,
                reason: "no bathymetry record".to_string(),
            }));
        }

        let geometry = match self.geometry {
            Some(g) => g,
            None => {
                if !self.warned_geometry {
                    log::warn!("No installation geometry; assuming zero offsets");
                    self.warned_geometry = true;
                }
                InstallationGeometry::default()
            }
        };

        match solve(&self.agg, &self.history, &geometry, &self.config) {
            Ok(solved) => {
                self.stats.pings += 1;
                Some(SessionEvent::Ping(Box::new(self.emit(solved, &geometry))))
            }
            Err(e) => {
                log::warn!("Ping {} not solved: {}", id, e);
                self.stats.incomplete += 1;
                Some(SessionEvent::Incomplete(IncompletePing {
                    ping: id,
                    records: self.agg.ping_records,
                    reason: e.to_string(),
                }))
            }
        }
    }

    fn emit(&mut self, solved: SolvedBathymetry, geometry: &InstallationGeometry) -> EmittedPing {
        let mosaic = build_mosaic(&mut self.agg, &solved, &self.config.mosaic_options());

        let agg = &mut self.agg;
        let time = agg.bathymetry_header.time;
        let timestamp = time.timestamp().unwrap_or_default();
        let embedded = agg.bathymetry_optional.as_ref();
        let position = self.history.position(timestamp).ok().or_else(|| {
            embedded.map(|o| GeoPosition {
                latitude: o.latitude,
                longitude: o.longitude,
            })
        });
        let speed = self.history.speed(timestamp).ok();

        let optional = solved.to_optional(agg.sonar_settings.frequency, position.unwrap_or_default());
        let processed = Record::new(
            agg.bathymetry_header.clone(),
            RecordKind::Bathymetry(agg.bathymetry.clone()),
        )
        .with_optional(optional.to_bytes());

        agg.solved = Some(solved.clone());
        agg.mosaic = mosaic.clone();
        agg.present |= PresenceFlags::SOLVED;
        let snapshot = self
            .config
            .snapshot_records
            .then(|| Box::new(agg.snapshot()));

        let sound_velocity_profile = if agg.has(PresenceFlags::SOUND_VELOCITY_PROFILE) {
            agg.sound_velocity_profile.samples.clone()
        } else {
            Vec::new()
        };

        EmittedPing {
            ping: agg.ping.unwrap_or_default(),
            time,
            timestamp,
            position,
            heading: solved.heading,
            speed,
            draft: geometry.draft(),
            sound_speed: solved.sound_speed,
            sound_velocity_profile,
            comments: agg.comments.clone(),
            bathymetry: solved,
            mosaic,
            processed,
            snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::detection::{RawDetection, RawDetectionPoint};
    use crate::protocol::event::SystemEventMessage;
    use crate::protocol::nav::SoundVelocityProfile;
    use crate::protocol::sonar::{Bathymetry, BeamGeometry, InstallationParameters};
    use crate::protocol::{decode, encode, RecordHeader};

    const T0: f64 = 1_600_000_000.0;

    fn record(t: f64, kind: RecordKind) -> Vec<u8> {
        let time = RecordTime::from_timestamp(T0 + t).unwrap();
        encode(&Record::new(RecordHeader::new(0, time), kind))
    }

    fn geometry() -> Vec<u8> {
        record(
            0.0,
            RecordKind::BeamGeometry(BeamGeometry {
                angle_alongtrack: vec![0.0, 0.0],
                angle_acrosstrack: vec![0.0, 5f32.to_radians()],
                beamwidth_alongtrack: vec![0.01; 2],
                beamwidth_acrosstrack: vec![0.01; 2],
                ..Default::default()
            }),
        )
    }

    fn bathymetry(ping_number: u32) -> Vec<u8> {
        record(
            f64::from(ping_number),
            RecordKind::Bathymetry(Bathymetry {
                ping_number,
                sound_velocity: 1500.0,
                range: vec![10.0, 12.0],
                quality: vec![0x0F; 2],
                ..Default::default()
            }),
        )
    }

    fn unknown() -> Vec<u8> {
        record(
            0.5,
            RecordKind::Unhandled {
                record_type: 9999,
                payload: vec![1, 2, 3, 4],
            },
        )
    }

    fn pings(events: &[SessionEvent]) -> Vec<&EmittedPing> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Ping(p) => Some(p.as_ref()),
                _ => None,
            })
            .collect()
    }

    fn run(stream: &[u8], chunk: usize) -> (Vec<SessionEvent>, SessionStats) {
        let mut session = Session::new(ProcessingConfig::default()).unwrap();
        let mut events = Vec::new();
        for c in stream.chunks(chunk) {
            events.extend(session.feed(c).unwrap());
        }
        events.extend(session.finish());
        (events, session.stats())
    }

    #[test]
    fn test_unknown_record_between_two_pings() {
        let stream = [geometry(), bathymetry(1), unknown(), bathymetry(2)].concat();
        let (events, stats) = run(&stream, 1000);
        assert_eq!(events.len(), 2);
        let p = pings(&events);
        assert_eq!(p.len(), 2);
        assert_eq!(p[0].ping.ping_number, 1);
        assert_eq!(p[1].ping.ping_number, 2);
        assert_eq!(stats.ignored_records, 1);

        let b0 = p[0].bathymetry.beams[0].solution.unwrap();
        assert!((b0.depth - 7500.0).abs() < 1e-6);
        assert!(b0.across_track.abs() < 1e-6);
    }

    #[test]
    fn test_ping_emitted_when_next_begins() {
        let mut session = Session::new(ProcessingConfig::default()).unwrap();
        let events = session.feed(&[geometry(), bathymetry(1)].concat()).unwrap();
        assert!(events.is_empty());
        let events = session.feed(&bathymetry(2)).unwrap();
        assert_eq!(pings(&events).len(), 1);
        assert_eq!(pings(&session.finish()).len(), 1);
        // nothing left to close
        assert!(session.finish().is_empty());
    }

    #[test]
    fn test_incomplete_ping_reported() {
        let raw = record(
            1.0,
            RecordKind::RawDetection(RawDetection {
                ping_number: 1,
                sampling_rate: 1000.0,
                detections: vec![RawDetectionPoint::default()],
                ..Default::default()
            }),
        );
        let stream = [raw, bathymetry(2)].concat();
        let (events, stats) = run(&stream, 64);
        assert_eq!(events.len(), 2);
        match &events[0] {
            SessionEvent::Incomplete(i) => {
                assert_eq!(i.ping.ping_number, 1);
                assert_eq!(i.records, 1);
            }
            other => panic!("expected incomplete ping, got {:?}", other),
        }
        assert!(matches!(&events[1], SessionEvent::Ping(p) if p.ping.ping_number == 2));
        assert_eq!(stats.incomplete, 1);
        assert_eq!(stats.pings, 1);
    }

    #[test]
    fn test_resync_past_garbage() {
        let garbage = vec![0xFFu8; 37];
        let stream = [geometry(), garbage, bathymetry(1), bathymetry(2)].concat();
        let (events, stats) = run(&stream, 13);
        assert_eq!(pings(&events).len(), 2);
        assert!(stats.framer.skipped_bytes >= 37);
    }

    #[test]
    fn test_resource_failure_is_fatal() {
        let config = ProcessingConfig {
            framer_limit: 100,
            ..Default::default()
        };
        let mut session = Session::new(config).unwrap();
        let r = session.feed(&[0u8; 200]);
        assert!(matches!(r, Err(SessionError::Resource(_))));
    }

    #[test]
    fn test_metadata_carried() {
        let svp = record(
            0.0,
            RecordKind::SoundVelocityProfile(SoundVelocityProfile {
                samples: vec![SvpSample {
                    depth: 0.0,
                    sound_velocity: 1490.0,
                }],
                ..Default::default()
            }),
        );
        let comment = record(
            0.0,
            RecordKind::SystemEventMessage(SystemEventMessage::comment("survey line 7")),
        );
        let mut install = InstallationParameters::default();
        install.receive.z = 2.0;
        let install = record(0.0, RecordKind::InstallationParameters(install));

        let stream = [svp, install, geometry(), bathymetry(1), comment].concat();
        let (events, _) = run(&stream, 4096);
        let p = pings(&events);
        assert_eq!(p.len(), 1);
        assert_eq!(p[0].sound_velocity_profile.len(), 1);
        assert_eq!(p[0].comments, vec!["survey line 7".to_string()]);
        assert!((p[0].draft - 2.0).abs() < 1e-6);
        let b0 = p[0].bathymetry.beams[0].solution.unwrap();
        assert!((b0.depth - 7502.0).abs() < 1e-3);
    }

    #[test]
    fn test_processed_record_carries_solution() {
        let stream = [geometry(), bathymetry(1)].concat();
        let (events, _) = run(&stream, 4096);
        let p = pings(&events)[0];
        let back = decode(&encode(&p.processed)).unwrap();
        let opt = back.optional_bathymetry().unwrap();
        assert_eq!(opt.beams.len(), 2);
        assert!((opt.beams[0].depth - 7500.0).abs() < 1e-2);
    }

    #[test]
    fn test_snapshot_on_request() {
        let config = ProcessingConfig {
            snapshot_records: true,
            ..Default::default()
        };
        let mut session = Session::new(config).unwrap();
        session.feed(&[geometry(), bathymetry(1)].concat()).unwrap();
        let events = session.finish();
        let p = pings(&events)[0];
        let snap = p.snapshot.as_ref().unwrap();
        assert!(snap.has(PresenceFlags::SOLVED));
        assert_eq!(snap.bathymetry.range, vec![10.0, 12.0]);
    }

    #[test]
    fn test_sessions_are_independent() {
        let stream = [geometry(), bathymetry(1)].concat();
        let mut a = Session::new(ProcessingConfig::default()).unwrap();
        let mut b = Session::new(ProcessingConfig::default()).unwrap();
        a.feed(&stream).unwrap();
        assert_eq!(pings(&b.finish()).len(), 0);
        assert_eq!(pings(&a.finish()).len(), 1);
    }
}
