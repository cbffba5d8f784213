//! Choice of the record that supplies per-beam travel time and steering

use serde::{Deserialize, Serialize};

use crate::ping::{PingAggregate, PresenceFlags};

/// Where a ping's detections come from, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionSource {
    /// Raw detection record (7027)
    RawDetection,
    /// Segmented raw detection (7047) with its detection setup (7017)
    SegmentedWithSetup,
    /// Segmented raw detection (7047) alone
    Segmented,
    /// Bathymetry ranges (7006) with beam geometry angles (7004)
    Legacy,
    /// Nothing usable
    None,
}

/// One beam's detection, whatever record it came from
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BeamDetection {
    /// Two way travel time (s)
    pub two_way_time: f64,
    /// Transmit (along track) steering angle (radians)
    pub tx_steer: f64,
    /// Receive (across track) steering angle (radians)
    pub rx_steer: f64,
    /// Quality byte in the record's own convention
    pub raw_quality: u8,
    pub signal_strength: Option<f64>,
    /// Failed the detection setup's user criteria
    pub setup_rejected: bool,
}

impl DetectionSource {
    /// Pick the best source present in the aggregate
    pub fn select(agg: &PingAggregate) -> Self {
        if agg.has(PresenceFlags::RAW_DETECTION)
            && !agg.raw_detection.detections.is_empty()
            && agg.raw_detection.sampling_rate > 0.0
        {
            DetectionSource::RawDetection
        } else if agg.has(PresenceFlags::SEGMENTED_RAW_DETECTION)
            && !agg.segmented_raw_detection.detections.is_empty()
        {
            if agg.has(PresenceFlags::DETECTION_SETUP) {
                DetectionSource::SegmentedWithSetup
            } else {
                DetectionSource::Segmented
            }
        } else if agg.has(PresenceFlags::BATHYMETRY | PresenceFlags::BEAM_GEOMETRY)
            && agg.beam_geometry.number_beams() > 0
        {
            DetectionSource::Legacy
        } else {
            DetectionSource::None
        }
    }

    /// Detections indexed by beam number; `number_beams` long
    ///
    /// Beams the source says nothing about stay `None`.
    pub fn detections(&self, agg: &PingAggregate, number_beams: usize) -> Vec<Option<BeamDetection>> {
        let mut out = vec![None; number_beams];
        let mut put = |beam: usize, d: BeamDetection| match out.get_mut(beam) {
            Some(slot) => *slot = Some(d),
            None => log::debug!("Detection for beam {} beyond {} beams", beam, number_beams),
        };

        match self {
            DetectionSource::RawDetection => {
                let raw = &agg.raw_detection;
                let rate = f64::from(raw.sampling_rate);
                for p in &raw.detections {
                    put(
                        usize::from(p.beam_descriptor),
                        BeamDetection {
                            two_way_time: f64::from(p.detection_point) / rate,
                            tx_steer: f64::from(raw.tx_angle),
                            rx_steer: f64::from(p.rx_angle),
                            raw_quality: p.quality_byte(),
                            signal_strength: Some(f64::from(p.signal_strength)),
                            setup_rejected: false,
                        },
                    );
                }
            }
            DetectionSource::SegmentedWithSetup | DetectionSource::Segmented => {
                let seg = &agg.segmented_raw_detection;
                let with_setup = *self == DetectionSource::SegmentedWithSetup;
                for d in &seg.detections {
                    let Some(segment) = seg.segment_for(d) else {
                        log::debug!(
                            "Beam {} uses missing segment {}",
                            d.beam_number,
                            d.used_segment
                        );
                        continue;
                    };
                    if segment.sampling_rate <= 0.0 {
                        continue;
                    }
                    let setup_rejected = with_setup
                        && agg
                            .detection_setup
                            .beams
                            .iter()
                            .find(|b| b.beam_descriptor == d.beam_number)
                            .is_some_and(|b| !b.passed_user_criteria());
                    put(
                        usize::from(d.beam_number),
                        BeamDetection {
                            two_way_time: f64::from(d.detection_point)
                                / f64::from(segment.sampling_rate)
                                + f64::from(seg.rx_delay),
                            tx_steer: f64::from(segment.tx_angle_along),
                            rx_steer: f64::from(d.rx_angle_cross),
                            raw_quality: d.quality_byte(),
                            signal_strength: Some(f64::from(d.signal_strength)),
                            setup_rejected,
                        },
                    );
                }
            }
            DetectionSource::Legacy => {
                let bathy = &agg.bathymetry;
                let geo = &agg.beam_geometry;
                for (i, (&range, &quality)) in bathy.range.iter().zip(&bathy.quality).enumerate() {
                    let (Some(&along), Some(&across)) =
                        (geo.angle_alongtrack.get(i), geo.angle_acrosstrack.get(i))
                    else {
                        break;
                    };
                    put(
                        i,
                        BeamDetection {
                            two_way_time: f64::from(range),
                            tx_steer: f64::from(along),
                            rx_steer: f64::from(across),
                            raw_quality: quality,
                            signal_strength: None,
                            setup_rejected: false,
                        },
                    );
                }
            }
            DetectionSource::None => {}
        }
        out
    }
}
