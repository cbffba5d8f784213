//! Sidescan mosaic builder
//!
//! Resamples one ping's backscatter onto a fixed across-track grid of
//! [`MOSAIC_PIXELS`] pixels centred under the sonar. Pixel `N/2` sits at
//! zero across-track; pixel `i` covers `(i - N/2) * pixel_size` metres,
//! port negative.
//!
//! Pixel size adapts to the swath unless pinned, and moves by at most
//! [`PIXEL_SIZE_DAMPING`] between pings so the image doesn't jump.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_GAP_BOUND;
use crate::ping::{PingAggregate, PresenceFlags};
use crate::solver::SolvedBathymetry;

/// Width of the mosaic in pixels
pub const MOSAIC_PIXELS: usize = 4096;

/// Largest relative change of the adaptive pixel size between pings
pub const PIXEL_SIZE_DAMPING: f64 = 0.05;

/// Nadir beamwidth setting the smallest useful pixel (degrees)
const MIN_BEAMWIDTH: f64 = 0.1;

/// Added to the widest beam when the swath follows the beams (degrees)
const SWATH_MARGIN: f64 = 2.5;

/// Swath angles are kept below this so the tangent stays finite (degrees)
const MAX_SWATH: f64 = 89.0;

/// Record supplying the backscatter samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackscatterSource {
    /// Calibrated snippet backscatter (7058)
    CalibratedSnippet,
    /// Snippet amplitudes (7028)
    Snippet,
    /// One intensity per beam from the bathymetry record (7006)
    BeamIntensity,
    /// Port and starboard wide-beam series (7007)
    WideBeam,
}

impl BackscatterSource {
    /// Default order of preference
    pub const PRIORITY: [BackscatterSource; 4] = [
        BackscatterSource::CalibratedSnippet,
        BackscatterSource::Snippet,
        BackscatterSource::BeamIntensity,
        BackscatterSource::WideBeam,
    ];

    fn available(&self, agg: &PingAggregate) -> bool {
        match self {
            BackscatterSource::CalibratedSnippet => {
                agg.has(PresenceFlags::SNIPPET_BACKSCATTER)
                    && !agg.snippet_backscatter.beams.is_empty()
                    && sample_rate(agg).is_some()
            }
            BackscatterSource::Snippet => {
                agg.has(PresenceFlags::SNIPPET)
                    && !agg.snippet.beams.is_empty()
                    && sample_rate(agg).is_some()
            }
            BackscatterSource::BeamIntensity => {
                agg.has(PresenceFlags::BATHYMETRY) && !agg.bathymetry.intensity.is_empty()
            }
            BackscatterSource::WideBeam => {
                agg.has(PresenceFlags::SIDESCAN)
                    && agg.sidescan.samples > 0
                    && sample_rate(agg).is_some()
            }
        }
    }

    /// The preferred source when present, else the best one present
    pub fn select(agg: &PingAggregate, preferred: Option<BackscatterSource>) -> Option<Self> {
        if let Some(p) = preferred {
            if p.available(agg) {
                return Some(p);
            }
            log::debug!("Preferred backscatter source {:?} not in this ping", p);
        }
        Self::PRIORITY.into_iter().find(|s| s.available(agg))
    }
}

impl std::str::FromStr for BackscatterSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "calibratedsnippet" | "calibrated" | "7058" => Ok(BackscatterSource::CalibratedSnippet),
            "snippet" | "7028" => Ok(BackscatterSource::Snippet),
            "beamintensity" | "beam" | "7006" => Ok(BackscatterSource::BeamIntensity),
            "widebeam" | "sidescan" | "7007" => Ok(BackscatterSource::WideBeam),
            _ => Err(format!("unknown backscatter source '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MosaicOptions {
    /// Pinned pixel size (m)
    pub pixel_size: Option<f64>,
    /// Pinned half swath (degrees)
    pub swath_width: Option<f64>,
    pub source: Option<BackscatterSource>,
    /// Longest null run that gets interpolated
    pub gap_bound: usize,
}

impl Default for MosaicOptions {
    fn default() -> Self {
        MosaicOptions {
            pixel_size: None,
            swath_width: None,
            source: None,
            gap_bound: DEFAULT_GAP_BOUND,
        }
    }
}

/// Pixel size and swath of the previous mosaic
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MosaicBaseline {
    pub pixel_size: Option<f64>,
    pub swath_width: Option<f64>,
}

/// One ping's across-track backscatter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mosaic {
    pub source: BackscatterSource,
    /// Metres per pixel
    pub pixel_size: f64,
    /// Half swath used for sizing (degrees)
    pub swath_width: f64,
    /// Mean amplitude per pixel; `None` where nothing landed
    pub amplitude: Vec<Option<f64>>,
    /// Mean along-track offset per pixel (m)
    pub along_track: Vec<Option<f64>>,
}

impl Mosaic {
    /// Across-track position of a pixel centre (m)
    pub fn across_track(&self, pixel: usize) -> f64 {
        (pixel as f64 - (MOSAIC_PIXELS / 2) as f64) * self.pixel_size
    }

    /// Pixels holding a value
    pub fn filled(&self) -> usize {
        self.amplitude.iter().filter(|a| a.is_some()).count()
    }
}

// =============================================================================
// Sizing
// =============================================================================

/// Sample rate of the ping's receiver (Hz)
fn sample_rate(agg: &PingAggregate) -> Option<f64> {
    let settings = agg
        .has(PresenceFlags::SONAR_SETTINGS)
        .then_some(agg.sonar_settings.sample_rate);
    let raw = agg
        .has(PresenceFlags::RAW_DETECTION)
        .then_some(agg.raw_detection.sampling_rate);
    let segmented = agg
        .has(PresenceFlags::SEGMENTED_RAW_DETECTION)
        .then(|| agg.segmented_raw_detection.segments.first().map(|s| s.sampling_rate))
        .flatten();
    [settings, raw, segmented]
        .into_iter()
        .flatten()
        .find(|r| r.is_finite() && *r > 0.0)
        .map(f64::from)
}

/// Half swath from the widest good beam (degrees)
pub fn swath_from_beams(solved: &SolvedBathymetry) -> Option<f64> {
    solved
        .good_beams()
        .map(|b| b.pointing_angle.abs().to_degrees())
        .fold(None, |acc: Option<f64>, a| Some(acc.map_or(a, |m| m.max(a))))
        .map(|a| (a + SWATH_MARGIN).min(MAX_SWATH))
}

/// Pixel size that fits the swath into the grid, floored at the nadir
/// footprint
pub fn candidate_pixel_size(swath_width: f64, median_depth: f64) -> f64 {
    let swath = swath_width.clamp(0.0, MAX_SWATH).to_radians();
    let fit = 2.0 * swath.tan() * median_depth / MOSAIC_PIXELS as f64;
    let floor = median_depth * MIN_BEAMWIDTH.to_radians().sin();
    fit.max(floor)
}

/// Limit the change from the previous pixel size to the damping bound
pub fn damp_pixel_size(previous: Option<f64>, candidate: f64) -> f64 {
    match previous {
        Some(p) if p > 0.0 => candidate.clamp(
            p * (1.0 - PIXEL_SIZE_DAMPING),
            p * (1.0 + PIXEL_SIZE_DAMPING),
        ),
        _ => candidate,
    }
}

// =============================================================================
// Binning
// =============================================================================

/// Sum and count per pixel
struct Bins {
    amplitude: Vec<f64>,
    along: Vec<f64>,
    count: Vec<u32>,
    pixel_size: f64,
    dropped: usize,
}

impl Bins {
    fn new(pixel_size: f64) -> Self {
        Bins {
            amplitude: vec![0.0; MOSAIC_PIXELS],
            along: vec![0.0; MOSAIC_PIXELS],
            count: vec![0; MOSAIC_PIXELS],
            pixel_size,
            dropped: 0,
        }
    }

    fn add(&mut self, across: f64, along: f64, value: f64) {
        if !(across.is_finite() && along.is_finite() && value.is_finite()) {
            self.dropped += 1;
            return;
        }
        let pixel = (MOSAIC_PIXELS / 2) as f64 + (across / self.pixel_size).round();
        if pixel < 0.0 || pixel >= MOSAIC_PIXELS as f64 {
            self.dropped += 1;
            return;
        }
        let i = pixel as usize;
        self.amplitude[i] += value;
        self.along[i] += along;
        self.count[i] += 1;
    }

    fn means(&self) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
        let mean = |sums: &[f64]| -> Vec<Option<f64>> {
            sums.iter()
                .zip(&self.count)
                .map(|(s, &n)| (n > 0).then(|| s / f64::from(n)))
                .collect()
        };
        (mean(&self.amplitude), mean(&self.along))
    }
}

/// Flat-bottom horizontal distance of a slant range below `height`
fn horizontal(slant: f64, height: f64) -> f64 {
    (slant * slant - height * height).max(0.0).sqrt()
}

/// Beams pointing closer to vertical than this have no side
const NADIR_POINTING: f64 = 1e-6;

/// Place one beam's samples: `values[k]` lies `offsets[k]` samples from the
/// detection
///
/// A nadir beam's returns come from both sides, so its samples are mirrored
/// to port and starboard.
fn bin_beam(
    bins: &mut Bins,
    solved: &SolvedBathymetry,
    beam: usize,
    sample_spacing: f64,
    samples: impl Iterator<Item = (f64, f64)>,
) {
    let Some(b) = solved.beams.get(beam) else {
        return;
    };
    let Some(s) = b.good() else {
        return;
    };
    let range = 0.5 * solved.sound_speed * b.two_way_time;
    let height = range * s.pointing_angle.cos();
    let (cos_az, sin_az) = (s.azimuth.cos(), s.azimuth.sin());
    let nadir = s.pointing_angle.abs() < NADIR_POINTING;
    for (offset, value) in samples {
        let x = horizontal(range + offset * sample_spacing, height);
        if nadir {
            bins.add(x, 0.0, value);
            if x > 0.0 {
                bins.add(-x, 0.0, value);
            }
        } else {
            bins.add(x * cos_az, x * sin_az, value);
        }
    }
}

fn bin_samples(
    bins: &mut Bins,
    agg: &PingAggregate,
    solved: &SolvedBathymetry,
    source: BackscatterSource,
) {
    let spacing = sample_rate(agg).map(|fs| solved.sound_speed / (2.0 * fs));
    match (source, spacing) {
        (BackscatterSource::CalibratedSnippet, Some(spacing)) => {
            for beam in &agg.snippet_backscatter.beams {
                let w = beam.window;
                let first = f64::from(w.begin_sample) - f64::from(w.detect_sample);
                let samples = beam
                    .strength
                    .iter()
                    .enumerate()
                    .map(|(k, &v)| (first + k as f64, f64::from(v)));
                bin_beam(bins, solved, usize::from(w.beam_number), spacing, samples);
            }
        }
        (BackscatterSource::Snippet, Some(spacing)) => {
            for beam in &agg.snippet.beams {
                let w = beam.window;
                let first = f64::from(w.begin_sample) - f64::from(w.detect_sample);
                let samples = beam
                    .amplitude
                    .iter()
                    .enumerate()
                    .map(|(k, &v)| (first + k as f64, f64::from(v)));
                bin_beam(bins, solved, usize::from(w.beam_number), spacing, samples);
            }
        }
        (BackscatterSource::BeamIntensity, _) => {
            for (b, &v) in solved.beams.iter().zip(&agg.bathymetry.intensity) {
                if let Some(s) = b.good() {
                    bins.add(s.across_track, s.along_track, f64::from(v));
                }
            }
        }
        (BackscatterSource::WideBeam, Some(spacing)) => {
            let Some(depth) = solved.median_depth() else {
                return;
            };
            let height = (depth - solved.sensor_depth).max(0.0);
            let sides = [
                (-1.0, agg.sidescan.port_amplitudes()),
                (1.0, agg.sidescan.starboard_amplitudes()),
            ];
            for (sign, series) in sides {
                for (k, v) in series.into_iter().enumerate() {
                    let x = horizontal(k as f64 * spacing, height);
                    bins.add(sign * x, 0.0, v);
                }
            }
        }
        _ => {}
    }
}

/// Linearly fill null runs no longer than `bound` that have a value on
/// both sides
pub fn fill_gaps(values: &mut [Option<f64>], bound: usize) {
    let mut last: Option<usize> = None;
    for i in 0..values.len() {
        let Some(right) = values[i] else {
            continue;
        };
        if let Some(l) = last {
            let run = i - l - 1;
            if run > 0 && run <= bound {
                if let Some(left) = values[l] {
                    for (k, v) in values[l + 1..i].iter_mut().enumerate() {
                        let f = (k + 1) as f64 / (run + 1) as f64;
                        *v = Some(left + (right - left) * f);
                    }
                }
            }
        }
        last = Some(i);
    }
}

// =============================================================================
// Build
// =============================================================================

/// Build the mosaic for the aggregate's current ping
///
/// Returns `None` when the ping has no backscatter or no good beam to size
/// the grid by. On success the aggregate's MOSAIC bit is set and its
/// baseline updated.
pub fn build_mosaic(
    agg: &mut PingAggregate,
    solved: &SolvedBathymetry,
    options: &MosaicOptions,
) -> Option<Mosaic> {
    let source = BackscatterSource::select(agg, options.source)?;

    let swath_width = match options.swath_width {
        Some(w) => w,
        None => swath_from_beams(solved).or(agg.mosaic_baseline.swath_width)?,
    };
    let pixel_size = match options.pixel_size {
        Some(p) => p,
        None => {
            let depth = solved.median_depth()?;
            damp_pixel_size(
                agg.mosaic_baseline.pixel_size,
                candidate_pixel_size(swath_width, depth),
            )
        }
    };
    if !(pixel_size.is_finite() && pixel_size > 0.0) {
        log::debug!("Unusable pixel size {}", pixel_size);
        return None;
    }

    let mut bins = Bins::new(pixel_size);
    bin_samples(&mut bins, agg, solved, source);
    if bins.dropped > 0 {
        log::debug!("{} backscatter samples fell outside the mosaic", bins.dropped);
    }
    let (mut amplitude, mut along_track) = bins.means();
    fill_gaps(&mut amplitude, options.gap_bound);
    fill_gaps(&mut along_track, options.gap_bound);

    agg.present |= PresenceFlags::MOSAIC;
    agg.mosaic_baseline = MosaicBaseline {
        pixel_size: Some(pixel_size),
        swath_width: Some(swath_width),
    };

    Some(Mosaic {
        source,
        pixel_size,
        swath_width,
        amplitude,
        along_track,
    })
}
