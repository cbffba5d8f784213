//! # s7k-tool
//!
//! Command line front end for [`s7k_core`]: streams `.s7k` files through a
//! [`Session`] and prints one line (or one JSON object) per ping.
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all options. Key options:
//!
//! - `-v` - Increase verbosity (use multiple times)
//! - `--config` - JSON processing configuration, overridden by the flags below
//! - `--format json` - One JSON object per ping instead of text
//! - `--records` - List record headers instead of solving pings

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use clap::Parser;
use serde::Serialize;

use s7k_core::protocol::RecordTime;
use s7k_core::{
    BackscatterSource, EmittedPing, IncompletePing, ProcessingConfig, RecordFramer, Session,
    SessionEvent, SessionStats,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bytes read from a file per feed
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(clap::ValueEnum, Clone, Copy, Default, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Processing configuration (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value_t, value_enum)]
    pub format: OutputFormat,

    /// List record headers instead of solving pings
    #[arg(long, default_value_t = false)]
    pub records: bool,

    /// Mosaic pixel size in metres (default adapts per ping)
    #[arg(long)]
    pub pixel_size: Option<f64>,

    /// Mosaic half swath in degrees (default follows the beams)
    #[arg(long)]
    pub swath_width: Option<f64>,

    /// Preferred backscatter source: calibrated, snippet, beam or sidescan
    #[arg(long)]
    pub sidescan_source: Option<BackscatterSource>,

    /// Scale steering angles by this sound speed ratio
    #[arg(long)]
    pub sound_speed_ratio: Option<f64>,

    /// Ignore vessel roll and pitch
    #[arg(long, default_value_t = false)]
    pub zero_attitude: bool,

    /// Force transmit steering to zero
    #[arg(long, default_value_t = false)]
    pub zero_alongtrack: bool,

    /// Longest run of empty mosaic pixels to interpolate
    #[arg(long)]
    pub gap: Option<usize>,

    /// Input files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Totals for one input file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub path: PathBuf,
    #[serde(flatten)]
    pub stats: SessionStats,
}

impl std::fmt::Display for FileSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} records, {} bytes skipped, {} framing errors, {} pings, {} incomplete",
            self.path.display(),
            self.stats.framer.records,
            self.stats.framer.skipped_bytes,
            self.stats.framer.framing_errors,
            self.stats.pings,
            self.stats.incomplete
        )
    }
}

/// Configuration from `--config` with command line overrides applied
pub fn processing_config(cli: &Cli) -> Result<ProcessingConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read config {}", path.display()))?;
            ProcessingConfig::from_json(&text)
                .with_context(|| format!("Bad config {}", path.display()))?
        }
        None => ProcessingConfig::default(),
    };

    if cli.pixel_size.is_some() {
        config.pixel_size = cli.pixel_size;
    }
    if cli.swath_width.is_some() {
        config.swath_width = cli.swath_width;
    }
    if cli.sidescan_source.is_some() {
        config.sidescan_source = cli.sidescan_source;
    }
    if cli.sound_speed_ratio.is_some() {
        config.sound_speed_ratio = cli.sound_speed_ratio;
    }
    config.zero_attitude_correction |= cli.zero_attitude;
    config.zero_alongtrack_angle |= cli.zero_alongtrack;
    if let Some(gap) = cli.gap {
        config.gap_bound = gap;
    }

    config.validate().context("Invalid options")?;
    Ok(config)
}

/// Process every file on the command line
pub fn run<W: Write>(cli: &Cli, out: &mut W) -> Result<Vec<FileSummary>> {
    let config = processing_config(cli)?;
    let mut summaries = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let summary = if cli.records {
            list_records(path, &config, out)?
        } else {
            process_file(path, &config, cli.format, out)?
        };
        log::info!("{}", summary);
        match cli.format {
            OutputFormat::Text => writeln!(out, "{}", summary)?,
            OutputFormat::Json => {
                writeln!(out, "{}", serde_json::json!({ "summary": &summary }))?
            }
        }
        summaries.push(summary);
    }
    Ok(summaries)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("Cannot open {}", path.display()))
}

/// Solve every ping in `path` and write them to `out`
pub fn process_file<W: Write>(
    path: &Path,
    config: &ProcessingConfig,
    format: OutputFormat,
    out: &mut W,
) -> Result<FileSummary> {
    let mut file = open(path)?;
    let mut session = Session::new(config.clone())?;
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Read failed on {}", path.display()))?;
        if n == 0 {
            break;
        }
        let events = session
            .feed(&buf[..n])
            .with_context(|| format!("Giving up on {}", path.display()))?;
        write_events(&events, format, out)?;
    }
    write_events(&session.finish(), format, out)?;

    Ok(FileSummary {
        path: path.to_path_buf(),
        stats: session.stats(),
    })
}

/// List the record headers in `path`
pub fn list_records<W: Write>(
    path: &Path,
    config: &ProcessingConfig,
    out: &mut W,
) -> Result<FileSummary> {
    let mut file = open(path)?;
    let mut framer = RecordFramer::new(config.framer_limit);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut at_end = false;

    while !at_end {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Read failed on {}", path.display()))?;
        at_end = n == 0;
        framer.push(&buf[..n])?;
        loop {
            let record = if at_end {
                framer.next_record_at_end()
            } else {
                framer.next_record()
            };
            let Some(record) = record else { break };
            writeln!(
                out,
                "{:5} {:<26} {:8} {} #{}",
                record.header.record_type,
                record.kind.name(),
                record.header.size,
                format_time(&record.header.time),
                record.header.record_number
            )?;
        }
    }

    Ok(FileSummary {
        path: path.to_path_buf(),
        stats: SessionStats {
            framer: framer.stats(),
            ..Default::default()
        },
    })
}

fn write_events<W: Write>(events: &[SessionEvent], format: OutputFormat, out: &mut W) -> Result<()> {
    for event in events {
        match format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut *out, event)?;
                writeln!(out)?;
            }
            OutputFormat::Text => match event {
                SessionEvent::Ping(ping) => writeln!(out, "{}", format_ping(ping))?,
                SessionEvent::Incomplete(ping) => writeln!(out, "{}", format_incomplete(ping))?,
            },
        }
    }
    Ok(())
}

pub fn format_time(time: &RecordTime) -> String {
    match time.to_datetime() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => time.to_string(),
    }
}

/// One text line per solved ping
pub fn format_ping(ping: &EmittedPing) -> String {
    let b = &ping.bathymetry;
    let depth = match b.depth_range() {
        Some((min, max)) => format!("depth {:.2}..{:.2} m", min, max),
        None => "depth -".to_string(),
    };
    let pixel = match &ping.mosaic {
        Some(m) => format!("pixel {:.3} m", m.pixel_size),
        None => "no mosaic".to_string(),
    };
    format!(
        "{} ping {} {:?} beams {}/{} {} {}",
        format_time(&ping.time),
        ping.ping.ping_number,
        b.source,
        b.good_count(),
        b.beams.len(),
        depth,
        pixel
    )
}

pub fn format_incomplete(ping: &IncompletePing) -> String {
    format!(
        "ping {} incomplete after {} records: {}",
        ping.ping.ping_number, ping.records, ping.reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use s7k_core::protocol::sonar::{Bathymetry, BeamGeometry};
    use s7k_core::protocol::{encode, Record, RecordHeader, RecordKind};

    fn record(t: f64, kind: RecordKind) -> Vec<u8> {
        let time = RecordTime::from_timestamp(1_600_000_000.0 + t).unwrap();
        encode(&Record::new(RecordHeader::new(0, time), kind))
    }

    fn survey() -> Vec<u8> {
        let geometry = record(
            0.0,
            RecordKind::BeamGeometry(BeamGeometry {
                angle_alongtrack: vec![0.0; 2],
                angle_acrosstrack: vec![-0.1, 0.1],
                beamwidth_alongtrack: vec![0.01; 2],
                beamwidth_acrosstrack: vec![0.01; 2],
                ..Default::default()
            }),
        );
        let mut stream = geometry;
        for ping_number in 1..=3 {
            stream.extend(record(
                f64::from(ping_number),
                RecordKind::Bathymetry(Bathymetry {
                    ping_number,
                    sound_velocity: 1500.0,
                    range: vec![0.02, 0.02],
                    quality: vec![0x0F; 2],
                    ..Default::default()
                }),
            ));
        }
        stream
    }

    fn write_survey(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("survey.s7k");
        std::fs::write(&path, survey()).unwrap();
        path
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("s7k-tool").chain(args.iter().copied()))
    }

    #[test]
    fn test_text_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_survey(&dir);
        let mut out = Vec::new();
        let summaries = run(&cli(&[path.to_str().unwrap()]), &mut out).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].stats.pings, 3);
        assert_eq!(summaries[0].stats.framer.records, 4);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("ping 1 Legacy beams "));
        assert!(lines[0].ends_with("no mosaic"));
        assert!(lines[3].contains("3 pings, 0 incomplete"));
    }

    #[test]
    fn test_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_survey(&dir);
        let mut out = Vec::new();
        run(&cli(&["--format", "json", path.to_str().unwrap()]), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let values: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(values.len(), 4);
        assert_eq!(values[0]["event"], "ping");
        assert_eq!(values[1]["ping"]["pingNumber"], 2);
        assert_eq!(values[3]["summary"]["pings"], 3);
    }

    #[test]
    fn test_record_listing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_survey(&dir);
        let mut out = Vec::new();
        run(&cli(&["--records", path.to_str().unwrap()]), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("BeamGeometry"));
        assert!(lines[1].starts_with(" 7006"));
        assert!(lines[4].contains("4 records"));
    }

    #[test]
    fn test_config_file_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.json");
        std::fs::write(&config, r#"{ "pixelSize": 0.5, "gapBound": 4 }"#).unwrap();

        let c = processing_config(&cli(&[
            "--config",
            config.to_str().unwrap(),
            "--gap",
            "2",
            "--sidescan-source",
            "snippet",
            "--zero-attitude",
            "x.s7k",
        ]))
        .unwrap();
        assert_eq!(c.pixel_size, Some(0.5));
        assert_eq!(c.gap_bound, 2);
        assert_eq!(c.sidescan_source, Some(BackscatterSource::Snippet));
        assert!(c.zero_attitude_correction);
    }

    #[test]
    fn test_invalid_override_rejected() {
        assert!(processing_config(&cli(&["--swath-width", "120", "x.s7k"])).is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.s7k");
        let mut out = Vec::new();
        let err = run(&cli(&[path.to_str().unwrap()]), &mut out).unwrap_err();
        assert!(format!("{:#}", err).contains("Cannot open"));
    }
}
