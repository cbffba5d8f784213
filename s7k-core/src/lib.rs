//! # s7k-core
//!
//! Reson 7k sonar record processing with **zero I/O dependencies**.
//!
//! Bytes from a `.s7k` file or a live feed are pushed into a [`Session`],
//! which frames and decodes records, collects them into one ping at a time
//! and, when a ping closes, solves its bathymetry and builds a sidescan
//! mosaic line.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Session                                                     │
//! │  ├── protocol/  RecordFramer → decode → Record               │
//! │  ├── history    navigation and attitude time series          │
//! │  ├── ping       PingAggregate: sticky + per-ping records     │
//! │  ├── solver/    travel time + steering → depth, position     │
//! │  └── mosaic     backscatter → across-track pixel line        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Modules
//!
//! - [`protocol`] - Record layouts, checksum, stream framing
//! - [`ping`] - Per-ping aggregation and record dispatch
//! - [`solver`] - Beam solutions and quality classification
//! - [`mosaic`] - Sidescan line builder
//! - [`session`] - One input stream, start to finish
//!
//! ## Example
//!
//! ```rust,no_run
//! use s7k_core::{ProcessingConfig, Session, SessionEvent};
//!
//! let bytes: &[u8] = &[]; // contents of a .s7k file
//! let mut session = Session::new(ProcessingConfig::default()).unwrap();
//! let mut events = session.feed(bytes).unwrap();
//! events.extend(session.finish());
//! for event in events {
//!     if let SessionEvent::Ping(ping) = event {
//!         println!("ping {}: {} good beams", ping.ping, ping.bathymetry.good_count());
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod geometry;
pub mod history;
pub mod mosaic;
pub mod ping;
pub mod protocol;
pub mod session;
pub mod solver;

// Re-export commonly used types
pub use config::ProcessingConfig;
pub use error::{CodecError, SessionError, SolveError};
pub use geometry::{InstallationGeometry, MountOffset};
pub use history::{GeoPosition, Motion, NavAttitudeHistory, NavAttitudeSource};
pub use mosaic::{BackscatterSource, Mosaic};
pub use ping::{Dispatch, PingAggregate, PingId, PresenceFlags};
pub use protocol::{decode, encode, Record, RecordFramer, RecordKind};
pub use session::{EmittedPing, IncompletePing, Session, SessionEvent, SessionStats};
pub use solver::{solve, BeamSolution, SolvedBathymetry, SolvedBeam};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
