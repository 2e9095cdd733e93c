//! Reader for BIOPAC AcqKnowledge (.acq) physiological recording files.
//!
//! The format is undocumented and has drifted across twenty years of
//! revisions: two byte orders, version-dependent header shapes, and two
//! storage modes (interleaved samples with per-channel rate dividers, or
//! per-channel zlib streams). This crate parses all of that into one
//! uniform model and can stream sample data without holding a whole
//! recording in memory.
//!
//! ```no_run
//! let datafile = acq_reader::read_file("recording.acq").unwrap();
//! for channel in &datafile.channels {
//!     println!("{}: {} samples [{}]", channel.name, channel.point_count, channel.units);
//! }
//! ```
//!
//! For large files, open without materialising and stream:
//!
//! ```no_run
//! use acq_reader::StreamControl;
//!
//! let (datafile, mut samples) = acq_reader::open_file("recording.acq").unwrap();
//! samples
//!     .stream(|channel, start, block| {
//!         println!("channel {channel}: {} samples at {start}", block.len());
//!         StreamControl::Continue
//!     })
//!     .unwrap();
//! # drop(datafile);
//! ```
//!
//! Logging goes through `tracing`; install a subscriber to see it.

pub mod core;

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use tempfile::SpooledTempFile;

// Re-export the public surface
pub use crate::core::data::{SampleBlock, SampleReader, StreamControl};
pub use crate::core::encoding::TextEncoding;
pub use crate::core::error::{AcqError, ReadWarning, Result};
pub use crate::core::model::{Channel, Datafile, Journal, Marker, RawData, SampleDtype};
pub use crate::core::reader::AcqReader;
pub use crate::core::source::ByteOrder;

/// Read a file and materialise every channel's samples.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Datafile> {
    let (mut datafile, mut samples) = open_file(path)?;
    samples.read_all(&mut datafile)?;
    Ok(datafile)
}

/// Parse a file's headers only. The returned [`SampleReader`] holds the
/// open file and can materialise channels or stream them.
pub fn open_file<P: AsRef<Path>>(path: P) -> Result<(Datafile, SampleReader<File>)> {
    AcqReader::open(path)
}

/// `read_file` over anything seekable.
pub fn read<S: Read + Seek>(source: S) -> Result<Datafile> {
    let (mut datafile, mut samples) = open(source)?;
    samples.read_all(&mut datafile)?;
    Ok(datafile)
}

/// `open_file` over anything seekable.
pub fn open<S: Read + Seek>(source: S) -> Result<(Datafile, SampleReader<S>)> {
    AcqReader::parse(source)
}

/// Read from a non-seekable stream (a pipe, stdin) by spooling it into a
/// temporary buffer first.
pub fn read_stream<R: Read>(input: R) -> Result<Datafile> {
    let (mut datafile, mut samples) = open_stream(input)?;
    samples.read_all(&mut datafile)?;
    Ok(datafile)
}

/// Header-only variant of [`read_stream`].
pub fn open_stream<R: Read>(
    input: R,
) -> Result<(Datafile, SampleReader<SpooledTempFile>)> {
    AcqReader::spool(input)
}
