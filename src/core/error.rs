// Error handling for the AcqKnowledge reader

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AcqError>;

#[derive(Error, Debug)]
pub enum AcqError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source ended mid-field at offset {offset}")]
    InsufficientData { offset: u64 },

    #[error("seek to offset {offset} failed")]
    Seek { offset: u64 },

    #[error("unsupported file revision {revision} (earliest known is {earliest})")]
    UnsupportedRevision { revision: i64, earliest: u32 },

    #[error(
        "could not locate channel datatype headers after the foreign data header \
         ({scanned} offsets tried)"
    )]
    ForeignHeaderAmbiguous { scanned: usize },

    #[error("zlib decompression failed for channel {channel}: {reason}")]
    Inflate { channel: usize, reason: String },

    #[error("bad {kind} header at offset {offset}: {reason}")]
    BadHeader {
        kind: &'static str,
        offset: u64,
        reason: String,
    },
}

/// Recoverable problems found while parsing. These never abort the read;
/// they are collected on the `Datafile` and logged as they happen.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum ReadWarning {
    /// A marker's channel number matched no channel's order number.
    UnmatchedMarkerChannel {
        marker_index: usize,
        channel_number: i32,
    },
    /// No candidate encoding decoded a string losslessly; a lossy decode
    /// was kept and the raw bytes are preserved here.
    LossyText { raw: Vec<u8>, decoded: String },
    /// The journal section of an uncompressed file could not be parsed.
    Journal { reason: String },
    /// The marker section was missing or truncated.
    Markers { reason: String },
}

impl std::fmt::Display for ReadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadWarning::UnmatchedMarkerChannel {
                marker_index,
                channel_number,
            } => write!(
                f,
                "marker {marker_index} references channel number {channel_number}, \
                 which matches no channel"
            ),
            ReadWarning::LossyText { raw, .. } => {
                write!(f, "no encoding decoded {} bytes of text losslessly", raw.len())
            }
            ReadWarning::Journal { reason } => write!(f, "journal not read: {reason}"),
            ReadWarning::Markers { reason } => write!(f, "markers not read: {reason}"),
        }
    }
}
