// Field tables and typed accessors for every header kind in an .acq file.
//
// Field names follow the hungarian-ish names seen in format notes and hex
// dumps so the tables can be checked against them directly. Pre-4 and
// post-4 files diverge enough that graph, channel, foreign and
// main-compression headers get separate tables; the split point is V_400B.
//
// The accessors deliberately read only the handful of fields needed to
// navigate the file and build the data model. Everything else rides along
// in the record bag (UI state, measurement setup, colors) and is not
// interpreted.

use crate::core::error::{AcqError, Result};
use crate::core::revisions::*;
use crate::core::schema::{f, FieldKind::*, HeaderRecord, HeaderSchema, Prim::*};

/// Tag opening a pre-4 journal header. Doubles as the sentinel that a
/// marker metadata block is absent.
pub const JOURNAL_TAG: [u8; 4] = [0x44, 0x33, 0x22, 0x11];

pub fn is_post4(revision: u32) -> bool {
    revision >= V_400B
}

fn non_negative(rec: &HeaderRecord, name: &'static str) -> Result<usize> {
    let v = rec.require_int(name)?;
    usize::try_from(v).map_err(|_| AcqError::BadHeader {
        kind: rec.kind,
        offset: rec.offset,
        reason: format!("{name} is negative ({v})"),
    })
}

// ── Graph header ───────────────────────────────────────────────────

const GRAPH_PRE4: HeaderSchema = HeaderSchema {
    kind: "Graph",
    fields: &[
        f("nItemHeaderLen", Scalar(I16), V_ALL),
        f("lVersion", Scalar(I32), V_ALL),
        f("lExtItemHeaderLen", Scalar(I32), V_20A),
        f("nChannels", Scalar(I16), V_20A),
        f("nHorizAxisType", Scalar(I16), V_20A),
        f("nCurChannel", Scalar(I16), V_20A),
        f("dSampleTime", Scalar(F64), V_20A),
        f("dTimeOffset", Scalar(F64), V_20A),
        f("dTimeScale", Scalar(F64), V_20A),
        f("dTimeCursor1", Scalar(F64), V_20A),
        f("dTimeCursor2", Scalar(F64), V_20A),
        f("rcWindow", Array(I16, 4), V_20A),
        f("nMeasurement", Array(I16, 6), V_20A),
        f("fHilite", Scalar(I16), V_20A),
        f("dFirstTimeOffset", Scalar(F64), V_20A),
        f("nRescale", Scalar(I16), V_20A),
        f("szHorizUnits1", Text(40), V_20A),
        f("szHorizUnits2", Text(10), V_20A),
        f("nInMemory", Scalar(I16), V_20A),
        f("fGrid", Scalar(I16), V_20A),
        f("fMarkers", Scalar(I16), V_20A),
        f("nPlotDraft", Scalar(I16), V_20A),
        f("nDispMode", Scalar(I16), V_20A),
        f("rRReserved", Scalar(I16), V_20A),
        f("BShowToolBar", Scalar(I16), V_30R),
        f("BShowChannelButtons", Scalar(I16), V_30R),
        f("BShowMeasurements", Scalar(I16), V_30R),
        f("BShowMarkers", Scalar(I16), V_30R),
        f("BShowJournal", Scalar(I16), V_30R),
        f("CurXChannel", Scalar(I16), V_30R),
        f("MmtPrecision", Scalar(I16), V_30R),
        f("NMeasurementRows", Scalar(I16), V_303),
        f("mmt40", Array(I16, 40), V_303),
        f("mmtChan40", Array(I16, 40), V_303),
        f("MmtCalcOpnd1", Array(I16, 40), V_35X),
        f("MmtCalcOpnd2", Array(I16, 40), V_35X),
        f("MmtCalcOp", Array(I16, 40), V_35X),
        f("MmtCalcConstant", Array(F64, 40), V_35X),
        f("bNewGridWithMinor", Scalar(I32), V_370),
        f("colorMajorGrid", Bytes(4), V_370),
        f("colorMinorGrid", Bytes(4), V_370),
        f("wMajorGridStyle", Scalar(I16), V_370),
        f("wMinorGridStyle", Scalar(I16), V_370),
        f("wMajorGridWidth", Scalar(I16), V_370),
        f("wMinorGridWidth", Scalar(I16), V_370),
        f("bFixedUnitsDiv", Scalar(I32), V_370),
        f("bMid_Range_Show", Scalar(I32), V_370),
        f("dStart_Middle_Point", Scalar(F64), V_370),
        f("dOffset_Point", Array(F64, 60), V_370),
        f("hGrid", Scalar(F64), V_370),
        f("vGrid", Array(F64, 60), V_370),
        f("bEnableWaveTools", Scalar(I32), V_370),
        f("hozizPrecision", Scalar(I16), V_373),
        f("Reserved", Bytes(20), V_381),
        f("bOverlapMode", Scalar(I32), V_381),
        f("bShowHardware", Scalar(I32), V_381),
        f("bXAutoPlot", Scalar(I32), V_381),
        f("bXAutoScroll", Scalar(I32), V_381),
        f("bStartButtonVisible", Scalar(I32), V_381),
        f("bCompressed", Scalar(I32), V_381),
        f("bAlwaysStartButtonVisible", Scalar(I32), V_381),
        f("pathVideo", Text(260), V_382),
        f("optSyncDelay", Scalar(I32), V_382),
        f("syncDelay", Scalar(F64), V_382),
        f("bHRP_PasteMeasurements", Scalar(I32), V_382),
        f("graphType", Scalar(I32), V_390),
        f("mmtCalcExpr", Text(10240), V_390),
        f("mmtMomentOrder", Array(I32, 40), V_390),
        f("mmtTimeDelay", Array(I32, 40), V_390),
        f("mmtEmbedDim", Array(I32, 40), V_390),
        f("mmtMIDelay", Array(I32, 40), V_390),
    ],
};

const GRAPH_POST4: HeaderSchema = HeaderSchema {
    kind: "Graph",
    fields: &[
        f("nItemHeaderLen", Scalar(I16), V_ALL),
        f("lVersion", Scalar(I32), V_ALL),
        f("lExtItemHeaderLen", Scalar(I32), V_20A),
        f("nChannels", Scalar(I16), V_20A),
        f("nHorizAxisType", Scalar(I16), V_20A),
        f("nCurChannel", Scalar(I16), V_20A),
        f("dSampleTime", Scalar(F64), V_20A),
        f("dTimeOffset", Scalar(F64), V_20A),
        f("dTimeScale", Scalar(F64), V_20A),
        f("dTimeCursor1", Scalar(F64), V_20A),
        f("dTimeCursor2", Scalar(F64), V_20A),
        f("rcWindow", Array(I16, 4), V_20A),
        f("nMeasurement", Array(I16, 6), V_20A),
        f("fHilite", Scalar(I16), V_20A),
        f("dFirstTimeOffset", Scalar(F64), V_20A),
        f("nRescale", Scalar(I16), V_20A),
        f("szHorizUnits1", Text(40), V_20A),
        f("szHorizUnits2", Text(10), V_20A),
        f("nInMemory", Scalar(I16), V_20A),
        f("fGrid", Scalar(I16), V_20A),
        f("fMarkers", Scalar(I16), V_20A),
        f("nPlotDraft", Scalar(I16), V_20A),
        f("nDispMode", Scalar(I16), V_20A),
        f("rRReserved", Scalar(I16), V_20A),
        f("Unknown", Bytes(822), V_400B),
        f("bCompressed", Scalar(I32), V_400B),
        f("Unknown2", Bytes(1422), V_400B),
        f("hExpectedPaddings", Scalar(I16), V_430),
    ],
};

pub fn graph_schema(revision: u32) -> &'static HeaderSchema {
    if is_post4(revision) {
        &GRAPH_POST4
    } else {
        &GRAPH_PRE4
    }
}

pub struct GraphHeader {
    pub rec: HeaderRecord,
    pub revision: u32,
}

impl GraphHeader {
    pub fn effective_len_bytes(&self) -> Result<usize> {
        non_negative(&self.rec, "lExtItemHeaderLen")
    }

    pub fn channel_count(&self) -> Result<usize> {
        non_negative(&self.rec, "nChannels")
    }

    /// Milliseconds per sample at the base rate.
    pub fn sample_time_ms(&self) -> Result<f64> {
        let t = self.rec.require_float("dSampleTime")?;
        if t <= 0.0 || !t.is_finite() {
            return Err(AcqError::BadHeader {
                kind: self.rec.kind,
                offset: self.rec.offset,
                reason: format!("implausible sample time {t}"),
            });
        }
        Ok(t)
    }

    pub fn compressed(&self) -> bool {
        self.rec.int("bCompressed") == Some(1)
    }

    pub fn expected_padding_headers(&self) -> usize {
        if self.revision >= V_430 {
            self.rec.int("hExpectedPaddings").unwrap_or(0).max(0) as usize
        } else {
            0
        }
    }
}

// ── Padding header ─────────────────────────────────────────────────

/// A 40-byte block of unknown purpose that newer files put between the
/// graph header and the channel headers; the graph header says how many.
pub const PADDING: HeaderSchema = HeaderSchema {
    kind: "Padding",
    fields: &[
        f("lChannelLen", Scalar(I32), V_ALL),
        f("Unknown", Bytes(36), V_ALL),
    ],
};

pub fn padding_effective_len(rec: &HeaderRecord) -> Result<usize> {
    non_negative(rec, "lChannelLen")
}

// ── Channel header ─────────────────────────────────────────────────

const CHANNEL_PRE4: HeaderSchema = HeaderSchema {
    kind: "Channel",
    fields: &[
        f("lChanHeaderLen", Scalar(I32), V_20A),
        f("nNum", Scalar(I16), V_20A),
        f("szCommentText", Text(40), V_20A),
        f("rgbColor", Bytes(4), V_20A),
        f("nDispChan", Scalar(I16), V_20A),
        f("dVoltOffset", Scalar(F64), V_20A),
        f("dVoltScale", Scalar(F64), V_20A),
        f("szUnitsText", Text(20), V_20A),
        f("lBufLength", Scalar(I32), V_20A),
        f("dAmplScale", Scalar(F64), V_20A),
        f("dAmplOffset", Scalar(F64), V_20A),
        f("nChanOrder", Scalar(I16), V_20A),
        f("nDispSize", Scalar(I16), V_20A),
        f("plotMode", Scalar(I16), V_30R),
        f("vMid", Scalar(F64), V_30R),
        f("szDescription", Text(128), V_370),
        f("nVarSampleDivider", Scalar(I16), V_370),
        f("vertPrecision", Scalar(I16), V_373),
        f("activeSegmentColor", Bytes(4), V_382),
        f("activeSegmentStyle", Scalar(I32), V_382),
    ],
};

const CHANNEL_POST4: HeaderSchema = HeaderSchema {
    kind: "Channel",
    fields: &[
        f("lChanHeaderLen", Scalar(I32), V_20A),
        f("nNum", Scalar(I16), V_20A),
        f("szCommentText", Text(40), V_20A),
        f("notColor", Bytes(4), V_20A),
        f("nDispChan", Scalar(I16), V_20A),
        f("dVoltOffset", Scalar(F64), V_20A),
        f("dVoltScale", Scalar(F64), V_20A),
        f("szUnitsText", Text(20), V_20A),
        f("lBufLength", Scalar(I32), V_20A),
        f("dAmplScale", Scalar(F64), V_20A),
        f("dAmplOffset", Scalar(F64), V_20A),
        f("nChanOrder", Scalar(I16), V_20A),
        f("nDispSize", Scalar(I16), V_20A),
        f("unknown", Bytes(40), V_400B),
        f("nVarSampleDivider", Scalar(I16), V_400B),
    ],
};

pub fn channel_schema(revision: u32) -> &'static HeaderSchema {
    if is_post4(revision) {
        &CHANNEL_POST4
    } else {
        &CHANNEL_PRE4
    }
}

pub struct ChannelHeader {
    pub rec: HeaderRecord,
}

impl ChannelHeader {
    pub fn effective_len_bytes(&self) -> Result<usize> {
        non_negative(&self.rec, "lChanHeaderLen")
    }

    pub fn name(&self) -> String {
        self.rec.text("szCommentText").unwrap_or_default().to_string()
    }

    pub fn units(&self) -> String {
        self.rec.text("szUnitsText").unwrap_or_default().to_string()
    }

    /// Divide the base rate by this to get the channel's rate. Absent in
    /// old revisions, and occasionally zero in the wild; both mean 1.
    pub fn frequency_divider(&self) -> u32 {
        match self.rec.int("nVarSampleDivider") {
            Some(d) if d > 0 => d as u32,
            _ => 1,
        }
    }

    pub fn point_count(&self) -> Result<usize> {
        non_negative(&self.rec, "lBufLength")
    }

    pub fn order_num(&self) -> i32 {
        self.rec.int("nChanOrder").unwrap_or(-1) as i32
    }

    pub fn raw_scale(&self) -> Result<f64> {
        self.rec.require_float("dAmplScale")
    }

    pub fn raw_offset(&self) -> Result<f64> {
        self.rec.require_float("dAmplOffset")
    }
}

// ── Foreign data header ────────────────────────────────────────────

const FOREIGN_PRE4: HeaderSchema = HeaderSchema {
    kind: "ForeignData",
    fields: &[
        f("nLength", Scalar(I16), V_20A),
        f("nType", Scalar(I16), V_20A),
    ],
};

const FOREIGN_POST4: HeaderSchema = HeaderSchema {
    kind: "ForeignData",
    fields: &[f("lLength", Scalar(I32), V_400B)],
};

pub fn foreign_schema(revision: u32) -> &'static HeaderSchema {
    if is_post4(revision) {
        &FOREIGN_POST4
    } else {
        &FOREIGN_PRE4
    }
}

pub fn foreign_effective_len(rec: &HeaderRecord, revision: u32) -> Result<usize> {
    if is_post4(revision) {
        non_negative(rec, "lLength")
    } else {
        non_negative(rec, "nLength")
    }
}

// ── Channel datatype header ────────────────────────────────────────

pub const CHANNEL_DTYPE: HeaderSchema = HeaderSchema {
    kind: "ChannelDatatype",
    fields: &[
        f("nSize", Scalar(I16), V_20A),
        f("nType", Scalar(I16), V_20A),
    ],
};

pub struct ChannelDtypeHeader {
    pub rec: HeaderRecord,
}

impl ChannelDtypeHeader {
    pub fn type_code(&self) -> i64 {
        self.rec.int("nType").unwrap_or(-1)
    }

    pub fn sample_size(&self) -> i64 {
        self.rec.int("nSize").unwrap_or(-1)
    }

    /// Type codes 0 and 1 are float64, 2 is int16. A candidate is only
    /// plausible when the declared size agrees -- this is what the
    /// foreign-header recovery scan keys on.
    pub fn possibly_valid(&self) -> bool {
        matches!(
            (self.type_code(), self.sample_size()),
            (0 | 1, 8) | (2, 2)
        )
    }
}

// ── Journal headers ────────────────────────────────────────────────

pub const JOURNAL_V2: HeaderSchema = HeaderSchema {
    kind: "Journal",
    fields: &[
        f("tag", Bytes(4), V_20A),
        f("hShow", Scalar(I16), V_20A),
        f("lJournalLen", Scalar(I32), V_20A),
    ],
};

/// Post-4 files prefix the whole journal section with just its length;
/// when that length can't even hold a journal header, there is no journal.
pub const JOURNAL_LEN_V4: HeaderSchema = HeaderSchema {
    kind: "JournalLength",
    fields: &[f("lJournalDataLen", Scalar(I32), V_400B)],
};

pub const JOURNAL_V4: HeaderSchema = HeaderSchema {
    kind: "Journal",
    fields: &[
        f("bUnknown1", Bytes(262), V_400B),
        f("lEarlyJournalLen", Scalar(I32), V_400B),
        f("bUnknown2", Bytes(290), V_400B),
        f("bUnknown3", Bytes(26), V_420),
        f("bUnknown4", Bytes(4), V_440),
        f("lLateJournalLenMinusOne", Scalar(I32), V_420),
        f("lLateJournalLen", Scalar(I32), V_420),
    ],
};

pub fn journal_v2_tag_ok(rec: &HeaderRecord) -> bool {
    rec.bytes("tag") == Some(&JOURNAL_TAG)
}

pub fn journal_v4_text_len(rec: &HeaderRecord, revision: u32) -> Result<usize> {
    if revision < V_420 {
        non_negative(rec, "lEarlyJournalLen")
    } else {
        non_negative(rec, "lLateJournalLen")
    }
}

// ── Compression headers ────────────────────────────────────────────

const MAIN_COMPRESSION_PRE4: HeaderSchema = HeaderSchema {
    kind: "MainCompression",
    fields: &[
        f("Unknown", Bytes(34), V_20A),
        f("lTextLen", Scalar(I32), V_20A),
    ],
};

const MAIN_COMPRESSION_POST4: HeaderSchema = HeaderSchema {
    kind: "MainCompression",
    fields: &[
        f("Unknown1", Bytes(24), V_400B),
        f("lStrLen1", Scalar(I32), V_400B),
        f("lStrLen2", Scalar(I32), V_400B),
        f("Unknown2", Bytes(20), V_400B),
        f("Unknown3", Bytes(6), V_420),
    ],
};

// The pre/post split for this header is inclusive of V_400B on the pre
// side -- established experimentally, like most of this section.
pub fn main_compression_schema(revision: u32) -> &'static HeaderSchema {
    if revision <= V_400B {
        &MAIN_COMPRESSION_PRE4
    } else {
        &MAIN_COMPRESSION_POST4
    }
}

pub fn main_compression_effective_len(rec: &HeaderRecord, revision: u32) -> Result<usize> {
    if revision <= V_400B {
        Ok(rec.consumed + non_negative(rec, "lTextLen")?)
    } else {
        Ok(rec.consumed + non_negative(rec, "lStrLen1")? + non_negative(rec, "lStrLen2")?)
    }
}

pub const CHANNEL_COMPRESSION: HeaderSchema = HeaderSchema {
    kind: "ChannelCompression",
    fields: &[
        f("Unknown", Bytes(44), V_381),
        f("lChannelLabelLen", Scalar(I32), V_381),
        f("lUnitLabelLen", Scalar(I32), V_381),
        f("lUncompressedLen", Scalar(I32), V_381),
        f("lCompressedLen", Scalar(I32), V_381),
    ],
};

pub struct ChannelCompressionHeader {
    pub rec: HeaderRecord,
}

impl ChannelCompressionHeader {
    /// The channel label and unit strings live *inside* this header; the
    /// compressed payload starts right after them.
    pub fn header_only_len_bytes(&self) -> Result<usize> {
        Ok(self.rec.consumed
            + non_negative(&self.rec, "lChannelLabelLen")?
            + non_negative(&self.rec, "lUnitLabelLen")?)
    }

    /// Length up to the next header, i.e. past the compressed payload.
    pub fn effective_len_bytes(&self) -> Result<usize> {
        Ok(self.header_only_len_bytes()? + self.compressed_data_len()?)
    }

    pub fn compressed_data_offset(&self) -> Result<u64> {
        Ok(self.rec.offset + self.header_only_len_bytes()? as u64)
    }

    pub fn compressed_data_len(&self) -> Result<usize> {
        non_negative(&self.rec, "lCompressedLen")
    }

    pub fn uncompressed_len(&self) -> Result<usize> {
        non_negative(&self.rec, "lUncompressedLen")
    }
}

// ── Marker headers ─────────────────────────────────────────────────

const MARKER_PRE4: HeaderSchema = HeaderSchema {
    kind: "Marker",
    fields: &[
        f("lLength", Scalar(I32), V_20A),
        f("lMarkers", Scalar(I32), V_20A),
    ],
};

const MARKER_POST4: HeaderSchema = HeaderSchema {
    kind: "Marker",
    fields: &[
        f("lLength", Scalar(I32), V_400B),
        f("lMarkersExtra", Scalar(I32), V_400B),
        f("lMarkers", Scalar(I32), V_400B),
        f("Unknown", Bytes(6), V_400B),
        f("szDefl", Text(5), V_400B),
        f("Unknown2", Scalar(I16), V_400B),
        f("Unknown3", Bytes(8), V_42X),
        f("Unknown4", Bytes(8), V_440),
    ],
};

pub fn marker_schema(revision: u32) -> &'static HeaderSchema {
    if is_post4(revision) {
        &MARKER_POST4
    } else {
        &MARKER_PRE4
    }
}

pub fn marker_count(rec: &HeaderRecord, revision: u32) -> Result<usize> {
    if is_post4(revision) {
        // Neither count field is exactly right; lMarkersExtra - 1 is what
        // matches observed files.
        Ok(rec.require_int("lMarkersExtra")?.saturating_sub(1).max(0) as usize)
    } else {
        non_negative(rec, "lMarkers")
    }
}

const MARKER_ITEM_PRE4: HeaderSchema = HeaderSchema {
    kind: "MarkerItem",
    fields: &[
        f("lSample", Scalar(I32), V_20A),
        f("fSelected", Scalar(I16), V_35X),
        f("fTextLocked", Scalar(I16), V_20A),
        f("fPositionLocked", Scalar(I16), V_20A),
        f("nTextLength", Scalar(I16), V_20A),
    ],
};

const MARKER_ITEM_POST4: HeaderSchema = HeaderSchema {
    kind: "MarkerItem",
    fields: &[
        f("lSample", Scalar(I32), V_400B),
        f("Unknown", Bytes(4), V_400B),
        f("nChannel", Scalar(I16), V_400B),
        f("sMarkerStyle", Text(4), V_400B),
        f("llDateCreated", Scalar(U64), V_440),
        f("Unknown3", Bytes(8), V_42X),
        f("nTextLength", Scalar(I16), V_400B),
    ],
};

pub fn marker_item_schema(revision: u32) -> &'static HeaderSchema {
    if is_post4(revision) {
        &MARKER_ITEM_POST4
    } else {
        &MARKER_ITEM_PRE4
    }
}

pub struct MarkerItemHeader {
    pub rec: HeaderRecord,
    pub revision: u32,
}

impl MarkerItemHeader {
    pub fn sample_index(&self) -> Result<u64> {
        Ok(self.rec.require_int("lSample")?.max(0) as u64)
    }

    /// Old files exclude the trailing NUL from the stored length from
    /// 3.5.x on; post-4 files include it.
    pub fn text_length(&self) -> Result<usize> {
        let n = non_negative(&self.rec, "nTextLength")?;
        if !is_post4(self.revision) && self.revision >= V_35X {
            Ok(n + 1)
        } else {
            Ok(n)
        }
    }

    /// `None` means the marker is global. Only post-4 markers can be
    /// attached to a channel.
    pub fn channel_number(&self) -> Option<i32> {
        match self.rec.int("nChannel") {
            Some(-1) | None => None,
            Some(n) => Some(n as i32),
        }
    }

    pub fn type_code(&self) -> Option<String> {
        self.rec.text("sMarkerStyle").map(|s| s.to_string())
    }

    pub fn date_created_ms(&self) -> Option<u64> {
        if self.revision >= V_440 {
            self.rec.uint("llDateCreated")
        } else {
            None
        }
    }

    /// Header plus its trailing label text.
    pub fn effective_len_bytes(&self) -> Result<usize> {
        Ok(self.rec.consumed + self.text_length()?)
    }
}

// ── Marker metadata (pre-4 only) ───────────────────────────────────

/// Block after the marker items in 3.8.1+ pre-4 files. Its leading tag
/// being the journal tag means the block is absent. Semantics beyond the
/// color and tag id are unknown.
pub const MARKER_METADATA_PRE: HeaderSchema = HeaderSchema {
    kind: "PostMarker",
    fields: &[
        f("tag", Bytes(4), V_20A),
        f("lItemCount", Scalar(I32), V_20A),
        f("sUnknown", Bytes(76), V_20A),
    ],
};

pub const MARKER_METADATA_ITEM: HeaderSchema = HeaderSchema {
    kind: "PostMarkerItem",
    fields: &[
        f("lUnknown1", Scalar(I32), V_20A),
        f("lMarkerNumber", Scalar(I32), V_20A),
        f("bUnknown2", Bytes(12), V_20A),
        f("rgbaColor", Bytes(4), V_20A),
        f("hMarkerTag", Scalar(I16), V_20A),
        f("hMarkerTypeId", Scalar(I16), V_20A),
    ],
};
