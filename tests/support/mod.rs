// Synthetic .acq file builder for tests.
//
// Files are assembled from the same field tables the reader decodes with,
// so layout arithmetic (field sizes, revision gating) can never drift
// between builder and reader; the *values* under test are supplied
// explicitly by each test.

use std::io::Write;

use acq_reader::core::headers as h;
use acq_reader::core::revisions::*;
use acq_reader::core::schema::{FieldKind, HeaderSchema, Prim};
use acq_reader::ByteOrder;

/// Override value for a named field; anything not overridden is zeroed.
pub enum V {
    I(i64),
    U(u64),
    F(f64),
    S(String),
    B(Vec<u8>),
}

fn put_int(out: &mut Vec<u8>, p: Prim, order: ByteOrder, v: i64) {
    macro_rules! w {
        ($ty:ty) => {{
            let x = v as $ty;
            match order {
                ByteOrder::Little => out.extend_from_slice(&x.to_le_bytes()),
                ByteOrder::Big => out.extend_from_slice(&x.to_be_bytes()),
            }
        }};
    }
    match p {
        Prim::I8 => w!(i8),
        Prim::U8 => w!(u8),
        Prim::I16 => w!(i16),
        Prim::U16 => w!(u16),
        Prim::I32 => w!(i32),
        Prim::U32 => w!(u32),
        Prim::I64 => w!(i64),
        Prim::U64 => w!(u64),
        Prim::F32 | Prim::F64 => unreachable!("float written via put_float"),
    }
}

fn put_float(out: &mut Vec<u8>, p: Prim, order: ByteOrder, v: f64) {
    match (p, order) {
        (Prim::F32, ByteOrder::Little) => out.extend_from_slice(&(v as f32).to_le_bytes()),
        (Prim::F32, ByteOrder::Big) => out.extend_from_slice(&(v as f32).to_be_bytes()),
        (Prim::F64, ByteOrder::Little) => out.extend_from_slice(&v.to_le_bytes()),
        (Prim::F64, ByteOrder::Big) => out.extend_from_slice(&v.to_be_bytes()),
        _ => unreachable!("int written via put_int"),
    }
}

/// Serialize one header record: every field active at `revision`, in table
/// order, with named overrides applied. Unknown override names are
/// ignored, so one override set can serve multiple revisions.
pub fn emit_into(
    out: &mut Vec<u8>,
    schema: &HeaderSchema,
    revision: u32,
    order: ByteOrder,
    values: &[(&str, V)],
) {
    for fd in schema.fields.iter().filter(|fd| fd.active_for(revision)) {
        let value = values.iter().find(|(n, _)| *n == fd.name).map(|(_, v)| v);
        match fd.kind {
            FieldKind::Scalar(p @ (Prim::F32 | Prim::F64)) => {
                let v = match value {
                    Some(V::F(x)) => *x,
                    _ => 0.0,
                };
                put_float(out, p, order, v);
            }
            FieldKind::Scalar(p) => {
                let v = match value {
                    Some(V::I(x)) => *x,
                    Some(V::U(x)) => *x as i64,
                    _ => 0,
                };
                put_int(out, p, order, v);
            }
            FieldKind::Array(p, n) => {
                for _ in 0..n {
                    match p {
                        Prim::F32 | Prim::F64 => put_float(out, p, order, 0.0),
                        _ => put_int(out, p, order, 0),
                    }
                }
            }
            FieldKind::Text(n) => {
                let s = match value {
                    Some(V::S(s)) => s.as_bytes(),
                    _ => &[],
                };
                let take = s.len().min(n);
                out.extend_from_slice(&s[..take]);
                out.extend(std::iter::repeat(0u8).take(n - take));
            }
            FieldKind::Bytes(n) => {
                let b = match value {
                    Some(V::B(b)) => b.as_slice(),
                    _ => &[],
                };
                let take = b.len().min(n);
                out.extend_from_slice(&b[..take]);
                out.extend(std::iter::repeat(0u8).take(n - take));
            }
        }
    }
}

pub struct ChannelSpec {
    pub name: String,
    pub units: String,
    pub divider: u32,
    pub point_count: usize,
    pub f64_dtype: bool,
    pub order_num: i16,
    pub scale: f64,
    pub offset: f64,
}

impl ChannelSpec {
    pub fn i16(name: &str, divider: u32, point_count: usize) -> Self {
        Self {
            name: name.to_string(),
            units: "mV".to_string(),
            divider,
            point_count,
            f64_dtype: false,
            order_num: 0,
            scale: 1.0,
            offset: 0.0,
        }
    }

    pub fn f64(name: &str, divider: u32, point_count: usize) -> Self {
        Self {
            f64_dtype: true,
            ..Self::i16(name, divider, point_count)
        }
    }

    pub fn order(mut self, order_num: i16) -> Self {
        self.order_num = order_num;
        self
    }

    pub fn scaling(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }
}

pub struct MarkerSpec {
    pub sample: i64,
    pub label: String,
    /// -1 is global.
    pub channel: i16,
    pub style: String,
    pub created_ms: Option<u64>,
}

impl MarkerSpec {
    pub fn global(sample: i64, label: &str) -> Self {
        Self {
            sample,
            label: label.to_string(),
            channel: -1,
            style: "defl".to_string(),
            created_ms: None,
        }
    }

    pub fn on_channel(sample: i64, label: &str, channel: i16) -> Self {
        Self {
            channel,
            ..Self::global(sample, label)
        }
    }
}

/// Pre-4 marker metadata entry.
pub struct MetaSpec {
    pub marker_number: i32,
    pub color: [u8; 4],
    pub tag: i16,
}

pub enum Payload {
    /// Raw interleaved data region bytes.
    Uncompressed(Vec<u8>),
    /// Per-channel raw sample bytes (little-endian), deflated by the
    /// builder.
    Compressed(Vec<Vec<u8>>),
}

pub struct FileSpec {
    pub revision: u32,
    pub order: ByteOrder,
    pub sample_time_ms: f64,
    pub channels: Vec<ChannelSpec>,
    pub markers: Vec<MarkerSpec>,
    pub marker_metadata: Option<Vec<MetaSpec>>,
    pub journal: Option<String>,
    pub payload: Payload,
    pub foreign_data: Vec<u8>,
    /// Misdeclare the foreign block length (actual length still written).
    pub foreign_declared_extra: Option<usize>,
    pub padding_headers: usize,
}

impl FileSpec {
    pub fn new(revision: u32, channels: Vec<ChannelSpec>, payload: Payload) -> Self {
        Self {
            revision,
            order: ByteOrder::Little,
            sample_time_ms: 1.0,
            channels,
            markers: Vec::new(),
            marker_metadata: None,
            journal: None,
            payload,
            foreign_data: vec![0u8; 8],
            foreign_declared_extra: None,
            padding_headers: 0,
        }
    }
}

pub fn deflate(raw: &[u8]) -> Vec<u8> {
    let mut enc =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(raw).unwrap();
    enc.finish().unwrap()
}

pub fn build(spec: &FileSpec) -> Vec<u8> {
    let rev = spec.revision;
    let order = spec.order;
    let post4 = h::is_post4(rev);
    let compressed = matches!(spec.payload, Payload::Compressed(_));
    let mut out = Vec::new();

    // Graph header.
    let gs = h::graph_schema(rev);
    let glen = gs.len_bytes(rev);
    emit_into(
        &mut out,
        gs,
        rev,
        order,
        &[
            ("lVersion", V::I(rev as i64)),
            ("lExtItemHeaderLen", V::I(glen as i64)),
            ("nChannels", V::I(spec.channels.len() as i64)),
            ("dSampleTime", V::F(spec.sample_time_ms)),
            ("bCompressed", V::I(compressed as i64)),
            ("hExpectedPaddings", V::I(spec.padding_headers as i64)),
        ],
    );

    // Padding headers.
    for _ in 0..spec.padding_headers {
        emit_into(
            &mut out,
            &h::PADDING,
            rev,
            order,
            &[("lChannelLen", V::I(h::PADDING.len_bytes(rev) as i64))],
        );
    }

    // Channel headers.
    let cs = h::channel_schema(rev);
    for ch in &spec.channels {
        emit_into(
            &mut out,
            cs,
            rev,
            order,
            &[
                ("lChanHeaderLen", V::I(cs.len_bytes(rev) as i64)),
                ("szCommentText", V::S(ch.name.clone())),
                ("szUnitsText", V::S(ch.units.clone())),
                ("lBufLength", V::I(ch.point_count as i64)),
                ("dAmplScale", V::F(ch.scale)),
                ("dAmplOffset", V::F(ch.offset)),
                ("nChanOrder", V::I(ch.order_num as i64)),
                ("nVarSampleDivider", V::I(ch.divider as i64)),
            ],
        );
    }

    // Foreign data header plus its opaque block.
    let fs = h::foreign_schema(rev);
    let declared = fs.len_bytes(rev)
        + spec
            .foreign_declared_extra
            .unwrap_or(spec.foreign_data.len());
    emit_into(
        &mut out,
        fs,
        rev,
        order,
        &[
            ("lLength", V::I(declared as i64)),
            ("nLength", V::I(declared as i64)),
        ],
    );
    out.extend_from_slice(&spec.foreign_data);

    // Channel datatype headers.
    for ch in &spec.channels {
        let (size, code) = if ch.f64_dtype { (8, 1) } else { (2, 2) };
        emit_into(
            &mut out,
            &h::CHANNEL_DTYPE,
            rev,
            order,
            &[("nSize", V::I(size)), ("nType", V::I(code))],
        );
    }

    // Uncompressed data region sits between dtype headers and markers.
    if let Payload::Uncompressed(data) = &spec.payload {
        out.extend_from_slice(data);
    }

    build_markers(&mut out, spec, post4);
    build_journal(&mut out, spec, post4);

    if let Payload::Compressed(raws) = &spec.payload {
        build_compressed(&mut out, spec, raws);
    }

    out
}

fn build_markers(out: &mut Vec<u8>, spec: &FileSpec, post4: bool) {
    let rev = spec.revision;
    let order = spec.order;
    let count = spec.markers.len() as i64;
    emit_into(
        out,
        h::marker_schema(rev),
        rev,
        order,
        &[
            ("lLength", V::I(0)),
            ("lMarkers", V::I(count)),
            ("lMarkersExtra", V::I(count + 1)),
            ("szDefl", V::S("defl".to_string())),
        ],
    );
    for m in &spec.markers {
        // Every era stores label + NUL; what varies is whether the stored
        // length counts the NUL (see the reader's text_length handling).
        let stored_len = if !post4 && rev >= V_35X {
            m.label.len()
        } else {
            m.label.len() + 1
        };
        emit_into(
            out,
            h::marker_item_schema(rev),
            rev,
            order,
            &[
                ("lSample", V::I(m.sample)),
                ("nChannel", V::I(m.channel as i64)),
                ("sMarkerStyle", V::S(m.style.clone())),
                ("llDateCreated", V::U(m.created_ms.unwrap_or(0))),
                ("nTextLength", V::I(stored_len as i64)),
            ],
        );
        out.extend_from_slice(m.label.as_bytes());
        out.push(0);
    }
    if !post4 && rev >= V_381 {
        if let Some(items) = &spec.marker_metadata {
            emit_into(
                out,
                &h::MARKER_METADATA_PRE,
                rev,
                order,
                &[
                    ("tag", V::B(vec![0x01, 0x00, 0x00, 0x00])),
                    ("lItemCount", V::I(items.len() as i64)),
                ],
            );
            for item in items {
                emit_into(
                    out,
                    &h::MARKER_METADATA_ITEM,
                    rev,
                    order,
                    &[
                        ("lMarkerNumber", V::I(item.marker_number as i64)),
                        ("rgbaColor", V::B(item.color.to_vec())),
                        ("hMarkerTag", V::I(item.tag as i64)),
                    ],
                );
            }
        }
        // Without a metadata block the journal tag follows directly; the
        // reader probes it and rewinds.
    }
}

fn build_journal(out: &mut Vec<u8>, spec: &FileSpec, post4: bool) {
    let rev = spec.revision;
    let order = spec.order;
    if post4 {
        match &spec.journal {
            None => {
                // Section too short to hold a journal header: no journal.
                emit_into(
                    out,
                    &h::JOURNAL_LEN_V4,
                    rev,
                    order,
                    &[("lJournalDataLen", V::I(4))],
                );
            }
            Some(text) => {
                let header_len = h::JOURNAL_V4.len_bytes(rev);
                let section = 4 + header_len + text.len();
                emit_into(
                    out,
                    &h::JOURNAL_LEN_V4,
                    rev,
                    order,
                    &[("lJournalDataLen", V::I(section as i64))],
                );
                emit_into(
                    out,
                    &h::JOURNAL_V4,
                    rev,
                    order,
                    &[
                        ("lEarlyJournalLen", V::I(text.len() as i64)),
                        (
                            "lLateJournalLenMinusOne",
                            V::I(text.len().saturating_sub(1) as i64),
                        ),
                        ("lLateJournalLen", V::I(text.len() as i64)),
                    ],
                );
                out.extend_from_slice(text.as_bytes());
            }
        }
    } else if rev >= V_370 {
        if let Some(text) = &spec.journal {
            emit_into(
                out,
                &h::JOURNAL_V2,
                rev,
                order,
                &[
                    ("tag", V::B(h::JOURNAL_TAG.to_vec())),
                    ("hShow", V::I(1)),
                    ("lJournalLen", V::I(text.len() as i64)),
                ],
            );
            out.extend_from_slice(text.as_bytes());
        }
    }
}

fn build_compressed(out: &mut Vec<u8>, spec: &FileSpec, raws: &[Vec<u8>]) {
    let rev = spec.revision;
    let order = spec.order;
    emit_into(
        out,
        h::main_compression_schema(rev),
        rev,
        order,
        &[
            ("lTextLen", V::I(0)),
            ("lStrLen1", V::I(0)),
            ("lStrLen2", V::I(0)),
        ],
    );
    for (ch, raw) in spec.channels.iter().zip(raws) {
        let payload = deflate(raw);
        emit_into(
            out,
            &h::CHANNEL_COMPRESSION,
            rev,
            order,
            &[
                ("lChannelLabelLen", V::I(ch.name.len() as i64)),
                ("lUnitLabelLen", V::I(ch.units.len() as i64)),
                ("lUncompressedLen", V::I(raw.len() as i64)),
                ("lCompressedLen", V::I(payload.len() as i64)),
            ],
        );
        out.extend_from_slice(ch.name.as_bytes());
        out.extend_from_slice(ch.units.as_bytes());
        out.extend_from_slice(&payload);
    }
}
