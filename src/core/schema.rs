// Declarative header layouts and their decoder.
//
// Header shapes vary by file revision. Rather than branching per revision,
// each header kind is described once as a field table; every field carries
// the revision range in which it exists, and the decoder reads exactly the
// fields active for the file at hand. Adding a revision is a table edit.

use serde::Serialize;

use crate::core::encoding::TextDecoder;
use crate::core::error::{AcqError, ReadWarning, Result};
use crate::core::source::ByteSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prim {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl Prim {
    pub const fn size(self) -> usize {
        match self {
            Prim::I8 | Prim::U8 => 1,
            Prim::I16 | Prim::U16 => 2,
            Prim::I32 | Prim::U32 | Prim::F32 => 4,
            Prim::I64 | Prim::U64 | Prim::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(Prim),
    Array(Prim, usize),
    /// NUL-padded fixed-width text of the given byte width.
    Text(usize),
    /// Opaque bytes, preserved verbatim.
    Bytes(usize),
}

impl FieldKind {
    pub const fn size(&self) -> usize {
        match *self {
            FieldKind::Scalar(p) => p.size(),
            FieldKind::Array(p, n) => p.size() * n,
            FieldKind::Text(n) | FieldKind::Bytes(n) => n,
        }
    }
}

/// One field of a header layout. `since`/`until` bound the revisions in
/// which the field is present (`until` exclusive, `None` = open-ended).
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub since: u32,
    pub until: Option<u32>,
}

impl FieldDef {
    pub fn active_for(&self, revision: u32) -> bool {
        revision >= self.since && self.until.map_or(true, |u| revision < u)
    }
}

/// Shorthand for field tables.
pub const fn f(name: &'static str, kind: FieldKind, since: u32) -> FieldDef {
    FieldDef {
        name,
        kind,
        since,
        until: None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Uint(u64),
    Float(f64),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Text(String),
    Bytes(Vec<u8>),
}

/// A header layout: a kind name plus its field table.
#[derive(Debug, Clone, Copy)]
pub struct HeaderSchema {
    pub kind: &'static str,
    pub fields: &'static [FieldDef],
}

impl HeaderSchema {
    /// Total byte length of the fields active at `revision`.
    pub fn len_bytes(&self, revision: u32) -> usize {
        self.fields
            .iter()
            .filter(|fd| fd.active_for(revision))
            .map(|fd| fd.kind.size())
            .sum()
    }

    /// Decode one header at `offset`. Reads exactly the fields active for
    /// `revision`; the caller is responsible for advancing past any
    /// declared-length tail via `HeaderRecord::read_trailing`.
    pub fn decode<S: std::io::Read + std::io::Seek>(
        &self,
        src: &mut ByteSource<S>,
        offset: u64,
        revision: u32,
        text: &mut TextDecoder,
        warnings: &mut Vec<ReadWarning>,
    ) -> Result<HeaderRecord> {
        src.seek(offset)?;
        let mut fields = Vec::new();
        for fd in self.fields.iter().filter(|fd| fd.active_for(revision)) {
            let value = match fd.kind {
                FieldKind::Scalar(p) => read_scalar(src, p)?,
                FieldKind::Array(p, n) => read_array(src, p, n)?,
                FieldKind::Text(n) => {
                    let raw = src.read_fixed(n)?;
                    FieldValue::Text(text.decode(&raw, warnings))
                }
                FieldKind::Bytes(n) => FieldValue::Bytes(src.read_fixed(n)?),
            };
            fields.push((fd.name, value));
        }
        let consumed = (src.position() - offset) as usize;
        tracing::debug!(kind = self.kind, offset, consumed, "read header");
        Ok(HeaderRecord {
            kind: self.kind,
            offset,
            fields,
            consumed,
            trailing_unknown: Vec::new(),
        })
    }
}

fn read_scalar<S: std::io::Read + std::io::Seek>(
    src: &mut ByteSource<S>,
    p: Prim,
) -> Result<FieldValue> {
    Ok(match p {
        Prim::I8 => FieldValue::Int(src.read_i8()? as i64),
        Prim::U8 => FieldValue::Int(src.read_u8()? as i64),
        Prim::I16 => FieldValue::Int(src.read_i16()? as i64),
        Prim::U16 => FieldValue::Int(src.read_u16()? as i64),
        Prim::I32 => FieldValue::Int(src.read_i32()? as i64),
        Prim::U32 => FieldValue::Int(src.read_u32()? as i64),
        Prim::I64 => FieldValue::Int(src.read_i64()?),
        Prim::U64 => FieldValue::Uint(src.read_u64()?),
        Prim::F32 => FieldValue::Float(src.read_f32()? as f64),
        Prim::F64 => FieldValue::Float(src.read_f64()?),
    })
}

fn read_array<S: std::io::Read + std::io::Seek>(
    src: &mut ByteSource<S>,
    p: Prim,
    n: usize,
) -> Result<FieldValue> {
    match p {
        Prim::U8 => Ok(FieldValue::Bytes(src.read_fixed(n)?)),
        Prim::F32 | Prim::F64 => {
            let mut out = Vec::with_capacity(n);
            for _ in 0..n {
                out.push(match read_scalar(src, p)? {
                    FieldValue::Float(v) => v,
                    _ => unreachable!(),
                });
            }
            Ok(FieldValue::Floats(out))
        }
        _ => {
            let mut out = Vec::with_capacity(n);
            for _ in 0..n {
                out.push(match read_scalar(src, p)? {
                    FieldValue::Int(v) => v,
                    FieldValue::Uint(v) => v as i64,
                    _ => unreachable!(),
                });
            }
            Ok(FieldValue::Ints(out))
        }
    }
}

/// A decoded header: an ordered name → value bag plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderRecord {
    pub kind: &'static str,
    /// Absolute source offset the header was read from.
    pub offset: u64,
    fields: Vec<(&'static str, FieldValue)>,
    /// Bytes consumed by the declared fields.
    pub consumed: usize,
    /// Bytes between the declared fields and the header's self-declared
    /// length. Layout unknown; preserved verbatim.
    pub trailing_unknown: Vec<u8>,
}

impl HeaderRecord {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Uint(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn uint(&self, name: &str) -> Option<u64> {
        match self.get(name)? {
            FieldValue::Uint(v) => Some(*v),
            FieldValue::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        match self.get(name)? {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn require_int(&self, name: &'static str) -> Result<i64> {
        self.int(name).ok_or(AcqError::BadHeader {
            kind: self.kind,
            offset: self.offset,
            reason: format!("missing field {name}"),
        })
    }

    pub fn require_float(&self, name: &'static str) -> Result<f64> {
        self.float(name).ok_or(AcqError::BadHeader {
            kind: self.kind,
            offset: self.offset,
            reason: format!("missing field {name}"),
        })
    }

    /// Capture the gap between the fields we understand and the header's
    /// declared length. A declared length *shorter* than the known fields
    /// happens in malformed files; the walker still advances by it.
    pub fn read_trailing<S: std::io::Read + std::io::Seek>(
        &mut self,
        src: &mut ByteSource<S>,
        declared_len: usize,
    ) -> Result<()> {
        if declared_len > self.consumed {
            src.seek(self.offset + self.consumed as u64)?;
            self.trailing_unknown = src.read_fixed(declared_len - self.consumed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::revisions::{V_20A, V_370, V_ALL};
    use crate::core::source::ByteOrder;
    use std::io::Cursor;

    const DEMO: HeaderSchema = HeaderSchema {
        kind: "Demo",
        fields: &[
            f("nLength", FieldKind::Scalar(Prim::I16), V_ALL),
            f("dScale", FieldKind::Scalar(Prim::F64), V_20A),
            f("szName", FieldKind::Text(4), V_20A),
            f("nLate", FieldKind::Scalar(Prim::I16), V_370),
        ],
    };

    fn demo_bytes() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&7i16.to_le_bytes());
        b.extend_from_slice(&2.5f64.to_le_bytes());
        b.extend_from_slice(b"ab\0\0");
        b.extend_from_slice(&9i16.to_le_bytes());
        b
    }

    #[test]
    fn revision_gates_fields() {
        assert_eq!(DEMO.len_bytes(V_20A), 14);
        assert_eq!(DEMO.len_bytes(V_370), 16);
    }

    #[test]
    fn fields_can_be_retired_by_revision() {
        let fd = FieldDef {
            name: "nRetired",
            kind: FieldKind::Scalar(Prim::I16),
            since: V_20A,
            until: Some(V_370),
        };
        assert!(!fd.active_for(V_ALL));
        assert!(fd.active_for(V_20A));
        assert!(!fd.active_for(V_370));
    }

    #[test]
    fn decode_reads_active_fields_only() {
        let mut src = ByteSource::new(Cursor::new(demo_bytes()), ByteOrder::Little);
        let mut text = TextDecoder::new();
        let mut warnings = Vec::new();
        let rec = DEMO
            .decode(&mut src, 0, V_20A, &mut text, &mut warnings)
            .unwrap();
        assert_eq!(rec.int("nLength"), Some(7));
        assert_eq!(rec.float("dScale"), Some(2.5));
        assert_eq!(rec.text("szName"), Some("ab"));
        assert_eq!(rec.int("nLate"), None);
        assert_eq!(rec.consumed, 14);
    }

    #[test]
    fn trailing_unknown_is_preserved() {
        let mut bytes = demo_bytes();
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        let mut src = ByteSource::new(Cursor::new(bytes), ByteOrder::Little);
        let mut text = TextDecoder::new();
        let mut warnings = Vec::new();
        let mut rec = DEMO
            .decode(&mut src, 0, V_370, &mut text, &mut warnings)
            .unwrap();
        rec.read_trailing(&mut src, 18).unwrap();
        assert_eq!(rec.trailing_unknown, vec![0xAA, 0xBB]);
    }

    #[test]
    fn short_declared_length_keeps_no_trailing() {
        let mut src = ByteSource::new(Cursor::new(demo_bytes()), ByteOrder::Little);
        let mut text = TextDecoder::new();
        let mut warnings = Vec::new();
        let mut rec = DEMO
            .decode(&mut src, 0, V_20A, &mut text, &mut warnings)
            .unwrap();
        rec.read_trailing(&mut src, 6).unwrap();
        assert!(rec.trailing_unknown.is_empty());
    }
}
