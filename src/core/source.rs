// Endian-aware cursor over a seekable byte source.

use std::io::{Read, Seek, SeekFrom};

use tempfile::SpooledTempFile;

use crate::core::error::{AcqError, Result};

/// Spooled input stays in memory up to this size, then spills to disk.
const SPOOL_MEMORY_CEILING: usize = 32 * 1024 * 1024;

/// Byte order of multi-byte fields in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ByteOrder {
    Little,
    Big,
}

impl std::fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteOrder::Little => write!(f, "little"),
            ByteOrder::Big => write!(f, "big"),
        }
    }
}

/// Width of the length prefix for `read_pstring`.
#[derive(Debug, Clone, Copy)]
pub enum PrefixWidth {
    U8,
    U16,
    U32,
}

/// A cursor over a seekable byte source with a configurable byte order.
///
/// All reads advance the cursor; a source that ends mid-field yields
/// `AcqError::InsufficientData` with the offset where the read began.
pub struct ByteSource<S> {
    inner: S,
    order: ByteOrder,
    pos: u64,
}

macro_rules! read_prim {
    ($name:ident, $ty:ty, $n:literal) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let b = self.read_array::<$n>()?;
            Ok(match self.order {
                ByteOrder::Little => <$ty>::from_le_bytes(b),
                ByteOrder::Big => <$ty>::from_be_bytes(b),
            })
        }
    };
}

impl<S: Read + Seek> ByteSource<S> {
    pub fn new(inner: S, order: ByteOrder) -> Self {
        Self {
            inner,
            order,
            pos: 0,
        }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Endianness is unknown until the graph header's version field has
    /// been probed, so the walker sets it after bootstrap.
    pub fn set_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(offset))
            .map_err(|_| AcqError::Seek { offset })?;
        self.pos = offset;
        Ok(())
    }

    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.seek(self.pos + n)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let start = self.pos;
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                AcqError::InsufficientData { offset: start }
            } else {
                AcqError::Io(e)
            }
        })?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    read_prim!(read_i8, i8, 1);
    read_prim!(read_u8, u8, 1);
    read_prim!(read_i16, i16, 2);
    read_prim!(read_u16, u16, 2);
    read_prim!(read_i32, i32, 4);
    read_prim!(read_u32, u32, 4);
    read_prim!(read_i64, i64, 8);
    read_prim!(read_u64, u64, 8);
    read_prim!(read_f32, f32, 4);
    read_prim!(read_f64, f64, 8);

    /// Read exactly `n` bytes.
    pub fn read_fixed(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// Read exactly `buf.len()` bytes into a caller-owned buffer.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.fill(buf)
    }

    /// Read a length-prefixed string's raw bytes. The prefix width varies
    /// by call site, so it is passed in.
    pub fn read_pstring(&mut self, width: PrefixWidth) -> Result<Vec<u8>> {
        let len = match width {
            PrefixWidth::U8 => self.read_u8()? as usize,
            PrefixWidth::U16 => self.read_u16()? as usize,
            PrefixWidth::U32 => self.read_u32()? as usize,
        };
        self.read_fixed(len)
    }

    /// Hand the raw source to a caller that reads through it directly
    /// (the zlib path). The cursor position is invalid afterwards until
    /// the next absolute `seek`.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl ByteSource<SpooledTempFile> {
    /// Buffer a non-seekable stream into a temporary spool (memory first,
    /// disk past the ceiling) so the walker can treat it as a file.
    pub fn spooled<R: Read>(mut input: R) -> Result<Self> {
        let mut spool = SpooledTempFile::new(SPOOL_MEMORY_CEILING);
        std::io::copy(&mut input, &mut spool)?;
        spool
            .seek(SeekFrom::Start(0))
            .map_err(|_| AcqError::Seek { offset: 0 })?;
        Ok(Self::new(spool, ByteOrder::Little))
    }
}
