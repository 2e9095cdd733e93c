// Sample reading: materialise-all and streaming, for both storage modes.

use std::io::{Read, Seek};

use flate2::read::ZlibDecoder;

use crate::core::error::{AcqError, Result};
use crate::core::model::{Datafile, RawData, SampleDtype};
use crate::core::pattern::{ChunkPlanner, DEFAULT_CHUNK_SIZE};
use crate::core::source::{ByteOrder, ByteSource};

/// Returned by a streaming consumer after each block. `Stop` makes the
/// reader release the source and return without further reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    Continue,
    Stop,
}

/// One contiguous run of samples for one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBlock {
    I16(Vec<i16>),
    F64(Vec<f64>),
}

impl SampleBlock {
    pub fn len(&self) -> usize {
        match self {
            SampleBlock::I16(v) => v.len(),
            SampleBlock::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-channel facts the reader needs, fixed at walk time.
#[derive(Debug, Clone)]
pub struct ChannelLayout {
    pub frequency_divider: u32,
    pub dtype: SampleDtype,
    pub point_count: usize,
}

/// Where one channel's zlib stream lives in a compressed file.
#[derive(Debug, Clone)]
pub struct CompressedSegment {
    pub offset: u64,
    pub length: usize,
}

/// The walker's offset map: everything needed to locate and decode sample
/// data. Never mutated by the reader, so iteration is restartable.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub byte_order: ByteOrder,
    /// Start of the interleaved data region (uncompressed files).
    pub data_start_offset: u64,
    pub channels: Vec<ChannelLayout>,
    /// Per-channel segments, present for compressed files.
    pub compressed: Option<Vec<CompressedSegment>>,
}

impl DataLayout {
    /// Byte length of the interleaved data region. Zero for compressed
    /// files, where markers sit where the data would be.
    pub fn data_region_length(&self) -> usize {
        if self.compressed.is_some() {
            return 0;
        }
        self.channels
            .iter()
            .map(|c| c.point_count * c.dtype.sample_size())
            .sum()
    }
}

/// Lazy, restartable reader over a file's sample data. Holds the byte
/// source for its lifetime; dropping it releases the source.
pub struct SampleReader<S> {
    source: ByteSource<S>,
    layout: DataLayout,
    chunk_size: usize,
}

impl<S: Read + Seek> SampleReader<S> {
    pub fn new(source: ByteSource<S>, layout: DataLayout) -> Self {
        Self {
            source,
            layout,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Tune how much data is read per chunk. Output is identical for any
    /// value; only resident memory changes.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Materialise every channel's `raw_data`.
    pub fn read_all(&mut self, datafile: &mut Datafile) -> Result<()> {
        let all: Vec<usize> = (0..self.layout.channels.len()).collect();
        self.read_channels(datafile, &all)
    }

    /// Materialise only the given channels; the rest keep `raw_data =
    /// None`.
    pub fn read_channels(&mut self, datafile: &mut Datafile, indexes: &[usize]) -> Result<()> {
        let mut store: Vec<Option<RawData>> = self
            .layout
            .channels
            .iter()
            .enumerate()
            .map(|(i, ch)| {
                indexes.contains(&i).then(|| match ch.dtype {
                    SampleDtype::I16 => RawData::I16(Vec::with_capacity(ch.point_count)),
                    SampleDtype::F64 => RawData::F64(Vec::with_capacity(ch.point_count)),
                })
            })
            .collect();

        self.stream_channels(indexes, |ch, _start, block| {
            match (&mut store[ch], block) {
                (Some(RawData::I16(acc)), SampleBlock::I16(b)) => acc.extend_from_slice(b),
                (Some(RawData::F64(acc)), SampleBlock::F64(b)) => acc.extend_from_slice(b),
                _ => {}
            }
            StreamControl::Continue
        })?;

        for &i in indexes {
            if let Some(slot) = store.get_mut(i) {
                datafile.channels[i].raw_data = slot.take();
            }
        }
        Ok(())
    }

    /// Stream every channel's samples through `consumer` as
    /// `(channel_index, start_sample, block)` without materialising
    /// anything. Restartable: every call begins at the start of the data.
    pub fn stream<F>(&mut self, consumer: F) -> Result<()>
    where
        F: FnMut(usize, usize, &SampleBlock) -> StreamControl,
    {
        let all: Vec<usize> = (0..self.layout.channels.len()).collect();
        self.stream_channels(&all, consumer)
    }

    /// Stream a subset of channels. Indexes out of range are ignored.
    pub fn stream_channels<F>(&mut self, indexes: &[usize], consumer: F) -> Result<()>
    where
        F: FnMut(usize, usize, &SampleBlock) -> StreamControl,
    {
        let mut selected = vec![false; self.layout.channels.len()];
        for &i in indexes {
            if let Some(s) = selected.get_mut(i) {
                *s = true;
            }
        }
        if self.layout.compressed.is_some() {
            self.stream_compressed(&selected, consumer)
        } else {
            self.stream_uncompressed(&selected, consumer)
        }
    }

    fn stream_uncompressed<F>(&mut self, selected: &[bool], mut consumer: F) -> Result<()>
    where
        F: FnMut(usize, usize, &SampleBlock) -> StreamControl,
    {
        let metas: Vec<(u32, usize, usize)> = self
            .layout
            .channels
            .iter()
            .map(|c| (c.frequency_divider, c.dtype.sample_size(), c.point_count))
            .collect();
        let mut planner = ChunkPlanner::new(&metas, self.chunk_size);
        self.source.seek(self.layout.data_start_offset)?;

        let channel_count = metas.len();
        let mut start_samples = vec![0usize; channel_count];
        let mut chunk = Vec::new();
        let mut split: Vec<Vec<u8>> = vec![Vec::new(); channel_count];

        while let Some(pattern) = planner.next_pattern() {
            chunk.resize(pattern.len(), 0);
            self.source.read_into(&mut chunk)?;
            tracing::debug!(bytes = chunk.len(), "read interleaved chunk");

            for buf in &mut split {
                buf.clear();
            }
            for (&ch, &b) in pattern.iter().zip(chunk.iter()) {
                if selected[ch as usize] {
                    split[ch as usize].push(b);
                }
            }

            for ch in 0..channel_count {
                if split[ch].is_empty() {
                    continue;
                }
                let block =
                    decode_block(&split[ch], self.layout.channels[ch].dtype, self.layout.byte_order);
                let control = consumer(ch, start_samples[ch], &block);
                start_samples[ch] += block.len();
                if control == StreamControl::Stop {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn stream_compressed<F>(&mut self, selected: &[bool], mut consumer: F) -> Result<()>
    where
        F: FnMut(usize, usize, &SampleBlock) -> StreamControl,
    {
        let segments = match &self.layout.compressed {
            Some(s) => s.clone(),
            None => return Ok(()),
        };

        for (ch, segment) in segments.iter().enumerate() {
            if !selected[ch] {
                continue;
            }
            let dtype = self.layout.channels[ch].dtype;
            let sample_size = dtype.sample_size();
            self.source.seek(segment.offset)?;
            tracing::debug!(
                channel = ch,
                offset = segment.offset,
                length = segment.length,
                "inflating channel segment"
            );

            let mut decoder =
                ZlibDecoder::new(self.source.inner_mut().take(segment.length as u64));
            let mut pending: Vec<u8> = Vec::new();
            let mut tmp = vec![0u8; self.chunk_size.max(sample_size)];
            let mut start_sample = 0usize;
            loop {
                let n = decoder.read(&mut tmp).map_err(|e| AcqError::Inflate {
                    channel: ch,
                    reason: e.to_string(),
                })?;
                if n == 0 {
                    break;
                }
                pending.extend_from_slice(&tmp[..n]);
                let whole = pending.len() / sample_size * sample_size;
                if whole == 0 {
                    continue;
                }
                // Compressed payloads are little-endian no matter what
                // the file-wide byte order says.
                let block = decode_block(&pending[..whole], dtype, ByteOrder::Little);
                pending.drain(..whole);
                let control = consumer(ch, start_sample, &block);
                start_sample += block.len();
                if control == StreamControl::Stop {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

fn decode_block(bytes: &[u8], dtype: SampleDtype, order: ByteOrder) -> SampleBlock {
    match dtype {
        SampleDtype::I16 => SampleBlock::I16(
            bytes
                .chunks_exact(2)
                .map(|c| {
                    let b = [c[0], c[1]];
                    match order {
                        ByteOrder::Little => i16::from_le_bytes(b),
                        ByteOrder::Big => i16::from_be_bytes(b),
                    }
                })
                .collect(),
        ),
        SampleDtype::F64 => SampleBlock::F64(
            bytes
                .chunks_exact(8)
                .map(|c| {
                    let b: [u8; 8] = c.try_into().unwrap();
                    match order {
                        ByteOrder::Little => f64::from_le_bytes(b),
                        ByteOrder::Big => f64::from_be_bytes(b),
                    }
                })
                .collect(),
        ),
    }
}
