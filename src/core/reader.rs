// The walker: drives header decoding in file order and assembles the
// data model plus the sample reader's offset map.
//
// Walk order is fixed by the format. Uncompressed:
//   graph -> paddings -> channels -> foreign -> dtypes -> [data] ->
//   markers -> journal
// Compressed files put markers and journal where the data region would
// be, then one compression header + zlib payload per channel:
//   graph -> paddings -> channels -> foreign -> dtypes -> markers ->
//   journal -> compression headers + payloads

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use tempfile::SpooledTempFile;
use tracing::{debug, info, warn};

use crate::core::data::{ChannelLayout, CompressedSegment, DataLayout, SampleReader};
use crate::core::encoding::TextDecoder;
use crate::core::error::{AcqError, ReadWarning, Result};
use crate::core::headers as h;
use crate::core::model::{created_at_from_ms, Channel, Datafile, Journal, Marker, SampleDtype};
use crate::core::revisions as rev;
use crate::core::schema::{HeaderRecord, HeaderSchema};
use crate::core::source::{ByteOrder, ByteSource};

/// How far past the foreign data header to look for the channel datatype
/// headers when the declared length turns out to be wrong.
const MAX_DTYPE_SCANS: usize = 4096;

/// Parses the header graph of one .acq file.
pub struct AcqReader<S> {
    src: ByteSource<S>,
    revision: u32,
    text: TextDecoder,
    warnings: Vec<ReadWarning>,
}

impl AcqReader<File> {
    /// Parse the headers of a file on disk. Returns the model (without
    /// sample data) and the sample reader that can fill or stream it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Datafile, SampleReader<File>)> {
        Self::parse(File::open(path)?)
    }
}

impl AcqReader<SpooledTempFile> {
    /// Parse a non-seekable stream by spooling it into a temporary
    /// seekable buffer first.
    pub fn spool<R: Read>(input: R) -> Result<(Datafile, SampleReader<SpooledTempFile>)> {
        Self::parse_source(ByteSource::spooled(input)?)
    }
}

impl<S: Read + Seek> AcqReader<S> {
    pub fn parse(source: S) -> Result<(Datafile, SampleReader<S>)> {
        Self::parse_source(ByteSource::new(source, ByteOrder::Little))
    }

    pub fn parse_source(mut src: ByteSource<S>) -> Result<(Datafile, SampleReader<S>)> {
        let (revision, order) = bootstrap(&mut src)?;
        src.set_order(order);
        info!(
            revision,
            byte_order = %order,
            version = %rev::version_string_guess(revision),
            "parsing acq file"
        );
        let reader = AcqReader {
            src,
            revision,
            text: TextDecoder::new(),
            warnings: Vec::new(),
        };
        reader.walk()
    }

    fn decode(&mut self, schema: &HeaderSchema, offset: u64) -> Result<HeaderRecord> {
        schema.decode(
            &mut self.src,
            offset,
            self.revision,
            &mut self.text,
            &mut self.warnings,
        )
    }

    fn warn(&mut self, warning: ReadWarning) {
        warn!("{warning}");
        self.warnings.push(warning);
    }

    fn walk(mut self) -> Result<(Datafile, SampleReader<S>)> {
        // Graph header.
        let rec = self.decode(h::graph_schema(self.revision), 0)?;
        let mut graph = h::GraphHeader {
            rec,
            revision: self.revision,
        };
        let graph_len = graph.effective_len_bytes()?;
        graph.rec.read_trailing(&mut self.src, graph_len)?;
        let channel_count = graph.channel_count()?;
        let samples_per_second = 1000.0 / graph.sample_time_ms()?;
        let is_compressed = graph.compressed();
        debug!(
            channel_count,
            samples_per_second, is_compressed, "graph header read"
        );

        // Padding headers between graph and channel headers (4.3+).
        let mut cursor = graph_len as u64;
        for _ in 0..graph.expected_padding_headers() {
            let rec = self.decode(&h::PADDING, cursor)?;
            cursor += h::padding_effective_len(&rec)? as u64;
        }

        // Channel headers.
        let mut channel_headers = Vec::with_capacity(channel_count);
        for _ in 0..channel_count {
            let rec = self.decode(h::channel_schema(self.revision), cursor)?;
            let ch = h::ChannelHeader { rec };
            cursor += ch.effective_len_bytes()? as u64;
            channel_headers.push(ch);
        }

        // Foreign data header. Contents unknown; the block's bytes are
        // kept verbatim in the record.
        let mut foreign = self.decode(h::foreign_schema(self.revision), cursor)?;
        let foreign_len = h::foreign_effective_len(&foreign, self.revision)?;
        foreign.read_trailing(&mut self.src, foreign_len)?;
        cursor += foreign_len as u64;

        // Channel datatype headers. The foreign header's declared length
        // is not always honest, so failing a direct read we scan forward
        // for a plausible run of dtype headers.
        let (dtype_headers, data_start) = self.locate_dtype_headers(cursor, channel_count)?;
        debug!(data_start, "data region located");

        let channels =
            self.build_channels(&channel_headers, &dtype_headers, samples_per_second)?;

        let data_length: usize = if is_compressed {
            0
        } else {
            channels.iter().map(|c| c.data_length()).sum()
        };
        let marker_offset = data_start + data_length as u64;

        // Markers. A missing or truncated marker section is recoverable
        // for uncompressed files (nothing else follows that we need);
        // compressed files need the walk to continue past it.
        let (markers, post_marker_pos) = match self.read_markers(marker_offset) {
            Ok((m, end)) => (m, Some(end)),
            Err(e) if !is_compressed => {
                self.warn(ReadWarning::Markers {
                    reason: e.to_string(),
                });
                (Vec::new(), None)
            }
            Err(e) => return Err(e),
        };

        // Journal. Same policy as markers.
        let (journal, post_journal_pos) = match post_marker_pos {
            Some(p) => match self.read_journal(p) {
                Ok((j, end)) => (j, Some(end)),
                Err(e) if !is_compressed => {
                    self.warn(ReadWarning::Journal {
                        reason: e.to_string(),
                    });
                    (None, None)
                }
                Err(e) => return Err(e),
            },
            None => (None, None),
        };

        // Compression headers and per-channel segment offsets.
        let compressed_segments = if is_compressed {
            let start = post_journal_pos.ok_or(AcqError::BadHeader {
                kind: "MainCompression",
                offset: marker_offset,
                reason: "journal section end unknown".to_string(),
            })?;
            Some(self.read_compression_headers(start, channel_count)?)
        } else {
            None
        };

        // Marker -> channel references are weak; a dangling one is a
        // warning, not an error, and the marker keeps its number.
        for i in 0..markers.len() {
            if let Some(n) = markers[i].channel_number {
                if !channels.iter().any(|c| c.order_num == n) {
                    self.warn(ReadWarning::UnmatchedMarkerChannel {
                        marker_index: i,
                        channel_number: n,
                    });
                }
            }
        }

        let layout = DataLayout {
            byte_order: self.src.order(),
            data_start_offset: data_start,
            channels: channels
                .iter()
                .map(|c| ChannelLayout {
                    frequency_divider: c.frequency_divider,
                    dtype: c.dtype,
                    point_count: c.point_count,
                })
                .collect(),
            compressed: compressed_segments,
        };

        let datafile = Datafile {
            file_revision: self.revision,
            byte_order: self.src.order(),
            text_encoding: self.text.chosen(),
            is_compressed,
            samples_per_second,
            graph_header: graph.rec,
            channels,
            markers,
            journal,
            warnings: self.warnings,
        };

        Ok((datafile, SampleReader::new(self.src, layout)))
    }

    fn build_channels(
        &mut self,
        channel_headers: &[h::ChannelHeader],
        dtype_headers: &[h::ChannelDtypeHeader],
        samples_per_second: f64,
    ) -> Result<Vec<Channel>> {
        let mut channels = Vec::with_capacity(channel_headers.len());
        for (chh, dth) in channel_headers.iter().zip(dtype_headers) {
            let dtype = match (dth.type_code(), dth.sample_size()) {
                (0 | 1, 8) => SampleDtype::F64,
                (2, 2) => SampleDtype::I16,
                (code, size) => {
                    return Err(AcqError::BadHeader {
                        kind: "ChannelDatatype",
                        offset: dth.rec.offset,
                        reason: format!("type code {code} with size {size}"),
                    })
                }
            };
            // Scale and offset lie for float channels; the stored values
            // are already in units.
            let (scale, offset) = match dtype {
                SampleDtype::F64 => (1.0, 0.0),
                SampleDtype::I16 => (chh.raw_scale()?, chh.raw_offset()?),
            };
            let divider = chh.frequency_divider();
            channels.push(Channel {
                order_num: chh.order_num(),
                name: chh.name(),
                units: chh.units(),
                frequency_divider: divider,
                samples_per_second: samples_per_second / divider as f64,
                point_count: chh.point_count()?,
                dtype,
                scale,
                offset,
                raw_data: None,
            });
        }
        Ok(channels)
    }

    /// Strategy 1: trust the foreign header's declared length and read the
    /// dtype headers right where it ends. Strategy 2: scan forward for a
    /// run of `channel_count` plausible dtype headers. Neither working is
    /// `ForeignHeaderAmbiguous`.
    fn locate_dtype_headers(
        &mut self,
        start: u64,
        channel_count: usize,
    ) -> Result<(Vec<h::ChannelDtypeHeader>, u64)> {
        for delta in 0..MAX_DTYPE_SCANS {
            match self.try_dtype_headers(start + delta as u64, channel_count) {
                Ok(Some((headers, end))) => {
                    if delta > 0 {
                        debug!(delta, "dtype headers found by scanning");
                    }
                    return Ok((headers, end));
                }
                Ok(None) => continue,
                // Once reads run off the end of the source, no later
                // offset can work either.
                Err(AcqError::InsufficientData { .. }) => {
                    return Err(AcqError::ForeignHeaderAmbiguous { scanned: delta })
                }
                Err(e) => return Err(e),
            }
        }
        Err(AcqError::ForeignHeaderAmbiguous {
            scanned: MAX_DTYPE_SCANS,
        })
    }

    fn try_dtype_headers(
        &mut self,
        offset: u64,
        channel_count: usize,
    ) -> Result<Option<(Vec<h::ChannelDtypeHeader>, u64)>> {
        let mut headers = Vec::with_capacity(channel_count);
        let mut cur = offset;
        for _ in 0..channel_count {
            let rec = self.decode(&h::CHANNEL_DTYPE, cur)?;
            cur += rec.consumed as u64;
            let header = h::ChannelDtypeHeader { rec };
            if !header.possibly_valid() {
                return Ok(None);
            }
            headers.push(header);
        }
        Ok(Some((headers, cur)))
    }

    fn read_markers(&mut self, offset: u64) -> Result<(Vec<Marker>, u64)> {
        let rec = self.decode(h::marker_schema(self.revision), offset)?;
        let count = h::marker_count(&rec, self.revision)?;
        debug!(count, offset, "reading markers");
        let mut cur = rec.offset + rec.consumed as u64;
        let mut markers = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let item_rec = self.decode(h::marker_item_schema(self.revision), cur)?;
            let item = h::MarkerItemHeader {
                rec: item_rec,
                revision: self.revision,
            };
            let raw_label = self.src.read_fixed(item.text_length()?)?;
            let label = self.text.decode(&raw_label, &mut self.warnings);
            cur += item.effective_len_bytes()? as u64;
            markers.push(Marker {
                global_sample_index: item.sample_index()?,
                label,
                type_code: item.type_code(),
                channel_number: item.channel_number(),
                created_at: item.date_created_ms().and_then(created_at_from_ms),
                color: None,
                style_tag: None,
            });
        }
        if !h::is_post4(self.revision) && self.revision >= rev::V_381 {
            cur = self.read_marker_metadata(&mut markers, cur)?;
        }
        Ok((markers, cur))
    }

    /// The legacy block after the marker items. A journal tag where the
    /// block's own tag should be means there is no block.
    fn read_marker_metadata(&mut self, markers: &mut [Marker], offset: u64) -> Result<u64> {
        let pre = self.decode(&h::MARKER_METADATA_PRE, offset)?;
        if pre.bytes("tag") == Some(&h::JOURNAL_TAG) {
            debug!("no marker metadata block");
            return Ok(offset);
        }
        let mut cur = offset + pre.consumed as u64;
        for _ in 0..markers.len() {
            let rec = self.decode(&h::MARKER_METADATA_ITEM, cur)?;
            cur += rec.consumed as u64;
            let index = rec.int("lMarkerNumber").unwrap_or(0) - 1;
            if index >= 0 && (index as usize) < markers.len() {
                let marker = &mut markers[index as usize];
                marker.color = rec.bytes("rgbaColor").and_then(|b| b.try_into().ok());
                marker.style_tag = rec.int("hMarkerTag").map(|v| v as i16);
            }
        }
        Ok(cur)
    }

    fn read_journal(&mut self, offset: u64) -> Result<(Option<Journal>, u64)> {
        if h::is_post4(self.revision) {
            self.read_journal_v4(offset)
        } else {
            self.read_journal_v2(offset)
        }
    }

    fn read_journal_v2(&mut self, offset: u64) -> Result<(Option<Journal>, u64)> {
        if self.revision < rev::V_370 {
            info!("journals before revision 3.7.0 are not understood; skipping");
            return Ok((None, offset));
        }
        let rec = self.decode(&h::JOURNAL_V2, offset)?;
        if !h::journal_v2_tag_ok(&rec) {
            return Err(AcqError::BadHeader {
                kind: "Journal",
                offset,
                reason: format!("tag {:02X?}, expected {:02X?}", rec.bytes("tag"), h::JOURNAL_TAG),
            });
        }
        let len = rec.require_int("lJournalLen")?.max(0) as usize;
        let raw = self.src.read_fixed(len)?;
        let text = self.text.decode(&raw, &mut self.warnings);
        let end = self.src.position();
        Ok((
            Some(Journal {
                text,
                header: rec,
            }),
            end,
        ))
    }

    /// Post-4 journals are one length-prefixed section. When the declared
    /// section can't even hold a journal header there is no journal, but
    /// the walk still skips to the section end -- the compression headers
    /// of compressed files sit there.
    fn read_journal_v4(&mut self, offset: u64) -> Result<(Option<Journal>, u64)> {
        let len_rec = self.decode(&h::JOURNAL_LEN_V4, offset)?;
        let section_len = len_rec.require_int("lJournalDataLen")?.max(0) as usize;
        let journal_offset = offset + len_rec.consumed as u64;
        let section_end = offset + section_len as u64;

        let mut journal = None;
        if h::JOURNAL_V4.len_bytes(self.revision) <= section_len {
            let rec = self.decode(&h::JOURNAL_V4, journal_offset)?;
            let text_len = h::journal_v4_text_len(&rec, self.revision)?;
            let raw = self.src.read_fixed(text_len)?;
            let text = self.text.decode(&raw, &mut self.warnings);
            journal = Some(Journal { text, header: rec });
        }
        self.src.seek(section_end)?;
        Ok((journal, section_end))
    }

    fn read_compression_headers(
        &mut self,
        offset: u64,
        channel_count: usize,
    ) -> Result<Vec<CompressedSegment>> {
        let main = self.decode(h::main_compression_schema(self.revision), offset)?;
        let mut cur = offset + h::main_compression_effective_len(&main, self.revision)? as u64;
        let mut segments = Vec::with_capacity(channel_count);
        for _ in 0..channel_count {
            let rec = self.decode(&h::CHANNEL_COMPRESSION, cur)?;
            let header = h::ChannelCompressionHeader { rec };
            segments.push(CompressedSegment {
                offset: header.compressed_data_offset()?,
                length: header.compressed_data_len()?,
            });
            cur += header.effective_len_bytes()? as u64;
        }
        Ok(segments)
    }
}

/// Determine byte order and revision from the version field at offset 2.
/// Both orders are tried; the one that yields an in-range revision wins
/// (the smaller value when both do).
pub(crate) fn bootstrap<S: Read + Seek>(src: &mut ByteSource<S>) -> Result<(u32, ByteOrder)> {
    src.seek(0)?;
    let head = src.read_fixed(6)?;
    let raw: [u8; 4] = head[2..6].try_into().unwrap();
    let candidates = [
        (i32::from_le_bytes(raw) as i64, ByteOrder::Little),
        (i32::from_be_bytes(raw) as i64, ByteOrder::Big),
    ];
    let in_range = |v: i64| {
        v >= rev::EARLIEST_KNOWN as i64 && v <= rev::LATEST_PLAUSIBLE as i64
    };
    match candidates
        .iter()
        .filter(|(v, _)| in_range(*v))
        .min_by_key(|(v, _)| *v)
    {
        Some(&(v, order)) => Ok((v as u32, order)),
        None => Err(AcqError::UnsupportedRevision {
            revision: candidates[0].0.min(candidates[1].0),
            earliest: rev::EARLIEST_KNOWN,
        }),
    }
}
