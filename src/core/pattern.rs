// Interleave pattern planning for uncompressed data.
//
// Uncompressed samples are stored as they stream off the amplifiers. With
// three channels the data looks like `012 012 012 ...`; a channel with
// frequency divider n only contributes on every nth slot, so dividers
// [1, 4, 2] give `0120020 0120020 ...`. The pattern of one full cycle is
// determined by the least common multiple of the dividers.
//
// The end of the stream does not follow the cycle: a slow channel can be
// short one expected sample. The per-channel remaining byte counts are the
// ground truth, and the final cycle is rebuilt from them -- which can
// produce a shape that is not a prefix of the base pattern.

use std::borrow::Cow;

/// How much interleaved data to read per chunk, in bytes. A suggestion;
/// the output is identical for any value.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}

/// The order channels contribute samples within one full cycle: for each
/// slot `s` in `0..lcm(dividers)`, every channel with `s % divider == 0`
/// appears, in channel order.
pub fn sample_pattern(dividers: &[u32]) -> Vec<usize> {
    let base_len = dividers.iter().fold(1u64, |l, &d| lcm(l, d.max(1) as u64));
    let mut pattern = Vec::new();
    for slot in 0..base_len {
        for (ch, &d) in dividers.iter().enumerate() {
            if slot % d.max(1) as u64 == 0 {
                pattern.push(ch);
            }
        }
    }
    pattern
}

/// The sample pattern expanded to one entry per byte. Slot widths vary:
/// an int16 channel occupies 2 bytes where a float64 one occupies 8.
pub fn byte_pattern(dividers: &[u32], sample_sizes: &[usize]) -> Vec<u16> {
    let mut out = Vec::new();
    for ch in sample_pattern(dividers) {
        out.extend(std::iter::repeat(ch as u16).take(sample_sizes[ch]));
    }
    out
}

fn channel_byte_counts(pattern: &[u16], channel_count: usize) -> Vec<usize> {
    let mut counts = vec![0usize; channel_count];
    for &ch in pattern {
        counts[ch as usize] += 1;
    }
    counts
}

/// Keep, for each channel, only its first `remaining` bytes -- equivalent
/// to deleting surplus occurrences from the end of the pattern.
fn trim_pattern(pattern: &[u16], remaining: &[usize]) -> Vec<u16> {
    let mut kept = vec![0usize; remaining.len()];
    pattern
        .iter()
        .copied()
        .filter(|&ch| {
            kept[ch as usize] += 1;
            kept[ch as usize] <= remaining[ch as usize]
        })
        .collect()
}

/// Plans the sequence of byte patterns the data reader consumes: a tiled
/// chunk pattern while every channel has a full chunk's worth of bytes
/// left, then a trimmed final pattern built from the remaining counts.
pub struct ChunkPlanner {
    chunk_pattern: Vec<u16>,
    chunk_counts: Vec<usize>,
    bytes_remaining: Vec<usize>,
}

impl ChunkPlanner {
    /// `channels` supplies `(frequency_divider, sample_size, point_count)`
    /// per channel, in file order.
    pub fn new(channels: &[(u32, usize, usize)], target_chunk_size: usize) -> Self {
        let dividers: Vec<u32> = channels.iter().map(|c| c.0).collect();
        let sizes: Vec<usize> = channels.iter().map(|c| c.1).collect();
        let base = byte_pattern(&dividers, &sizes);
        let reps = (target_chunk_size / base.len().max(1)).max(1);
        let mut chunk_pattern = Vec::with_capacity(base.len() * reps);
        for _ in 0..reps {
            chunk_pattern.extend_from_slice(&base);
        }
        let chunk_counts = channel_byte_counts(&chunk_pattern, channels.len());
        let bytes_remaining = channels.iter().map(|c| c.1 * c.2).collect();
        Self {
            chunk_pattern,
            chunk_counts,
            bytes_remaining,
        }
    }

    pub fn bytes_remaining(&self) -> &[usize] {
        &self.bytes_remaining
    }

    /// Total bytes left across all channels.
    pub fn total_remaining(&self) -> usize {
        self.bytes_remaining.iter().sum()
    }

    /// The byte pattern for the next chunk, or `None` when every channel
    /// is exhausted. Each returned entry is the channel index owning that
    /// byte of the stream.
    pub fn next_pattern(&mut self) -> Option<Cow<'_, [u16]>> {
        if self.total_remaining() == 0 {
            return None;
        }
        let fits = self
            .chunk_counts
            .iter()
            .zip(&self.bytes_remaining)
            .all(|(&used, &rem)| used <= rem);
        if fits {
            for (rem, used) in self.bytes_remaining.iter_mut().zip(&self.chunk_counts) {
                *rem -= used;
            }
            Some(Cow::Borrowed(&self.chunk_pattern))
        } else {
            let trimmed = trim_pattern(&self.chunk_pattern, &self.bytes_remaining);
            for (rem, used) in self
                .bytes_remaining
                .iter_mut()
                .zip(channel_byte_counts(&trimmed, self.chunk_counts.len()))
            {
                *rem -= used;
            }
            Some(Cow::Owned(trimmed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_rates_alternate() {
        assert_eq!(sample_pattern(&[1, 1]), vec![0, 1]);
    }

    #[test]
    fn mixed_dividers_follow_the_lcm_cycle() {
        assert_eq!(sample_pattern(&[1, 4]), vec![0, 1, 0, 0, 0]);
        assert_eq!(sample_pattern(&[1, 4, 2]), vec![0, 1, 2, 0, 0, 2, 0]);
    }

    #[test]
    fn byte_pattern_widens_slots_by_sample_size() {
        // int16 then float64 at equal rates: 2 bytes then 8 bytes.
        assert_eq!(
            byte_pattern(&[1, 1], &[2, 8]),
            vec![0, 0, 1, 1, 1, 1, 1, 1, 1, 1]
        );
    }

    #[test]
    fn planner_emits_exact_byte_totals() {
        // Dividers [1, 4], 20 and 5 samples of int16: five whole cycles.
        let mut planner = ChunkPlanner::new(&[(1, 2, 20), (4, 2, 5)], 16);
        let mut totals = [0usize; 2];
        while let Some(pat) = planner.next_pattern() {
            for &ch in pat.iter() {
                totals[ch as usize] += 1;
            }
        }
        assert_eq!(totals, [40, 10]);
    }

    #[test]
    fn final_cycle_is_rebuilt_not_truncated() {
        // Dividers [1, 4] with 21 and 5 samples: the last cycle carries a
        // ch0 sample past the final whole group.
        let mut planner = ChunkPlanner::new(&[(1, 2, 21), (4, 2, 5)], 10);
        let mut patterns = Vec::new();
        while let Some(pat) = planner.next_pattern() {
            patterns.push(pat.into_owned());
        }
        let last = patterns.last().unwrap();
        // The trimmed tail ends with ch0 bytes that a prefix of the base
        // pattern would not produce at this length.
        assert_eq!(last, &vec![0, 0]);
        let total: usize = patterns.iter().map(|p| p.len()).sum();
        assert_eq!(total, 21 * 2 + 5 * 2);
    }

    #[test]
    fn chunk_size_does_not_change_totals() {
        for chunk in [1, 7, 64, 4096] {
            let mut planner = ChunkPlanner::new(&[(1, 2, 13), (2, 8, 7)], chunk);
            let mut totals = [0usize; 2];
            while let Some(pat) = planner.next_pattern() {
                for &ch in pat.iter() {
                    totals[ch as usize] += 1;
                }
            }
            assert_eq!(totals, [26, 56]);
        }
    }
}
