// Example usage of the acq reader: metadata tour plus streaming.

use acq_reader::{Result, StreamControl};
use tracing::{info, Level};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data/recording.acq".to_string());

    // Parse headers without touching sample data.
    let (datafile, mut samples) = acq_reader::open_file(&path)?;

    info!("{datafile}");
    info!(
        "byte order: {}, encoding: {}, compressed: {}",
        datafile.byte_order, datafile.text_encoding, datafile.is_compressed
    );

    for channel in &datafile.channels {
        info!(
            "  [{}] {} ({}): {} samples @ {} Hz, divider {}",
            channel.order_num,
            channel.name,
            channel.units,
            channel.point_count,
            channel.samples_per_second,
            channel.frequency_divider
        );
    }

    for marker in &datafile.markers {
        info!(
            "  marker '{}' ({}) at sample {}{}",
            marker.label,
            marker.type_name(),
            marker.global_sample_index,
            match datafile.marker_channel(marker) {
                Some(ch) => format!(" on channel {}", ch.name),
                None => String::new(),
            }
        );
    }

    if let Some(journal) = &datafile.journal {
        info!("journal: {} bytes of text", journal.text.len());
    }

    for warning in &datafile.warnings {
        info!("warning: {warning}");
    }

    // Stream the sample data without materialising it; count per-channel
    // totals as a cheap consumer.
    let mut totals = vec![0usize; datafile.channels.len()];
    samples.stream(|channel, _start, block| {
        totals[channel] += block.len();
        StreamControl::Continue
    })?;
    for (channel, total) in datafile.channels.iter().zip(&totals) {
        info!("streamed {} samples of {}", total, channel.name);
    }

    Ok(())
}
