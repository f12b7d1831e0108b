//! Frame to byte-buffer conversion.

use flac_stream_types::normalize_bits_per_sample;

use crate::decoder::Frame;

/// Interleave a decoded frame into little-endian PCM bytes.
///
/// Each sample occupies the normalized container width (1, 2 or 4 bytes). The low
/// `ceil(source_bits / 8)` bytes of the sample are copied and any remaining container bytes
/// are zero, so a 24-bit sample becomes 3 data bytes plus a zero high byte.
///
/// Layout is sample-major: for each sample index, every channel before the next index.
pub(crate) fn interleave_le(frame: &Frame<'_>) -> Vec<u8> {
    let header = &frame.header;
    let source_bits = header.bits_per_sample.clamp(1, 32);
    let container = (normalize_bits_per_sample(source_bits) / 8) as usize;
    let significant = (source_bits as usize).div_ceil(8).min(container);
    let padding = container - significant;

    let channels = frame.planes.len().min(header.channels as usize);
    let mut out = Vec::with_capacity(header.block_size * channels * container);

    for i in 0..header.block_size {
        for plane in &frame.planes[..channels] {
            let sample = plane.get(i).copied().unwrap_or(0);
            out.extend_from_slice(&sample.to_le_bytes()[..significant]);
            out.extend(std::iter::repeat_n(0u8, padding));
        }
    }

    out
}
