//! Vorbis comment parsing.

use flac_stream_types::Tags;

use crate::decoder::VorbisComment;

/// Split one `KEY=value` entry on its first `=`. Entries without `=` yield `None`.
pub(crate) fn split_entry(entry: &str) -> Option<(String, String)> {
    entry
        .split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
}

/// Parse a comment block into ordered pairs: the vendor entry first, then every comment.
///
/// The vendor string goes through the same split as the comments, so a plain tool name
/// without `=` is dropped like any other malformed entry.
pub(crate) fn parse_vorbis_comment(block: &VorbisComment) -> Tags {
    let pairs = block
        .vendor
        .iter()
        .chain(block.comments.iter())
        .filter_map(|entry| split_entry(entry))
        .collect();
    Tags(pairs)
}
