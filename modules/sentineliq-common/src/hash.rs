// Rolling 32-bit content hash used for article dedup.
//
// hash = ((hash << 5) - hash) + unit, over UTF-16 code units with wrapping
// i32 arithmetic. Values must stay stable across releases: stored hashes are
// compared against freshly computed ones.

/// Compute the 32-bit rolling hash of `text`.
pub fn content_hash(text: &str) -> i32 {
    text.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

/// Hash rendered as 8 lowercase hex digits (two's complement) for storage.
pub fn content_hash_hex(text: &str) -> String {
    format!("{:08x}", content_hash(text) as u32)
}
