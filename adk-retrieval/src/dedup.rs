//! Exact and near-duplicate removal for retrieved fragments.
//!
//! Near-duplicate detection hashes a fixed three-part sample of each text
//! (the first, middle and last 100 characters) instead of the full text, so
//! the key is computed in constant space regardless of fragment length.
//! Two texts that agree on all three windows are treated as duplicates even
//! if they differ elsewhere.

use std::collections::HashSet;

use crate::fragment::Fragment;

/// Width of each sampled window, in characters.
pub const SAMPLE_WINDOW: usize = 100;

/// Hash of the full text.
pub fn content_key(text: &str) -> blake3::Hash {
    blake3::hash(text.as_bytes())
}

/// Hash of the first, middle and last [`SAMPLE_WINDOW`] characters of `text`.
///
/// The middle window starts at the character midpoint. Windows overlap (or
/// repeat) for texts shorter than three windows.
pub fn sample_key(text: &str) -> blake3::Hash {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mid = len / 2;

    let head = &chars[..SAMPLE_WINDOW.min(len)];
    let middle = &chars[mid..(mid + SAMPLE_WINDOW).min(len)];
    let tail = &chars[len.saturating_sub(SAMPLE_WINDOW)..];

    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 4];
    for c in head.iter().chain(middle).chain(tail) {
        hasher.update(c.encode_utf8(&mut buf).as_bytes());
    }
    hasher.finalize()
}

/// Remove fragments whose full text was already seen. First occurrence wins.
pub fn dedup_exact(fragments: Vec<Fragment>) -> Vec<Fragment> {
    dedup_by_key(fragments, |f| content_key(&f.text))
}

/// Remove fragments whose [`sample_key`] was already seen. First occurrence wins.
pub fn dedup_near(fragments: Vec<Fragment>) -> Vec<Fragment> {
    dedup_by_key(fragments, |f| sample_key(&f.text))
}

fn dedup_by_key(
    fragments: Vec<Fragment>,
    key: impl Fn(&Fragment) -> blake3::Hash,
) -> Vec<Fragment> {
    let mut seen = HashSet::with_capacity(fragments.len());
    fragments.into_iter().filter(|f| seen.insert(key(f))).collect()
}
