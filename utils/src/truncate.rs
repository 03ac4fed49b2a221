//! Bounded output truncation.
//!
//! Command output and tool results enter an LLM context window; unbounded
//! text is wasted budget. Truncation keeps the head and tail of the string
//! with a fixed marker between them, never exceeding the requested bound.

/// Marker inserted between the preserved head and tail.
pub const TRUNCATION_MARKER: &str = "\n... [TRUNCATED] ...\n";

/// Truncate `s` to at most `max_len` bytes, preserving head and tail.
///
/// A `max_len` of 0 means unbounded. If the bound is smaller than the marker
/// itself, the marker is clipped to fit. The head/tail cut points are pulled
/// back to the nearest ASCII byte, which avoids splitting a multi-byte
/// character at the boundary (an approximation, not a strict encoding-safe
/// cut: whole non-ASCII characters adjacent to the cut are dropped too).
#[must_use]
pub fn truncate_middle(s: &str, max_len: usize) -> String {
    if max_len == 0 || s.len() <= max_len {
        return s.to_string();
    }

    if max_len <= TRUNCATION_MARKER.len() {
        return TRUNCATION_MARKER[..max_len].to_string();
    }

    let avail = max_len - TRUNCATION_MARKER.len();
    let half = avail / 2;

    let bytes = s.as_bytes();
    let mut head_end = half;
    while head_end > 0 && !bytes[head_end - 1].is_ascii() {
        head_end -= 1;
    }
    let mut tail_start = bytes.len() - half;
    while tail_start < bytes.len() && !bytes[tail_start].is_ascii() {
        tail_start += 1;
    }

    // Trimming only ever removes bytes, so the bound holds by construction.
    let head = std::str::from_utf8(&bytes[..head_end]).unwrap_or("");
    let tail = std::str::from_utf8(&bytes[tail_start..]).unwrap_or("");

    let mut out = String::with_capacity(head.len() + TRUNCATION_MARKER.len() + tail.len());
    out.push_str(head);
    out.push_str(TRUNCATION_MARKER);
    out.push_str(tail);
    out
}

#[cfg(test)]
mod tests {
    use super::{TRUNCATION_MARKER, truncate_middle};

    #[test]
    fn short_input_is_unchanged() {
        assert_eq!(truncate_middle("hello", 100), "hello");
        assert_eq!(truncate_middle("hello", 5), "hello");
    }

    #[test]
    fn zero_bound_means_unbounded() {
        let long = "x".repeat(10_000);
        assert_eq!(truncate_middle(&long, 0), long);
    }

    #[test]
    fn long_input_keeps_head_and_tail() {
        let input: String = (0..100).map(|i| format!("line{i}\n")).collect();
        let out = truncate_middle(&input, 120);
        assert!(out.len() <= 120);
        assert!(out.starts_with("line0"));
        assert!(out.ends_with("line99\n"));
        assert!(out.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn bound_never_exceeded() {
        let input = "abcdefghij".repeat(50);
        for max in [25, 60, 100, 499] {
            let out = truncate_middle(&input, max);
            assert!(out.len() <= max, "len {} for bound {max}", out.len());
        }
    }

    #[test]
    fn tiny_bound_clips_the_marker() {
        let input = "x".repeat(100);
        let out = truncate_middle(&input, 5);
        assert_eq!(out, &TRUNCATION_MARKER[..5]);
    }

    #[test]
    fn multibyte_chars_are_not_split() {
        let input = "héllo wörld ".repeat(30);
        let out = truncate_middle(&input, 40);
        assert!(out.len() <= 40);
        // Must still be valid UTF-8 end to end (String construction enforces
        // it); also confirm the marker survived intact.
        assert!(out.contains(TRUNCATION_MARKER));
    }
}
