// src/util.rs — Shared utility functions

/// Truncate a string for display/logging (UTF-8 safe).
///
/// Returns a substring of at most `max_len` bytes, ensuring the cut
/// point falls on a valid UTF-8 character boundary.
pub fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        let mut end = max_len;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}

/// Truncate a string to at most `max_chars` characters.
///
/// Conversation titles are capped in characters, not bytes, so CJK
/// titles keep the same visible length as ASCII ones.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Current unix time in seconds.
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Human-readable local wall-clock string, as surfaced to the UI.
pub fn wall_clock() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Fresh opaque ID for entries, documents and shares.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

const ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random alphanumeric string of `len` characters (supplier names).
pub fn random_alnum(len: usize) -> String {
    let mut buf = vec![0u8; len];
    if getrandom::getrandom(&mut buf).is_err() {
        // Extremely unlikely; fall back to a uuid-derived string.
        return uuid::Uuid::new_v4().simple().to_string()[..len].to_string();
    }
    buf.iter()
        .map(|b| ALNUM[(*b as usize) % ALNUM.len()] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short() {
        assert_eq!(truncate_str("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_long() {
        assert_eq!(truncate_str("hello world", 5), "hello");
    }

    #[test]
    fn test_truncate_multibyte() {
        // "café" is 5 bytes (é = 2 bytes), truncating at 4 must not split é
        assert_eq!(truncate_str("café", 4), "caf");
    }

    #[test]
    fn test_truncate_chars_cjk() {
        assert_eq!(truncate_chars("你好世界", 2), "你好");
    }

    #[test]
    fn test_truncate_chars_short() {
        assert_eq!(truncate_chars("hi", 18), "hi");
    }

    #[test]
    fn test_random_alnum_length_and_charset() {
        let s = random_alnum(10);
        assert_eq!(s.len(), 10);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_new_id_unique() {
        assert_ne!(new_id(), new_id());
    }
}
