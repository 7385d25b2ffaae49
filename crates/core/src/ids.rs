//! Deterministic identifier helpers.
//!
//! Every id in the system is a pure function of source data so that
//! re-chunking and graph rebuilds are idempotent.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Namespace for chunk point ids handed to vector stores that need UUID keys.
const CHUNK_POINT_NAMESPACE: Uuid = Uuid::from_u128(0x6d1a_43c2_9b0e_4f5a_8c11_2e7f_0a9d_b35e);

/// Lowercase slug: alphanumerics kept, every other run collapsed to `-`.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Drop a trailing parenthetical such as life dates: `"Karl Marx (1818-1883)"` -> `"Karl Marx"`.
pub fn strip_parenthetical(name: &str) -> &str {
    let trimmed = name.trim();
    if trimmed.ends_with(')') {
        if let Some(idx) = trimmed.rfind(" (") {
            let head = trimmed[..idx].trim_end();
            if !head.is_empty() {
                return head;
            }
        }
    }
    trimmed
}

/// Hex SHA-256 of a text body.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// First 16 characters of a content hash (or the whole hash if shorter).
pub fn short_hash(hash: &str) -> &str {
    match hash.char_indices().nth(16) {
        Some((idx, _)) => &hash[..idx],
        None => hash,
    }
}

/// Stable UUIDv5 derived from a chunk id.
pub fn point_id(chunk_id: &str) -> Uuid {
    Uuid::new_v5(&CHUNK_POINT_NAMESPACE, chunk_id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Karl Marx"), "karl-marx");
        assert_eq!(slugify("  Marx, Karl  "), "marx-karl");
        assert_eq!(slugify("Capital, Vol. I (1867)"), "capital-vol-i-1867");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_strip_parenthetical() {
        assert_eq!(strip_parenthetical("Karl Marx (1818-1883)"), "Karl Marx");
        assert_eq!(strip_parenthetical("Paris Commune"), "Paris Commune");
        assert_eq!(strip_parenthetical("(1818)"), "(1818)");
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash("surplus value");
        assert_eq!(a, content_hash("surplus value"));
        assert_eq!(a.len(), 64);
        assert_eq!(short_hash(&a).len(), 16);
        assert_eq!(short_hash("abc"), "abc");
    }

    #[test]
    fn test_point_id_is_deterministic() {
        assert_eq!(point_id("entry:karl-marx"), point_id("entry:karl-marx"));
        assert_ne!(point_id("entry:karl-marx"), point_id("entry:mao-zedong"));
    }
}
