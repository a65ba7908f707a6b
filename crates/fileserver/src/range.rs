//! HTTP `Range` header parsing

use torrent::RangeRequest;

/// Parse a `Range` header against a resource of `length` bytes.
///
/// Supports `bytes=a-b`, `bytes=a-` and suffix `bytes=-n` forms; the end is
/// clamped to the last byte. With several ranges the first satisfiable one
/// is used. Returns `None` when nothing satisfiable remains, in which case
/// the whole resource should be served.
pub fn parse_range(header: &str, length: u64) -> Option<RangeRequest> {
    let ranges = header.trim().strip_prefix("bytes=")?;
    if length == 0 {
        return None;
    }
    let last = length - 1;

    ranges.split(',').find_map(|part| {
        let (start, end) = part.trim().split_once('-')?;
        let (start, end) = (start.trim(), end.trim());

        let (start, end) = if start.is_empty() {
            let suffix = end.parse::<u64>().ok().filter(|n| *n > 0)?;
            (length.saturating_sub(suffix), last)
        } else if end.is_empty() {
            (start.parse::<u64>().ok()?, last)
        } else {
            (start.parse::<u64>().ok()?, end.parse::<u64>().ok()?.min(last))
        };

        (start <= end).then_some(RangeRequest { start, end })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u64, end: u64) -> Option<RangeRequest> {
        Some(RangeRequest { start, end })
    }

    #[test]
    fn test_closed_range() {
        assert_eq!(parse_range("bytes=0-99", 1000), range(0, 99));
        assert_eq!(parse_range("bytes=5-5", 10), range(5, 5));
    }

    #[test]
    fn test_open_range() {
        assert_eq!(parse_range("bytes=900-", 1000), range(900, 999));
    }

    #[test]
    fn test_suffix_range() {
        assert_eq!(parse_range("bytes=-100", 1000), range(900, 999));
        // Suffix longer than the file covers all of it
        assert_eq!(parse_range("bytes=-5000", 1000), range(0, 999));
        assert_eq!(parse_range("bytes=-0", 1000), None);
    }

    #[test]
    fn test_end_is_clamped() {
        assert_eq!(parse_range("bytes=500-5000", 1000), range(500, 999));
    }

    #[test]
    fn test_unsatisfiable() {
        assert_eq!(parse_range("bytes=1000-", 1000), None);
        assert_eq!(parse_range("bytes=1000-2000", 1000), None);
        assert_eq!(parse_range("bytes=0-0", 0), None);
    }

    #[test]
    fn test_malformed() {
        assert_eq!(parse_range("", 1000), None);
        assert_eq!(parse_range("items=0-10", 1000), None);
        assert_eq!(parse_range("bytes=abc", 1000), None);
        assert_eq!(parse_range("bytes=10-5", 1000), None);
        assert_eq!(parse_range("bytes=x-5", 1000), None);
    }

    #[test]
    fn test_multiple_ranges_use_first_satisfiable() {
        assert_eq!(parse_range("bytes=0-9, 20-29", 100), range(0, 9));
        assert_eq!(parse_range("bytes=500-600, 20-29", 100), range(20, 29));
    }
}
