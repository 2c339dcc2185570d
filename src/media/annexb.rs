//! Annex-B byte stream helpers
//!
//! Annex-B separates NAL units with start codes instead of length prefixes:
//! ```text
//! 00 00 00 01 <NALU> 00 00 01 <NALU> ...
//! ```
//!
//! Splitting works on 4-byte delimiters first and then 3-byte delimiters
//! inside each span, so the leading zero of a 4-byte start code never leaks
//! into the previous NALU. All returned slices share the input allocation.

use bytes::Bytes;

/// 4-byte start code
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// 3-byte start code
pub const SHORT_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// Start code as a shared buffer, used when emitting Annex-B fragments
pub fn start_code() -> Bytes {
    Bytes::from_static(&START_CODE)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Split `data` on `delimiter`, calling `f` for every span.
///
/// Empty spans between delimiters are skipped; the final span is passed
/// along only if non-empty.
fn split_on(data: Bytes, delimiter: &[u8], mut f: impl FnMut(Bytes)) {
    let mut rest = data;
    while !rest.is_empty() {
        match find(&rest, delimiter) {
            Some(pos) => {
                if pos > 0 {
                    f(rest.slice(..pos));
                }
                rest = rest.slice(pos + delimiter.len()..);
            }
            None => {
                f(rest);
                return;
            }
        }
    }
}

/// Split an Annex-B access unit into NAL units, in order.
pub fn split_nalus(data: Bytes, mut f: impl FnMut(Bytes)) {
    split_on(data, &START_CODE, |span| split_on(span, &SHORT_START_CODE, &mut f));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nalus(data: Bytes) -> Vec<Bytes> {
        let mut out = Vec::new();
        split_nalus(data, |nalu| out.push(nalu));
        out
    }

    #[test]
    fn test_split_four_byte_start_codes() {
        let data = Bytes::from_static(&[
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, // SPS
            0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, // PPS
            0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, // IDR
        ]);

        let nalus = nalus(data);
        assert_eq!(nalus.len(), 3);
        assert_eq!(&nalus[0][..], &[0x67, 0x42]);
        assert_eq!(&nalus[1][..], &[0x68, 0xCE]);
        assert_eq!(&nalus[2][..], &[0x65, 0x88, 0x84]);
    }

    #[test]
    fn test_split_mixed_start_codes() {
        // 4-byte code for the first slice, 3-byte code for the second
        let data = Bytes::from_static(&[
            0x00, 0x00, 0x00, 0x01, 0x65, 0x11, // slice 0
            0x00, 0x00, 0x01, 0x65, 0x22, // slice 1
            0x00, 0x00, 0x00, 0x01, 0x41, 0x33, // next slice
        ]);

        let nalus = nalus(data);
        assert_eq!(nalus.len(), 3);
        assert_eq!(&nalus[0][..], &[0x65, 0x11]);
        assert_eq!(&nalus[1][..], &[0x65, 0x22]);
        assert_eq!(&nalus[2][..], &[0x41, 0x33]);
    }

    #[test]
    fn test_no_delimiter_is_single_fragment() {
        let data = Bytes::from_static(&[0x41, 0x9A, 0x00, 0x07]);
        let nalus = nalus(data.clone());
        assert_eq!(nalus, vec![data]);
    }

    #[test]
    fn test_trailing_delimiter_and_empty_spans() {
        let data = Bytes::from_static(&[
            0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x09, 0xF0, 0x00, 0x00, 0x00, 0x01,
        ]);
        let nalus = nalus(data);
        assert_eq!(nalus.len(), 1);
        assert_eq!(&nalus[0][..], &[0x09, 0xF0]);
    }

    #[test]
    fn test_spans_share_input_allocation() {
        let data = Bytes::from(vec![0x00, 0x00, 0x00, 0x01, 0x65, 0x01, 0x02]);
        let base = data.as_ptr() as usize;
        let nalus = nalus(data);
        assert_eq!(nalus[0].as_ptr() as usize, base + 4);
    }

    #[test]
    fn test_empty_input() {
        assert!(nalus(Bytes::new()).is_empty());
    }
}
