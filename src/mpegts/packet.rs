//! Single TS packet assembly

use bytes::{BufMut, BytesMut};

use super::{SYNC_BYTE, TS_PAYLOAD_SIZE};

/// Adaptation field flags: random access indicator + PCR flag
const RANDOM_ACCESS_PCR: u8 = 0x50;

/// Flags byte plus the 6-byte PCR
const PCR_FIELD_LEN: usize = 7;

/// Append one 188-byte packet carrying as much of `payload` as fits.
///
/// With `pcr` set the packet opens a random access point and carries the
/// PCR in its adaptation field. A payload that does not fill the packet is
/// padded with an adaptation field of `183 - payload` bytes (a lone length
/// byte of 0 when a single byte is missing). Returns the payload bytes used.
pub(super) fn write_packet(
    buf: &mut BytesMut,
    pid: u16,
    unit_start: bool,
    continuity_counter: u8,
    pcr: Option<u64>,
    payload: &[u8],
) -> usize {
    let room = match pcr {
        Some(_) => TS_PAYLOAD_SIZE - 1 - PCR_FIELD_LEN,
        None => TS_PAYLOAD_SIZE,
    };
    let take = payload.len().min(room);
    // Adaptation field size including its length byte
    let adaptation = TS_PAYLOAD_SIZE - take;

    let control = if adaptation > 0 { 0x30 } else { 0x10 };
    let start = if unit_start { 0x4000 } else { 0 };
    buf.put_u8(SYNC_BYTE);
    buf.put_u16(start | (pid & 0x1FFF));
    buf.put_u8(control | (continuity_counter & 0x0F));

    if adaptation > 0 {
        let length = adaptation - 1;
        buf.put_u8(length as u8);
        if length > 0 {
            let mut used = 1;
            match pcr {
                Some(base) => {
                    buf.put_u8(RANDOM_ACCESS_PCR);
                    put_pcr(buf, base);
                    used += 6;
                }
                None => buf.put_u8(0x00),
            }
            buf.put_bytes(0xFF, length - used);
        }
    }

    buf.put_slice(&payload[..take]);
    take
}

/// 33-bit base, 6 reserved bits, 9-bit extension (always 0)
fn put_pcr(buf: &mut BytesMut, base: u64) {
    let base = base & 0x1_FFFF_FFFF;
    buf.put_u8((base >> 25) as u8);
    buf.put_u8((base >> 17) as u8);
    buf.put_u8((base >> 9) as u8);
    buf.put_u8((base >> 1) as u8);
    buf.put_u8((((base & 0x01) << 7) as u8) | 0x7E);
    buf.put_u8(0x00);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpegts::TS_PACKET_SIZE;

    #[test]
    fn test_full_payload_packet() {
        let mut buf = BytesMut::new();
        let payload = vec![0xAB; 300];
        let used = write_packet(&mut buf, 0x100, true, 5, None, &payload);

        assert_eq!(used, 184);
        assert_eq!(buf.len(), TS_PACKET_SIZE);
        assert_eq!(&buf[..4], &[0x47, 0x41, 0x00, 0x15]);
    }

    #[test]
    fn test_stuffed_packet() {
        let mut buf = BytesMut::new();
        let used = write_packet(&mut buf, 0x101, false, 15, None, &[0xAB; 100]);

        assert_eq!(used, 100);
        assert_eq!(buf.len(), TS_PACKET_SIZE);
        assert_eq!(&buf[..4], &[0x47, 0x01, 0x01, 0x3F]);
        assert_eq!(buf[4], 83);
        assert_eq!(buf[5], 0x00);
        assert!(buf[6..88].iter().all(|&b| b == 0xFF));
        assert_eq!(buf[88], 0xAB);
    }

    #[test]
    fn test_single_byte_adaptation() {
        let mut buf = BytesMut::new();
        let used = write_packet(&mut buf, 0x100, false, 0, None, &[0xAB; 183]);

        assert_eq!(used, 183);
        assert_eq!(buf.len(), TS_PACKET_SIZE);
        assert_eq!(buf[3] & 0x30, 0x30);
        assert_eq!(buf[4], 0);
        assert_eq!(buf[5], 0xAB);
    }

    #[test]
    fn test_pcr_packet() {
        let mut buf = BytesMut::new();
        let used = write_packet(&mut buf, 0x100, true, 0, Some(90_000), &[0xAB; 500]);

        assert_eq!(used, 176);
        assert_eq!(buf.len(), TS_PACKET_SIZE);
        assert_eq!(buf[4], 7);
        assert_eq!(buf[5], 0x50);
        let base = ((buf[6] as u64) << 25)
            | ((buf[7] as u64) << 17)
            | ((buf[8] as u64) << 9)
            | ((buf[9] as u64) << 1)
            | ((buf[10] as u64) >> 7);
        assert_eq!(base, 90_000);
        assert_eq!(buf[10] & 0x7E, 0x7E);
        assert_eq!(buf[12], 0xAB);
    }

    #[test]
    fn test_pcr_packet_with_stuffing() {
        let mut buf = BytesMut::new();
        let used = write_packet(&mut buf, 0x100, true, 0, Some(0), &[0xAB; 50]);

        assert_eq!(used, 50);
        assert_eq!(buf.len(), TS_PACKET_SIZE);
        assert_eq!(buf[4] as usize, 183 - 50);
        assert_eq!(buf[5], 0x50);
        assert!(buf[12..138].iter().all(|&b| b == 0xFF));
        assert_eq!(buf[138], 0xAB);
    }
}
