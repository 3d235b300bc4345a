//! Bit-plane interleaving of the eight P..W subchannels and the Q
//! checksum. A sector carries 96 interleaved bytes; deinterleaved form
//! is eight consecutive 12-byte channel blocks (P first).

use crate::cd::SUBCODE_SIZE;
use byteorder::{BigEndian, ByteOrder};
use crc::{CRC_16_XMODEM, Crc};

const Q_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// 8x12-byte channel blocks -> 96 interleaved bytes. Channel P lands in
/// bit 7 of every output byte, W in bit 0.
pub fn interleave(channels: &[u8; SUBCODE_SIZE], out: &mut [u8; SUBCODE_SIZE]) {
    for (i, out_byte) in out.iter_mut().enumerate() {
        let mut d = 0u8;
        for ch in 0..8 {
            d |= ((channels[ch * 12 + (i >> 3)] >> (7 - (i & 7))) & 1) << (7 - ch);
        }
        *out_byte = d;
    }
}

/// Exact inverse of [`interleave`]; input and output must be distinct
/// buffers, which the signature already guarantees.
pub fn deinterleave(interleaved: &[u8; SUBCODE_SIZE], channels: &mut [u8; SUBCODE_SIZE]) {
    channels.fill(0);
    for (i, &in_byte) in interleaved.iter().enumerate() {
        for ch in 0..8 {
            channels[ch * 12 + (i >> 3)] |= ((in_byte >> (7 - ch)) & 1) << (7 - (i & 7));
        }
    }
}

/// Extract only channel Q (bit 6 of each interleaved byte) into a
/// 12-byte buffer, zeroing it first.
pub fn deinterleave_q(interleaved: &[u8; SUBCODE_SIZE], qbuf: &mut [u8; 12]) {
    qbuf.fill(0);
    for (i, &in_byte) in interleaved.iter().enumerate() {
        qbuf[i >> 3] |= ((in_byte >> 6) & 1) << (7 - (i & 7));
    }
}

/// Write the Q checksum over bytes 0..10 into bytes 10..12: inverted
/// CRC-16/CCITT, big-endian.
pub fn q_generate_checksum(qbuf: &mut [u8; 12]) {
    let crc = !Q_CRC.checksum(&qbuf[..10]);
    BigEndian::write_u16(&mut qbuf[10..12], crc);
}

pub fn q_check_checksum(qbuf: &[u8; 12]) -> bool {
    BigEndian::read_u16(&qbuf[10..12]) == !Q_CRC.checksum(&qbuf[..10])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(seed: u8) -> [u8; SUBCODE_SIZE] {
        let mut buf = [0u8; SUBCODE_SIZE];
        let mut state = seed;
        for b in buf.iter_mut() {
            state = state.wrapping_mul(31).wrapping_add(7);
            *b = state;
        }
        buf
    }

    #[test]
    fn interleave_then_deinterleave_is_identity() {
        for seed in [0u8, 1, 0x55, 0xaa, 0xff] {
            let channels = pattern(seed);
            let mut pw = [0u8; SUBCODE_SIZE];
            let mut back = [0u8; SUBCODE_SIZE];
            interleave(&channels, &mut pw);
            deinterleave(&pw, &mut back);
            assert_eq!(channels, back);
        }
    }

    #[test]
    fn deinterleave_then_interleave_is_identity() {
        for seed in [3u8, 0x42, 0x80, 0xfe] {
            let pw = pattern(seed);
            let mut channels = [0u8; SUBCODE_SIZE];
            let mut back = [0u8; SUBCODE_SIZE];
            deinterleave(&pw, &mut channels);
            interleave(&channels, &mut back);
            assert_eq!(pw, back);
        }
    }

    #[test]
    fn q_extraction_matches_full_deinterleave() {
        let pw = pattern(0x17);
        let mut channels = [0u8; SUBCODE_SIZE];
        deinterleave(&pw, &mut channels);

        let mut qbuf = [0u8; 12];
        deinterleave_q(&pw, &mut qbuf);
        assert_eq!(&channels[12..24], &qbuf);
    }

    #[test]
    fn checksum_round_trips_for_any_prefix() {
        for seed in 0..32u8 {
            let mut qbuf = [0u8; 12];
            qbuf[..10].copy_from_slice(&pattern(seed)[..10]);
            q_generate_checksum(&mut qbuf);
            assert!(q_check_checksum(&qbuf));

            qbuf[4] ^= 0x10;
            assert!(!q_check_checksum(&qbuf));
        }
    }

    #[test]
    fn checksum_matches_known_lead_out_frame() {
        // Lead-out Q captured from a PlayStation disc rip.
        let qbuf = [
            0x41, 0xaa, 0x01, 0x03, 0x59, 0x25, 0x00, 0x51, 0x24, 0x06, 0x5a, 0xa8,
        ];
        assert!(q_check_checksum(&qbuf));
    }
}
