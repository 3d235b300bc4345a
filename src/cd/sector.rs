//! Whole-sector encoding and validation: sync header, EDC checksums,
//! L-EC parity hookup and the ECMA-130 scrambler.

use crate::cd::{SECTOR_SIZE, aba_to_amsf, ecc, u8_to_bcd};
use byteorder::{ByteOrder, LittleEndian};
use crc::{CRC_32_CD_ROM_EDC, Crc};
use lazy_static::lazy_static;

const EDC: Crc<u32> = Crc::<u32>::new(&CRC_32_CD_ROM_EDC);

pub const SYNC_HEADER: [u8; 12] = [
    0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00,
];

lazy_static! {
    /// Scramble pattern for bytes 12..2352, from the x^15 + x + 1 LFSR
    /// seeded with 1, LSB of the register shifted out first.
    static ref SCRAMBLE_TABLE: [u8; 2340] = {
        let mut table = [0u8; 2340];
        let mut reg: u16 = 1;
        for byte in table.iter_mut() {
            let mut cv = 0u8;
            for bit in 0..8 {
                cv |= ((reg & 1) as u8) << bit;
                let feedback = ((reg >> 1) & 1) ^ (reg & 1);
                reg = (reg >> 1) | (feedback << 14);
            }
            *byte = cv;
        }
        table
    };
}

/// XOR the scramble pattern over bytes 12..2352. Self-inverse, so the
/// same call descrambles.
pub fn scramble(sector: &mut [u8]) {
    for (byte, &pat) in sector[12..SECTOR_SIZE].iter_mut().zip(SCRAMBLE_TABLE.iter()) {
        *byte ^= pat;
    }
}

fn encode_header(sector: &mut [u8], aba: i32, mode: u8) {
    sector[..12].copy_from_slice(&SYNC_HEADER);
    let (m, s, f) = aba_to_amsf(aba);
    sector[12] = u8_to_bcd(m);
    sector[13] = u8_to_bcd(s);
    sector[14] = u8_to_bcd(f);
    sector[15] = mode;
}

fn write_edc(sector: &mut [u8], covered: std::ops::Range<usize>, at: usize) {
    let edc = EDC.checksum(&sector[covered]);
    LittleEndian::write_u32(&mut sector[at..at + 4], edc);
}

/// Mode 1: header, EDC over 0..2064, zero intermediate field, parity.
/// User data at 16..2064 must already be in place.
pub fn encode_mode1_sector(aba: i32, sector: &mut [u8]) {
    encode_header(sector, aba, 0x01);
    write_edc(sector, 0..2064, 2064);
    sector[2068..2076].fill(0);
    ecc::encode_parity(sector, false);
}

/// Headerless Mode 2: sync and header only, the 2336 payload bytes are
/// opaque.
pub fn encode_mode2_sector(aba: i32, sector: &mut [u8]) {
    encode_header(sector, aba, 0x02);
}

/// Mode 2 Form 1: EDC over subheader + user data, parity computed with
/// the header masked. Subheader at 16..24 and data at 24..2072 must
/// already be in place.
pub fn encode_mode2_form1_sector(aba: i32, sector: &mut [u8]) {
    encode_header(sector, aba, 0x02);
    write_edc(sector, 16..2072, 2072);
    ecc::encode_parity(sector, true);
}

/// Mode 2 Form 2: EDC only, no parity. The EDC field is technically
/// optional on disc but we always fill it.
pub fn encode_mode2_form2_sector(aba: i32, sector: &mut [u8]) {
    encode_header(sector, aba, 0x02);
    write_edc(sector, 16..2348, 2348);
}

/// EDC verification; `xa` selects the Mode 2 Form 1 coverage, otherwise
/// Mode 1 coverage is assumed.
pub fn edc_check(sector: &[u8], xa: bool) -> bool {
    let (covered, at) = if xa { (16..2072, 2072) } else { (0..2064, 2064) };
    LittleEndian::read_u32(&sector[at..at + 4]) == EDC.checksum(&sector[covered])
}

/// Mode 2 Form 2 EDC verification. The field is optional on disc; an
/// all-zero field means it was never recorded and passes.
pub fn edc_check_form2(sector: &[u8]) -> bool {
    let stored = LittleEndian::read_u32(&sector[2348..2352]);
    stored == 0 || stored == EDC.checksum(&sector[16..2348])
}

/// EDC check with an L-EC repair attempt on failure. Returns the final
/// EDC verdict; the sector may have been modified either way it comes
/// out.
pub fn edc_lec_check_and_correct(sector: &mut [u8], xa: bool) -> bool {
    if edc_check(sector, xa) {
        return true;
    }
    ecc::correct(sector, xa);
    edc_check(sector, xa)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cd::lba_to_aba;

    fn data_sector(mode_payload: u8) -> Vec<u8> {
        let mut sector = vec![0u8; SECTOR_SIZE];
        for (i, b) in sector.iter_mut().enumerate().take(2064).skip(16) {
            *b = (i as u8).wrapping_mul(mode_payload);
        }
        sector
    }

    #[test]
    fn scramble_table_matches_published_prefix() {
        assert_eq!(
            &SCRAMBLE_TABLE[..8],
            &[0x01, 0x80, 0x00, 0x60, 0x00, 0x28, 0x00, 0x1e]
        );
    }

    #[test]
    fn scramble_is_self_inverse_and_leaves_sync_alone() {
        let mut sector = data_sector(3);
        encode_mode1_sector(lba_to_aba(0), &mut sector);
        let pristine = sector.clone();

        scramble(&mut sector);
        assert_eq!(&sector[..12], &pristine[..12]);
        assert_ne!(sector, pristine);
        scramble(&mut sector);
        assert_eq!(sector, pristine);
    }

    #[test]
    fn mode1_header_carries_bcd_timecode() {
        let mut sector = data_sector(1);
        encode_mode1_sector(lba_to_aba(0), &mut sector);
        assert_eq!(&sector[..12], &SYNC_HEADER);
        assert_eq!(&sector[12..16], &[0x00, 0x02, 0x00, 0x01]);
        assert!(edc_check(&sector, false));
        assert_eq!(&sector[2068..2076], &[0u8; 8]);
    }

    #[test]
    fn mode1_corruption_is_caught_and_corrected() {
        let mut sector = data_sector(5);
        encode_mode1_sector(lba_to_aba(1000), &mut sector);
        let pristine = sector.clone();

        sector[500] ^= 0x40;
        assert!(!edc_check(&sector, false));
        assert!(edc_lec_check_and_correct(&mut sector, false));
        assert_eq!(sector, pristine);
    }

    #[test]
    fn mode2_form1_round_trips() {
        let mut sector = data_sector(7);
        sector[16..24].copy_from_slice(&[0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x08, 0x00]);
        encode_mode2_form1_sector(lba_to_aba(16), &mut sector);
        assert_eq!(sector[15], 0x02);
        assert!(edc_check(&sector, true));

        sector[1200] ^= 0x08;
        assert!(edc_lec_check_and_correct(&mut sector, true));
    }

    #[test]
    fn mode2_form2_edc_covers_payload() {
        let mut sector = vec![0u8; SECTOR_SIZE];
        for (i, b) in sector.iter_mut().enumerate().take(2348).skip(16) {
            *b = (i >> 2) as u8;
        }
        encode_mode2_form2_sector(lba_to_aba(32), &mut sector);
        let edc = LittleEndian::read_u32(&sector[2348..2352]);
        assert_eq!(edc, EDC.checksum(&sector[16..2348]));
        assert!(edc_check_form2(&sector));

        sector[100] ^= 0x01;
        assert!(!edc_check_form2(&sector));
        sector[2348..2352].fill(0);
        assert!(edc_check_form2(&sector));
    }
}
