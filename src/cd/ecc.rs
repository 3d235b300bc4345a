//! Reed-Solomon L-EC parity over GF(2^8) for Mode 1 / Mode 2 Form 1
//! sectors. The P plane is 43 columns of (26,24) codewords, the Q plane
//! 26 diagonals of (45,43) codewords, each split into an LSB and an MSB
//! byte plane; parity checks against H = [1 1 .. 1; a^(n-1) .. a 1].

use lazy_static::lazy_static;

const GF8_PRIM_POLY: u16 = 0x11d;

/// Byte range covered as data by both planes (header + user data + EDC
/// + reserved for Mode 1; subheader variants zero the header instead).
const LEC_DATA_OFFSET: usize = 12;
const P_PARITY_OFFSET: usize = 2076;
const Q_PARITY_OFFSET: usize = 2248;

const P_CODEWORD_LEN: usize = 26;
const Q_CODEWORD_LEN: usize = 45;

struct GfTables {
    log: [u8; 256],
    ilog: [u8; 256],
}

lazy_static! {
    static ref GF8: GfTables = {
        let mut log = [0u8; 256];
        let mut ilog = [0u8; 256];
        let mut b: u16 = 1;
        for exp in 0..255u8 {
            log[b as usize] = exp;
            ilog[exp as usize] = b as u8;
            b <<= 1;
            if b & 0x100 != 0 {
                b ^= GF8_PRIM_POLY;
            }
        }
        GfTables { log, ilog }
    };
}

fn gf_mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let sum = GF8.log[a as usize] as u16 + GF8.log[b as usize] as u16;
    GF8.ilog[(sum % 255) as usize]
}

fn gf_div(a: u8, b: u8) -> u8 {
    debug_assert!(b != 0);
    if a == 0 {
        return 0;
    }
    let diff = GF8.log[a as usize] as i16 - GF8.log[b as usize] as i16;
    GF8.ilog[diff.rem_euclid(255) as usize]
}

fn gf_pow_alpha(exp: usize) -> u8 {
    GF8.ilog[exp % 255]
}

/// Byte offset of symbol `k` of P codeword (`col`, `plane`). Rows run
/// top to bottom through the data region and straight into the parity
/// rows at 2076.
fn p_offset(col: usize, k: usize, plane: usize) -> usize {
    LEC_DATA_OFFSET + plane + 2 * (col + 43 * k)
}

/// Byte offset of symbol `k` of Q codeword (`diag`, `plane`). Data
/// symbols walk the diagonal (mod 1118 words covers the P parity too);
/// the two parity symbols live in their own rows at 2248.
fn q_offset(diag: usize, k: usize, plane: usize) -> usize {
    if k < 43 {
        LEC_DATA_OFFSET + plane + 2 * ((43 * diag + 44 * k) % 1118)
    } else {
        Q_PARITY_OFFSET + 52 * (k - 43) + 2 * diag + plane
    }
}

fn encode_codeword(sector: &mut [u8], n: usize, pos: impl Fn(usize) -> usize) {
    let mut s0 = 0u8;
    let mut s1 = 0u8;
    for k in 0..n - 2 {
        let c = sector[pos(k)];
        s0 ^= c;
        s1 ^= gf_mul(c, gf_pow_alpha(n - 1 - k));
    }
    // Solve c[n-2]*a ^ c[n-1] = s1, c[n-2] ^ c[n-1] = s0.
    let c_hi = gf_div(s0 ^ s1, 0x03);
    sector[pos(n - 2)] = c_hi;
    sector[pos(n - 1)] = s0 ^ c_hi;
}

/// Single-error correction of one codeword. Returns true if a byte was
/// repaired. Corrections that would land in the 4-byte sector header
/// are suppressed; the header is not repairable.
fn correct_codeword(sector: &mut [u8], n: usize, pos: impl Fn(usize) -> usize) -> bool {
    let mut s0 = 0u8;
    let mut s1 = 0u8;
    for k in 0..n {
        let c = sector[pos(k)];
        s0 ^= c;
        s1 ^= gf_mul(c, gf_pow_alpha(n - 1 - k));
    }
    if s0 == 0 || s1 == 0 {
        return false;
    }
    let loc = (GF8.log[s1 as usize] as i16 - GF8.log[s0 as usize] as i16).rem_euclid(255) as usize;
    if loc >= n {
        return false;
    }
    let offset = pos(n - 1 - loc);
    if (LEC_DATA_OFFSET..LEC_DATA_OFFSET + 4).contains(&offset) {
        return false;
    }
    sector[offset] ^= s0;
    true
}

fn each_codeword(sector: &mut [u8], mut f: impl FnMut(&mut [u8], usize, &dyn Fn(usize) -> usize)) {
    for diag in 0..26 {
        for plane in 0..2 {
            f(sector, Q_CODEWORD_LEN, &|k| q_offset(diag, k, plane));
        }
    }
    for col in 0..43 {
        for plane in 0..2 {
            f(sector, P_CODEWORD_LEN, &|k| p_offset(col, k, plane));
        }
    }
}

/// Fill in the 276 parity bytes. For XA sectors the header is excluded
/// from the computation (treated as zero), per the Form 1 layout.
pub(crate) fn encode_parity(sector: &mut [u8], xa: bool) {
    let saved = mask_header(sector, xa);
    for col in 0..43 {
        for plane in 0..2 {
            encode_codeword(sector, P_CODEWORD_LEN, |k| p_offset(col, k, plane));
        }
    }
    // Q parity covers the P parity bytes, so it goes second.
    for diag in 0..26 {
        for plane in 0..2 {
            encode_codeword(sector, Q_CODEWORD_LEN, |k| q_offset(diag, k, plane));
        }
    }
    restore_header(sector, xa, saved);
}

/// Best-effort erasureless correction: alternate Q and P passes until a
/// pass stops repairing anything. Errors in the header itself are never
/// repaired.
pub(crate) fn correct(sector: &mut [u8], xa: bool) {
    let saved = mask_header(sector, xa);
    for _ in 0..2 {
        let mut changed = false;
        each_codeword(sector, |sector, n, pos| {
            changed |= correct_codeword(sector, n, pos);
        });
        if !changed {
            break;
        }
    }
    restore_header(sector, xa, saved);
}

fn mask_header(sector: &mut [u8], xa: bool) -> [u8; 4] {
    let mut saved = [0u8; 4];
    if xa {
        saved.copy_from_slice(&sector[12..16]);
        sector[12..16].fill(0);
    }
    saved
}

fn restore_header(sector: &mut [u8], xa: bool, saved: [u8; 4]) {
    if xa {
        sector[12..16].copy_from_slice(&saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cd::SECTOR_SIZE;

    fn filled_sector() -> Vec<u8> {
        let mut sector = vec![0u8; SECTOR_SIZE];
        for (i, b) in sector.iter_mut().enumerate().take(2076).skip(16) {
            *b = (i * 7 + 3) as u8;
        }
        sector[12..16].copy_from_slice(&[0x00, 0x02, 0x00, 0x01]);
        sector
    }

    fn syndromes_clean(sector: &[u8]) -> bool {
        let mut clean = true;
        let mut copy = sector.to_vec();
        each_codeword(&mut copy, |sector, n, pos| {
            let mut s0 = 0u8;
            let mut s1 = 0u8;
            for k in 0..n {
                let c = sector[pos(k)];
                s0 ^= c;
                s1 ^= gf_mul(c, gf_pow_alpha(n - 1 - k));
            }
            clean &= s0 == 0 && s1 == 0;
        });
        clean
    }

    #[test]
    fn parity_zeroes_all_syndromes() {
        let mut sector = filled_sector();
        encode_parity(&mut sector, false);
        assert!(syndromes_clean(&sector));
    }

    #[test]
    fn single_byte_error_is_repaired() {
        let mut sector = filled_sector();
        encode_parity(&mut sector, false);
        let pristine = sector.clone();

        for offset in [40usize, 1033, 2070, 2100, 2300] {
            let mut broken = pristine.clone();
            broken[offset] ^= 0x5a;
            correct(&mut broken, false);
            assert_eq!(broken, pristine, "offset {offset} not repaired");
        }
    }

    #[test]
    fn spread_errors_are_repaired_across_passes() {
        let mut sector = filled_sector();
        encode_parity(&mut sector, false);
        let pristine = sector.clone();

        // Distinct columns and diagonals, so each pass sees single
        // errors per codeword.
        sector[100] ^= 0x01;
        sector[703] ^= 0x80;
        sector[1600] ^= 0x3c;
        correct(&mut sector, false);
        assert_eq!(sector, pristine);
    }

    #[test]
    fn header_errors_are_left_alone() {
        let mut sector = filled_sector();
        encode_parity(&mut sector, false);
        sector[13] ^= 0xff;
        let broken = sector.clone();
        correct(&mut sector, false);
        assert_eq!(sector[13], broken[13]);
    }

    #[test]
    fn xa_parity_ignores_header_bytes() {
        let mut a = filled_sector();
        let mut b = filled_sector();
        b[12..16].copy_from_slice(&[0x99, 0x99, 0x99, 0x02]);
        encode_parity(&mut a, true);
        encode_parity(&mut b, true);
        assert_eq!(&a[2076..], &b[2076..]);
    }
}
