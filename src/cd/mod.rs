pub mod ecc;
pub mod sector;
pub mod subchannel;
pub mod synth;
pub mod toc;

/// Raw sector payload, sync through ECC.
pub const SECTOR_SIZE: usize = 2352;
/// Interleaved P..W subchannel block per sector.
pub const SUBCODE_SIZE: usize = 96;
/// One disc frame as handed to the caller: sector plus subchannel.
pub const FRAME_SIZE: usize = SECTOR_SIZE + SUBCODE_SIZE;

/// Stereo 16-bit sample pairs per audio sector (2352 / 4).
pub const AUDIO_FRAMES_PER_SECTOR: usize = 588;

/// Offset between logical block addresses and absolute (on-disc
/// timecode) block addresses: LBA 0 is ABA 150 (00:02:00).
pub const LBA_LEADIN_OFFSET: i32 = 150;

pub fn bcd_is_valid(value: u8) -> bool {
    (value & 0x0f) <= 0x09 && (value >> 4) <= 0x09
}

pub fn u8_to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Inverse of [`u8_to_bcd`] over [0, 99]. Out-of-range nibbles are
/// folded through the same arithmetic rather than rejected; callers
/// that care use [`bcd_is_valid`] first.
pub fn bcd_to_u8(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0f)
}

pub fn amsf_to_aba(m: u8, s: u8, f: u8) -> i32 {
    (m as i32 * 60 + s as i32) * 75 + f as i32
}

pub fn aba_to_amsf(aba: i32) -> (u8, u8, u8) {
    let aba = aba.rem_euclid(100 * 60 * 75);
    (
        (aba / 75 / 60) as u8,
        ((aba / 75) % 60) as u8,
        (aba % 75) as u8,
    )
}

pub fn aba_to_lba(aba: i32) -> i32 {
    aba - LBA_LEADIN_OFFSET
}

pub fn lba_to_aba(lba: i32) -> i32 {
    lba + LBA_LEADIN_OFFSET
}

pub fn amsf_to_lba(m: u8, s: u8, f: u8) -> i32 {
    aba_to_lba(amsf_to_aba(m, s, f))
}

pub fn lba_to_amsf(lba: i32) -> (u8, u8, u8) {
    aba_to_amsf(lba_to_aba(lba))
}
