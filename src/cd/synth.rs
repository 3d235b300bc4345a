//! Synthesis of frames the image file does not cover: the pre-gap
//! before the first track and the lead-out after the last. Q comes from
//! the TOC, P is held in pause, and data payloads are regenerated.

use crate::cd::sector::{encode_mode1_sector, encode_mode2_form2_sector};
use crate::cd::subchannel::q_generate_checksum;
use crate::cd::toc::{CTRL_DATA, CTRL_DCP, DiscType, Toc};
use crate::cd::{FRAME_SIZE, SECTOR_SIZE, SUBCODE_SIZE, lba_to_aba, u8_to_bcd};

fn write_relative_msf(qbuf: &mut [u8; 12], mut lba_tmp: i32) {
    if lba_tmp < 0 {
        lba_tmp = -lba_tmp - 1;
    }
    qbuf[3] = u8_to_bcd((lba_tmp / 75 / 60) as u8);
    qbuf[4] = u8_to_bcd(((lba_tmp / 75) % 60) as u8);
    qbuf[5] = u8_to_bcd((lba_tmp % 75) as u8);
}

fn write_absolute_msf(qbuf: &mut [u8; 12], lba: i32) {
    let (m, s, f) = crate::cd::lba_to_amsf(lba);
    qbuf[7] = u8_to_bcd(m);
    qbuf[8] = u8_to_bcd(s);
    qbuf[9] = u8_to_bcd(f);
}

/// Spread a finished Q block over the interleaved P..W bytes, with the
/// P channel asserted (both synthesized regions are pause areas).
fn q_to_paused_subpw(qbuf: &[u8; 12], subpw: &mut [u8]) {
    for (i, out) in subpw.iter_mut().enumerate().take(SUBCODE_SIZE) {
        let qbit = (qbuf[i >> 3] >> (7 - (i & 7))) & 1;
        *out = if qbit != 0 { 0xc0 } else { 0x80 };
    }
}

/// Subchannel for a sector before the program area. The track-relative
/// MSF is taken from `lba + relative_offs`, counting down toward the
/// first track's start.
pub fn synth_udapp_subpw(toc: &Toc, lba: i32, relative_offs: i32, subpw: &mut [u8]) {
    let mut qbuf = [0u8; 12];
    qbuf[0] = (toc.tracks[toc.first_track as usize].control << 4) | 0x01;
    qbuf[1] = u8_to_bcd(toc.first_track);
    qbuf[2] = 0x00;
    write_relative_msf(&mut qbuf, lba + relative_offs);
    write_absolute_msf(&mut qbuf, lba);
    q_generate_checksum(&mut qbuf);
    q_to_paused_subpw(&qbuf, subpw);
}

/// Subchannel for a lead-out sector. Track number is the 0xAA marker;
/// the control field inherits the last track's copy-permission bit.
pub fn synth_leadout_subpw(toc: &Toc, lba: i32, subpw: &mut [u8]) {
    let control =
        toc.tracks[100].control | (toc.tracks[toc.last_track as usize].control & CTRL_DCP);

    let mut qbuf = [0u8; 12];
    qbuf[0] = (control << 4) | 0x01;
    qbuf[1] = 0xaa;
    qbuf[2] = 0x01;
    write_relative_msf(&mut qbuf, lba - toc.tracks[100].lba);
    write_absolute_msf(&mut qbuf, lba);
    q_generate_checksum(&mut qbuf);
    q_to_paused_subpw(&qbuf, subpw);
}

/// Regenerate a data payload for a synthesized sector: Mode 2 Form 2
/// with the form bit in the subheader on XA and CD-i discs, Mode 1
/// otherwise. Audio regions stay silent.
pub fn synth_data_payload(disc_type: DiscType, lba: i32, sector: &mut [u8]) {
    if disc_type.is_xa() {
        sector[12 + 6] = 0x20;
        sector[12 + 10] = 0x20;
        encode_mode2_form2_sector(lba_to_aba(lba), sector);
    } else {
        encode_mode1_sector(lba_to_aba(lba), sector);
    }
}

pub fn synth_udapp_frame(toc: &Toc, lba: i32, relative_offs: i32, frame: &mut [u8; FRAME_SIZE]) {
    frame.fill(0);
    let (sector, subpw) = frame.split_at_mut(SECTOR_SIZE);
    synth_udapp_subpw(toc, lba, relative_offs, subpw);
    if toc.tracks[toc.first_track as usize].control & CTRL_DATA != 0 {
        synth_data_payload(toc.disc_type, lba, sector);
    }
}

pub fn synth_leadout_frame(toc: &Toc, lba: i32, frame: &mut [u8; FRAME_SIZE]) {
    frame.fill(0);
    let (sector, subpw) = frame.split_at_mut(SECTOR_SIZE);
    synth_leadout_subpw(toc, lba, subpw);
    if toc.tracks[100].control & CTRL_DATA != 0 {
        synth_data_payload(toc.disc_type, lba, sector);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cd::sector::edc_check;
    use crate::cd::subchannel::{deinterleave_q, q_check_checksum};
    use crate::cd::toc::{ADR_CURPOS, CTRL_PRE, TocTrack};

    fn data_disc_toc() -> Toc {
        let mut toc = Toc::default();
        toc.first_track = 1;
        toc.last_track = 1;
        toc.tracks[1] = TocTrack {
            adr: ADR_CURPOS,
            control: CTRL_DATA,
            lba: 0,
            valid: true,
        };
        toc.tracks[100] = TocTrack {
            adr: ADR_CURPOS,
            control: CTRL_DATA,
            lba: 1000,
            valid: true,
        };
        toc
    }

    fn q_of(frame: &[u8; FRAME_SIZE]) -> [u8; 12] {
        let mut pw = [0u8; SUBCODE_SIZE];
        pw.copy_from_slice(&frame[SECTOR_SIZE..]);
        let mut qbuf = [0u8; 12];
        deinterleave_q(&pw, &mut qbuf);
        qbuf
    }

    #[test]
    fn pregap_frame_counts_down_to_track_start() {
        let toc = data_disc_toc();
        let mut frame = [0u8; FRAME_SIZE];
        synth_udapp_frame(&toc, -3, -150, &mut frame);

        let qbuf = q_of(&frame);
        assert!(q_check_checksum(&qbuf));
        assert_eq!(qbuf[0], (CTRL_DATA << 4) | 0x01);
        assert_eq!(qbuf[1], 0x01);
        assert_eq!(qbuf[2], 0x00);
        // lba -3 with offset -150: |-153| - 1 = 152 = 0:2:2.
        assert_eq!(&qbuf[3..6], &[0x00, 0x02, 0x02]);
        // Absolute 147 = 0:1:72.
        assert_eq!(&qbuf[7..10], &[0x00, 0x01, 0x72]);
        // Pause asserted on every interleaved byte.
        assert!(frame[SECTOR_SIZE..].iter().all(|b| b & 0x80 != 0));
        // Data control bit on: payload is a valid Mode 1 sector.
        assert!(edc_check(&frame[..SECTOR_SIZE], false));
        assert_eq!(frame[15], 0x01);
    }

    #[test]
    fn leadout_frame_uses_the_aa_marker() {
        let toc = data_disc_toc();
        let mut frame = [0u8; FRAME_SIZE];
        synth_leadout_frame(&toc, 1002, &mut frame);

        let qbuf = q_of(&frame);
        assert!(q_check_checksum(&qbuf));
        assert_eq!(qbuf[1], 0xaa);
        assert_eq!(qbuf[2], 0x01);
        // Two sectors into the lead-out.
        assert_eq!(&qbuf[3..6], &[0x00, 0x00, 0x02]);
        assert!(edc_check(&frame[..SECTOR_SIZE], false));
    }

    #[test]
    fn leadout_control_inherits_copy_permission_only() {
        let mut toc = data_disc_toc();
        toc.tracks[1].control = CTRL_DCP | CTRL_PRE;
        toc.last_track = 1;
        toc.tracks[100].control = 0;

        let mut frame = [0u8; FRAME_SIZE];
        synth_leadout_frame(&toc, 1000, &mut frame);
        let qbuf = q_of(&frame);
        assert_eq!(qbuf[0] >> 4, CTRL_DCP);
    }

    #[test]
    fn audio_disc_synthesis_stays_silent() {
        let mut toc = data_disc_toc();
        toc.tracks[1].control = 0;
        toc.tracks[100].control = 0;

        let mut frame = [0xffu8; FRAME_SIZE];
        synth_udapp_frame(&toc, -150, -150, &mut frame);
        assert!(frame[..SECTOR_SIZE].iter().all(|&b| b == 0));
    }

    #[test]
    fn xa_disc_synthesis_emits_form2_sectors() {
        let mut toc = data_disc_toc();
        toc.disc_type = DiscType::CdXa;

        let mut frame = [0u8; FRAME_SIZE];
        synth_leadout_frame(&toc, 1000, &mut frame);
        assert_eq!(frame[15], 0x02);
        assert_eq!(frame[12 + 6], 0x20);
        assert_eq!(frame[12 + 10], 0x20);
    }
}
