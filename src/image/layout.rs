//! Track layout shared by the sheet-driven backends: where each track
//! starts, how long its gaps are, and how to synthesize the P and Q
//! subchannels for any sector from that information.

use std::collections::BTreeMap;

use crate::cd::subchannel::q_generate_checksum;
use crate::cd::toc::{ADR_CURPOS, CTRL_DATA, DiscType, Toc, TocTrack};
use crate::cd::{SUBCODE_SIZE, lba_to_aba, lba_to_amsf, u8_to_bcd};
use crate::image::error::{ImageError, ImageResult};
use crate::image::format::DiFormat;

/// Q replacements keyed by ABA, ten payload bytes each. The checksum is
/// regenerated after substitution, so replaced frames still verify.
pub type SubQReplaceMap = BTreeMap<i32, [u8; 10]>;

#[derive(Clone, Debug)]
pub struct TrackLayout {
    pub lba: i32,
    pub sectors: i32,
    /// Sheet-declared pregap, not backed by file data.
    pub pregap: i32,
    /// Data-backed pregap (cue INDEX 00 to INDEX 01 distance).
    pub pregap_dv: i32,
    pub postgap: i32,
    pub control: u8,
    pub format: DiFormat,
    /// Absolute LBA of each index point; `i32::MAX` marks indexes that
    /// never become current (index 0 included, it is implied by
    /// position instead).
    pub index: [i32; 100],
}

impl Default for TrackLayout {
    fn default() -> Self {
        TrackLayout {
            lba: 0,
            sectors: 0,
            pregap: 0,
            pregap_dv: 0,
            postgap: 0,
            control: 0,
            format: DiFormat::default(),
            index: [i32::MAX; 100],
        }
    }
}

#[derive(Clone, Debug)]
pub struct DiscLayout {
    pub first_track: usize,
    pub last_track: usize,
    pub total_sectors: i32,
    pub disc_type: DiscType,
    /// Slots 1..=99 used, indexed by track number.
    pub tracks: Vec<TrackLayout>,
}

impl DiscLayout {
    pub fn new() -> Self {
        DiscLayout {
            first_track: 0,
            last_track: 0,
            total_sectors: 0,
            disc_type: DiscType::default(),
            tracks: vec![TrackLayout::default(); 100],
        }
    }

    /// Synthesize the interleaved subchannel block for `lba`, ORing
    /// into the caller's buffer. Returns the track number the sector
    /// belongs to.
    ///
    /// P is asserted through pre- and postgaps. Q carries position
    /// data under the track's control field, except in the early part
    /// of a data track's pregap following an audio track, which is
    /// encoded as audio so players treat the transition as such.
    pub fn make_sub_pq(
        &self,
        lba: i32,
        replace: &SubQReplaceMap,
        subpw: &mut [u8],
    ) -> ImageResult<usize> {
        debug_assert!(subpw.len() >= SUBCODE_SIZE);

        let mut found = None;
        for number in self.first_track..=self.last_track {
            let track = &self.tracks[number];
            if lba >= track.lba - track.pregap_dv - track.pregap
                && lba < track.lba + track.sectors + track.postgap
            {
                found = Some(number);
                break;
            }
        }
        let number = found.ok_or(ImageError::SectorRange(lba))?;
        let track = &self.tracks[number];

        let lba_relative = if lba < track.lba {
            track.lba - 1 - lba
        } else {
            lba - track.lba
        };

        let pause_or: u8 = if lba < track.lba || lba >= track.lba + track.sectors {
            0x80
        } else {
            0x00
        };

        let mut control = track.control;
        if lba - track.lba < -150
            && track.control & CTRL_DATA != 0
            && number > self.first_track
            && self.tracks[number - 1].control & CTRL_DATA == 0
        {
            control = self.tracks[number - 1].control;
        }

        let mut index = 0u8;
        for (i, &point) in track.index.iter().enumerate() {
            if lba >= point {
                index = i as u8;
            }
        }

        let mut qbuf = [0u8; 12];
        qbuf[0] = 0x01 | (control << 4);
        qbuf[1] = u8_to_bcd(number as u8);
        qbuf[2] = u8_to_bcd(index);
        qbuf[3] = u8_to_bcd((lba_relative / 75 / 60) as u8);
        qbuf[4] = u8_to_bcd(((lba_relative / 75) % 60) as u8);
        qbuf[5] = u8_to_bcd((lba_relative % 75) as u8);
        let (ma, sa, fa) = lba_to_amsf(lba);
        qbuf[7] = u8_to_bcd(ma);
        qbuf[8] = u8_to_bcd(sa);
        qbuf[9] = u8_to_bcd(fa);
        q_generate_checksum(&mut qbuf);

        if let Some(payload) = replace.get(&lba_to_aba(lba)) {
            qbuf[..10].copy_from_slice(payload);
            q_generate_checksum(&mut qbuf);
        }

        for (i, out) in subpw.iter_mut().enumerate().take(SUBCODE_SIZE) {
            let qbit = (qbuf[i >> 3] >> (7 - (i & 7))) & 1;
            *out |= if qbit != 0 { 0x40 } else { 0x00 } | pause_or;
        }

        Ok(number)
    }

    /// Derive the TOC. A leading CD-i raw track is hidden by bumping
    /// the reported first track past it.
    pub fn generate_toc(&self) -> Toc {
        let mut toc = Toc::default();
        toc.first_track = self.first_track as u8;
        toc.last_track = self.last_track as u8;
        toc.disc_type = self.disc_type;

        for number in self.first_track..=self.last_track {
            if self.tracks[number].format == DiFormat::CdiRaw {
                toc.first_track = 99.min(number as u8 + 1);
                toc.last_track = toc.last_track.max(toc.first_track);
            }

            toc.tracks[number] = TocTrack {
                adr: ADR_CURPOS,
                control: self.tracks[number].control,
                lba: self.tracks[number].lba,
                valid: true,
            };
        }

        toc.tracks[100] = TocTrack {
            adr: ADR_CURPOS,
            control: self.tracks[self.last_track].control,
            lba: self.total_sectors,
            valid: true,
        };
        toc
    }
}
