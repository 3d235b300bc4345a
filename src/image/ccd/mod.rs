//! CloneCD backend: a `.ccd` control sheet holding raw TOC entries,
//! a `.img` with full 2352-byte sectors and a `.sub` with deinterleaved
//! subchannel blocks. Everything is loaded into memory at open.

use std::collections::HashMap;
use std::path::Path;

use log::debug;

use crate::cd::subchannel::interleave;
use crate::cd::synth::{synth_leadout_frame, synth_leadout_subpw, synth_udapp_frame, synth_udapp_subpw};
use crate::cd::toc::{DiscType, Toc, TocTrack};
use crate::cd::{FRAME_SIZE, SECTOR_SIZE, SUBCODE_SIZE, amsf_to_lba};
use crate::image::DiscImage;
use crate::image::error::{ImageError, ImageResult};

pub struct CcdImage {
    toc: Toc,
    total_sectors: i32,
    img: Vec<u8>,
    sub: Vec<u8>,
}

#[derive(Default, Clone, Copy)]
struct CcdEntry {
    point: i32,
    adr: u8,
    control: u8,
    pmin: u8,
    psec: u8,
    pframe: u8,
}

/// CloneCD integers come both decimal and `0x`-prefixed.
fn parse_int(text: &str) -> ImageResult<i64> {
    let text = text.trim();
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|_| ImageError::Parse(format!("malformed CCD integer {text:?}")))
}

type IniSections = HashMap<String, HashMap<String, String>>;

fn parse_ini(text: &str) -> IniSections {
    let mut sections = IniSections::new();
    let mut current = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            current = line[1..line.len() - 1].trim().to_ascii_lowercase();
            sections.entry(current.clone()).or_default();
        } else if let Some((key, value)) = line.split_once('=') {
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    sections
}

fn section_int(sections: &IniSections, section: &str, key: &str) -> ImageResult<Option<i64>> {
    match sections.get(section).and_then(|s| s.get(key)) {
        Some(value) => Ok(Some(parse_int(value)?)),
        None => Ok(None),
    }
}

impl CcdImage {
    pub fn open(path: &Path) -> ImageResult<Self> {
        let text = String::from_utf8_lossy(&std::fs::read(path)?).into_owned();
        let sections = parse_ini(&text);

        if section_int(&sections, "disc", "datatracksscrambled")?.unwrap_or(0) != 0 {
            return Err(ImageError::Unsupported(
                "scrambled CloneCD data tracks".into(),
            ));
        }

        let toc_entries = section_int(&sections, "disc", "tocentries")?
            .ok_or_else(|| ImageError::Parse("CCD sheet lacks a TocEntries count".into()))?;

        let mut toc = Toc::default();
        let mut disc_type_byte = None;

        for n in 0..toc_entries {
            let section = format!("entry {n}");
            let entries = sections
                .get(&section)
                .ok_or_else(|| ImageError::Parse(format!("missing CCD [Entry {n}] section")))?;

            let mut entry = CcdEntry::default();
            for (key, value) in entries {
                let value = parse_int(value)?;
                match key.as_str() {
                    "point" => entry.point = value as i32,
                    "adr" => entry.adr = value as u8,
                    "control" => entry.control = value as u8,
                    "pmin" => entry.pmin = value as u8,
                    "psec" => entry.psec = value as u8,
                    "pframe" => entry.pframe = value as u8,
                    _ => {}
                }
            }

            match entry.point {
                0xa0 => {
                    toc.first_track = entry.pmin;
                    disc_type_byte = Some(entry.psec);
                }
                0xa1 => toc.last_track = entry.pmin,
                0xa2 => {
                    toc.tracks[100] = TocTrack {
                        adr: entry.adr,
                        control: entry.control,
                        lba: amsf_to_lba(entry.pmin, entry.psec, entry.pframe),
                        valid: true,
                    };
                }
                point @ 1..=99 => {
                    toc.tracks[point as usize] = TocTrack {
                        adr: entry.adr,
                        control: entry.control,
                        lba: amsf_to_lba(entry.pmin, entry.psec, entry.pframe),
                        valid: true,
                    };
                }
                _ => {}
            }
        }

        if toc.first_track < 1 || toc.last_track > 99 || toc.first_track > toc.last_track {
            return Err(ImageError::Parse(format!(
                "nonsensical CCD track range {}..={}",
                toc.first_track, toc.last_track
            )));
        }
        if !toc.tracks[100].valid {
            return Err(ImageError::Parse("CCD sheet lacks a lead-out entry".into()));
        }

        toc.disc_type = disc_type_byte
            .and_then(DiscType::from_point_a0)
            .unwrap_or_default();

        let img = std::fs::read(path.with_extension("img"))?;
        let sub = std::fs::read(path.with_extension("sub"))?;

        if img.len() % SECTOR_SIZE != 0 {
            return Err(ImageError::Layout(format!(
                "CloneCD image size {} is not a whole number of 2352-byte sectors",
                img.len()
            )));
        }
        let total_sectors = (img.len() / SECTOR_SIZE) as i32;
        if sub.len() < total_sectors as usize * SUBCODE_SIZE {
            return Err(ImageError::Layout(
                "CloneCD subchannel file is shorter than the image".into(),
            ));
        }

        debug!(
            "opened {}: tracks {}..={}, {} sectors",
            path.display(),
            toc.first_track,
            toc.last_track,
            total_sectors
        );

        Ok(CcdImage {
            toc,
            total_sectors,
            img,
            sub,
        })
    }

    fn stored_sub(&self, lba: i32) -> [u8; SUBCODE_SIZE] {
        let mut channels = [0u8; SUBCODE_SIZE];
        let at = lba as usize * SUBCODE_SIZE;
        channels.copy_from_slice(&self.sub[at..at + SUBCODE_SIZE]);
        channels
    }
}

impl DiscImage for CcdImage {
    fn read_raw_sector(&mut self, lba: i32, frame: &mut [u8; FRAME_SIZE]) -> ImageResult<()> {
        if lba < 0 {
            synth_udapp_frame(&self.toc, lba, 0, frame);
            return Ok(());
        }
        if lba >= self.total_sectors {
            synth_leadout_frame(&self.toc, lba, frame);
            return Ok(());
        }

        let at = lba as usize * SECTOR_SIZE;
        frame[..SECTOR_SIZE].copy_from_slice(&self.img[at..at + SECTOR_SIZE]);

        let channels = self.stored_sub(lba);
        let mut interleaved = [0u8; SUBCODE_SIZE];
        interleave(&channels, &mut interleaved);
        frame[SECTOR_SIZE..].copy_from_slice(&interleaved);
        Ok(())
    }

    fn fast_read_subchannel(&self, lba: i32, subpw: &mut [u8; SUBCODE_SIZE]) -> bool {
        if lba < 0 {
            synth_udapp_subpw(&self.toc, lba, 0, subpw);
        } else if lba >= self.total_sectors {
            synth_leadout_subpw(&self.toc, lba, subpw);
        } else {
            interleave(&self.stored_sub(lba), subpw);
        }
        true
    }

    fn toc(&self) -> &Toc {
        &self.toc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cd::subchannel::{deinterleave, deinterleave_q, q_check_checksum, q_generate_checksum};
    use crate::cd::toc::CTRL_DATA;

    fn write_set(dir: &Path, scrambled: bool) {
        let ccd = format!(
            concat!(
                "[CloneCD]\n",
                "Version=3\n",
                "[Disc]\n",
                "TocEntries=4\n",
                "Sessions=1\n",
                "DataTracksScrambled={}\n",
                "[Entry 0]\n",
                "Point=0xa0\nADR=0x01\nControl=0x04\nPMin=1\nPSec=0x20\nPFrame=0\n",
                "[Entry 1]\n",
                "Point=0xa1\nADR=0x01\nControl=0x04\nPMin=1\nPSec=0\nPFrame=0\n",
                "[Entry 2]\n",
                "Point=0xa2\nADR=0x01\nControl=0x04\nPMin=0\nPSec=2\nPFrame=3\n",
                "[Entry 3]\n",
                "Point=1\nADR=0x01\nControl=0x04\nPMin=0\nPSec=2\nPFrame=0\n",
            ),
            scrambled as u8
        );
        std::fs::write(dir.join("game.ccd"), ccd).unwrap();

        let mut img = Vec::new();
        let mut sub = Vec::new();
        for s in 0..3usize {
            img.extend_from_slice(&[0x40 + s as u8; SECTOR_SIZE]);
            let mut channels = [0u8; SUBCODE_SIZE];
            channels[..12].fill(0xff); // P held
            let q = &mut channels[12..24];
            q[0] = 0x41;
            q[1] = 0x01;
            q[2] = 0x01;
            q[9] = s as u8;
            let mut qa = [0u8; 12];
            qa.copy_from_slice(q);
            q_generate_checksum(&mut qa);
            channels[12..24].copy_from_slice(&qa);
            sub.extend_from_slice(&channels);
        }
        std::fs::write(dir.join("game.img"), img).unwrap();
        std::fs::write(dir.join("game.sub"), sub).unwrap();
    }

    #[test]
    fn stored_sectors_and_subchannel_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        write_set(dir.path(), false);
        let mut image = CcdImage::open(&dir.path().join("game.ccd")).unwrap();

        let toc = image.toc();
        assert_eq!(toc.first_track, 1);
        assert_eq!(toc.last_track, 1);
        assert_eq!(toc.disc_type, DiscType::CdXa);
        assert_eq!(toc.tracks[1].lba, 0);
        assert_eq!(toc.tracks[1].control, CTRL_DATA);
        assert_eq!(toc.leadout_lba(), 3);

        let mut frame = [0u8; FRAME_SIZE];
        image.read_raw_sector(1, &mut frame).unwrap();
        assert!(frame[..SECTOR_SIZE].iter().all(|&b| b == 0x41));

        let mut pw = [0u8; SUBCODE_SIZE];
        pw.copy_from_slice(&frame[SECTOR_SIZE..]);
        let mut channels = [0u8; SUBCODE_SIZE];
        deinterleave(&pw, &mut channels);
        assert_eq!(&channels[..12], &[0xff; 12]);
        assert_eq!(channels[12], 0x41);
        assert_eq!(channels[21], 1);

        let mut qbuf = [0u8; 12];
        deinterleave_q(&pw, &mut qbuf);
        assert!(q_check_checksum(&qbuf));
    }

    #[test]
    fn out_of_range_sectors_are_synthesized() {
        let dir = tempfile::tempdir().unwrap();
        write_set(dir.path(), false);
        let mut image = CcdImage::open(&dir.path().join("game.ccd")).unwrap();

        let mut frame = [0u8; FRAME_SIZE];
        image.read_raw_sector(-1, &mut frame).unwrap();
        let mut qbuf = [0u8; 12];
        let mut pw = [0u8; SUBCODE_SIZE];
        pw.copy_from_slice(&frame[SECTOR_SIZE..]);
        deinterleave_q(&pw, &mut qbuf);
        assert_eq!(qbuf[1], 0x01);
        assert_eq!(qbuf[2], 0x00);
        assert!(q_check_checksum(&qbuf));

        let mut subpw = [0u8; SUBCODE_SIZE];
        assert!(image.fast_read_subchannel(3, &mut subpw));
        deinterleave_q(&subpw, &mut qbuf);
        assert_eq!(qbuf[1], 0xaa);
    }

    #[test]
    fn partial_trailing_sector_in_the_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_set(dir.path(), false);

        let img_path = dir.path().join("game.img");
        let mut img = std::fs::read(&img_path).unwrap();
        img.extend_from_slice(&[0u8; 100]);
        std::fs::write(&img_path, img).unwrap();

        assert!(matches!(
            CcdImage::open(&dir.path().join("game.ccd")),
            Err(ImageError::Layout(_))
        ));
    }

    #[test]
    fn scrambled_data_tracks_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_set(dir.path(), true);
        assert!(matches!(
            CcdImage::open(&dir.path().join("game.ccd")),
            Err(ImageError::Unsupported(_))
        ));
    }
}
