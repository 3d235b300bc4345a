//! MAME CHD backend. Track geometry comes from CHTR/CHT2 metadata
//! entries; frame data is pulled out of compressed hunks through a
//! single-slot cache. Each stored frame holds the sector data at its
//! native size and, in 2448-byte containers, 96 subchannel bytes at a
//! fixed 2352 offset.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chd::Chd;
use chd::metadata::MetadataTag;
use log::{debug, warn};

use crate::cd::sector::{
    edc_check, encode_mode1_sector, encode_mode2_form1_sector, encode_mode2_form2_sector,
    encode_mode2_sector, scramble,
};
use crate::cd::subchannel::{deinterleave_q, q_check_checksum};
use crate::cd::synth::{synth_leadout_frame, synth_leadout_subpw};
use crate::cd::toc::{CTRL_4CH, CTRL_DATA, CTRL_PRE, DiscType, Toc};
use crate::cd::{FRAME_SIZE, SECTOR_SIZE, SUBCODE_SIZE, lba_to_aba};
use crate::image::error::{ImageError, ImageResult};
use crate::image::format::DiFormat;
use crate::image::layout::{DiscLayout, SubQReplaceMap, TrackLayout};
use crate::image::{DiscImage, synth_gap_payload};

const CHTR_TAG: u32 = u32::from_be_bytes(*b"CHTR");
const CHT2_TAG: u32 = u32::from_be_bytes(*b"CHT2");

/// One parsed CHTR/CHT2 metadata entry.
#[derive(Clone, Debug)]
struct ChdTrackMeta {
    number: usize,
    format: DiFormat,
    subchannel: bool,
    frames: i32,
    pregap: i32,
    /// Pregap frames are included in `frames` and stored in the
    /// container (PGTYPE carries a `V` prefix).
    pregap_in_file: bool,
    postgap: i32,
    pre_emphasis: bool,
    four_channel: bool,
}

#[derive(Clone, Copy, Default)]
struct ChdTrackStorage {
    /// Frame index of the track's start within the container.
    file_offset: i64,
    subchannel: bool,
}

pub struct ChdImage {
    chd: Chd<BufReader<File>>,
    layout: DiscLayout,
    toc: Toc,
    storage: Vec<ChdTrackStorage>,
    subq_replace: SubQReplaceMap,
    /// Stored bytes per frame: 2448 with embedded subchannel, 2352
    /// without.
    frame_size: usize,
    frames_per_hunk: usize,
    hunk_buf: Vec<u8>,
    cmp_buf: Vec<u8>,
    cached_hunk: Option<u32>,
}

/// Parse one `TRACK:n TYPE:t SUBTYPE:s FRAMES:f ...` metadata string.
/// CHTR entries stop after FRAMES; CHT2 adds the gap fields.
fn parse_track_entry(content: &str) -> ImageResult<ChdTrackMeta> {
    let mut number = None;
    let mut format = None;
    let mut subchannel = false;
    let mut frames = None;
    let mut pregap = 0i32;
    let mut pregap_in_file = false;
    let mut postgap = 0i32;
    let mut pre_emphasis = false;
    let mut four_channel = false;

    let bad = |field: &str, value: &str| {
        ImageError::Parse(format!("bad {field} value {value:?} in CHD track metadata"))
    };

    for part in content.split_whitespace() {
        let Some((key, value)) = part.split_once(':') else {
            continue;
        };
        match key {
            "TRACK" => {
                let n: usize = value.parse().map_err(|_| bad(key, value))?;
                if !(1..=99).contains(&n) {
                    return Err(bad(key, value));
                }
                number = Some(n);
            }
            "TYPE" => {
                let mut token = value;
                if let Some(stripped) = token.strip_suffix("_PRE") {
                    pre_emphasis = true;
                    token = stripped;
                }
                if let Some(stripped) = token.strip_suffix("_4CH") {
                    four_channel = true;
                    token = stripped;
                }
                format = Some(DiFormat::from_chd_type(token).ok_or_else(|| bad(key, value))?);
            }
            "SUBTYPE" => subchannel = value.starts_with("RW"),
            "FRAMES" => frames = Some(value.parse().map_err(|_| bad(key, value))?),
            "PREGAP" => pregap = value.parse().map_err(|_| bad(key, value))?,
            "PGTYPE" => pregap_in_file = value.starts_with('V'),
            "POSTGAP" => postgap = value.parse().map_err(|_| bad(key, value))?,
            _ => {}
        }
    }

    Ok(ChdTrackMeta {
        number: number.ok_or_else(|| ImageError::Parse("CHD track metadata lacks TRACK".into()))?,
        format: format.ok_or_else(|| ImageError::Parse("CHD track metadata lacks TYPE".into()))?,
        subchannel,
        frames: frames.ok_or_else(|| ImageError::Parse("CHD track metadata lacks FRAMES".into()))?,
        pregap,
        pregap_in_file,
        postgap,
        pre_emphasis,
        four_channel,
    })
}

/// Place the tracks on the disc. Stored pregaps count against the
/// track's FRAMES total; container slots are padded out to four-frame
/// boundaries between tracks.
fn assemble_layout(metas: &[ChdTrackMeta]) -> ImageResult<(DiscLayout, Vec<ChdTrackStorage>)> {
    let mut metas: Vec<&ChdTrackMeta> = metas.iter().collect();
    metas.sort_by_key(|m| m.number);

    let mut layout = DiscLayout::new();
    let mut storage = vec![ChdTrackStorage::default(); 100];

    let mut running_lba = -150i32;
    let mut container_offset = 0i64;
    let mut any_data = false;

    for (i, meta) in metas.iter().enumerate() {
        if meta.number != i + 1 {
            return Err(ImageError::Layout(format!(
                "CHD track numbering is not contiguous at track {}",
                meta.number
            )));
        }

        let pregap_dv = if meta.pregap_in_file { meta.pregap } else { 0 };
        let mut pregap = if meta.pregap_in_file { 0 } else { meta.pregap };
        if i == 0 {
            pregap += 150;
        }
        if pregap_dv > meta.frames {
            return Err(ImageError::Layout(format!(
                "CHD track {} pregap exceeds its frame count",
                meta.number
            )));
        }

        let mut control = 0u8;
        if meta.format.is_data() {
            control |= CTRL_DATA;
            any_data = true;
        }
        if meta.pre_emphasis {
            control |= CTRL_PRE;
        }
        if meta.four_channel {
            control |= CTRL_4CH;
        }

        running_lba += pregap + pregap_dv;

        let mut track = TrackLayout {
            lba: running_lba,
            sectors: meta.frames - pregap_dv,
            pregap,
            pregap_dv,
            postgap: meta.postgap,
            control,
            format: meta.format,
            ..TrackLayout::default()
        };
        track.index[1] = running_lba;
        layout.tracks[meta.number] = track;

        storage[meta.number] = ChdTrackStorage {
            file_offset: container_offset + pregap_dv as i64,
            subchannel: meta.subchannel,
        };

        running_lba += meta.frames - pregap_dv + meta.postgap;
        container_offset += ((meta.frames + 3) & !3) as i64;
    }

    layout.first_track = 1;
    layout.last_track = metas.len();
    layout.total_sectors = running_lba;
    layout.disc_type = if any_data {
        let xa = metas.iter().any(|m| {
            matches!(
                m.format,
                DiFormat::Mode2 | DiFormat::Mode2Form1 | DiFormat::Mode2Form2 | DiFormat::Mode2Raw
            )
        });
        if xa { DiscType::CdXa } else { DiscType::CddaOrMode1 }
    } else {
        DiscType::CddaOrMode1
    };

    Ok((layout, storage))
}

fn read_track_metadata(chd: &mut Chd<BufReader<File>>) -> ImageResult<Vec<ChdTrackMeta>> {
    // Refs are collected first; reading them needs the underlying
    // stream back.
    let refs: Vec<_> = chd
        .metadata_refs()
        .filter(|m| m.metatag() == CHTR_TAG || m.metatag() == CHT2_TAG)
        .collect();

    let mut metas = Vec::with_capacity(refs.len());
    for meta_ref in refs {
        let metadata = meta_ref.read(chd.inner())?;
        let content = String::from_utf8_lossy(&metadata.value);
        let content = content.trim_end_matches('\0').trim();
        debug!("CHD track metadata: {content}");
        metas.push(parse_track_entry(content)?);
    }
    Ok(metas)
}

/// CD containers hold whole frames per hunk; the stored frame size is
/// derived from divisibility when the header does not pin it. A hunk
/// too small for even one frame is fatal.
fn derive_frame_size(hunk_size: usize) -> ImageResult<usize> {
    if hunk_size >= FRAME_SIZE && hunk_size % FRAME_SIZE == 0 {
        Ok(FRAME_SIZE)
    } else if hunk_size >= SECTOR_SIZE && hunk_size % SECTOR_SIZE == 0 {
        Ok(SECTOR_SIZE)
    } else {
        Err(ImageError::Layout(format!(
            "CHD hunk size {hunk_size} does not hold whole CD frames"
        )))
    }
}

/// Accept a stored subchannel block only when its Q channel carries a
/// valid checksum.
fn stored_subchannel_ok(stored: &[u8; SUBCODE_SIZE]) -> bool {
    let mut qbuf = [0u8; 12];
    deinterleave_q(stored, &mut qbuf);
    q_check_checksum(&qbuf)
}

/// Raw data tracks may be stored scrambled. If the EDC does not verify
/// as-is, try the descrambled reading and keep whichever checks out.
fn unscramble_if_needed(sector: &mut [u8], xa: bool) {
    if edc_check(sector, xa) {
        return;
    }
    scramble(sector);
    if !edc_check(sector, xa) {
        scramble(sector);
    }
}

impl ChdImage {
    pub fn open(path: &Path) -> ImageResult<Self> {
        let mut chd = Chd::open(BufReader::new(File::open(path)?), None)?;

        let hunk_size = chd.header().hunk_size() as usize;
        let frame_size = derive_frame_size(hunk_size)?;

        let metas = read_track_metadata(&mut chd)?;
        if metas.is_empty() {
            return Err(ImageError::Parse(
                "CHD container carries no CD track metadata".into(),
            ));
        }

        let (layout, storage) = assemble_layout(&metas)?;
        let toc = layout.generate_toc();

        debug!(
            "opened {}: tracks {}..={}, {} sectors, {} frames per hunk",
            path.display(),
            layout.first_track,
            layout.last_track,
            layout.total_sectors,
            hunk_size / frame_size
        );

        let hunk_buf = chd.get_hunksized_buffer();
        Ok(ChdImage {
            chd,
            layout,
            toc,
            storage,
            subq_replace: SubQReplaceMap::new(),
            frame_size,
            frames_per_hunk: hunk_size / frame_size,
            hunk_buf,
            cmp_buf: Vec::new(),
            cached_hunk: None,
        })
    }

    /// Copy one stored frame out of its hunk into the head of `unit`;
    /// the tail stays zeroed when the container has no subchannel.
    fn read_frame_unit(&mut self, frame_index: i64, unit: &mut [u8; FRAME_SIZE]) -> ImageResult<()> {
        let hunk = (frame_index / self.frames_per_hunk as i64) as u32;
        let offset = (frame_index % self.frames_per_hunk as i64) as usize * self.frame_size;

        if self.cached_hunk != Some(hunk) {
            self.cached_hunk = None;
            self.chd
                .hunk(hunk)?
                .read_hunk_in(&mut self.cmp_buf, &mut self.hunk_buf)?;
            self.cached_hunk = Some(hunk);
        }
        unit[..self.frame_size].copy_from_slice(&self.hunk_buf[offset..offset + self.frame_size]);
        Ok(())
    }
}

impl DiscImage for ChdImage {
    fn read_raw_sector(&mut self, lba: i32, frame: &mut [u8; FRAME_SIZE]) -> ImageResult<()> {
        if lba >= self.layout.total_sectors {
            synth_leadout_frame(&self.toc, lba, frame);
            return Ok(());
        }

        frame.fill(0);
        let number = {
            let (_, subpw) = frame.split_at_mut(SECTOR_SIZE);
            self.layout.make_sub_pq(lba, &self.subq_replace, subpw)?
        };
        let track = &self.layout.tracks[number];
        let format = track.format;
        let xa = format == DiFormat::Mode2Raw;

        if lba < track.lba - track.pregap_dv || lba >= track.lba + track.sectors {
            let mut format = format;
            if lba - track.lba < -150
                && track.control & CTRL_DATA != 0
                && number > self.layout.first_track
                && self.layout.tracks[number - 1].control & CTRL_DATA == 0
            {
                format = self.layout.tracks[number - 1].format;
            }
            synth_gap_payload(format, lba, &mut frame[..SECTOR_SIZE]);
            return Ok(());
        }

        let st = self.storage[number];
        let frame_index = (lba - track.lba) as i64 + st.file_offset;
        let mut unit = [0u8; FRAME_SIZE];
        self.read_frame_unit(frame_index, &mut unit)?;

        let (sector, subpw) = frame.split_at_mut(SECTOR_SIZE);
        let aba = lba_to_aba(lba);
        match format {
            DiFormat::Audio => {
                // Audio is stored big-endian in the container.
                sector.copy_from_slice(&unit[..SECTOR_SIZE]);
                for pair in sector.chunks_exact_mut(2) {
                    pair.swap(0, 1);
                }
            }
            DiFormat::Mode1Raw | DiFormat::Mode2Raw | DiFormat::CdiRaw => {
                sector.copy_from_slice(&unit[..SECTOR_SIZE]);
                unscramble_if_needed(sector, xa);
            }
            DiFormat::Mode1 => {
                sector[16..2064].copy_from_slice(&unit[..2048]);
                encode_mode1_sector(aba, sector);
            }
            DiFormat::Mode2 => {
                sector[16..].copy_from_slice(&unit[..2336]);
                encode_mode2_sector(aba, sector);
            }
            DiFormat::Mode2Form1 => {
                sector[24..2072].copy_from_slice(&unit[..2048]);
                encode_mode2_form1_sector(aba, sector);
            }
            DiFormat::Mode2Form2 => {
                sector[24..2348].copy_from_slice(&unit[..2324]);
                encode_mode2_form2_sector(aba, sector);
            }
        }

        if st.subchannel && self.frame_size == FRAME_SIZE {
            let mut stored = [0u8; SUBCODE_SIZE];
            stored.copy_from_slice(&unit[SECTOR_SIZE..]);
            if stored_subchannel_ok(&stored) {
                subpw.copy_from_slice(&stored);
            } else {
                warn!("stored subchannel at lba {lba} fails its Q checksum, synthesizing");
            }
        }
        Ok(())
    }

    fn fast_read_subchannel(&self, lba: i32, subpw: &mut [u8; SUBCODE_SIZE]) -> bool {
        if lba >= self.layout.total_sectors {
            synth_leadout_subpw(&self.toc, lba, subpw);
            return true;
        }

        subpw.fill(0);
        let Ok(number) = self.layout.make_sub_pq(lba, &self.subq_replace, subpw) else {
            return false;
        };

        let track = &self.layout.tracks[number];
        !(self.storage[number].subchannel
            && self.frame_size == FRAME_SIZE
            && lba >= track.lba - track.pregap_dv
            && lba < track.lba + track.sectors)
    }

    fn toc(&self) -> &Toc {
        &self.toc
    }
}
