//! Cue sheet and cdrdao TOC backend. The sheet is parsed into a
//! [`DiscLayout`] plus per-track storage descriptors; sector reads pull
//! payload bytes from the referenced files (raw binaries, WAV or FLAC
//! audio) and synthesize everything the files do not carry.

pub mod sbi;

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::cd::sector::{
    encode_mode1_sector, encode_mode2_form1_sector, encode_mode2_form2_sector,
    encode_mode2_sector,
};
use crate::cd::synth::{synth_leadout_frame, synth_leadout_subpw};
use crate::cd::toc::{CTRL_4CH, CTRL_DATA, CTRL_DCP, CTRL_PRE, DiscType, Toc};
use crate::cd::{AUDIO_FRAMES_PER_SECTOR, FRAME_SIZE, SECTOR_SIZE, SUBCODE_SIZE, lba_to_aba};
use crate::image::audio::open_audio;
use crate::image::{DiscImage, synth_gap_payload};
use crate::image::error::{ImageError, ImageResult};
use crate::image::format::DiFormat;
use crate::image::layout::{DiscLayout, SubQReplaceMap, TrackLayout};

enum Source {
    Binary { file: File, size: u64 },
    Audio(Box<dyn crate::image::audio::AudioReader>),
}

impl Source {
    fn data_size(&self) -> i64 {
        match self {
            Source::Binary { size, .. } => *size as i64,
            Source::Audio(reader) => reader.frame_count() as i64 * 4,
        }
    }
}

#[derive(Clone, Copy, Default)]
struct TrackStorage {
    source: Option<usize>,
    file_offset: i64,
    /// Each sector's data is followed by 96 raw subchannel bytes.
    subchannel: bool,
    /// cdrdao stores audio big-endian; swap to LE on read.
    swap_audio_bytes: bool,
}

/// Per-track state accumulated while walking the sheet. Index points
/// are file-relative frame counts here, -1 for unset; they become
/// absolute LBAs during assembly.
#[derive(Clone)]
struct RawTrack {
    format: DiFormat,
    pregap: i32,
    postgap: i32,
    control: u8,
    sectors: i32,
    index: [i32; 100],
    first_file_instance: bool,
    storage: TrackStorage,
}

impl Default for RawTrack {
    fn default() -> Self {
        RawTrack {
            format: DiFormat::default(),
            pregap: 0,
            postgap: 0,
            control: 0,
            sectors: 0,
            index: [0; 100],
            first_file_instance: false,
            storage: TrackStorage::default(),
        }
    }
}

pub struct CueImage {
    layout: DiscLayout,
    toc: Toc,
    sources: Vec<Source>,
    /// Indexed by track number, aligned with `layout.tracks`.
    storage: Vec<TrackStorage>,
    subq_replace: SubQReplaceMap,
}

/// Split a sheet line into a command and up to four arguments. The
/// command itself is never quote-parsed; arguments may be quoted.
fn split_line(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut rest = line.trim_start();
    while !rest.is_empty() && out.len() < 5 {
        if !out.is_empty() && rest.starts_with('"') {
            match rest[1..].find('"') {
                Some(end) => {
                    out.push(rest[1..1 + end].to_string());
                    rest = rest[2 + end..].trim_start();
                }
                None => {
                    out.push(rest[1..].to_string());
                    rest = "";
                }
            }
        } else {
            let end = rest
                .find(|c: char| c == ' ' || c == '\t')
                .unwrap_or(rest.len());
            out.push(rest[..end].to_string());
            rest = rest[end..].trim_start();
        }
    }
    out
}

fn parse_msf(text: &str) -> ImageResult<i32> {
    let parse = || -> Option<(u32, u32, u32)> {
        let mut parts = text.split(':');
        let m = parts.next()?.trim().parse().ok()?;
        let s = parts.next()?.trim().parse().ok()?;
        let f = parts.next()?.trim().parse().ok()?;
        Some((m, s, f))
    };
    let (m, s, f) =
        parse().ok_or_else(|| ImageError::Parse(format!("M:S:F time {text:?} is malformed")))?;
    if m > 99 || s > 59 || f > 74 {
        return Err(ImageError::Parse(format!(
            "M:S:F time {text:?} contains component(s) out of range"
        )));
    }
    Ok(((m * 60 + s) * 75 + f) as i32)
}

struct SheetParser {
    base_dir: PathBuf,
    is_toc: bool,
    sources: Vec<Source>,
    /// The TOC dialect reuses one stream across tracks naming the same
    /// file.
    source_cache: HashMap<String, usize>,
    tracks: Vec<RawTrack>,
    tmp: RawTrack,
    active: Option<usize>,
    auto_track: usize,
    first_track: usize,
    last_track: usize,
    disc_type: DiscType,
}

impl SheetParser {
    fn new(base_dir: PathBuf, is_toc: bool) -> Self {
        SheetParser {
            base_dir,
            is_toc,
            sources: Vec::new(),
            source_cache: HashMap::new(),
            tracks: vec![RawTrack::default(); 100],
            tmp: RawTrack::default(),
            active: None,
            auto_track: 1,
            first_track: 99,
            last_track: 0,
            disc_type: DiscType::CddaOrMode1,
        }
    }

    fn flush_active(&mut self) {
        if let Some(number) = self.active.take() {
            self.tracks[number] = self.tmp.clone();
        }
    }

    fn arg<'a>(args: &'a [String], i: usize) -> &'a str {
        args.get(i).map(String::as_str).unwrap_or("")
    }

    fn open_source(&mut self, filename: &str, cache: bool) -> ImageResult<(usize, bool)> {
        if cache && let Some(&idx) = self.source_cache.get(filename) {
            return Ok((idx, false));
        }

        let path = self.base_dir.join(filename);
        let lower = filename.to_ascii_lowercase();
        let source = if lower.ends_with(".wav") || lower.ends_with(".flac") {
            Source::Audio(open_audio(&path)?)
        } else {
            let file = File::open(&path)?;
            let size = file.metadata()?.len();
            Source::Binary { file, size }
        };

        let idx = self.sources.len();
        self.sources.push(source);
        if cache {
            self.source_cache.insert(filename.to_string(), idx);
        }
        Ok((idx, true))
    }

    fn line(&mut self, raw_line: &str) -> ImageResult<()> {
        let mut line = raw_line;
        if self.is_toc && let Some(comment) = line.find("//") {
            line = &line[..comment];
        }
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let tokens = split_line(line);
        let cmd = tokens[0].to_ascii_uppercase();
        let args = &tokens[1..];

        if self.is_toc {
            self.toc_directive(&cmd, args)
        } else {
            self.cue_directive(&cmd, args)
        }
    }

    fn toc_directive(&mut self, cmd: &str, args: &[String]) -> ImageResult<()> {
        match cmd {
            "TRACK" => {
                self.flush_active();
                self.tmp = RawTrack::default();
                self.tmp.index[2..].fill(-1);

                if self.auto_track > 99 {
                    return Err(ImageError::Parse(format!(
                        "invalid track number: {}",
                        self.auto_track
                    )));
                }
                let number = self.auto_track;
                self.auto_track += 1;
                self.active = Some(number);
                self.first_track = self.first_track.min(number);
                self.last_track = self.last_track.max(number);

                self.tmp.format =
                    DiFormat::from_cdrdao_token(Self::arg(args, 0)).ok_or_else(|| {
                        ImageError::Parse(format!("invalid track format: {}", Self::arg(args, 0)))
                    })?;
                if self.tmp.format == DiFormat::Audio {
                    self.tmp.storage.swap_audio_bytes = true;
                }

                match Self::arg(args, 1).to_ascii_uppercase().as_str() {
                    "RW" => {
                        return Err(ImageError::Unsupported(
                            "\"RW\" packed subchannel data (only \"RW_RAW\" is handled)".into(),
                        ));
                    }
                    "RW_RAW" => self.tmp.storage.subchannel = true,
                    _ => {}
                }
            }
            "SILENCE" | "ZERO" => {}
            "FIFO" | "INDEX" => {
                return Err(ImageError::Unsupported(format!("TOC directive {cmd}")));
            }
            "FILE" | "AUDIOFILE" => {
                let (binoffset, msfoffset, length) = if Self::arg(args, 1).starts_with('#') {
                    (
                        Some(Self::arg(args, 1)[1..].to_string()),
                        Self::arg(args, 2).to_string(),
                        Self::arg(args, 3).to_string(),
                    )
                } else {
                    (
                        None,
                        Self::arg(args, 1).to_string(),
                        Self::arg(args, 2).to_string(),
                    )
                };
                self.toc_file_line(
                    Self::arg(args, 0).to_string(),
                    binoffset,
                    Some(msfoffset),
                    length,
                )?;
            }
            "DATAFILE" => {
                let (binoffset, length) = if Self::arg(args, 1).starts_with('#') {
                    (
                        Some(Self::arg(args, 1)[1..].to_string()),
                        Self::arg(args, 2).to_string(),
                    )
                } else {
                    (None, Self::arg(args, 1).to_string())
                };
                self.toc_file_line(Self::arg(args, 0).to_string(), binoffset, None, length)?;
            }
            "PREGAP" | "START" => {
                if self.active.is_none() {
                    return Err(ImageError::Parse(format!(
                        "{cmd} is outside of a TRACK definition"
                    )));
                }
                self.tmp.pregap = parse_msf(Self::arg(args, 0))?;
            }
            "TWO_CHANNEL_AUDIO" => self.tmp.control &= !CTRL_4CH,
            "FOUR_CHANNEL_AUDIO" => self.tmp.control |= CTRL_4CH,
            "NO" => match Self::arg(args, 0).to_ascii_uppercase().as_str() {
                "COPY" => self.tmp.control &= !CTRL_DCP,
                "PRE_EMPHASIS" => self.tmp.control &= !CTRL_PRE,
                other => {
                    return Err(ImageError::Parse(format!(
                        "unsupported argument to \"NO\" directive: {other}"
                    )));
                }
            },
            "COPY" => self.tmp.control |= CTRL_DCP,
            "PRE_EMPHASIS" => self.tmp.control |= CTRL_PRE,
            "CD_DA" | "CD_ROM" => self.disc_type = DiscType::CddaOrMode1,
            "CD_ROM_XA" => self.disc_type = DiscType::CdXa,
            // CATALOG, CD_TEXT blocks and the like.
            _ => {}
        }
        Ok(())
    }

    fn toc_file_line(
        &mut self,
        filename: String,
        binoffset: Option<String>,
        msfoffset: Option<String>,
        length: String,
    ) -> ImageResult<()> {
        let (source, first_instance) = self.open_source(&filename, true)?;
        self.tmp.storage.source = Some(source);
        self.tmp.first_file_instance = first_instance;

        let mut sector_mult = self.tmp.format.sector_bytes() as i64;
        if self.tmp.storage.subchannel {
            sector_mult += SUBCODE_SIZE as i64;
        }

        let mut offset: i64 = 0;
        if let Some(bin) = binoffset
            && let Ok(value) = bin.trim().parse::<i64>()
        {
            offset += value;
        }
        if let Some(msf) = msfoffset
            && let Ok(frames) = parse_msf(&msf)
        {
            offset += frames as i64 * sector_mult;
        }
        self.tmp.storage.file_offset = offset;

        let available = self.sources[source].data_size() - offset;
        if available < 0 {
            return Err(ImageError::Parse(
                "track offset into file exceeds the amount of data available".into(),
            ));
        }
        let mut sectors = available / sector_mult;

        if !length.is_empty() {
            let declared = if let Ok(frames) = parse_msf(&length) {
                Some(frames as i64)
            } else if self.tmp.format == DiFormat::Audio {
                length.trim().parse::<i64>().ok().map(|samples| samples / 588)
            } else {
                None
            };

            if let Some(declared) = declared {
                if declared > sectors {
                    return Err(ImageError::Parse(format!(
                        "declared track length is too large by {} sectors",
                        declared - sectors
                    )));
                }
                sectors = declared;
            }
        }

        self.tmp.sectors = sectors as i32;
        Ok(())
    }

    fn cue_directive(&mut self, cmd: &str, args: &[String]) -> ImageResult<()> {
        match cmd {
            "FILE" => {
                self.flush_active();
                self.tmp = RawTrack::default();

                let kind = Self::arg(args, 1).to_ascii_uppercase();
                let (source, _) = match kind.as_str() {
                    "BINARY" | "WAVE" | "WAV" | "FLAC" | "PCM" => {
                        self.open_source(Self::arg(args, 0), false)?
                    }
                    other => {
                        return Err(ImageError::Unsupported(format!("track file type {other}")));
                    }
                };
                self.tmp.storage.source = Some(source);
                self.tmp.first_file_instance = true;
            }
            "TRACK" => {
                if self.active.is_some() {
                    self.flush_active();
                    self.tmp.first_file_instance = false;
                    self.tmp.pregap = 0;
                    self.tmp.postgap = 0;
                    self.tmp.index[0] = -1;
                    self.tmp.index[1] = 0;
                }
                self.tmp.index[2..].fill(-1);

                let number: usize = Self::arg(args, 0)
                    .parse()
                    .ok()
                    .filter(|&n| (1..=99).contains(&n))
                    .ok_or_else(|| {
                        ImageError::Parse(format!("invalid track number: {}", Self::arg(args, 0)))
                    })?;
                self.active = Some(number);
                self.first_track = self.first_track.min(number);
                self.last_track = self.last_track.max(number);

                self.tmp.format =
                    DiFormat::from_cue_token(Self::arg(args, 1)).ok_or_else(|| {
                        ImageError::Parse(format!("invalid track format: {}", Self::arg(args, 1)))
                    })?;
            }
            "INDEX" => {
                if self.active.is_some() {
                    let which: usize = Self::arg(args, 0)
                        .parse()
                        .ok()
                        .filter(|&w| w < 100)
                        .ok_or_else(|| {
                            ImageError::Parse(format!(
                                "malformed INDEX number: {}",
                                Self::arg(args, 0)
                            ))
                        })?;
                    self.tmp.index[which] = parse_msf(Self::arg(args, 1))?;
                }
            }
            "PREGAP" => {
                if self.active.is_some() {
                    self.tmp.pregap = parse_msf(Self::arg(args, 0))?;
                }
            }
            "POSTGAP" => {
                if self.active.is_some() {
                    self.tmp.postgap = parse_msf(Self::arg(args, 0))?;
                }
            }
            "REM" => {}
            "FLAGS" => {
                self.tmp.control &= !(CTRL_PRE | CTRL_DCP | CTRL_4CH);
                for flag in args {
                    match flag.to_ascii_uppercase().as_str() {
                        "DCP" => self.tmp.control |= CTRL_DCP,
                        "4CH" => self.tmp.control |= CTRL_4CH,
                        "PRE" => self.tmp.control |= CTRL_PRE,
                        // Serial copy management, not representable here.
                        "SCMS" => {}
                        other => {
                            return Err(ImageError::Parse(format!(
                                "unknown cue sheet FLAGS directive flag {other:?}"
                            )));
                        }
                    }
                }
            }
            "CDTEXTFILE" | "CATALOG" | "ISRC" | "TITLE" | "PERFORMER" | "SONGWRITER" => {
                warn!("unsupported cue sheet directive: {cmd}");
            }
            other => {
                return Err(ImageError::Parse(format!(
                    "unknown cue sheet directive {other:?}"
                )));
            }
        }
        Ok(())
    }

    fn sector_count(&self, track: &RawTrack, number: usize) -> ImageResult<i64> {
        let source = track
            .storage
            .source
            .ok_or_else(|| ImageError::Parse(format!("missing track {number}")))?;
        let mut div = track.format.sector_bytes() as i64;
        if track.storage.subchannel {
            div += SUBCODE_SIZE as i64;
        }
        let size = self.sources[source].data_size() - track.storage.file_offset;
        if size < 0 {
            return Err(ImageError::Parse(
                "track offset into file exceeds the amount of data available".into(),
            ));
        }
        Ok(size / div)
    }

    fn assemble(mut self) -> ImageResult<(DiscLayout, Vec<TrackStorage>, Vec<Source>)> {
        self.flush_active();

        if self.first_track > self.last_track {
            return Err(ImageError::Parse("no tracks found".into()));
        }
        let (first, last) = (self.first_track, self.last_track);

        // First pass: control bits and disc type.
        for number in first..=last {
            if self.tracks[number].storage.source.is_none() {
                return Err(ImageError::Parse(format!("missing track {number}")));
            }

            if self.tracks[number].format == DiFormat::Audio {
                self.tracks[number].control &= !CTRL_DATA;
            } else {
                self.tracks[number].control |= CTRL_DATA;
            }

            // TOC sheets declare the session type explicitly.
            if !self.is_toc && self.disc_type != DiscType::CdI {
                match self.tracks[number].format {
                    DiFormat::Mode2
                    | DiFormat::Mode2Form1
                    | DiFormat::Mode2Form2
                    | DiFormat::Mode2Raw => self.disc_type = DiscType::CdXa,
                    DiFormat::CdiRaw => self.disc_type = DiscType::CdI,
                    _ => {}
                }
            }
        }

        let mut layout = DiscLayout::new();
        layout.first_track = first;
        layout.last_track = last;
        layout.disc_type = self.disc_type;

        // The two-second lead-in pause belongs to the first track.
        self.tracks[first].pregap += 150;

        let mut running_lba: i32 = -150;
        let mut file_offset: i64 = 0;

        for number in first..=last {
            let raw = &self.tracks[number];
            let lba;
            let sectors;
            let mut pregap_dv = 0;

            if self.is_toc {
                running_lba += raw.pregap;
                lba = running_lba;
                sectors = raw.sectors;
                running_lba += sectors + raw.postgap;
            } else {
                if raw.first_file_instance {
                    file_offset = 0;
                }

                running_lba += raw.pregap;

                if raw.index[0] != -1 {
                    pregap_dv = raw.index[1] - raw.index[0];
                }
                file_offset += pregap_dv as i64 * raw.format.sector_bytes() as i64;
                running_lba += pregap_dv;
                lba = running_lba;

                self.tracks[number].storage.file_offset = file_offset;

                let raw = &self.tracks[number];
                sectors = if number == last || self.tracks[number + 1].first_file_instance {
                    self.sector_count(raw, number)? as i32
                } else {
                    let next = &self.tracks[number + 1];
                    let next_start = if next.index[0] != -1 {
                        next.index[0]
                    } else {
                        next.index[1]
                    };
                    next_start - raw.index[1]
                };

                running_lba += sectors + self.tracks[number].postgap;
                file_offset += sectors as i64 * self.tracks[number].format.sector_bytes() as i64;
            }

            // Rebase index points onto absolute LBAs. Index 0 stays
            // positional (the pregap), so its slot is never current.
            let mut index = [i32::MAX; 100];
            if self.is_toc {
                index[1] = lba;
            } else {
                let raw = &self.tracks[number];
                let base = raw.index[1];
                for i in 1..100 {
                    if raw.index[i] != -1 {
                        let point = lba + (raw.index[i] - base);
                        if point < 0 {
                            return Err(ImageError::Parse(format!(
                                "index {i} of track {number} lands before the lead-in"
                            )));
                        }
                        index[i] = point;
                    }
                }
            }

            let raw = &self.tracks[number];
            layout.tracks[number] = TrackLayout {
                lba,
                sectors,
                pregap: raw.pregap,
                pregap_dv,
                postgap: raw.postgap,
                control: raw.control,
                format: raw.format,
                index,
            };
        }

        layout.total_sectors = running_lba;

        let storage = self.tracks.iter().map(|t| t.storage).collect();
        Ok((layout, storage, self.sources))
    }
}

impl CueImage {
    pub fn open(path: &Path) -> ImageResult<Self> {
        let is_toc = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("toc"));
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);
        let base_dir = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let mut parser = SheetParser::new(base_dir, is_toc);
        for line in text.trim_start_matches('\u{feff}').lines() {
            parser.line(line)?;
        }
        let (layout, storage, sources) = parser.assemble()?;

        let mut subq_replace = SubQReplaceMap::new();
        if !is_toc {
            for ext in ["sbi", "SBI"] {
                match sbi::load_sbi(&path.with_extension(ext)) {
                    Ok(map) => {
                        debug!("loaded Q replacements for {} sectors", map.len());
                        subq_replace = map;
                        break;
                    }
                    Err(ImageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }

        let toc = layout.generate_toc();
        debug!(
            "opened {}: tracks {}..={}, {} sectors",
            path.display(),
            layout.first_track,
            layout.last_track,
            layout.total_sectors
        );

        Ok(CueImage {
            layout,
            toc,
            sources,
            storage,
            subq_replace,
        })
    }
}

impl DiscImage for CueImage {
    fn read_raw_sector(&mut self, lba: i32, frame: &mut [u8; FRAME_SIZE]) -> ImageResult<()> {
        if lba >= self.layout.total_sectors {
            synth_leadout_frame(&self.toc, lba, frame);
            return Ok(());
        }

        frame.fill(0);
        let (sector, subpw) = frame.split_at_mut(SECTOR_SIZE);
        let number = self.layout.make_sub_pq(lba, &self.subq_replace, subpw)?;
        let track = &self.layout.tracks[number];
        let st = self.storage[number];

        // Sheet-declared gaps have no backing file data.
        if lba < track.lba - track.pregap_dv || lba >= track.lba + track.sectors {
            let mut format = track.format;
            if lba - track.lba < -150
                && track.control & CTRL_DATA != 0
                && number > self.layout.first_track
                && self.layout.tracks[number - 1].control & CTRL_DATA == 0
            {
                format = self.layout.tracks[number - 1].format;
            }
            synth_gap_payload(format, lba, sector);
            return Ok(());
        }

        let source_idx = st.source.ok_or(ImageError::SectorRange(lba))?;
        match &mut self.sources[source_idx] {
            Source::Audio(reader) => {
                let mut pcm = [0i16; AUDIO_FRAMES_PER_SECTOR * 2];
                let frame_offset = st.file_offset / 4
                    + (lba - track.lba) as i64 * AUDIO_FRAMES_PER_SECTOR as i64;
                if frame_offset >= 0 {
                    reader.read_frames(frame_offset as u64, &mut pcm)?;
                }
                LittleEndian::write_i16_into(&pcm, sector);
            }
            Source::Binary { file, .. } => {
                let rel = (lba - track.lba) as i64;
                let mut pos = st.file_offset + rel * track.format.sector_bytes() as i64;
                if st.subchannel {
                    pos += SUBCODE_SIZE as i64 * rel;
                }
                file.seek(SeekFrom::Start(pos as u64))?;

                let aba = lba_to_aba(lba);
                match track.format {
                    DiFormat::Audio => {
                        file.read_exact(sector)?;
                        if st.swap_audio_bytes {
                            for pair in sector.chunks_exact_mut(2) {
                                pair.swap(0, 1);
                            }
                        }
                    }
                    DiFormat::Mode1 => {
                        file.read_exact(&mut sector[16..2064])?;
                        encode_mode1_sector(aba, sector);
                    }
                    DiFormat::Mode1Raw | DiFormat::Mode2Raw | DiFormat::CdiRaw => {
                        file.read_exact(sector)?;
                    }
                    DiFormat::Mode2 => {
                        file.read_exact(&mut sector[16..])?;
                        encode_mode2_sector(aba, sector);
                    }
                    DiFormat::Mode2Form1 => {
                        file.read_exact(&mut sector[24..2072])?;
                        encode_mode2_form1_sector(aba, sector);
                    }
                    DiFormat::Mode2Form2 => {
                        file.read_exact(&mut sector[24..2348])?;
                        encode_mode2_form2_sector(aba, sector);
                    }
                }

                if st.subchannel {
                    file.read_exact(subpw)?;
                }
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

        // Embedded subchannel data cannot be synthesized from the sheet.
        let track = &self.layout.tracks[number];
        !(self.storage[number].subchannel
            && lba >= track.lba - track.pregap_dv
            && lba < track.lba + track.sectors)
    }

    fn toc(&self) -> &Toc {
        &self.toc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cd::sector::{SYNC_HEADER, edc_check};
    use crate::cd::subchannel::{deinterleave_q, q_check_checksum};

    fn q_of(frame: &[u8; FRAME_SIZE]) -> [u8; 12] {
        let mut pw = [0u8; SUBCODE_SIZE];
        pw.copy_from_slice(&frame[SECTOR_SIZE..]);
        let mut qbuf = [0u8; 12];
        deinterleave_q(&pw, &mut qbuf);
        qbuf
    }

    fn mode1_cooked_disc(dir: &Path) {
        let mut bin = Vec::new();
        for i in 0..30u8 {
            bin.extend_from_slice(&[i; 2048]);
        }
        std::fs::write(dir.join("disc.bin"), &bin).unwrap();
        std::fs::write(
            dir.join("disc.cue"),
            "FILE \"disc.bin\" BINARY\n  TRACK 01 MODE1/2048\n    INDEX 01 00:00:00\n",
        )
        .unwrap();
    }

    #[test]
    fn cooked_mode1_track_reads_as_raw_sectors() {
        let dir = tempfile::tempdir().unwrap();
        mode1_cooked_disc(dir.path());
        let mut image = CueImage::open(&dir.path().join("disc.cue")).unwrap();

        let toc = image.toc();
        assert_eq!(toc.first_track, 1);
        assert_eq!(toc.last_track, 1);
        assert_eq!(toc.leadout_lba(), 30);
        assert_eq!(toc.disc_type, DiscType::CddaOrMode1);
        assert_ne!(toc.tracks[1].control & CTRL_DATA, 0);

        let mut frame = [0u8; FRAME_SIZE];
        image.read_raw_sector(7, &mut frame).unwrap();
        assert_eq!(&frame[..12], &SYNC_HEADER);
        assert_eq!(&frame[12..16], &[0x00, 0x02, 0x07, 0x01]);
        assert!(frame[16..2064].iter().all(|&b| b == 7));
        assert!(edc_check(&frame[..SECTOR_SIZE], false));

        let qbuf = q_of(&frame);
        assert!(q_check_checksum(&qbuf));
        assert_eq!(qbuf[1], 0x01);
        assert_eq!(qbuf[2], 0x01);
        assert!(frame[SECTOR_SIZE..].iter().all(|b| b & 0x80 == 0));
    }

    #[test]
    fn lead_in_pause_and_lead_out_are_synthesized() {
        let dir = tempfile::tempdir().unwrap();
        mode1_cooked_disc(dir.path());
        let mut image = CueImage::open(&dir.path().join("disc.cue")).unwrap();

        let mut frame = [0u8; FRAME_SIZE];
        image.read_raw_sector(-1, &mut frame).unwrap();
        let qbuf = q_of(&frame);
        assert_eq!(qbuf[1], 0x01);
        assert_eq!(qbuf[2], 0x00);
        assert_eq!(&qbuf[3..6], &[0x00, 0x00, 0x00]);
        assert!(frame[SECTOR_SIZE..].iter().all(|b| b & 0x80 != 0));
        assert!(edc_check(&frame[..SECTOR_SIZE], false));

        image.read_raw_sector(30, &mut frame).unwrap();
        let qbuf = q_of(&frame);
        assert_eq!(qbuf[1], 0xaa);
        assert!(q_check_checksum(&qbuf));

        assert!(matches!(
            image.read_raw_sector(-151, &mut frame),
            Err(ImageError::SectorRange(-151))
        ));

        let mut subpw = [0u8; SUBCODE_SIZE];
        assert!(image.fast_read_subchannel(0, &mut subpw));
        assert!(image.fast_read_subchannel(30, &mut subpw));
        assert!(!image.fast_read_subchannel(-200, &mut subpw));
    }

    #[test]
    fn multi_track_single_file_with_data_backed_pregap() {
        let dir = tempfile::tempdir().unwrap();
        let mut bin = Vec::new();
        for s in 0..9usize {
            bin.extend_from_slice(&[100 + s as u8; SECTOR_SIZE]);
        }
        std::fs::write(dir.path().join("mixed.bin"), &bin).unwrap();
        std::fs::write(
            dir.path().join("mixed.cue"),
            concat!(
                "FILE \"mixed.bin\" BINARY\n",
                "  TRACK 01 MODE1/2352\n",
                "    INDEX 01 00:00:00\n",
                "  TRACK 02 AUDIO\n",
                "    INDEX 00 00:00:05\n",
                "    INDEX 01 00:00:06\n",
            ),
        )
        .unwrap();

        let mut image = CueImage::open(&dir.path().join("mixed.cue")).unwrap();
        let toc = image.toc();
        assert_eq!(toc.tracks[2].lba, 6);
        assert_eq!(toc.leadout_lba(), 9);
        assert_eq!(toc.tracks[2].control & CTRL_DATA, 0);

        // Steady-state audio sector comes straight from the file.
        let mut frame = [0u8; FRAME_SIZE];
        image.read_raw_sector(6, &mut frame).unwrap();
        assert!(frame[..SECTOR_SIZE].iter().all(|&b| b == 106));
        let qbuf = q_of(&frame);
        assert_eq!(qbuf[1], 0x02);
        assert_eq!(qbuf[2], 0x01);

        // The INDEX 00 sector is data-backed but paused, index 00.
        image.read_raw_sector(5, &mut frame).unwrap();
        assert!(frame[..SECTOR_SIZE].iter().all(|&b| b == 105));
        let qbuf = q_of(&frame);
        assert_eq!(qbuf[1], 0x02);
        assert_eq!(qbuf[2], 0x00);
        assert!(frame[SECTOR_SIZE..].iter().all(|b| b & 0x80 != 0));

        // Last sector of the raw data track.
        image.read_raw_sector(4, &mut frame).unwrap();
        assert!(frame[..SECTOR_SIZE].iter().all(|&b| b == 104));
    }

    #[test]
    fn sbi_sidecar_replaces_q_with_valid_checksum() {
        let dir = tempfile::tempdir().unwrap();
        mode1_cooked_disc(dir.path());

        let payload = [0x41u8, 0x09, 0x01, 0x00, 0x00, 0x11, 0x00, 0x00, 0x13, 0x37];
        let mut sbi = Vec::from(*b"SBI\0");
        sbi.extend_from_slice(&[0x00, 0x02, 0x02, 0x01]);
        sbi.extend_from_slice(&payload);
        std::fs::write(dir.path().join("disc.sbi"), &sbi).unwrap();

        let mut image = CueImage::open(&dir.path().join("disc.cue")).unwrap();
        let mut frame = [0u8; FRAME_SIZE];
        image.read_raw_sector(2, &mut frame).unwrap();
        let qbuf = q_of(&frame);
        assert_eq!(&qbuf[..10], &payload);
        assert!(q_check_checksum(&qbuf));

        // Untouched neighbor.
        image.read_raw_sector(3, &mut frame).unwrap();
        assert_eq!(q_of(&frame)[1], 0x01);
    }

    #[test]
    fn toc_sheet_with_embedded_subchannel() {
        let dir = tempfile::tempdir().unwrap();
        let mut bin = Vec::new();
        for s in 0..4usize {
            bin.extend_from_slice(&[s as u8 + 1; SECTOR_SIZE]);
            bin.extend_from_slice(&[0x5a; SUBCODE_SIZE]);
        }
        std::fs::write(dir.path().join("data.bin"), &bin).unwrap();
        std::fs::write(
            dir.path().join("data.toc"),
            "CD_ROM_XA // session type\nTRACK MODE2_RAW RW_RAW\nDATAFILE \"data.bin\"\n",
        )
        .unwrap();

        let mut image = CueImage::open(&dir.path().join("data.toc")).unwrap();
        let toc = image.toc();
        assert_eq!(toc.disc_type, DiscType::CdXa);
        assert_eq!(toc.leadout_lba(), 4);

        let mut frame = [0u8; FRAME_SIZE];
        image.read_raw_sector(0, &mut frame).unwrap();
        assert!(frame[..SECTOR_SIZE].iter().all(|&b| b == 1));
        assert!(frame[SECTOR_SIZE..].iter().all(|&b| b == 0x5a));

        let mut subpw = [0u8; SUBCODE_SIZE];
        assert!(!image.fast_read_subchannel(0, &mut subpw));
        assert!(!image.fast_read_subchannel(3, &mut subpw));
        assert!(image.fast_read_subchannel(4, &mut subpw));
    }

    #[test]
    fn toc_audio_tracks_are_byte_swapped() {
        let dir = tempfile::tempdir().unwrap();
        let bin: Vec<u8> = [0x12u8, 0x34]
            .iter()
            .copied()
            .cycle()
            .take(SECTOR_SIZE)
            .collect();
        std::fs::write(dir.path().join("audio.bin"), &bin).unwrap();
        std::fs::write(
            dir.path().join("audio.toc"),
            "CD_DA\nTRACK AUDIO\nAUDIOFILE \"audio.bin\" 0\n",
        )
        .unwrap();

        let mut image = CueImage::open(&dir.path().join("audio.toc")).unwrap();
        assert_eq!(image.toc().leadout_lba(), 1);

        let mut frame = [0u8; FRAME_SIZE];
        image.read_raw_sector(0, &mut frame).unwrap();
        assert_eq!(&frame[..2], &[0x34, 0x12]);
        assert!(
            frame[..SECTOR_SIZE]
                .chunks_exact(2)
                .all(|p| p == [0x34, 0x12])
        );
    }

    #[test]
    fn wav_backed_audio_track() {
        let dir = tempfile::tempdir().unwrap();

        let mut wav = Vec::new();
        let mut body = Vec::new();
        for i in 0..(588u32 * 2) {
            let sample = (i % 1000) as i16;
            body.extend_from_slice(&sample.to_le_bytes());
            body.extend_from_slice(&(-sample).to_le_bytes());
        }
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&((36 + body.len()) as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&44100u32.to_le_bytes());
        wav.extend_from_slice(&(44100u32 * 4).to_le_bytes());
        wav.extend_from_slice(&4u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(body.len() as u32).to_le_bytes());
        wav.extend_from_slice(&body);
        std::fs::write(dir.path().join("track.wav"), &wav).unwrap();
        std::fs::write(
            dir.path().join("track.cue"),
            "FILE \"track.wav\" WAVE\n  TRACK 01 AUDIO\n    INDEX 01 00:00:00\n",
        )
        .unwrap();

        let mut image = CueImage::open(&dir.path().join("track.cue")).unwrap();
        assert_eq!(image.toc().leadout_lba(), 2);
        assert_eq!(image.toc().tracks[1].control & CTRL_DATA, 0);

        let mut frame = [0u8; FRAME_SIZE];
        image.read_raw_sector(1, &mut frame).unwrap();
        // Sector 1 starts at frame 588: sample 588 % 1000 = 588.
        assert_eq!(&frame[..2], &588i16.to_le_bytes());
        assert_eq!(&frame[2..4], &(-588i16).to_le_bytes());
    }

    #[test]
    fn unknown_cue_directives_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.cue"), "BOGUS thing\n").unwrap();
        assert!(matches!(
            CueImage::open(&dir.path().join("bad.cue")),
            Err(ImageError::Parse(_))
        ));
    }
}
