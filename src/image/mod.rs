//! Image backends. Every backend exposes the same contract: raw
//! 2448-byte disc frames addressed by signed LBA, a cheap
//! subchannel-only path, and a derived TOC.

pub mod audio;
pub mod ccd;
pub mod chd;
pub mod cue;
pub mod error;
pub mod format;
pub mod layout;

use std::path::Path;

use crate::cd::sector::{encode_mode1_sector, encode_mode2_form2_sector};
use crate::cd::toc::Toc;
use crate::cd::{FRAME_SIZE, SUBCODE_SIZE, lba_to_aba};
use error::ImageResult;
use format::DiFormat;

pub trait DiscImage {
    /// Read one frame: 2352 raw sector bytes followed by 96 interleaved
    /// subchannel bytes. Negative LBAs address the pre-program pause,
    /// LBAs at or past the lead-out are synthesized.
    fn read_raw_sector(&mut self, lba: i32, frame: &mut [u8; FRAME_SIZE]) -> ImageResult<()>;

    /// Produce only the interleaved subchannel block, without touching
    /// the main data stream or any mutable state. Returns false when
    /// the subchannel for this sector cannot be synthesized (it lives
    /// in the data stream and needs a full read).
    fn fast_read_subchannel(&self, lba: i32, subpw: &mut [u8; SUBCODE_SIZE]) -> bool;

    fn toc(&self) -> &Toc;
}

/// Open a disc image, selecting the backend by file extension. Sheets
/// (`.cue`, `.toc`) reference their payload files relative to the
/// sheet. Unrecognized extensions fall through to the sheet backend,
/// which rejects anything that does not parse as either dialect.
pub fn open(path: &Path) -> ImageResult<Box<dyn DiscImage>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "chd" => Ok(Box::new(chd::ChdImage::open(path)?)),
        "ccd" => Ok(Box::new(ccd::CcdImage::open(path)?)),
        _ => Ok(Box::new(cue::CueImage::open(path)?)),
    }
}

/// Payload for a gap sector of a given track format: silence for
/// audio, a regenerated empty data sector otherwise.
pub(crate) fn synth_gap_payload(format: DiFormat, lba: i32, sector: &mut [u8]) {
    match format {
        DiFormat::Audio => {}
        DiFormat::Mode1 | DiFormat::Mode1Raw => encode_mode1_sector(lba_to_aba(lba), sector),
        _ => {
            sector[12 + 6] = 0x20;
            sector[12 + 10] = 0x20;
            encode_mode2_form2_sector(lba_to_aba(lba), sector);
        }
    }
}
