//! Decoded audio sources for cue/TOC tracks stored as WAV or FLAC
//! files instead of raw PCM. Every reader yields 44.1 kHz stereo
//! 16-bit frames addressed by absolute frame number.

pub mod flac;
pub mod wav;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::image::error::{ImageError, ImageResult};

pub trait AudioReader: Send {
    /// Copy up to `out.len() / 2` frames starting at `frame_offset`
    /// into `out` (interleaved L/R). Returns the number of frames
    /// actually available; the tail of `out` is untouched past it.
    fn read_frames(&mut self, frame_offset: u64, out: &mut [i16]) -> ImageResult<u64>;

    fn frame_count(&self) -> u64;
}

/// Open an audio file, picking the decoder by magic bytes.
pub fn open_audio(path: &Path) -> ImageResult<Box<dyn AudioReader>> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    match &magic {
        b"RIFF" => Ok(Box::new(wav::WavReader::open(file)?)),
        b"fLaC" => Ok(Box::new(flac::FlacReader::open(file)?)),
        _ => Err(ImageError::Unsupported(format!(
            "audio track file format of {}",
            path.display()
        ))),
    }
}
