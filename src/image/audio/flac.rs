//! FLAC audio tracks, decoded in full when the sheet is opened so
//! sector reads never pay seek-and-decode latency.

use std::fs::File;

use crate::image::audio::AudioReader;
use crate::image::error::{ImageError, ImageResult};

pub struct FlacReader {
    /// Interleaved L/R samples.
    samples: Vec<i16>,
}

impl FlacReader {
    pub fn open(file: File) -> ImageResult<Self> {
        let mut reader = claxon::FlacReader::new(file)?;

        let info = reader.streaminfo();
        if info.channels != 2 || info.bits_per_sample != 16 {
            return Err(ImageError::Unsupported(
                "FLAC audio tracks must be 16-bit stereo".into(),
            ));
        }
        if info.sample_rate != 44100 {
            return Err(ImageError::Unsupported(format!(
                "FLAC sample rate {} (44100 required)",
                info.sample_rate
            )));
        }

        let mut samples = Vec::with_capacity(info.samples.unwrap_or(0) as usize * 2);
        for sample in reader.samples() {
            samples.push(sample? as i16);
        }

        Ok(FlacReader { samples })
    }
}

impl AudioReader for FlacReader {
    fn read_frames(&mut self, frame_offset: u64, out: &mut [i16]) -> ImageResult<u64> {
        let want = (out.len() / 2) as u64;
        let avail = want.min(self.frame_count().saturating_sub(frame_offset));
        if avail == 0 {
            return Ok(0);
        }

        let start = (frame_offset * 2) as usize;
        let len = (avail * 2) as usize;
        out[..len].copy_from_slice(&self.samples[start..start + len]);
        Ok(avail)
    }

    fn frame_count(&self) -> u64 {
        (self.samples.len() / 2) as u64
    }
}
