//! Minimal RIFF WAVE reader: uncompressed 16-bit 44.1 kHz stereo PCM
//! only, which is all a cue sheet's WAVE file may legally hold.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use binrw::{BinRead, BinReaderExt};
use byteorder::{ByteOrder, LittleEndian};

use crate::image::audio::AudioReader;
use crate::image::error::{ImageError, ImageResult};

const BYTES_PER_FRAME: u64 = 4;

#[derive(BinRead)]
#[br(little)]
struct ChunkHeader {
    id: [u8; 4],
    size: u32,
}

#[derive(BinRead)]
#[br(little)]
struct FmtChunk {
    audio_format: u16,
    channels: u16,
    sample_rate: u32,
    _byte_rate: u32,
    _block_align: u16,
    bits_per_sample: u16,
}

pub struct WavReader {
    file: BufReader<File>,
    data_start: u64,
    frame_count: u64,
}

impl WavReader {
    pub fn open(file: File) -> ImageResult<Self> {
        let mut file = BufReader::new(file);

        let mut riff = [0u8; 12];
        file.read_exact(&mut riff)?;
        if &riff[..4] != b"RIFF" || &riff[8..] != b"WAVE" {
            return Err(ImageError::Parse("not a RIFF WAVE file".into()));
        }

        let mut fmt: Option<FmtChunk> = None;
        let mut data: Option<(u64, u64)> = None;

        while data.is_none() {
            let header: ChunkHeader = match file.read_le() {
                Ok(header) => header,
                Err(binrw::Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };

            match &header.id {
                b"fmt " => {
                    let chunk: FmtChunk = file.read_le()?;
                    let skip = header.size as i64 - 16;
                    if skip > 0 {
                        file.seek(SeekFrom::Current(skip))?;
                    }
                    fmt = Some(chunk);
                }
                b"data" => {
                    data = Some((file.stream_position()?, header.size as u64));
                }
                _ => {
                    // Chunks are word aligned, odd sizes carry a pad byte.
                    file.seek(SeekFrom::Current(header.size as i64 + (header.size & 1) as i64))?;
                }
            }
        }

        let fmt = fmt.ok_or_else(|| ImageError::Parse("WAVE file has no fmt chunk".into()))?;
        let (data_start, data_size) =
            data.ok_or_else(|| ImageError::Parse("WAVE file has no data chunk".into()))?;

        if fmt.audio_format != 1 || fmt.channels != 2 || fmt.bits_per_sample != 16 {
            return Err(ImageError::Unsupported(
                "WAVE audio tracks must be uncompressed 16-bit stereo PCM".into(),
            ));
        }
        if fmt.sample_rate != 44100 {
            return Err(ImageError::Unsupported(format!(
                "WAVE sample rate {} (44100 required)",
                fmt.sample_rate
            )));
        }

        Ok(WavReader {
            file,
            data_start,
            frame_count: data_size / BYTES_PER_FRAME,
        })
    }
}

impl AudioReader for WavReader {
    fn read_frames(&mut self, frame_offset: u64, out: &mut [i16]) -> ImageResult<u64> {
        let want = (out.len() / 2) as u64;
        let avail = want.min(self.frame_count.saturating_sub(frame_offset));
        if avail == 0 {
            return Ok(0);
        }

        self.file
            .seek(SeekFrom::Start(self.data_start + frame_offset * BYTES_PER_FRAME))?;

        let mut raw = vec![0u8; (avail * BYTES_PER_FRAME) as usize];
        self.file.read_exact(&mut raw)?;
        LittleEndian::read_i16_into(&raw, &mut out[..(avail as usize) * 2]);
        Ok(avail)
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
