//! SBI sidecar files: fixed 14-byte records replacing the Q payload of
//! individual sectors, used to preserve deliberate subchannel anomalies
//! that sheet-driven synthesis would otherwise paper over.

use std::io::Cursor;
use std::path::Path;

use binrw::{BinRead, BinReaderExt};

use crate::cd::{amsf_to_aba, bcd_is_valid, bcd_to_u8};
use crate::image::error::{ImageError, ImageResult};
use crate::image::layout::SubQReplaceMap;

const SBI_RECORD_SIZE: usize = 14;

#[derive(BinRead, Debug)]
struct SbiRecord {
    msf: [u8; 3],
    #[br(assert(marker == 0x01, "unrecognized SBI record type {:#04x}", marker))]
    marker: u8,
    payload: [u8; 10],
}

#[derive(BinRead, Debug)]
#[br(magic = b"SBI\0")]
struct SbiHeader;

/// Parse an SBI file into a replacement map keyed by ABA. A truncated
/// final record is ignored, matching what common rippers emit.
pub fn load_sbi(path: &Path) -> ImageResult<SubQReplaceMap> {
    let data = std::fs::read(path)?;
    let mut reader = Cursor::new(&data);
    let _: SbiHeader = reader.read_le()?;
    let body = &data[reader.position() as usize..];

    let mut map = SubQReplaceMap::new();
    for chunk in body.chunks_exact(SBI_RECORD_SIZE) {
        let record: SbiRecord = Cursor::new(chunk).read_le()?;
        let [m, s, f] = record.msf;
        if !bcd_is_valid(m) || !bcd_is_valid(s) || !bcd_is_valid(f) {
            return Err(ImageError::Parse(format!(
                "bad BCD MSF offset in SBI file: {m:02x}:{s:02x}:{f:02x}"
            )));
        }
        let aba = amsf_to_aba(bcd_to_u8(m), bcd_to_u8(s), bcd_to_u8(f));
        map.insert(aba, record.payload);
    }
    Ok(map)
}
