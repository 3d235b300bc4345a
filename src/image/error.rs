use std::io;
use thiserror::Error;

pub type ImageResult<T> = Result<T, ImageError>;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    #[error("CHD Error: {0}")]
    Chd(#[from] chd::Error),

    #[error("FLAC Error: {0}")]
    Flac(#[from] claxon::Error),

    #[error("Binary parse error: {0}")]
    BinRw(#[from] binrw::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Layout error: {0}")]
    Layout(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("No track covers sector {0}")]
    SectorRange(i32),
}
