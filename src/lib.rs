//! Access layer for optical disc images. Cue/TOC sheets, CloneCD sets
//! and CHD containers are all presented as the same thing: a table of
//! contents plus raw 2352+96 byte disc frames addressed by signed LBA,
//! with gaps, lead-in and lead-out synthesized where the image has no
//! backing data.

pub mod cd;
pub mod image;
