//! Table-of-contents model shared by every image backend. Slot 100
//! holds the lead-out; its `lba` doubles as the total sector count.

/// Q subchannel control bits.
pub const CTRL_PRE: u8 = 0x01;
pub const CTRL_DCP: u8 = 0x02;
pub const CTRL_DATA: u8 = 0x04;
pub const CTRL_4CH: u8 = 0x08;

/// Default ADR for position data.
pub const ADR_CURPOS: u8 = 0x01;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiscType {
    #[default]
    CddaOrMode1,
    CdI,
    CdXa,
}

impl DiscType {
    /// Disc type as reported in the PSEC field of TOC point 0xA0.
    pub fn from_point_a0(psec: u8) -> Option<Self> {
        match psec {
            0x00 => Some(DiscType::CddaOrMode1),
            0x10 => Some(DiscType::CdI),
            0x20 => Some(DiscType::CdXa),
            _ => None,
        }
    }

    /// Whether sectors carry the XA subheader layout.
    pub fn is_xa(self) -> bool {
        matches!(self, DiscType::CdI | DiscType::CdXa)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TocTrack {
    pub adr: u8,
    pub control: u8,
    pub lba: i32,
    pub valid: bool,
}

#[derive(Clone, Debug)]
pub struct Toc {
    pub first_track: u8,
    pub last_track: u8,
    pub disc_type: DiscType,
    /// Slots 1..=99 are tracks, slot 100 the lead-out. Slot 0 unused.
    pub tracks: [TocTrack; 101],
}

impl Default for Toc {
    fn default() -> Self {
        Toc {
            first_track: 0,
            last_track: 0,
            disc_type: DiscType::default(),
            tracks: [TocTrack::default(); 101],
        }
    }
}

impl Toc {
    pub fn clear(&mut self) {
        *self = Toc::default();
    }

    pub fn leadout_lba(&self) -> i32 {
        self.tracks[100].lba
    }

    /// Track number containing `lba`, or 0 when it falls before the
    /// first track or past the lead-out.
    pub fn find_track_by_lba(&self, lba: i32) -> u8 {
        for track in self.first_track as i32..=(self.last_track as i32 + 1) {
            let bound = if track == self.last_track as i32 + 1 {
                self.tracks[100].lba
            } else {
                self.tracks[track as usize].lba
            };
            if lba < bound {
                return (track - 1).clamp(0, 99) as u8;
            }
        }
        0
    }
}
