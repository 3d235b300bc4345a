//! Per-track storage formats an image file can hold. The on-disc
//! result is always a full raw sector; cooked formats get their sync,
//! header and checksums regenerated on read.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiFormat {
    #[default]
    Audio,
    Mode1,
    Mode1Raw,
    Mode2,
    Mode2Form1,
    Mode2Form2,
    Mode2Raw,
    CdiRaw,
}

impl DiFormat {
    /// Bytes stored per sector in the image file.
    pub fn sector_bytes(self) -> usize {
        match self {
            DiFormat::Audio => 2352,
            DiFormat::Mode1 => 2048,
            DiFormat::Mode1Raw => 2352,
            DiFormat::Mode2 => 2336,
            DiFormat::Mode2Form1 => 2048,
            DiFormat::Mode2Form2 => 2324,
            DiFormat::Mode2Raw => 2352,
            DiFormat::CdiRaw => 2352,
        }
    }

    pub fn is_data(self) -> bool {
        self != DiFormat::Audio
    }

    /// TRACK mode token in a cue sheet, e.g. `MODE1/2352`.
    pub fn from_cue_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "AUDIO" => Some(DiFormat::Audio),
            "MODE1/2048" => Some(DiFormat::Mode1),
            "MODE1/2352" => Some(DiFormat::Mode1Raw),
            "MODE2/2336" => Some(DiFormat::Mode2),
            "MODE2/2048" => Some(DiFormat::Mode2Form1),
            "MODE2/2324" => Some(DiFormat::Mode2Form2),
            "MODE2/2352" => Some(DiFormat::Mode2Raw),
            "CDI/2352" => Some(DiFormat::CdiRaw),
            _ => None,
        }
    }

    /// TRACK mode token in a cdrdao TOC sheet.
    pub fn from_cdrdao_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "AUDIO" => Some(DiFormat::Audio),
            "MODE1" => Some(DiFormat::Mode1),
            "MODE1_RAW" => Some(DiFormat::Mode1Raw),
            "MODE2" => Some(DiFormat::Mode2),
            "MODE2_FORM1" => Some(DiFormat::Mode2Form1),
            "MODE2_FORM2" => Some(DiFormat::Mode2Form2),
            "MODE2_RAW" => Some(DiFormat::Mode2Raw),
            _ => None,
        }
    }

    /// TYPE field of a CHD CD track metadata string. The `/size`
    /// aliases appear in older containers.
    pub fn from_chd_type(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "AUDIO" => Some(DiFormat::Audio),
            "MODE1" | "MODE1/2048" => Some(DiFormat::Mode1),
            "MODE1_RAW" | "MODE1/2352" => Some(DiFormat::Mode1Raw),
            "MODE2" | "MODE2/2336" | "MODE2_FORM_MIX" => Some(DiFormat::Mode2),
            "MODE2_FORM1" | "MODE2/2048" => Some(DiFormat::Mode2Form1),
            "MODE2_FORM2" | "MODE2/2324" => Some(DiFormat::Mode2Form2),
            "MODE2_RAW" | "MODE2/2352" => Some(DiFormat::Mode2Raw),
            _ => None,
        }
    }
}
