//! Per-sector stream classification.

/// Audio coding of a logical audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Mpeg,
    Ac3,
    Dts,
    Lpcm,
}

impl AudioFormat {
    /// Code reported in `Audio` events; 0 is reserved for "unknown".
    pub fn type_code(self) -> u32 {
        match self {
            AudioFormat::Ac3 => 1,
            AudioFormat::Mpeg => 2,
            AudioFormat::Dts => 3,
            AudioFormat::Lpcm => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AudioFormat::Mpeg => "MPEG",
            AudioFormat::Ac3 => "AC3",
            AudioFormat::Dts => "DTS",
            AudioFormat::Lpcm => "LPCM",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a sector carries, as far as the engine is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamClassification {
    Video {
        pts: Option<u64>,
    },
    /// Audio of the selected logical stream.
    Audio {
        format: AudioFormat,
        logical_id: u8,
        pts: Option<u64>,
    },
    /// A packet of the active subpicture stream.
    Subpicture {
        stream_id: u8,
    },
    Other,
}
