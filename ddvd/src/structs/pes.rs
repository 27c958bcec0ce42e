//! PES framing inside a 2048-byte program-stream sector.
//!
//! Every sector starts with a 14-byte pack header; the PES packet follows
//! at [`PES_OFFSET`]. Only the fields the engine needs are decoded.

pub const SECTOR_SIZE: usize = 2048;
pub const PES_OFFSET: usize = 14;

/// PES stream id of private stream 1 (AC3, DTS, LPCM, subpictures).
pub const PRIVATE_STREAM_1: u8 = 0xBD;

/// Timestamp layout used when reconstructing the PTS.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PtsEncoding {
    /// Full 33-bit value.
    #[default]
    Standard,
    /// 32-bit value with the least significant bit dropped.
    Legacy32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesHeader {
    pub stream_id: u8,
    /// `PES_packet_length`, not counting the 6 leading bytes.
    pub packet_length: usize,
    pub header_data_length: usize,
    pub pts: Option<u64>,
}

impl PesHeader {
    /// Parses the PES header of a sector. Returns `None` if the sector does
    /// not carry a PES packet start code at [`PES_OFFSET`].
    pub fn parse(sector: &[u8], encoding: PtsEncoding) -> Option<Self> {
        let pes = sector.get(PES_OFFSET..PES_OFFSET + 9)?;
        if pes[..3] != [0x00, 0x00, 0x01] {
            return None;
        }

        let header_data_length = pes[8] as usize;
        let pts = if pes[7] & 0x80 != 0 {
            let bytes: &[u8; 5] = sector
                .get(PES_OFFSET + 9..PES_OFFSET + 14)?
                .try_into()
                .ok()?;
            Some(match encoding {
                PtsEncoding::Standard => pts_standard(bytes),
                PtsEncoding::Legacy32 => u64::from(pts_legacy(bytes)),
            })
        } else {
            None
        };

        Some(Self {
            stream_id: pes[3],
            packet_length: (pes[4] as usize) << 8 | pes[5] as usize,
            header_data_length,
            pts,
        })
    }

    /// Length of the PES header including the 9 fixed bytes.
    pub fn header_len(&self) -> usize {
        9 + self.header_data_length
    }

    /// Sector offset of the first payload byte.
    pub fn payload_offset(&self) -> usize {
        PES_OFFSET + self.header_len()
    }

    /// Sector offset one past the last byte of the packet, clipped to the sector.
    pub fn end(&self, sector_len: usize) -> usize {
        (PES_OFFSET + 6 + self.packet_length).min(sector_len)
    }

    /// Sub-stream id of a private stream 1 packet.
    pub fn substream_id(&self, sector: &[u8]) -> Option<u8> {
        if self.stream_id != PRIVATE_STREAM_1 {
            return None;
        }
        sector.get(self.payload_offset()).copied()
    }
}

/// Reconstructs a 33-bit PTS from the 5 timestamp bytes of a PES header.
pub fn pts_standard(b: &[u8; 5]) -> u64 {
    (u64::from(b[0] >> 1) & 7) << 30
        | u64::from(b[1]) << 22
        | u64::from(b[2] >> 1) << 15
        | u64::from(b[3]) << 7
        | u64::from(b[4] >> 1)
}

/// Reconstructs the 32-bit legacy PTS (`pts >> 1`) from the same bytes.
pub fn pts_legacy(b: &[u8; 5]) -> u32 {
    (u32::from(b[0] >> 1) & 7) << 29
        | u32::from(b[1]) << 21
        | u32::from(b[2] >> 1) << 14
        | u32::from(b[3]) << 6
        | u32::from(b[4] >> 2)
}

/// Encodes a 33-bit PTS into PES timestamp bytes (`0010` prefix, marker bits set).
pub fn encode_pts(pts: u64) -> [u8; 5] {
    [
        0x21 | ((pts >> 29) & 0x0E) as u8,
        (pts >> 22) as u8,
        0x01 | ((pts >> 14) & 0xFE) as u8,
        (pts >> 7) as u8,
        0x01 | ((pts << 1) & 0xFE) as u8,
    ]
}
