use log::trace;

use crate::structs::config::{TvAspect, TvMode};
use crate::structs::nav::MAX_AUDIO_STREAMS;
use crate::structs::pes::{PRIVATE_STREAM_1, PesHeader, PtsEncoding};
use crate::structs::stream::{AudioFormat, StreamClassification};

/// Upper bound of the cached I-frame.
pub const IFRAME_CAPACITY: usize = 320 * 1024;

/// Sector offsets where a sequence header may start in the first video packet.
const SEQUENCE_HEADER_OFFSETS: [usize; 2] = [33, 36];

/// Detected coding of each logical audio stream of the title set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormatTable {
    formats: [Option<AudioFormat>; MAX_AUDIO_STREAMS],
}

impl AudioFormatTable {
    pub fn reset(&mut self) {
        self.formats = [None; MAX_AUDIO_STREAMS];
    }

    pub fn get(&self, logical_id: usize) -> Option<AudioFormat> {
        self.formats.get(logical_id).copied().flatten()
    }

    pub fn set(&mut self, logical_id: usize, format: AudioFormat) {
        if let Some(slot) = self.formats.get_mut(logical_id) {
            *slot = Some(format);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, AudioFormat)> + '_ {
        self.formats
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.map(|f| (i, f)))
    }
}

/// Stream selection and display settings the classifier needs per sector.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyContext {
    pub audio_id: i32,
    pub spu_stream_id: Option<u8>,
    pub dvd_aspect: u8,
    pub tv_aspect: TvAspect,
    pub tv_mode: TvMode,
    /// A cell or VOBU still is pending; I-frames are worth caching.
    pub still: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IframeSend {
    #[default]
    Idle,
    /// The cached frame goes out on the next loop iteration.
    Pending,
    /// Sent this iteration; returns to `Idle` on the next one.
    Sent,
}

/// Last complete I-frame of the video stream, kept for still-frame redisplay.
#[derive(Debug, Default)]
pub struct IframeCapture {
    frame: Vec<u8>,
    run: u8,
    send: IframeSend,
}

impl IframeCapture {
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    pub fn send_state(&self) -> IframeSend {
        self.send
    }

    pub fn reset(&mut self) {
        self.frame.clear();
        self.run = 0;
        self.send = IframeSend::Idle;
    }

    /// Schedules a redisplay if a frame is cached and none is in flight.
    pub fn request_redisplay(&mut self) {
        if self.send == IframeSend::Idle && !self.frame.is_empty() {
            self.send = IframeSend::Pending;
        }
    }

    /// Advances the send state once per loop iteration. Returns the PES
    /// packet to write when a redisplay is due and a still is active.
    pub fn take_redisplay(&mut self, still: bool) -> Option<Vec<u8>> {
        match self.send {
            IframeSend::Idle => None,
            IframeSend::Sent => {
                self.send = IframeSend::Idle;
                None
            }
            IframeSend::Pending => {
                self.send = IframeSend::Sent;
                if !still || self.frame.is_empty() {
                    return None;
                }
                let pes = redisplay_pes(&self.frame);
                self.frame.clear();
                Some(pes)
            }
        }
    }

    /// Scans one video packet for picture and sequence headers and appends
    /// its payload while an I-frame is being received. Only elementary
    /// stream bytes are cached; the packet's own PES header is not, so the
    /// redisplay packet never nests one PES inside another.
    pub fn scan(&mut self, sector: &[u8], header: &PesHeader, still: bool) {
        let start = header.payload_offset();
        let end = header.end(sector.len());
        if start >= end {
            return;
        }
        let es = &sector[start..end];

        let continues_frame = self.run == 0x01 && !es.starts_with(&[0x00, 0x00, 0x01]);
        let mut have_picture_header = false;
        let mut have_slice = false;
        let mut run_set = false;

        let mut pos = start;
        while pos + 6 <= end {
            if sector[pos..pos + 3] == [0x00, 0x00, 0x01] {
                match sector[pos + 3] {
                    0x00 => {
                        if !run_set {
                            self.run = (sector[pos + 5] >> 3) & 0x07;
                            run_set = true;
                        }
                        if (0x01..=0x03).contains(&self.run) {
                            have_picture_header = true;
                            break;
                        }
                    }
                    0xB3 if pos + 8 <= end => {
                        self.frame.clear();
                        pos += 8;
                        continue;
                    }
                    0xBE => break,
                    0x01..=0xAF => {
                        if !have_picture_header && self.frame.is_empty() {
                            have_slice = true;
                        }
                    }
                    _ => {}
                }
            }
            pos += 1;
        }

        if (self.run <= 0x01 || continues_frame) && still {
            if have_slice {
                self.run = 0xFF;
            } else if self.frame.len() + es.len() <= IFRAME_CAPACITY {
                self.frame.extend_from_slice(es);
            }
        }
    }
}

/// Wraps a cached frame into a video PES carrying it twice, which makes the
/// decoder output the first copy.
pub fn redisplay_pes(frame: &[u8]) -> Vec<u8> {
    let payload = frame.len() * 2 + 3;
    let len = if payload > 0xFFFF { 0 } else { payload as u16 };
    let mut pes = Vec::with_capacity(frame.len() * 2 + 9);
    pes.extend_from_slice(&[0x00, 0x00, 0x01, 0xE0]);
    pes.extend_from_slice(&len.to_be_bytes());
    pes.extend_from_slice(&[0x80, 0x00, 0x00]);
    pes.extend_from_slice(frame);
    pes.extend_from_slice(frame);
    pes
}

/// Rewrites the sequence-header aspect nibble to 16:9 so a decoder without a
/// zoom mode shows the picture anamorphic.
pub fn patch_aspect(sector: &mut [u8], ctx: &ClassifyContext) -> bool {
    let scaled_mode = matches!(ctx.tv_mode, TvMode::Letterbox | TvMode::PanScan);
    if ctx.dvd_aspect != 3 || !ctx.tv_aspect.is_wide() || !scaled_mode {
        return false;
    }
    let mut patched = false;
    for off in SEQUENCE_HEADER_OFFSETS {
        if sector.get(off..off + 4) == Some(&[0x00, 0x00, 0x01, 0xB3][..]) {
            if let Some(b) = sector.get_mut(off + 7) {
                *b = (*b & 0x0F) | 0x30;
                patched = true;
            }
        }
    }
    patched
}

/// Sorts sectors into streams and maintains the per-title stream tables.
#[derive(Debug, Default)]
pub struct SectorClassifier {
    encoding: PtsEncoding,
    formats: AudioFormatTable,
    iframe: IframeCapture,
}

impl SectorClassifier {
    pub fn new(encoding: PtsEncoding) -> Self {
        Self {
            encoding,
            ..Default::default()
        }
    }

    pub fn formats(&self) -> &AudioFormatTable {
        &self.formats
    }

    pub fn formats_mut(&mut self) -> &mut AudioFormatTable {
        &mut self.formats
    }

    pub fn iframe(&self) -> &IframeCapture {
        &self.iframe
    }

    pub fn iframe_mut(&mut self) -> &mut IframeCapture {
        &mut self.iframe
    }

    pub fn pts_encoding(&self) -> PtsEncoding {
        self.encoding
    }

    pub fn header(&self, sector: &[u8]) -> Option<PesHeader> {
        PesHeader::parse(sector, self.encoding)
    }

    /// Classifies one sector. Video sectors are patched in place and scanned
    /// for I-frames as a side effect.
    pub fn classify(&mut self, sector: &mut [u8], ctx: &ClassifyContext) -> StreamClassification {
        let Some(header) = self.header(sector) else {
            return StreamClassification::Other;
        };

        match header.stream_id {
            id if id & 0xF0 == 0xE0 => {
                patch_aspect(sector, ctx);
                self.iframe.scan(sector, &header, ctx.still);
                StreamClassification::Video { pts: header.pts }
            }
            id @ 0xC0..=0xC7 => self.audio(AudioFormat::Mpeg, id & 0x07, &header, ctx),
            PRIVATE_STREAM_1 => {
                let Some(sub) = header.substream_id(sector) else {
                    return StreamClassification::Other;
                };
                match sub & 0xF8 {
                    0x80 => self.audio(AudioFormat::Ac3, sub & 0x07, &header, ctx),
                    0x88 => self.audio(AudioFormat::Dts, sub & 0x07, &header, ctx),
                    0xA0 => self.audio(AudioFormat::Lpcm, sub & 0x07, &header, ctx),
                    _ if sub & 0xE0 == 0x20 => {
                        let stream_id = sub & 0x1F;
                        if ctx.spu_stream_id == Some(stream_id) {
                            StreamClassification::Subpicture { stream_id }
                        } else {
                            StreamClassification::Other
                        }
                    }
                    _ => StreamClassification::Other,
                }
            }
            _ => StreamClassification::Other,
        }
    }

    fn audio(
        &mut self,
        format: AudioFormat,
        logical_id: u8,
        header: &PesHeader,
        ctx: &ClassifyContext,
    ) -> StreamClassification {
        self.formats.set(usize::from(logical_id), format);
        if i32::from(logical_id) != ctx.audio_id {
            return StreamClassification::Other;
        }
        trace!("{format} audio sector, stream {logical_id}, pts {:?}", header.pts);
        StreamClassification::Audio {
            format,
            logical_id,
            pts: header.pts,
        }
    }
}

#[cfg(test)]
pub(crate) fn private_sector(sub_id: u8, pts: Option<u64>, payload: &[u8]) -> Vec<u8> {
    pes_sector(PRIVATE_STREAM_1, pts, &[&[sub_id][..], payload].concat())
}

/// Builds a test sector with a pack header and one PES packet.
#[cfg(test)]
pub(crate) fn pes_sector(stream_id: u8, pts: Option<u64>, payload: &[u8]) -> Vec<u8> {
    use crate::structs::pes::{SECTOR_SIZE, encode_pts};

    let mut sector = vec![0u8; SECTOR_SIZE];
    sector[..4].copy_from_slice(&[0x00, 0x00, 0x01, 0xBA]);
    sector[14..18].copy_from_slice(&[0x00, 0x00, 0x01, stream_id]);
    let hdr_len = if pts.is_some() { 5 } else { 0 };
    let packet_length = 3 + hdr_len + payload.len();
    sector[18..20].copy_from_slice(&(packet_length as u16).to_be_bytes());
    sector[20] = 0x81;
    sector[22] = hdr_len as u8;
    if let Some(pts) = pts {
        sector[21] = 0x80;
        sector[23..28].copy_from_slice(&encode_pts(pts));
    }
    let start = 23 + hdr_len;
    sector[start..start + payload.len()].copy_from_slice(payload);
    sector
}
