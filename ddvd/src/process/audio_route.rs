//! Audio routing: pass-through to the decoder or software re-encoding.
//!
//! AC3 without pass-through and LPCM are turned into MPEG audio so the
//! decoder can keep them in sync with the picture. The PES header of the
//! source packet (and with it the PTS) is reused for the re-encoded frames.

use log::{debug, warn};

use crate::structs::codec::{
    Ac3Decoder, MpegAudioEncoder, PCM_FRAME_BYTES, samples_to_bytes, swap_lpcm,
};
use crate::structs::pes::{PES_OFFSET, PesHeader};
use crate::structs::sink::BypassMode;
use crate::structs::stream::AudioFormat;
use crate::utils::errors::CodecError;

/// Bytes between the sub-stream id and the AC3 frame data.
const AC3_PAYLOAD_SKIP: usize = 4;
/// Bytes between the sub-stream id and the LPCM samples.
const LPCM_PAYLOAD_SKIP: usize = 7;
/// Largest value of the PES packet length field.
const MAX_PES_LENGTH: usize = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioRoute {
    PassThrough(BypassMode),
    /// AC3 → PCM → MPEG audio.
    Decode,
    /// LPCM → MPEG audio.
    Reencode,
}

impl AudioRoute {
    pub fn bypass(self) -> BypassMode {
        match self {
            AudioRoute::PassThrough(mode) => mode,
            AudioRoute::Decode | AudioRoute::Reencode => BypassMode::Mpeg,
        }
    }
}

/// Codec capabilities resolved at startup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CodecSupport {
    pub ac3_decoder: bool,
    pub mpeg_encoder: bool,
    pub ac3_passthrough: bool,
}

pub fn select_route(format: AudioFormat, codecs: CodecSupport) -> AudioRoute {
    match format {
        AudioFormat::Mpeg => AudioRoute::PassThrough(BypassMode::Mpeg),
        AudioFormat::Dts => AudioRoute::PassThrough(BypassMode::Dts),
        AudioFormat::Ac3 => {
            if codecs.ac3_passthrough || !codecs.ac3_decoder || !codecs.mpeg_encoder {
                AudioRoute::PassThrough(BypassMode::Ac3)
            } else {
                AudioRoute::Decode
            }
        }
        AudioFormat::Lpcm if codecs.mpeg_encoder => AudioRoute::Reencode,
        AudioFormat::Lpcm => AudioRoute::PassThrough(BypassMode::Lpcm),
    }
}

/// PCM accumulated towards the next 4608-byte encoder frame, plus the PES
/// header the encoded frames go out with.
#[derive(Debug, Default)]
pub struct PcmResync {
    header: Vec<u8>,
    pcm: Vec<u8>,
}

impl PcmResync {
    pub fn reset(&mut self) {
        self.header.clear();
        self.pcm.clear();
    }

    pub fn pending(&self) -> usize {
        self.pcm.len()
    }

    fn keep_header(&mut self, sector: &[u8], header: &PesHeader) {
        self.header.clear();
        self.header
            .extend_from_slice(&sector[PES_OFFSET..header.payload_offset()]);
    }

    /// Encodes all complete frames into MPEG audio PES packets. Output that
    /// does not fit one packet continues in packets without a PTS.
    fn encode_frames<E: MpegAudioEncoder + ?Sized>(
        &mut self,
        encoder: &mut E,
    ) -> Result<Option<Vec<u8>>, CodecError> {
        let frames = self.pcm.len() / PCM_FRAME_BYTES;
        if frames == 0 || self.header.len() < 6 {
            return Ok(None);
        }

        let mut es = Vec::new();
        for frame in self.pcm.chunks_exact(PCM_FRAME_BYTES) {
            let Ok(frame) = <&[u8; PCM_FRAME_BYTES]>::try_from(frame) else {
                continue;
            };
            es.extend_from_slice(&encoder.encode(frame)?);
        }
        self.pcm.drain(..frames * PCM_FRAME_BYTES);

        let continuation = [0x00, 0x00, 0x01, 0xC0, 0x00, 0x00, 0x81, 0x00, 0x00];
        let mut out = Vec::with_capacity(es.len() + self.header.len());
        let mut header = self.header.as_slice();
        let mut rest = es.as_slice();
        loop {
            let room = MAX_PES_LENGTH - (header.len() - 6);
            let (chunk, tail) = rest.split_at(rest.len().min(room));
            write_mpeg_pes(&mut out, header, chunk);
            rest = tail;
            if rest.is_empty() {
                break;
            }
            header = &continuation[..];
        }
        Ok(Some(out))
    }

    /// Decodes one AC3 packet and re-encodes whatever complete frames result.
    pub fn push_ac3<D, E>(
        &mut self,
        sector: &[u8],
        header: &PesHeader,
        decoder: &mut D,
        encoder: &mut E,
    ) -> Result<Option<Vec<u8>>, CodecError>
    where
        D: Ac3Decoder + ?Sized,
        E: MpegAudioEncoder + ?Sized,
    {
        let start = header.payload_offset() + AC3_PAYLOAD_SKIP;
        let end = header.end(sector.len());
        if start >= end {
            return Ok(None);
        }
        let samples = decoder.decode(&sector[start..end])?;
        samples_to_bytes(&samples, &mut self.pcm);
        self.keep_header(sector, header);
        self.encode_frames(encoder)
    }

    /// Appends one LPCM packet. Frames go out with the header of the packet
    /// that started them.
    pub fn push_lpcm<E: MpegAudioEncoder + ?Sized>(
        &mut self,
        sector: &[u8],
        header: &PesHeader,
        encoder: &mut E,
    ) -> Result<Option<Vec<u8>>, CodecError> {
        let start = header.payload_offset() + LPCM_PAYLOAD_SKIP;
        let end = header.end(sector.len());
        if start >= end {
            return Ok(None);
        }
        if self.pcm.is_empty() {
            self.keep_header(sector, header);
        }
        swap_lpcm(&sector[start..end], &mut self.pcm);
        if self.pcm.len() < PCM_FRAME_BYTES {
            return Ok(None);
        }
        let pes = self.encode_frames(encoder)?;
        self.keep_header(sector, header);
        Ok(pes)
    }
}

fn write_mpeg_pes(out: &mut Vec<u8>, header: &[u8], payload: &[u8]) {
    let start = out.len();
    out.extend_from_slice(header);
    out.extend_from_slice(payload);
    out[start + 3] = 0xC0;
    let len = (header.len() - 6 + payload.len()) as u16;
    out[start + 4..start + 6].copy_from_slice(&len.to_be_bytes());
}

/// Bytes to hand to the audio sink for one sector.
#[derive(Debug, PartialEq, Eq)]
pub enum AudioOutput<'a> {
    Pes(&'a [u8]),
    Resynced(Vec<u8>),
    Nothing,
}

#[derive(Debug, Default)]
pub struct AudioRouter {
    current: Option<(AudioFormat, AudioRoute)>,
    resync: PcmResync,
}

impl AudioRouter {
    pub fn current(&self) -> Option<(AudioFormat, AudioRoute)> {
        self.current
    }

    /// Resolves the route for `format`. Returns `Some` only when it differs
    /// from the route in use, in which case the sink must be reconfigured
    /// before the next write.
    pub fn switch(&mut self, format: AudioFormat, codecs: CodecSupport) -> Option<AudioRoute> {
        if self.current.is_some_and(|(f, _)| f == format) {
            return None;
        }
        let route = select_route(format, codecs);
        debug!("Audio route for {format}: {route:?}");
        self.current = Some((format, route));
        self.resync.reset();
        Some(route)
    }

    /// Drops buffered PCM, e.g. after a seek.
    pub fn reset_resync(&mut self) {
        self.resync.reset();
    }

    pub fn resync(&self) -> &PcmResync {
        &self.resync
    }

    pub fn process<'a, D, E>(
        &mut self,
        sector: &'a [u8],
        header: &PesHeader,
        ac3: Option<&mut D>,
        encoder: Option<&mut E>,
    ) -> AudioOutput<'a>
    where
        D: Ac3Decoder + ?Sized,
        E: MpegAudioEncoder + ?Sized,
    {
        let Some((format, route)) = self.current else {
            return AudioOutput::Nothing;
        };
        let result = match (route, ac3, encoder) {
            (AudioRoute::PassThrough(_), _, _) => {
                let end = header.end(sector.len());
                return AudioOutput::Pes(&sector[PES_OFFSET..end]);
            }
            (AudioRoute::Decode, Some(ac3), Some(enc)) => {
                self.resync.push_ac3(sector, header, ac3, enc)
            }
            (AudioRoute::Reencode, _, Some(enc)) => self.resync.push_lpcm(sector, header, enc),
            _ => return AudioOutput::Nothing,
        };
        match result {
            Ok(Some(pes)) => AudioOutput::Resynced(pes),
            Ok(None) => AudioOutput::Nothing,
            Err(e) => {
                warn!("Dropping {format} audio packet: {e}");
                self.resync.reset();
                AudioOutput::Nothing
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::classify::private_sector;
    use crate::structs::pes::PtsEncoding;
    use anyhow::Result;

    struct FixedDecoder(usize);

    impl Ac3Decoder for FixedDecoder {
        fn decode(&mut self, _frame: &[u8]) -> Result<Vec<i16>, CodecError> {
            Ok(vec![0x0102; self.0])
        }
    }

    #[derive(Default)]
    struct CountingEncoder {
        frames: Vec<[u8; 4]>,
    }

    impl MpegAudioEncoder for CountingEncoder {
        fn encode(&mut self, pcm: &[u8; PCM_FRAME_BYTES]) -> Result<Vec<u8>, CodecError> {
            self.frames.push([pcm[0], pcm[1], pcm[2], pcm[3]]);
            Ok(vec![0xFF, 0xFD, 0x00, 0x00])
        }
    }

    fn header(sector: &[u8]) -> PesHeader {
        PesHeader::parse(sector, PtsEncoding::Standard).unwrap()
    }

    #[test]
    fn route_selection() {
        let all = CodecSupport {
            ac3_decoder: true,
            mpeg_encoder: true,
            ac3_passthrough: false,
        };
        assert_eq!(
            select_route(AudioFormat::Mpeg, all),
            AudioRoute::PassThrough(BypassMode::Mpeg)
        );
        assert_eq!(
            select_route(AudioFormat::Dts, all),
            AudioRoute::PassThrough(BypassMode::Dts)
        );
        assert_eq!(select_route(AudioFormat::Ac3, all), AudioRoute::Decode);
        assert_eq!(select_route(AudioFormat::Lpcm, all), AudioRoute::Reencode);
        assert_eq!(AudioRoute::Decode.bypass(), BypassMode::Mpeg);

        let thru = CodecSupport {
            ac3_passthrough: true,
            ..all
        };
        assert_eq!(
            select_route(AudioFormat::Ac3, thru),
            AudioRoute::PassThrough(BypassMode::Ac3)
        );

        let none = CodecSupport::default();
        assert_eq!(
            select_route(AudioFormat::Ac3, none),
            AudioRoute::PassThrough(BypassMode::Ac3)
        );
        assert_eq!(
            select_route(AudioFormat::Lpcm, none),
            AudioRoute::PassThrough(BypassMode::Lpcm)
        );
    }

    #[test]
    fn switch_only_on_format_change() {
        let mut router = AudioRouter::default();
        let codecs = CodecSupport::default();
        assert!(router.switch(AudioFormat::Ac3, codecs).is_some());
        assert!(router.switch(AudioFormat::Ac3, codecs).is_none());
        assert_eq!(
            router.switch(AudioFormat::Mpeg, codecs),
            Some(AudioRoute::PassThrough(BypassMode::Mpeg))
        );
    }

    #[test]
    fn passthrough_forwards_the_pes() {
        let mut router = AudioRouter::default();
        router.switch(AudioFormat::Dts, CodecSupport::default());
        let sector = private_sector(0x88, Some(3000), &[1, 2, 3, 4]);
        let h = header(&sector);

        let out = router.process::<FixedDecoder, CountingEncoder>(&sector, &h, None, None);
        assert_eq!(out, AudioOutput::Pes(&sector[14..h.end(sector.len())]));
    }

    #[test]
    fn ac3_is_reencoded_with_its_pts() -> Result<()> {
        let mut resync = PcmResync::default();
        // 6 blocks × 256 samples × 2 channels
        let mut decoder = FixedDecoder(3072);
        let mut encoder = CountingEncoder::default();

        let sector = private_sector(0x80, Some(90_000), &[0x01, 0x00, 0x01, 0x0B, 0x77]);
        let h = header(&sector);
        let pes = resync
            .push_ac3(&sector, &h, &mut decoder, &mut encoder)?
            .unwrap();

        assert_eq!(encoder.frames, [[0x02, 0x01, 0x02, 0x01]]);
        assert_eq!(resync.pending(), 6144 - PCM_FRAME_BYTES);
        assert_eq!(&pes[..4], &[0x00, 0x00, 0x01, 0xC0]);
        assert_eq!(u16::from_be_bytes([pes[4], pes[5]]) as usize, pes.len() - 6);
        assert_eq!(pes.len(), 9 + 5 + 4);
        assert_eq!(header(&[&[0u8; 14][..], &pes[..]].concat()).pts, Some(90_000));
        Ok(())
    }

    #[test]
    fn lpcm_frames_keep_the_first_header() -> Result<()> {
        let mut resync = PcmResync::default();
        let mut encoder = CountingEncoder::default();
        let lpcm_header = [0x01, 0x00, 0x04, 0x00, 0x00, 0x00];
        let samples: Vec<u8> = (0..2000).map(|i| (i % 2) as u8).collect();

        let mut out = Vec::new();
        for (n, pts) in [1000u64, 2000, 3000].into_iter().enumerate() {
            let sector = private_sector(0xA0, Some(pts), &[&lpcm_header[..], &samples[..]].concat());
            let h = header(&sector);
            if let Some(pes) = resync.push_lpcm(&sector, &h, &mut encoder)? {
                out.push((n, pes));
            }
        }

        // 6000 bytes: one frame completes on the third packet.
        assert_eq!(out.len(), 1);
        let (n, pes) = &out[0];
        assert_eq!(*n, 2);
        assert_eq!(header(&[&[0u8; 14][..], &pes[..]].concat()).pts, Some(1000));
        // Big-endian words arrive swapped.
        assert_eq!(encoder.frames, [[0x01, 0x00, 0x01, 0x00]]);
        assert_eq!(resync.pending(), 6000 - PCM_FRAME_BYTES);
        Ok(())
    }

    struct WideEncoder;

    impl MpegAudioEncoder for WideEncoder {
        fn encode(&mut self, _pcm: &[u8; PCM_FRAME_BYTES]) -> Result<Vec<u8>, CodecError> {
            Ok(vec![0x55; 40_000])
        }
    }

    #[test]
    fn oversized_output_is_split_into_packets() -> Result<()> {
        let mut resync = PcmResync::default();
        let mut decoder = FixedDecoder(PCM_FRAME_BYTES);
        let sector = private_sector(0x80, Some(90_000), &[0x01, 0x00, 0x01, 0x0B, 0x77]);
        let h = header(&sector);
        let out = resync
            .push_ac3(&sector, &h, &mut decoder, &mut WideEncoder)?
            .unwrap();

        // 80000 bytes of frames: a full packet with the PTS, then the rest.
        assert_eq!(out.len(), 14 + 80_000 + 9);
        assert_eq!(u16::from_be_bytes([out[4], out[5]]), 0xFFFF);
        assert_eq!(header(&[&[0u8; 14][..], &out[..]].concat()).pts, Some(90_000));

        let second = &out[6 + 0xFFFF..];
        assert_eq!(&second[..4], &[0x00, 0x00, 0x01, 0xC0]);
        assert_eq!(u16::from_be_bytes([second[4], second[5]]) as usize, second.len() - 6);
        assert_eq!(second[7] & 0x80, 0);
        assert!(second[9..].iter().all(|&b| b == 0x55));
        Ok(())
    }
}
