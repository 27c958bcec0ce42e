//! Optional software audio codecs used to re-encode AC3 and LPCM into MPEG
//! audio the decoder can keep in sync.

use crate::utils::errors::CodecError;

/// Bytes of 16-bit stereo PCM consumed by one MPEG audio frame
/// (1152 samples × 2 channels × 2 bytes).
pub const PCM_FRAME_BYTES: usize = 4608;

pub trait Ac3Decoder {
    /// Decodes one AC3 payload into interleaved stereo samples.
    fn decode(&mut self, frame: &[u8]) -> Result<Vec<i16>, CodecError>;
}

/// MPEG-1 layer II encoder at 48 kHz / 192 kbps.
pub trait MpegAudioEncoder {
    fn encode(&mut self, pcm: &[u8; PCM_FRAME_BYTES]) -> Result<Vec<u8>, CodecError>;
}

impl<T: Ac3Decoder + ?Sized> Ac3Decoder for Box<T> {
    fn decode(&mut self, frame: &[u8]) -> Result<Vec<i16>, CodecError> {
        (**self).decode(frame)
    }
}

impl<T: MpegAudioEncoder + ?Sized> MpegAudioEncoder for Box<T> {
    fn encode(&mut self, pcm: &[u8; PCM_FRAME_BYTES]) -> Result<Vec<u8>, CodecError> {
        (**self).encode(pcm)
    }
}

/// Serialises samples as little-endian bytes, the layout the encoder expects.
pub fn samples_to_bytes(samples: &[i16], dst: &mut Vec<u8>) {
    dst.reserve(samples.len() * 2);
    for s in samples {
        dst.extend_from_slice(&s.to_le_bytes());
    }
}

/// Converts big-endian LPCM words in place, dropping a trailing odd byte.
pub fn swap_lpcm(src: &[u8], dst: &mut Vec<u8>) {
    for pair in src.chunks_exact(2) {
        dst.extend_from_slice(&[pair[1], pair[0]]);
    }
}

#[test]
fn pcm_byte_layouts() {
    let mut out = Vec::new();
    samples_to_bytes(&[1, -2], &mut out);
    assert_eq!(out, [0x01, 0x00, 0xFE, 0xFF]);

    out.clear();
    swap_lpcm(&[0x12, 0x34, 0x56, 0x78, 0x9A], &mut out);
    assert_eq!(out, [0x34, 0x12, 0x78, 0x56]);
}
