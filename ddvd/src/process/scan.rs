//! Whole-stream statistics for a sector dump.
//!
//! The scanner runs every sector through the classifier with the selection
//! set to the sector's own stream, so every audio and subpicture stream is
//! accounted for instead of only the active ones.

use std::collections::BTreeMap;

use log::trace;

use crate::process::classify::{ClassifyContext, SectorClassifier};
use crate::process::spu_decode::SpuDecoder;
use crate::structs::pes::{PRIVATE_STREAM_1, PesHeader, PtsEncoding};
use crate::structs::spu::{BoundingBox, SpuKind};
use crate::structs::stream::{AudioFormat, StreamClassification};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioStreamStats {
    pub format: AudioFormat,
    pub sectors: u64,
    pub first_pts: Option<u64>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SpuStreamStats {
    pub sectors: u64,
    pub subtitles: u64,
    pub highlight_masks: u64,
    pub malformed: u64,
}

impl SpuStreamStats {
    pub fn packets(&self) -> u64 {
        self.subtitles + self.highlight_masks + self.malformed
    }
}

/// One decoded subpicture, in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpuRecord {
    pub stream_id: u8,
    pub pts: u64,
    pub bbox: BoundingBox,
    pub kind: SpuKind,
    /// Tenths of a second, -1 when the packet never stops itself.
    pub display_time: i32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub sectors: u64,
    pub video_sectors: u64,
    pub other_sectors: u64,
    /// Sectors without a PES packet (padding, navigation packs).
    pub non_pes_sectors: u64,
    pub first_video_pts: Option<u64>,
    pub last_video_pts: Option<u64>,
    pub audio: BTreeMap<u8, AudioStreamStats>,
    pub subpicture: BTreeMap<u8, SpuStreamStats>,
    pub spu_list: Vec<SpuRecord>,
}

impl ScanReport {
    /// Video PTS span in 90 kHz ticks.
    pub fn video_duration(&self) -> Option<u64> {
        Some(self.last_video_pts?.saturating_sub(self.first_video_pts?))
    }
}

#[derive(Debug, Default)]
pub struct StreamScanner {
    classifier: SectorClassifier,
    spu: BTreeMap<u8, SpuDecoder>,
    list_spu: bool,
    report: ScanReport,
}

impl StreamScanner {
    pub fn new(encoding: PtsEncoding, list_spu: bool) -> Self {
        Self {
            classifier: SectorClassifier::new(encoding),
            list_spu,
            ..Default::default()
        }
    }

    pub fn report(&self) -> &ScanReport {
        &self.report
    }

    pub fn finish(self) -> ScanReport {
        self.report
    }

    pub fn push_sector(&mut self, sector: &mut [u8]) {
        self.report.sectors += 1;
        let Some(header) = self.classifier.header(sector) else {
            self.report.non_pes_sectors += 1;
            return;
        };

        let ctx = own_stream_context(&header, sector);
        match self.classifier.classify(sector, &ctx) {
            StreamClassification::Video { pts } => {
                self.report.video_sectors += 1;
                if let Some(pts) = pts {
                    let first = self.report.first_video_pts.get_or_insert(pts);
                    *first = (*first).min(pts);
                    let last = self.report.last_video_pts.get_or_insert(pts);
                    *last = (*last).max(pts);
                }
            }
            StreamClassification::Audio {
                format,
                logical_id,
                pts,
            } => {
                let stats = self
                    .report
                    .audio
                    .entry(logical_id)
                    .or_insert(AudioStreamStats {
                        format,
                        sectors: 0,
                        first_pts: None,
                    });
                stats.sectors += 1;
                if stats.first_pts.is_none() {
                    stats.first_pts = pts;
                }
            }
            StreamClassification::Subpicture { stream_id } => {
                self.subpicture(stream_id, sector, &header);
            }
            StreamClassification::Other => self.report.other_sectors += 1,
        }
    }

    fn subpicture(&mut self, stream_id: u8, sector: &[u8], header: &PesHeader) {
        let stats = self.report.subpicture.entry(stream_id).or_default();
        stats.sectors += 1;

        let decoder = self.spu.entry(stream_id).or_default();
        let Some((spu, pts)) = decoder.push(sector, header) else {
            return;
        };
        trace!("Stream {stream_id}: {:?} at pts {pts}", spu.kind);
        match spu.kind {
            SpuKind::Subtitle => stats.subtitles += 1,
            SpuKind::HighlightMask => stats.highlight_masks += 1,
            SpuKind::Malformed => stats.malformed += 1,
        }
        if self.list_spu {
            self.report.spu_list.push(SpuRecord {
                stream_id,
                pts,
                bbox: spu.bbox,
                kind: spu.kind,
                display_time: spu.display_time,
            });
        }
    }
}

/// Selection that makes the classifier report the sector's own stream.
fn own_stream_context(header: &PesHeader, sector: &[u8]) -> ClassifyContext {
    let mut ctx = ClassifyContext {
        audio_id: -1,
        ..Default::default()
    };
    match header.stream_id {
        id @ 0xC0..=0xC7 => ctx.audio_id = i32::from(id & 0x07),
        PRIVATE_STREAM_1 => match header.substream_id(sector) {
            Some(sub) if sub & 0xE0 == 0x20 => ctx.spu_stream_id = Some(sub & 0x1F),
            Some(sub) => ctx.audio_id = i32::from(sub & 0x07),
            None => {}
        },
        _ => {}
    }
    ctx
}
