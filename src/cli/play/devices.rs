//! File-backed presentation devices.
//!
//! A [`FileSink`] writes the PES bytes it receives to a file (or drops them)
//! and treats every written picture as presented at once, optionally paced
//! to the wall clock.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use ddvd::structs::pes::pts_standard;
use ddvd::structs::sink::{
    BypassMode, DisplayPolicy, MediaSink, Overlay, OverlaySurface, VideoEvent,
};
use ddvd::utils::errors::SinkError;

const SEQUENCE_HEADER: [u8; 4] = [0x00, 0x00, 0x01, 0xB3];

struct Pacer {
    origin: Instant,
    first_pts: u64,
}

impl Pacer {
    fn wait_for(&self, pts: u64) {
        let due = Duration::from_millis(pts.saturating_sub(self.first_pts) / 90);
        if let Some(ahead) = due.checked_sub(self.origin.elapsed()) {
            thread::sleep(ahead.min(Duration::from_secs(1)));
        }
    }
}

pub struct FileSink {
    name: &'static str,
    path: Option<PathBuf>,
    out: Option<BufWriter<File>>,
    tracks_video: bool,
    realtime: bool,
    pacer: Option<Pacer>,
    presented_pts: u64,
    size: Option<(i32, i32, i32)>,
    events: VecDeque<VideoEvent>,
    written: u64,
}

impl FileSink {
    pub fn video(path: Option<PathBuf>, realtime: bool) -> Self {
        Self::new("video", path, true, realtime)
    }

    pub fn audio(path: Option<PathBuf>) -> Self {
        Self::new("audio", path, false, false)
    }

    fn new(name: &'static str, path: Option<PathBuf>, tracks_video: bool, realtime: bool) -> Self {
        Self {
            name,
            path,
            out: None,
            tracks_video,
            realtime,
            pacer: None,
            presented_pts: 0,
            size: None,
            events: VecDeque::new(),
            written: 0,
        }
    }

    fn op_error(&self, op: &'static str, e: std::io::Error) -> SinkError {
        SinkError::Device {
            op,
            reason: format!("{} device: {e}", self.name),
        }
    }

    fn flush(&mut self, op: &'static str) -> Result<(), SinkError> {
        if let Some(out) = self.out.as_mut() {
            if let Err(e) = out.flush() {
                return Err(self.op_error(op, e));
            }
        }
        Ok(())
    }

    fn track_picture(&mut self, bytes: &[u8]) {
        if let Some(pts) = pes_pts(bytes) {
            if self.realtime {
                let pacer = self.pacer.get_or_insert_with(|| Pacer {
                    origin: Instant::now(),
                    first_pts: pts,
                });
                pacer.wait_for(pts);
            }
            self.presented_pts = pts;
        }

        if let Some(size) = sequence_size(bytes) {
            if self.size != Some(size) {
                let (width, height, aspect) = size;
                log::debug!("Video size {width}x{height}, aspect code {aspect}");
                self.size = Some(size);
                self.events.push_back(VideoEvent::SizeChanged {
                    width,
                    height,
                    aspect,
                });
            }
        }
    }
}

impl MediaSink for FileSink {
    fn open(&mut self) -> Result<(), SinkError> {
        if let Some(path) = &self.path {
            let file = File::create(path)
                .map_err(|e| SinkError::Open(format!("{}: {e}", path.display())))?;
            log::info!("Writing {} stream to {}", self.name, path.display());
            self.out = Some(BufWriter::new(file));
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Err(e) = self.flush("close") {
            log::warn!("{e}");
        }
        log::debug!("{} device closed after {} bytes", self.name, self.written);
        self.out = None;
    }

    fn write_pes(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        if self.tracks_video {
            self.track_picture(bytes);
        }
        if let Some(out) = self.out.as_mut() {
            if let Err(e) = out.write_all(bytes) {
                return Err(self.op_error("write", e));
            }
        }
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn set_bypass_mode(&mut self, mode: BypassMode) -> Result<(), SinkError> {
        log::debug!("{} bypass mode {mode:?}", self.name);
        Ok(())
    }

    fn set_display_policy(&mut self, policy: DisplayPolicy) -> Result<(), SinkError> {
        log::debug!(
            "Display policy {:?} {:?}",
            policy.aspect,
            policy.format
        );
        Ok(())
    }

    fn play(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn pause(&mut self) -> Result<(), SinkError> {
        self.flush("pause")
    }

    fn continue_(&mut self) -> Result<(), SinkError> {
        self.pacer = None;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.flush("stop")
    }

    fn clear_buffer(&mut self) -> Result<(), SinkError> {
        self.pacer = None;
        Ok(())
    }

    fn query_pts(&mut self) -> Result<u64, SinkError> {
        Ok(self.presented_pts)
    }

    fn poll_event(&mut self) -> Option<VideoEvent> {
        self.events.pop_front()
    }
}

/// PTS of a PES packet starting at the first byte of `bytes`.
fn pes_pts(bytes: &[u8]) -> Option<u64> {
    if bytes.get(..3)? != [0x00, 0x00, 0x01] || bytes.get(7)? & 0x80 == 0 {
        return None;
    }
    let field: &[u8; 5] = bytes.get(9..14)?.try_into().ok()?;
    Some(pts_standard(field))
}

/// `(width, height, aspect code)` of an MPEG sequence header in `bytes`.
fn sequence_size(bytes: &[u8]) -> Option<(i32, i32, i32)> {
    let at = bytes
        .windows(SEQUENCE_HEADER.len())
        .position(|w| w == SEQUENCE_HEADER)?;
    let h = bytes.get(at + 4..at + 8)?;
    let width = i32::from(h[0]) << 4 | i32::from(h[1] >> 4);
    let height = i32::from(h[1] & 0x0F) << 8 | i32::from(h[2]);
    Some((width, height, i32::from(h[3] >> 4)))
}

/// Writes every presented overlay frame into a directory as
/// `overlay_NNNNN.argb` (32 bpp) or `overlay_NNNNN.idx` (8 bpp).
pub struct DumpOverlay {
    dir: PathBuf,
    frames: u32,
}

impl DumpOverlay {
    pub fn new(dir: PathBuf) -> anyhow::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, frames: 0 })
    }
}

impl Overlay for DumpOverlay {
    fn present(&mut self, surface: OverlaySurface<'_>) -> Result<(), SinkError> {
        let (ext, bytes) = match surface {
            OverlaySurface::Indexed(pixels) => ("idx", pixels.to_vec()),
            OverlaySurface::Argb(pixels) => (
                "argb",
                pixels.iter().flat_map(|p| p.to_be_bytes()).collect(),
            ),
        };
        let path = self.dir.join(format!("overlay_{:05}.{ext}", self.frames));
        fs::write(&path, bytes).map_err(|e| SinkError::Device {
            op: "present",
            reason: format!("{}: {e}", path.display()),
        })?;
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddvd::structs::pes::encode_pts;

    fn video_pes(pts: u64, payload: &[u8]) -> Vec<u8> {
        let mut pes = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x81, 0x80, 0x05];
        pes.extend_from_slice(&encode_pts(pts));
        pes.extend_from_slice(payload);
        pes
    }

    #[test]
    fn tracks_presented_pictures() -> Result<(), SinkError> {
        let mut sink = FileSink::video(None, false);
        sink.open()?;

        let header = [0x00, 0x00, 0x01, 0xB3, 0x2D, 0x02, 0x40, 0x33];
        sink.write_pes(&video_pes(3600, &header))?;
        assert_eq!(sink.query_pts()?, 3600);
        assert_eq!(
            sink.poll_event(),
            Some(VideoEvent::SizeChanged {
                width: 720,
                height: 576,
                aspect: 3
            })
        );

        sink.write_pes(&video_pes(7200, &header))?;
        assert_eq!(sink.query_pts()?, 7200);
        assert_eq!(sink.poll_event(), None);
        Ok(())
    }

    #[test]
    fn audio_sink_keeps_no_clock() -> Result<(), SinkError> {
        let mut sink = FileSink::audio(None);
        sink.open()?;
        sink.write_pes(&video_pes(3600, &[]))?;
        assert_eq!(sink.query_pts()?, 0);
        Ok(())
    }
}
