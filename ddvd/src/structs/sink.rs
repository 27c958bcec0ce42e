//! Presentation device contracts.
//!
//! Video and audio decoders consume PES-framed bytes and expose transport
//! controls and the presentation clock. The overlay receives the composited
//! subpicture frame.

use crate::utils::errors::SinkError;

/// Audio decoder input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BypassMode {
    Mpeg = 1,
    Ac3 = 3,
    Dts = 5,
    Lpcm = 6,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum VideoAspect {
    #[default]
    Ratio4x3,
    Ratio16x9,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DisplayFormat {
    #[default]
    PanScan,
    Letterbox,
    CenterCutOut,
    FullScreen,
}

/// How the video decoder maps the coded picture onto the screen.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DisplayPolicy {
    pub aspect: VideoAspect,
    pub format: DisplayFormat,
}

/// Stream property changes reported by the video decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEvent {
    SizeChanged { width: i32, height: i32, aspect: i32 },
    FramerateChanged(i32),
    ProgressiveChanged(i32),
}

/// A presentation device.
pub trait MediaSink {
    fn open(&mut self) -> Result<(), SinkError>;

    fn close(&mut self) {}

    fn write_pes(&mut self, bytes: &[u8]) -> Result<(), SinkError>;

    fn set_bypass_mode(&mut self, _mode: BypassMode) -> Result<(), SinkError> {
        Ok(())
    }

    fn set_av_sync(&mut self, _enable: bool) -> Result<(), SinkError> {
        Ok(())
    }

    fn set_mute(&mut self, _mute: bool) -> Result<(), SinkError> {
        Ok(())
    }

    fn set_display_policy(&mut self, _policy: DisplayPolicy) -> Result<(), SinkError> {
        Ok(())
    }

    fn play(&mut self) -> Result<(), SinkError>;

    fn pause(&mut self) -> Result<(), SinkError>;

    fn continue_(&mut self) -> Result<(), SinkError>;

    fn stop(&mut self) -> Result<(), SinkError>;

    fn clear_buffer(&mut self) -> Result<(), SinkError>;

    /// Native fast-forward; 0 restores normal decoding.
    fn fast_forward(&mut self, _speed: u32) -> Result<(), SinkError> {
        Ok(())
    }

    /// Native slow motion; 0 restores normal speed.
    fn slow_motion(&mut self, _speed: u32) -> Result<(), SinkError> {
        Ok(())
    }

    /// Presentation time of the frame on screen, in 90 kHz ticks.
    fn query_pts(&mut self) -> Result<u64, SinkError>;

    fn poll_event(&mut self) -> Option<VideoEvent> {
        None
    }
}

/// Overlay pixels in the configured colour depth.
#[derive(Debug, Clone, Copy)]
pub enum OverlaySurface<'a> {
    /// 8 bpp indices; colours travel as `ColortableUpdate` events.
    Indexed(&'a [u8]),
    /// 32 bpp ARGB.
    Argb(&'a [u32]),
}

/// Destination of the composited subpicture frame.
pub trait Overlay {
    fn present(&mut self, surface: OverlaySurface<'_>) -> Result<(), SinkError>;
}

/// Overlay that discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOverlay;

impl Overlay for NullOverlay {
    fn present(&mut self, _surface: OverlaySurface<'_>) -> Result<(), SinkError> {
        Ok(())
    }
}
