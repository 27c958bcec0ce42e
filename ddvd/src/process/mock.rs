//! In-memory collaborators for driving the engine in tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::structs::nav::{ButtonMove, MenuId, NavEvent, NavPosition, Navigator, Pci};
use crate::structs::pes::SECTOR_SIZE;
use crate::structs::sink::{BypassMode, DisplayPolicy, MediaSink, Overlay, OverlaySurface, VideoEvent};
use crate::utils::errors::{NavError, SinkError};

#[derive(Debug)]
pub(crate) struct NavState {
    pub script: VecDeque<(NavEvent, Option<Vec<u8>>)>,
    pub calls: Vec<String>,
    pub titles: i32,
    pub parts: i32,
    pub title: i32,
    pub part: i32,
    pub menu: bool,
    pub position: NavPosition,
    pub fail_seek: bool,
    pub audio_stream: Option<u8>,
    pub spu_stream: Option<u8>,
    pub spu_streams: Vec<(u8, u16)>,
    pub audio_langs: Vec<u16>,
    pub highlight: Option<u32>,
    pub next_still: bool,
    pub aspect: u8,
    pub scale_perm: u8,
    pub angle: (i32, i32),
}

impl Default for NavState {
    fn default() -> Self {
        Self {
            script: VecDeque::new(),
            calls: Vec::new(),
            titles: 3,
            parts: 5,
            title: 1,
            part: 1,
            menu: false,
            position: NavPosition {
                block: 0,
                length: 900_000,
            },
            fail_seek: false,
            audio_stream: Some(0),
            spu_stream: None,
            spu_streams: Vec::new(),
            audio_langs: vec![u16::from_be_bytes(*b"en")],
            highlight: None,
            next_still: false,
            aspect: 0,
            scale_perm: 0,
            angle: (1, 1),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct MockNav(pub Rc<RefCell<NavState>>);

impl MockNav {
    pub fn push(&self, event: NavEvent) {
        self.0.borrow_mut().script.push_back((event, None));
    }

    pub fn push_block(&self, sector: Vec<u8>) {
        self.0
            .borrow_mut()
            .script
            .push_back((NavEvent::BlockReady, Some(sector)));
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.borrow().calls.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0
            .borrow()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.0.borrow_mut().calls.push(call);
    }
}

impl Navigator for MockNav {
    fn open(&mut self, path: &str) -> Result<(), NavError> {
        self.record(format!("open {path}"));
        Ok(())
    }

    fn apply_preferences(&mut self, language: &str) -> Result<(), NavError> {
        self.record(format!("prefs {language}"));
        Ok(())
    }

    fn close(&mut self) {
        self.record("close".into());
    }

    fn next_block(&mut self, buf: &mut [u8; SECTOR_SIZE]) -> Result<NavEvent, NavError> {
        let next = self.0.borrow_mut().script.pop_front();
        match next {
            Some((event, data)) => {
                if let Some(data) = data {
                    let n = data.len().min(SECTOR_SIZE);
                    buf[..n].copy_from_slice(&data[..n]);
                }
                Ok(event)
            }
            None => Ok(NavEvent::Nop),
        }
    }

    fn title_string(&self) -> String {
        "MOCK_DISC".into()
    }

    fn position(&self) -> Option<NavPosition> {
        Some(self.0.borrow().position)
    }

    fn current_title_info(&self) -> Option<(i32, i32)> {
        let s = self.0.borrow();
        Some(if s.menu { (0, 0) } else { (s.title, s.part) })
    }

    fn number_of_titles(&self) -> Result<i32, NavError> {
        Ok(self.0.borrow().titles)
    }

    fn number_of_parts(&self, _title: i32) -> Result<i32, NavError> {
        Ok(self.0.borrow().parts)
    }

    fn is_menu_domain(&self) -> bool {
        self.0.borrow().menu
    }

    fn sector_search(&mut self, block: u32) -> Result<(), NavError> {
        self.record(format!("sector_search {block}"));
        let mut s = self.0.borrow_mut();
        if s.fail_seek {
            return Err(NavError::Seek(block));
        }
        s.position.block = block;
        Ok(())
    }

    fn part_play(&mut self, title: i32, part: i32) -> Result<(), NavError> {
        self.record(format!("part_play {title} {part}"));
        let mut s = self.0.borrow_mut();
        s.title = title;
        s.part = part;
        s.menu = false;
        Ok(())
    }

    fn title_play(&mut self, title: i32) -> Result<(), NavError> {
        self.record(format!("title_play {title}"));
        let mut s = self.0.borrow_mut();
        s.title = title;
        s.part = 1;
        s.menu = false;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), NavError> {
        self.record("reset".into());
        Ok(())
    }

    fn menu_call(&mut self, menu: MenuId) -> Result<(), NavError> {
        self.record(format!("menu_call {menu:?}"));
        self.0.borrow_mut().menu = true;
        Ok(())
    }

    fn button_move(&mut self, _pci: &Pci, direction: ButtonMove) -> Result<(), NavError> {
        self.record(format!("button_move {direction:?}"));
        Ok(())
    }

    fn button_select(&mut self, _pci: &Pci, button: u32) -> Result<(), NavError> {
        self.record(format!("button_select {button}"));
        Ok(())
    }

    fn button_activate(&mut self, _pci: &Pci) -> Result<(), NavError> {
        self.record("button_activate".into());
        Ok(())
    }

    fn current_highlight(&self) -> Option<u32> {
        self.0.borrow().highlight
    }

    fn still_skip(&mut self) -> Result<(), NavError> {
        self.record("still_skip".into());
        Ok(())
    }

    fn wait_skip(&mut self) -> Result<(), NavError> {
        self.record("wait_skip".into());
        Ok(())
    }

    fn next_still_flag(&self) -> bool {
        self.0.borrow().next_still
    }

    fn video_aspect(&self) -> u8 {
        self.0.borrow().aspect
    }

    fn video_scale_permission(&self) -> u8 {
        self.0.borrow().scale_perm
    }

    fn active_audio_stream(&self) -> Option<u8> {
        self.0.borrow().audio_stream
    }

    fn active_spu_stream(&self) -> Option<u8> {
        self.0.borrow().spu_stream
    }

    fn audio_stream_to_lang(&self, logical: u8) -> Option<u16> {
        self.0.borrow().audio_langs.get(usize::from(logical)).copied()
    }

    fn spu_stream_info(&self, logical: u8) -> Option<(u8, u16)> {
        self.0.borrow().spu_streams.get(usize::from(logical)).copied()
    }

    fn angle_info(&self) -> (i32, i32) {
        self.0.borrow().angle
    }

    fn angle_change(&mut self, angle: i32) -> Result<(), NavError> {
        self.record(format!("angle_change {angle}"));
        self.0.borrow_mut().angle.0 = angle;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct SinkState {
    pub pts: u64,
    pub writes: Vec<Vec<u8>>,
    pub calls: Vec<String>,
    pub events: VecDeque<VideoEvent>,
    pub fail: bool,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct MockSink(pub Rc<RefCell<SinkState>>);

impl MockSink {
    pub fn set_pts(&self, pts: u64) {
        self.0.borrow_mut().pts = pts;
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.borrow().calls.clone()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.0.borrow().writes.clone()
    }

    fn record(&self, op: &'static str, call: String) -> Result<(), SinkError> {
        let mut s = self.0.borrow_mut();
        s.calls.push(call);
        if s.fail {
            return Err(SinkError::Device {
                op,
                reason: "mock failure".into(),
            });
        }
        Ok(())
    }
}

impl MediaSink for MockSink {
    fn open(&mut self) -> Result<(), SinkError> {
        self.record("open", "open".into())
    }

    fn write_pes(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.0.borrow_mut().writes.push(bytes.to_vec());
        Ok(())
    }

    fn set_bypass_mode(&mut self, mode: BypassMode) -> Result<(), SinkError> {
        self.record("bypass", format!("bypass {mode:?}"))
    }

    fn set_mute(&mut self, mute: bool) -> Result<(), SinkError> {
        self.record("mute", format!("mute {mute}"))
    }

    fn set_display_policy(&mut self, policy: DisplayPolicy) -> Result<(), SinkError> {
        self.record("policy", format!("policy {:?}", policy.format))
    }

    fn play(&mut self) -> Result<(), SinkError> {
        self.record("play", "play".into())
    }

    fn pause(&mut self) -> Result<(), SinkError> {
        self.record("pause", "pause".into())
    }

    fn continue_(&mut self) -> Result<(), SinkError> {
        self.record("continue", "continue".into())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.record("stop", "stop".into())
    }

    fn clear_buffer(&mut self) -> Result<(), SinkError> {
        self.record("clear", "clear".into())
    }

    fn fast_forward(&mut self, speed: u32) -> Result<(), SinkError> {
        self.record("fast_forward", format!("fast_forward {speed}"))
    }

    fn slow_motion(&mut self, speed: u32) -> Result<(), SinkError> {
        self.record("slow_motion", format!("slow_motion {speed}"))
    }

    fn query_pts(&mut self) -> Result<u64, SinkError> {
        Ok(self.0.borrow().pts)
    }

    fn poll_event(&mut self) -> Option<VideoEvent> {
        self.0.borrow_mut().events.pop_front()
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct MockOverlay(pub Rc<RefCell<Vec<usize>>>);

impl MockOverlay {
    /// Non-transparent pixel count of every presented frame.
    pub fn frames(&self) -> Vec<usize> {
        self.0.borrow().clone()
    }
}

impl Overlay for MockOverlay {
    fn present(&mut self, surface: OverlaySurface<'_>) -> Result<(), SinkError> {
        let used = match surface {
            OverlaySurface::Indexed(p) => p.iter().filter(|&&v| v != 0).count(),
            OverlaySurface::Argb(p) => p.iter().filter(|&&v| v != 0).count(),
        };
        self.0.borrow_mut().push(used);
        Ok(())
    }
}
