//! The playback loop.
//!
//! [`Engine`] owns the [`PlaybackSession`] and every scratch buffer. Each
//! call to [`Engine::tick`] pulls at most one block or navigation event,
//! runs the timers and the subpicture scheduler, flushes the overlay and
//! handles at most one queued command. Events go out on the event queue in
//! the order their causes are detected.

mod dispatch;
mod nav_events;

use std::time::Duration;

use log::{Level, debug, info, trace, warn};

use crate::log_or_err;
use crate::process::audio_route::{AudioOutput, AudioRouter, CodecSupport};
use crate::process::classify::{ClassifyContext, SectorClassifier};
use crate::process::highlight::{HighlightCoordinator, HighlightMask, MaskOutcome, button_highlight};
use crate::process::spu_decode::SpuDecoder;
use crate::process::spu_sync::{SpuRing, SyncDecision, sync_decision};
use crate::process::trick::{self, Boundary};
use crate::structs::codec::{Ac3Decoder, MpegAudioEncoder};
use crate::structs::command::{Command, CommandReceiver};
use crate::structs::config::{ColorDepth, PlayerConfig, TvSystem};
use crate::structs::event::{
    BlitArea, Event, EventSender, SizeInfo, SpuRenderedInfo, TimeInfo, TrickInfo,
};
use crate::structs::nav::{CellInfo, Navigator, Pci, SpuLanguageMap};
use crate::structs::palette::{Clut, PaletteWorkingSet, blit_to_argb};
use crate::structs::pes::{PES_OFFSET, SECTOR_SIZE};
use crate::structs::pipe::Wait;
use crate::structs::session::{PlayMode, PlaybackSession, ResumeSnapshot, TrickMode};
use crate::structs::sink::{MediaSink, Overlay, OverlaySurface, VideoEvent};
use crate::structs::spu::{FRAME_HEIGHT, FRAME_WIDTH, IndexedFrame, SpuKind, SpuPendingEntry};
use crate::structs::stream::StreamClassification;
use crate::utils::errors::{EngineError, NavError, ProtocolError, SinkError};
use crate::utils::timing::{Clock, Deadline};

const TIME_UPDATE_MS: u64 = 1000;

/// Command poll timeout while nothing else needs the loop.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Frames a directional key advances from pause.
const STEP_FRAMES: u64 = 3;

/// Severity from which device errors end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailPolicy {
    pub fail_level: Level,
}

/// Logs a device error, or turns it into a session failure under a strict
/// fail level.
pub(crate) fn tolerate<T>(
    policy: FailPolicy,
    result: Result<T, SinkError>,
) -> Result<Option<T>, EngineError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            log_or_err!(policy, Level::Warn, EngineError::Device(e));
            Ok(None)
        }
    }
}

/// Navigation calls triggered by keys are best effort.
pub(crate) fn soft(result: Result<(), NavError>, call: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Navigation {call} failed: {e}");
            false
        }
    }
}

/// Everything the engine drives but does not implement.
pub struct Collaborators {
    pub nav: Box<dyn Navigator>,
    pub video: Box<dyn MediaSink>,
    pub audio: Box<dyn MediaSink>,
    pub overlay: Box<dyn Overlay>,
    pub clock: Box<dyn Clock>,
    pub ac3: Option<Box<dyn Ac3Decoder>>,
    pub encoder: Option<Box<dyn MpegAudioEncoder>>,
}

/// What a finished session hands back to its caller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Position captured by `Exit`, for the next session's `resume`.
    pub resume: Option<ResumeSnapshot>,
}

#[derive(Debug, Default)]
struct Timers {
    time_update: Deadline,
    /// Finite still frame.
    wait: Deadline,
    /// Display duration of the subtitle on screen.
    spu: Deadline,
    trick: Deadline,
}

pub struct Engine {
    config: PlayerConfig,
    policy: FailPolicy,
    io: Collaborators,
    commands: CommandReceiver,
    events: EventSender,
    session: PlaybackSession,

    classifier: SectorClassifier,
    spu: SpuDecoder,
    ring: SpuRing,
    highlight: HighlightCoordinator,
    audio: AudioRouter,

    clut: Clut,
    palette: PaletteWorkingSet,
    screen: IndexedFrame,
    screen_dirty: bool,
    spu_languages: SpuLanguageMap,

    pci: Pci,
    cell: CellInfo,
    sector: Box<[u8; SECTOR_SIZE]>,

    still_frame: bool,
    cell_still: bool,
    nav_still: bool,
    wait_for_user: bool,
    /// Last PTS seen on the video stream.
    video_pts: u64,
    /// Last video PTS before the most recent backward jump.
    previous_video_pts: Option<u64>,
    step_target: Option<u64>,
    timers: Timers,
    snapshot: Option<ResumeSnapshot>,
}

impl Engine {
    pub fn new(
        config: PlayerConfig,
        io: Collaborators,
        commands: CommandReceiver,
        events: EventSender,
    ) -> Self {
        let session = PlaybackSession::new(config.tv_aspect, config.tv_mode, config.resume);
        Self {
            policy: FailPolicy {
                fail_level: config.fail_level,
            },
            classifier: SectorClassifier::new(config.pts_encoding),
            ring: SpuRing::new(config.spu_ring_capacity),
            session,
            io,
            commands,
            events,
            spu: SpuDecoder::default(),
            highlight: HighlightCoordinator::default(),
            audio: AudioRouter::default(),
            clut: Clut::default(),
            palette: PaletteWorkingSet::default(),
            screen: IndexedFrame::default(),
            screen_dirty: false,
            spu_languages: SpuLanguageMap::default(),
            pci: Pci::default(),
            cell: CellInfo::default(),
            sector: Box::new([0; SECTOR_SIZE]),
            still_frame: false,
            cell_still: false,
            nav_still: false,
            wait_for_user: false,
            video_pts: 0,
            previous_video_pts: None,
            step_target: None,
            timers: Timers::default(),
            snapshot: None,
            config,
        }
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    /// Opens the source and the devices and starts playback.
    pub fn start(&mut self) -> Result<(), EngineError> {
        info!("Opening DVD source {}", self.config.dvd_path);
        if let Err(e) = self.io.nav.open(&self.config.dvd_path) {
            self.emit(Event::Text(format!(
                "Error: Cant open DVD Source: {}",
                self.config.dvd_path
            )));
            return Err(EngineError::Open(e));
        }
        self.io
            .nav
            .apply_preferences(&self.config.language)
            .map_err(EngineError::Preferences)?;

        self.io.video.open().map_err(EngineError::DeviceOpen)?;
        self.io.audio.open().map_err(EngineError::DeviceOpen)?;
        for sink in [&mut self.io.video, &mut self.io.audio] {
            tolerate(self.policy, sink.set_av_sync(true))?;
            tolerate(self.policy, sink.play())?;
        }

        self.emit(Event::TitleString(self.io.nav.title_string()));
        self.session.playmode = PlayMode::Playing;
        let now = self.now();
        self.timers.time_update.arm(now, TIME_UPDATE_MS);
        Ok(())
    }

    /// One loop iteration. Returns `false` once the session has stopped.
    pub fn tick(&mut self) -> Result<bool, EngineError> {
        if self.session.playmode == PlayMode::Stopped {
            return Ok(false);
        }

        let reading = matches!(
            self.session.playmode,
            PlayMode::Playing | PlayMode::Stepping
        ) && !self.wait_for_user;
        if reading {
            self.trick_tick()?;
            let event = match self.io.nav.next_block(&mut self.sector) {
                Ok(event) => event,
                Err(e) => {
                    self.emit(Event::Text(format!("Error getting next block: {e}")));
                    return Err(EngineError::Read(e));
                }
            };
            self.handle_nav_event(event)?;
        }

        self.run_timers()?;
        self.redisplay_still()?;
        self.sync_spu()?;
        self.update_menu_state();
        self.forward_video_events();
        self.check_step()?;
        self.flush_screen()?;
        self.poll_command()?;

        Ok(self.session.playmode != PlayMode::Stopped)
    }

    /// Runs the session to completion and tears the collaborators down.
    pub fn run(mut self) -> Result<SessionOutcome, EngineError> {
        let result = self.start().and_then(|()| {
            while self.tick()? {}
            Ok(())
        });
        self.shutdown();
        result.map(|()| SessionOutcome {
            resume: self.snapshot,
        })
    }

    fn shutdown(&mut self) {
        for sink in [&mut self.io.video, &mut self.io.audio] {
            if let Err(e) = sink.stop() {
                debug!("Stopping device: {e}");
            }
            sink.close();
        }
        self.io.nav.close();
        info!("Playback session closed");
    }

    fn now(&self) -> u64 {
        self.io.clock.now_ms()
    }

    fn emit(&self, event: Event) {
        trace!("Event {:?}", event.kind());
        if let Err(e) = self.events.send(&event) {
            debug!("Dropping {:?} event: {e}", event.kind());
        }
    }

    fn is_still(&self) -> bool {
        self.still_frame || self.cell_still || self.nav_still
    }

    fn codec_support(&self) -> CodecSupport {
        CodecSupport {
            ac3_decoder: self.io.ac3.is_some(),
            mpeg_encoder: self.io.encoder.is_some(),
            ac3_passthrough: self.config.ac3_passthrough,
        }
    }

    /// Drops everything buffered for the old position.
    fn play_empty(&mut self, device_clear: bool) -> Result<(), EngineError> {
        self.wait_for_user = false;
        self.still_frame = false;
        self.highlight.reset();
        self.audio.reset_resync();
        self.classifier.iframe_mut().reset();
        self.spu.reset();
        self.ring.flush();
        self.timers.wait.cancel();
        self.timers.spu.cancel();
        if device_clear {
            self.device_clear()?;
        }
        Ok(())
    }

    fn device_clear(&mut self) -> Result<(), EngineError> {
        let p = self.policy;
        tolerate(p, self.io.audio.stop())?;
        tolerate(p, self.io.audio.clear_buffer())?;
        tolerate(p, self.io.audio.play())?;
        tolerate(p, self.io.video.clear_buffer())?;
        tolerate(p, self.io.video.play())?;
        tolerate(p, self.io.audio.set_av_sync(true))?;
        Ok(())
    }

    fn process_sector(&mut self) -> Result<(), EngineError> {
        let Some(header) = self.classifier.header(&self.sector[..]) else {
            trace!("Block without PES packet");
            return Ok(());
        };
        let ctx = ClassifyContext {
            audio_id: self.session.audio_id,
            spu_stream_id: self.session.spu_active_stream_id,
            dvd_aspect: self.session.dvd_aspect,
            tv_aspect: self.session.tv_aspect,
            tv_mode: self.session.tv_mode,
            still: self.is_still(),
        };

        match self.classifier.classify(&mut self.sector[..], &ctx) {
            StreamClassification::Video { pts } => {
                if let Some(pts) = pts {
                    if pts < self.video_pts {
                        trace!("Video PTS jumped back from {} to {pts}", self.video_pts);
                        self.previous_video_pts = Some(self.video_pts);
                    }
                    self.video_pts = pts;
                }
                let end = header.end(SECTOR_SIZE);
                tolerate(
                    self.policy,
                    self.io.video.write_pes(&self.sector[PES_OFFSET..end]),
                )?;
            }
            StreamClassification::Audio { format, .. } => {
                let codecs = self.codec_support();
                if let Some(route) = self.audio.switch(format, codecs) {
                    tolerate(self.policy, self.io.audio.set_bypass_mode(route.bypass()))?;
                }
                let output = self.audio.process(
                    &self.sector[..],
                    &header,
                    self.io.ac3.as_deref_mut(),
                    self.io.encoder.as_deref_mut(),
                );
                match output {
                    AudioOutput::Pes(bytes) => {
                        tolerate(self.policy, self.io.audio.write_pes(bytes))?;
                    }
                    AudioOutput::Resynced(pes) => {
                        tolerate(self.policy, self.io.audio.write_pes(&pes))?;
                    }
                    AudioOutput::Nothing => {}
                }
            }
            StreamClassification::Subpicture { stream_id } => {
                if let Some((spu, target_pts)) = self.spu.push(&self.sector[..], &header) {
                    trace!(
                        "Subpicture {:?} on stream {stream_id} for pts {target_pts}",
                        spu.kind
                    );
                    let highlight =
                        (self.pci.button_count > 0).then(|| self.pci.highlight.clone());
                    self.ring.push(SpuPendingEntry {
                        spu,
                        target_pts,
                        highlight,
                    });
                }
            }
            StreamClassification::Other => {}
        }
        Ok(())
    }

    fn run_timers(&mut self) -> Result<(), EngineError> {
        let now = self.now();
        if self.timers.time_update.fire(now) {
            self.timers.time_update.arm(now, TIME_UPDATE_MS);
            if self.session.playmode == PlayMode::Playing
                && self.session.trickmode.is_off()
                && !self.session.in_menu
            {
                self.emit(Event::Time(self.time_info()));
            }
        }
        if self.timers.wait.fire(now) {
            debug!("Still frame elapsed");
            self.still_frame = false;
            soft(self.io.nav.still_skip(), "still_skip");
        }
        if self.timers.spu.fire(now) {
            trace!("Subtitle display time elapsed");
            self.screen.clear();
            self.screen_dirty = true;
        }
        Ok(())
    }

    fn redisplay_still(&mut self) -> Result<(), EngineError> {
        let still = self.is_still();
        if let Some(pes) = self.classifier.iframe_mut().take_redisplay(still) {
            debug!("Redisplaying cached I-frame, {} bytes", pes.len());
            tolerate(self.policy, self.io.video.write_pes(&pes))?;
        }
        Ok(())
    }

    fn sync_spu(&mut self) -> Result<(), EngineError> {
        if self.ring.is_empty() {
            return Ok(());
        }
        let Some(pts) = tolerate(self.policy, self.io.video.query_pts())? else {
            return Ok(());
        };

        while let Some(spu_pts) = self.ring.front().map(|e| e.target_pts) {
            let decision = sync_decision(
                spu_pts,
                pts,
                self.video_pts,
                self.previous_video_pts,
                self.config.spu_sync_tolerance,
            );
            match decision {
                SyncDecision::Wait => break,
                SyncDecision::Drop => {
                    debug!("Dropping subpicture for pts {spu_pts}, clock at {pts}");
                    self.ring.pop();
                }
                SyncDecision::Render => {
                    if let Some(entry) = self.ring.pop() {
                        self.render_spu(entry)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn render_spu(&mut self, entry: SpuPendingEntry) -> Result<(), EngineError> {
        let SpuPendingEntry {
            spu,
            target_pts,
            highlight,
        } = entry;

        match spu.kind {
            SpuKind::Subtitle => {
                let hidden = self
                    .io
                    .nav
                    .active_spu_stream()
                    .is_some_and(|s| s & 0x80 != 0)
                    && !self.session.spu_locked;
                if spu.display_time <= 0 || hidden {
                    trace!("Subtitle for pts {target_pts} not shown");
                    return Ok(());
                }
                if let Some(colors) = spu.colors {
                    self.palette.apply_colors(&self.clut, colors);
                }
                if let Some(alpha) = spu.alpha {
                    self.palette.apply_alpha(alpha);
                }
                self.screen.clear();
                self.screen.blit(&spu.bbox, &spu.pixels);
                self.screen_dirty = true;

                let now = self.now();
                self.timers.spu.arm(now, spu.display_time as u64 * 10);
                self.emit(Event::SpuRendered(SpuRenderedInfo {
                    target_pts,
                    kind: SpuKind::Subtitle as u32,
                }));
            }
            SpuKind::HighlightMask => {
                let mask = HighlightMask {
                    bbox: spu.bbox,
                    pixels: spu.pixels,
                    info: highlight,
                    pts: target_pts,
                };
                match self.highlight.on_mask(mask) {
                    MaskOutcome::Draw { button } => self.draw_highlight(button),
                    MaskOutcome::AwaitEvent => {
                        if let Some(button) = self.io.nav.current_highlight() {
                            soft(
                                self.io.nav.button_select(&self.pci, button),
                                "button_select",
                            );
                        }
                    }
                }
            }
            SpuKind::Malformed => trace!("Skipping malformed subpicture"),
        }
        Ok(())
    }

    /// Draws `button` from the current highlight mask.
    fn draw_highlight(&mut self, button: u32) {
        if !self.session.in_menu {
            self.session.in_menu = true;
            self.emit(Event::MenuOpened);
        }
        let Some(mask) = self.highlight.mask() else {
            return;
        };

        let info = mask.info.as_ref().unwrap_or(&self.pci.highlight);
        let (nav, pci) = (&self.io.nav, &self.pci);
        let target = button_highlight(info, button, self.session.tv_scale, || {
            nav.highlight_area(pci, button, 0)
        });

        self.timers.spu.cancel();
        self.screen.clear();
        match target {
            Some(hl) => {
                debug!("Highlighting button {button} in {:?}", hl.area);
                self.palette.apply_button(&self.clut, hl.coli);
                self.screen.blit_region_from(&mask.pixels, &mask.bbox, &hl.area);
            }
            None => debug!("No geometry for button {button}"),
        }
        self.screen_dirty = true;
        self.emit(Event::SpuRendered(SpuRenderedInfo {
            target_pts: mask.pts,
            kind: SpuKind::HighlightMask as u32,
        }));
    }

    fn update_menu_state(&mut self) {
        let in_menu = self.io.nav.is_menu_domain() || self.pci.button_count > 0;
        if in_menu == self.session.in_menu {
            return;
        }
        self.session.in_menu = in_menu;
        if in_menu {
            debug!("Menu opened");
            self.emit(Event::MenuOpened);
        } else {
            debug!("Menu closed");
            self.emit(Event::MenuClosed);
            if self.highlight.mask().is_some() {
                self.highlight.reset();
                self.screen.clear();
                self.screen_dirty = true;
            }
        }
    }

    fn forward_video_events(&mut self) {
        while let Some(event) = self.io.video.poll_event() {
            let event = match event {
                VideoEvent::SizeChanged {
                    width,
                    height,
                    aspect,
                } => Event::SizeChanged(SizeInfo {
                    width,
                    height,
                    aspect,
                }),
                VideoEvent::FramerateChanged(rate) => Event::FramerateChanged(rate),
                VideoEvent::ProgressiveChanged(p) => Event::ProgressiveChanged(p),
            };
            self.emit(event);
        }
    }

    fn check_step(&mut self) -> Result<(), EngineError> {
        if self.session.playmode != PlayMode::Stepping {
            return Ok(());
        }
        let Some(target) = self.step_target else {
            self.session.playmode = PlayMode::Paused;
            return Ok(());
        };
        let Some(pts) = tolerate(self.policy, self.io.video.query_pts())? else {
            return Ok(());
        };
        if pts >= target {
            debug!("Step reached pts {pts}");
            self.step_target = None;
            self.session.playmode = PlayMode::Paused;
            tolerate(self.policy, self.io.video.pause())?;
        }
        Ok(())
    }

    fn step_ticks(&self) -> u64 {
        let frame = match self.config.tv_system {
            TvSystem::Pal => 3600,
            TvSystem::Ntsc => 3003,
        };
        frame * STEP_FRAMES
    }

    fn blit_area(&self) -> BlitArea {
        let blit = self.config.blit;
        BlitArea {
            x_start: 0,
            x_end: FRAME_WIDTH as i32 - 1,
            y_start: 0,
            y_end: FRAME_HEIGHT as i32 - 1,
            x_offset: blit.x_offset,
            y_offset: blit.y_offset,
            width: blit.width,
            height: blit.height,
        }
    }

    fn flush_screen(&mut self) -> Result<(), EngineError> {
        let palette_changed = self.palette.take_dirty();
        match self.config.color_depth {
            ColorDepth::Indexed8 => {
                if palette_changed {
                    self.emit(Event::ColortableUpdate(self.palette.colors()));
                }
                if !std::mem::take(&mut self.screen_dirty) {
                    return Ok(());
                }
                tolerate(
                    self.policy,
                    self.io
                        .overlay
                        .present(OverlaySurface::Indexed(self.screen.as_slice())),
                )?;
            }
            ColorDepth::Argb32 => {
                if !std::mem::take(&mut self.screen_dirty) && !palette_changed {
                    return Ok(());
                }
                let argb = blit_to_argb(self.screen.as_slice(), &self.palette);
                tolerate(self.policy, self.io.overlay.present(OverlaySurface::Argb(&argb)))?;
            }
        }
        self.emit(Event::ScreenUpdate(self.blit_area()));
        Ok(())
    }

    fn poll_command(&mut self) -> Result<(), EngineError> {
        let idle = self.session.playmode == PlayMode::Paused || self.wait_for_user;
        let wait = if idle {
            Wait::Timeout(IDLE_POLL)
        } else {
            Wait::NonBlocking
        };
        match self.commands.poll(wait) {
            Ok(Some(command)) => self.handle_command(command),
            Ok(None) => Ok(()),
            Err(ProtocolError::Disconnected) => {
                info!("Command queue closed, stopping");
                self.handle_command(Command::Exit)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn time_info(&self) -> TimeInfo {
        let mut info = TimeInfo::default();
        let pgc_length = self.cell.pgc_length;
        if let Some(pos) = self.io.nav.position() {
            let ticks = u128::from(pos.block) * u128::from(pgc_length)
                / u128::from(pos.length.max(1));
            info.set_position(ticks as u64);
        }
        info.set_end(pgc_length);
        if let Some((title, part)) = self.io.nav.current_title_info() {
            info.pos_title = title;
            info.pos_chapter = part;
            info.end_title = self.io.nav.number_of_titles().unwrap_or(0);
            info.end_chapter = self.io.nav.number_of_parts(title).unwrap_or(0);
        }
        info
    }

    fn emit_trick_state(&self) {
        let mode = self.session.trickmode;
        let info = TrickInfo {
            speed: mode.speed() as i32,
            time: self.time_info(),
        };
        match mode {
            TrickMode::FastForward(_) | TrickMode::TrickForward(_) => {
                self.emit(Event::StateFastForward(info))
            }
            TrickMode::FastBackward(_) | TrickMode::TrickBackward(_) => {
                self.emit(Event::StateFastBackward(info))
            }
            TrickMode::SlowForward(_) | TrickMode::SlowBackward(_) | TrickMode::Off => {
                self.emit(Event::Time(info.time))
            }
        }
    }

    /// Re-seeks once per interval while a seeking trick mode is active.
    fn trick_tick(&mut self) -> Result<(), EngineError> {
        let mode = self.session.trickmode;
        let Some(offset) = trick::jump_offset(mode) else {
            return Ok(());
        };
        let now = self.now();
        if !self.timers.trick.fire(now) {
            return Ok(());
        }
        self.timers.trick.arm(now, trick::jump_interval_ms(mode));

        let Some(pos) = self.io.nav.position() else {
            return Ok(());
        };
        let target = trick::seek_target(pos.block, pos.length, self.cell.pgc_length, offset);
        trace!("Trick jump {offset} ticks: block {} -> {}", pos.block, target.block);
        soft(self.io.nav.sector_search(target.block), "sector_search");
        self.ring.flush();
        self.audio.reset_resync();

        match target.boundary {
            Some(boundary) => {
                info!("Trick mode reached the {boundary:?} of the title");
                self.end_trick()?;
                self.emit(Event::Time(self.time_info()));
                self.emit(match boundary {
                    Boundary::Start => Event::StartOfFile,
                    Boundary::End => Event::EndOfFile,
                });
            }
            None => self.emit_trick_state(),
        }
        Ok(())
    }
}

fn native_fast(mode: TrickMode) -> u32 {
    match mode {
        TrickMode::TrickForward(s) | TrickMode::TrickBackward(s) => s,
        _ => 0,
    }
}

fn native_slow(mode: TrickMode) -> u32 {
    match mode {
        TrickMode::SlowForward(s) => s,
        _ => 0,
    }
}

impl Engine {
    /// Switches to a non-1× mode. `TrickMode::Off` is handled by
    /// [`play`](Self::play).
    fn enter_trick(&mut self, mode: TrickMode) -> Result<(), EngineError> {
        let old = self.session.trickmode;
        let p = self.policy;
        if old.is_off() && !self.session.mute {
            tolerate(p, self.io.audio.set_mute(true))?;
        }
        if self.session.playmode != PlayMode::Playing {
            tolerate(p, self.io.video.continue_())?;
            tolerate(p, self.io.audio.continue_())?;
            self.session.playmode = PlayMode::Playing;
            self.step_target = None;
        }
        if native_fast(old) != native_fast(mode) {
            tolerate(p, self.io.video.fast_forward(native_fast(mode)))?;
        }
        if native_slow(old) != native_slow(mode) {
            tolerate(p, self.io.video.slow_motion(native_slow(mode)))?;
        }

        debug!("Trick mode {old:?} -> {mode:?}");
        self.session.trickmode = mode;
        if mode.seeks() {
            let now = self.now();
            self.timers.trick.arm(now, 0);
        } else {
            self.timers.trick.cancel();
        }
        self.emit_trick_state();
        Ok(())
    }

    /// Restores 1× decoding without emitting anything.
    fn end_trick(&mut self) -> Result<(), EngineError> {
        let old = self.session.trickmode;
        if old.is_off() {
            return Ok(());
        }
        let p = self.policy;
        self.session.trickmode = TrickMode::Off;
        self.timers.trick.cancel();
        if native_fast(old) != 0 {
            tolerate(p, self.io.video.fast_forward(0))?;
        }
        if native_slow(old) != 0 {
            tolerate(p, self.io.video.slow_motion(0))?;
        }
        if !self.session.mute {
            tolerate(p, self.io.audio.set_mute(false))?;
        }
        Ok(())
    }

    fn play(&mut self) -> Result<(), EngineError> {
        self.end_trick()?;
        tolerate(self.policy, self.io.audio.continue_())?;
        tolerate(self.policy, self.io.video.continue_())?;
        self.session.playmode = PlayMode::Playing;
        self.step_target = None;
        self.emit(Event::StatePlay);
        self.emit(Event::Time(self.time_info()));
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        if self.session.playmode != PlayMode::Playing {
            return self.play();
        }
        self.end_trick()?;
        tolerate(self.policy, self.io.audio.pause())?;
        tolerate(self.policy, self.io.video.pause())?;
        self.session.playmode = PlayMode::Paused;
        self.emit(Event::StatePause);
        Ok(())
    }

    /// Advances a few frames from pause.
    fn step(&mut self) -> Result<(), EngineError> {
        let pts = tolerate(self.policy, self.io.video.query_pts())?.unwrap_or(self.video_pts);
        let target = pts + self.step_ticks();
        debug!("Stepping from pts {pts} to {target}");
        self.step_target = Some(target);
        self.session.playmode = PlayMode::Stepping;
        tolerate(self.policy, self.io.video.continue_())?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::process::classify::{pes_sector, private_sector};
    use crate::process::mock::{MockNav, MockOverlay, MockSink};
    use crate::process::spu_decode::tests::SOLID_BLOCK;
    use crate::structs::command::{CommandSender, command_queue};
    use crate::structs::event::{EventReceiver, event_queue};
    use crate::structs::nav::{ButtonInfo, NavEvent, lang_code};
    use crate::utils::errors::DdvdResult;
    use crate::utils::timing::ManualClock;
    use anyhow::Result;

    pub(crate) struct Harness {
        pub engine: Engine,
        pub nav: MockNav,
        pub video: MockSink,
        pub audio: MockSink,
        pub overlay: MockOverlay,
        pub clock: Rc<ManualClock>,
        pub commands: CommandSender,
        pub events: EventReceiver,
    }

    impl Harness {
        pub fn ticks(&mut self, n: usize) -> Result<()> {
            for _ in 0..n {
                self.engine.tick()?;
            }
            Ok(())
        }

        pub fn spu_rendered(&mut self) -> Result<Vec<SpuRenderedInfo>> {
            Ok(self
                .events
                .drain()?
                .into_iter()
                .filter_map(|e| match e {
                    Event::SpuRendered(info) => Some(info),
                    _ => None,
                })
                .collect())
        }
    }

    pub(crate) fn harness(config: PlayerConfig) -> Harness {
        let nav = MockNav::default();
        let video = MockSink::default();
        let audio = MockSink::default();
        let overlay = MockOverlay::default();
        let clock = Rc::new(ManualClock::new(0));
        let io = Collaborators {
            nav: Box::new(nav.clone()),
            video: Box::new(video.clone()),
            audio: Box::new(audio.clone()),
            overlay: Box::new(overlay.clone()),
            clock: Box::new(clock.clone()),
            ac3: None,
            encoder: None,
        };
        let (commands, rx) = command_queue();
        let (tx, events) = event_queue();
        Harness {
            engine: Engine::new(config, io, rx, tx),
            nav,
            video,
            audio,
            overlay,
            clock,
            commands,
            events,
        }
    }

    fn cell(pgc_length: u64) -> NavEvent {
        NavEvent::CellChange(CellInfo {
            pgc_length,
            ..Default::default()
        })
    }

    #[test]
    fn subtitle_is_rendered_once_at_its_pts() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.nav.0.borrow_mut().spu_stream = Some(0);
        h.nav.push(NavEvent::VtsChange);
        h.nav.push(cell(900_000));
        h.nav.push_block(pes_sector(0xE0, Some(0), &[0; 16]));
        h.nav.push_block(private_sector(0x20, Some(90_000), &SOLID_BLOCK));

        h.engine.start()?;
        h.ticks(4)?;
        assert_eq!(h.engine.ring.len(), 1);
        assert!(h.spu_rendered()?.is_empty());

        h.video.set_pts(90_005);
        h.ticks(2)?;
        assert_eq!(
            h.spu_rendered()?,
            [SpuRenderedInfo {
                target_pts: 90_000,
                kind: 1
            }]
        );
        assert!(h.engine.ring.is_empty());
        assert_eq!(h.overlay.frames(), [16]);
        assert_eq!(h.video.writes().len(), 1);

        // The display time clears the overlay again.
        h.clock.advance(1000);
        h.ticks(1)?;
        assert_eq!(h.overlay.frames(), [16, 0]);
        Ok(())
    }

    #[test]
    fn stale_subtitle_after_discontinuity_is_dropped() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.nav.0.borrow_mut().spu_stream = Some(0);
        h.nav.push(NavEvent::VtsChange);
        h.nav.push_block(private_sector(0x20, Some(90_000), &SOLID_BLOCK));
        h.video.set_pts(900_000);

        h.engine.start()?;
        h.ticks(2)?;
        assert!(h.spu_rendered()?.is_empty());
        assert!(h.engine.ring.is_empty());
        assert!(h.overlay.frames().is_empty());
        Ok(())
    }

    #[test]
    fn subtitle_beyond_the_ended_stream_is_dropped() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.nav.0.borrow_mut().spu_stream = Some(0);
        h.nav.push(NavEvent::VtsChange);
        h.nav.push_block(pes_sector(0xE0, Some(10_000), &[0; 16]));
        h.nav.push_block(pes_sector(0xE0, Some(10), &[0; 16]));
        h.nav.push_block(private_sector(0x20, Some(90_000), &SOLID_BLOCK));
        h.video.set_pts(150_000);

        h.engine.start()?;
        h.ticks(4)?;
        assert_eq!(h.engine.previous_video_pts, Some(10_000));
        assert!(h.spu_rendered()?.is_empty());
        assert!(h.engine.ring.is_empty());
        assert!(h.overlay.frames().is_empty());
        Ok(())
    }

    #[test]
    fn forced_hidden_subtitle_is_consumed_without_drawing() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.nav.0.borrow_mut().spu_stream = Some(0x80);
        h.nav.push(NavEvent::VtsChange);
        h.nav.push(cell(900_000));
        h.nav.push_block(pes_sector(0xE0, Some(0), &[0; 16]));
        h.nav.push_block(private_sector(0x20, Some(90_000), &SOLID_BLOCK));

        h.engine.start()?;
        h.ticks(4)?;
        assert_eq!(h.engine.session().spu_active_stream_id, Some(0));
        assert_eq!(h.engine.ring.len(), 1);

        h.video.set_pts(90_005);
        h.clock.advance(40);
        h.ticks(2)?;
        assert!(h.spu_rendered()?.is_empty());
        assert!(h.engine.ring.is_empty());
        assert!(!h.engine.screen_dirty);
        assert!(h.overlay.frames().is_empty());
        Ok(())
    }

    #[test]
    fn locked_subtitle_is_shown_on_a_hidden_stream() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        {
            let mut nav = h.nav.0.borrow_mut();
            nav.spu_stream = Some(0x80);
            nav.spu_streams = vec![(0, lang_code("en"))];
        }
        h.nav.push(NavEvent::VtsChange);
        h.nav.push(cell(900_000));
        h.nav.push_block(pes_sector(0xE0, Some(0), &[0; 16]));
        h.nav.push_block(private_sector(0x20, Some(90_000), &SOLID_BLOCK));
        h.commands.send(Command::SetSubtitle(0))?;

        h.engine.start()?;
        h.ticks(4)?;
        assert!(h.engine.session().spu_locked);
        assert_eq!(h.engine.ring.len(), 1);

        h.video.set_pts(90_005);
        h.ticks(2)?;
        assert_eq!(
            h.spu_rendered()?,
            [SpuRenderedInfo {
                target_pts: 90_000,
                kind: 1
            }]
        );
        assert_eq!(h.overlay.frames().last(), Some(&16));
        Ok(())
    }

    #[test]
    fn skip_past_the_end_clamps_and_reports_eof() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.nav.push(cell(900_000));
        h.commands.send(Command::SkipSeconds(10))?;

        h.engine.start()?;
        h.ticks(1)?;

        assert_eq!(h.nav.count("sector_search"), 1);
        assert_eq!(h.nav.count("sector_search 899750"), 1);
        let events = h.events.drain()?;
        assert!(matches!(events.as_slice(), [.., Event::Time(_), Event::EndOfFile]));
        Ok(())
    }

    fn menu_pci() -> Pci {
        let mut pci = Pci {
            button_count: 1,
            ..Default::default()
        };
        pci.highlight.buttons[0] = ButtonInfo {
            x_start: 0,
            x_end: 4,
            y_start: 0,
            y_end: 2,
            color_index: 1,
        };
        pci.highlight.colors[0] = [0x0001_0FF0, 0];
        pci
    }

    fn mask_packet() -> [u8; 32] {
        let mut packet = SOLID_BLOCK;
        packet[24] = 0x00;
        packet
    }

    #[test]
    fn highlight_waits_for_its_event() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        {
            let mut nav = h.nav.0.borrow_mut();
            nav.spu_stream = Some(0);
            nav.menu = true;
            nav.highlight = Some(1);
        }
        h.nav.push(NavEvent::VtsChange);
        h.nav.push(NavEvent::NavPacket {
            pci: Box::new(menu_pci()),
            dsi: Default::default(),
        });
        h.nav.push_block(private_sector(0x20, Some(1000), &mask_packet()));
        h.video.set_pts(2000);

        h.engine.start()?;
        h.ticks(3)?;
        // The mask is consumed but nothing is drawn until the event.
        assert_eq!(h.nav.count("button_select 1"), 1);
        assert!(h.engine.highlight.is_awaiting_event());
        assert!(h.overlay.frames().is_empty());
        let events = h.events.drain()?;
        assert!(events.contains(&Event::MenuOpened));
        assert!(!events.iter().any(|e| matches!(e, Event::SpuRendered(_))));

        h.nav.push(NavEvent::Highlight {
            button: 1,
            pts: 1000,
        });
        h.ticks(1)?;
        assert_eq!(
            h.spu_rendered()?,
            [SpuRenderedInfo {
                target_pts: 1000,
                kind: 2
            }]
        );
        // Button (0,0)-(3,1) cut out of the 4×4 mask.
        assert_eq!(h.overlay.frames(), [8]);
        assert!(!h.engine.highlight.is_awaiting_event());
        Ok(())
    }

    #[test]
    fn activation_suppresses_the_stale_highlight() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        {
            let mut nav = h.nav.0.borrow_mut();
            nav.spu_stream = Some(0);
            nav.menu = true;
        }
        h.nav.push(NavEvent::VtsChange);
        h.nav.push(NavEvent::NavPacket {
            pci: Box::new(menu_pci()),
            dsi: Default::default(),
        });
        h.nav.push(NavEvent::Highlight { button: 1, pts: 0 });
        h.nav.push_block(private_sector(0x20, Some(1000), &mask_packet()));
        h.video.set_pts(2000);

        h.engine.start()?;
        h.ticks(4)?;
        assert_eq!(h.spu_rendered()?.len(), 1);

        h.commands.send(Command::Ok)?;
        h.ticks(1)?;
        assert_eq!(h.nav.count("button_activate"), 1);

        h.nav.push(NavEvent::Highlight { button: 1, pts: 0 });
        h.nav.push_block(private_sector(0x20, Some(1000), &mask_packet()));
        h.ticks(2)?;
        // The re-announced selection is ignored; the new mask waits.
        assert!(h.spu_rendered()?.is_empty());
        assert!(h.engine.highlight.is_awaiting_event());
        Ok(())
    }

    #[test]
    fn fast_forward_seeks_on_a_timer() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.nav.push(cell(900_000));
        h.engine.start()?;
        h.ticks(1)?;

        h.commands.send(Command::FastForward)?;
        h.ticks(1)?;
        assert_eq!(h.engine.session.trickmode, TrickMode::FastForward(2));
        assert!(h.audio.calls().contains(&"mute true".to_string()));

        h.ticks(2)?;
        assert_eq!(h.nav.count("sector_search"), 1);
        assert_eq!(h.nav.count("sector_search 90000"), 1);

        h.clock.advance(300);
        h.ticks(1)?;
        assert_eq!(h.nav.count("sector_search 180000"), 1);
        let events = h.events.drain()?;
        assert!(events.iter().any(|e| matches!(e, Event::StateFastForward(t) if t.speed == 2)));

        h.commands.send(Command::Play)?;
        h.ticks(1)?;
        assert!(h.engine.session.trickmode.is_off());
        assert_eq!(h.audio.calls().last().map(String::as_str), Some("continue"));
        assert!(h.audio.calls().contains(&"mute false".to_string()));
        assert!(h.events.drain()?.contains(&Event::StatePlay));
        Ok(())
    }

    #[test]
    fn backward_trick_stops_at_the_start() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.nav.push(cell(900_000));
        h.nav.0.borrow_mut().position.block = 45_000;
        h.engine.start()?;
        h.ticks(1)?;

        h.commands.send(Command::FastBackward)?;
        h.ticks(2)?;
        assert_eq!(h.nav.count("sector_search 0"), 1);
        assert!(h.engine.session.trickmode.is_off());
        let events = h.events.drain()?;
        assert!(matches!(events.as_slice(), [.., Event::Time(_), Event::StartOfFile]));
        Ok(())
    }

    #[test]
    fn step_returns_to_pause() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.engine.start()?;
        h.commands.send(Command::Pause)?;
        h.ticks(1)?;
        assert_eq!(h.engine.session.playmode, PlayMode::Paused);

        h.video.set_pts(1000);
        h.commands.send(Command::Right)?;
        h.ticks(1)?;
        assert_eq!(h.engine.session.playmode, PlayMode::Stepping);
        assert_eq!(h.engine.step_target, Some(1000 + 3 * 3600));

        h.video.set_pts(1000 + 3 * 3600);
        h.ticks(1)?;
        assert_eq!(h.engine.session.playmode, PlayMode::Paused);
        assert_eq!(
            h.video.calls().iter().filter(|c| *c == "pause").count(),
            2
        );
        Ok(())
    }

    #[test]
    fn exit_returns_a_resume_snapshot() -> Result<()> {
        let h = harness(PlayerConfig::default());
        {
            let mut nav = h.nav.0.borrow_mut();
            nav.title = 2;
            nav.part = 4;
            nav.position.block = 4242;
        }
        h.commands.send(Command::Exit)?;

        let nav = h.nav.clone();
        let video = h.video.clone();
        let outcome = h.engine.run()?;
        assert_eq!(
            outcome.resume,
            Some(ResumeSnapshot {
                title: 2,
                chapter: 4,
                block: 4242,
                audio_id: 0,
                audio_lock: false,
                spu_id: -1,
                spu_lock: false,
            })
        );
        assert_eq!(nav.calls().last().map(String::as_str), Some("close"));
        assert!(video.calls().contains(&"stop".to_string()));
        Ok(())
    }

    #[test]
    fn unknown_opcode_ends_the_session() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.engine.start()?;
        h.commands.send_raw(&99u32.to_le_bytes())?;

        let err = h.engine.tick().unwrap_err();
        assert!(matches!(err, EngineError::Protocol(ProtocolError::UnknownOpcode(99))));
        assert_eq!(err.result_code(), DdvdResult::Inval);
        Ok(())
    }

    #[test]
    fn device_errors_follow_fail_level() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.nav.push(NavEvent::VtsChange);
        h.engine.start()?;
        h.audio.0.borrow_mut().fail = true;
        h.ticks(1)?;

        let mut strict = harness(PlayerConfig {
            fail_level: Level::Warn,
            ..Default::default()
        });
        strict.nav.push(NavEvent::VtsChange);
        strict.engine.start()?;
        strict.audio.0.borrow_mut().fail = true;
        assert!(matches!(strict.engine.tick(), Err(EngineError::Device(_))));
        Ok(())
    }

    #[test]
    fn time_updates_once_per_second() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.nav.push(cell(900_000 * 10));
        h.nav.0.borrow_mut().position.block = 90_000;
        h.engine.start()?;
        h.ticks(1)?;
        h.events.drain()?;

        h.clock.advance(1000);
        h.ticks(3)?;
        let times: Vec<_> = h
            .events
            .drain()?
            .into_iter()
            .filter_map(|e| match e {
                Event::Time(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(times.len(), 1);
        // 90000 of 900000 blocks in a 100 s title.
        assert_eq!((times[0].pos_seconds, times[0].end_minutes), (10, 1));
        assert_eq!((times[0].pos_title, times[0].end_title), (1, 3));
        Ok(())
    }
}
