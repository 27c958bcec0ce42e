//! Remote-control command handling.

use log::{debug, info, trace, warn};

use super::{Engine, soft, tolerate};
use crate::process::trick::{self, Boundary, TICKS_PER_SECOND};
use crate::structs::command::Command;
use crate::structs::event::{AngleInfo, AudioInfo, Event, SubtitleInfo};
use crate::structs::nav::{ButtonMove, LANG_NONE, MAX_AUDIO_STREAMS, MenuId};
use crate::structs::session::{PlayMode, ResumeSnapshot, TrickMode};
use crate::utils::errors::EngineError;

impl Engine {
    pub(super) fn handle_command(&mut self, command: Command) -> Result<(), EngineError> {
        debug!("Command {command}");
        match command {
            Command::Null => {}
            Command::Exit => self.exit(),
            Command::SetTitle(title) => self.set_title(title)?,
            Command::SetChapter(chapter) => self.set_chapter(chapter)?,
            Command::GetTime => self.emit(Event::Time(self.time_info())),
            Command::GetAngle => self.emit_angle(),
            Command::SetMute(mute) => {
                self.session.mute = mute;
                let muted = mute || !self.session.trickmode.is_off();
                tolerate(self.policy, self.io.audio.set_mute(muted))?;
            }
            Command::Menu => self.call_menu(MenuId::Root)?,
            Command::AudioMenu => self.call_menu(MenuId::Audio)?,
            other if self.session.in_menu => self.menu_key(other)?,
            other => self.movie_key(other)?,
        }
        Ok(())
    }

    fn menu_key(&mut self, command: Command) -> Result<(), EngineError> {
        let direction = match command {
            Command::Up => ButtonMove::Up,
            Command::Down => ButtonMove::Down,
            Command::Left => ButtonMove::Left,
            Command::Right => ButtonMove::Right,
            Command::Ok => return self.activate_button(),
            other => {
                trace!("Ignoring {other} in a menu");
                return Ok(());
            }
        };
        soft(self.io.nav.button_move(&self.pci, direction), "button_move");
        Ok(())
    }

    fn activate_button(&mut self) -> Result<(), EngineError> {
        self.play_empty(true)?;
        self.highlight.suppress_next();
        self.screen.clear();
        self.screen_dirty = true;
        soft(self.io.nav.button_activate(&self.pci), "button_activate");
        Ok(())
    }

    fn movie_key(&mut self, command: Command) -> Result<(), EngineError> {
        let paused = self.session.playmode == PlayMode::Paused;
        match command {
            Command::Left | Command::Right | Command::Up | Command::Down if paused => {
                self.step()?
            }
            Command::Left => self.step_chapter(false)?,
            Command::Right => self.step_chapter(true)?,
            Command::Up => self.step_title(true)?,
            Command::Down => self.step_title(false)?,
            Command::Ok if self.wait_for_user => {
                debug!("Leaving still frame");
                self.wait_for_user = false;
                self.still_frame = false;
                soft(self.io.nav.still_skip(), "still_skip");
            }
            Command::Play => self.play()?,
            Command::Pause => self.pause()?,
            Command::NextChapter => self.step_chapter(true)?,
            Command::PrevChapter => self.step_chapter(false)?,
            Command::NextTitle => self.step_title(true)?,
            Command::PrevTitle => self.step_title(false)?,
            Command::FastForward => self.change_speed(trick::fast_forward_key)?,
            Command::FastBackward => self.change_speed(trick::fast_backward_key)?,
            Command::SlowForward => self.change_speed(trick::slow_forward_key)?,
            Command::SlowBackward => self.change_speed(trick::slow_backward_key)?,
            Command::Audio => self.cycle_audio()?,
            Command::Subtitle => self.cycle_subtitle(),
            Command::SetAudio(id) => self.set_audio(id)?,
            Command::SetSubtitle(id) => self.set_subtitle(id),
            Command::SkipSeconds(seconds) => {
                if self.session.trickmode.is_off() {
                    self.seek_relative(i64::from(seconds) * TICKS_PER_SECOND);
                } else {
                    debug!("Ignoring skip during trick mode");
                }
            }
            Command::SeekAbsolute(seconds) => self.seek_absolute(seconds),
            Command::Angle => self.cycle_angle(),
            other => trace!("Ignoring {other} outside a menu"),
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.snapshot = self.capture_snapshot();
        match &self.snapshot {
            Some(s) => info!(
                "Exit at title {} chapter {} block {}",
                s.title, s.chapter, s.block
            ),
            None => info!("Exit outside a title, no resume position"),
        }
        self.session.playmode = PlayMode::Stopped;
    }

    fn capture_snapshot(&self) -> Option<ResumeSnapshot> {
        let (title, chapter) = self.io.nav.current_title_info()?;
        if title <= 0 {
            return None;
        }
        let block = self.io.nav.position()?.block;
        Some(ResumeSnapshot {
            title,
            chapter,
            block,
            audio_id: self.session.audio_id,
            audio_lock: self.session.audio_locked,
            spu_id: self.session.spu_index,
            spu_lock: self.session.spu_locked,
        })
    }

    fn call_menu(&mut self, menu: MenuId) -> Result<(), EngineError> {
        if soft(self.io.nav.menu_call(menu), "menu_call") {
            self.end_trick()?;
            self.play_empty(true)?;
        }
        Ok(())
    }

    fn set_title(&mut self, title: i32) -> Result<(), EngineError> {
        let total = self.io.nav.number_of_titles().unwrap_or(0);
        if !(1..=total).contains(&title) {
            warn!("Title {title} out of range 1..={total}");
            return Ok(());
        }
        if self.session.in_menu {
            soft(self.io.nav.reset(), "reset");
            soft(self.io.nav.title_play(title), "title_play");
        } else {
            self.play_empty(true)?;
            soft(self.io.nav.part_play(title, 1), "part_play");
        }
        self.emit(Event::Time(self.time_info()));
        Ok(())
    }

    fn set_chapter(&mut self, chapter: i32) -> Result<(), EngineError> {
        let title = self
            .io
            .nav
            .current_title_info()
            .map_or(1, |(title, _)| title.max(1));
        let parts = self.io.nav.number_of_parts(title).unwrap_or(0);
        if !(1..=parts).contains(&chapter) {
            warn!("Chapter {chapter} out of range 1..={parts}");
            return Ok(());
        }
        if self.session.in_menu {
            soft(self.io.nav.reset(), "reset");
            soft(self.io.nav.title_play(title), "title_play");
        } else {
            self.play_empty(true)?;
        }
        soft(self.io.nav.part_play(title, chapter), "part_play");
        self.emit(Event::Time(self.time_info()));
        Ok(())
    }

    fn step_chapter(&mut self, forward: bool) -> Result<(), EngineError> {
        let Some((title, part)) = self.io.nav.current_title_info() else {
            return Ok(());
        };
        if title <= 0 {
            return Ok(());
        }
        let parts = self.io.nav.number_of_parts(title).unwrap_or(0);
        let target = if forward { part + 1 } else { part - 1 };
        if !(1..=parts).contains(&target) {
            debug!("No chapter {target} in title {title}");
            return Ok(());
        }
        self.play_empty(true)?;
        soft(self.io.nav.part_play(title, target), "part_play");
        self.emit(Event::Time(self.time_info()));
        Ok(())
    }

    fn step_title(&mut self, forward: bool) -> Result<(), EngineError> {
        let total = self.io.nav.number_of_titles().unwrap_or(0);
        if total <= 0 {
            return Ok(());
        }
        let title = self
            .io
            .nav
            .current_title_info()
            .map_or(1, |(title, _)| title.max(1));
        let target = match forward {
            true => title % total + 1,
            false if title <= 1 => total,
            false => title - 1,
        };
        soft(self.io.nav.part_play(target, 1), "part_play");
        self.play_empty(true)?;
        self.emit(Event::Time(self.time_info()));
        Ok(())
    }

    fn change_speed(&mut self, key: fn(TrickMode) -> TrickMode) -> Result<(), EngineError> {
        match key(self.session.trickmode) {
            TrickMode::Off => self.play(),
            mode => self.enter_trick(mode),
        }
    }

    fn cycle_audio(&mut self) -> Result<(), EngineError> {
        let max = MAX_AUDIO_STREAMS as i32;
        let current = self.session.audio_id;
        let next = (1..=max)
            .map(|step| (current + step).rem_euclid(max))
            .find(|&id| self.io.nav.audio_stream_to_lang(id as u8).is_some());
        match next {
            Some(id) => self.select_audio(id),
            None => {
                debug!("No audio stream with a known language");
                Ok(())
            }
        }
    }

    fn set_audio(&mut self, id: i32) -> Result<(), EngineError> {
        let known = u8::try_from(id)
            .ok()
            .filter(|&id| usize::from(id) < MAX_AUDIO_STREAMS)
            .and_then(|id| self.io.nav.audio_stream_to_lang(id));
        if known.is_none() {
            warn!("Audio stream {id} does not exist");
            return Ok(());
        }
        self.select_audio(id)
    }

    fn select_audio(&mut self, id: i32) -> Result<(), EngineError> {
        let lang = self.io.nav.audio_stream_to_lang(id as u8).unwrap_or(0);
        self.play_empty(true)?;
        self.session.audio_id = id;
        self.session.audio_locked = true;
        let format = self
            .classifier
            .formats()
            .get(id as usize)
            .map_or(0, |f| f.type_code());
        info!("Audio stream {id} selected");
        self.emit(Event::Audio(AudioInfo { id, lang, format }));
        Ok(())
    }

    fn cycle_subtitle(&mut self) {
        let current = usize::try_from(self.session.spu_index).ok();
        let next = self.spu_languages.next_after(current);
        self.select_subtitle(next);
    }

    fn set_subtitle(&mut self, id: i32) {
        match usize::try_from(id) {
            Err(_) => self.select_subtitle(None),
            Ok(index) if self.spu_languages.get(index).is_some() => {
                self.select_subtitle(Some(index))
            }
            Ok(_) => warn!("Subtitle stream {id} does not exist"),
        }
    }

    fn select_subtitle(&mut self, index: Option<usize>) {
        let selected = index.and_then(|i| self.spu_languages.get(i).map(|l| (i, l)));
        let (id, lang) = match selected {
            Some((i, language)) => {
                self.session.spu_active_stream_id = Some(language.stream_id & 0x1F);
                (i as i32, language.lang)
            }
            None => {
                self.session.spu_active_stream_id = None;
                (-1, LANG_NONE)
            }
        };
        self.session.spu_index = id;
        self.session.spu_locked = true;
        self.ring.flush();
        self.spu.reset();
        self.timers.spu.cancel();
        self.screen.clear();
        self.screen_dirty = true;
        info!("Subtitle stream {id} selected");
        self.emit(Event::Subtitle(SubtitleInfo { id, lang }));
    }

    fn seek_relative(&mut self, offset: i64) {
        let Some(pos) = self.io.nav.position() else {
            return;
        };
        self.seek_from(pos.block, pos.length, offset);
    }

    fn seek_absolute(&mut self, seconds: i32) {
        let Some(pos) = self.io.nav.position() else {
            return;
        };
        self.seek_from(0, pos.length, i64::from(seconds) * TICKS_PER_SECOND);
    }

    fn seek_from(&mut self, block: u32, length: u32, offset: i64) {
        let target = trick::seek_target(block, length, self.cell.pgc_length, offset);
        debug!("Seeking {offset} ticks from block {block} to {}", target.block);
        soft(self.io.nav.sector_search(target.block), "sector_search");
        self.audio.reset_resync();
        self.ring.flush();
        self.emit(Event::Time(self.time_info()));
        match target.boundary {
            Some(Boundary::End) => self.emit(Event::EndOfFile),
            Some(Boundary::Start) => self.emit(Event::StartOfFile),
            None => {}
        }
    }

    fn cycle_angle(&mut self) {
        let (current, count) = self.io.nav.angle_info();
        if count > 1 {
            soft(self.io.nav.angle_change(current % count + 1), "angle_change");
        }
        self.emit_angle();
    }

    fn emit_angle(&self) {
        let (current, count) = self.io.nav.angle_info();
        self.emit(Event::Angle(AngleInfo { current, count }));
    }
}
