//! Structural events reported by the navigation library.

use log::{debug, info, trace};

use super::{Engine, soft, tolerate};
use crate::process::aspect::check_aspect;
use crate::process::resume::{self, ResumeStep};
use crate::structs::nav::{
    CellInfo, NAV_STILL_VIDEO, NavEvent, STILL_INFINITE, SpuStreamChange,
};
use crate::structs::palette::Clut;
use crate::structs::session::{PlayMode, TvScale};
use crate::utils::errors::EngineError;

impl Engine {
    pub(super) fn handle_nav_event(&mut self, event: NavEvent) -> Result<(), EngineError> {
        match event {
            NavEvent::BlockReady => self.process_sector()?,
            NavEvent::Nop => {}
            NavEvent::StillFrame(length) => self.still_frame(length),
            NavEvent::Wait => {
                trace!("Navigation wait");
                soft(self.io.nav.wait_skip(), "wait_skip");
            }
            NavEvent::ClutChange(words) => {
                trace!("New colour table");
                self.clut = Clut::from_yuv(&words);
            }
            NavEvent::SpuStreamChange(change) => self.spu_stream_change(change),
            NavEvent::AudioStreamChange => {
                if self.session.audio_locked {
                    trace!("Audio stream locked, ignoring stream change");
                } else if let Some(id) = self.io.nav.active_audio_stream() {
                    debug!("Audio stream changed to {id}");
                    self.session.audio_id = i32::from(id);
                }
            }
            NavEvent::Highlight { button, pts } => {
                if let Some(button) = self.highlight.on_event(button, pts) {
                    self.draw_highlight(button);
                }
            }
            NavEvent::VtsChange => self.vts_change()?,
            NavEvent::CellChange(cell) => self.cell_change(cell)?,
            NavEvent::NavPacket { pci, dsi } => {
                if self.nav_still {
                    self.classifier.iframe_mut().request_redisplay();
                }
                self.nav_still = dsi.next_video == NAV_STILL_VIDEO;
                self.pci = *pci;
            }
            NavEvent::HopChannel => {
                trace!("Hop channel");
                self.play_empty(true)?;
            }
            NavEvent::Stop => {
                info!("Navigation reached the end of the disc");
                self.session.playmode = PlayMode::Stopped;
            }
        }
        Ok(())
    }

    fn still_frame(&mut self, length: u32) {
        self.still_frame = true;
        self.classifier.iframe_mut().request_redisplay();
        if length < STILL_INFINITE {
            if !self.timers.wait.is_armed() {
                debug!("Still frame for {length} s");
                let now = self.now();
                self.timers.wait.arm(now, u64::from(length) * 1000);
            }
        } else if !self.wait_for_user {
            debug!("Still frame until user input");
            self.wait_for_user = true;
        }
    }

    fn spu_stream_change(&mut self, change: SpuStreamChange) {
        if self.session.spu_locked {
            trace!("Subtitle stream locked, ignoring stream change");
            return;
        }
        let physical = match self.session.tv_scale {
            TvScale::Off => change.physical_wide,
            TvScale::Letterbox => change.physical_letterbox,
            TvScale::PanScan => change.physical_pan_scan,
        };
        let id = (change.logical >= 0).then_some(physical & 0x1F);
        if id != self.session.spu_active_stream_id {
            self.spu.reset();
        }
        self.session.spu_index = change.logical;
        self.session.spu_active_stream_id = id;
        debug!(
            "Subtitle stream changed to {} ({:?})",
            change.logical, self.session.spu_active_stream_id
        );
    }

    fn vts_change(&mut self) -> Result<(), EngineError> {
        self.play_empty(true)?;
        self.session.audio_locked = false;
        self.session.spu_locked = false;
        self.classifier.formats_mut().reset();

        let nav = self.io.nav.as_ref();
        self.session.dvd_aspect = nav.video_aspect();
        self.session.dvd_scale_perm = nav.video_scale_permission();
        let (scale, policy) = check_aspect(
            self.session.dvd_aspect,
            self.session.dvd_scale_perm,
            self.session.tv_aspect,
            self.session.tv_mode,
        );
        self.session.tv_scale = scale;

        self.spu_languages.rebuild(nav);
        self.session.audio_id = nav.active_audio_stream().map_or(0, i32::from);
        let spu = nav.active_spu_stream().map(|s| s & 0x1F);
        self.session.spu_active_stream_id = spu;
        self.session.spu_index = spu
            .and_then(|s| self.spu_languages.index_of(s))
            .map_or(-1, |i| i as i32);
        info!(
            "Title set changed: aspect {} scale {scale:?}, audio {} subtitle {}",
            self.session.dvd_aspect, self.session.audio_id, self.session.spu_index
        );

        tolerate(self.policy, self.io.video.set_display_policy(policy))?;
        resume::on_vts_change(&mut self.session, self.io.nav.as_mut());
        Ok(())
    }

    fn cell_change(&mut self, cell: CellInfo) -> Result<(), EngineError> {
        trace!("Cell {} of program {}", cell.cell, cell.program);
        self.cell = cell;
        if self.cell_still {
            self.classifier.iframe_mut().request_redisplay();
        }
        self.cell_still = self.io.nav.next_still_flag();

        if let ResumeStep::Restored(snapshot) =
            resume::on_cell_change(&mut self.session, self.io.nav.as_mut())
        {
            self.session.spu_active_stream_id = usize::try_from(snapshot.spu_id)
                .ok()
                .and_then(|i| self.spu_languages.get(i))
                .map(|l| l.stream_id & 0x1F);
            self.play_empty(true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::process::classify::private_sector;
    use crate::process::engine::tests::harness;
    use crate::process::spu_decode::tests::SOLID_BLOCK;
    use crate::structs::command::Command;
    use crate::structs::config::PlayerConfig;
    use crate::structs::nav::{CellInfo, NavEvent, SpuStreamChange, lang_code};
    use crate::structs::session::{PlayMode, ResumeSnapshot};
    use anyhow::Result;

    #[test]
    fn title_set_change_picks_up_the_streams() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        {
            let mut nav = h.nav.0.borrow_mut();
            nav.audio_stream = Some(1);
            nav.spu_stream = Some(0x82);
            nav.spu_streams = vec![(0, lang_code("en")), (2, lang_code("de"))];
            nav.aspect = 3;
        }
        h.nav.push(NavEvent::VtsChange);
        h.engine.start()?;
        h.ticks(1)?;

        let session = h.engine.session();
        assert_eq!(session.audio_id, 1);
        assert_eq!(session.spu_active_stream_id, Some(2));
        assert_eq!(session.spu_index, 1);
        assert!(session.is_dvd_wide());
        assert!(h.video.calls().iter().any(|c| c.starts_with("policy")));
        Ok(())
    }

    #[test]
    fn locked_subtitle_ignores_stream_changes() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        let change = SpuStreamChange {
            physical_wide: 3,
            physical_letterbox: 4,
            physical_pan_scan: 5,
            logical: 2,
        };
        h.nav.push(NavEvent::SpuStreamChange(change));
        h.engine.start()?;
        h.ticks(1)?;
        assert_eq!(h.engine.session().spu_active_stream_id, Some(3));
        assert_eq!(h.engine.session().spu_index, 2);

        h.commands.send(Command::SetSubtitle(-1))?;
        h.ticks(1)?;
        h.nav.push(NavEvent::SpuStreamChange(change));
        h.ticks(1)?;
        assert_eq!(h.engine.session().spu_active_stream_id, None);
        assert_eq!(h.engine.session().spu_index, -1);
        Ok(())
    }

    #[test]
    fn stream_change_drops_a_partial_subpicture() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.nav.0.borrow_mut().spu_stream = Some(0);
        h.nav.push(NavEvent::VtsChange);
        h.nav.push_block(private_sector(0x20, Some(90_000), &SOLID_BLOCK[..10]));
        h.engine.start()?;
        h.ticks(2)?;
        assert_eq!(h.engine.spu.in_progress(), 10);

        // Same physical stream: the packet keeps collecting.
        let mut change = SpuStreamChange {
            physical_wide: 0,
            physical_letterbox: 0,
            physical_pan_scan: 0,
            logical: 0,
        };
        h.nav.push(NavEvent::SpuStreamChange(change));
        h.ticks(1)?;
        assert_eq!(h.engine.spu.in_progress(), 10);

        change.physical_wide = 1;
        h.nav.push(NavEvent::SpuStreamChange(change));
        h.ticks(1)?;
        assert_eq!(h.engine.session().spu_active_stream_id, Some(1));
        assert_eq!(h.engine.spu.in_progress(), 0);
        Ok(())
    }

    #[test]
    fn timed_still_skips_when_it_elapses() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.nav.push(NavEvent::StillFrame(2));
        h.nav.push(NavEvent::StillFrame(2));
        h.engine.start()?;
        h.ticks(2)?;
        assert_eq!(h.nav.count("still_skip"), 0);

        h.clock.advance(1999);
        h.ticks(1)?;
        assert_eq!(h.nav.count("still_skip"), 0);
        h.clock.advance(1);
        h.ticks(1)?;
        assert_eq!(h.nav.count("still_skip"), 1);
        Ok(())
    }

    #[test]
    fn infinite_still_waits_for_the_user() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.nav.push(NavEvent::StillFrame(0xFF));
        h.nav.push(NavEvent::Stop);
        h.engine.start()?;
        h.ticks(3)?;
        // Reading is suspended, the stop is not reached.
        assert_eq!(h.engine.session().playmode, PlayMode::Playing);

        h.commands.send(Command::Ok)?;
        h.ticks(1)?;
        assert_eq!(h.nav.count("still_skip"), 1);
        assert!(!h.engine.tick()?);
        Ok(())
    }

    #[test]
    fn resume_jumps_then_seeks() -> Result<()> {
        let mut h = harness(PlayerConfig {
            resume: Some(ResumeSnapshot {
                title: 2,
                chapter: 3,
                block: 777,
                audio_id: 0,
                audio_lock: true,
                spu_id: 1,
                spu_lock: true,
            }),
            ..Default::default()
        });
        h.nav.0.borrow_mut().spu_streams = vec![(0, lang_code("en")), (5, lang_code("fr"))];
        h.nav.push(NavEvent::VtsChange);
        h.nav.push(NavEvent::CellChange(CellInfo::default()));
        h.nav.push(NavEvent::CellChange(CellInfo::default()));
        h.engine.start()?;
        h.ticks(3)?;

        assert_eq!(h.nav.calls()[2..], ["part_play 2 3", "sector_search 777"]);
        let session = h.engine.session();
        assert_eq!(session.spu_active_stream_id, Some(5));
        assert_eq!(session.spu_index, 1);
        assert!(session.audio_locked && session.spu_locked);
        Ok(())
    }

    #[test]
    fn stop_ends_the_session() -> Result<()> {
        let mut h = harness(PlayerConfig::default());
        h.nav.push(NavEvent::Stop);
        h.engine.start()?;
        assert!(!h.engine.tick()?);
        assert_eq!(h.engine.session().playmode, PlayMode::Stopped);
        Ok(())
    }
}
