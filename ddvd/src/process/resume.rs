//! Two-phase restoration of a saved playback position.
//!
//! The navigation library can only seek to a block once the right title is
//! playing, so the jump happens on the first VTS change and the seek on the
//! cell change that follows it. The snapshot is applied completely or not
//! at all.

use log::{info, warn};

use crate::structs::nav::Navigator;
use crate::structs::session::{PlaybackSession, ResumePhase, ResumeSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeStep {
    /// Nothing to do in the current phase.
    Idle,
    /// Jumped to the saved title and chapter.
    Jumped,
    /// Seek succeeded; the stream selection of the snapshot is in effect.
    Restored(ResumeSnapshot),
    Discarded,
}

fn discard(session: &mut PlaybackSession, reason: &str) -> ResumeStep {
    warn!("Discarding resume position: {reason}");
    session.resume = None;
    session.resume_phase = ResumePhase::Idle;
    ResumeStep::Discarded
}

fn in_range(value: i32, max: i32) -> bool {
    value >= 1 && value <= max
}

/// First phase, run on the first VTS change after start.
pub fn on_vts_change<N: Navigator + ?Sized>(
    session: &mut PlaybackSession,
    nav: &mut N,
) -> ResumeStep {
    if session.resume_phase != ResumePhase::AwaitingVts {
        return ResumeStep::Idle;
    }
    let Some(snapshot) = session.resume else {
        session.resume_phase = ResumePhase::Idle;
        return ResumeStep::Idle;
    };

    let titles = nav.number_of_titles().unwrap_or(0);
    if !in_range(snapshot.title, titles) {
        return discard(
            session,
            &format!("title {} of {titles}", snapshot.title),
        );
    }
    let parts = nav.number_of_parts(snapshot.title).unwrap_or(0);
    if !in_range(snapshot.chapter, parts) {
        return discard(
            session,
            &format!("chapter {} of {parts}", snapshot.chapter),
        );
    }

    if let Err(e) = nav.part_play(snapshot.title, snapshot.chapter) {
        return discard(session, &e.to_string());
    }
    session.resume_phase = ResumePhase::AwaitingCell;
    ResumeStep::Jumped
}

/// Second phase, run on the cell change after the jump.
pub fn on_cell_change<N: Navigator + ?Sized>(
    session: &mut PlaybackSession,
    nav: &mut N,
) -> ResumeStep {
    if session.resume_phase != ResumePhase::AwaitingCell {
        return ResumeStep::Idle;
    }
    session.resume_phase = ResumePhase::Idle;
    let Some(snapshot) = session.resume.take() else {
        return ResumeStep::Idle;
    };

    if let Err(e) = nav.sector_search(snapshot.block) {
        warn!("Discarding resume position: {e}");
        return ResumeStep::Discarded;
    }

    session.audio_id = snapshot.audio_id;
    session.spu_index = snapshot.spu_id;
    session.audio_locked = true;
    session.spu_locked = true;
    info!(
        "Resumed title {} chapter {} at block {}",
        snapshot.title, snapshot.chapter, snapshot.block
    );
    ResumeStep::Restored(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::MockNav;
    use crate::structs::config::{TvAspect, TvMode};

    fn session(title: i32, chapter: i32) -> PlaybackSession {
        PlaybackSession::new(
            TvAspect::Ratio4x3,
            TvMode::Letterbox,
            Some(ResumeSnapshot {
                title,
                chapter,
                block: 4321,
                audio_id: 1,
                audio_lock: false,
                spu_id: 2,
                spu_lock: false,
            }),
        )
    }

    #[test]
    fn out_of_range_chapter_is_discarded() {
        let mut nav = MockNav::default();
        let mut s = session(1, 9);

        assert_eq!(on_vts_change(&mut s, &mut nav), ResumeStep::Discarded);
        assert_eq!(s.resume, None);
        assert_eq!(on_cell_change(&mut s, &mut nav), ResumeStep::Idle);
        assert_eq!(nav.count("part_play"), 0);
        assert_eq!(nav.count("sector_search"), 0);
    }

    #[test]
    fn restores_exactly_once() {
        let mut nav = MockNav::default();
        let mut s = session(2, 3);

        assert_eq!(on_vts_change(&mut s, &mut nav), ResumeStep::Jumped);
        assert_eq!(nav.calls(), ["part_play 2 3"]);
        // A second VTS change does not jump again.
        assert_eq!(on_vts_change(&mut s, &mut nav), ResumeStep::Idle);

        assert!(matches!(
            on_cell_change(&mut s, &mut nav),
            ResumeStep::Restored(ResumeSnapshot { block: 4321, .. })
        ));
        assert_eq!((s.audio_id, s.spu_index), (1, 2));
        assert!(s.audio_locked && s.spu_locked);
        assert_eq!(s.resume, None);

        s.audio_locked = false;
        for _ in 0..3 {
            assert_eq!(on_cell_change(&mut s, &mut nav), ResumeStep::Idle);
        }
        assert_eq!(nav.count("sector_search"), 1);
        assert!(!s.audio_locked);
    }

    #[test]
    fn failed_seek_discards() {
        let mut nav = MockNav::default();
        nav.0.borrow_mut().fail_seek = true;
        let mut s = session(1, 1);

        on_vts_change(&mut s, &mut nav);
        assert_eq!(on_cell_change(&mut s, &mut nav), ResumeStep::Discarded);
        assert_eq!(s.resume, None);
        assert_eq!(s.resume_phase, ResumePhase::Idle);
        assert!(!s.audio_locked);
    }
}
