//! Menu button highlighting.
//!
//! Drawing a highlighted button needs two things that arrive independently:
//! a highlight event from the navigation library naming the button, and a
//! highlight-mask subpicture holding the button pixels. Whichever comes
//! second triggers the draw.

use log::{debug, trace};

use crate::structs::nav::{ButtonInfo, HighlightArea, HighlightInfo, MAX_BUTTONS};
use crate::structs::session::TvScale;
use crate::structs::spu::BoundingBox;

/// A consumed highlight-mask subpicture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightMask {
    pub bbox: BoundingBox,
    pub pixels: Vec<u8>,
    /// Button table valid when the mask was decoded.
    pub info: Option<HighlightInfo>,
    pub pts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingHighlight {
    pub button: u32,
    pub pts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskOutcome {
    /// A highlight event is already waiting; draw `button` now.
    Draw { button: u32 },
    /// Ask the navigation library to re-announce its current button.
    AwaitEvent,
}

#[derive(Debug, Default)]
pub struct HighlightCoordinator {
    pending: Option<PendingHighlight>,
    mask: Option<HighlightMask>,
    awaiting_event: bool,
    suppress_next: bool,
}

impl HighlightCoordinator {
    pub fn mask(&self) -> Option<&HighlightMask> {
        self.mask.as_ref()
    }

    pub fn is_awaiting_event(&self) -> bool {
        self.awaiting_event
    }

    pub fn pending(&self) -> Option<PendingHighlight> {
        self.pending
    }

    /// Ignores the next highlight event. Activating a button makes the
    /// library announce the old selection once more.
    pub fn suppress_next(&mut self) {
        self.suppress_next = true;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn on_mask(&mut self, mask: HighlightMask) -> MaskOutcome {
        trace!("Highlight mask {:?} at pts {}", mask.bbox, mask.pts);
        self.mask = Some(mask);
        match self.pending.take() {
            Some(p) => {
                self.awaiting_event = false;
                MaskOutcome::Draw { button: p.button }
            }
            None => {
                self.awaiting_event = true;
                MaskOutcome::AwaitEvent
            }
        }
    }

    /// Returns the button to draw, if the mask for it is already known.
    pub fn on_event(&mut self, button: u32, pts: u32) -> Option<u32> {
        if std::mem::take(&mut self.suppress_next) {
            debug!("Ignoring stale highlight of button {button}");
            return None;
        }
        if self.mask.is_none() {
            trace!("Highlight of button {button} waits for its mask");
            self.pending = Some(PendingHighlight { button, pts });
            return None;
        }
        self.pending = None;
        self.awaiting_event = false;
        Some(button)
    }
}

/// Where and in which colours a button is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonHighlight {
    pub area: BoundingBox,
    /// Colour word: CLUT indices in bits 16..32, contrast in bits 0..16.
    pub coli: u32,
}

fn group_button(info: &HighlightInfo, button: u32, tv_scale: TvScale) -> Option<&ButtonInfo> {
    let groups = usize::from(info.group_count.min(3));
    if groups == 0 || button == 0 {
        return None;
    }
    let per_group = MAX_BUTTONS / groups;
    let mode_mask = 1u8 << (tv_scale as u8);
    let group = (0..groups).find(|&g| info.group_display[g] & mode_mask != 0)?;
    info.buttons.get(group * per_group + button as usize - 1)
}

fn area(sx: u16, sy: u16, ex: u16, ey: u16) -> Option<BoundingBox> {
    let bbox = BoundingBox {
        x1: sx,
        y1: sy,
        x2: ex.checked_sub(1)?,
        y2: ey.checked_sub(1)?,
    };
    bbox.is_valid().then_some(bbox)
}

/// Resolves the rectangle and colours of `button`.
///
/// The group matching the current display mode is preferred; otherwise
/// `fallback` supplies the library's generic highlight area.
pub fn button_highlight(
    info: &HighlightInfo,
    button: u32,
    tv_scale: TvScale,
    fallback: impl FnOnce() -> Option<HighlightArea>,
) -> Option<ButtonHighlight> {
    if let Some(btn) = group_button(info, button, tv_scale) {
        if btn.color_index != 0 {
            let coli = info
                .colors
                .get(usize::from(btn.color_index) - 1)
                .map_or(0, |c| c[0]);
            if let Some(area) = area(btn.x_start, btn.y_start, btn.x_end, btn.y_end) {
                return Some(ButtonHighlight { area, coli });
            }
        }
    }

    let hl = fallback()?;
    Some(ButtonHighlight {
        area: area(hl.sx, hl.sy, hl.ex, hl.ey)?,
        coli: hl.palette,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::nav::Pci;

    fn mask() -> HighlightMask {
        HighlightMask {
            bbox: BoundingBox {
                x1: 0,
                y1: 0,
                x2: 9,
                y2: 9,
            },
            pixels: vec![253; 100],
            info: None,
            pts: 1000,
        }
    }

    #[test]
    fn mask_before_event() {
        let mut hl = HighlightCoordinator::default();
        assert_eq!(hl.on_mask(mask()), MaskOutcome::AwaitEvent);
        assert!(hl.is_awaiting_event());

        assert_eq!(hl.on_event(2, 1000), Some(2));
        assert!(!hl.is_awaiting_event());
        assert_eq!(hl.pending(), None);
    }

    #[test]
    fn event_before_mask() {
        let mut hl = HighlightCoordinator::default();
        assert_eq!(hl.on_event(3, 500), None);
        assert_eq!(hl.pending(), Some(PendingHighlight { button: 3, pts: 500 }));

        assert_eq!(hl.on_mask(mask()), MaskOutcome::Draw { button: 3 });
        assert_eq!(hl.pending(), None);
        // Moving the selection redraws from the same mask.
        assert_eq!(hl.on_event(4, 600), Some(4));
    }

    #[test]
    fn stale_event_after_activation() {
        let mut hl = HighlightCoordinator::default();
        hl.on_mask(mask());
        hl.suppress_next();
        assert_eq!(hl.on_event(1, 0), None);
        assert_eq!(hl.on_event(1, 0), Some(1));
    }

    #[test]
    fn group_for_display_mode() {
        let mut info = HighlightInfo {
            group_count: 2,
            group_display: [0b001, 0b110, 0],
            ..Default::default()
        };
        info.buttons[0] = ButtonInfo {
            x_start: 10,
            x_end: 20,
            y_start: 10,
            y_end: 20,
            color_index: 1,
        };
        info.buttons[18] = ButtonInfo {
            x_start: 30,
            x_end: 40,
            y_start: 50,
            y_end: 60,
            color_index: 2,
        };
        info.colors = [[0x1111_0000, 0], [0x2222_0000, 0], [0, 0]];

        let normal = button_highlight(&info, 1, TvScale::Off, || None).unwrap();
        assert_eq!(normal.area, BoundingBox { x1: 10, y1: 10, x2: 19, y2: 19 });
        assert_eq!(normal.coli, 0x1111_0000);

        let letterbox = button_highlight(&info, 1, TvScale::Letterbox, || None).unwrap();
        assert_eq!(letterbox.area, BoundingBox { x1: 30, y1: 50, x2: 39, y2: 59 });
        assert_eq!(letterbox.coli, 0x2222_0000);
    }

    #[test]
    fn generic_area_fallback() {
        let mut pci = Pci {
            button_count: 1,
            ..Default::default()
        };
        pci.highlight.buttons[0] = ButtonInfo {
            x_start: 100,
            x_end: 200,
            y_start: 300,
            y_end: 320,
            color_index: 3,
        };
        pci.highlight.colors[2] = [0x00AB_00CD, 0];

        // No button groups: the generic query decides.
        let hl = button_highlight(&pci.highlight, 1, TvScale::Off, || {
            pci.highlight_area(1, 0)
        })
        .unwrap();
        assert_eq!(hl.area, BoundingBox { x1: 100, y1: 300, x2: 199, y2: 319 });
        assert_eq!(hl.coli, 0x00AB_00CD);

        assert!(button_highlight(&pci.highlight, 2, TvScale::Off, || None).is_none());
    }
}
