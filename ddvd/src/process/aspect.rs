use log::debug;

use crate::structs::config::{TvAspect, TvMode};
use crate::structs::session::TvScale;
use crate::structs::sink::{DisplayFormat, DisplayPolicy, VideoAspect};

/// Scale permission bit forbidding letterbox.
const NO_LETTERBOX: u8 = 0x01;
/// Scale permission bit forbidding pan&scan.
const NO_PAN_SCAN: u8 = 0x02;

/// Picks the scaling for a title set from its aspect (`0` = 4:3, `3` = 16:9)
/// and scale permissions, and the TV configuration.
pub fn check_aspect(
    dvd_aspect: u8,
    scale_perm: u8,
    tv_aspect: TvAspect,
    tv_mode: TvMode,
) -> (TvScale, DisplayPolicy) {
    let dvd_wide = dvd_aspect != 0;

    let (scale, policy) = if tv_mode == TvMode::JustScale {
        (
            TvScale::Off,
            DisplayPolicy {
                aspect: VideoAspect::Ratio16x9,
                format: DisplayFormat::FullScreen,
            },
        )
    } else if tv_aspect.is_wide() {
        let format = if dvd_wide {
            DisplayFormat::CenterCutOut
        } else {
            DisplayFormat::PanScan
        };
        (
            TvScale::Off,
            DisplayPolicy {
                aspect: VideoAspect::Ratio16x9,
                format,
            },
        )
    } else {
        let scale = if !dvd_wide {
            TvScale::Off
        } else if scale_perm & NO_LETTERBOX == 0 {
            TvScale::Letterbox
        } else if scale_perm & NO_PAN_SCAN == 0 {
            TvScale::PanScan
        } else {
            TvScale::Letterbox
        };
        let scale = if tv_mode == TvMode::PanScan
            && scale == TvScale::Letterbox
            && scale_perm & NO_PAN_SCAN == 0
        {
            TvScale::PanScan
        } else {
            scale
        };
        let format = match scale {
            TvScale::Letterbox => DisplayFormat::Letterbox,
            TvScale::Off | TvScale::PanScan => DisplayFormat::PanScan,
        };
        (
            scale,
            DisplayPolicy {
                aspect: VideoAspect::Ratio4x3,
                format,
            },
        )
    };

    debug!(
        "DVD aspect {dvd_aspect}, permission {scale_perm:#x}, TV {tv_aspect:?}/{tv_mode:?}: \
         scale {scale:?}, {policy:?}"
    );
    (scale, policy)
}

#[test]
fn aspect_policies() {
    use DisplayFormat::*;

    let check = |dvd, perm, tv, mode| {
        let (scale, policy) = check_aspect(dvd, perm, tv, mode);
        (scale, policy.format)
    };

    assert_eq!(
        check(0, 0, TvAspect::Ratio16x9, TvMode::Letterbox),
        (TvScale::Off, PanScan)
    );
    assert_eq!(
        check(3, 0, TvAspect::Ratio16x10, TvMode::Letterbox),
        (TvScale::Off, CenterCutOut)
    );
    assert_eq!(
        check(0, 0, TvAspect::Ratio4x3, TvMode::Letterbox),
        (TvScale::Off, PanScan)
    );
    assert_eq!(
        check(3, 0, TvAspect::Ratio4x3, TvMode::Letterbox),
        (TvScale::Letterbox, Letterbox)
    );
    assert_eq!(
        check(3, NO_LETTERBOX, TvAspect::Ratio4x3, TvMode::Letterbox),
        (TvScale::PanScan, PanScan)
    );
    assert_eq!(
        check(3, NO_LETTERBOX | NO_PAN_SCAN, TvAspect::Ratio4x3, TvMode::Letterbox),
        (TvScale::Letterbox, Letterbox)
    );
    assert_eq!(
        check(3, 0, TvAspect::Ratio4x3, TvMode::PanScan),
        (TvScale::PanScan, PanScan)
    );
    assert_eq!(
        check(3, NO_PAN_SCAN, TvAspect::Ratio4x3, TvMode::PanScan),
        (TvScale::Letterbox, Letterbox)
    );
    assert_eq!(
        check(3, 0, TvAspect::Ratio4x3, TvMode::JustScale),
        (TvScale::Off, FullScreen)
    );
}
