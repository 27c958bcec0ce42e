//! YAML configuration and resume files of the front end.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use log::Level;
use serde::{Deserialize, Serialize};

use crate::cli::command::{
    ColorDepthArg, PlayArgs, PtsEncodingArg, TvAspectArg, TvModeArg, TvSystemArg,
};
use ddvd::structs::config::{BlitGeometry, ColorDepth, PlayerConfig, TvAspect, TvMode, TvSystem};
use ddvd::structs::pes::PtsEncoding;
use ddvd::structs::session::ResumeSnapshot;

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub language: Option<String>,
    pub tv_aspect: Option<TvAspectArg>,
    pub tv_mode: Option<TvModeArg>,
    pub tv_system: Option<TvSystemArg>,
    pub ac3_passthrough: Option<bool>,
    /// Overlay bits per pixel, 8 or 32.
    pub color_depth: Option<u8>,
    pub blit: Option<BlitFile>,
    pub dvd_path: Option<String>,
    pub pts_encoding: Option<PtsEncodingArg>,
    pub spu_ring_capacity: Option<usize>,
    /// 90 kHz ticks.
    pub spu_sync_tolerance: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlitFile {
    pub x_offset: i32,
    pub y_offset: i32,
    pub width: i32,
    pub height: i32,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    pub fn into_player_config(self) -> Result<PlayerConfig> {
        let mut config = PlayerConfig::default();
        if let Some(language) = self.language {
            config.language = language;
        }
        if let Some(aspect) = self.tv_aspect {
            config.tv_aspect = aspect.into();
        }
        if let Some(mode) = self.tv_mode {
            config.tv_mode = mode.into();
        }
        if let Some(system) = self.tv_system {
            config.tv_system = system.into();
        }
        if let Some(passthrough) = self.ac3_passthrough {
            config.ac3_passthrough = passthrough;
        }
        if let Some(bpp) = self.color_depth {
            config.color_depth = match bpp {
                8 => ColorDepth::Indexed8,
                32 => ColorDepth::Argb32,
                other => bail!("color_depth must be 8 or 32, got {other}"),
            };
        }
        if let Some(blit) = self.blit {
            ensure!(
                blit.width > 0 && blit.height > 0,
                "blit size must be positive, got {}x{}",
                blit.width,
                blit.height
            );
            config.blit = BlitGeometry {
                x_offset: blit.x_offset,
                y_offset: blit.y_offset,
                width: blit.width,
                height: blit.height,
            };
        }
        if let Some(path) = self.dvd_path {
            config.dvd_path = path;
        }
        if let Some(encoding) = self.pts_encoding {
            config.pts_encoding = encoding.into();
        }
        if let Some(capacity) = self.spu_ring_capacity {
            ensure!(capacity > 0, "spu_ring_capacity must be at least 1");
            config.spu_ring_capacity = capacity;
        }
        if let Some(tolerance) = self.spu_sync_tolerance {
            config.spu_sync_tolerance = tolerance;
        }
        validate_language(&config.language)?;
        Ok(config)
    }
}

fn validate_language(language: &str) -> Result<()> {
    ensure!(
        language.len() == 2 && language.bytes().all(|b| b.is_ascii_alphabetic()),
        "language must be a two-letter code, got '{language}'"
    );
    Ok(())
}

/// Player configuration from the optional config file with the `play`
/// flags applied on top.
pub fn player_config(config_file: Option<&Path>, args: &PlayArgs, strict: bool) -> Result<PlayerConfig> {
    let file = match config_file {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let mut config = file.into_player_config()?;

    if let Some(language) = &args.language {
        validate_language(language)?;
        config.language = language.to_ascii_lowercase();
    }
    if let Some(aspect) = args.tv_aspect {
        config.tv_aspect = aspect.into();
    }
    if let Some(mode) = args.tv_mode {
        config.tv_mode = mode.into();
    }
    if let Some(system) = args.tv_system {
        config.tv_system = system.into();
    }
    if let Some(depth) = args.color_depth {
        config.color_depth = depth.into();
    }
    if let Some(encoding) = args.pts_encoding {
        config.pts_encoding = encoding.into();
    }
    config.ac3_passthrough |= args.ac3_passthrough;
    config.dvd_path = args.input.to_string_lossy().into_owned();
    if strict {
        config.fail_level = Level::Warn;
    }
    Ok(config)
}

impl From<TvAspectArg> for TvAspect {
    fn from(value: TvAspectArg) -> Self {
        match value {
            TvAspectArg::Ratio4x3 => TvAspect::Ratio4x3,
            TvAspectArg::Ratio16x9 => TvAspect::Ratio16x9,
            TvAspectArg::Ratio16x10 => TvAspect::Ratio16x10,
        }
    }
}

impl From<TvModeArg> for TvMode {
    fn from(value: TvModeArg) -> Self {
        match value {
            TvModeArg::Letterbox => TvMode::Letterbox,
            TvModeArg::Panscan => TvMode::PanScan,
            TvModeArg::Justscale => TvMode::JustScale,
        }
    }
}

impl From<TvSystemArg> for TvSystem {
    fn from(value: TvSystemArg) -> Self {
        match value {
            TvSystemArg::Pal => TvSystem::Pal,
            TvSystemArg::Ntsc => TvSystem::Ntsc,
        }
    }
}

impl From<ColorDepthArg> for ColorDepth {
    fn from(value: ColorDepthArg) -> Self {
        match value {
            ColorDepthArg::Indexed8 => ColorDepth::Indexed8,
            ColorDepthArg::Argb32 => ColorDepth::Argb32,
        }
    }
}

impl From<PtsEncodingArg> for PtsEncoding {
    fn from(value: PtsEncodingArg) -> Self {
        match value {
            PtsEncodingArg::Standard => PtsEncoding::Standard,
            PtsEncodingArg::Legacy => PtsEncoding::Legacy32,
        }
    }
}

/// On-disk form of a [`ResumeSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResumeFile {
    pub title: i32,
    pub chapter: i32,
    pub block: u32,
    pub audio_id: i32,
    pub audio_lock: bool,
    pub spu_id: i32,
    pub spu_lock: bool,
}

impl From<ResumeSnapshot> for ResumeFile {
    fn from(s: ResumeSnapshot) -> Self {
        Self {
            title: s.title,
            chapter: s.chapter,
            block: s.block,
            audio_id: s.audio_id,
            audio_lock: s.audio_lock,
            spu_id: s.spu_id,
            spu_lock: s.spu_lock,
        }
    }
}

impl From<ResumeFile> for ResumeSnapshot {
    fn from(f: ResumeFile) -> Self {
        Self {
            title: f.title,
            chapter: f.chapter,
            block: f.block,
            audio_id: f.audio_id,
            audio_lock: f.audio_lock,
            spu_id: f.spu_id,
            spu_lock: f.spu_lock,
        }
    }
}

/// A missing file means there is nothing to resume.
pub fn load_resume(path: &Path) -> Result<Option<ResumeSnapshot>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Cannot read {}", path.display())),
    };
    let file: ResumeFile = serde_yaml_ng::from_str(&text)
        .with_context(|| format!("Invalid resume file {}", path.display()))?;
    Ok(Some(file.into()))
}

/// Stores the exit position, or removes a stale one when there is none.
pub fn store_resume(path: &Path, snapshot: Option<ResumeSnapshot>) -> Result<()> {
    match snapshot {
        Some(snapshot) => {
            let text = serde_yaml_ng::to_string(&ResumeFile::from(snapshot))?;
            fs::write(path, text).with_context(|| format!("Cannot write {}", path.display()))?;
        }
        None => match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("Cannot remove {}", path.display())),
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_config() -> Result<()> {
        let config = FileConfig::parse(
            r#"
language: de
tv_aspect: "16:9"
tv_mode: panscan
tv_system: ntsc
ac3_passthrough: true
color_depth: 32
blit: { x_offset: 10, y_offset: 20, width: 640, height: 480 }
pts_encoding: legacy
spu_ring_capacity: 16
"#,
        )?
        .into_player_config()?;

        assert_eq!(config.language, "de");
        assert_eq!(config.tv_aspect, TvAspect::Ratio16x9);
        assert_eq!(config.tv_mode, TvMode::PanScan);
        assert_eq!(config.tv_system, TvSystem::Ntsc);
        assert!(config.ac3_passthrough);
        assert_eq!(config.color_depth, ColorDepth::Argb32);
        assert_eq!(config.blit.width, 640);
        assert_eq!(config.pts_encoding, PtsEncoding::Legacy32);
        assert_eq!(config.spu_ring_capacity, 16);
        assert_eq!(config.spu_sync_tolerance, 180_000);
        Ok(())
    }

    #[test]
    fn rejects_bad_values() {
        assert!(FileConfig::parse("colour_depth: 8").is_err());
        assert!(
            FileConfig::parse("color_depth: 16")
                .and_then(FileConfig::into_player_config)
                .is_err()
        );
        assert!(
            FileConfig::parse("language: english")
                .and_then(FileConfig::into_player_config)
                .is_err()
        );
    }

    #[test]
    fn resume_file_layout() -> Result<()> {
        let snapshot = ResumeSnapshot {
            title: 2,
            chapter: 5,
            block: 1234,
            audio_id: 1,
            audio_lock: true,
            spu_id: -1,
            spu_lock: false,
        };
        let text = serde_yaml_ng::to_string(&ResumeFile::from(snapshot))?;
        assert!(text.contains("block: 1234"));
        let back: ResumeFile = serde_yaml_ng::from_str(&text)?;
        assert_eq!(ResumeSnapshot::from(back), snapshot);
        Ok(())
    }
}
