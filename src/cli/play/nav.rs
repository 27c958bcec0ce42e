//! Navigation over a raw sector dump: one title, one chapter, one program
//! chain spanning the whole file.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

use ddvd::process::scan::{ScanReport, StreamScanner};
use ddvd::structs::nav::{ButtonMove, CellInfo, MenuId, NavEvent, NavPosition, Navigator, Pci};
use ddvd::structs::pes::{PtsEncoding, SECTOR_SIZE};
use ddvd::utils::errors::NavError;

use crate::input::{read_full_sector, sector_count};

/// Sectors scanned at each end of the file to find streams and the PTS span.
const PROBE_SECTORS: u32 = 4096;

/// Language reported for every stream; a dump carries no IFO tables.
const LANG_UNKNOWN: u16 = u16::from_be_bytes(*b"??");

pub struct FileNavigator {
    encoding: PtsEncoding,
    file: Option<BufReader<File>>,
    title: String,
    sectors: u32,
    block: u32,
    pgc_length: u64,
    audio_streams: Vec<u8>,
    spu_streams: Vec<u8>,
    pending: VecDeque<NavEvent>,
}

impl FileNavigator {
    pub fn new(encoding: PtsEncoding) -> Self {
        Self {
            encoding,
            file: None,
            title: String::new(),
            sectors: 0,
            block: 0,
            pgc_length: 0,
            audio_streams: Vec::new(),
            spu_streams: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    fn file(&mut self) -> Result<&mut BufReader<File>, NavError> {
        self.file
            .as_mut()
            .ok_or_else(|| NavError::Read("source not open".into()))
    }

    fn probe(&mut self, start: u32, count: u32) -> Result<ScanReport, NavError> {
        let encoding = self.encoding;
        let file = self.file()?;
        file.seek(SeekFrom::Start(u64::from(start) * SECTOR_SIZE as u64))?;

        let mut scanner = StreamScanner::new(encoding, false);
        let mut sector = [0u8; SECTOR_SIZE];
        for _ in 0..count {
            match read_full_sector(file, &mut sector) {
                Ok(true) => scanner.push_sector(&mut sector),
                Ok(false) => break,
                Err(e) => return Err(NavError::Read(e.to_string())),
            }
        }
        Ok(scanner.finish())
    }

    fn cell(&self) -> CellInfo {
        CellInfo {
            cell: 1,
            program: 1,
            cell_length: self.pgc_length,
            program_length: self.pgc_length,
            pgc_length: self.pgc_length,
            cell_start: 0,
            program_start: 0,
        }
    }

    fn unsupported(call: &'static str) -> NavError {
        NavError::Call {
            call,
            reason: "a sector dump has no navigation data".into(),
        }
    }
}

impl Navigator for FileNavigator {
    fn open(&mut self, path: &str) -> Result<(), NavError> {
        let mut file = File::open(path).map_err(|e| NavError::Open(format!("{path}: {e}")))?;
        self.sectors = sector_count(&mut file).map_err(|e| NavError::Open(e.to_string()))?;
        self.file = Some(BufReader::new(file));
        self.title = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_ascii_uppercase())
            .unwrap_or_default();

        let head = self.probe(0, PROBE_SECTORS)?;
        let tail_start = self.sectors.saturating_sub(PROBE_SECTORS);
        let tail = self.probe(tail_start, PROBE_SECTORS)?;
        self.pgc_length = match (head.first_video_pts, tail.last_video_pts) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => 0,
        };
        self.audio_streams = head.audio.keys().copied().collect();
        self.spu_streams = head.subpicture.keys().copied().collect();

        log::info!(
            "Opened {path}: {} sectors, {} ticks, audio streams {:?}, subpicture streams {:?}",
            self.sectors,
            self.pgc_length,
            self.audio_streams,
            self.spu_streams
        );
        Ok(())
    }

    fn apply_preferences(&mut self, language: &str) -> Result<(), NavError> {
        log::debug!("Language preference {language} has no effect on a sector dump");
        self.sector_search(0)?;
        self.pending.push_back(NavEvent::VtsChange);
        self.pending.push_back(NavEvent::CellChange(self.cell()));
        Ok(())
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn next_block(&mut self, buf: &mut [u8; SECTOR_SIZE]) -> Result<NavEvent, NavError> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }
        if self.block >= self.sectors {
            return Ok(NavEvent::Stop);
        }
        let file = self.file()?;
        match read_full_sector(file, buf) {
            Ok(true) => {
                self.block += 1;
                Ok(NavEvent::BlockReady)
            }
            Ok(false) => Ok(NavEvent::Stop),
            Err(e) => Err(NavError::Read(e.to_string())),
        }
    }

    fn title_string(&self) -> String {
        self.title.clone()
    }

    fn position(&self) -> Option<NavPosition> {
        self.file.as_ref()?;
        Some(NavPosition {
            block: self.block,
            length: self.sectors,
        })
    }

    fn current_title_info(&self) -> Option<(i32, i32)> {
        Some((1, 1))
    }

    fn number_of_titles(&self) -> Result<i32, NavError> {
        Ok(1)
    }

    fn number_of_parts(&self, _title: i32) -> Result<i32, NavError> {
        Ok(1)
    }

    fn is_menu_domain(&self) -> bool {
        false
    }

    fn sector_search(&mut self, block: u32) -> Result<(), NavError> {
        if block > self.sectors {
            return Err(NavError::Seek(block));
        }
        let file = self.file()?;
        file.seek(SeekFrom::Start(u64::from(block) * SECTOR_SIZE as u64))?;
        self.block = block;
        Ok(())
    }

    fn part_play(&mut self, title: i32, part: i32) -> Result<(), NavError> {
        if (title, part) != (1, 1) {
            return Err(NavError::Call {
                call: "part_play",
                reason: format!("no title {title} chapter {part}"),
            });
        }
        self.sector_search(0)?;
        self.pending.push_back(NavEvent::CellChange(self.cell()));
        Ok(())
    }

    fn title_play(&mut self, title: i32) -> Result<(), NavError> {
        self.part_play(title, 1)
    }

    fn reset(&mut self) -> Result<(), NavError> {
        self.pending.clear();
        self.sector_search(0)
    }

    fn menu_call(&mut self, _menu: MenuId) -> Result<(), NavError> {
        Err(Self::unsupported("menu_call"))
    }

    fn button_move(&mut self, _pci: &Pci, _direction: ButtonMove) -> Result<(), NavError> {
        Err(Self::unsupported("button_move"))
    }

    fn button_select(&mut self, _pci: &Pci, _button: u32) -> Result<(), NavError> {
        Err(Self::unsupported("button_select"))
    }

    fn button_activate(&mut self, _pci: &Pci) -> Result<(), NavError> {
        Err(Self::unsupported("button_activate"))
    }

    fn current_highlight(&self) -> Option<u32> {
        None
    }

    fn still_skip(&mut self) -> Result<(), NavError> {
        Ok(())
    }

    fn wait_skip(&mut self) -> Result<(), NavError> {
        Ok(())
    }

    fn next_still_flag(&self) -> bool {
        false
    }

    fn video_aspect(&self) -> u8 {
        0
    }

    fn video_scale_permission(&self) -> u8 {
        0
    }

    fn active_audio_stream(&self) -> Option<u8> {
        self.audio_streams.first().copied()
    }

    fn active_spu_stream(&self) -> Option<u8> {
        None
    }

    fn audio_stream_to_lang(&self, logical: u8) -> Option<u16> {
        self.audio_streams
            .contains(&logical)
            .then_some(LANG_UNKNOWN)
    }

    fn spu_stream_info(&self, logical: u8) -> Option<(u8, u16)> {
        self.spu_streams
            .get(usize::from(logical))
            .map(|&id| (id, LANG_UNKNOWN))
    }

    fn angle_info(&self) -> (i32, i32) {
        (1, 1)
    }

    fn angle_change(&mut self, _angle: i32) -> Result<(), NavError> {
        Err(Self::unsupported("angle_change"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;

    fn video_sector(pts: u64) -> Vec<u8> {
        let mut sector = vec![0u8; SECTOR_SIZE];
        sector[..4].copy_from_slice(&[0x00, 0x00, 0x01, 0xBA]);
        sector[14..18].copy_from_slice(&[0x00, 0x00, 0x01, 0xE0]);
        sector[18..20].copy_from_slice(&8u16.to_be_bytes());
        sector[20] = 0x81;
        sector[21] = 0x80;
        sector[22] = 5;
        sector[23..28].copy_from_slice(&ddvd::structs::pes::encode_pts(pts));
        sector
    }

    #[test]
    fn walks_a_dump() -> Result<()> {
        let path = std::env::temp_dir().join(format!("ddvdplay-nav-{}.vob", std::process::id()));
        {
            let mut file = File::create(&path)?;
            for pts in [90_000, 180_000, 270_000] {
                file.write_all(&video_sector(pts))?;
            }
            file.write_all(&[0; 100])?;
        }

        let mut nav = FileNavigator::new(PtsEncoding::Standard);
        nav.open(&path.to_string_lossy())?;
        nav.apply_preferences("en")?;

        let mut buf = [0u8; SECTOR_SIZE];
        let mut events = Vec::new();
        loop {
            let event = nav.next_block(&mut buf)?;
            let stop = event == NavEvent::Stop;
            events.push(event);
            if stop {
                break;
            }
        }
        std::fs::remove_file(&path)?;

        assert_eq!(events.len(), 6);
        assert_eq!(events[0], NavEvent::VtsChange);
        assert!(matches!(events[1], NavEvent::CellChange(CellInfo { pgc_length: 180_000, .. })));
        assert_eq!(nav.position().map(|p| (p.block, p.length)), Some((3, 3)));
        assert!(nav.sector_search(4).is_err());
        assert!(nav.menu_call(MenuId::Root).is_err());
        Ok(())
    }
}
