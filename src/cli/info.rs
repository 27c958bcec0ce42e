use std::collections::BTreeMap;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;
use crate::timestamp::ticks_str;
use ddvd::process::scan::{ScanReport, StreamScanner};
use ddvd::structs::pes::{PtsEncoding, SECTOR_SIZE};
use ddvd::structs::spu::SpuKind;

pub fn cmd_info(args: &InfoArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing sector stream: {}", args.input.display());

    let encoding = args.pts_encoding.map(PtsEncoding::from).unwrap_or_default();
    let report = scan(args, encoding, multi)?;

    if report.sectors == 0 {
        println!("No complete sectors found in the input.");
        return Ok(());
    }

    if args.yaml {
        print!("{}", serde_yaml_ng::to_string(&InfoReport::new(&report, args.list_spu))?);
    } else {
        display_summary(&report);
        display_audio(&report);
        display_subpictures(&report);
        if args.list_spu {
            display_spu_list(&report);
        }
    }
    Ok(())
}

fn scan(args: &InfoArgs, encoding: PtsEncoding, multi: Option<&MultiProgress>) -> Result<ScanReport> {
    let mut input = InputReader::new(&args.input)?;
    let mut scanner = StreamScanner::new(encoding, args.list_spu);

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Scanning sectors...");
            Some(pb)
        }
        None => None,
    };

    input.process_sectors(|sector| {
        scanner.push_sector(sector);
        let count = scanner.report().sectors;
        if count.is_multiple_of(1000) {
            if let Some(ref pb) = pb {
                pb.set_message(format!("Scanning sectors...       {count}"));
            }
        }
        Ok(true)
    })?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    Ok(scanner.finish())
}

fn display_summary(report: &ScanReport) {
    println!();
    println!("DVD Sector Stream Information");
    println!("=============================");
    println!();
    println!("Sectors");
    let bytes = report.sectors * SECTOR_SIZE as u64;
    println!(
        "  Total                     {} ({:.2} MB)",
        report.sectors,
        bytes as f64 / 1_000_000.0
    );
    println!("  Video                     {}", report.video_sectors);
    println!("  Audio                     {}", audio_sectors(report));
    println!("  Subpicture                {}", spu_sectors(report));
    println!("  Other PES                 {}", report.other_sectors);
    println!("  Without PES               {}", report.non_pes_sectors);
    println!();

    println!("Video");
    match (report.first_video_pts, report.last_video_pts) {
        (Some(first), Some(last)) => {
            println!("  First PTS                 {first} ({})", ticks_str(first));
            println!("  Last PTS                  {last} ({})", ticks_str(last));
            if let Some(duration) = report.video_duration() {
                println!("  Duration                  {}", ticks_str(duration));
            }
        }
        _ => println!("  No timestamped video"),
    }
    println!();
}

fn display_audio(report: &ScanReport) {
    println!("Audio Streams");
    if report.audio.is_empty() {
        println!("  None");
    }
    for (id, stats) in &report.audio {
        let first = stats
            .first_pts
            .map_or_else(|| "-".to_string(), ticks_str);
        println!(
            "  Stream {id}                  {:5} {:>8} sectors, first PTS {first}",
            stats.format.name(), stats.sectors
        );
    }
    println!();
}

fn display_subpictures(report: &ScanReport) {
    println!("Subpicture Streams");
    if report.subpicture.is_empty() {
        println!("  None");
    }
    for (id, stats) in &report.subpicture {
        println!(
            "  Stream {id:<2}                 {:>6} sectors, {} packets ({} subtitles, {} highlight masks, {} malformed)",
            stats.sectors,
            stats.packets(),
            stats.subtitles,
            stats.highlight_masks,
            stats.malformed
        );
    }
    println!();
}

fn display_spu_list(report: &ScanReport) {
    println!("Subpictures");
    for spu in &report.spu_list {
        let b = spu.bbox;
        let display = match spu.display_time {
            t if t < 0 => "until replaced".to_string(),
            t => format!("{}.{} s", t / 10, t % 10),
        };
        println!(
            "  {} stream {:<2} {:<14} ({:3},{:3})-({:3},{:3})  {display}",
            ticks_str(spu.pts),
            spu.stream_id,
            kind_name(spu.kind),
            b.x1,
            b.y1,
            b.x2,
            b.y2
        );
    }
    println!();
}

fn audio_sectors(report: &ScanReport) -> u64 {
    report.audio.values().map(|s| s.sectors).sum()
}

fn spu_sectors(report: &ScanReport) -> u64 {
    report.subpicture.values().map(|s| s.sectors).sum()
}

fn kind_name(kind: SpuKind) -> &'static str {
    match kind {
        SpuKind::Subtitle => "subtitle",
        SpuKind::HighlightMask => "highlight mask",
        SpuKind::Malformed => "malformed",
    }
}

#[derive(Debug, Serialize)]
struct InfoReport {
    sectors: u64,
    video_sectors: u64,
    other_sectors: u64,
    non_pes_sectors: u64,
    first_video_pts: Option<u64>,
    last_video_pts: Option<u64>,
    audio: BTreeMap<u8, AudioEntry>,
    subpicture: BTreeMap<u8, SpuEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    spu_list: Option<Vec<SpuListEntry>>,
}

#[derive(Debug, Serialize)]
struct AudioEntry {
    format: String,
    sectors: u64,
    first_pts: Option<u64>,
}

#[derive(Debug, Serialize)]
struct SpuEntry {
    sectors: u64,
    packets: u64,
    subtitles: u64,
    highlight_masks: u64,
    malformed: u64,
}

#[derive(Debug, Serialize)]
struct SpuListEntry {
    stream: u8,
    pts: u64,
    kind: &'static str,
    bbox: [u16; 4],
    display_time: i32,
}

impl InfoReport {
    fn new(report: &ScanReport, list_spu: bool) -> Self {
        Self {
            sectors: report.sectors,
            video_sectors: report.video_sectors,
            other_sectors: report.other_sectors,
            non_pes_sectors: report.non_pes_sectors,
            first_video_pts: report.first_video_pts,
            last_video_pts: report.last_video_pts,
            audio: report
                .audio
                .iter()
                .map(|(id, s)| {
                    let entry = AudioEntry {
                        format: s.format.to_string(),
                        sectors: s.sectors,
                        first_pts: s.first_pts,
                    };
                    (*id, entry)
                })
                .collect(),
            subpicture: report
                .subpicture
                .iter()
                .map(|(id, s)| {
                    let entry = SpuEntry {
                        sectors: s.sectors,
                        packets: s.packets(),
                        subtitles: s.subtitles,
                        highlight_masks: s.highlight_masks,
                        malformed: s.malformed,
                    };
                    (*id, entry)
                })
                .collect(),
            spu_list: list_spu.then(|| {
                report
                    .spu_list
                    .iter()
                    .map(|r| SpuListEntry {
                        stream: r.stream_id,
                        pts: r.pts,
                        kind: kind_name(r.kind),
                        bbox: [r.bbox.x1, r.bbox.y1, r.bbox.x2, r.bbox.y2],
                        display_time: r.display_time,
                    })
                    .collect()
            }),
        }
    }
}
