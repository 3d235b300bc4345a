use crate::commands::{Cli, Commands, DumpCommand, InfoCommand, VerifyCommand};
use anyhow::{Context, Result, bail};
use cdframe::cd::sector::{edc_check_form2, edc_lec_check_and_correct};
use cdframe::cd::toc::{CTRL_4CH, CTRL_DATA, CTRL_DCP, CTRL_PRE, DiscType};
use cdframe::cd::{FRAME_SIZE, SECTOR_SIZE, lba_to_amsf};
use cdframe::image;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::warn;
use std::fs::File;
use std::io::{BufWriter, Write};

mod commands;

fn main() -> Result<()> {
    let logger = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .build();

    let level = logger.filter();
    let progress = MultiProgress::new();

    LogWrapper::new(progress.clone(), logger).try_init()?;
    log::set_max_level(level);

    let cli = Cli::parse();

    match cli.command {
        Commands::Info(cmd) => info(cmd),
        Commands::Dump(cmd) => dump(cmd, &progress),
        Commands::Verify(cmd) => verify(cmd, &progress),
    }
}

fn sector_bar(progress: &MultiProgress, sectors: u64) -> Result<ProgressBar> {
    let bar = progress.add(ProgressBar::new(sectors));
    bar.set_style(
        ProgressStyle::with_template(
            "{wide_bar} {pos}/{len} sectors ({eta})",
        )?,
    );
    Ok(bar)
}

fn info(cmd: InfoCommand) -> Result<()> {
    let image = image::open(&cmd.input)
        .with_context(|| format!("opening {}", cmd.input.display()))?;
    let toc = image.toc();

    let disc_type = match toc.disc_type {
        DiscType::CddaOrMode1 => "CD-DA or CD-ROM Mode 1",
        DiscType::CdI => "CD-i",
        DiscType::CdXa => "CD-ROM XA",
    };
    println!("disc type: {disc_type}");
    println!("tracks {}..={}", toc.first_track, toc.last_track);
    println!();
    println!("track  start     lba      kind   flags");

    let flags = |control: u8| {
        let mut out = String::new();
        if control & CTRL_PRE != 0 {
            out.push_str(" pre-emphasis");
        }
        if control & CTRL_DCP != 0 {
            out.push_str(" copy-ok");
        }
        if control & CTRL_4CH != 0 {
            out.push_str(" 4ch");
        }
        out
    };

    for number in toc.first_track..=toc.last_track {
        let track = &toc.tracks[number as usize];
        if !track.valid {
            continue;
        }
        let (m, s, f) = lba_to_amsf(track.lba);
        let kind = if track.control & CTRL_DATA != 0 {
            "data"
        } else {
            "audio"
        };
        println!(
            "{number:5}  {m:02}:{s:02}:{f:02}  {:7}  {kind:5} {}",
            track.lba,
            flags(track.control)
        );
    }

    let leadout = &toc.tracks[100];
    let (m, s, f) = lba_to_amsf(leadout.lba);
    println!("  out  {m:02}:{s:02}:{f:02}  {:7}", leadout.lba);
    Ok(())
}

fn dump(cmd: DumpCommand, progress: &MultiProgress) -> Result<()> {
    let mut image = image::open(&cmd.input)
        .with_context(|| format!("opening {}", cmd.input.display()))?;
    let leadout = image.toc().leadout_lba();

    let count = cmd.count.unwrap_or(leadout - cmd.start);
    if count <= 0 {
        bail!("nothing to dump: start {} with count {}", cmd.start, count);
    }

    let mut out = BufWriter::new(
        File::create(&cmd.output)
            .with_context(|| format!("creating {}", cmd.output.display()))?,
    );

    let bar = sector_bar(progress, count as u64)?;
    let mut frame = [0u8; FRAME_SIZE];
    for lba in cmd.start..cmd.start + count {
        image
            .read_raw_sector(lba, &mut frame)
            .with_context(|| format!("reading lba {lba}"))?;
        out.write_all(&frame)?;
        bar.inc(1);
    }
    bar.finish_and_clear();
    out.flush()?;

    println!("dumped {count} frames to {}", cmd.output.display());
    Ok(())
}

/// EDC verdict for one raw data sector, with an L-EC repair attempt
/// where the layout carries parity. XA Form 2 sectors have no parity
/// and an optional EDC.
fn sector_intact(sector: &mut [u8]) -> bool {
    match sector[15] {
        0x01 => edc_lec_check_and_correct(sector, false),
        0x02 => {
            if sector[18] & 0x20 != 0 {
                edc_check_form2(sector)
            } else {
                edc_lec_check_and_correct(sector, true)
            }
        }
        _ => false,
    }
}

fn verify(cmd: VerifyCommand, progress: &MultiProgress) -> Result<()> {
    let mut image = image::open(&cmd.input)
        .with_context(|| format!("opening {}", cmd.input.display()))?;
    let toc = image.toc().clone();
    let leadout = toc.leadout_lba();

    let bar = sector_bar(progress, leadout.max(0) as u64)?;
    let mut frame = [0u8; FRAME_SIZE];
    let mut data_sectors = 0u64;
    let mut uncorrectable = 0u64;

    for lba in 0..leadout {
        bar.inc(1);
        let number = toc.find_track_by_lba(lba) as usize;
        if number == 0 || toc.tracks[number].control & CTRL_DATA == 0 {
            continue;
        }

        image
            .read_raw_sector(lba, &mut frame)
            .with_context(|| format!("reading lba {lba}"))?;
        data_sectors += 1;
        if !sector_intact(&mut frame[..SECTOR_SIZE]) {
            uncorrectable += 1;
            warn!("uncorrectable sector at lba {lba}");
        }
    }
    bar.finish_and_clear();

    println!("{data_sectors} data sectors checked, {uncorrectable} uncorrectable");
    Ok(())
}
