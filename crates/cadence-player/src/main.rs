//! Cadence Player - command-line playback front end
//!
//! Drives [`AudioEngine`] from the terminal. Files play in order with
//! gapless transitions, or all at once with `--mix`. Progress and output
//! meters print to stdout; engine diagnostics go through `log` to stderr.

mod cli;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam::channel::{Receiver, RecvTimeoutError};

use cadence_core::audio::output_device_names;
use cadence_core::config::{default_config_path, load_config, EngineConfig};
use cadence_core::effect::{
    CompositionMode, FdnReverb, HallReverb, LiteReverb, PlateReverb, ShelfEqEffect,
    UltraLightReverb,
};
use cadence_core::engine::AudioEngine;

fn main() -> Result<()> {
    let options = match cli::parse(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!();
            eprintln!("{}", cli::USAGE);
            std::process::exit(2);
        }
    };
    if options.help {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if options.list_devices {
        println!("Output devices:");
        for name in output_device_names() {
            println!("  {}", name);
        }
        return Ok(());
    }
    if options.files.is_empty() {
        eprintln!("{}", cli::USAGE);
        std::process::exit(2);
    }

    log::info!("cadence-player starting up");

    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(|| default_config_path("player.yaml"));
    let mut config: EngineConfig = load_config(&config_path);
    if let Some(device) = options.device.clone() {
        config.device = Some(device);
    }
    if let Some(volume) = options.volume {
        config.volume = volume;
    }
    if options.serial {
        config.effect_composition = CompositionMode::Serial;
    }
    if options.mix {
        config.use_mixer = true;
    }

    println!("╔══════════════════════════════════════╗");
    println!("║            Cadence Player            ║");
    println!("╚══════════════════════════════════════╝");

    let sample_rate = config.sample_rate;
    let mut engine = AudioEngine::new(config);

    if options.eq {
        engine.add_effect(move || Box::new(ShelfEqEffect::new(sample_rate)));
    }
    if let Some(name) = options.reverb.as_deref() {
        add_reverb(&mut engine, name, sample_rate)?;
    }

    let (end_tx, end_rx) = crossbeam::channel::unbounded();
    engine.register_end_event(move |channel| {
        let _ = end_tx.send(channel);
    });

    let result = if options.mix {
        run_mixed(&mut engine, &options.files, &end_rx)
    } else {
        run_playlist(&mut engine, &options, &end_rx)
    };
    engine.shutdown();
    result
}

fn add_reverb(engine: &mut AudioEngine, name: &str, sample_rate: u32) -> Result<()> {
    match name {
        "fdn" => engine.add_effect(move || Box::new(FdnReverb::new(sample_rate))),
        "hall" => engine.add_effect(move || Box::new(HallReverb::new(sample_rate))),
        "lite" => engine.add_effect(move || Box::new(LiteReverb::new(sample_rate))),
        "plate" => engine.add_effect(move || Box::new(PlateReverb::new(sample_rate))),
        "ultralight" => engine.add_effect(move || Box::new(UltraLightReverb::new(sample_rate))),
        other => bail!(
            "Unknown reverb '{}'; expected fdn, hall, lite, plate or ultralight",
            other
        ),
    }
    Ok(())
}

/// Sequential playback with gapless transitions
///
/// One queue slot is kept filled ahead of the playhead. Promotion of the
/// queued file shows up as the playhead jumping back to the start; the
/// next file is queued behind it at that point.
fn run_playlist(
    engine: &mut AudioEngine,
    options: &cli::Options,
    end_rx: &Receiver<usize>,
) -> Result<()> {
    let files = &options.files;

    let mut first = None;
    for (index, file) in files.iter().enumerate() {
        match engine.load_file(file, None) {
            Ok(()) => {
                first = Some(index);
                break;
            }
            Err(e) => eprintln!("Skipping {}: {}", file.display(), e),
        }
    }
    let mut current = match first {
        Some(index) => index,
        None => bail!("No playable files"),
    };

    if options.loop_playback {
        if let Some(handle) = engine.channel(0) {
            if let Ok(mut channel) = handle.lock() {
                channel.set_looping(true);
            }
        }
    }
    let mut queued = queue_next(engine, files, current + 1);

    println!("Playing {}", files[current].display());
    engine.play(None).context("Could not start playback")?;

    let mut last_position = 0.0_f64;
    loop {
        match end_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(_) => break,
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let position = engine.get_pos(None);
        if position + 0.25 < last_position {
            if let Some(index) = queued.take() {
                current = index;
                println!();
                println!("Playing {}", files[current].display());
                queued = queue_next(engine, files, current + 1);
            }
        }
        last_position = position;
        print_progress(position, engine.get_file_length(None), engine.output_levels());
    }

    println!();
    println!("Playback finished");
    Ok(())
}

/// Simultaneous playback, one file per mixer channel
fn run_mixed(engine: &mut AudioEngine, files: &[PathBuf], end_rx: &Receiver<usize>) -> Result<()> {
    let mut loaded = 0;
    for (index, file) in files.iter().enumerate() {
        match engine.load_file(file, Some(index)) {
            Ok(()) => {
                println!("Channel {}: {}", index, file.display());
                loaded += 1;
            }
            Err(e) => eprintln!("Skipping {}: {}", file.display(), e),
        }
    }
    if loaded == 0 {
        bail!("No playable files");
    }

    engine.play(None).context("Could not start playback")?;

    let mut remaining = loaded;
    while remaining > 0 {
        match end_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(channel) => {
                println!();
                println!("Channel {} finished", channel);
                remaining -= 1;
            }
            Err(RecvTimeoutError::Timeout) => {
                print_progress(
                    engine.get_pos(None),
                    engine.get_file_length(None),
                    engine.output_levels(),
                );
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    println!();
    println!("Playback finished");
    Ok(())
}

/// Queue the first playable file at or past `from`; returns its index
fn queue_next(engine: &AudioEngine, files: &[PathBuf], from: usize) -> Option<usize> {
    for index in from..files.len() {
        match engine.queue_file(&files[index], None) {
            Ok(()) => return Some(index),
            Err(e) => eprintln!("Skipping {}: {}", files[index].display(), e),
        }
    }
    None
}

fn print_progress(position: f64, length: f64, levels: (f32, f32)) {
    print!(
        "\r  {:6.1}s / {:6.1}s   L {:4.2}  R {:4.2}",
        position, length, levels.0, levels.1
    );
    let _ = std::io::stdout().flush();
}
