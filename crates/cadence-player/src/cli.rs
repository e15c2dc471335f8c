//! Command line parsing for cadence-player
//!
//! Hand-rolled flag parsing; everything that is not an option is an input
//! file, played in the order given.

use std::path::PathBuf;

pub const USAGE: &str = "\
Usage: cadence-player [OPTIONS] <FILES...>

Plays audio files (WAV/FLAC/MP3/OGG) in order, queueing each next file
for a gapless transition.

Options:
  --mix              Play every file at once, one mixer channel each
  --loop             Repeat a single file until interrupted
  --volume <pct>     Playback volume, 0 to 120 (default from config)
  --device <name>    Output device (see --list-devices)
  --list-devices     Print available output devices and exit
  --eq               Add a shelf EQ to every channel
  --reverb <name>    Add a reverb: fdn, hall, lite, plate, ultralight
  --serial           Compose effects in series instead of parallel
  --config <path>    Config file (default: ~/.config/cadence/player.yaml)
  -h, --help         Show this help";

/// Parsed command line
#[derive(Debug, Default)]
pub struct Options {
    pub files: Vec<PathBuf>,
    pub device: Option<String>,
    pub volume: Option<f32>,
    pub config_path: Option<PathBuf>,
    pub mix: bool,
    pub serial: bool,
    pub eq: bool,
    pub reverb: Option<String>,
    pub loop_playback: bool,
    pub list_devices: bool,
    pub help: bool,
}

pub fn parse(args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();
    let mut args = args;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mix" => options.mix = true,
            "--loop" => options.loop_playback = true,
            "--serial" => options.serial = true,
            "--eq" => options.eq = true,
            "--list-devices" => options.list_devices = true,
            "-h" | "--help" => options.help = true,
            "--volume" => {
                let value = value_for(&arg, &mut args)?;
                let volume: f32 = value
                    .parse()
                    .map_err(|_| format!("Invalid volume: {}", value))?;
                options.volume = Some(volume);
            }
            "--device" => options.device = Some(value_for(&arg, &mut args)?),
            "--reverb" => options.reverb = Some(value_for(&arg, &mut args)?),
            "--config" => options.config_path = Some(PathBuf::from(value_for(&arg, &mut args)?)),
            other if other.starts_with('-') => {
                return Err(format!("Unknown option: {}", other));
            }
            _ => options.files.push(PathBuf::from(arg)),
        }
    }

    if options.loop_playback && options.files.len() > 1 {
        return Err("--loop plays a single file".to_string());
    }
    Ok(options)
}

fn value_for(flag: &str, args: &mut impl Iterator<Item = String>) -> Result<String, String> {
    args.next().ok_or_else(|| format!("{} needs a value", flag))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_strs(args: &[&str]) -> Result<Options, String> {
        parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_files_collected_in_order() {
        let options = parse_strs(&["a.wav", "b.flac", "c.mp3"]).unwrap();
        assert_eq!(options.files.len(), 3);
        assert_eq!(options.files[1], PathBuf::from("b.flac"));
        assert!(!options.mix);
    }

    #[test]
    fn test_flags_and_values() {
        let options = parse_strs(&[
            "--mix", "--serial", "--eq", "--volume", "80", "--device", "USB DAC", "--reverb",
            "plate", "song.wav",
        ])
        .unwrap();
        assert!(options.mix);
        assert!(options.serial);
        assert!(options.eq);
        assert_eq!(options.volume, Some(80.0));
        assert_eq!(options.device.as_deref(), Some("USB DAC"));
        assert_eq!(options.reverb.as_deref(), Some("plate"));
        assert_eq!(options.files.len(), 1);
    }

    #[test]
    fn test_missing_value_is_an_error() {
        let err = parse_strs(&["--device"]).unwrap_err();
        assert!(err.contains("--device"));
    }

    #[test]
    fn test_unknown_option_is_an_error() {
        let err = parse_strs(&["--whatever"]).unwrap_err();
        assert!(err.contains("--whatever"));
    }

    #[test]
    fn test_invalid_volume_is_an_error() {
        let err = parse_strs(&["--volume", "loud"]).unwrap_err();
        assert!(err.contains("loud"));
    }

    #[test]
    fn test_loop_rejects_multiple_files() {
        let err = parse_strs(&["--loop", "a.wav", "b.wav"]).unwrap_err();
        assert!(err.contains("--loop"));
    }
}
