use crate::crop::NormalizedRegion;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lyric-scan")]
#[command(version, about = "Scan song lyrics from an image: crop a region, get the text")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crop a region of an image and recognize its text
    Scan {
        /// Image file (JPEG, PNG, WebP, ...)
        image: PathBuf,

        /// Selection as x,y,width,height in percent of the image (default: centered, 90% wide)
        #[arg(long, value_parser = parse_region)]
        crop: Option<NormalizedRegion>,

        /// Size the image is displayed at, as WIDTHxHEIGHT (default: native size)
        #[arg(long, value_parser = parse_display)]
        display: Option<DisplaySize>,

        /// Copy the recognized text to the clipboard
        #[arg(long)]
        copy: bool,

        /// Print the text exactly as recognized, without lyric cleanup
        #[arg(long)]
        raw: bool,

        /// Drop chord lines from the recognized text
        #[arg(long, conflicts_with = "raw")]
        strip_chords: bool,
    },

    /// Crop a region of an image and write it as JPEG, without recognition
    Crop {
        image: PathBuf,

        /// Output JPEG path
        #[arg(short, long)]
        out: PathBuf,

        #[arg(long, value_parser = parse_region)]
        crop: Option<NormalizedRegion>,

        #[arg(long, value_parser = parse_display)]
        display: Option<DisplaySize>,
    },

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print the resolved settings
    Show,
    /// Store the backend API key in the OS keychain
    SetKey { key: String },
    /// Set a field in the settings file (backend_url, function, jpeg_quality, timeout_secs)
    Set { field: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

fn parse_region(s: &str) -> Result<NormalizedRegion, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("expected x,y,width,height: {}", e))?;
    match parts.as_slice() {
        &[x, y, width, height] => {
            if parts.iter().any(|v| !(0.0..=100.0).contains(v)) {
                return Err("values are percentages and must be within 0..=100".to_string());
            }
            Ok(NormalizedRegion::new(x, y, width, height))
        }
        _ => Err(format!("expected 4 values, got {}", parts.len())),
    }
}

fn parse_display(s: &str) -> Result<DisplaySize, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width: f64 = w.trim().parse().map_err(|_| format!("bad width: {}", w))?;
    let height: f64 = h.trim().parse().map_err(|_| format!("bad height: {}", h))?;
    if !(width > 0.0 && height > 0.0) {
        return Err("display size must be positive".to_string());
    }
    Ok(DisplaySize { width, height })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_region_percentages() {
        assert_eq!(
            parse_region("10, 20,30.5,40").unwrap(),
            NormalizedRegion::new(10.0, 20.0, 30.5, 40.0)
        );
        assert!(parse_region("10,20,30").is_err());
        assert!(parse_region("10,20,30,140").is_err());
        assert!(parse_region("a,b,c,d").is_err());
    }

    #[test]
    fn parses_display_size() {
        assert_eq!(
            parse_display("500x1000").unwrap(),
            DisplaySize {
                width: 500.0,
                height: 1000.0
            }
        );
        assert!(parse_display("500").is_err());
        assert!(parse_display("0x10").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
