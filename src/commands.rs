//! Command handlers.
//!
//! Thin wrappers that bridge CLI invocations to the library. Each handler
//! does one thing: scan an image, write a crop, read or change settings.
//!
//! The scan flow itself lives in pipeline.rs.

use crate::capture::read_image_file;
use crate::cli::{Command, DisplaySize, SettingsAction};
use crate::crop::{CropEditor, CropError, DisplayedImage, NormalizedRegion};
use crate::ocr::{lyrics, EdgeFunctionBackend, RecognitionBackend};
use crate::pipeline::{PipelineError, ScanPipeline};
use crate::raster::{self, RasterOptions};
use crate::settings::{self, Settings, SettingsError};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("clipboard error: {0}")]
    Clipboard(#[from] arboard::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("the selection is empty or extends past the image; nothing to crop")]
    EmptySelection,
}

impl From<CropError> for CommandError {
    fn from(e: CropError) -> Self {
        CommandError::Pipeline(e.into())
    }
}

/// How the recognized text is post-processed before printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    Raw,
    Cleaned,
    WordsOnly,
}

impl TextMode {
    pub fn from_flags(raw: bool, strip_chords: bool) -> Self {
        match (raw, strip_chords) {
            (true, _) => TextMode::Raw,
            (false, true) => TextMode::WordsOnly,
            (false, false) => TextMode::Cleaned,
        }
    }

    pub fn apply(self, text: &str) -> String {
        match self {
            TextMode::Raw => text.to_string(),
            TextMode::Cleaned => lyrics::clean_lyrics(text),
            TextMode::WordsOnly => lyrics::strip_chord_lines(text),
        }
    }
}

pub async fn dispatch(command: Command) -> Result<(), CommandError> {
    match command {
        Command::Scan {
            image,
            crop,
            display,
            copy,
            raw,
            strip_chords,
        } => {
            let settings = settings::resolve_settings();
            let backend = EdgeFunctionBackend::from_settings(&settings)?;
            let text = scan_file(
                backend,
                &settings,
                &image,
                crop,
                display,
                TextMode::from_flags(raw, strip_chords),
            )
            .await?;
            println!("{}", text);
            if copy {
                copy_to_clipboard(&text)?;
            }
            Ok(())
        }
        Command::Crop {
            image,
            out,
            crop,
            display,
        } => {
            let settings = settings::resolve_settings();
            let options = RasterOptions {
                jpeg_quality: settings.jpeg_quality,
            };
            let (w, h) = crop_to_file(&image, &out, crop, display, &options).await?;
            println!("{} ({}x{})", out.display(), w, h);
            Ok(())
        }
        Command::Settings { action } => run_settings(action),
    }
}

/// Scan one image file: open it, apply the selection, confirm, recognize.
///
/// Without `crop` the editor's default selection is used.
pub async fn scan_file<B: RecognitionBackend>(
    backend: B,
    settings: &Settings,
    image: &Path,
    crop: Option<NormalizedRegion>,
    display: Option<DisplaySize>,
    mode: TextMode,
) -> Result<String, CommandError> {
    let pipeline = ScanPipeline::new(
        backend,
        RasterOptions {
            jpeg_quality: settings.jpeg_quality,
        },
    );
    pipeline.load_file(image).await?;

    let natural = pipeline
        .image_dimensions()?
        .ok_or(PipelineError::Crop(CropError::NoImage))?;
    pipeline.on_image_load(displayed(natural, display))?;
    if let Some(region) = crop {
        pipeline.complete_crop(region)?;
    }

    let outcome = pipeline
        .confirm_crop()
        .await?
        .ok_or(CommandError::EmptySelection)?;
    log::info!(
        "[SCAN] {} chars from a {}x{} region in {}ms",
        outcome.text.len(),
        outcome.dimensions.0,
        outcome.dimensions.1,
        outcome.elapsed.as_millis()
    );
    Ok(mode.apply(&outcome.text))
}

/// Crop an image file and write the selection as JPEG.
///
/// Returns the size of the written image in native pixels.
pub async fn crop_to_file(
    image: &Path,
    out: &Path,
    crop: Option<NormalizedRegion>,
    display: Option<DisplaySize>,
    options: &RasterOptions,
) -> Result<(u32, u32), CommandError> {
    let start = std::time::Instant::now();
    let captured = read_image_file(image).await.map_err(PipelineError::from)?;
    let natural = captured.dimensions();

    let mut editor = CropEditor::new();
    editor.open(captured);
    editor.on_image_load(displayed(natural, display))?;
    if let Some(region) = crop {
        editor.on_complete(region)?;
    }
    let confirmation = editor.confirm().ok_or(CommandError::EmptySelection)?;

    let rasterized = raster::rasterize(
        &confirmation.image,
        &confirmation.region,
        confirmation.scale,
        options,
    )
    .map_err(PipelineError::from)?;
    let dimensions = rasterized.dimensions();

    tokio::fs::write(out, rasterized.bytes())
        .await
        .map_err(|source| CommandError::Write {
            path: out.to_path_buf(),
            source,
        })?;
    log::info!(
        "[CROP] Wrote {} ({}x{}, {} bytes) in {}ms",
        out.display(),
        dimensions.0,
        dimensions.1,
        rasterized.bytes().len(),
        start.elapsed().as_millis()
    );
    Ok(dimensions)
}

fn displayed(natural: (u32, u32), display: Option<DisplaySize>) -> DisplayedImage {
    match display {
        Some(d) => DisplayedImage::new(natural, (d.width, d.height)),
        None => DisplayedImage::native(natural),
    }
}

/// Copy text to the system clipboard.
///
/// Uses arboard for native clipboard access.
pub fn copy_to_clipboard(text: &str) -> Result<(), CommandError> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(text)?;
    log::info!("[ACTION] Copied {} chars to clipboard", text.len());
    Ok(())
}

fn run_settings(action: SettingsAction) -> Result<(), CommandError> {
    match action {
        SettingsAction::Show => {
            let s = settings::resolve_settings();
            println!("settings file: {}", settings::settings_path().display());
            print!("{}", describe_settings(&s));
        }
        SettingsAction::SetKey { key } => {
            let key = key.trim();
            if key.is_empty() {
                return Err(SettingsError::InvalidValue {
                    field: "api_key".to_string(),
                    value: String::new(),
                }
                .into());
            }
            settings::save_api_key(key)?;
            println!("API key saved to the OS keychain");
        }
        SettingsAction::Set { field, value } => {
            let path = settings::settings_path();
            let mut file = settings::load_settings_file(&path);
            file.set_field(&field, &value)?;
            settings::save_settings_file(&path, &file)?;
            println!("{} = {}", field, value);
        }
    }
    Ok(())
}

/// Human-readable settings summary. The API key is never printed.
pub fn describe_settings(s: &Settings) -> String {
    let endpoint = s
        .function_endpoint()
        .unwrap_or_else(|_| "(not configured)".to_string());
    let key = if s.api_key.is_some() { "set" } else { "not set" };
    format!(
        "endpoint:     {}\napi key:      {}\njpeg quality: {}\ntimeout:      {}s\n",
        endpoint,
        key,
        s.jpeg_quality,
        s.timeout.as_secs()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_mode_follows_flags() {
        assert_eq!(TextMode::from_flags(true, false), TextMode::Raw);
        assert_eq!(TextMode::from_flags(false, true), TextMode::WordsOnly);
        assert_eq!(TextMode::from_flags(false, false), TextMode::Cleaned);

        let text = "G  D\nAmazing grace  \r\n\r\n\r\nhow sweet";
        assert_eq!(TextMode::Raw.apply(text), text);
        assert_eq!(
            TextMode::Cleaned.apply(text),
            "G  D\nAmazing grace\n\nhow sweet"
        );
        assert_eq!(TextMode::WordsOnly.apply(text), "Amazing grace\n\nhow sweet");
    }

    #[test]
    fn describe_settings_hides_the_key() {
        let s = Settings {
            backend_url: Some("https://abc.supabase.co".into()),
            api_key: Some("secret-key".into()),
            ..Settings::default()
        };
        let out = describe_settings(&s);
        assert!(out.contains("https://abc.supabase.co/functions/v1/ocr-image"));
        assert!(out.contains("api key:      set"));
        assert!(!out.contains("secret-key"));

        let out = describe_settings(&Settings::default());
        assert!(out.contains("(not configured)"));
        assert!(out.contains("not set"));
    }
}
