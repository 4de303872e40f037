//! Lyric Scan: capture a song sheet, crop it, recognize the text.
//!
//! Domains:
//!   - capture   camera snapshot, file, or data URL into a decoded image
//!   - crop      crop editor state machine and region geometry
//!   - raster    selection to native-resolution JPEG
//!   - ocr       recognition submission and lyric post-processing
//!   - pipeline  the stages wired together
//!   - settings  env / keychain / settings file resolution
//!
//! The binary is a thin CLI over these (cli.rs, commands.rs).

pub mod capture;
pub mod cli;
pub mod commands;
pub mod crop;
pub mod ocr;
pub mod pipeline;
pub mod raster;
pub mod settings;

use clap::Parser;
use std::process::ExitCode;

/// Entry point, called by the binary.
pub fn run() -> ExitCode {
    // .env.local wins over .env; the first one found is loaded.
    'env_load: for env_file in [".env.local", ".env"] {
        let path = std::path::Path::new(env_file);
        if path.exists() {
            match dotenvy::from_path(path) {
                Ok(_) => eprintln!("[STARTUP] Loaded {}", path.display()),
                Err(e) => eprintln!("[STARTUP] Failed to load {}: {}", path.display(), e),
            }
            break 'env_load;
        }
    }

    env_logger::init();

    let cli = cli::Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(commands::dispatch(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
