mod app;
mod cache;
mod cli;
mod color;
mod config;
mod data;
mod figure;
mod pipeline;
mod state;
mod ui;

#[cfg(test)]
mod testutil;

use std::process::ExitCode;

use app::AbcExplorerApp;
use clap::Parser;
use eframe::egui;
use state::AppState;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::Args::parse();
    let config = match args.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let output = match pipeline::run(&config) {
        Ok(output) => output,
        Err(e) => {
            log::error!("Pipeline failed: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = &args.output {
        if let Err(e) = data::loader::write_table(&output.combined, path) {
            log::error!("Failed to write {}: {e:#}", path.display());
            return ExitCode::FAILURE;
        }
        log::info!("Wrote {} rows to {}", output.combined.len(), path.display());
    }

    if args.headless {
        match data::loader::preview(&output.combined, args.preview_rows) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                log::error!("{e:#}");
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    let mut state = AppState::new(config);
    state.set_output(output);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 800.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    let result = eframe::run_native(
        "ABC Explorer – Spatial Transcriptomics",
        options,
        Box::new(|_cc| Ok(Box::new(AbcExplorerApp::new(state)))),
    );
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Viewer failed: {e}");
            ExitCode::FAILURE
        }
    }
}
