//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `volscene_core` linkage.
//! - Ingest one NRRD file into a fresh scene and print its node set.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use volscene_core::{
    default_log_level, init_logging, logging_status, IngestRequest, LoadOptions, LogConfig,
    LogLevel, NrrdVolumeIo, Scene, VolumesService,
};

#[derive(Parser, Debug)]
#[command(name = "volscene", version, about = "Load a volume file into a fresh scene")]
struct Cli {
    /// Read the file as a label map
    #[arg(long)]
    label: bool,
    /// Absolute directory for rolling log files; logging stays off without it
    #[arg(long, value_name = "DIR", env = "VOLSCENE_LOG_DIR")]
    log_dir: Option<PathBuf>,
    /// trace|debug|info|warn|error (defaults to the build mode's level)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,
    /// NRRD file to ingest
    #[arg(value_name = "FILE")]
    file: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    println!("volscene_core version={}", volscene_core::core_version());

    if let Some(dir) = &cli.log_dir {
        let level = cli.log_level.unwrap_or_else(default_log_level);
        match LogConfig::new(level, dir).and_then(|config| init_logging(&config)) {
            Ok(()) => {
                if let Some(active) = logging_status() {
                    println!("logging level={} dir={}", active.level, active.dir.display());
                }
            }
            Err(err) => eprintln!("logging disabled: {err}"),
        }
    }

    let Some(file) = cli.file else {
        return ExitCode::SUCCESS;
    };
    let options = if cli.label {
        LoadOptions::LABEL_MAP
    } else {
        LoadOptions::NONE
    };

    let mut scene = Scene::new();
    let mut service = VolumesService::new(NrrdVolumeIo::new());
    service.install_color_tables(&mut scene);
    let request = IngestRequest::new(file).with_options(options);
    match service.add_archetype_volume(&mut scene, &request) {
        Ok(set) => {
            let Ok(volume) = scene.volume(&set.node) else {
                eprintln!("volume {} missing after ingest", set.node);
                return ExitCode::FAILURE;
            };
            let name = scene
                .node(&set.node)
                .and_then(|node| node.name())
                .unwrap_or_default();
            println!("volume id={} name={name} kind={}", set.node, volume.kind.as_str());
            if let Some(dims) = volume.dimensions() {
                println!("dimensions={}x{}x{}", dims[0], dims[1], dims[2]);
            }
            println!("spacing={:?} origin={:?}", volume.spacing, volume.origin);
            println!("display={} storage={}", set.display, set.storage);
            println!("scene_nodes={}", scene.node_count());
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("event=cli_ingest module=cli status=error");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
