pub mod args;

pub use args::{Cli, CliCommand, GraphCliArgs};

use crate::config::{Config, MixConfig, SourceMode};
use crate::graph::{FilterGraph, SecondaryInput};
use anyhow::Result;

/// Report which external collaborators are reachable.
pub fn handle_check_command() -> Result<()> {
    let config = Config::load()?;

    match &config.engine.ffmpeg_path {
        Some(path) => {
            let exists = std::path::Path::new(path).exists();
            println!(
                "engine:  {} ({})",
                path,
                if exists { "configured" } else { "MISSING" }
            );
        }
        None => match which::which("ffmpeg") {
            Ok(path) => println!("engine:  {} (found in PATH)", path.display()),
            Err(_) => println!("engine:  ffmpeg NOT FOUND in PATH"),
        },
    }

    match which::which(&config.capture.command) {
        Ok(path) => println!("capture: {} (found)", path.display()),
        Err(_) => println!(
            "capture: {} NOT FOUND (device mode will degrade)",
            config.capture.command
        ),
    }

    if config.browser.command.is_empty() {
        println!("browser: no automation command configured (browser mode will degrade)");
    } else {
        println!("browser: {}", config.browser.command);
    }

    Ok(())
}

/// Build and print the filter graph for the given parameters without
/// touching any pipeline state.
pub fn handle_graph_command(args: GraphCliArgs) -> Result<()> {
    let config = MixConfig {
        input_url: args.input_url,
        output_url: args.output_url,
        source_mode: if args.secondary.is_some() {
            SourceMode::Url
        } else {
            SourceMode::Disabled
        },
        primary_volume: args.primary_volume,
        secondary_volume: args.secondary_volume,
        primary_delay_ms: args.primary_delay_ms,
        secondary_delay_ms: args.secondary_delay_ms,
        video_bitrate_kbps: args.video_bitrate_kbps,
        ..MixConfig::default()
    };
    config.validate()?;

    let secondary = args.secondary.map(|locator| SecondaryInput {
        locator,
        looped: args.looped,
    });
    let graph = FilterGraph::build(&config, secondary.as_ref());

    println!("filter stages:");
    for stage in graph.filters() {
        println!("  {stage}");
    }
    println!();
    println!("ffmpeg {}", graph.engine_args().join(" "));

    Ok(())
}
