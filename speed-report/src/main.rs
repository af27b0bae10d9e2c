//! Report motion speed statistics of a video clip

use clap::*;
use flowspeed::prelude::v1::{Result, *};
use log::*;
use serde_json::json;
use std::fs::File;
use std::path::Path;

/// Load the configuration and apply `name=value` overrides.
fn load_config<'a>(
    path: Option<&str>,
    overrides: impl IntoIterator<Item = &'a str>,
) -> Result<PipelineConfig> {
    let mut cfg: PipelineConfig = match path {
        Some(path) => {
            let file = File::open(path).map_err(|e| anyhow!("Unable to open {path}: {e}"))?;
            serde_json::from_reader(file)?
        }
        None => Default::default(),
    };

    for o in overrides {
        let (name, value) = o
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected name=value, got {o}"))?;
        cfg.set_prop(name.trim(), value)?;
    }

    cfg.validate()?;

    Ok(cfg)
}

fn report_json(report: &MotionReport) -> serde_json::Value {
    json!({
        "max_speed": report.stats.max_speed,
        "min_speed": report.stats.min_speed,
        "avg_speed": report.stats.avg_speed,
        "samples": report.stats.samples,
        "sampled_frames": report.sampled_frames,
        "framerate": report.framerate,
        "overlay_width": report.overlay_width,
        "overlay_height": report.overlay_height,
    })
}

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("speed-report")
        .version(crate_version!())
        .about("Estimates foreground motion speed of a video clip")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .takes_value(true)
                .help("JSON pipeline configuration"),
        )
        .arg(
            Arg::new("set")
                .long("set")
                .short('s')
                .takes_value(true)
                .multiple_occurrences(true)
                .help("Override a single setting, e.g. --set winsize=21"),
        )
        .arg(
            Arg::new("overlay")
                .long("overlay")
                .short('o')
                .takes_value(true)
                .help("Write the heatmap overlay JPEG here"),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .help("Print the effective configuration and exit"),
        )
        .arg(Arg::new("input").required_unless_present("print-config"))
        .get_matches();

    let cfg = load_config(
        matches.value_of("config"),
        matches.values_of("set").into_iter().flatten(),
    )?;

    if matches.is_present("print-config") {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(());
    }

    let pipeline = MotionPipeline::new(cfg)?;

    let input = matches
        .value_of("input")
        .ok_or_else(|| anyhow!("No input given"))?;

    if !Path::new(input).is_file() {
        bail!("{input} is not a readable file");
    }

    let mut decoder = match motion_loader::open_decoder(input) {
        Ok(decoder) => decoder,
        Err(e) => {
            warn!("Unable to decode {input}: {e}");
            Box::new(FrameVec::default())
        }
    };

    let report = pipeline.analyse(decoder.as_mut())?;

    if let Some(path) = matches.value_of("overlay") {
        std::fs::write(path, &report.overlay_jpeg)?;
        info!("Wrote overlay to {path}");
    }

    println!("{}", serde_json::to_string_pretty(&report_json(&report))?);

    Ok(())
}
