//! Command-line front end for the rig.
//!
//! Every command except `lens` without an argument connects to the rig
//! first, which homes and centers the stage.
//!
//! ```bash
//! stagecam-cli autofocus
//! stagecam-cli photo sample.jpg --color --focus 5
//! stagecam-cli scan 4 3 --pattern raster --focus-stack
//! stagecam-cli light ring 0 0 0 255
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use stagecam::sharpness::laplacian_variance;
use stagecam::{LensCatalog, Rgbw, Rig, RigConfig, ScanPattern};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "stagecam-cli")]
#[command(about = "Motion-coordinated capture for the macro photography rig", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, default_value = "stagecam.toml")]
    config: PathBuf,

    /// Lens identifier, overriding the configured default
    #[arg(long, global = true)]
    lens: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Home all axes
    Home,

    /// Run the centering choreography
    Center,

    /// Focus the camera on the sample
    Autofocus {
        /// Only refine around the current height
        #[arg(long)]
        fine: bool,
    },

    /// Save a full resolution still
    Photo {
        output: PathBuf,
        /// Flat-field colour correct against a defocused background
        #[arg(long)]
        color: bool,
        /// Focus stack this many samples for the colour corrected photo
        #[arg(long, requires = "color")]
        focus: Option<u32>,
    },

    /// Capture a focus bracket and merge it
    FocusStack {
        #[arg(long)]
        samples: Option<u32>,
        #[arg(long)]
        step: Option<f64>,
    },

    /// Scan a grid of fields of view and stitch it
    Scan {
        /// Tiles per row
        fov_x: u32,
        /// Rows
        fov_y: u32,
        #[arg(long, default_value = "boustrophedon")]
        pattern: ScanPattern,
        /// Travel per field of view, defaults to the lens stitch step
        #[arg(long)]
        step: Option<f64>,
        /// Focus stack every tile
        #[arg(long)]
        focus_stack: bool,
    },

    /// Drive the lighting controller
    Light {
        #[command(subcommand)]
        action: LightAction,
    },

    /// List the lens catalog, or switch to lens `id`
    Lens { id: Option<String> },

    /// Print the live sharpness until Ctrl-C
    Stream {
        #[arg(long, default_value = "500")]
        interval_ms: u64,
    },
}

#[derive(Subcommand)]
enum LightAction {
    /// Switch the bottom light
    Bottom { state: Switch },
    /// Set every ring light to one colour
    Ring { r: u8, g: u8, b: u8, w: u8 },
    /// Set a single ring light
    Channel {
        index: usize,
        r: u8,
        g: u8,
        b: u8,
        w: u8,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

fn main() -> Result<()> {
    stagecam::init_logging();
    let cli = Cli::parse();

    let config = RigConfig::load_from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let lens = cli
        .lens
        .clone()
        .unwrap_or_else(|| config.lens.default_lens.clone());

    if let Commands::Lens { id: None } = cli.command {
        return cmd_list_lenses(&config, cli.json);
    }

    let mut rig = Rig::connect(config, &lens).context("connecting to the rig")?;
    match cli.command {
        Commands::Home => rig.motion().home()?,
        Commands::Center => rig.motion().center()?,
        Commands::Autofocus { fine } => cmd_autofocus(&mut rig, fine, cli.json)?,
        Commands::Photo {
            output,
            color,
            focus,
        } => {
            if color {
                let jpeg = rig.color_corrected(focus)?;
                fs::write(&output, jpeg)
                    .with_context(|| format!("writing {}", output.display()))?;
            } else {
                rig.camera().save_photo(&output)?;
            }
            println!("{}", output.display());
        }
        Commands::FocusStack { samples, step } => {
            let samples = samples.unwrap_or(rig.config().focus_stack.samples);
            let step = step.unwrap_or(rig.config().focus_stack.step);
            let result = rig.focus_stack(samples, step)?;
            print_result(&result, cli.json, |r| r.output.display().to_string())?;
        }
        Commands::Scan {
            fov_x,
            fov_y,
            pattern,
            step,
            focus_stack,
        } => {
            let mut request = rig
                .scan_request(fov_x, fov_y, pattern)
                .with_focus_stack(focus_stack);
            if let Some(step) = step {
                request = request.with_step(step);
            }
            let outcome = rig.scan(&request)?;
            print_result(&outcome, cli.json, |o| o.stitched.display().to_string())?;
        }
        Commands::Light { action } => cmd_light(&mut rig, action)?,
        Commands::Lens { id } => match id {
            Some(id) => {
                rig.change_lens(&id, |lens| {
                    println!("Mount the {}x objective, then press Enter", lens.id);
                    let mut line = String::new();
                    io::stdin().read_line(&mut line)?;
                    Ok(())
                })?;
                println!("Lens {} in place at z={:.3}", id, rig.motion().z());
            }
            None => cmd_list_lenses(rig.config(), cli.json)?,
        },
        Commands::Stream { interval_ms } => cmd_stream(&rig, interval_ms)?,
    }

    Ok(())
}

fn print_result<T: serde::Serialize>(
    value: &T,
    json: bool,
    summary: impl Fn(&T) -> String,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{}", summary(value));
    }
    Ok(())
}

fn cmd_list_lenses(config: &RigConfig, json: bool) -> Result<()> {
    let catalog = LensCatalog::load(&config.lens.catalog)?;
    let mut profiles = Vec::with_capacity(catalog.len());
    for id in catalog.ids() {
        profiles.push(catalog.get(id)?);
    }

    if json {
        println!("{}", serde_json::to_string(&profiles)?);
    } else {
        for p in profiles {
            println!(
                "{:>4}x  init {:.3}  stitch {:.3}  focus {:.3}",
                p.id, p.init_pos, p.step_stitch, p.step_focus
            );
        }
    }
    Ok(())
}

fn cmd_autofocus(rig: &mut Rig, fine: bool, json: bool) -> Result<()> {
    if fine {
        let sample = rig.fine_focus()?;
        print_result(&sample, json, |s| format!("z={:.3} sharpness={:.1}", s.z, s.sharpness))
    } else {
        let report = rig.autofocus()?;
        print_result(&report, json, |r| {
            format!(
                "coarse z={:.2}, fine z={:.3} sharpness={:.1}",
                r.coarse.z, r.fine.z, r.fine.sharpness
            )
        })
    }
}

fn cmd_light(rig: &mut Rig, action: LightAction) -> Result<()> {
    let light = rig.light();
    match action {
        LightAction::Bottom { state: Switch::On } => light.bottom_light_on()?,
        LightAction::Bottom { state: Switch::Off } => light.bottom_light_off()?,
        LightAction::Ring { r, g, b, w } => light.set_ring(Rgbw::new(r, g, b, w))?,
        LightAction::Channel { index, r, g, b, w } => {
            light.set_channel(index, Rgbw::new(r, g, b, w))?
        }
    }
    Ok(())
}

fn cmd_stream(rig: &Rig, interval_ms: u64) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("installing the Ctrl-C handler")?;

    println!("Streaming, press Ctrl-C to stop");
    while running.load(Ordering::SeqCst) {
        let frame = rig.camera().get_frame()?;
        let sharpness = laplacian_variance(&frame.data)?;
        println!(
            "#{:<6} {}  sharpness {:.1}",
            frame.sequence, frame.resolution, sharpness
        );
        thread::sleep(Duration::from_millis(interval_ms));
    }

    rig.camera().stop()?;
    Ok(())
}
