use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;
use videomaker::config::{default_output_path, validate_resolution};
use videomaker::{
    delete_temp_files, find_temp_files, AppConfig, CancelToken, FallbackPolicy, Progress, RunConfig, RunSummary,
    VideoMaker, VideoMakerError, TEMP_SUFFIX,
};

#[derive(Subcommand, Debug)]
enum Command {
    /// Find and delete temporary frames left behind by an interrupted run
    Clean {
        /// Folder to scan (defaults to the current directory)
        dir: Option<PathBuf>,

        /// Delete without asking for confirmation
        #[arg(long, short, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Parser, Debug)]
#[command(version, about = "Create a slideshow video from the images in a folder.")]
struct Args {
    /// Optional subcommands
    #[command(subcommand)]
    cmd: Option<Command>,

    /// Input folder containing images
    #[arg(long, short)]
    folder: Option<PathBuf>,

    /// Output video file path (default: <folder>/output_video.mp4)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Duration per image in seconds (default: 2.0)
    #[arg(long, short)]
    duration: Option<f64>,

    /// Frames per second (default: 24)
    #[arg(long)]
    fps: Option<u32>,

    /// Run in command line mode without interactive prompts
    #[arg(long, default_value_t = false)]
    nogui: bool,

    /// Resolution preset from the config (720p, 1080p, 1440p, 4k, square)
    #[arg(long, conflicts_with_all = &["width", "height"])]
    preset: Option<String>,

    /// Output width in pixels
    #[arg(long, requires = "height")]
    width: Option<u32>,

    /// Output height in pixels
    #[arg(long, requires = "width")]
    height: Option<u32>,

    /// Config file (.toml or .json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fail the run when an image cannot be processed instead of using it unchanged
    #[arg(long, default_value_t = false)]
    abort_on_image_error: bool,

    /// Log details to standard error
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Some(Command::Clean { dir, yes }) = &args.cmd {
        return run_clean(dir.as_deref().unwrap_or(Path::new(".")), *yes);
    }

    let (maker, cfg) = match build_maker(&args) {
        Ok(v) => v,
        Err(e) => {
            println!("Error: {:#}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    let duration = args.duration.unwrap_or(cfg.default_duration);
    let fps = args.fps.unwrap_or(cfg.default_fps);

    if args.nogui {
        run_headless(&args, &maker, duration, fps)
    } else {
        run_interactive(&args, &maker, duration, fps)
    }
}

fn build_maker(args: &Args) -> Result<(VideoMaker, AppConfig)> {
    let cfg = AppConfig::load(args.config.as_deref())?;
    let mut maker = VideoMaker::with_config(&cfg, args.preset.as_deref())?;
    if let (Some(w), Some(h)) = (args.width, args.height) {
        validate_resolution(w, h)?;
        maker = maker.with_resolution(w, h);
    }
    if args.abort_on_image_error {
        maker = maker.with_fallback_policy(FallbackPolicy::Abort);
    }
    Ok((maker, cfg))
}

fn progress_line(p: &Progress) -> String {
    format!("[{:5.1}%] {}", p.percentage, p.message)
}

/// Checks done before a headless run starts; the error is the text to print.
fn headless_run_config(args: &Args, duration: f64, fps: u32) -> Result<RunConfig, String> {
    let Some(folder) = args.folder.clone() else {
        return Err("Error: Input folder is required in command line mode!\n\
                    Use --folder to specify the input folder or remove --nogui to use interactive mode"
            .to_string());
    };
    if !folder.exists() {
        return Err(format!("Error: Folder '{}' does not exist!", folder.display()));
    }
    Ok(RunConfig::new(folder, args.output.clone(), duration, fps))
}

fn headless_outcome(maker: &VideoMaker, run: &RunConfig) -> Result<RunSummary, String> {
    maker
        .create_video(run, &CancelToken::new(), |p| println!("{}", progress_line(&p)))
        .map_err(|e| {
            if e.is_user_input_error() {
                format!("Error: {}", e)
            } else {
                format!("Error: video creation failed: {}", e)
            }
        })
}

fn run_headless(args: &Args, maker: &VideoMaker, duration: f64, fps: u32) -> Result<ExitCode> {
    let run = match headless_run_config(args, duration, fps) {
        Ok(run) => run,
        Err(msg) => {
            println!("{}", msg);
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("Input folder: {}", run.input_dir.display());
    println!("Output video: {}", run.output.display());
    println!("Duration per image: {} seconds", run.duration_per_image);
    println!("FPS: {}", run.fps);

    match headless_outcome(maker, &run) {
        Ok(summary) => {
            if summary.fallbacks > 0 {
                println!(
                    "Warning: {} image(s) could not be processed and were used unchanged",
                    summary.fallbacks
                );
            }
            println!("Video creation completed successfully!");
            Ok(ExitCode::SUCCESS)
        }
        Err(msg) => {
            println!("{}", msg);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn prompt_run(args: &Args, duration: f64, fps: u32) -> Result<RunConfig> {
    let theme = ColorfulTheme::default();

    let default_folder = args
        .folder
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ".".to_string());
    let folder: String = Input::with_theme(&theme)
        .with_prompt("Input folder")
        .default(default_folder)
        .validate_with(|s: &String| -> Result<(), &str> {
            if Path::new(s).is_dir() {
                Ok(())
            } else {
                Err("Input folder does not exist!")
            }
        })
        .interact_text()?;
    let folder = PathBuf::from(folder);

    let default_output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&folder));
    let output: String = Input::with_theme(&theme)
        .with_prompt("Output video")
        .default(default_output.display().to_string())
        .validate_with(|s: &String| -> Result<(), &str> {
            if s.trim().is_empty() {
                Err("Please select an output path!")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let duration: f64 = Input::with_theme(&theme)
        .with_prompt("Duration per image (seconds)")
        .default(duration)
        .validate_with(|d: &f64| -> Result<(), &str> {
            if d.is_finite() && *d > 0.0 {
                Ok(())
            } else {
                Err("Duration must be greater than zero")
            }
        })
        .interact_text()?;

    let fps: u32 = Input::with_theme(&theme)
        .with_prompt("Frames per second")
        .default(fps)
        .validate_with(|f: &u32| -> Result<(), &str> {
            if *f > 0 {
                Ok(())
            } else {
                Err("FPS must be non-zero")
            }
        })
        .interact_text()?;

    Ok(RunConfig::new(folder, Some(PathBuf::from(output.trim())), duration, fps))
}

fn run_interactive(args: &Args, maker: &VideoMaker, duration: f64, fps: u32) -> Result<ExitCode> {
    let run = prompt_run(args, duration, fps)?;

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Create {} from {} ({}s per image, {} fps, {}x{})?",
            run.output.display(),
            run.input_dir.display(),
            run.duration_per_image,
            run.fps,
            maker.frame_spec().width,
            maker.frame_spec().height
        ))
        .default(true)
        .interact()?;
    if !confirmed {
        println!("Operation cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let output = run.output.clone();
    let handle = maker.spawn(run)?;

    // Stdin stays blocked after the run ends; the process exits right after.
    let cancel = handle.cancel_token();
    println!("Press Enter to cancel.");
    thread::spawn(move || {
        let mut line = String::new();
        if matches!(std::io::stdin().read_line(&mut line), Ok(n) if n > 0) {
            cancel.cancel();
        }
    });

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    for p in handle.events() {
        pb.set_position(p.percentage.round() as u64);
        pb.set_message(p.message);
    }
    pb.finish_and_clear();

    match handle.wait() {
        Ok(summary) => {
            if summary.fallbacks > 0 {
                println!(
                    "Warning: {} image(s) could not be processed and were used unchanged",
                    summary.fallbacks
                );
            }
            println!(
                "Video created successfully! ({} images, {:.2} seconds)\n\nSaved as: {}",
                summary.images,
                summary.duration_secs,
                output.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(VideoMakerError::Cancelled) => {
            println!("Operation cancelled by user.");
            if output.exists() {
                println!("Note: {} may be incomplete.", output.display());
            }
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            println!("Error: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_clean(dir: &Path, assume_yes: bool) -> Result<ExitCode> {
    if !dir.is_dir() {
        return Err(anyhow!("Folder '{}' does not exist", dir.display()));
    }

    let temp_files = find_temp_files(dir);
    if temp_files.is_empty() {
        println!("No temporary files found!");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Temporary files (*{}) in {}:", TEMP_SUFFIX, dir.display());
    for p in &temp_files {
        println!("  {}", p.display());
    }

    if !assume_yes
        && !Confirm::new()
            .with_prompt(format!("Found {} temporary files. Delete them?", temp_files.len()))
            .default(false)
            .interact()?
    {
        println!("Nothing deleted.");
        return Ok(ExitCode::SUCCESS);
    }

    let report = delete_temp_files(&temp_files);
    for (path, err) in &report.failed {
        eprintln!("Failed to delete {}: {}", path.display(), err);
    }
    println!("Deleted {} temporary files", report.deleted);
    Ok(ExitCode::SUCCESS)
}
