//! Example: Turn a folder of images into a slideshow using videomaker as a library
//!
//! Run with: cargo run --example simple_slideshow -- <image folder>

use std::path::PathBuf;

use videomaker::{FallbackPolicy, RunConfig, VideoMaker};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let input = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tests/images"));

    if !input.is_dir() {
        println!("Note: {} not found.", input.display());
        println!("Pass a folder of images as the first argument.");
        return Ok(());
    }

    // 720p canvas; images that fail to decode go in unprocessed
    let maker = VideoMaker::new()
        .with_resolution(1280, 720)
        .with_fallback_policy(FallbackPolicy::UseOriginal);
    let run = RunConfig::new(&input, Some(PathBuf::from("example_slideshow.mp4")), 1.5, 30);

    println!("Input: {}", input.display());
    println!("Output: {}", run.output.display());

    let handle = maker.spawn(run)?;
    for progress in handle.events() {
        println!("[{:5.1}%] {}", progress.percentage, progress.message);
    }
    let summary = handle.wait()?;

    println!(
        "Done: {} images, {:.1}s, {} used unprocessed",
        summary.images, summary.duration_secs, summary.fallbacks
    );
    Ok(())
}
