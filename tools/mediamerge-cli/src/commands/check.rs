//! Check system capabilities.

use mediamerge_capture_engine::ffmpeg::encoder_available;
use mediamerge_capture_engine::OutputFormat;
use mediamerge_common::config::{config_file_path, AppConfig};
use mediamerge_media_loader::probe::command_exists;

pub fn run(app_config: &AppConfig) -> anyhow::Result<()> {
    println!("MediaMerge System Check");
    println!("{}", "=".repeat(50));

    let mut ready = true;
    for binary in ["ffmpeg", "ffprobe"] {
        if command_exists(binary) {
            println!("[OK] {binary} found");
        } else {
            println!("[WARN] {binary} not found on PATH");
            ready = false;
        }
    }

    let mut any_format = false;
    for format in [OutputFormat::Mp4H264Aac, OutputFormat::WebmVp9Opus] {
        let (video, audio) = format.encoders();
        let available = encoder_available(video) && encoder_available(audio);
        any_format |= available;
        if available {
            println!("[OK] {}: {video} + {audio}", format.container_mime());
        } else {
            println!(
                "[WARN] {}: needs {video} and {audio}",
                format.container_mime()
            );
        }
    }
    ready &= any_format;

    match &app_config.render.font_path {
        Some(path) if path.exists() => println!("[OK] Font: {}", path.display()),
        Some(path) => println!("[WARN] Font not found: {}", path.display()),
        None => println!("[WARN] No font configured; watermark and end-card text are skipped"),
    }

    println!("     Config: {}", config_file_path().display());
    println!("     Output directory: {}", app_config.output_dir.display());

    println!();
    if ready {
        println!("An encoder is available. MediaMerge is ready.");
    } else {
        println!("ffmpeg or a supported encoder is missing. Install ffmpeg with libx264/aac or libvpx-vp9/libopus.");
    }

    Ok(())
}
