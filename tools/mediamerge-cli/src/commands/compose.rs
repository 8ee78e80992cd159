//! Compose assets into a video file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use mediamerge_capture_engine::{CaptureSink, FfmpegRecorder, OutputFormat};
use mediamerge_common::clock::SystemFrameClock;
use mediamerge_common::config::AppConfig;
use mediamerge_composition_model::asset::RawFile;
use mediamerge_media_loader::{LoadOptions, MediaLoader};
use mediamerge_render_engine::{
    CancelToken, ComposeAssets, ComposeOptions, ComposeRequest, Composer, RenderProgress,
    RenderStage,
};
use mediamerge_suggest::{build_prompt, suggest_with_fallback, AssetNames, CommandService};

use crate::history::DirectoryStore;
use crate::PolicyOptions;

const SUGGEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Arguments of `mediamerge compose`.
#[derive(Debug)]
pub struct ComposeArgs {
    pub images: Vec<PathBuf>,
    pub video: PathBuf,
    pub audio: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub policy: PolicyOptions,
    pub seed: u64,
    pub output: Option<PathBuf>,
    pub suggest_cmd: Option<String>,
}

pub async fn run(app_config: &AppConfig, args: ComposeArgs) -> anyhow::Result<()> {
    let mut config = super::load_config(args.config.as_deref())?;
    let policy = super::resolve_policy(&args.policy)?;
    let mut options = ComposeOptions::from_render_defaults(&app_config.render);
    options.seed = args.seed;
    super::apply_end_card(&mut config, &mut options.plan, &args.policy, &app_config.render);

    let requested = args
        .output
        .as_deref()
        .and_then(Path::extension)
        .and_then(|ext| OutputFormat::from_extension(&ext.to_string_lossy()))
        .unwrap_or_default();

    let names = AssetNames {
        video: file_label(&args.video),
        audio: args.audio.first().map(|p| file_label(p)),
        image: args.images.first().map(|p| file_label(p)),
    };

    println!("Composing:");
    println!("  Cover images: {}", args.images.len());
    println!("  Screen recording: {}", args.video.display());
    println!("  Music tracks: {}", args.audio.len());
    println!("  Policy: {}", policy.name());

    let mut files = Vec::with_capacity(args.images.len() + args.audio.len() + 1);
    for path in args
        .images
        .iter()
        .chain(std::iter::once(&args.video))
        .chain(args.audio.iter())
    {
        files.push(RawFile::from_path(path).with_context(|| format!("cannot read {}", path.display()))?);
    }

    let load_options =
        LoadOptions::from_render_defaults(&app_config.render, Some(config.output_preset.dimensions()));
    let limits = options.limits;

    let cancel = CancelToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling composition");
            ctrl_c_token.cancel();
        }
    });

    let progress_cb = Box::new(|p: RenderProgress| match p.stage {
        RenderStage::Rendering => print!(
            "\r  Progress: {:.1}% ({}/{} frames)  ",
            p.progress * 100.0,
            p.frames_pushed,
            p.total_frames,
        ),
        RenderStage::Finalizing => print!("\r  Finalizing...                          "),
        RenderStage::Complete => {}
    });

    let mut store = DirectoryStore::new(app_config.output_dir.clone()).with_output(args.output);
    let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<DirectoryStore> {
        let loader = MediaLoader::new(load_options);
        let assets = ComposeAssets::load(&loader, &files, limits)?;

        let sink = CaptureSink::new(Box::new(FfmpegRecorder::new()));
        let mut composer = Composer::new(sink, Box::new(SystemFrameClock::new()))
            .with_cancel_token(cancel)
            .with_progress(progress_cb);

        options.recorder.format = choose_format(requested, |f| composer.sink_mut().supports(f))
            .context("no encoder available for MP4 or WebM output; run `mediamerge check`")?;
        if options.recorder.format != requested {
            println!(
                "  {} is not available, writing {} instead",
                requested.container_mime(),
                options.recorder.format.container_mime()
            );
        }

        composer.compose_into(
            ComposeRequest {
                assets,
                config,
                policy,
                options,
            },
            &mut store,
        )?;
        Ok(store)
    })
    .await?;

    let store = match outcome {
        Ok(store) => store,
        Err(e) => {
            let message = match e.downcast_ref::<mediamerge_common::error::MergeError>() {
                Some(merge_error) => merge_error.user_message(),
                None => e.to_string(),
            };
            println!("\nComposition failed: {message}");
            return Err(e);
        }
    };

    if let Some(saved) = store.saved().last() {
        println!("\nComposition complete: {}", saved.video.display());
        println!("  Thumbnail: {}", saved.thumbnail.display());
        println!("  Summary: {}", saved.summary.display());
    }

    if let Some(command) = args.suggest_cmd.as_deref() {
        print_suggestions(command, &names).await;
    }

    Ok(())
}

/// `requested` if the sink can encode it, else the first supported fallback.
fn choose_format(
    requested: OutputFormat,
    mut supports: impl FnMut(OutputFormat) -> bool,
) -> Option<OutputFormat> {
    let mut candidate = Some(requested);
    while let Some(format) = candidate {
        if supports(format) {
            return Some(format);
        }
        candidate = format.fallback();
    }
    None
}

async fn print_suggestions(command: &str, names: &AssetNames) {
    let Some(service) = CommandService::from_command_line(command) else {
        tracing::warn!("Empty --suggest-cmd, skipping suggestions");
        return;
    };
    let prompt = build_prompt(names);
    let Some(metadata) = suggest_with_fallback(&service, &prompt, SUGGEST_TIMEOUT).await else {
        println!("No title suggestions available.");
        return;
    };

    println!();
    println!("Suggested titles:");
    for title in &metadata.titles {
        println!("  - {title}");
    }
    println!("Suggested descriptions:");
    for description in &metadata.descriptions {
        println!("  - {description}");
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_requested_when_supported() {
        assert_eq!(
            choose_format(OutputFormat::Mp4H264Aac, |_| true),
            Some(OutputFormat::Mp4H264Aac)
        );
    }

    #[test]
    fn test_choose_falls_back_to_webm() {
        let chosen = choose_format(OutputFormat::Mp4H264Aac, |f| f == OutputFormat::WebmVp9Opus);
        assert_eq!(chosen, Some(OutputFormat::WebmVp9Opus));
    }

    #[test]
    fn test_choose_nothing_supported() {
        assert_eq!(choose_format(OutputFormat::Mp4H264Aac, |_| false), None);
        assert_eq!(choose_format(OutputFormat::WebmVp9Opus, |_| false), None);
    }

    #[test]
    fn test_file_label_uses_name() {
        assert_eq!(file_label(Path::new("/tmp/media/demo.mp4")), "demo.mp4");
    }
}
