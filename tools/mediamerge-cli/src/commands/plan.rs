//! Print the timeline a composition would use.

use std::path::PathBuf;

use mediamerge_common::config::AppConfig;
use mediamerge_composition_model::format::format_duration;
use mediamerge_composition_model::timeline::{PhaseKind, TimelinePlan};
use mediamerge_planner::{plan, PlanInputs};
use mediamerge_render_engine::ComposeOptions;

use crate::PolicyOptions;

pub fn run(
    app_config: &AppConfig,
    banners: usize,
    main_secs: f64,
    config_path: Option<PathBuf>,
    policy_options: PolicyOptions,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path.as_deref())?;
    let policy = super::resolve_policy(&policy_options)?;
    let mut settings = ComposeOptions::from_render_defaults(&app_config.render).plan;
    super::apply_end_card(&mut config, &mut settings, &policy_options, &app_config.render);

    let timeline = plan(
        &PlanInputs {
            banner_count: banners,
            main_source_secs: main_secs,
        },
        &config,
        policy,
        settings,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&timeline)?);
    } else {
        print_plan(&timeline);
    }
    Ok(())
}

fn print_plan(timeline: &TimelinePlan) {
    println!("Timeline ({})", timeline.policy.name());
    println!("{}", "=".repeat(50));
    for phase in &timeline.phases {
        let label = match (phase.kind, phase.source_index) {
            (PhaseKind::Banner, Some(i)) => format!("banner {i}"),
            (PhaseKind::Banner, None) => "banner".to_string(),
            (PhaseKind::MainContent, _) => "main content".to_string(),
            (PhaseKind::EndCard, _) => "end card".to_string(),
        };
        println!(
            "  {:>8.3}s - {:>8.3}s  {label}",
            phase.start_secs(),
            phase.end_secs()
        );
    }
    println!();
    println!(
        "Total: {} ({:.3}s)",
        format_duration(timeline.total_secs()),
        timeline.total_secs()
    );
    println!("Crossfade: {:.3}s", timeline.crossfade_secs());
    println!(
        "Main content: {:.3}s of source at {:.3}x",
        timeline.main_source_secs, timeline.main_playback_rate
    );
}
