pub mod check;
pub mod compose;
pub mod plan;

use std::path::Path;

use anyhow::Context;
use mediamerge_common::config::RenderDefaults;
use mediamerge_composition_model::config::{Config, EndCard};
use mediamerge_composition_model::timeline::DurationPolicy;
use mediamerge_planner::PlanSettings;

use crate::{PolicyArg, PolicyOptions};

/// Read composition options from a JSON file, or use the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: Config = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}

/// Turn the policy flags into a [`DurationPolicy`].
pub fn resolve_policy(options: &PolicyOptions) -> anyhow::Result<DurationPolicy> {
    Ok(match options.policy {
        PolicyArg::Additive => DurationPolicy::AdditiveMinimum {
            minimum_secs: options.minimum_secs,
        },
        PolicyArg::Exact => {
            let target_secs = options
                .target_secs
                .context("--policy exact requires --target-secs")?;
            DurationPolicy::ExactTarget { target_secs }
        }
        PolicyArg::BannerCount => DurationPolicy::BannerCountScaled,
    })
}

/// Apply `--end-card` to the config and reserve the end-card slot when
/// the config carries one.
pub fn apply_end_card(
    config: &mut Config,
    settings: &mut PlanSettings,
    options: &PolicyOptions,
    defaults: &RenderDefaults,
) {
    if let Some(title) = &options.end_card {
        config.end_card = Some(EndCard {
            title: title.clone(),
            caption: None,
        });
    }
    settings.end_card_secs = config.end_card.as_ref().map(|_| defaults.end_card_secs);
}
