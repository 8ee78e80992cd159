//! Property tests for the timeline planner.

use mediamerge_composition_model::config::Config;
use mediamerge_composition_model::timeline::{DurationPolicy, PhaseKind};
use mediamerge_planner::{PlanInputs, PlanSettings, TimelinePlanner};
use proptest::prelude::*;

fn planner(end_card: Option<f64>) -> TimelinePlanner {
    TimelinePlanner::new(PlanSettings {
        end_card_secs: end_card,
        ..PlanSettings::default()
    })
}

fn config(speed: f64) -> Config {
    Config {
        playback_speed: speed,
        ..Config::default()
    }
}

fn end_card_strategy() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![Just(None), (1u32..=8).prop_map(|s| Some(s as f64))]
}

proptest! {
    #[test]
    fn phase_durations_sum_to_total(
        banners in 1usize..=15,
        main in 0.5f64..600.0,
        speed in 0.25f64..4.0,
        end_card in end_card_strategy(),
        policy_pick in 0u8..3,
    ) {
        let policy = match policy_pick {
            0 => DurationPolicy::AdditiveMinimum { minimum_secs: 60.0 },
            1 => DurationPolicy::ExactTarget { target_secs: 90.0 },
            _ => DurationPolicy::BannerCountScaled,
        };
        let inputs = PlanInputs { banner_count: banners, main_source_secs: main };

        match planner(end_card).plan(&inputs, &config(speed), policy) {
            Ok(plan) => {
                let sum: u64 = plan.phases.iter().map(|p| p.duration_ns()).sum();
                prop_assert_eq!(sum, plan.total_ns);
                prop_assert!(plan.check_invariants().is_ok());
                prop_assert_eq!(plan.banner_count(), banners);
                prop_assert_eq!(plan.end_card().is_some(), end_card.is_some());
            }
            Err(_) => {
                // Only the exact-target policy may run out of room.
                prop_assert_eq!(policy_pick, 1);
            }
        }
    }

    #[test]
    fn exact_target_total_is_target(
        banners in 1usize..=15,
        main in 0.5f64..600.0,
        target in 61u32..=300,
        end_card in end_card_strategy(),
    ) {
        let target = target as f64;
        let reserved = banners as f64 * PlanSettings::default().banner_secs + end_card.unwrap_or(0.0);
        prop_assume!(reserved < target);
        let inputs = PlanInputs { banner_count: banners, main_source_secs: main };
        let plan = planner(end_card)
            .plan(&inputs, &Config::default(), DurationPolicy::ExactTarget { target_secs: target })
            .unwrap();

        prop_assert_eq!(plan.total_secs(), target);
        let main_phase = plan.main_content().unwrap();
        let expected_rate = main / main_phase.duration_secs();
        prop_assert!((plan.main_playback_rate - expected_rate).abs() < 1e-9);
    }

    #[test]
    fn additive_total_respects_floor(
        banners in 1usize..=15,
        main in 0.5f64..600.0,
        floor in 0u32..=180,
    ) {
        let inputs = PlanInputs { banner_count: banners, main_source_secs: main };
        let plan = planner(None)
            .plan(
                &inputs,
                &Config::default(),
                DurationPolicy::AdditiveMinimum { minimum_secs: floor as f64 },
            )
            .unwrap();

        prop_assert!(plan.total_secs() >= floor as f64);
        prop_assert!(plan.total_secs() + 1e-6 >= banners as f64 * 4.0 + main);
    }

    #[test]
    fn banner_phases_open_the_plan(banners in 1usize..=15, main in 0.5f64..120.0) {
        let inputs = PlanInputs { banner_count: banners, main_source_secs: main };
        let plan = planner(Some(4.0))
            .plan(&inputs, &Config::default(), DurationPolicy::BannerCountScaled)
            .unwrap();

        for (i, phase) in plan.phases.iter().take(banners).enumerate() {
            prop_assert_eq!(phase.kind, PhaseKind::Banner);
            prop_assert_eq!(phase.source_index, Some(i));
        }
        prop_assert_eq!(plan.phases[banners].kind, PhaseKind::MainContent);
    }
}
