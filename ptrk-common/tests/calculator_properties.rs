//! Property tests for the percent-complete calculator

use chrono::Utc;
use proptest::prelude::*;
use ptrk_common::templates::{validate, MilestoneDef, Template, TemplateScope};
use ptrk_common::{calculate_percent, MilestoneState, MilestoneValue};

const MAX_MILESTONES: usize = 8;

/// Valid template: cut points over 0..=100 give weights summing to 100
fn template_strategy() -> impl Strategy<Value = Template> {
    (
        prop::collection::vec(0i32..=100, 0..MAX_MILESTONES),
        prop::collection::vec(any::<bool>(), MAX_MILESTONES),
    )
        .prop_map(|(mut cuts, partial)| {
            cuts.sort_unstable();
            let mut bounds = vec![0];
            bounds.extend(cuts);
            bounds.push(100);

            let milestones = bounds
                .windows(2)
                .enumerate()
                .map(|(i, w)| MilestoneDef {
                    name: format!("M{}", i),
                    weight: w[1] - w[0],
                    is_partial: partial[i],
                })
                .collect();

            Template {
                scope: TemplateScope::System,
                component_type: "Prop".to_string(),
                version: 1,
                milestones,
                created_by: "proptest".to_string(),
                created_at: Utc::now(),
            }
        })
}

/// Template plus a state covering any subset of its milestones
fn template_and_state() -> impl Strategy<Value = (Template, MilestoneState)> {
    (
        template_strategy(),
        prop::collection::vec((any::<bool>(), any::<bool>(), 0.0f64..=100.0), MAX_MILESTONES),
    )
        .prop_map(|(template, picks)| {
            let mut state = MilestoneState::new();
            for (milestone, (present, flag, fraction)) in template.milestones.iter().zip(picks) {
                if !present {
                    continue;
                }
                let value = if milestone.is_partial && !flag {
                    MilestoneValue::Fraction(fraction)
                } else {
                    MilestoneValue::Done(flag)
                };
                state.insert(milestone.name.clone(), value);
            }
            (template, state)
        })
}

proptest! {
    #[test]
    fn generated_templates_are_valid(template in template_strategy()) {
        prop_assert!(validate(&template.weights()).is_ok());
    }

    #[test]
    fn result_is_deterministic((template, state) in template_and_state()) {
        prop_assert_eq!(calculate_percent(&state, &template), calculate_percent(&state, &template));
    }

    #[test]
    fn result_is_bounded((template, state) in template_and_state()) {
        prop_assert!(calculate_percent(&state, &template) <= 100);
    }

    #[test]
    fn all_complete_is_100(template in template_strategy()) {
        let state: MilestoneState = template
            .milestones
            .iter()
            .map(|m| (m.name.clone(), MilestoneValue::Done(true)))
            .collect();
        prop_assert_eq!(calculate_percent(&state, &template), 100);
    }

    #[test]
    fn completing_discrete_milestone_never_decreases(
        (template, state) in template_and_state(),
        pick in any::<prop::sample::Index>(),
    ) {
        let before = calculate_percent(&state, &template);
        let milestone = &template.milestones[pick.index(template.milestones.len())];

        let mut completed = state.clone();
        completed.insert(milestone.name.clone(), MilestoneValue::Done(true));

        prop_assert!(calculate_percent(&completed, &template) >= before);
    }

    #[test]
    fn stale_keys_are_ignored((template, state) in template_and_state()) {
        let mut with_stale = state.clone();
        with_stale.insert("Retired Milestone".to_string(), MilestoneValue::Done(true));
        prop_assert_eq!(
            calculate_percent(&with_stale, &template),
            calculate_percent(&state, &template)
        );
    }
}
