//! Weighted percent-complete calculation
//!
//! Pure and deterministic: the result depends only on the milestone state and
//! the template passed in. Safe to call concurrently for any number of
//! components.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::templates::{MilestoneDef, Template};

/// Recorded completion of one milestone
///
/// Serialized untagged: `true`/`false` for discrete milestones, a number in
/// `0..=100` for partial ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MilestoneValue {
    Done(bool),
    Fraction(f64),
}

impl MilestoneValue {
    /// Completion as a fraction in `0.0..=100.0`
    pub fn fraction(&self) -> f64 {
        match *self {
            MilestoneValue::Done(true) => 100.0,
            MilestoneValue::Done(false) => 0.0,
            MilestoneValue::Fraction(f) if f.is_finite() => f.clamp(0.0, 100.0),
            MilestoneValue::Fraction(_) => 0.0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.fraction() >= 100.0
    }
}

/// Milestone name -> recorded value
///
/// May hold keys from an older template version; those are ignored.
pub type MilestoneState = BTreeMap<String, MilestoneValue>;

/// Percent complete for a component under `template`
pub fn calculate_percent(state: &MilestoneState, template: &Template) -> u8 {
    calculate_from_milestones(state, &template.milestones)
}

/// Percent complete from a bare milestone list
///
/// Discrete milestones contribute their full weight once complete; partial
/// milestones contribute `weight * fraction / 100`. The sum is clamped to
/// `0..=100` and rounded half up.
pub fn calculate_from_milestones(state: &MilestoneState, milestones: &[MilestoneDef]) -> u8 {
    // Accumulate in hundredths of a percent so integer inputs stay exact
    let mut total = 0.0_f64;

    for milestone in milestones {
        let Some(value) = state.get(&milestone.name) else {
            continue;
        };
        let weight = milestone.weight.clamp(0, 100) as f64;

        total += if milestone.is_partial {
            weight * value.fraction()
        } else if value.is_complete() {
            weight * 100.0
        } else {
            0.0
        };
    }

    let clamped = total.clamp(0.0, 10_000.0);
    ((clamped + 50.0) / 100.0).floor() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::TemplateScope;
    use chrono::Utc;

    fn template(milestones: Vec<MilestoneDef>) -> Template {
        Template {
            scope: TemplateScope::System,
            component_type: "Test Type".to_string(),
            version: 1,
            milestones,
            created_by: "system".to_string(),
            created_at: Utc::now(),
        }
    }

    fn field_weld() -> Template {
        template(vec![
            MilestoneDef::discrete("Fit-Up", 10),
            MilestoneDef::discrete("Weld Made", 60),
            MilestoneDef::discrete("Punch", 10),
            MilestoneDef::discrete("Test", 15),
            MilestoneDef::discrete("Restore", 5),
        ])
    }

    fn state(pairs: &[(&str, MilestoneValue)]) -> MilestoneState {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_field_weld_fit_up_and_weld_made() {
        let s = state(&[
            ("Fit-Up", MilestoneValue::Done(true)),
            ("Weld Made", MilestoneValue::Done(true)),
            ("Punch", MilestoneValue::Done(false)),
            ("Test", MilestoneValue::Done(false)),
            ("Restore", MilestoneValue::Done(false)),
        ]);
        assert_eq!(calculate_percent(&s, &field_weld()), 70);
    }

    #[test]
    fn test_partial_plus_discrete() {
        let t = template(vec![
            MilestoneDef::partial("Install", 60),
            MilestoneDef::discrete("Punch", 20),
            MilestoneDef::discrete("Test", 20),
        ]);
        let s = state(&[
            ("Install", MilestoneValue::Fraction(40.0)),
            ("Punch", MilestoneValue::Done(true)),
            ("Test", MilestoneValue::Done(true)),
        ]);
        assert_eq!(calculate_percent(&s, &t), 64);
    }

    #[test]
    fn test_round_half_up() {
        // 15 * 50% = 7.5 -> 8
        let t = template(vec![
            MilestoneDef::partial("Test", 15),
            MilestoneDef::discrete("Restore", 85),
        ]);
        let s = state(&[("Test", MilestoneValue::Fraction(50.0))]);
        assert_eq!(calculate_percent(&s, &t), 8);

        // 5 * 10% = 0.5 -> 1
        let t = template(vec![
            MilestoneDef::partial("Restore", 5),
            MilestoneDef::discrete("Test", 95),
        ]);
        let s = state(&[("Restore", MilestoneValue::Fraction(10.0))]);
        assert_eq!(calculate_percent(&s, &t), 1);
    }

    #[test]
    fn test_empty_state_is_zero() {
        assert_eq!(calculate_percent(&MilestoneState::new(), &field_weld()), 0);
    }

    #[test]
    fn test_all_complete_is_hundred() {
        let s: MilestoneState = field_weld()
            .milestones
            .iter()
            .map(|m| (m.name.clone(), MilestoneValue::Done(true)))
            .collect();
        assert_eq!(calculate_percent(&s, &field_weld()), 100);
    }

    #[test]
    fn test_stale_keys_ignored() {
        let s = state(&[
            ("Fit-Up", MilestoneValue::Done(true)),
            ("Receive", MilestoneValue::Done(true)),
            ("Paint", MilestoneValue::Fraction(75.0)),
        ]);
        assert_eq!(calculate_percent(&s, &field_weld()), 10);
    }

    #[test]
    fn test_partial_fraction_clamped() {
        let t = template(vec![MilestoneDef::partial("Erect", 100)]);
        let erect = |v: f64| state(&[("Erect", MilestoneValue::Fraction(v))]);
        assert_eq!(calculate_percent(&erect(250.0), &t), 100);
        assert_eq!(calculate_percent(&erect(-10.0), &t), 0);
        assert_eq!(calculate_percent(&erect(f64::NAN), &t), 0);
    }

    #[test]
    fn test_discrete_milestone_with_numeric_value() {
        let t = field_weld();
        let weld = |v: f64| state(&[("Weld Made", MilestoneValue::Fraction(v))]);
        assert_eq!(calculate_percent(&weld(100.0), &t), 60);
        assert_eq!(calculate_percent(&weld(99.0), &t), 0);
    }

    #[test]
    fn test_partial_milestone_with_bool_value() {
        let t = template(vec![
            MilestoneDef::partial("Install", 60),
            MilestoneDef::discrete("Test", 40),
        ]);
        let s = state(&[("Install", MilestoneValue::Done(true))]);
        assert_eq!(calculate_percent(&s, &t), 60);
    }

    #[test]
    fn test_state_json_is_untagged() {
        let s: MilestoneState = serde_json::from_str(r#"{"Fit-Up": true, "Install": 40}"#).unwrap();
        assert_eq!(s["Fit-Up"], MilestoneValue::Done(true));
        assert_eq!(s["Install"], MilestoneValue::Fraction(40.0));
    }
}
