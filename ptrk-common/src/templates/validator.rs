//! Weight validation
//!
//! Every active template must satisfy:
//! - each weight within `0..=100`
//! - weights sum to exactly 100
//! - at least one weight is positive
//!
//! Individual zero weights are accepted as long as the template as a whole
//! satisfies the rules above.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::{MilestoneDef, WeightEntry};

/// Required total of all weights in a template
pub const REQUIRED_SUM: i64 = 100;

/// A single reason a set of weights was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum WeightProblem {
    Empty,
    OutOfRange { milestone: String, weight: i32 },
    SumMismatch { actual: i64 },
    NoPositiveWeight,
    DuplicateMilestone { milestone: String },
    UnknownMilestone { milestone: String },
    MissingMilestone { milestone: String },
}

impl fmt::Display for WeightProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightProblem::Empty => write!(f, "template has no milestones"),
            WeightProblem::OutOfRange { milestone, weight } => {
                write!(f, "{}={} outside 0..=100", milestone, weight)
            }
            WeightProblem::SumMismatch { actual } => {
                write!(f, "sum={}, expected {}", actual, REQUIRED_SUM)
            }
            WeightProblem::NoPositiveWeight => write!(f, "at least one weight must be positive"),
            WeightProblem::DuplicateMilestone { milestone } => {
                write!(f, "duplicate milestone {}", milestone)
            }
            WeightProblem::UnknownMilestone { milestone } => {
                write!(f, "unknown milestone {}", milestone)
            }
            WeightProblem::MissingMilestone { milestone } => {
                write!(f, "missing milestone {}", milestone)
            }
        }
    }
}

/// Rejection returned by the validator
///
/// Carries the computed sum and every problem found, never just a flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightViolation {
    pub actual_sum: i64,
    pub problems: Vec<WeightProblem>,
}

impl WeightViolation {
    /// Milestones named by any problem
    pub fn offending_milestones(&self) -> Vec<&str> {
        self.problems
            .iter()
            .filter_map(|p| match p {
                WeightProblem::OutOfRange { milestone, .. }
                | WeightProblem::DuplicateMilestone { milestone }
                | WeightProblem::UnknownMilestone { milestone }
                | WeightProblem::MissingMilestone { milestone } => Some(milestone.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for WeightViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.problems.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for WeightViolation {}

/// Validate a set of weights
pub fn validate(weights: &[WeightEntry]) -> Result<(), WeightViolation> {
    let actual_sum: i64 = weights.iter().map(|w| w.weight as i64).sum();
    let mut problems = Vec::new();

    if weights.is_empty() {
        problems.push(WeightProblem::Empty);
        return Err(WeightViolation {
            actual_sum,
            problems,
        });
    }

    let mut seen = HashSet::new();
    for entry in weights {
        if !seen.insert(entry.milestone.as_str()) {
            problems.push(WeightProblem::DuplicateMilestone {
                milestone: entry.milestone.clone(),
            });
        }
        if !(0..=100).contains(&entry.weight) {
            problems.push(WeightProblem::OutOfRange {
                milestone: entry.milestone.clone(),
                weight: entry.weight,
            });
        }
    }

    if actual_sum != REQUIRED_SUM {
        problems.push(WeightProblem::SumMismatch { actual: actual_sum });
    }

    if !weights.iter().any(|w| w.weight > 0) {
        problems.push(WeightProblem::NoPositiveWeight);
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(WeightViolation {
        actual_sum,
        problems,
    })
    }
}

/// Apply operator-entered weights to an existing milestone list
///
/// The milestone set is fixed by the current template: every milestone must
/// be given a weight and no new names may appear. Order and partial flags
/// are taken from `current`.
pub fn apply_weights(
    current: &[MilestoneDef],
    new_weights: &[WeightEntry],
) -> Result<Vec<MilestoneDef>, WeightViolation> {
    let mut problems = Vec::new();

    for entry in new_weights {
        if !current.iter().any(|m| m.name == entry.milestone) {
            problems.push(WeightProblem::UnknownMilestone {
                milestone: entry.milestone.clone(),
            });
        }
    }
    for milestone in current {
        if !new_weights.iter().any(|w| w.milestone == milestone.name) {
            problems.push(WeightProblem::MissingMilestone {
                milestone: milestone.name.clone(),
            });
        }
    }

    if let Err(violation) = validate(new_weights) {
        problems.extend(violation.problems);
    }

    if !problems.is_empty() {
        let actual_sum = new_weights.iter().map(|w| w.weight as i64).sum();
        return Err(WeightViolation {
            actual_sum,
            problems,
        });
    }

    Ok(current
        .iter()
        .map(|m| {
            let weight = new_weights
                .iter()
                .find(|w| w.milestone == m.name)
                .map(|w| w.weight)
                .unwrap_or(m.weight);
            MilestoneDef {
                name: m.name.clone(),
                weight,
                is_partial: m.is_partial,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, i32)]) -> Vec<WeightEntry> {
        pairs.iter().map(|(n, w)| WeightEntry::new(n, *w)).collect()
    }

    #[test]
    fn test_field_weld_weights_accepted() {
        let weights = entries(&[
            ("Fit-Up", 10),
            ("Weld Made", 60),
            ("Punch", 10),
            ("Test", 15),
            ("Restore", 5),
        ]);
        assert!(validate(&weights).is_ok());
    }

    #[test]
    fn test_sum_95_reports_actual_sum() {
        let weights = entries(&[
            ("Receive", 10),
            ("Install", 55),
            ("Punch", 10),
            ("Test", 15),
            ("Restore", 5),
        ]);
        let violation = validate(&weights).unwrap_err();
        assert_eq!(violation.actual_sum, 95);
        assert_eq!(violation.problems, vec![WeightProblem::SumMismatch { actual: 95 }]);
        assert_eq!(violation.to_string(), "sum=95, expected 100");
    }

    #[test]
    fn test_out_of_range_names_field() {
        let weights = entries(&[("Erect", 120), ("Connect", -20)]);
        let violation = validate(&weights).unwrap_err();
        // Sum is 100 but both fields are out of range
        assert_eq!(violation.actual_sum, 100);
        assert_eq!(violation.offending_milestones(), vec!["Erect", "Connect"]);
        assert!(!violation
            .problems
            .iter()
            .any(|p| matches!(p, WeightProblem::SumMismatch { .. })));
    }

    #[test]
    fn test_all_zero_rejected() {
        let weights = entries(&[("Receive", 0), ("Install", 0)]);
        let violation = validate(&weights).unwrap_err();
        assert!(violation.problems.contains(&WeightProblem::NoPositiveWeight));
        assert!(violation.problems.contains(&WeightProblem::SumMismatch { actual: 0 }));
    }

    #[test]
    fn test_empty_rejected() {
        let violation = validate(&[]).unwrap_err();
        assert_eq!(violation.problems, vec![WeightProblem::Empty]);
    }

    #[test]
    fn test_individual_zero_weight_allowed() {
        let weights = entries(&[("Receive", 0), ("Install", 100)]);
        assert!(validate(&weights).is_ok());
    }

    #[test]
    fn test_duplicate_milestone_rejected() {
        let weights = entries(&[("Install", 50), ("Install", 50)]);
        let violation = validate(&weights).unwrap_err();
        assert_eq!(
            violation.problems,
            vec![WeightProblem::DuplicateMilestone {
                milestone: "Install".into()
            }]
        );
    }

    #[test]
    fn test_apply_weights_keeps_order_and_partial_flags() {
        let current = vec![
            MilestoneDef::partial("Fabricate", 50),
            MilestoneDef::discrete("Test", 50),
        ];
        let applied =
            apply_weights(&current, &entries(&[("Test", 30), ("Fabricate", 70)])).unwrap();
        assert_eq!(
            applied,
            vec![
                MilestoneDef::partial("Fabricate", 70),
                MilestoneDef::discrete("Test", 30)
            ]
        );
    }

    #[test]
    fn test_apply_weights_rejects_unknown_and_missing() {
        let current = vec![
            MilestoneDef::discrete("Receive", 40),
            MilestoneDef::discrete("Install", 60),
        ];
        let violation =
            apply_weights(&current, &entries(&[("Receive", 40), ("Paint", 60)])).unwrap_err();
        let unknown = WeightProblem::UnknownMilestone {
            milestone: "Paint".into(),
        };
        let missing = WeightProblem::MissingMilestone {
            milestone: "Install".into(),
        };
        assert!(violation.problems.contains(&unknown));
        assert!(violation.problems.contains(&missing));
    }
}
