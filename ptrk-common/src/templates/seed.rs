//! Default system templates
//!
//! Seeded once per database; existing system templates are left untouched.

use sqlx::SqlitePool;
use tracing::info;

use super::{store, MilestoneDef, TemplateScope};
use crate::db::begin_write;
use crate::Result;

/// Actor recorded on seeded versions
pub const SEED_ACTOR: &str = "system";

/// Standard receive/install/punch/test/restore sequence used by most bulk items
fn standard_install() -> Vec<MilestoneDef> {
    vec![
        MilestoneDef::discrete("Receive", 10),
        MilestoneDef::discrete("Install", 60),
        MilestoneDef::discrete("Punch", 10),
        MilestoneDef::discrete("Test", 15),
        MilestoneDef::discrete("Restore", 5),
    ]
}

/// Built-in templates, one per supported component type
pub fn default_system_templates() -> Vec<(&'static str, Vec<MilestoneDef>)> {
    vec![
        (
            "Spool",
            vec![
                MilestoneDef::discrete("Receive", 5),
                MilestoneDef::discrete("Erect", 40),
                MilestoneDef::discrete("Connect", 40),
                MilestoneDef::discrete("Punch", 5),
                MilestoneDef::discrete("Test", 5),
                MilestoneDef::discrete("Restore", 5),
            ],
        ),
        (
            "Field Weld",
            vec![
                MilestoneDef::discrete("Fit-Up", 10),
                MilestoneDef::discrete("Weld Made", 60),
                MilestoneDef::discrete("Punch", 10),
                MilestoneDef::discrete("Test", 15),
                MilestoneDef::discrete("Restore", 5),
            ],
        ),
        ("Valve", standard_install()),
        ("Fitting", standard_install()),
        ("Flange", standard_install()),
        ("Instrument", standard_install()),
        ("Support", standard_install()),
        ("Pipe", standard_install()),
        (
            "Threaded Pipe",
            vec![
                MilestoneDef::partial("Fabricate", 16),
                MilestoneDef::partial("Install", 16),
                MilestoneDef::partial("Erect", 16),
                MilestoneDef::partial("Connect", 16),
                MilestoneDef::partial("Support", 16),
                MilestoneDef::discrete("Punch", 5),
                MilestoneDef::discrete("Test", 10),
                MilestoneDef::discrete("Restore", 5),
            ],
        ),
        ("Tubing", standard_install()),
        ("Hose", standard_install()),
        ("Misc Component", standard_install()),
    ]
}

/// Insert any missing default system templates
///
/// Returns the number of templates created.
pub async fn seed_system_templates(pool: &SqlitePool) -> Result<usize> {
    let mut tx = begin_write(pool).await?;
    let mut created = 0;

    for (component_type, milestones) in default_system_templates() {
        if store::active_version(&mut tx, &TemplateScope::System, component_type)
            .await?
            .is_some()
        {
            continue;
        }
        store::insert_version(
            &mut tx,
            &TemplateScope::System,
            component_type,
            milestones,
            SEED_ACTOR,
        )
        .await?;
        created += 1;
    }

    tx.commit().await?;

    if created > 0 {
        info!("Seeded {} system milestone templates", created);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{validate, WeightEntry};

    #[test]
    fn test_every_default_template_is_valid() {
        for (component_type, milestones) in default_system_templates() {
            let weights: Vec<WeightEntry> = milestones
                .iter()
                .map(|m| WeightEntry::new(&m.name, m.weight))
                .collect();
            assert!(
                validate(&weights).is_ok(),
                "default template for {} is invalid",
                component_type
            );
        }
    }

    #[test]
    fn test_threaded_pipe_has_partial_milestones() {
        let (_, milestones) = default_system_templates()
            .into_iter()
            .find(|(t, _)| *t == "Threaded Pipe")
            .unwrap();
        assert_eq!(milestones.iter().filter(|m| m.is_partial).count(), 5);
    }
}
