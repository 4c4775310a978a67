//! Template updates: validation, audit records, permission and conflicts

mod common;

use common::*;
use ptrk_common::templates::WeightProblem;
use ptrk_common::{Error, TemplateState, UpdateTemplateRequest};
use uuid::Uuid;

fn field_weld_request(project_id: Uuid, apply_to_existing: bool) -> UpdateTemplateRequest {
    UpdateTemplateRequest {
        project_id,
        component_type: "Field Weld".to_string(),
        new_weights: field_weld_override(),
        apply_to_existing,
        expected_version: None,
    }
}

#[tokio::test]
async fn test_override_applied_to_existing_components() {
    let (_dir, engine) = engine().await;
    let project_id = Uuid::new_v4();

    let mut ids = Vec::new();
    for _ in 0..3 {
        let c = add_component(&engine, project_id, "Field Weld", done(&["Fit-Up"])).await;
        assert_eq!(c.percent_complete, 10);
        ids.push(c.id);
    }

    let result = engine
        .update_template(&project_manager(), field_weld_request(project_id, true))
        .await
        .unwrap();

    assert_eq!(result.affected_count, 3);
    assert_eq!(result.change.affected_component_count, 3);
    assert!(result.change.applied_to_existing);
    assert_eq!(result.change.actor, "pm-alice");

    for id in ids {
        assert_eq!(engine.get_component(id).await.unwrap().percent_complete, 20);
    }
}

#[tokio::test]
async fn test_update_without_apply_leaves_cached_values() {
    let (_dir, engine) = engine().await;
    let project_id = Uuid::new_v4();
    let c = add_component(&engine, project_id, "Field Weld", done(&["Fit-Up"])).await;

    let result = engine
        .update_template(&project_manager(), field_weld_request(project_id, false))
        .await
        .unwrap();

    assert_eq!(result.affected_count, 0);
    assert_eq!(result.change.affected_component_count, 0);
    assert!(!result.change.applied_to_existing);
    assert_eq!(engine.get_component(c.id).await.unwrap().percent_complete, 10);
}

#[tokio::test]
async fn test_sum_95_rejected_without_side_effects() {
    let (_dir, engine) = engine().await;
    let project_id = Uuid::new_v4();

    let err = engine
        .update_template(
            &project_manager(),
            UpdateTemplateRequest {
                project_id,
                component_type: "Field Weld".to_string(),
                new_weights: weights(&[
                    ("Fit-Up", 10),
                    ("Weld Made", 55),
                    ("Punch", 10),
                    ("Test", 15),
                    ("Restore", 5),
                ]),
                apply_to_existing: true,
                expected_version: None,
            },
        )
        .await
        .unwrap_err();

    match &err {
        Error::Validation(violation) => {
            assert_eq!(violation.actual_sum, 95);
            assert_eq!(violation.to_string(), "sum=95, expected 100");
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(!err.is_retryable());

    assert_eq!(audit_count(&engine).await, 0);
    assert_eq!(
        engine.template_state(project_id, "Field Weld").await.unwrap(),
        TemplateState::NoProjectOverride
    );
}

#[tokio::test]
async fn test_unknown_milestone_rejected() {
    let (_dir, engine) = engine().await;
    let project_id = Uuid::new_v4();

    let err = engine
        .update_template(
            &project_manager(),
            UpdateTemplateRequest {
                project_id,
                component_type: "Field Weld".to_string(),
                new_weights: weights(&[
                    ("Fit-Up", 10),
                    ("Weld Made", 60),
                    ("Punch", 10),
                    ("Test", 15),
                    ("Paint", 5),
                ]),
                apply_to_existing: false,
                expected_version: None,
            },
        )
        .await
        .unwrap_err();

    let Error::Validation(violation) = err else {
        panic!("expected validation error");
    };
    let unknown = WeightProblem::UnknownMilestone {
        milestone: "Paint".to_string(),
    };
    assert!(violation.problems.contains(&unknown));
    assert_eq!(audit_count(&engine).await, 0);
}

#[tokio::test]
async fn test_every_success_writes_one_audit_record() {
    let (_dir, engine) = engine().await;
    let project_id = Uuid::new_v4();
    let pm = project_manager();
    add_component(&engine, project_id, "Field Weld", done(&["Fit-Up", "Weld Made"])).await;

    let first = engine
        .update_template(&pm, field_weld_request(project_id, true))
        .await
        .unwrap();
    let mut second_request = field_weld_request(project_id, false);
    second_request.expected_version = Some(first.new_version);
    second_request.new_weights = weights(&[
        ("Fit-Up", 15),
        ("Weld Made", 55),
        ("Punch", 10),
        ("Test", 15),
        ("Restore", 5),
    ]);
    let second = engine.update_template(&pm, second_request).await.unwrap();

    let history = engine.change_history(project_id, "Field Weld").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], first.change);
    assert_eq!(history[1], second.change);

    assert_eq!(history[0].affected_component_count, 1);
    assert_eq!(history[0].old_weights[0].weight, 10);
    assert_eq!(history[0].new_weights[0].weight, 20);
    assert_eq!(history[1].affected_component_count, 0);
    assert_eq!(history[1].old_weights, history[0].new_weights);

    let latest = engine.latest_change(project_id, "Field Weld").await.unwrap().unwrap();
    assert_eq!(latest.id, second.change.id);
    assert_eq!(latest.new_version, 2);
}

#[tokio::test]
async fn test_audit_records_are_immutable() {
    let (_dir, engine) = engine().await;
    let project_id = Uuid::new_v4();
    engine
        .update_template(&project_manager(), field_weld_request(project_id, false))
        .await
        .unwrap();

    let update = sqlx::query("UPDATE template_changes SET actor = 'mallory'")
        .execute(engine.pool())
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM template_changes").execute(engine.pool()).await;
    assert!(delete.is_err());

    assert_eq!(audit_count(&engine).await, 1);
}

#[tokio::test]
async fn test_unauthorized_actor_rejected() {
    let (_dir, engine) = engine().await;
    let project_id = Uuid::new_v4();

    let err = engine
        .update_template(&foreman(), field_weld_request(project_id, true))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Permission(_)));
    assert!(!err.is_retryable());
    assert_eq!(audit_count(&engine).await, 0);
}

#[tokio::test]
async fn test_concurrent_edits_second_writer_conflicts() {
    let (_dir, engine) = engine().await;
    let project_id = Uuid::new_v4();
    let pm = project_manager();

    let spool = |receive: i32| UpdateTemplateRequest {
        project_id,
        component_type: "Spool".to_string(),
        new_weights: weights(&[
            ("Receive", receive),
            ("Erect", 40),
            ("Connect", 40),
            ("Punch", 15 - receive),
            ("Test", 0),
            ("Restore", 5),
        ]),
        apply_to_existing: true,
        expected_version: None,
    };

    // Both editors started from the system default. Whichever loses either
    // finds the key locked or the version already advanced.
    let (a, b) = tokio::join!(
        engine.update_template(&pm, spool(5)),
        engine.update_template(&pm, spool(10)),
    );

    let outcomes = [a, b];
    let ok = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1);
    let conflict = outcomes.into_iter().find_map(|r| r.err()).unwrap();
    assert!(matches!(conflict, Error::ConcurrencyConflict(_)), "got {:?}", conflict);
    assert!(conflict.is_retryable());

    assert_eq!(audit_count(&engine).await, 1);
    assert_eq!(
        engine.template_state(project_id, "Spool").await.unwrap(),
        TemplateState::ProjectActive { version: 1 }
    );
}

#[tokio::test]
async fn test_stale_version_token_conflicts() {
    let (_dir, engine) = engine().await;
    let project_id = Uuid::new_v4();
    let pm = project_manager();

    engine
        .update_template(&pm, field_weld_request(project_id, false))
        .await
        .unwrap();

    // Second editor still looking at the system default
    let err = engine
        .update_template(&pm, field_weld_request(project_id, false))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict(_)));

    // After refetching the version it succeeds
    let mut retry = field_weld_request(project_id, false);
    retry.expected_version = engine
        .template_state(project_id, "Field Weld")
        .await
        .unwrap()
        .active_version();
    assert_eq!(engine.update_template(&pm, retry).await.unwrap().new_version, 2);
}

#[tokio::test]
async fn test_preview_affected_count() {
    let (_dir, engine) = engine().await;
    let project_id = Uuid::new_v4();
    for _ in 0..4 {
        add_component(&engine, project_id, "Valve", done(&[])).await;
    }
    add_component(&engine, project_id, "Spool", done(&[])).await;

    let preview = engine.preview_affected_count(project_id, "Valve").await.unwrap();
    assert_eq!(preview.affected_count, 4);
    assert_eq!(preview.template_state, TemplateState::NoProjectOverride);

    let err = engine.preview_affected_count(project_id, "Widget").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
