mod common;

use common::{
    at, build_test_context, build_test_context_with, cpu_alert, custom_rule, standard_seed, TEAM,
};
use oxpager_common::condition::{Condition, ConditionField};
use oxpager_common::types::*;
use oxpager_server::seed::apply_seed;
use oxpager_storage::PagerStore;
use oxpager_server::pipeline::{self, PipelineError};
use oxpager_server::scheduler::{EscalationScheduler, HousekeepingScheduler};
use oxpager_escalation::sweep::EscalationSweep;

#[tokio::test]
async fn first_alert_is_allowed_grouped_and_assigned() {
    let ctx = build_test_context().unwrap();
    // Two earlier alerts this hour, neither within the duplicate window.
    ctx.state
        .store
        .read(|view| {
            view.insert_alert(&cpu_alert("old-1", at(9, 10)))?;
            view.insert_alert(&cpu_alert("old-2", at(9, 20)))
        })
        .unwrap();

    let alert = cpu_alert("a-1", at(10, 0));
    let outcome = pipeline::ingest(&ctx.state, &alert, at(10, 0)).await.unwrap();

    assert!(!outcome.decision.suppressed);
    assert_eq!(outcome.decision.reason, SuppressionReason::NoSuppression);
    assert_eq!(outcome.group.group_key, "cpu_high");
    assert_eq!(outcome.group.alert_count, 1);
    assert_eq!(outcome.group.first_alert_id, "a-1");

    let routing = outcome.routing.expect("allowed alert is routed");
    assert_eq!(routing.routing_id.as_deref(), Some("route-high"));
    assert_eq!(routing.responder.user_id, "alice");
    let assignment = routing.assignment.expect("no initial delay");
    assert_eq!(assignment.level, 0);
    assert_eq!(assignment.expected_response_minutes, 30);
    let state = routing.escalation.expect("routing policy starts a timer");
    assert_eq!(state.next_escalation_at, at(10, 30));

    let sent = ctx.dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].assignee, "alice");
    assert_eq!(sent[0].channels, vec!["push"]);

    let logs = ctx
        .state
        .store
        .read(|view| view.suppression_logs_for_alert("a-1"))
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert!(!logs[0].suppressed);
    assert_eq!(ctx.state.counters.audit_failures(), 0);
}

#[tokio::test]
async fn repeat_alert_is_suppressed_as_duplicate_but_still_grouped() {
    let ctx = build_test_context().unwrap();
    pipeline::ingest(&ctx.state, &cpu_alert("a-1", at(10, 0)), at(10, 0))
        .await
        .unwrap();

    let second = cpu_alert("a-2", at(10, 5));
    let outcome = pipeline::ingest(&ctx.state, &second, at(10, 5)).await.unwrap();

    assert!(outcome.decision.suppressed);
    assert_eq!(outcome.decision.reason, SuppressionReason::DuplicateAlert);
    assert_eq!(outcome.decision.suppress_until, Some(at(10, 35)));
    assert_eq!(outcome.decision.metadata.duplicate_of.as_deref(), Some("a-1"));
    assert!(outcome.routing.is_none());

    assert_eq!(outcome.group.alert_count, 2);
    let members = ctx
        .state
        .store
        .read(|view| view.group_members(&outcome.group.id))
        .unwrap();
    assert_eq!(members.len(), 2);
    let newest = members.iter().find(|m| m.alert_id == "a-2").unwrap();
    assert!(newest.suppressed);

    // Suppressed alerts are stored but never dispatched.
    assert_eq!(ctx.dispatcher.sent().len(), 1);
    let stored = ctx.state.store.read(|view| view.get_alert("a-2")).unwrap();
    assert_eq!(stored.unwrap().status, AlertStatus::Active);
}

#[tokio::test]
async fn hourly_cap_suppresses_the_alert_after_the_cap() {
    let ctx = build_test_context().unwrap();
    // Resolved alerts still count against the hourly cap but are not duplicates.
    ctx.state
        .store
        .read(|view| {
            for i in 0..5 {
                let alert = cpu_alert(&format!("old-{i}"), at(9, 10 + i));
                view.insert_alert(&alert)?;
                view.resolve_alert(&alert.id, at(9, 11 + i), Resolution::Manual)?;
            }
            Ok(())
        })
        .unwrap();

    let outcome = pipeline::ingest(&ctx.state, &cpu_alert("a-6", at(10, 0)), at(10, 0))
        .await
        .unwrap();
    assert!(outcome.decision.suppressed);
    assert_eq!(outcome.decision.reason, SuppressionReason::RateLimitExceeded);
    assert_eq!(outcome.decision.metadata.rule_alert_count, Some(5));
}

#[tokio::test]
async fn ingesting_the_same_alert_twice_is_rejected() {
    let ctx = build_test_context().unwrap();
    let alert = cpu_alert("a-1", at(10, 0));
    pipeline::ingest(&ctx.state, &alert, at(10, 0)).await.unwrap();
    let err = pipeline::ingest(&ctx.state, &alert, at(10, 1)).await.unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyIngested(id) if id == "a-1"));
}

#[tokio::test]
async fn routing_gap_keeps_the_decision() {
    let mut seed = standard_seed();
    seed.on_call_entries.clear();
    seed.escalation_configs[0].primary_contacts.clear();
    let ctx = build_test_context_with(seed).unwrap();

    let outcome = pipeline::ingest(&ctx.state, &cpu_alert("a-1", at(10, 0)), at(10, 0))
        .await
        .unwrap();
    assert!(!outcome.decision.suppressed);
    assert!(outcome.routing.is_none());
    assert!(outcome.routing_gap.unwrap().contains(TEAM));
    assert!(ctx.dispatcher.sent().is_empty());
    assert!(ctx
        .state
        .store
        .read(|view| view.get_alert("a-1"))
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn maintenance_window_suppresses_and_flags_group_when_suppress_all() {
    let mut seed = standard_seed();
    seed.maintenance_windows.push(MaintenanceWindow {
        id: "mw-1".into(),
        team_id: Some(TEAM.into()),
        name: "DB upgrade".into(),
        starts_at: at(9, 0),
        ends_at: at(11, 0),
        timezone: "UTC".into(),
        affected_systems: vec![],
        affected_severities: vec![],
        suppress_all: true,
        enabled: true,
        recurrence: None,
        priority: 0,
        created_at: at(0, 0),
    });
    let ctx = build_test_context_with(seed).unwrap();

    let outcome = pipeline::ingest(&ctx.state, &cpu_alert("a-1", at(10, 0)), at(10, 0))
        .await
        .unwrap();
    assert!(outcome.decision.suppressed);
    assert_eq!(outcome.decision.reason, SuppressionReason::MaintenanceWindow);
    assert_eq!(outcome.decision.suppress_until, Some(at(11, 0)));
    assert!(outcome.group.suppression_applied);
}

#[tokio::test]
async fn sweep_escalates_to_backup_then_stops_after_acknowledgment() {
    let ctx = build_test_context().unwrap();
    pipeline::ingest(&ctx.state, &cpu_alert("a-1", at(10, 0)), at(10, 0))
        .await
        .unwrap();

    let sweep = EscalationSweep::new(ctx.state.store.clone());
    let report = sweep.run_once(at(10, 30)).unwrap();
    assert_eq!(report.escalated, 1);
    assert_eq!(report.dispatches[0].assignee, "bob");
    assert_eq!(report.dispatches[0].channels, vec!["sms"]);

    let err = pipeline::acknowledge(&ctx.state, "a-1", "mallory", at(10, 40))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not a member"));
    let ack = pipeline::acknowledge(&ctx.state, "a-1", "alice", at(10, 40))
        .await
        .unwrap();
    assert!(ack.alert_updated);

    assert!(sweep.run_once(at(11, 30)).unwrap().is_empty());
}

#[tokio::test]
async fn schedulers_run_single_passes() {
    let ctx = build_test_context().unwrap();
    pipeline::ingest(&ctx.state, &cpu_alert("a-1", at(10, 0)), at(10, 0))
        .await
        .unwrap();

    // The schedulers run on the wall clock, so the 2024 timer is long due.
    EscalationScheduler::new(ctx.state.clone()).run_once().await;
    let sent = ctx.dispatcher.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].level, 1);

    HousekeepingScheduler::new(ctx.state.clone()).run_once().await;
    // The group from 2024 is past retention.
    let group = ctx
        .state
        .store
        .read(|view| view.group_for_alert("a-1"))
        .unwrap();
    assert!(group.is_none());
}

#[tokio::test]
async fn seed_with_malformed_rule_writes_nothing() {
    let mut seed = standard_seed();
    seed.suppression_rules.push(custom_rule(
        "rule-broken",
        Condition::InSet {
            field: ConditionField::Severity,
            values: vec!["urgent".into()],
        },
    ));
    let dir = tempfile::tempdir().unwrap();
    let store = PagerStore::open(&dir.path().join("pager.db")).unwrap();

    let err = apply_seed(&store, &seed, at(0, 0)).unwrap_err();
    assert!(err.to_string().contains("rule-broken"));
    assert!(store
        .read(|view| view.get_alert_rule("rule-cpu"))
        .unwrap()
        .is_none());
}
