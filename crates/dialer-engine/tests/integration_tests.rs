//! Integration tests for the dialer-engine
//!
//! These tests drive the engine through its command surface against the
//! in-memory store, ticking the queue processor by hand so every scenario is
//! deterministic.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{Timelike, Utc};
use rvoip_dialer_engine::prelude::*;

fn test_config() -> DialerConfig {
    let mut config = DialerConfig::default();
    config.general.max_calls_per_second = 1000.0;
    config.general.stop_grace_period_secs = 1;
    config.database.retry_base_delay_ms = 1;
    config.database.retry_max_delay_ms = 5;
    config
}

fn dial_settings(ratio: f64) -> CampaignSettings {
    CampaignSettings {
        min_ratio: 1.0,
        max_ratio: 3.0,
        initial_ratio: ratio,
        calling_hours: CallingHours::always(),
        retry_backoff_base_secs: 0,
        cooldown_secs: 0,
        ..CampaignSettings::default()
    }
}

fn seeded_store(agents: usize, records: usize) -> (Arc<InMemoryStore>, Vec<String>) {
    let store = Arc::new(InMemoryStore::new());
    let agent_ids: Vec<String> = (0..agents).map(|i| format!("agent-{}", i)).collect();
    for agent in &agent_ids {
        store.add_agent(agent);
    }
    store.add_records(
        "src",
        (0..records).map(|i| ContactRecord::new(format!("rec-{}", i), format!("+1555{:07}", i), "Test")),
    );
    (store, agent_ids)
}

async fn start(
    store: &Arc<InMemoryStore>,
    agents: Vec<String>,
    settings: CampaignSettings,
) -> Result<(Arc<DialerEngine>, CampaignId)> {
    let engine = Arc::new(DialerEngine::with_store(test_config(), store.clone())?);
    let campaign = engine.create_campaign("src", agents, settings).await?;
    engine.start_campaign(&campaign.id).await?;
    Ok((engine, campaign.id))
}

/// Complete every in-flight call of the campaign with one disposition
async fn complete_all(engine: &DialerEngine, campaign_id: &CampaignId, disposition: Disposition) -> Result<usize> {
    let calls = engine.active_calls(campaign_id).await?;
    for call in &calls {
        let agent = call.agent_id.clone().unwrap_or_default();
        let duration = if disposition == Disposition::Answered { 120 } else { 0 };
        engine
            .complete_call(&call.call_id, &agent, duration, disposition, CallOutcome::new())
            .await?;
    }
    Ok(calls.len())
}

#[tokio::test]
async fn test_no_answer_campaign_exhausts_retries() -> Result<()> {
    let (store, agents) = seeded_store(10, 50);
    let (engine, id) = start(&store, agents, dial_settings(2.0)).await?;

    let first = engine.tick_campaign(&id).await?;
    assert_eq!(first, 20);

    let mut rounds = 0;
    loop {
        let active = engine.active_calls(&id).await?.len();
        assert!(active <= 20, "{} calls in flight for 10 agents at 2.0", active);
        complete_all(&engine, &id, Disposition::NoAnswer).await?;

        let status = engine.get_campaign_status(&id).await?;
        if status.campaign.status == CampaignStatus::Completed {
            break;
        }
        rounds += 1;
        assert!(rounds < 50, "campaign did not finish");
        tokio::time::sleep(Duration::from_millis(2)).await;
        engine.tick_campaign(&id).await?;
    }

    let status = engine.get_campaign_status(&id).await?;
    let stats = &status.statistics;
    assert_eq!(stats.records_loaded, 50);
    assert_eq!(stats.total_calls, 150);
    assert_eq!(stats.abandoned_calls, 150);
    assert_eq!(stats.answered_calls, 0);
    assert_eq!(stats.answer_rate(), 0.0);
    assert_eq!(stats.records_finalized, 50);
    assert_eq!(stats.retries_scheduled, 100);

    let dispositions = store.dispositions();
    assert_eq!(dispositions.len(), 50);
    assert!(dispositions.values().all(|r| *r == FinalResult::NoContact));
    assert_eq!(store.call_records().len(), 150);
    assert!(store.call_records().iter().all(|r| r.attempt >= 1 && r.attempt <= 3));
    assert_eq!(engine.events().count("campaign:completed"), 1);
    assert!(engine.running_campaign().is_none());
    Ok(())
}

#[tokio::test]
async fn test_no_duplicate_calls_per_record() -> Result<()> {
    let (store, agents) = seeded_store(3, 2);
    let (engine, id) = start(&store, agents, dial_settings(3.0)).await?;

    assert_eq!(engine.tick_campaign(&id).await?, 2);
    assert_eq!(engine.tick_campaign(&id).await?, 0);

    let calls = engine.active_calls(&id).await?;
    let records: HashSet<_> = calls.iter().map(|c| c.record.id.clone()).collect();
    assert_eq!(records.len(), calls.len());

    // in-flight records are not queued again
    assert_eq!(engine.refresh_records(&id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_complete_call_is_idempotent() -> Result<()> {
    let (store, agents) = seeded_store(2, 2);
    let (engine, id) = start(&store, agents, dial_settings(1.0)).await?;
    engine.tick_campaign(&id).await?;

    let calls = engine.active_calls(&id).await?;
    assert_eq!(calls.len(), 2);
    let call = &calls[0];
    let agent = call.agent_id.clone().unwrap_or_default();

    let err = engine
        .complete_call(&call.call_id, "someone-else", 10, Disposition::Answered, CallOutcome::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DialerError::Validation(_)));

    let first = engine
        .complete_call(&call.call_id, &agent, 90, Disposition::Answered, CallOutcome::new())
        .await?;
    let second = engine
        .complete_call(&call.call_id, &agent, 90, Disposition::Busy, CallOutcome::new())
        .await?;
    assert_eq!(first.disposition, Some(Disposition::Answered));
    assert_eq!(second.disposition, Some(Disposition::Answered));
    assert_eq!(second.status, CallStatus::Completed);

    let stats = engine.get_campaign_status(&id).await?.statistics;
    assert_eq!(stats.total_calls, 1);
    assert_eq!(stats.answered_calls, 1);
    assert_eq!(stats.total_talk_time_secs, 90);
    assert_eq!(store.final_disposition(&call.record.id), Some(FinalResult::Contacted));
    assert_eq!(store.disposition_attempts().len(), 1);

    let err = engine
        .complete_call(&CallId::new(), &agent, 0, Disposition::Answered, CallOutcome::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DialerError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn test_progress_reports_follow_call_states() -> Result<()> {
    let (store, agents) = seeded_store(1, 1);
    let (engine, id) = start(&store, agents, dial_settings(1.0)).await?;
    engine.tick_campaign(&id).await?;
    let call = engine.active_calls(&id).await?.remove(0);
    assert_eq!(call.status, CallStatus::Assigned);

    engine.report_call_ringing(&call.call_id).await?;
    engine.report_call_ringing(&call.call_id).await?;
    engine.report_call_answered(&call.call_id).await?;
    let err = engine.report_call_ringing(&call.call_id).await.unwrap_err();
    assert!(matches!(err, DialerError::Conflict(_)));

    let live = engine.active_calls(&id).await?.remove(0);
    assert_eq!(live.status, CallStatus::Talking);
    assert!(live.answered_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_callback_requeues_record() -> Result<()> {
    let (store, agents) = seeded_store(1, 2);
    let (engine, id) = start(&store, agents, dial_settings(1.0)).await?;
    engine.tick_campaign(&id).await?;
    let call = engine.active_calls(&id).await?.remove(0);

    let callback_at = Utc::now() + chrono::Duration::hours(1);
    engine
        .complete_call(
            &call.call_id,
            call.agent_id.as_deref().unwrap_or_default(),
            45,
            Disposition::Answered,
            CallOutcome::new().with_callback(callback_at).with_notes("call back after lunch"),
        )
        .await?;

    let status = engine.get_campaign_status(&id).await?;
    assert_eq!(status.statistics.callbacks_scheduled, 1);
    assert_eq!(status.queued_records, 2);
    assert_eq!(status.eligible_records, 1);
    assert!(store.final_disposition(&call.record.id).is_none());
    assert_eq!(store.callbacks(), vec![(call.record.id.clone(), callback_at)]);
    assert_eq!(engine.events().count("call:callback_scheduled"), 1);
    Ok(())
}

#[tokio::test]
async fn test_answering_machine_finalizes_without_retry() -> Result<()> {
    let (store, agents) = seeded_store(1, 1);
    let (engine, id) = start(&store, agents, dial_settings(1.0)).await?;
    engine.tick_campaign(&id).await?;
    let call = engine.active_calls(&id).await?.remove(0);

    engine
        .complete_call(
            &call.call_id,
            call.agent_id.as_deref().unwrap_or_default(),
            0,
            Disposition::AnsweringMachine,
            CallOutcome::new().with_amd_verified(true),
        )
        .await?;

    assert_eq!(store.final_disposition(&call.record.id), Some(FinalResult::AnsweringMachine));
    let status = engine.get_campaign_status(&id).await?;
    assert_eq!(status.statistics.amd_calls, 1);
    assert_eq!(status.statistics.retries_scheduled, 0);
    assert_eq!(status.campaign.status, CampaignStatus::Completed);

    let metrics = engine.get_campaign_metrics(&id).await?;
    assert_eq!(metrics.amd_accuracy, Some(1.0));
    Ok(())
}

#[tokio::test]
async fn test_answering_machine_retried_when_configured() -> Result<()> {
    let (store, agents) = seeded_store(1, 1);
    let settings = CampaignSettings {
        retry_on_amd: true,
        max_retry_attempts: 2,
        ..dial_settings(1.0)
    };
    let (engine, id) = start(&store, agents, settings).await?;

    assert_eq!(engine.tick_campaign(&id).await?, 1);
    complete_all(&engine, &id, Disposition::AnsweringMachine).await?;

    let record_id = RecordId::from("rec-0");
    assert_eq!(store.final_disposition(&record_id), None);
    let status = engine.get_campaign_status(&id).await?;
    assert_eq!(status.statistics.retries_scheduled, 1);
    assert_eq!(status.queued_records, 1);
    assert_eq!(status.campaign.status, CampaignStatus::Active);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(engine.tick_campaign(&id).await?, 1);
    let retry = engine.active_calls(&id).await?.remove(0);
    assert_eq!(retry.record.retry_count, 1);
    complete_all(&engine, &id, Disposition::AnsweringMachine).await?;

    assert_eq!(store.final_disposition(&record_id), Some(FinalResult::AnsweringMachine));
    let status = engine.get_campaign_status(&id).await?;
    assert_eq!(status.statistics.amd_calls, 2);
    assert_eq!(status.statistics.retries_scheduled, 1);
    assert_eq!(status.statistics.abandoned_calls, 0);
    assert_eq!(status.campaign.status, CampaignStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_answering_machine_rejected_when_detection_disabled() -> Result<()> {
    let (store, agents) = seeded_store(1, 1);
    let settings = CampaignSettings {
        amd_enabled: false,
        ..dial_settings(1.0)
    };
    let (engine, id) = start(&store, agents, settings).await?;
    engine.tick_campaign(&id).await?;
    let call = engine.active_calls(&id).await?.remove(0);

    let assigned = engine
        .events()
        .recent(10)
        .into_iter()
        .find_map(|e| match e.kind {
            DialerEventKind::CallAssigned { amd_enabled, .. } => Some(amd_enabled),
            _ => None,
        });
    assert_eq!(assigned, Some(false));

    let agent = call.agent_id.clone().unwrap_or_default();
    let err = engine
        .complete_call(&call.call_id, &agent, 0, Disposition::AnsweringMachine, CallOutcome::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DialerError::Validation(_)));
    assert_eq!(engine.active_calls(&id).await?.len(), 1);

    let done = engine
        .complete_call(&call.call_id, &agent, 0, Disposition::NoAnswer, CallOutcome::new())
        .await?;
    assert_eq!(done.disposition, Some(Disposition::NoAnswer));
    Ok(())
}

#[tokio::test]
async fn test_refresh_queues_new_records_once() -> Result<()> {
    let (store, agents) = seeded_store(1, 2);
    let (engine, id) = start(&store, agents, dial_settings(1.0)).await?;
    assert_eq!(engine.tick_campaign(&id).await?, 1);

    store.add_record("src", ContactRecord::new("rec-new", "+15559990000", "Late Lead"));
    assert_eq!(engine.refresh_records(&id).await?, 1);
    assert_eq!(engine.refresh_records(&id).await?, 0);

    let status = engine.get_campaign_status(&id).await?;
    assert_eq!(status.queued_records, 2);
    assert_eq!(status.statistics.records_loaded, 3);

    let mut rounds = 0;
    while engine.get_campaign_status(&id).await?.campaign.status != CampaignStatus::Completed {
        complete_all(&engine, &id, Disposition::Answered).await?;
        engine.tick_campaign(&id).await?;
        rounds += 1;
        assert!(rounds < 10, "campaign did not finish");
    }

    let new_id = RecordId::from("rec-new");
    let attempts = store.call_records().iter().filter(|r| r.record_id == new_id).count();
    assert_eq!(attempts, 1);
    assert_eq!(store.final_disposition(&new_id), Some(FinalResult::Contacted));
    assert_eq!(engine.get_campaign_status(&id).await?.statistics.total_calls, 3);
    Ok(())
}

#[tokio::test]
async fn test_performance_metrics_span_campaigns() -> Result<()> {
    let (store, agents) = seeded_store(2, 2);
    let (engine, first) = start(&store, agents, dial_settings(1.0)).await?;
    assert_eq!(engine.tick_campaign(&first).await?, 2);

    let calls = engine.active_calls(&first).await?;
    let agent = |c: &Call| c.agent_id.clone().unwrap_or_default();
    engine
        .complete_call(&calls[0].call_id, &agent(&calls[0]), 120, Disposition::Answered, CallOutcome::new())
        .await?;
    engine
        .complete_call(
            &calls[1].call_id,
            &agent(&calls[1]),
            0,
            Disposition::AnsweringMachine,
            CallOutcome::new().with_amd_verified(false),
        )
        .await?;
    assert_eq!(
        engine.get_campaign_status(&first).await?.campaign.status,
        CampaignStatus::Completed
    );

    store.add_record("other", ContactRecord::new("other-0", "+15558880000", "Other"));
    let second = engine
        .create_campaign("other", vec!["agent-0".into()], dial_settings(1.0))
        .await?;
    engine.start_campaign(&second.id).await?;
    assert_eq!(engine.tick_campaign(&second.id).await?, 1);

    let metrics = engine.get_performance_metrics().await;
    assert!((metrics.connection_rate - 0.5).abs() < 1e-9);
    assert_eq!(metrics.abandonment_rate, 0.0);
    assert!((metrics.avg_call_duration_secs - 120.0).abs() < 1e-9);
    assert_eq!(metrics.amd_accuracy, Some(0.0));
    // only the running campaign's agent counts, and it holds a call
    assert_eq!(metrics.agent_utilization, 1.0);

    let first_only = engine.get_campaign_metrics(&first).await?;
    assert_eq!(first_only.agent_utilization, 0.0);
    assert!((first_only.connection_rate - 0.5).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_calling_window_excludes_records() -> Result<()> {
    let (store, agents) = seeded_store(2, 5);
    let hour = Utc::now().hour();
    let settings = CampaignSettings {
        calling_hours: CallingHours {
            weekday: HourWindow::hours(hour + 2, hour + 3),
            weekend: None,
        },
        ..dial_settings(1.0)
    };
    let (engine, id) = start(&store, agents, settings).await?;

    assert_eq!(engine.tick_campaign(&id).await?, 0);
    let status = engine.get_campaign_status(&id).await?;
    assert_eq!(status.statistics.records_loaded, 0);
    assert!(store.call_records().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_dnc_numbers_are_never_dialed() -> Result<()> {
    let (store, agents) = seeded_store(5, 4);
    store.add_dnc("+1 555 000 0001");
    store.add_campaign_dnc("src", "+15550000002");
    let (engine, id) = start(&store, agents, dial_settings(1.0)).await?;

    assert_eq!(engine.tick_campaign(&id).await?, 2);
    let dialed: HashSet<_> = engine
        .active_calls(&id)
        .await?
        .into_iter()
        .map(|c| c.record.phone_number)
        .collect();
    assert!(!dialed.contains("+15550000001"));
    assert!(!dialed.contains("+15550000002"));
    Ok(())
}

#[tokio::test]
async fn test_pause_then_stop_drains_calls() -> Result<()> {
    let (store, agents) = seeded_store(2, 10);
    let (engine, id) = start(&store, agents, dial_settings(1.0)).await?;
    assert_eq!(engine.tick_campaign(&id).await?, 2);

    engine.pause_campaign(&id).await?;
    assert_eq!(engine.tick_campaign(&id).await?, 0);
    let err = engine.assign_call_to_agent(&id, 5, Default::default()).await.unwrap_err();
    assert!(matches!(err, DialerError::Conflict(_)));

    let finisher = {
        let engine = engine.clone();
        let id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            complete_all(&engine, &id, Disposition::NoAnswer).await
        })
    };

    let stopped = engine.stop_campaign(&id).await?;
    assert_eq!(finisher.await??, 2);
    assert_eq!(stopped.status, CampaignStatus::Stopped);
    assert_eq!(stopped.statistics.total_calls, 2);
    assert_eq!(stopped.statistics.failed_calls, 0);

    let status = engine.get_campaign_status(&id).await?;
    assert_eq!(status.queued_records, 0);
    assert_eq!(status.active_calls, 0);
    assert!(engine.running_campaign().is_none());
    assert!(store.campaign_statistics(&id).is_some());
    assert!(engine.start_campaign(&id).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_stop_force_fails_stuck_calls() -> Result<()> {
    let (store, agents) = seeded_store(1, 3);
    let (engine, id) = start(&store, agents, dial_settings(1.0)).await?;
    engine.tick_campaign(&id).await?;

    let stopped = engine.stop_campaign(&id).await?;
    assert_eq!(stopped.statistics.failed_calls, 1);
    assert_eq!(stopped.statistics.total_calls, 1);

    let records = store.call_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].disposition, Disposition::Failed);

    let stopped_event = engine
        .events()
        .recent(10)
        .into_iter()
        .find_map(|e| match e.kind {
            DialerEventKind::CampaignStopped { forced_calls, .. } => Some(forced_calls),
            _ => None,
        });
    assert_eq!(stopped_event, Some(1));
    Ok(())
}

#[tokio::test]
async fn test_transient_store_failures_do_not_stall() -> Result<()> {
    let (store, agents) = seeded_store(2, 4);
    // absorbed by the gateway's retries
    store.fail_next_reads(2);
    let (engine, id) = start(&store, agents, dial_settings(1.0)).await?;
    assert_eq!(engine.get_campaign_status(&id).await?.statistics.records_loaded, 4);

    store.fail_next_reads(100);
    let err = engine.tick_campaign(&id).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Transient);
    assert_eq!(engine.process_tick().await, 0);

    store.fail_next_reads(0);
    assert_eq!(engine.tick_campaign(&id).await?, 2);

    store.fail_next_writes(100);
    complete_all(&engine, &id, Disposition::Answered).await?;
    let stats = engine.get_campaign_status(&id).await?.statistics;
    assert_eq!(stats.answered_calls, 2);
    assert!(store.dispositions().is_empty());

    store.fail_next_writes(0);
    assert_eq!(engine.tick_campaign(&id).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_one_running_campaign_per_engine() -> Result<()> {
    let (store, agents) = seeded_store(2, 2);
    let (engine, id) = start(&store, agents.clone(), dial_settings(1.0)).await?;

    let other = engine.create_campaign("src", agents, dial_settings(1.0)).await?;
    let err = engine.start_campaign(&other.id).await.unwrap_err();
    assert!(matches!(err, DialerError::Conflict(_)));
    assert_eq!(engine.running_campaign(), Some(id));
    Ok(())
}

#[tokio::test]
async fn test_assign_call_to_agent() -> Result<()> {
    let (store, agents) = seeded_store(1, 1);
    let (engine, id) = start(&store, agents, dial_settings(1.0)).await?;

    store.set_agent_available("agent-0", false);
    let err = engine.assign_call_to_agent(&id, 7, Default::default()).await.unwrap_err();
    assert!(matches!(err, DialerError::NoAgentsAvailable(_)));
    assert_eq!(engine.get_campaign_status(&id).await?.queued_records, 1);

    store.set_agent_available("agent-0", true);
    let assignment = engine.assign_call_to_agent(&id, 7, Default::default()).await?;
    assert_eq!(assignment.agent_id, "agent-0");
    assert_eq!(engine.events().count("call:assigned"), 1);

    let err = engine.assign_call_to_agent(&id, 7, Default::default()).await.unwrap_err();
    assert!(matches!(err, DialerError::QueueEmpty(_)));
    Ok(())
}

#[tokio::test]
async fn test_ratio_rises_with_low_answer_rate() -> Result<()> {
    let (store, agents) = seeded_store(10, 40);
    let (engine, id) = start(&store, agents, dial_settings(1.5)).await?;
    assert_eq!(engine.tick_campaign(&id).await?, 15);

    let calls = engine.active_calls(&id).await?;
    for (i, call) in calls.iter().enumerate() {
        let disposition = if i < 6 { Disposition::Answered } else { Disposition::Failed };
        let duration = if i < 6 { 120 } else { 0 };
        engine
            .complete_call(
                &call.call_id,
                call.agent_id.as_deref().unwrap_or_default(),
                duration,
                disposition,
                CallOutcome::new(),
            )
            .await?;
    }

    let adjustments = engine.optimize_ratio().await;
    assert_eq!(adjustments.len(), 1);
    let (campaign, adjustment) = &adjustments[0];
    assert_eq!(campaign, &id);
    assert!(adjustment.current > adjustment.previous);
    assert!(adjustment.current <= 3.0);
    assert_eq!(engine.get_campaign_status(&id).await?.current_ratio, adjustment.current);
    assert_eq!(engine.events().count("ratio:optimized"), 1);
    Ok(())
}

#[tokio::test]
async fn test_cleanup_sweep_fails_overdue_calls() -> Result<()> {
    let (store, agents) = seeded_store(1, 1);
    let settings = CampaignSettings {
        max_call_duration_secs: 1,
        ..dial_settings(1.0)
    };
    let (engine, id) = start(&store, agents, settings).await?;
    engine.tick_campaign(&id).await?;

    assert_eq!(engine.cleanup_sweep().await.timed_out_calls, 0);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let report = engine.cleanup_sweep().await;
    assert_eq!(report.timed_out_calls, 1);

    let status = engine.get_campaign_status(&id).await?;
    assert_eq!(status.active_calls, 0);
    assert_eq!(status.statistics.failed_calls, 1);
    Ok(())
}

#[tokio::test]
async fn test_create_campaign_validation() -> Result<()> {
    let (store, _) = seeded_store(1, 0);
    let engine = DialerEngine::with_store(test_config(), store)?;

    let err = engine
        .create_campaign("", vec!["a".into()], dial_settings(1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, DialerError::Validation(_)));

    let err = engine
        .create_campaign("src", vec![" ".into()], dial_settings(1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, DialerError::Validation(_)));

    let bad = CampaignSettings {
        initial_ratio: 5.0,
        ..dial_settings(1.0)
    };
    assert!(engine.create_campaign("src", vec!["a".into()], bad).await.is_err());

    let unbounded = CampaignSettings {
        max_ratio: f64::NAN,
        ..dial_settings(1.0)
    };
    let err = engine
        .create_campaign("src", vec!["a".into()], unbounded)
        .await
        .unwrap_err();
    assert!(matches!(err, DialerError::Validation(_)));
    assert!(engine.list_campaigns().await.is_empty());

    let campaign = engine
        .create_campaign("src", vec!["a".into(), "a".into(), "b".into()], dial_settings(1.0))
        .await?;
    assert_eq!(campaign.agent_ids, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(campaign.status, CampaignStatus::Configuring);
    Ok(())
}
