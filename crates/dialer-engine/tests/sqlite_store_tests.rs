//! SQLite store tests
//!
//! Run the engine against the sqlx-backed store and check what lands in the
//! database.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use rvoip_dialer_engine::config::DatabaseConfig;
use rvoip_dialer_engine::prelude::*;
use serial_test::serial;

async fn seeded_store(records: usize) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::new_in_memory().await?;
    store.upsert_agent("alice", true).await?;
    store.upsert_agent("bob", true).await?;
    for i in 0..records {
        let record = ContactRecord::new(format!("rec-{}", i), format!("+1555000{:04}", i), "Test");
        store.insert_contact_record("crm-7", &record).await?;
    }
    Ok(Arc::new(store))
}

fn settings() -> CampaignSettings {
    CampaignSettings {
        initial_ratio: 1.0,
        calling_hours: CallingHours::always(),
        retry_backoff_base_secs: 0,
        cooldown_secs: 0,
        ..CampaignSettings::default()
    }
}

#[tokio::test]
#[serial]
async fn test_store_round_trips_collaborator_data() -> Result<()> {
    let store = seeded_store(3).await?;
    store.add_dnc_number("+1 (555) 000-0001", None).await?;
    store.add_dnc_number("+15550000002", Some("other-campaign")).await?;

    let records = store.list_eligible_records("crm-7").await?;
    assert_eq!(records.len(), 3);
    assert!(store.list_eligible_records("unknown").await?.is_empty());

    let dnc = store.list_dnc("crm-7").await?;
    assert!(dnc.contains("+15550000001"));
    assert!(!dnc.contains("+15550000002"));

    assert!(store.set_agent_available("bob", false).await?);
    assert!(!store.set_agent_available("nobody", false).await?);
    let agents = store.list_available_agents().await?;
    let available: Vec<_> = agents.iter().filter(|a| a.available).map(|a| a.agent_id.as_str()).collect();
    assert_eq!(available, vec!["alice"]);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_first_terminal_disposition_wins() -> Result<()> {
    let store = seeded_store(1).await?;
    let id = RecordId::from("rec-0");

    assert!(store.mark_final_disposition(&id, FinalResult::Contacted, Utc::now()).await?);
    assert!(!store.mark_final_disposition(&id, FinalResult::NoContact, Utc::now()).await?);
    assert_eq!(store.final_disposition(&id).await?, Some(FinalResult::Contacted));
    assert!(store.list_eligible_records("crm-7").await?.is_empty());
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_engine_writes_back_outcomes() -> Result<()> {
    let store = seeded_store(2).await?;
    let engine = DialerEngineBuilder::new()
        .with_config(DialerConfig::default())
        .with_store(store.clone())
        .build()?;
    let campaign = engine
        .create_campaign("crm-7", vec!["alice".into(), "bob".into()], settings())
        .await?;
    engine.start_campaign(&campaign.id).await?;
    assert_eq!(engine.tick_campaign(&campaign.id).await?, 2);

    let calls = engine.active_calls(&campaign.id).await?;
    let (answered, missed) = (&calls[0], &calls[1]);
    engine
        .complete_call(
            &answered.call_id,
            answered.agent_id.as_deref().unwrap_or_default(),
            200,
            Disposition::Answered,
            CallOutcome::new().with_notes("interested"),
        )
        .await?;
    engine
        .complete_call(
            &missed.call_id,
            missed.agent_id.as_deref().unwrap_or_default(),
            0,
            Disposition::Busy,
            CallOutcome::new(),
        )
        .await?;

    assert_eq!(
        store.final_disposition(&answered.record.id).await?,
        Some(FinalResult::Contacted)
    );
    assert_eq!(store.final_disposition(&missed.record.id).await?, None);
    assert_eq!(store.call_record_count(&campaign.id).await?, 2);

    let counts = store.disposition_counts(&campaign.id).await?;
    assert_eq!(counts.get("answered"), Some(&1));
    assert_eq!(counts.get("busy"), Some(&1));

    // the busy record is retried and stays eligible in storage
    let pending = store.list_eligible_records("crm-7").await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].retry_count, 1);
    assert!(pending[0].last_attempt_at.is_some());

    let stopped = engine.stop_campaign(&campaign.id).await?;
    let persisted = store.load_campaign_statistics(&campaign.id).await?;
    assert_eq!(persisted, Some(stopped.statistics));
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_file_database_survives_reopen() -> Result<()> {
    let path = std::env::temp_dir().join(format!("dialer-store-{}.db", uuid::Uuid::new_v4()));
    let config = DatabaseConfig {
        database_url: format!("sqlite://{}", path.display()),
        ..DatabaseConfig::default()
    };

    {
        let store = SqliteStore::new(&config).await?;
        store
            .insert_contact_record("crm-7", &ContactRecord::new("rec-1", "+15551230000", "Persisted"))
            .await?;
        store.pool().close().await;
    }

    let reopened = SqliteStore::new(&config).await?;
    let records = reopened.list_eligible_records("crm-7").await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "Persisted");
    reopened.pool().close().await;

    let _ = std::fs::remove_file(&path);
    Ok(())
}
