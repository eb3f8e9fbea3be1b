//! Dialer Simulator
//!
//! Runs one campaign against an in-memory store and a simulated telephony
//! layer that answers a configurable share of calls, then prints the
//! campaign statistics and performance metrics.
//!
//! ```text
//! cargo run --bin dialer-sim -- --agents 10 --records 200 --answer-rate 0.3
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use rvoip_dialer_engine::logging::{parse_log_level, setup_logging, LoggingConfig};
use rvoip_dialer_engine::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Predictive dialer simulation", long_about = None)]
struct Args {
    /// Number of agents staffing the campaign
    #[arg(short, long, default_value = "5")]
    agents: usize,

    /// Number of contact records to dial
    #[arg(short, long, default_value = "100")]
    records: usize,

    /// Initial dial ratio
    #[arg(long, default_value = "1.5")]
    ratio: f64,

    /// Share of calls a live person answers
    #[arg(long, default_value = "0.35")]
    answer_rate: f64,

    /// Share of calls reaching an answering machine
    #[arg(long, default_value = "0.1")]
    amd_rate: f64,

    /// Stop the campaign after this many seconds
    #[arg(long, default_value = "30")]
    run_secs: u64,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&args.log_level)?, "dialer-sim");
    if args.json_logs {
        logging = logging.with_json();
    }
    setup_logging(logging)?;

    let config = match &args.config {
        Some(path) => DialerConfig::from_file(path)?,
        None => {
            let mut config = DialerConfig::default();
            config.general.queue_tick_interval_ms = 200;
            config.general.ratio_tick_interval_ms = 1000;
            config.general.cleanup_interval_secs = 5;
            config.general.stop_grace_period_secs = 5;
            config
        }
    };

    let store = Arc::new(InMemoryStore::new());
    let agent_ids: Vec<String> = (1..=args.agents).map(|i| format!("agent-{:02}", i)).collect();
    for agent in &agent_ids {
        store.add_agent(agent);
    }
    store.add_records(
        "sim",
        (0..args.records).map(|i| {
            ContactRecord::new(format!("rec-{:05}", i), format!("+1555{:07}", i), format!("Customer {}", i))
        }),
    );

    let mut server = DialerServerBuilder::new()
        .with_config(config)
        .with_store(store.clone())
        .build()
        .await?;
    let engine = server.engine().clone();

    let settings = CampaignSettings {
        initial_ratio: args.ratio,
        max_ratio: args.ratio.max(3.0),
        min_ratio: args.ratio.min(1.0),
        calling_hours: CallingHours::always(),
        retry_backoff_base_secs: 1,
        retry_backoff_max_secs: 5,
        cooldown_secs: 0,
        ..CampaignSettings::default()
    };
    let campaign = engine.create_campaign("sim", agent_ids, settings).await?;

    let telephony = tokio::spawn(simulate_telephony(engine.clone(), args.answer_rate, args.amd_rate));

    engine.start_campaign(&campaign.id).await?;
    server.start()?;

    let mut events = engine.subscribe();
    let deadline = tokio::time::sleep(Duration::from_secs(args.run_secs));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("⏰ Simulation time is up, stopping campaign");
                if let Err(e) = engine.stop_campaign(&campaign.id).await {
                    warn!("Stop failed: {}", e);
                }
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if matches!(event.kind, DialerEventKind::CampaignCompleted { .. }) {
                        info!("🏁 Every record reached a final disposition");
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => debug!("Event monitor lagged by {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    }

    server.stop().await?;
    telephony.abort();

    let status = engine.get_campaign_status(&campaign.id).await?;
    let metrics = engine.get_campaign_metrics(&campaign.id).await?;
    println!("\n📊 Campaign {} ({})", status.campaign.id, status.campaign.status);
    println!("{}", serde_json::to_string_pretty(&status.statistics)?);
    println!("\n📈 Performance");
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    println!("\n📋 Final dispositions: {}", store.dispositions().len());
    Ok(())
}

/// Answer assigned calls with random outcomes after a short delay
async fn simulate_telephony(engine: Arc<DialerEngine>, answer_rate: f64, amd_rate: f64) {
    let mut events = engine.subscribe();
    let mut rng = SmallRng::from_entropy();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(n)) => {
                warn!("Telephony simulator missed {} events", n);
                continue;
            }
            Err(RecvError::Closed) => return,
        };
        let DialerEventKind::CallAssigned {
            call_id,
            agent_id,
            amd_enabled,
            ..
        } = event.kind
        else {
            continue;
        };

        let roll: f64 = rng.gen();
        let disposition = if roll < answer_rate {
            Disposition::Answered
        } else if amd_enabled && roll < answer_rate + amd_rate {
            Disposition::AnsweringMachine
        } else {
            match rng.gen_range(0..3) {
                0 => Disposition::Busy,
                1 => Disposition::NoAnswer,
                _ => Disposition::Failed,
            }
        };
        let ring_ms = rng.gen_range(100..600);
        let talk_secs = if disposition == Disposition::Answered {
            rng.gen_range(30..300)
        } else {
            0
        };

        let engine = engine.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ring_ms)).await;
            if let Err(e) = engine.report_call_ringing(&call_id).await {
                debug!("Ringing report for {} rejected: {}", call_id, e);
                return;
            }
            if disposition == Disposition::Answered {
                let _ = engine.report_call_answered(&call_id).await;
                tokio::time::sleep(Duration::from_millis(ring_ms)).await;
            }
            if let Err(e) = engine
                .complete_call(&call_id, &agent_id, talk_secs, disposition, CallOutcome::new())
                .await
            {
                debug!("Completion of {} rejected: {}", call_id, e);
            }
        });
    }
}
