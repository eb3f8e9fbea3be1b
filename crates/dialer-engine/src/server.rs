//! # Dialer Server
//!
//! Runs a [`DialerEngine`] with its periodic work on background tasks:
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 DialerServer                  │
//! ├───────────────┬───────────────┬───────────────┤
//! │  queue loop   │  ratio loop   │ cleanup loop  │
//! │ process_tick  │optimize_ratio │ cleanup_sweep │
//! ├───────────────┴───────────────┴───────────────┤
//! │                 DialerEngine                  │
//! ├───────────────────────────────────────────────┤
//! │      StoreGateway (records, DNC, presence)    │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Each loop runs on a `tokio::time::interval` and exits when the shutdown
//! signal fires. A failing tick is logged and the loop carries on.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_dialer_engine::prelude::*;
//!
//! # async fn example() -> rvoip_dialer_engine::Result<()> {
//! let store = Arc::new(InMemoryStore::new());
//! let mut server = DialerServerBuilder::new()
//!     .with_config(DialerConfig::default())
//!     .with_store(store)
//!     .build()
//!     .await?;
//!
//! server.start()?;
//! let campaign = server
//!     .engine()
//!     .create_campaign("spring-renewals", vec!["agent-1".into()], CampaignSettings::default())
//!     .await?;
//! server.engine().start_campaign(&campaign.id).await?;
//!
//! // ... telephony reports outcomes through server.engine().complete_call(...)
//!
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::DialerConfig;
use crate::dialer::DialerEngine;
use crate::error::{DialerError, Result};
use crate::store::{AgentPresence, DncList, RecordStore, SqliteStore, StoreGateway};

/// A dialer engine plus the background loops that drive it
pub struct DialerServer {
    engine: Arc<DialerEngine>,
    config: DialerConfig,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl DialerServer {
    pub fn new(engine: Arc<DialerEngine>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config: engine.config().clone(),
            engine,
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Spawn the queue, ratio and cleanup loops
    pub fn start(&mut self) -> Result<()> {
        if !self.handles.is_empty() {
            return Err(DialerError::conflict("dialer server is already running"));
        }
        self.shutdown.send_replace(false);
        let general = &self.config.general;

        let engine = self.engine.clone();
        let handle = self.spawn_loop("queue processor", general.queue_tick_interval(), move || {
            let engine = engine.clone();
            async move {
                let launched = engine.process_tick().await;
                if launched > 0 {
                    debug!("Queue tick launched {} calls", launched);
                }
            }
        });
        self.handles.push(handle);

        let engine = self.engine.clone();
        let handle = self.spawn_loop("ratio controller", general.ratio_tick_interval(), move || {
            let engine = engine.clone();
            async move {
                engine.optimize_ratio().await;
            }
        });
        self.handles.push(handle);

        let engine = self.engine.clone();
        let handle = self.spawn_loop("cleanup sweep", general.cleanup_interval(), move || {
            let engine = engine.clone();
            async move {
                let report = engine.cleanup_sweep().await;
                if report.timed_out_calls > 0 {
                    warn!("⏱️ Cleanup failed {} overdue calls", report.timed_out_calls);
                }
            }
        });
        self.handles.push(handle);

        info!(
            "✅ Dialer server started (queue tick {:?}, ratio tick {:?}, cleanup {:?})",
            general.queue_tick_interval(),
            general.ratio_tick_interval(),
            general.cleanup_interval()
        );
        Ok(())
    }

    fn spawn_loop<F, Fut>(&self, name: &'static str, period: Duration, mut tick: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            info!("🔄 Starting {} loop every {:?}", name, period);
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => tick().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("{} loop exited", name);
        })
    }

    /// Signal the loops to exit and wait for them
    ///
    /// Campaigns are left as they are; stop them first to drain calls.
    pub async fn stop(&mut self) -> Result<()> {
        info!("🛑 Stopping dialer server...");
        self.shutdown.send_replace(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Dialer loop ended abnormally: {}", e);
            }
        }
        info!("✅ Dialer server stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    pub fn engine(&self) -> &Arc<DialerEngine> {
        &self.engine
    }

    pub fn config(&self) -> &DialerConfig {
        &self.config
    }
}

/// Builder for [`DialerServer`]
///
/// Without an explicit store the server opens a [`SqliteStore`] at the
/// configured `database.database_url`.
#[derive(Default)]
pub struct DialerServerBuilder {
    config: Option<DialerConfig>,
    gateway: Option<StoreGateway>,
}

impl DialerServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: DialerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        let mut config = self.config.take().unwrap_or_default();
        config.database.database_url = url.into();
        self.config = Some(config);
        self
    }

    /// Use one store for records, DNC and presence
    pub fn with_store<S>(mut self, store: Arc<S>) -> Self
    where
        S: RecordStore + DncList + AgentPresence + 'static,
    {
        let database = self.config.clone().unwrap_or_default().database;
        self.gateway = Some(StoreGateway::from_store(store, &database));
        self
    }

    pub fn with_gateway(mut self, gateway: StoreGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub async fn build(self) -> Result<DialerServer> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let gateway = match self.gateway {
            Some(gateway) => gateway,
            None => {
                info!("💾 Opening SQLite store at {}", config.database.database_url);
                let store = Arc::new(SqliteStore::new(&config.database).await?);
                StoreGateway::from_store(store, &config.database)
            }
        };
        let engine = DialerEngine::new(config, gateway)?;
        Ok(DialerServer::new(Arc::new(engine)))
    }
}
