use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
    api::realtime::{ChangeEvent, ChangeOp, RealtimeHub, Table},
    config::PresenceConfig,
    error::{AppError, AppResult},
    storage::Store,
};

/// Marks devices offline once they stop sending heartbeats.
pub struct PresenceSweeper {
    store: Arc<dyn Store>,
    realtime: Arc<RealtimeHub>,
    offline_after: Duration,
    interval: Duration,
}

impl PresenceSweeper {
    pub fn new(store: Arc<dyn Store>, realtime: Arc<RealtimeHub>, config: &PresenceConfig) -> Self {
        Self {
            store,
            realtime,
            offline_after: config.offline_after,
            interval: config.sweep_interval,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.sweep_once(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Marked {} device(s) offline", n),
                Err(e) => tracing::error!("Presence sweep failed: {}", e),
            }
        }
    }

    pub async fn sweep_once(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let offline_after = chrono::Duration::from_std(self.offline_after)
            .map_err(|e| AppError::Configuration(format!("offline_after: {}", e)))?;

        let devices = self
            .store
            .mark_stale_devices_offline(now, offline_after)
            .await?;

        for device in &devices {
            self.realtime
                .publish(
                    device.user_id,
                    ChangeEvent::new(Table::Devices, ChangeOp::Update, device),
                )
                .await;
        }
        Ok(devices.len())
    }
}
