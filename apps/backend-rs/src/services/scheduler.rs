use std::time::Duration;

use chrono::{Datelike, Timelike, Utc};
use tokio::time::sleep;

use crate::state::AppState;

/// Background loop for the daily expiry sweep.
///
/// The sweep runs in its own task so a panic there never takes the loop down.
pub async fn run_background_scheduler(state: AppState) {
    tracing::info!(
        hour_utc = state.config.expiry_sweep_hour_utc,
        "Background scheduler started"
    );

    let mut last_daily_run: Option<(i32, u32)> = None;

    loop {
        sleep(Duration::from_secs(60)).await;

        let now_utc = Utc::now();
        let today = (now_utc.year(), now_utc.ordinal());
        if last_daily_run == Some(today) {
            continue;
        }
        if now_utc.hour() < state.config.expiry_sweep_hour_utc {
            continue;
        }
        last_daily_run = Some(today);

        let store = state.store.clone();
        let default_timezone = state.config.default_timezone.clone();
        tokio::spawn(async move {
            let result = crate::services::expiry::run_expiry_sweep(&store, &default_timezone).await;
            tracing::info!(
                organizations = result.organizations,
                expired = result.expired,
                failed = result.failed,
                "Scheduler: expiry sweep completed"
            );
        });
    }
}
