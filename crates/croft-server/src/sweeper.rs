use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};

use croft_types::events::FeedEvent;
use croft_types::models::TYPING_QUIET_PERIOD_MS;

use crate::AppState;

/// Periodically clear typing rows whose last refresh is older than the
/// quiet period, broadcasting each clear. Clients normally clear their own
/// indicator; this catches the ones whose clearing write never arrived.
pub async fn run_typing_sweeper(state: AppState, sweep_interval: Duration) {
    let mut interval = tokio::time::interval(sweep_interval);

    loop {
        interval.tick().await;

        let cutoff = (Utc::now() - chrono::Duration::milliseconds(TYPING_QUIET_PERIOD_MS as i64))
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        let ts = croft_db::now_ts();

        let db = state.db.clone();
        let swept = tokio::task::spawn_blocking(move || db.sweep_stale_typing(&cutoff, &ts)).await;

        let rows = match swept {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                warn!("typing sweep failed: {}", e);
                continue;
            }
            Err(e) => {
                warn!("spawn_blocking join error: {}", e);
                continue;
            }
        };

        if rows.is_empty() {
            continue;
        }

        debug!("cleared {} stale typing indicators", rows.len());
        for row in rows {
            match row.into_indicator() {
                Ok(indicator) => state.dispatcher.broadcast(FeedEvent::TypingUpdate { indicator }),
                Err(e) => warn!("corrupt typing row during sweep: {}", e),
            }
        }
    }
}
