use crate::protocol::ServerMessage;
use crate::state::AppState;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;

/// One watcher pass: close expired questions, then push a countdown
/// resync for the active timed question.
///
/// Store failures are logged and left for the next tick; expiry is a
/// compare-and-set so a retry never double-closes.
pub async fn run_timer_tick(state: &AppState) {
    match state.close_expired_questions().await {
        Ok(closed) if !closed.is_empty() => {
            tracing::debug!("Expiry watcher closed {} question(s)", closed.len());
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!("Expiry check failed, retrying next tick: {}", e);
            return;
        }
    }

    match state.countdown().await {
        Ok(Some((question_id, countdown))) => {
            state.broadcast_to_all(ServerMessage::TimerSync {
                question_id,
                end_time: countdown.end_time,
                server_now: countdown.server_now,
                remaining_seconds: countdown.remaining_seconds,
            });
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Countdown lookup failed: {}", e),
    }
}

/// Spawn the background task that expires timed questions and keeps
/// client countdowns in sync
pub fn spawn_timer_watcher(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.watch_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            "Timer watcher running every {:?}",
            state.config.watch_interval
        );

        loop {
            interval.tick().await;
            run_timer_tick(&state).await;
        }
    })
}
