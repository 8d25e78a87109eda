use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, warn};

use crate::{
    services::session_service,
    state::{SessionContext, SharedContext, timer::display_seconds},
};

const TICK: Duration = Duration::from_secs(1);

/// Arm the question countdown for `duration`, replacing any running one.
///
/// The task refreshes the displayed time left every second and closes the question
/// through [`session_service::expire_question`] once the deadline passes.
pub fn start_countdown(context: &SharedContext, duration: Duration) -> u64 {
    let weak = Arc::downgrade(context);
    let token = context.timer().arm(duration, move |token, deadline| {
        let armed_at = deadline.checked_sub(duration).unwrap_or(deadline);
        tokio::spawn(run_countdown(weak, token, armed_at, deadline))
    });
    debug!(token, secs = duration.as_secs(), "question countdown armed");
    token
}

/// Ticks are anchored to `armed_at`, not to the first poll of the task, so a task that
/// starts late catches up on its first tick.
async fn run_countdown(
    context: Weak<SessionContext>,
    token: u64,
    armed_at: Instant,
    deadline: Instant,
) {
    let expiry = sleep_until(deadline);
    tokio::pin!(expiry);
    let mut ticker = interval_at(armed_at + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut expiry => break,
            _ = ticker.tick() => {
                let Some(context) = context.upgrade() else {
                    return;
                };
                if !context.timer().is_current(token) {
                    return;
                }
                let mut session = context.session().write().await;
                // The question may have closed while waiting for the lock.
                if !context.timer().is_current(token) {
                    return;
                }
                let left = display_seconds(deadline.saturating_duration_since(Instant::now()));
                session.set_time_left(left);
            }
        }
    }

    let Some(context) = context.upgrade() else {
        return;
    };
    if let Err(err) = session_service::expire_question(&context, token).await {
        warn!(token, error = %err, "failed to close question after countdown");
    }
}
