use quizparty_common::retry::RetryPolicy;

use crate::health::probe_health;
use crate::network::{fetch_quiz_preview, fetch_room_list};
use crate::status::NetworkStatus;

/// Outcome of the startup sequence. The two flags are independent:
/// the health probe can succeed while the initial fetches fail, and a
/// failed probe still lets the fetches try their luck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub health_ok: bool,
    pub initial_ok: bool,
}

/// Run the startup sequence: probe the server's health with backoff,
/// then fetch the initial data set concurrently. Failures are recorded
/// on `status` rather than aborting, so callers decide how degraded a
/// start they tolerate.
pub async fn wait_api_ready(addr: &str, status: &NetworkStatus, policy: &RetryPolicy) -> Readiness {
    let healthy = probe_health(addr, status, policy).await;
    if !healthy {
        tracing::warn!("Proceeding to initial fetches without a healthy server");
    }

    let (rooms, quiz) = tokio::join!(
        fetch_room_list(addr, status),
        fetch_quiz_preview(addr, 1, status),
    );

    let mut initial_ok = true;
    if let Err(e) = &rooms {
        tracing::error!("Initial room list fetch failed: {}", e);
        status.set_error(Some(e.to_string()));
        initial_ok = false;
    }
    if let Err(e) = &quiz {
        tracing::error!("Initial quiz preview fetch failed: {}", e);
        status.set_error(Some(e.to_string()));
        initial_ok = false;
    }
    if initial_ok {
        status.set_error(None);
    }

    Readiness {
        health_ok: status.health_ok(),
        initial_ok,
    }
}
