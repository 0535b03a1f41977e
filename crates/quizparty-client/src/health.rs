use std::time::Duration;

use tokio::net::TcpStream;

use quizparty_common::protocol::{self, framed_transport, ClientMessage, ServerMessage};
use quizparty_common::retry::RetryPolicy;

use crate::status::NetworkStatus;

/// Probe attempts get a generous timeout of their own so a wedged
/// connection cannot hold the whole startup sequence hostage.
pub const HEALTH_TIMEOUT: Duration = Duration::from_millis(8000);

/// Probe the server's health endpoint until it answers "ok" or the
/// policy's attempts run out. The health flag on `status` is updated
/// after every attempt, so observers see the latest truth even while
/// retries are still in flight. Returns whether the server was
/// ultimately reachable.
pub async fn probe_health(addr: &str, status: &NetworkStatus, policy: &RetryPolicy) -> bool {
    for attempt in 0..policy.max_attempts {
        let ok = check_once(addr, status).await;
        status.set_health(ok);
        if ok {
            if attempt > 0 {
                tracing::info!("Health probe succeeded on attempt {}", attempt + 1);
            }
            return true;
        }

        // Sleep only between attempts, never after the last one.
        if attempt + 1 < policy.max_attempts {
            let delay = policy.delay_for(attempt);
            tracing::debug!(
                "Health probe attempt {} failed, retrying in {:?}",
                attempt + 1,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    tracing::warn!(
        "Health probe gave up after {} attempts against {}",
        policy.max_attempts,
        addr
    );
    false
}

async fn check_once(addr: &str, status: &NetworkStatus) -> bool {
    status.on_request_start();
    let result = tokio::time::timeout(HEALTH_TIMEOUT, health_request(addr)).await;
    status.on_request_end();
    match result {
        Ok(Ok(ok)) => ok,
        Ok(Err(e)) => {
            tracing::debug!("Health check failed: {}", e);
            false
        }
        Err(_) => {
            tracing::debug!("Health check timed out");
            false
        }
    }
}

async fn health_request(addr: &str) -> anyhow::Result<bool> {
    let stream = TcpStream::connect(addr).await?;
    let mut transport = framed_transport(stream);
    protocol::send_message(&mut transport, &ClientMessage::HealthCheck).await?;
    match protocol::recv_message::<ServerMessage>(&mut transport).await? {
        Some(ServerMessage::HealthStatus { status }) => Ok(status == "ok"),
        Some(other) => anyhow::bail!("unexpected reply to HealthCheck: {:?}", other),
        None => anyhow::bail!("connection closed before reply"),
    }
}
