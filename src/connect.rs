//! Connect/retry supervisor.
//!
//! A fixed-delay (not exponential) retry loop: simple and predictable,
//! since the server side already backs off on its end under load.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::error::ConnectError;
use crate::frames::DownstreamFrame;
use crate::protocol::ServerClient;

/// Attempts to connect `client`, retrying up to
/// `config.client_connect_max_retries` times with a fixed
/// `config.client_reconnect_delay_secs` pause between attempts. Only
/// [`ConnectError::Transient`] triggers a retry; any other error
/// short-circuits immediately.
///
/// On final failure (retries exhausted, or a fatal error on any attempt),
/// emits [`DownstreamFrame::End`] and returns the last error. Callers MUST
/// abort session start in that case.
pub async fn connect_with_retry(
    client: &dyn ServerClient,
    config: &EngineConfig,
    downstream: &mpsc::Sender<DownstreamFrame>,
) -> Result<(), ConnectError> {
    let max_attempts = config.client_connect_max_retries;
    let delay = Duration::from_secs_f64(config.client_reconnect_delay_secs);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            log::info!(
                "[Connect] retrying (attempt {}/{}) after {:?}",
                attempt,
                max_attempts,
                delay
            );
            tokio::time::sleep(delay).await;
        }

        match client.connect().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() => {
                log::warn!("[Connect] transient connect error: {e}");
                last_error = Some(e);
            }
            Err(e) => {
                log::error!("[Connect] fatal connect error, aborting: {e}");
                let _ = downstream.send(DownstreamFrame::End).await;
                return Err(e);
            }
        }
    }

    let err = last_error.expect("loop runs at least once: max_attempts >= 1 per EngineConfig::validate");
    log::error!(
        "[Connect] exhausted {} connect attempts: {err}",
        max_attempts
    );
    let _ = downstream.send(DownstreamFrame::End).await;
    Err(err)
}
