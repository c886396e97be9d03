use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::session::{RaffleSession, SessionError};
use crate::source::FetchRange;

/// Periodically pulls donations from the session's source and merges them.
pub struct DonationPoller {
    session: Arc<RaffleSession>,
    range: FetchRange,
    poll_interval: Duration,
}

impl DonationPoller {
    pub fn new(session: Arc<RaffleSession>, range: FetchRange, poll_interval: Duration) -> Self {
        assert!(
            poll_interval >= Duration::from_millis(100),
            "Poll interval below 100ms is unsafe"
        );
        Self {
            session,
            range,
            poll_interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            source = self.session.source_name(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "Starting donation poller"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    match changed {
                        Ok(_) => {
                            if *shutdown.borrow() {
                                info!("Poller shutdown signal received");
                                break;
                            }
                        }
                        Err(_) => {
                            warn!("Shutdown channel closed unexpectedly. Exiting poller loop");
                            break;
                        }
                    }
                }
                _ = sleep(self.poll_interval) => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        match self.session.refresh(&self.range).await {
            Ok(report) => {
                if report.merge.added.is_empty() {
                    debug!("{}", report.message());
                } else {
                    info!("{}", report.message());
                }
            }
            Err(SessionError::FetchInProgress) => {
                debug!("Skipping poll, a fetch is already running");
            }
            Err(err) => warn!("Donation poll failed: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DrawConfig;
    use crate::draw::RngPicker;
    use crate::source::Simulator;

    #[tokio::test(start_paused = true)]
    async fn polls_until_shutdown() {
        let simulator = Arc::new(Simulator::new(9, 2));
        let session = RaffleSession::new(
            simulator,
            None,
            Box::new(RngPicker::seeded(1)),
            &DrawConfig::default(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller = DonationPoller::new(
            Arc::clone(&session),
            FetchRange::default(),
            Duration::from_secs(1),
        );
        let handle = tokio::spawn(poller.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(session.count(), 6);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(session.count(), 6);
    }
}
