use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Utc};
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::catalog;
use crate::config::ConvertConfig;
use crate::convert::{ConvertOutcome, Converter};
use crate::store::CatalogStore;

const TICK: Duration = Duration::from_secs(1);

/// True when `local` falls inside the daily window. A window whose start is
/// after its end wraps past midnight.
fn window_contains(local: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        start < local && local < end
    } else {
        local > start || local < end
    }
}

/// When the next reconciliation pass is due: the next occurrence of the
/// fixed daily scan time when one is configured, otherwise a plain interval
/// from now.
fn next_scan_at(
    now: DateTime<Utc>,
    offset: FixedOffset,
    daily_scan_time: Option<NaiveTime>,
    interval_minutes: u64,
) -> DateTime<Utc> {
    if let Some(scan_time) = daily_scan_time {
        let local_now = now.with_timezone(&offset);
        let today = local_now.date_naive().and_time(scan_time);
        if let Some(candidate) = offset.from_local_datetime(&today).single() {
            return if candidate > local_now {
                candidate.with_timezone(&Utc)
            } else {
                (candidate + chrono::Duration::days(1)).with_timezone(&Utc)
            };
        }
    }
    now + chrono::Duration::minutes(interval_minutes as i64)
}

/// The single active loop of a worker process.
///
/// Every tick decides between two jobs: reconcile the catalog when the scan
/// interval has elapsed (main worker only), and attempt one conversion when
/// the current time falls inside the configured daily window. Failures in
/// either are logged and the loop keeps ticking; a termination signal cancels
/// the shared token so an in-flight conversion cleans up before the loop
/// exits.
pub struct Scheduler {
    config: ConvertConfig,
    store: Arc<dyn CatalogStore>,
    converter: Converter,
    cancel: CancellationToken,
    offset: FixedOffset,
    window: (NaiveTime, NaiveTime),
    daily_scan_time: Option<NaiveTime>,
    next_scan_at: DateTime<Utc>,
}

impl Scheduler {
    pub fn new(
        config: ConvertConfig,
        store: Arc<dyn CatalogStore>,
        converter: Converter,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let offset = config.schedule.utc_offset()?;
        let window = config.schedule.conversion_window()?;
        let daily_scan_time = config.schedule.daily_scan_time()?;

        Ok(Scheduler {
            config,
            store,
            converter,
            cancel,
            offset,
            window,
            daily_scan_time,
            // First reconciliation runs on the first tick.
            next_scan_at: Utc::now(),
        })
    }

    fn in_conversion_window(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset).time();
        window_contains(local, self.window.0, self.window.1)
    }

    async fn tick(&mut self) {
        let now = Utc::now();

        if self.config.main_worker && now >= self.next_scan_at {
            info!("Starting catalog reconciliation");
            match catalog::run_reconcile_pass(self.store.as_ref(), &self.config).await {
                Ok(summary) => info!(
                    "Reconciliation complete: {} scanned, {} renamed, {} deleted, {} probed ({} probe failures)",
                    summary.scanned,
                    summary.renamed,
                    summary.deleted,
                    summary.probed,
                    summary.probe_failures
                ),
                Err(e) => warn!("Reconciliation skipped: {e}"),
            }
            self.next_scan_at = next_scan_at(
                Utc::now(),
                self.offset,
                self.daily_scan_time,
                self.config.schedule.scan_interval_minutes,
            );
            debug!("Next reconciliation at {}", self.next_scan_at);
        }

        if self.cancel.is_cancelled() {
            return;
        }

        if self.in_conversion_window(now) {
            match self.converter.convert().await {
                Ok(ConvertOutcome::Idle) => debug!("Nothing to convert"),
                Ok(outcome) => debug!("Conversion finished: {outcome:?}"),
                Err(e) if e.is_transient() => warn!("Store unavailable, skipping tick: {e}"),
                Err(e) => error!("Store error while claiming: {e}"),
            }
        } else {
            debug!(
                "Outside conversion window {} - {}",
                self.config.schedule.start_conversion, self.config.schedule.end_conversion
            );
        }
    }

    /// Run until a termination signal arrives. Returns only after any
    /// in-flight conversion has released its claim and cleaned up, so the
    /// process can exit 0.
    pub async fn run(&mut self) {
        info!(
            "Scheduler running; conversion window {} - {} ({}), scanning every {} minute(s)",
            self.config.schedule.start_conversion,
            self.config.schedule.end_conversion,
            self.config.schedule.timezone,
            self.config.schedule.scan_interval_minutes
        );

        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            wait_for_shutdown().await;
            info!("Shutdown signal received");
            cancel.cancel();
        });

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(TICK) => {}
                _ = self.cancel.cancelled() => break,
            }
        }

        info!("Scheduler stopped cleanly");
    }
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
