//! Sync run: connect both sides, notifications then monitors, always disconnect.

use std::time::Instant;

use kumasync_core::{EntityKind, Record};
use kumasync_hub::{Connector, DirectoryClient, Endpoint};
use metrics::{counter, histogram};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::connect::connect_with_retry;
use crate::project::{MonitorProjector, NotificationProjector};
use crate::reconcile::reconcile;
use crate::remap::ReferenceRemapper;
use crate::{KindReport, Phase, SyncConfig, SyncError, SyncReport};

/// Run one full primary → secondary sync.
///
/// Connect failures abort before anything is written. Once a connection is open it is
/// released on every exit path; a failed disconnect is logged and never masks the result.
pub async fn run_sync<C: Connector>(connector: &C, config: &SyncConfig) -> Result<SyncReport, SyncError> {
    let run_id = Uuid::new_v4();
    run(connector, config, run_id).instrument(info_span!("sync", %run_id)).await
}

async fn run<C: Connector>(connector: &C, config: &SyncConfig, run_id: Uuid) -> Result<SyncReport, SyncError> {
    let t0 = Instant::now();
    let started_at = chrono::Utc::now().to_rfc3339();
    info!(
        primary = %config.primary.url,
        secondary = %config.secondary.url,
        strategy = %config.strategy,
        dry_run = config.dry_run,
        "sync start"
    );

    let mut primary = connect_with_retry(connector, &config.primary, config.retry, Phase::ConnectPrimary).await?;
    let mut secondary =
        match connect_with_retry(connector, &config.secondary, config.retry, Phase::ConnectSecondary).await {
            Ok(client) => client,
            Err(e) => {
                release(&mut primary, &config.primary).await;
                counter!("kumasync_runs_total", 1u64, "outcome" => "fatal");
                return Err(e);
            }
        };

    let result = sync_both(&mut primary, &mut secondary, config)
        .await
        .map(|(notifications, monitors)| SyncReport {
            run_id: run_id.to_string(),
            started_at,
            strategy: config.strategy,
            dry_run: config.dry_run,
            notifications,
            monitors,
        });

    info!(phase = %Phase::DisconnectBoth, "releasing connections");
    release(&mut primary, &config.primary).await;
    release(&mut secondary, &config.secondary).await;

    histogram!("kumasync_run_ms", t0.elapsed().as_secs_f64() * 1000.0);
    match &result {
        Ok(report) => {
            counter!("kumasync_runs_total", 1u64, "outcome" => "ok");
            info!(
                phase = %Phase::Done,
                notifications_added = report.notifications.added,
                notifications_updated = report.notifications.updated,
                notifications_skipped = report.notifications.skipped,
                monitors_added = report.monitors.added,
                monitors_updated = report.monitors.updated,
                monitors_skipped = report.monitors.skipped,
                took_ms = %t0.elapsed().as_millis(),
                "sync complete"
            );
        }
        Err(e) => {
            counter!("kumasync_runs_total", 1u64, "outcome" => "fatal");
            error!(phase = %e.phase(), error = %e, "sync aborted");
        }
    }
    result
}

/// Notification and monitor reports, in that order.
async fn sync_both<P, S>(
    primary: &mut P,
    secondary: &mut S,
    config: &SyncConfig,
) -> Result<(KindReport, KindReport), SyncError>
where
    P: DirectoryClient + ?Sized,
    S: DirectoryClient + ?Sized,
{
    let opts = config.reconcile_options();

    let phase = Phase::SyncNotifications;
    info!(%phase, "phase start");
    let primary_notifications = list(primary, EntityKind::Notification, phase, &config.primary).await?;
    let notifications = reconcile(secondary, &primary_notifications, &NotificationProjector, opts)
        .await
        .map_err(|source| listing_failed(phase, &config.secondary, EntityKind::Notification, source))?;

    let phase = Phase::SyncMonitors;
    info!(%phase, "phase start");
    let primary_monitors = list(primary, EntityKind::Monitor, phase, &config.primary).await?;
    // Re-listed so references resolve against notifications created or recreated above.
    let secondary_notifications = list(secondary, EntityKind::Notification, phase, &config.secondary).await?;
    let remapper = ReferenceRemapper::from_listings(&primary_notifications, &secondary_notifications);
    let monitors = reconcile(secondary, &primary_monitors, &MonitorProjector::new(remapper), opts)
        .await
        .map_err(|source| listing_failed(phase, &config.secondary, EntityKind::Monitor, source))?;

    Ok((notifications, monitors))
}

async fn list<C>(client: &mut C, kind: EntityKind, phase: Phase, endpoint: &Endpoint) -> Result<Vec<Record>, SyncError>
where
    C: DirectoryClient + ?Sized,
{
    let items = client
        .list(kind)
        .await
        .map_err(|source| listing_failed(phase, endpoint, kind, source))?;
    info!(endpoint = %endpoint.label, %kind, count = items.len(), "listed");
    Ok(items)
}

fn listing_failed(phase: Phase, endpoint: &Endpoint, kind: EntityKind, source: kumasync_core::ClientError) -> SyncError {
    SyncError::Listing { phase, endpoint: endpoint.label.clone(), kind, source }
}

async fn release<C>(client: &mut C, endpoint: &Endpoint)
where
    C: DirectoryClient + ?Sized,
{
    if let Err(e) = client.disconnect().await {
        warn!(endpoint = %endpoint.label, error = %e, "disconnect failed");
    }
}
