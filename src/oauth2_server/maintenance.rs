// ABOUTME: Background sweep of expired sessions, authorization codes, consents and revocation rows
// ABOUTME: Runs on a tokio interval until its shutdown channel fires
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info};

use crate::database::Database;
use crate::errors::AppResult;

/// Rows removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired SSO sessions
    pub sessions: u64,
    /// Expired authorization codes
    pub auth_codes: u64,
    /// Lapsed consents
    pub consents: u64,
    /// Revocation rows for tokens that have expired anyway
    pub revocations: u64,
}

impl SweepReport {
    /// Total rows removed
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.sessions + self.auth_codes + self.consents + self.revocations
    }
}

/// Delete everything that expired at or before `now`
///
/// # Errors
/// Returns the first database error encountered
pub async fn sweep(database: &Database, now: DateTime<Utc>) -> AppResult<SweepReport> {
    Ok(SweepReport {
        sessions: database.delete_expired_sessions(now).await?,
        auth_codes: database.delete_expired_auth_codes(now).await?,
        consents: database.delete_expired_consents(now).await?,
        revocations: database.delete_expired_revocations(now).await?,
    })
}

/// Handle to the running sweep task
pub struct MaintenanceTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl MaintenanceTask {
    /// Spawn the sweep loop; the first sweep runs immediately
    #[must_use]
    pub fn spawn(database: Arc<Database>, every: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(every);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => run_once(&database).await,
                    _ = shutdown_rx.recv() => {
                        debug!("Maintenance task received shutdown signal");
                        break;
                    }
                }
            }
        });
        info!(interval_secs = every.as_secs(), "Started expired-record sweeper");
        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the loop and wait for it to finish
    pub async fn shutdown(self) {
        // A closed channel means the task already exited
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            error!(error = %e, "Maintenance task ended abnormally");
        }
    }
}

async fn run_once(database: &Database) {
    match sweep(database, Utc::now()).await {
        Ok(report) if report.total() > 0 => info!(
            sessions = report.sessions,
            auth_codes = report.auth_codes,
            consents = report.consents,
            revocations = report.revocations,
            "Swept expired records"
        ),
        Ok(_) => debug!("Sweep found nothing to remove"),
        Err(e) => error!(error = %e, "Sweep failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use sso_core::models::SsoSession;
    use uuid::Uuid;

    fn session(id: &str, expires_at: DateTime<Utc>) -> SsoSession {
        SsoSession {
            session_id: id.to_owned(),
            user_id: Uuid::new_v4(),
            authenticated: true,
            created_at: Utc::now(),
            expires_at,
            last_activity: Utc::now(),
            ip_address: None,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn test_sweep_reports_counts() {
        let database = Database::new("sqlite::memory:").await.unwrap();
        let past = Utc::now() - ChronoDuration::minutes(1);
        database.create_session(&session("a", past)).await.unwrap();
        database.create_session(&session("b", past)).await.unwrap();
        database
            .create_session(&session("c", Utc::now() + ChronoDuration::days(1)))
            .await
            .unwrap();

        let report = sweep(&database, Utc::now()).await.unwrap();
        assert_eq!(report.sessions, 2);
        assert_eq!(report.total(), 2);
        assert!(database.get_session("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_task_sweeps_and_shuts_down() {
        let database = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        database
            .create_session(&session("old", Utc::now() - ChronoDuration::minutes(1)))
            .await
            .unwrap();

        let task = MaintenanceTask::spawn(database.clone(), Duration::from_millis(20));
        time::sleep(Duration::from_millis(100)).await;
        task.shutdown().await;

        assert!(database.get_session("old").await.unwrap().is_none());
    }
}
