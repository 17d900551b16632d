// src/core/services/sweeper.rs
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    core::{
        matching::engine::normalize,
        verification::{
            AuditActor, AuditEventType, AuditRecord, DeactivationReason, SubjectId,
            TransitionTrigger, VerificationStatus,
        },
    },
    storage::EncryptedStore,
    utils::{error::VerificationError, metrics::Metrics},
};

type Outcome<T> = std::result::Result<T, VerificationError>;

/// Deactivates grants past their validity window.
pub struct ExpirySweeper {
    store: Arc<EncryptedStore>,
    warning_window: Duration,
    metrics: Arc<Metrics>,
}

impl ExpirySweeper {
    pub fn new(store: Arc<EncryptedStore>, warning_days: i64, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            warning_window: Duration::days(warning_days),
            metrics,
        }
    }

    pub async fn sweep(&self) -> Outcome<usize> {
        self.sweep_at(Utc::now()).await
    }

    /// Deactivates every active grant with `expires_at < now` and appends
    /// one audit record per grant, all in a single commit. The linked request
    /// moves from `APPROVED` to `EXPIRED`. Running it again deactivates
    /// nothing new.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Outcome<usize> {
        let mut tx = self.store.begin().await;
        let mut deactivated = 0;

        for mut grant in tx.store().list_grants()? {
            if !grant.is_active || !grant.is_expired_at(now) {
                continue;
            }

            grant.deactivate(DeactivationReason::Expired, now);
            tx.put_grant(&grant)?;
            tx.append_audit(
                &AuditRecord::new(
                    AuditEventType::Expired,
                    grant.request_id,
                    grant.subject.clone(),
                    AuditActor::Sweeper,
                    now,
                )
                .with_grant(grant.id),
            )?;

            if let Some(mut request) = tx.store().get_request(&grant.request_id)? {
                let linked = request.grant_id == Some(grant.id);
                if linked && request.status == VerificationStatus::Approved {
                    request
                        .transition(VerificationStatus::Expired, TransitionTrigger::Sweeper, now)
                        .map_err(|e| VerificationError::InvalidState {
                            request_id: request.id,
                            status: e.from.to_string(),
                            expected: VerificationStatus::Approved.to_string(),
                        })?;
                    tx.put_request(&request)?;
                }
            }

            deactivated += 1;
        }

        if deactivated > 0 {
            tx.commit()?;
            self.metrics.record_expired(deactivated as u64);
        }
        info!(deactivated, "Expiry sweep finished");

        Ok(deactivated)
    }

    pub fn needs_reverification(&self, subject: &SubjectId, institution: &str) -> Outcome<bool> {
        self.needs_reverification_at(subject, institution, Utc::now())
    }

    /// True when the subject holds no active grant for `institution`, when
    /// the latest such grant is inactive, or when it expires within the
    /// warning window.
    pub fn needs_reverification_at(
        &self,
        subject: &SubjectId,
        institution: &str,
        now: DateTime<Utc>,
    ) -> Outcome<bool> {
        let institution = normalize(institution);
        let latest = self
            .store
            .grants_for_subject(subject)?
            .into_iter()
            .filter(|grant| grant.institution == institution)
            .max_by_key(|grant| grant.verified_at);

        Ok(match latest {
            None => true,
            Some(grant) if !grant.is_active => true,
            Some(grant) => grant.expires_at - now < self.warning_window,
        })
    }

    /// Runs `sweep` every `interval` until `shutdown` flips to true.
    pub fn spawn(
        self: Arc<Self>,
        interval: std::time::Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep().await {
                            error!(error = %e, "Expiry sweep failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            warn!("Expiry sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::{Claims, IdentityRecord};
    use crate::core::verification::{UserVerificationGrant, VerificationRequest};
    use crate::utils::config::StorageConfig;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, Arc<EncryptedStore>, ExpirySweeper) {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            path: dir.path().to_str().unwrap().to_string(),
            encryption_key: "test_key".into(),
            compression_enabled: false,
        };
        let store = Arc::new(EncryptedStore::open(&config).unwrap());
        let sweeper = ExpirySweeper::new(store.clone(), 30, Arc::new(Metrics::new()));
        (dir, store, sweeper)
    }

    /// Persists an approved request with a grant verified at `verified_at`.
    async fn approved(
        store: &EncryptedStore,
        subject: &str,
        verified_at: DateTime<Utc>,
    ) -> (VerificationRequest, UserVerificationGrant) {
        let claims = Claims {
            full_name: "Asha Rao".into(),
            institution: "IIT Delhi".into(),
            program: "B.Tech CSE".into(),
            start_year: 2018,
            end_year: 2022,
        };
        let mut request = VerificationRequest::new(
            SubjectId::new(subject),
            IdentityRecord::from_user_claims(&claims),
            verified_at,
        );
        for to in [
            VerificationStatus::ProcessingOcr,
            VerificationStatus::Matching,
            VerificationStatus::Approved,
        ] {
            request
                .transition(to, TransitionTrigger::Pipeline, verified_at)
                .unwrap();
        }
        let grant =
            UserVerificationGrant::new(&request, "iit delhi".into(), verified_at, Duration::days(365));
        request.grant_id = Some(grant.id);

        let mut tx = store.begin().await;
        tx.put_request(&request).unwrap();
        tx.put_grant(&grant).unwrap();
        tx.commit().unwrap();
        (request, grant)
    }

    #[tokio::test]
    async fn test_sweep_deactivates_once() {
        let (_dir, store, sweeper) = setup();
        let now = Utc::now();
        let (request, grant) = approved(&store, "user-1", now - Duration::days(400)).await;
        approved(&store, "user-2", now - Duration::days(10)).await;

        assert_eq!(sweeper.sweep_at(now).await.unwrap(), 1);
        assert_eq!(sweeper.sweep_at(now).await.unwrap(), 0);

        let stored = store.grants_for_subject(&request.subject).unwrap();
        assert!(!stored[0].is_active);
        assert_eq!(stored[0].deactivation_reason, Some(DeactivationReason::Expired));

        let audit = store.audit_records().unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].event_type, AuditEventType::Expired);
        assert_eq!(audit[0].grant_id, Some(grant.id));

        let request = store.get_request(&request.id).unwrap().unwrap();
        assert_eq!(request.status, VerificationStatus::Expired);
    }

    #[tokio::test]
    async fn test_needs_reverification() {
        let (_dir, store, sweeper) = setup();
        let now = Utc::now();
        let subject = SubjectId::new("user-1");

        assert!(sweeper.needs_reverification_at(&subject, "IIT Delhi", now).unwrap());

        approved(&store, "user-1", now - Duration::days(100)).await;
        assert!(!sweeper.needs_reverification_at(&subject, "IIT Delhi", now).unwrap());
        assert!(sweeper.needs_reverification_at(&subject, "IIT Bombay", now).unwrap());

        // 20 days left on the grant.
        let later = now + Duration::days(245);
        assert!(sweeper.needs_reverification_at(&subject, "iit  delhi", later).unwrap());

        sweeper.sweep_at(now + Duration::days(300)).await.unwrap();
        assert!(sweeper.needs_reverification_at(&subject, "IIT Delhi", now).unwrap());
    }

    #[tokio::test]
    async fn test_spawned_sweeper_stops_on_shutdown() {
        let (_dir, _store, sweeper) = setup();
        let (tx, rx) = watch::channel(false);
        let handle = Arc::new(sweeper).spawn(std::time::Duration::from_millis(5), rx);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        tokio_test::assert_ok!(
            tokio::time::timeout(std::time::Duration::from_secs(1), handle).await
        );
    }
}
