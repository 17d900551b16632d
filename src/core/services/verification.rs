// src/core/services/verification.rs
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    core::{
        document::{parse_fields, DocumentClassifier, DocumentHandle, DocumentStorage, DocumentType},
        identity::{Claims, IdentityRecord},
        matching::{engine::normalize, MatchOutcome, MatchingEngine, MatchingFault, Mismatch},
        ocr::{ExtractionError, OcrExtractor},
        verification::{
            decide, AuditActor, AuditEventType, AuditRecord, DeactivationReason, Decision,
            DecisionConfig, EscalationReason, Progress, ProgressEvent, ReviewDecision,
            ReviewRecord, SubjectId, TransitionTrigger, UserVerificationGrant,
            VerificationRequest, VerificationStatus,
        },
    },
    storage::{EncryptedStore, StoreTransaction},
    utils::{config::Config, error::VerificationError, metrics::Metrics},
};

type Outcome<T> = std::result::Result<T, VerificationError>;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const MAX_REVIEW_NOTES: usize = 2000;

/// Read-only projection returned to the subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestStatus {
    pub request_id: Uuid,
    pub status: VerificationStatus,
    pub progress: Progress,
    pub total_attempts: u32,
    pub document_type: Option<DocumentType>,
    pub match_score: Option<u8>,
    pub mismatches: Option<Vec<Mismatch>>,
    pub error_message: Option<String>,
    pub escalation: Option<EscalationReason>,
    pub review_decision: Option<ReviewDecision>,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Summary shown in the reviewer queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewQueueEntry {
    pub request_id: Uuid,
    pub subject: SubjectId,
    pub claimed: IdentityRecord,
    pub extracted: Option<IdentityRecord>,
    pub match_score: Option<u8>,
    pub mismatches: Vec<Mismatch>,
    pub escalation: Option<EscalationReason>,
    pub total_attempts: u32,
    pub queued_at: DateTime<Utc>,
}

fn progress_of(request: &VerificationRequest) -> Progress {
    Progress {
        stage: request.status,
        percentage: request.status.progress_percentage(),
        updated_at: request.updated_at,
    }
}

fn audit_event_for(status: VerificationStatus) -> AuditEventType {
    match status {
        VerificationStatus::Approved => AuditEventType::Approved,
        VerificationStatus::Rejected => AuditEventType::Rejected,
        VerificationStatus::OcrFailed => AuditEventType::OcrFailed,
        VerificationStatus::Expired => AuditEventType::Expired,
        _ => AuditEventType::ManualReviewQueued,
    }
}

type InFlightSet = Arc<Mutex<HashMap<Uuid, Uuid>>>;

/// Claim on a request id for one pipeline run. Dropping it releases the
/// claim only if it still owns it; a terminal transition may already have
/// released it and a resubmission may hold a newer claim.
struct InFlightGuard {
    set: InFlightSet,
    id: Uuid,
    token: Uuid,
}

impl InFlightGuard {
    fn acquire(set: &InFlightSet, id: Uuid) -> Option<Self> {
        let mut claims = set.lock();
        if claims.contains_key(&id) {
            return None;
        }
        let token = Uuid::new_v4();
        claims.insert(id, token);
        Some(Self {
            set: Arc::clone(set),
            id,
            token,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut claims = self.set.lock();
        if claims.get(&self.id) == Some(&self.token) {
            claims.remove(&self.id);
        }
    }
}

/// Owns the lifecycle of verification requests: submission, extraction,
/// matching, decisioning and manual review.
///
/// At most one automatic pipeline run exists per request id. Every state
/// change and its side effects (grant, audit) are committed in one store
/// transaction.
pub struct VerificationService {
    store: Arc<EncryptedStore>,
    extractor: Arc<dyn OcrExtractor>,
    documents: Arc<dyn DocumentStorage>,
    matcher: Arc<MatchingEngine>,
    classifier: DocumentClassifier,
    decision: DecisionConfig,
    max_document_bytes: u64,
    in_flight: InFlightSet,
    events: broadcast::Sender<ProgressEvent>,
    metrics: Arc<Metrics>,
}

impl VerificationService {
    pub fn new(
        config: &Config,
        store: Arc<EncryptedStore>,
        extractor: Arc<dyn OcrExtractor>,
        documents: Arc<dyn DocumentStorage>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            store,
            extractor,
            documents,
            matcher: Arc::new(MatchingEngine::new(config.matching.clone())),
            classifier: DocumentClassifier::new(),
            decision: config.decision.clone(),
            max_document_bytes: config.ocr.max_document_bytes,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            events,
            metrics,
        }
    }

    /// Push channel of progress events, one per committed transition.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    pub fn is_in_flight(&self, request_id: &Uuid) -> bool {
        self.in_flight.lock().contains_key(request_id)
    }

    /// Accepts claims plus one document and starts the automatic pipeline in
    /// the background. The document is discarded once extraction finishes,
    /// or immediately if the submission is refused.
    pub async fn submit(
        self: &Arc<Self>,
        subject: &SubjectId,
        claims: Claims,
        document: DocumentHandle,
    ) -> Outcome<Uuid> {
        let opened = match claims
            .validate()
            .and_then(|_| document.validate(self.max_document_bytes))
        {
            Ok(()) => self.open_request(subject, &claims).await,
            Err(reason) => Err(VerificationError::Validation(reason)),
        };

        let (request, guard) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                debug!(subject = %subject, code = e.code(), "Submission refused");
                self.discard(&document).await;
                return Err(e);
            }
        };

        self.metrics.record_submission();
        self.publish(&request);
        info!(
            request_id = %request.id,
            subject = %subject,
            attempt = request.total_attempts,
            "Verification request submitted"
        );

        let service = Arc::clone(self);
        let request_id = request.id;
        tokio::spawn(async move {
            let _guard = guard;
            let started = Instant::now();
            if let Err(e) = service.run_pipeline(request_id, document).await {
                error!(request_id = %request_id, error = %e, "Verification pipeline aborted");
            }
            service.metrics.record_pipeline(started.elapsed());
        });

        Ok(request_id)
    }

    async fn open_request(
        &self,
        subject: &SubjectId,
        claims: &Claims,
    ) -> Outcome<(VerificationRequest, InFlightGuard)> {
        let now = Utc::now();
        let claimed = IdentityRecord::from_user_claims(claims);

        let mut tx = self.store.begin().await;
        let request = match tx.store().request_for_subject(subject)? {
            None => VerificationRequest::new(subject.clone(), claimed, now),
            Some(mut existing) => {
                self.ensure_resubmittable(tx.store(), &existing)?;
                let from = existing.status;
                existing
                    .restart(claimed, now)
                    .map_err(|_| VerificationError::InvalidState {
                        request_id: existing.id,
                        status: from.to_string(),
                        expected: "REJECTED, OCR_FAILED or EXPIRED".to_string(),
                    })?;
                existing
            }
        };

        let guard = InFlightGuard::acquire(&self.in_flight, request.id).ok_or_else(|| {
            VerificationError::Conflict("a verification request is already being processed".into())
        })?;

        tx.put_request(&request)?;
        tx.commit()?;

        Ok((request, guard))
    }

    fn ensure_resubmittable(
        &self,
        store: &EncryptedStore,
        existing: &VerificationRequest,
    ) -> Outcome<()> {
        match existing.status {
            status if status.is_in_flight() => Err(VerificationError::Conflict(
                "a verification request is already in progress".into(),
            )),
            VerificationStatus::ManualReview => Err(VerificationError::Conflict(
                "the current request is awaiting manual review".into(),
            )),
            VerificationStatus::Approved => {
                let active = store
                    .grants_for_subject(&existing.subject)?
                    .iter()
                    .any(|grant| grant.is_active && grant.request_id == existing.id);
                if active {
                    Err(VerificationError::Conflict(
                        "an active verification grant already exists".into(),
                    ))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    async fn run_pipeline(&self, request_id: Uuid, document: DocumentHandle) -> Outcome<()> {
        self.transition(
            request_id,
            VerificationStatus::Pending,
            VerificationStatus::ProcessingOcr,
            TransitionTrigger::Pipeline,
            |_, _, _| Ok(()),
        )
        .await?;

        let fingerprint = match document.fingerprint().await {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Could not fingerprint document");
                None
            }
        };

        let extraction = self.extractor.extract_text(&document).await;
        self.discard(&document).await;

        let text = match extraction {
            Ok(text) => text,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Extraction failed");
                self.record_extraction_failure(request_id, &e, fingerprint)
                    .await?;
                return Ok(());
            }
        };

        let document_type = self.classifier.classify(&text.text);
        let document_confidence = self.classifier.confidence(&text.text, document_type);
        if document_type == DocumentType::Unknown {
            info!(request_id = %request_id, "Unrecognized document type, matching anyway");
        }

        let fields = parse_fields(&text.text, text.confidence);
        debug!(
            request_id = %request_id,
            found = fields.found_count(),
            confidence = text.confidence,
            "Parsed document fields"
        );
        let extracted = IdentityRecord::from_extraction(&fields, text.source);

        let request = self
            .transition(
                request_id,
                VerificationStatus::ProcessingOcr,
                VerificationStatus::Matching,
                TransitionTrigger::Pipeline,
                move |_, request, _| {
                    request.extracted = Some(extracted);
                    request.document_type = Some(document_type);
                    request.document_confidence = Some(document_confidence);
                    request.document_fingerprint = fingerprint;
                    Ok(())
                },
            )
            .await?;

        self.complete_matching(request).await
    }

    async fn record_extraction_failure(
        &self,
        request_id: Uuid,
        failure: &ExtractionError,
        fingerprint: Option<String>,
    ) -> Outcome<()> {
        self.transition(
            request_id,
            VerificationStatus::ProcessingOcr,
            VerificationStatus::OcrFailed,
            TransitionTrigger::Pipeline,
            |tx, request, now| {
                request.error_message = Some(failure.user_message().to_string());
                request.document_fingerprint = fingerprint;
                let audit = AuditRecord::new(
                    AuditEventType::OcrFailed,
                    request.id,
                    request.subject.clone(),
                    AuditActor::System,
                    now,
                )
                .with_metadata(json!({ "reason": failure.to_string() }));
                tx.append_audit(&audit)?;
                Ok(())
            },
        )
        .await?;
        Ok(())
    }

    async fn complete_matching(&self, request: VerificationRequest) -> Outcome<()> {
        let result = match &request.extracted {
            Some(extracted) => self.match_with_retries(&request.claimed, extracted).await,
            None => Err(MatchingFault::Interrupted("no extracted record".into())),
        };

        let (decision, outcome) = match result {
            Ok(outcome) => (
                decide(&self.decision, &outcome, request.total_attempts),
                Some(outcome),
            ),
            Err(fault) => {
                error!(request_id = %request.id, error = %fault, "Matching failed after retries");
                (Decision::Escalate(EscalationReason::MatchingFault), None)
            }
        };

        let to = decision.status();
        self.transition(
            request.id,
            VerificationStatus::Matching,
            to,
            TransitionTrigger::Pipeline,
            |tx, request, now| {
                if let Some(outcome) = &outcome {
                    request.match_score = Some(outcome.score);
                    request.mismatches = Some(outcome.mismatches.clone());
                }
                request.escalation = decision.escalation();

                let mut audit = AuditRecord::new(
                    audit_event_for(to),
                    request.id,
                    request.subject.clone(),
                    AuditActor::System,
                    now,
                )
                .with_metadata(json!({
                    "score": request.match_score,
                    "mismatches": request
                        .mismatches
                        .iter()
                        .flatten()
                        .map(|m| m.reason.code())
                        .collect::<Vec<_>>(),
                    "escalation": request.escalation.map(|r| r.code()),
                    "attempt": request.total_attempts,
                }));

                if decision == Decision::Approve {
                    let grant = self.issue_grant(tx, request, now)?;
                    audit = audit.with_grant(grant.id);
                }
                tx.append_audit(&audit)?;
                Ok(())
            },
        )
        .await?;
        Ok(())
    }

    /// Runs matching off the async workers. Faults are retried up to the
    /// configured limit; the last fault is returned if every attempt fails.
    async fn match_with_retries(
        &self,
        claimed: &IdentityRecord,
        extracted: &IdentityRecord,
    ) -> Result<MatchOutcome, MatchingFault> {
        let attempts = self.decision.matching_retry_limit.saturating_add(1);
        let mut last_fault = MatchingFault::Interrupted("matching never ran".into());

        for attempt in 1..=attempts {
            let matcher = Arc::clone(&self.matcher);
            let claimed = claimed.clone();
            let extracted = extracted.clone();

            let result = tokio::task::spawn_blocking(move || {
                matcher.match_records(&claimed, &extracted)
            })
            .await
            .unwrap_or_else(|e| Err(MatchingFault::Interrupted(e.to_string())));

            match result {
                Ok(outcome) => return Ok(outcome),
                Err(fault) => {
                    warn!(attempt, attempts, error = %fault, "Matching attempt failed");
                    if attempt < attempts {
                        self.metrics.record_matching_retry();
                    }
                    last_fault = fault;
                }
            }
        }

        Err(last_fault)
    }

    /// Resolves a request waiting in manual review.
    pub async fn review(
        &self,
        request_id: Uuid,
        decision: ReviewDecision,
        notes: String,
        reviewer: &str,
    ) -> Outcome<VerificationRequest> {
        if notes.chars().count() > MAX_REVIEW_NOTES {
            return Err(VerificationError::Validation(format!(
                "review notes exceed {} characters",
                MAX_REVIEW_NOTES
            )));
        }

        let to = decision.status();
        self.transition(
            request_id,
            VerificationStatus::ManualReview,
            to,
            TransitionTrigger::Reviewer,
            |tx, request, now| {
                request.review = Some(ReviewRecord {
                    decision,
                    notes,
                    reviewer: reviewer.to_string(),
                    reviewed_at: now,
                });

                let mut audit = AuditRecord::new(
                    audit_event_for(to),
                    request.id,
                    request.subject.clone(),
                    AuditActor::Reviewer(reviewer.to_string()),
                    now,
                )
                .with_metadata(json!({ "escalation": request.escalation.map(|r| r.code()) }));

                if decision == ReviewDecision::Approved {
                    let grant = self.issue_grant(tx, request, now)?;
                    audit = audit.with_grant(grant.id);
                }
                tx.append_audit(&audit)?;
                Ok(())
            },
        )
        .await
    }

    pub fn get_status(&self, subject: &SubjectId) -> Outcome<RequestStatus> {
        let request = self
            .store
            .request_for_subject(subject)?
            .ok_or_else(|| VerificationError::NotFound("verification request".into()))?;

        let expires_at = match request.grant_id {
            Some(grant_id) => self
                .store
                .grants_for_subject(subject)?
                .into_iter()
                .find(|grant| grant.id == grant_id && grant.is_active)
                .map(|grant| grant.expires_at),
            None => None,
        };

        Ok(RequestStatus {
            request_id: request.id,
            status: request.status,
            progress: progress_of(&request),
            total_attempts: request.total_attempts,
            document_type: request.document_type,
            match_score: request.match_score,
            mismatches: request.mismatches.clone(),
            error_message: request.error_message.clone(),
            escalation: request.escalation,
            review_decision: request.review.as_ref().map(|review| review.decision),
            expires_at,
            updated_at: request.updated_at,
        })
    }

    pub fn get_request(&self, request_id: &Uuid) -> Outcome<VerificationRequest> {
        self.store
            .get_request(request_id)?
            .ok_or_else(|| VerificationError::NotFound(format!("verification request {}", request_id)))
    }

    /// Requests waiting for a reviewer, oldest first.
    pub fn list_pending_manual_review(&self) -> Outcome<Vec<ReviewQueueEntry>> {
        let mut queue: Vec<_> = self
            .store
            .list_requests()?
            .into_iter()
            .filter(|request| request.status == VerificationStatus::ManualReview)
            .map(|request| ReviewQueueEntry {
                request_id: request.id,
                subject: request.subject,
                claimed: request.claimed,
                extracted: request.extracted,
                match_score: request.match_score,
                mismatches: request.mismatches.unwrap_or_default(),
                escalation: request.escalation,
                total_attempts: request.total_attempts,
                queued_at: request.updated_at,
            })
            .collect();

        queue.sort_by_key(|entry| entry.queued_at);
        Ok(queue)
    }

    /// Settles requests left mid-pipeline by a previous process. Requests
    /// that never finished extraction fail as `OCR_FAILED` (the document is
    /// gone); requests already in `MATCHING` are matched again.
    pub async fn recover_interrupted(&self) -> Outcome<usize> {
        let mut recovered = 0;

        for request in self.store.list_requests()? {
            if !request.status.is_in_flight() {
                continue;
            }
            let Some(_guard) = InFlightGuard::acquire(&self.in_flight, request.id) else {
                continue;
            };

            let interrupted =
                ExtractionError::Unavailable("processing was interrupted, please resubmit".into());
            match request.status {
                VerificationStatus::Pending => {
                    self.transition(
                        request.id,
                        VerificationStatus::Pending,
                        VerificationStatus::ProcessingOcr,
                        TransitionTrigger::Pipeline,
                        |_, _, _| Ok(()),
                    )
                    .await?;
                    self.record_extraction_failure(request.id, &interrupted, None)
                        .await?;
                }
                VerificationStatus::ProcessingOcr => {
                    self.record_extraction_failure(request.id, &interrupted, None)
                        .await?;
                }
                _ => self.complete_matching(request.clone()).await?,
            }

            info!(request_id = %request.id, from = %request.status, "Recovered interrupted request");
            recovered += 1;
        }

        Ok(recovered)
    }

    /// Loads a request, checks it is in `expected`, applies `to` plus any
    /// side effects staged by `apply`, and commits everything together.
    async fn transition<F>(
        &self,
        request_id: Uuid,
        expected: VerificationStatus,
        to: VerificationStatus,
        trigger: TransitionTrigger,
        apply: F,
    ) -> Outcome<VerificationRequest>
    where
        F: FnOnce(&mut StoreTransaction<'_>, &mut VerificationRequest, DateTime<Utc>) -> Outcome<()>
            + Send,
    {
        let now = Utc::now();
        let mut tx = self.store.begin().await;

        let mut request = tx
            .store()
            .get_request(&request_id)?
            .ok_or_else(|| VerificationError::NotFound(format!("verification request {}", request_id)))?;

        let from = request.status;
        let invalid_state = || VerificationError::InvalidState {
            request_id,
            status: from.to_string(),
            expected: expected.to_string(),
        };
        if from != expected {
            return Err(invalid_state());
        }
        request
            .transition(to, trigger, now)
            .map_err(|_| invalid_state())?;

        apply(&mut tx, &mut request, now)?;
        tx.put_request(&request)?;
        // Must happen before the commit lock is released: anyone who can
        // observe the terminal status must also be able to claim the request.
        if to.is_terminal() {
            self.in_flight.lock().remove(&request_id);
        }
        tx.commit()?;

        info!(
            request_id = %request_id,
            subject = %request.subject,
            from = %from,
            to = %to,
            "Request transitioned"
        );
        self.metrics.record_outcome(to);
        self.publish(&request);

        Ok(request)
    }

    /// Stages a new grant for an approved request, superseding any active
    /// grant the subject holds for the same institution.
    fn issue_grant(
        &self,
        tx: &mut StoreTransaction<'_>,
        request: &mut VerificationRequest,
        now: DateTime<Utc>,
    ) -> Outcome<UserVerificationGrant> {
        let institution = request
            .claimed
            .institution()
            .as_text()
            .map(normalize)
            .unwrap_or_default();

        for mut previous in tx.store().grants_for_subject(&request.subject)? {
            if !previous.is_active || previous.institution != institution {
                continue;
            }
            previous.deactivate(DeactivationReason::Superseded, now);
            tx.put_grant(&previous)?;
            tx.append_audit(
                &AuditRecord::new(
                    AuditEventType::GrantSuperseded,
                    previous.request_id,
                    previous.subject.clone(),
                    AuditActor::System,
                    now,
                )
                .with_grant(previous.id),
            )?;
        }

        let grant = UserVerificationGrant::new(
            request,
            institution,
            now,
            Duration::days(self.decision.grant_validity_days),
        );
        tx.put_grant(&grant)?;
        request.grant_id = Some(grant.id);

        Ok(grant)
    }

    fn publish(&self, request: &VerificationRequest) {
        // No subscribers is not an error.
        let _ = self.events.send(ProgressEvent {
            request_id: request.id,
            subject: request.subject.clone(),
            progress: progress_of(request),
        });
    }

    async fn discard(&self, document: &DocumentHandle) {
        if let Err(e) = self.documents.discard(document).await {
            warn!(path = ?document.path, error = %e, "Failed to discard document");
        }
    }
}
