// tests/verification_flow.rs
mod common;

use chrono::{Duration, Utc};
use common::{
    asha_claims, TestContext, ASHA_BOMBAY_CERTIFICATE, ASHA_CERTIFICATE, UNRELATED_CERTIFICATE,
};
use credential_engine::{
    core::{
        matching::MismatchReason,
        ocr::{ManagedExtractor, PlainTextBackend},
        verification::{
            AuditEventType, CriticalMismatchPolicy, EscalationReason, ReviewDecision, SubjectId,
            VerificationStatus,
        },
    },
    utils::{config::Config, error::VerificationError},
};
use std::sync::Arc;

#[test_log::test(tokio::test)]
async fn matching_certificate_is_approved_for_a_year() {
    let ctx = TestContext::new();
    let subject = SubjectId::new("asha");
    let submitted_at = Utc::now();

    let request_id = ctx
        .service
        .submit(&subject, asha_claims(), ctx.upload("asha.txt", ASHA_CERTIFICATE))
        .await
        .unwrap();
    let status = ctx.wait_terminal(&subject).await;

    assert_eq!(status.request_id, request_id);
    assert_eq!(status.status, VerificationStatus::Approved);
    assert!(status.match_score.unwrap() >= ctx.config.decision.approve_threshold);
    assert_eq!(status.mismatches.as_deref(), Some(&[][..]));

    let expires_at = status.expires_at.expect("approved request has a grant");
    assert!(expires_at >= submitted_at + Duration::days(365));
    assert!(expires_at <= Utc::now() + Duration::days(365));

    let audit = ctx.store.audit_for_request(&request_id).unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].event_type, AuditEventType::Approved);
}

#[tokio::test]
async fn institution_mismatch_goes_to_manual_review() {
    let ctx = TestContext::new();
    let subject = SubjectId::new("asha");

    let request_id = ctx
        .service
        .submit(
            &subject,
            asha_claims(),
            ctx.upload("bombay.txt", ASHA_BOMBAY_CERTIFICATE),
        )
        .await
        .unwrap();
    let status = ctx.wait_terminal(&subject).await;

    assert_eq!(status.status, VerificationStatus::ManualReview);
    assert_eq!(status.escalation, Some(EscalationReason::CriticalFieldMismatch));
    assert!(status.expires_at.is_none());

    let mismatches = status.mismatches.unwrap();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].reason, MismatchReason::InstitutionMismatch);
    assert_eq!(mismatches[0].reason.code(), "INSTITUTION_MISMATCH");
    assert_eq!(mismatches[0].ocr_value.as_deref(), Some("IIT Bombay"));

    let queue = ctx.service.list_pending_manual_review().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].request_id, request_id);

    let reviewed = ctx
        .service
        .review(
            request_id,
            ReviewDecision::Rejected,
            "institution does not match".into(),
            "reviewer-1",
        )
        .await
        .unwrap();
    assert_eq!(reviewed.status, VerificationStatus::Rejected);
    assert!(ctx.store.grants_for_subject(&subject).unwrap().is_empty());
}

#[tokio::test]
async fn institution_mismatch_rejected_under_reject_policy() {
    let mut config = Config::default();
    config.decision.critical_mismatch_policy = CriticalMismatchPolicy::Reject;
    let ctx = TestContext::with_extractor(
        config,
        Arc::new(ManagedExtractor::new(
            PlainTextBackend,
            1,
            std::time::Duration::from_secs(5),
        )),
    );
    let subject = SubjectId::new("asha");

    ctx.service
        .submit(
            &subject,
            asha_claims(),
            ctx.upload("bombay.txt", ASHA_BOMBAY_CERTIFICATE),
        )
        .await
        .unwrap();

    let status = ctx.wait_terminal(&subject).await;
    assert_eq!(status.status, VerificationStatus::Rejected);
}

#[tokio::test]
async fn unrelated_certificate_is_rejected_and_resubmittable() {
    let ctx = TestContext::new();
    let subject = SubjectId::new("asha");

    ctx.service
        .submit(
            &subject,
            asha_claims(),
            ctx.upload("other.txt", UNRELATED_CERTIFICATE),
        )
        .await
        .unwrap();
    let status = ctx.wait_terminal(&subject).await;
    assert_eq!(status.status, VerificationStatus::Rejected);
    assert!(status.match_score.unwrap() < ctx.config.decision.reject_floor);

    ctx.service
        .submit(&subject, asha_claims(), ctx.upload("asha.txt", ASHA_CERTIFICATE))
        .await
        .unwrap();
    let status = ctx.wait_terminal(&subject).await;
    assert_eq!(status.status, VerificationStatus::Approved);
    assert_eq!(status.total_attempts, 2);
}

#[tokio::test]
async fn unavailable_ocr_fails_and_subject_may_resubmit() {
    let ctx = TestContext::unavailable_ocr();
    let subject = SubjectId::new("asha");

    let document = ctx.upload("asha.txt", ASHA_CERTIFICATE);
    let path = document.path.clone();
    let first = ctx
        .service
        .submit(&subject, asha_claims(), document)
        .await
        .unwrap();

    let status = ctx.wait_terminal(&subject).await;
    assert_eq!(status.status, VerificationStatus::OcrFailed);
    assert!(!status.error_message.unwrap_or_default().is_empty());
    assert!(!path.exists());

    let second = ctx
        .service
        .submit(&subject, asha_claims(), ctx.upload("again.txt", ASHA_CERTIFICATE))
        .await
        .unwrap();
    assert_eq!(first, second);

    let status = ctx.wait_terminal(&subject).await;
    assert_eq!(status.status, VerificationStatus::OcrFailed);
    assert_eq!(status.total_attempts, 2);
    assert_eq!(ctx.metrics.snapshot().ocr_failures, 2);
}

#[tokio::test]
async fn attempts_never_decrease_and_limit_escalates() {
    let ctx = TestContext::unavailable_ocr();
    let subject = SubjectId::new("asha");
    let mut previous = 0;

    for round in 0..5 {
        ctx.service
            .submit(
                &subject,
                asha_claims(),
                ctx.upload(&format!("doc-{}.txt", round), ASHA_CERTIFICATE),
            )
            .await
            .unwrap();
        let status = ctx.wait_terminal(&subject).await;
        assert!(status.total_attempts > previous);
        previous = status.total_attempts;
    }
    assert_eq!(previous, 5);

    // Past the automatic limit a poor match is escalated instead of rejected.
    let ctx = TestContext::new();
    for round in 0..4 {
        ctx.service
            .submit(
                &subject,
                asha_claims(),
                ctx.upload(&format!("other-{}.txt", round), UNRELATED_CERTIFICATE),
            )
            .await
            .unwrap();
        ctx.wait_terminal(&subject).await;
    }
    let status = ctx.service.get_status(&subject).unwrap();
    assert_eq!(status.total_attempts, 4);
    assert_eq!(status.status, VerificationStatus::ManualReview);
    assert_eq!(status.escalation, Some(EscalationReason::AttemptLimit));
}

#[tokio::test]
async fn approved_subject_cannot_resubmit_while_grant_is_active() {
    let ctx = TestContext::new();
    let subject = SubjectId::new("asha");

    ctx.service
        .submit(&subject, asha_claims(), ctx.upload("a.txt", ASHA_CERTIFICATE))
        .await
        .unwrap();
    assert_eq!(
        ctx.wait_terminal(&subject).await.status,
        VerificationStatus::Approved
    );

    let document = ctx.upload("b.txt", ASHA_CERTIFICATE);
    let path = document.path.clone();
    let err = ctx
        .service
        .submit(&subject, asha_claims(), document)
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::Conflict(_)));
    assert!(!path.exists());
}

#[tokio::test]
async fn sweep_expires_grant_exactly_once() {
    let ctx = TestContext::new();
    let subject = SubjectId::new("asha");

    let request_id = ctx
        .service
        .submit(&subject, asha_claims(), ctx.upload("a.txt", ASHA_CERTIFICATE))
        .await
        .unwrap();
    ctx.wait_terminal(&subject).await;

    let later = Utc::now() + Duration::days(366);
    assert_eq!(ctx.sweeper.sweep_at(later).await.unwrap(), 1);
    assert_eq!(ctx.sweeper.sweep_at(later).await.unwrap(), 0);

    let expiries: Vec<_> = ctx
        .store
        .audit_for_request(&request_id)
        .unwrap()
        .into_iter()
        .filter(|record| record.event_type == AuditEventType::Expired)
        .collect();
    assert_eq!(expiries.len(), 1);

    let status = ctx.service.get_status(&subject).unwrap();
    assert_eq!(status.status, VerificationStatus::Expired);
    assert!(status.expires_at.is_none());
    assert!(ctx.sweeper.needs_reverification(&subject, "IIT Delhi").unwrap());

    // An expired subject may verify again.
    ctx.service
        .submit(&subject, asha_claims(), ctx.upload("b.txt", ASHA_CERTIFICATE))
        .await
        .unwrap();
    let status = ctx.wait_terminal(&subject).await;
    assert_eq!(status.status, VerificationStatus::Approved);
    assert_eq!(status.total_attempts, 2);
}

#[tokio::test]
async fn submissions_from_different_subjects_run_independently() {
    let ctx = TestContext::new();
    let subjects: Vec<_> = (0..4).map(|i| SubjectId::new(format!("user-{}", i))).collect();

    for (i, subject) in subjects.iter().enumerate() {
        ctx.service
            .submit(
                subject,
                asha_claims(),
                ctx.upload(&format!("cert-{}.txt", i), ASHA_CERTIFICATE),
            )
            .await
            .unwrap();
    }

    for subject in &subjects {
        assert_eq!(
            ctx.wait_terminal(subject).await.status,
            VerificationStatus::Approved
        );
    }
    assert_eq!(ctx.store.list_grants().unwrap().len(), 4);
}
