mod common;

use chrono::{Duration, Utc};
use fleet_manager::Error;
use fleet_manager::models::{
    HandoverReason, HandoverSignature, JobStatus, LeaveType, LegReport, NewLeaveRequest,
};
use fleet_manager::services::{HandoverDetails, HandoverStep};
use fleet_manager::store::HandoverFilter;

use common::harness;

fn details(job_id: i32) -> HandoverDetails {
    HandoverDetails {
        job_id,
        location: "Applegreen, M1 Junction 10".to_string(),
        odometer: 42_150,
        reason: HandoverReason::StandardBreak,
        other_reason: None,
        notes: Some("keys in the glovebox".to_string()),
    }
}

fn signed() -> HandoverSignature {
    HandoverSignature::Signed("data:image/png;base64,iVBORw0KGgo".to_string())
}

#[tokio::test]
async fn handover_moves_the_job_to_the_new_driver() {
    let h = harness().await;
    let job = h.collected_job("AB12 CDE", &h.alice).await;
    let handovers = &h.fleet.handovers;

    let mut draft = handovers.begin(&h.alice, details(job.id)).await.unwrap();
    assert_eq!(draft.step(), HandoverStep::Drivers);
    assert_eq!(draft.from_driver().id, h.alice.id);

    handovers.choose_driver(&mut draft, h.bob.id).await.unwrap();
    assert_eq!(draft.step(), HandoverStep::Confirmation);

    draft
        .confirm(
            signed(),
            HandoverSignature::Skipped("hands full with the trade plates".to_string()),
        )
        .unwrap();
    assert_eq!(draft.step(), HandoverStep::Ready);

    let (handover, moved) = handovers.submit(&h.alice, draft).await.unwrap();
    assert_eq!(handover.from_driver_id, h.alice.id);
    assert_eq!(handover.from_driver, "Alice Driver");
    assert_eq!(handover.to_driver_id, h.bob.id);
    assert_eq!(handover.vehicle, "AB12 CDE (Ford Transit)");
    assert_eq!(handover.reason_text, "Standard Break");
    assert!(handover.from_signature.is_some());
    assert_eq!(handover.to_signature, None);
    assert_eq!(
        handover.to_signature_notes.as_deref(),
        Some("hands full with the trade plates")
    );

    assert_eq!(moved.driver_id, Some(h.bob.id));
    assert_eq!(moved.status, JobStatus::Collected);
    assert!(moved.last_handover_at.is_some());
    assert_eq!(moved.version, job.version + 1);

    // Custody now sits with Bob.
    h.fleet
        .jobs
        .complete_collection(&h.bob, job.id, LegReport::default())
        .await
        .unwrap();
    let err = h.fleet.jobs.start_delivery(&h.alice, job.id).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }), "got {err:?}");
}

#[tokio::test]
async fn only_jobs_in_progress_can_be_handed_over() {
    let h = harness().await;
    let pooled = h.job("POOL 1").await;

    let err = h
        .fleet
        .handovers
        .begin(&h.dispatcher, details(pooled.id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { field: "job_id", .. }), "got {err:?}");
}

#[tokio::test]
async fn only_the_holder_or_an_editor_starts_a_handover() {
    let h = harness().await;
    let job = h.collected_job("AB12 CDE", &h.alice).await;
    let handovers = &h.fleet.handovers;

    let err = handovers.begin(&h.bob, details(job.id)).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }), "got {err:?}");

    let draft = handovers.begin(&h.dispatcher, details(job.id)).await.unwrap();
    assert_eq!(draft.from_driver().id, h.alice.id);
}

#[tokio::test]
async fn drafts_are_submitted_by_the_holder_or_an_editor() {
    let h = harness().await;
    let job = h.collected_job("AB12 CDE", &h.alice).await;
    let handovers = &h.fleet.handovers;

    let mut draft = handovers.begin(&h.alice, details(job.id)).await.unwrap();
    handovers.choose_driver(&mut draft, h.bob.id).await.unwrap();
    draft.confirm(signed(), signed()).unwrap();

    let err = handovers.submit(&h.carol, draft.clone()).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }), "got {err:?}");
    let err = handovers.submit(&h.bob, draft.clone()).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }), "got {err:?}");

    let (handover, _) = handovers.submit(&h.dispatcher, draft).await.unwrap();
    assert_eq!(handover.recorded_by, h.dispatcher.id);
    assert_eq!(handover.from_driver_id, h.alice.id);
}

#[tokio::test]
async fn details_are_validated() {
    let h = harness().await;
    let job = h.collected_job("AB12 CDE", &h.alice).await;
    let handovers = &h.fleet.handovers;

    let mut other = details(job.id);
    other.reason = HandoverReason::Other;
    let err = handovers.begin(&h.alice, other.clone()).await.unwrap_err();
    assert!(matches!(err, Error::Validation { field: "other_reason", .. }), "got {err:?}");

    let mut blank = details(job.id);
    blank.location = "  ".to_string();
    let err = handovers.begin(&h.alice, blank).await.unwrap_err();
    assert!(matches!(err, Error::Validation { field: "location", .. }), "got {err:?}");

    other.other_reason = Some("  tachograph limit  ".to_string());
    let mut draft = handovers.begin(&h.alice, other).await.unwrap();
    handovers.choose_driver(&mut draft, h.carol.id).await.unwrap();
    draft.confirm(signed(), signed()).unwrap();
    let (handover, _) = handovers.submit(&h.alice, draft).await.unwrap();
    assert_eq!(handover.reason, HandoverReason::Other);
    assert_eq!(handover.reason_text, "tachograph limit");
}

#[tokio::test]
async fn receiving_driver_must_be_available() {
    let h = harness().await;
    let job = h.collected_job("AB12 CDE", &h.alice).await;
    let handovers = &h.fleet.handovers;
    let mut draft = handovers.begin(&h.alice, details(job.id)).await.unwrap();

    let err = handovers.choose_driver(&mut draft, h.alice.id).await.unwrap_err();
    assert!(matches!(err, Error::Validation { field: "to_driver", .. }), "got {err:?}");

    let err = handovers
        .choose_driver(&mut draft, h.dispatcher.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { field: "to_driver", .. }), "got {err:?}");

    let today = Utc::now().date_naive();
    let leave = h
        .fleet
        .leave
        .submit(
            &h.bob,
            NewLeaveRequest {
                driver_id: h.bob.id,
                leave_type: LeaveType::Holiday,
                start_date: today - Duration::days(1),
                end_date: today + Duration::days(1),
                notes: None,
            },
        )
        .await
        .unwrap();

    // Pending leave does not block.
    handovers.choose_driver(&mut draft, h.bob.id).await.unwrap();

    h.fleet.leave.approve(&h.admin, leave.id, None).await.unwrap();
    let err = handovers.choose_driver(&mut draft, h.bob.id).await.unwrap_err();
    assert!(matches!(err, Error::Validation { field: "to_driver", .. }), "got {err:?}");
    assert_eq!(draft.to_driver().map(|d| d.id), Some(h.bob.id));
}

#[tokio::test]
async fn signatures_must_be_captured_or_explained() {
    let h = harness().await;
    let job = h.collected_job("AB12 CDE", &h.alice).await;
    let handovers = &h.fleet.handovers;
    let mut draft = handovers.begin(&h.alice, details(job.id)).await.unwrap();

    let err = draft.confirm(signed(), signed()).unwrap_err();
    assert!(matches!(err, Error::Validation { field: "to_driver", .. }), "got {err:?}");

    handovers.choose_driver(&mut draft, h.bob.id).await.unwrap();

    let err = draft
        .confirm(HandoverSignature::Signed("scribble".to_string()), signed())
        .unwrap_err();
    assert!(matches!(err, Error::Validation { field: "from_signature", .. }), "got {err:?}");

    let err = draft
        .confirm(signed(), HandoverSignature::Skipped(" ".to_string()))
        .unwrap_err();
    assert!(matches!(err, Error::Validation { field: "to_signature", .. }), "got {err:?}");
    assert_eq!(draft.step(), HandoverStep::Confirmation);

    let err = handovers.submit(&h.alice, draft).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "got {err:?}");
}

#[tokio::test]
async fn stale_drafts_conflict() {
    let h = harness().await;
    let job = h.collected_job("AB12 CDE", &h.alice).await;
    let handovers = &h.fleet.handovers;

    let mut draft = handovers.begin(&h.alice, details(job.id)).await.unwrap();
    handovers.choose_driver(&mut draft, h.bob.id).await.unwrap();
    draft.confirm(signed(), signed()).unwrap();

    h.fleet
        .jobs
        .complete_collection(&h.alice, job.id, LegReport::default())
        .await
        .unwrap();

    let err = handovers.submit(&h.alice, draft).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }), "got {err:?}");

    let job = h.fleet.jobs.get_job(&h.alice, job.id).await.unwrap();
    assert_eq!(job.driver_id, Some(h.alice.id));
    let recorded = handovers
        .list(&h.dispatcher, &HandoverFilter::default())
        .await
        .unwrap();
    assert!(recorded.is_empty());
}

#[tokio::test]
async fn drivers_see_only_their_handovers() {
    let h = harness().await;
    let job = h.collected_job("AB12 CDE", &h.alice).await;
    let handovers = &h.fleet.handovers;

    let mut draft = handovers.begin(&h.alice, details(job.id)).await.unwrap();
    handovers.choose_driver(&mut draft, h.bob.id).await.unwrap();
    draft.confirm(signed(), signed()).unwrap();
    let (handover, _) = handovers.submit(&h.alice, draft).await.unwrap();

    for driver in [&h.alice, &h.bob] {
        let seen = handovers.list(driver, &HandoverFilter::default()).await.unwrap();
        assert_eq!(seen.len(), 1);
        handovers.get(driver, handover.id).await.unwrap();
    }

    assert!(
        handovers
            .list(&h.carol, &HandoverFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
    let err = handovers.get(&h.carol, handover.id).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }), "got {err:?}");

    let err = handovers
        .list(
            &h.carol,
            &HandoverFilter {
                driver_id: Some(h.alice.id),
                ..HandoverFilter::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }), "got {err:?}");

    let by_job = handovers
        .list(
            &h.dispatcher,
            &HandoverFilter {
                job_id: Some(job.id),
                ..HandoverFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(by_job.len(), 1);
}
