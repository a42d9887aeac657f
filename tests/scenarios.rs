use anyhow::Context;
use request_approval::{
    chain::ChainConfig,
    error::ApprovalError,
    identity::{Department, Reviewer, Role, UserProfile},
    notification::NotificationKind,
    request::{RequestPayload, RequestType, UniformItem},
    resolver::ReviewScope,
    service::ApprovalService,
    status::ApprovalStatus,
    store::{RequestQuery, RequestStore},
    timestamp::CalendarDate,
};
use std::sync::{Arc, Barrier, mpsc};
use std::time::Duration;
use tempfile::{TempDir, tempdir}; // Use for test db cleanup.

// Each test opens its own database on temp, sled holds a file lock per db.
fn open_service(temp_dir: &TempDir) -> anyhow::Result<ApprovalService> {
    let db = sled::open(temp_dir.path().join("approvals.db"))?;
    let store = RequestStore::new(Arc::new(db)).with_watch_poll(Duration::from_millis(10));
    Ok(ApprovalService::new(store, ChainConfig::new()))
}

fn profile(user_id: &str, name: &str, department: &str, role: Role) -> anyhow::Result<UserProfile> {
    Ok(UserProfile::new(
        user_id,
        &format!("EMP-{user_id}"),
        name,
        "Engineer",
        Department::parse(department)?,
        role,
    ))
}

fn resignation() -> RequestPayload {
    RequestPayload::Resignation {
        last_working_date: CalendarDate::from_ymd(2025, 9, 30).unwrap(),
        notice_period_days: 30,
        reason_for_leaving: "Relocating".into(),
    }
}

fn approval_error(err: &anyhow::Error) -> Option<&ApprovalError> {
    err.downcast_ref::<ApprovalError>()
}

/// Employee in IT submits a resignation, HR Admin of IT has already approved.
fn scenario_a_setup(service: &ApprovalService) -> anyhow::Result<(String, UserProfile)> {
    let employee = profile("emp1", "Meera", "IT", Role::Employee)?;
    let hr = profile("hr1", "Kiran", "IT", Role::HrAdmin)?;
    service.store().put_user(&employee)?;

    let request = service.submit(&employee, resignation())?;
    service
        .approve(&Reviewer::from_profile(&hr), &request.id, None)
        .context("HR Admin approval failed: ")?;

    Ok((request.id, employee))
}

#[test]
fn scenario_a_only_the_departments_hod_sees_the_request() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir)?;
    let (request_id, _) = scenario_a_setup(&service)?;

    let it_hod = Reviewer::from_profile(&profile("hod1", "Anil", "IT", Role::Hod)?);
    let assembly_hod = Reviewer::from_profile(&profile("hod2", "Bela", "Assembly", Role::Hod)?);
    let scope = ReviewScope::only(RequestType::Resignation);

    let queue = service.review_queue(&it_hod, &scope)?;
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].request_id, request_id);
    assert_eq!(queue[0].employee.name, "Meera");
    assert_eq!(queue[0].reviewer_level, 1);
    assert!(queue[0].awaiting_reviewer);
    let labels: Vec<&str> = queue[0].levels.iter().map(|l| l.label).collect();
    assert_eq!(labels, vec!["Pending", "Approved"]);

    assert!(service.review_queue(&assembly_hod, &scope)?.is_empty());

    Ok(())
}

#[test]
fn scenario_b_last_approval_approves_the_request() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir)?;
    let (request_id, employee) = scenario_a_setup(&service)?;
    let hod = Reviewer::from_profile(&profile("hod1", "Anil", "IT", Role::Hod)?);

    let request = service.approve(&hod, &request_id, Some("All clear".into()))?;

    let level_one = request.approver_for(Role::Hod).unwrap();
    assert_eq!(level_one.status, ApprovalStatus::Approved);
    assert_eq!(level_one.decided_by.as_deref(), Some("hod1"));
    assert_eq!(level_one.comment.as_deref(), Some("All clear"));
    assert_eq!(request.status(), ApprovalStatus::Approved);
    assert_eq!(request.version, 2);

    let kinds: Vec<NotificationKind> = service
        .notifications(&employee.user_id)?
        .iter()
        .map(|n| n.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::LevelApproved, NotificationKind::Approved]
    );

    Ok(())
}

#[test]
fn scenario_c_rejection_is_immediate_and_final() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir)?;
    let (request_id, employee) = scenario_a_setup(&service)?;
    let hod = Reviewer::from_profile(&profile("hod1", "Anil", "IT", Role::Hod)?);

    let request = service.reject(&hod, &request_id, Some("Please discuss first".into()))?;

    assert_eq!(request.status(), ApprovalStatus::Rejected);
    assert_eq!(
        request.approver_for(Role::HrAdmin).unwrap().status,
        ApprovalStatus::Approved
    );

    // terminal, nothing reopens it
    let err = service.approve(&hod, &request_id, None).unwrap_err();
    assert_eq!(
        approval_error(&err),
        Some(&ApprovalError::AlreadyFinal(ApprovalStatus::Rejected))
    );
    assert_eq!(service.request(&request_id)?.status(), ApprovalStatus::Rejected);

    let last = service.notifications(&employee.user_id)?.pop().unwrap();
    assert_eq!(last.kind, NotificationKind::Rejected);
    assert!(!last.read);

    Ok(())
}

#[test]
fn scenario_d_requests_without_a_hod_level_never_reach_a_hod() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir)?;

    for department in ["IT", "Assembly", "Stores"] {
        let employee = profile(&format!("emp-{department}"), "Sam", department, Role::Employee)?;
        service.submit(
            &employee,
            RequestPayload::Uniform {
                items: vec![UniformItem {
                    item: "Safety shoes".into(),
                    size: "9".into(),
                    quantity: 1,
                }],
            },
        )?;
    }

    for department in ["IT", "Assembly", "Stores"] {
        let hod = Reviewer::from_profile(&profile("hod", "Anil", department, Role::Hod)?);
        assert!(service.review_queue(&hod, &ReviewScope::all())?.is_empty());

        let pa = Reviewer::from_profile(&profile("pa", "Uma", department, Role::PersonnelAdmin)?);
        assert_eq!(service.review_queue(&pa, &ReviewScope::all())?.len(), 1);
    }

    Ok(())
}

#[test]
fn scenario_e_concurrent_approvals_make_one_transition() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = Arc::new(open_service(&temp_dir)?);
    let employee = profile("emp1", "Meera", "IT", Role::Employee)?;
    let request = service.submit(&employee, resignation())?;
    let hod = Reviewer::from_profile(&profile("hod1", "Anil", "IT", Role::Hod)?);

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = service.clone();
            let barrier = barrier.clone();
            let hod = hod.clone();
            let request_id = request.id.clone();
            std::thread::spawn(move || {
                barrier.wait();
                service.approve(&hod, &request_id, None)
            })
        })
        .collect();

    let results: Vec<anyhow::Result<_>> = handles
        .into_iter()
        .map(|handle| handle.join().expect("approver thread panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(
            approval_error(err),
            Some(ApprovalError::Conflict(_)) | Some(ApprovalError::AlreadyDecided(1))
        ));
    }

    let stored = service.request(&request.id)?;
    assert_eq!(stored.version, 1);
    assert_eq!(
        stored.approver_for(Role::Hod).unwrap().status,
        ApprovalStatus::Approved
    );
    assert_eq!(stored.status(), ApprovalStatus::Pending);
    assert_eq!(service.notifications(&employee.user_id)?.len(), 1);

    Ok(())
}

#[test]
fn reviewer_outside_the_department_is_denied() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir)?;
    let employee = profile("emp1", "Meera", "IT", Role::Employee)?;
    let request = service.submit(&employee, resignation())?;

    let outsider = Reviewer::from_profile(&profile("hod2", "Bela", "Assembly", Role::Hod)?);
    let err = service.approve(&outsider, &request.id, None).unwrap_err();
    assert!(matches!(
        approval_error(&err),
        Some(ApprovalError::PermissionDenied { .. })
    ));

    let reception = Reviewer::from_profile(&profile("rc1", "Tara", "IT", Role::Reception)?);
    let err = service.reject(&reception, &request.id, None).unwrap_err();
    assert!(matches!(
        approval_error(&err),
        Some(ApprovalError::PermissionDenied { .. })
    ));

    let err = service.approve(&outsider, "req_unknown", None).unwrap_err();
    assert_eq!(
        approval_error(&err),
        Some(&ApprovalError::NotFound("req_unknown".into()))
    );

    // nothing was written
    assert_eq!(service.request(&request.id)?.version, 0);

    Ok(())
}

#[test]
fn deciding_the_same_level_twice_fails() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir)?;
    let employee = profile("emp1", "Meera", "IT", Role::Employee)?;
    let request = service.submit(&employee, resignation())?;
    let hod = Reviewer::from_profile(&profile("hod1", "Anil", "IT", Role::Hod)?);

    service.approve(&hod, &request.id, None)?;
    let err = service.reject(&hod, &request.id, None).unwrap_err();
    assert_eq!(approval_error(&err), Some(&ApprovalError::AlreadyDecided(1)));

    let stored = service.request(&request.id)?;
    assert_eq!(stored.status(), ApprovalStatus::Pending);
    assert!(!service.review_queue(&hod, &ReviewScope::all())?[0].awaiting_reviewer);

    Ok(())
}

#[test]
fn submitted_payload_is_retrievable() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir)?;
    let employee = profile("emp1", "Meera", "IT", Role::Employee)?;

    let request = service.submit(&employee, resignation())?;

    assert_eq!(request.request_type, RequestType::Resignation);
    assert_eq!(service.payload_of(&request)?, resignation());
    assert_eq!(service.my_requests("emp1")?.len(), 1);
    assert!(service.my_requests("someone-else")?.is_empty());

    let invalid = RequestPayload::General {
        subject: "".into(),
        details: "no subject".into(),
    };
    assert!(service.submit(&employee, invalid).is_err());
    assert_eq!(service.my_requests("emp1")?.len(), 1);

    Ok(())
}

#[test]
fn watched_queue_follows_new_requests() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir)?;
    let hod = Reviewer::from_profile(&profile("hod1", "Anil", "IT", Role::Hod)?);
    let (tx, rx) = mpsc::channel();

    let subscription = service.watch_queue(&hod, &ReviewScope::all(), move |queue| {
        let _ = tx.send(queue.map(|items| items.len()));
    })?;
    assert!(subscription.is_active());

    let initial = rx.recv_timeout(Duration::from_secs(5))??;
    assert_eq!(initial, 0);

    let employee = profile("emp1", "Meera", "IT", Role::Employee)?;
    service.submit(&employee, resignation())?;

    let mut seen = 0;
    while seen == 0 {
        seen = rx.recv_timeout(Duration::from_secs(5))??;
    }
    assert_eq!(seen, 1);

    subscription.unsubscribe();
    // released: the callback, and its sender, are gone
    while rx.recv_timeout(Duration::from_secs(5)).is_ok() {}
    assert!(matches!(
        rx.recv_timeout(Duration::from_millis(10)),
        Err(mpsc::RecvTimeoutError::Disconnected)
    ));

    Ok(())
}

#[test]
fn corrupt_request_record_reaches_the_subscriber_as_an_error() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("approvals.db"))?);
    let store = RequestStore::new(db.clone()).with_watch_poll(Duration::from_millis(10));
    let (tx, rx) = mpsc::channel();

    let subscription = store.subscribe(RequestQuery::all(), move |snapshot| {
        let _ = tx.send(snapshot.map(|requests| requests.len()));
    })?;
    assert_eq!(rx.recv_timeout(Duration::from_secs(5))??, 0);

    db.insert("request/broken", &b"\xff\x00not cbor"[..])?;
    let broken = rx.recv_timeout(Duration::from_secs(5))?;
    assert!(broken.is_err());

    // the watcher survives the failed snapshot and recovers once the record is gone
    db.remove("request/broken")?;
    assert_eq!(rx.recv_timeout(Duration::from_secs(5))??, 0);
    assert!(subscription.is_active());

    subscription.unsubscribe();
    Ok(())
}

#[test]
fn corrupt_user_record_fails_the_watched_queue_until_removed() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("approvals.db"))?);
    let store = RequestStore::new(db.clone()).with_watch_poll(Duration::from_millis(10));
    let service = ApprovalService::new(store, ChainConfig::new());
    let hod = Reviewer::from_profile(&profile("hod1", "Anil", "IT", Role::Hod)?);
    let employee = profile("emp1", "Meera", "IT", Role::Employee)?;
    let (tx, rx) = mpsc::channel();

    let subscription = service.watch_queue(&hod, &ReviewScope::all(), move |queue| {
        let _ = tx.send(queue.map(|items| items.len()));
    })?;
    assert_eq!(rx.recv_timeout(Duration::from_secs(5))??, 0);

    db.insert("user/broken", &b"\xff\x00not cbor"[..])?;
    service.submit(&employee, resignation())?;
    let broken = rx.recv_timeout(Duration::from_secs(5))?;
    assert!(broken.is_err());

    db.remove("user/broken")?;
    service.submit(&employee, resignation())?;
    assert_eq!(rx.recv_timeout(Duration::from_secs(5))??, 2);
    assert!(subscription.is_active());

    subscription.unsubscribe();
    Ok(())
}
