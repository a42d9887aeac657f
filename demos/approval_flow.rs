//! Walks one leave request through its approval chain.
//!
//! Configure with `APPROVALS_DB_PATH` and `APPROVALS_LOG`, e.g.
//! `APPROVALS_LOG=debug cargo run --example approval_flow`.

use request_approval::{
    chain::ChainConfig,
    config::Config,
    identity::{Department, Reviewer, Role, UserProfile},
    request::{LeaveType, RequestPayload, RequestType},
    resolver::{self, ReviewScope},
    service::ApprovalService,
    telemetry,
    timestamp::CalendarDate,
};
use std::sync::mpsc;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    telemetry::init(&config)?;

    let service = ApprovalService::new(config.open_store()?, ChainConfig::new());
    let store = service.store();

    let department = Department::parse("Production")?;
    let employee = UserProfile::new(
        "uid-emp-42",
        "EMP-42",
        "Farah Khan",
        "Line Supervisor",
        department.clone(),
        Role::Employee,
    );
    let hod = UserProfile::new(
        "uid-hod-7",
        "EMP-7",
        "Deepak Rao",
        "Head of Production",
        department.clone(),
        Role::Hod,
    );
    let hr = UserProfile::new(
        "uid-hr-3",
        "EMP-3",
        "Lata Iyer",
        "HR Executive",
        department,
        Role::HrAdmin,
    );
    for profile in [&employee, &hod, &hr] {
        store.put_user(profile)?;
    }

    let hod_reviewer = Reviewer::from_profile(&hod);
    let (tx, rx) = mpsc::channel();
    let subscription = service.watch_queue(
        &hod_reviewer,
        &ReviewScope::only(RequestType::Leave),
        move |queue| {
            let _ = tx.send(queue);
        },
    )?;

    let request = service.submit(
        &employee,
        RequestPayload::Leave {
            leave_type: LeaveType::Earned,
            start_date: CalendarDate::from_ymd(2025, 12, 22)
                .ok_or_else(|| anyhow::anyhow!("invalid start date"))?,
            end_date: CalendarDate::from_ymd(2025, 12, 31)
                .ok_or_else(|| anyhow::anyhow!("invalid end date"))?,
            reason: "Year end vacation".into(),
        },
    )?;

    service.approve(&hod_reviewer, &request.id, Some("Enjoy".into()))?;
    let request = service.approve(&Reviewer::from_profile(&hr), &request.id, None)?;
    println!("{} is now {}", request.id, request.status());

    while let Ok(queue) = rx.recv_timeout(Duration::from_millis(250)) {
        let mut queue = queue?;
        resolver::sort_by_name(&mut queue);
        for item in queue {
            let levels: Vec<String> = item
                .levels
                .iter()
                .map(|l| format!("L{} {}: {}", l.level, l.role, l.label))
                .collect();
            println!(
                "[queue] {} {} ({}) {}",
                item.request_id,
                item.employee.name,
                item.employee.designation,
                levels.join(", ")
            );
        }
    }
    subscription.unsubscribe();

    for notification in service.notifications(&employee.user_id)? {
        println!("[notice] {}", notification.message);
    }

    Ok(())
}
