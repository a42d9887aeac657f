//! Approval routing: which requests a reviewer must act on, and how each
//! level reads on screen.
use super::identity::{Reviewer, Role, UserProfile};
use super::request::{Request, RequestType};
use super::status::ApprovalStatus;
use super::timestamp::TimeStamp;
use chrono::Utc;
use std::collections::HashMap;

/// The request types a review screen covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewScope {
    pub request_types: Vec<RequestType>,
}

impl ReviewScope {
    pub fn new(request_types: &[RequestType]) -> Self {
        Self {
            request_types: request_types.to_vec(),
        }
    }
    pub fn only(request_type: RequestType) -> Self {
        Self::new(&[request_type])
    }
    pub fn all() -> Self {
        Self::new(&RequestType::ALL)
    }
    pub fn covers(&self, request_type: RequestType) -> bool {
        self.request_types.contains(&request_type)
    }
}

/// Users keyed by user id and by employee id.
#[derive(Debug, Clone, Default)]
pub struct ProfileIndex {
    by_user_id: HashMap<String, UserProfile>,
    by_employee_id: HashMap<String, UserProfile>,
}

impl ProfileIndex {
    pub fn new(profiles: impl IntoIterator<Item = UserProfile>) -> Self {
        let mut index = Self::default();
        for profile in profiles {
            index
                .by_employee_id
                .insert(profile.employee_id.clone(), profile.clone());
            index.by_user_id.insert(profile.user_id.clone(), profile);
        }
        index
    }

    // user id is authoritative, employee id is the fallback
    pub fn lookup(&self, user_id: &str, employee_id: &str) -> Option<&UserProfile> {
        self.by_user_id
            .get(user_id)
            .or_else(|| self.by_employee_id.get(employee_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeView {
    pub employee_id: String,
    pub name: String,
    pub designation: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelView {
    pub level: u8,
    pub role: Role,
    pub status: ApprovalStatus,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewItem {
    pub request_id: String,
    pub request_type: RequestType,
    pub department: String,
    pub employee: EmployeeView,
    pub levels: Vec<LevelView>,
    pub reviewer_level: u8,
    pub awaiting_reviewer: bool, // reviewer's own level is still pending and the request is open
    pub overall: ApprovalStatus,
    pub created_at: TimeStamp<Utc>,
}

impl ReviewItem {
    /// Case-insensitive match on employee name, employee id or request id.
    pub fn matches(&self, search: &str) -> bool {
        let needle = search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [
            self.employee.name.as_str(),
            self.employee.employee_id.as_str(),
            self.request_id.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// True when the reviewer's role has an approver entry on the request and
/// both the request and that entry belong to the reviewer's department.
pub fn is_actionable(request: &Request, reviewer: &Reviewer) -> bool {
    match request.approver_for(reviewer.role) {
        Some(approver) => {
            request.department == reviewer.department && approver.department == reviewer.department
        }
        None => false,
    }
}

pub fn resolve(
    requests: &[Request],
    scope: &ReviewScope,
    reviewer: &Reviewer,
    profiles: &ProfileIndex,
) -> Vec<ReviewItem> {
    requests
        .iter()
        .filter(|request| scope.covers(request.request_type))
        .filter(|request| is_actionable(request, reviewer))
        .filter_map(|request| review_item(request, reviewer, profiles))
        .collect()
}

fn review_item(request: &Request, reviewer: &Reviewer, profiles: &ProfileIndex) -> Option<ReviewItem> {
    let own = request.approver_for(reviewer.role)?;
    let overall = request.status();

    let employee = match profiles.lookup(&request.user_id, &request.employee_id) {
        Some(profile) => EmployeeView {
            employee_id: profile.employee_id.clone(),
            name: profile.name.clone(),
            designation: profile.designation.clone(),
        },
        None => EmployeeView {
            employee_id: request.employee_id.clone(),
            name: request.employee_name.clone(),
            designation: String::new(),
        },
    };

    let levels = request
        .approvers
        .iter()
        .map(|approver| LevelView {
            level: approver.level,
            role: approver.role,
            status: approver.status,
            label: approver.status.label(),
        })
        .collect();

    Some(ReviewItem {
        request_id: request.id.clone(),
        request_type: request.request_type,
        department: request.department.to_string(),
        employee,
        levels,
        reviewer_level: own.level,
        awaiting_reviewer: own.status == ApprovalStatus::Pending && !overall.is_terminal(),
        overall,
        created_at: request.created_at.clone(),
    })
}

pub fn sort_by_name(items: &mut [ReviewItem]) {
    items.sort_by(|a, b| {
        a.employee
            .name
            .to_lowercase()
            .cmp(&b.employee.name.to_lowercase())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Department;
    use crate::request::Approver;

    fn request(id: &str, department: &str, approvers: Vec<Approver>) -> Request {
        Request {
            id: id.into(),
            request_type: RequestType::Resignation,
            department: Department::parse(department).unwrap(),
            employee_id: "E-7".into(),
            employee_name: "Ravi".into(),
            user_id: "u7".into(),
            payload_hash: "hash".into(),
            approvers,
            version: 0,
            created_at: TimeStamp::new(),
            updated_at: TimeStamp::new(),
        }
    }

    fn reviewer(role: Role, department: &str) -> Reviewer {
        Reviewer {
            user_id: "r1".into(),
            role,
            department: Department::parse(department).unwrap(),
        }
    }

    #[test]
    fn approver_scoped_to_another_department_is_not_actionable() {
        let it = Department::parse("IT").unwrap();
        let assembly = Department::parse("Assembly").unwrap();
        // request raised in IT, but the HOD entry points at Assembly
        let req = request("r", "IT", vec![Approver::new(1, Role::Hod, assembly)]);

        assert!(!is_actionable(&req, &reviewer(Role::Hod, "IT")));
        assert!(!is_actionable(&req, &reviewer(Role::Hod, "Assembly")));

        let req = request("r", "IT", vec![Approver::new(1, Role::Hod, it)]);
        assert!(is_actionable(&req, &reviewer(Role::Hod, "IT")));
    }

    #[test]
    fn unknown_employee_falls_back_to_request_fields() {
        let it = Department::parse("IT").unwrap();
        let req = request("r", "IT", vec![Approver::new(1, Role::Hod, it)]);

        let items = resolve(
            &[req],
            &ReviewScope::only(RequestType::Resignation),
            &reviewer(Role::Hod, "IT"),
            &ProfileIndex::default(),
        );

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].employee.name, "Ravi");
        assert_eq!(items[0].employee.designation, "");
        assert_eq!(items[0].levels[0].label, "Pending");
        assert!(items[0].awaiting_reviewer);
    }

    #[test]
    fn scope_excludes_other_request_types() {
        let it = Department::parse("IT").unwrap();
        let req = request("r", "IT", vec![Approver::new(1, Role::Hod, it)]);

        let items = resolve(
            &[req],
            &ReviewScope::only(RequestType::Leave),
            &reviewer(Role::Hod, "IT"),
            &ProfileIndex::default(),
        );
        assert!(items.is_empty());
    }

    #[test]
    fn search_and_sort() {
        let it = Department::parse("IT").unwrap();
        let mut a = request("req_a", "IT", vec![Approver::new(1, Role::Hod, it.clone())]);
        a.employee_name = "zoya".into();
        a.employee_id = "E-2".into();
        a.user_id = "u2".into();
        let b = request("req_b", "IT", vec![Approver::new(1, Role::Hod, it)]);

        let mut items = resolve(
            &[a, b],
            &ReviewScope::all(),
            &reviewer(Role::Hod, "IT"),
            &ProfileIndex::default(),
        );
        sort_by_name(&mut items);

        assert_eq!(items[0].employee.name, "Ravi");
        assert!(items[1].matches("ZOY"));
        assert!(items[1].matches("req_a"));
        assert!(!items[1].matches("ravi"));
    }
}
