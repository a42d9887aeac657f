//! Notifications sent to the submitter after each review decision
use super::status::ApprovalStatus;
use super::timestamp::TimeStamp;
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum NotificationKind {
    #[n(0)]
    LevelApproved,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
}

impl NotificationKind {
    // what the submitter is told after a decision moved the chain
    pub fn after_decision(decided: ApprovalStatus, overall: ApprovalStatus) -> Self {
        match (decided, overall) {
            (ApprovalStatus::Rejected, _) | (_, ApprovalStatus::Rejected) => Self::Rejected,
            (_, ApprovalStatus::Approved) => Self::Approved,
            _ => Self::LevelApproved,
        }
    }
}

// append only, `read` is the single field that changes after creation
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Notification {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub user_id: String, // recipient
    #[n(2)]
    pub request_id: String,
    #[n(3)]
    pub kind: NotificationKind,
    #[n(4)]
    pub message: String,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
    #[n(6)]
    pub read: bool,
}

impl Notification {
    pub fn new(
        id: String,
        user_id: String,
        request_id: String,
        kind: NotificationKind,
        message: String,
    ) -> Self {
        Self {
            id,
            user_id,
            request_id,
            kind,
            message,
            created_at: TimeStamp::new(),
            read: false,
        }
    }
}
