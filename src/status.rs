//! Status aggregation for approval chains.
//!
//! The overall status of a request is never stored. It is always derived from
//! the approver chain with [`aggregate`], so per-level and overall state cannot
//! drift apart.
use crate::request::Approver;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum ApprovalStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
}

impl ApprovalStatus {
    /// Parses a stored status value, ignoring case and surrounding whitespace.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Lowercase tag as written by the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Display-cased label shown to reviewers.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a raw or already display-cased status to its display label.
pub fn normalize_label(raw: &str) -> Option<&'static str> {
    ApprovalStatus::parse(raw).map(|status| status.label())
}

/// Derives the overall status of a chain.
///
/// Any rejection wins immediately. The chain is approved only when it is
/// non-empty and every level approved.
pub fn aggregate(approvers: &[Approver]) -> ApprovalStatus {
    if approvers
        .iter()
        .any(|a| a.status == ApprovalStatus::Rejected)
    {
        return ApprovalStatus::Rejected;
    }
    if !approvers.is_empty()
        && approvers
            .iter()
            .all(|a| a.status == ApprovalStatus::Approved)
    {
        return ApprovalStatus::Approved;
    }
    ApprovalStatus::Pending
}

pub fn pending_levels(approvers: &[Approver]) -> Vec<u8> {
    let mut levels: Vec<u8> = approvers
        .iter()
        .filter(|a| a.status == ApprovalStatus::Pending)
        .map(|a| a.level)
        .collect();
    levels.sort_unstable();
    levels
}
