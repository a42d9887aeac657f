use crate::identity::Role;
use crate::status::ApprovalStatus;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field `{0}` is empty")]
    EmptyField(&'static str),
    #[error("`{start}` must not be after `{end}`")]
    DateOrder {
        start: &'static str,
        end: &'static str,
    },
    #[error("`{0}` must be greater than zero")]
    ZeroQuantity(&'static str),
    #[error("Uniform request lists no items")]
    NoItems,
    #[error("Approval chain has no levels")]
    EmptyChain,
    #[error("Role {0} appears more than once in the approval chain")]
    DuplicateRole(Role),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Department is not set")]
    EmptyDepartment,
    #[error("Department `{0}` is a role name, not a department")]
    DepartmentIsRole(String),
    #[error("Unknown role `{0}`")]
    UnknownRole(String),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("Document {0} not found")]
    NotFound(String),
    #[error("Document was modified concurrently. Expected version {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("Request {0} not found")]
    NotFound(String),
    #[error("{role} in `{department}` is not an approver of request {request_id}")]
    PermissionDenied {
        request_id: String,
        role: Role,
        department: String,
    },
    #[error("Request is already {0}")]
    AlreadyFinal(ApprovalStatus),
    #[error("Approval level {0} has already been decided")]
    AlreadyDecided(u8),
    #[error("Request {0} was changed by another reviewer, reload and try again")]
    Conflict(String),
}
