//! Service layer API for request submission and review decisions
use super::chain::ChainConfig;
use super::error::{ApprovalError, StoreError};
use super::identity::{Reviewer, UserProfile};
use super::notification::{Notification, NotificationKind};
use super::request::{NewRequest, Request, RequestPayload};
use super::resolver::{self, ProfileIndex, ReviewItem, ReviewScope};
use super::status::ApprovalStatus;
use super::store::{RequestQuery, RequestStore, Subscription};
use super::timestamp::TimeStamp;
use super::utils;
use anyhow::Context;
use tracing::{error, info, warn};

pub struct ApprovalService {
    store: RequestStore,
    chains: ChainConfig,
}

impl ApprovalService {
    pub fn new(store: RequestStore, chains: ChainConfig) -> Self {
        Self { store, chains }
    }

    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    /// Submit a request on behalf of `profile`, seeding the configured chain
    pub fn submit(&self, profile: &UserProfile, payload: RequestPayload) -> anyhow::Result<Request> {
        let approvers = self
            .chains
            .chain_for(payload.request_type())
            .seed(&profile.department);
        let new_request = NewRequest::from_profile(profile, payload, approvers);

        let request = self.store.add(new_request)?;
        info!(
            request_id = %request.id,
            request_type = %request.request_type,
            department = %request.department,
            levels = request.approvers.len(),
            "request submitted"
        );
        Ok(request)
    }

    /// Approve the reviewer's level. The request becomes approved once no level is pending.
    pub fn approve(
        &self,
        reviewer: &Reviewer,
        request_id: &str,
        comment: Option<String>,
    ) -> anyhow::Result<Request> {
        self.decide(reviewer, request_id, ApprovalStatus::Approved, comment)
    }

    /// Reject the reviewer's level, which rejects the whole request.
    pub fn reject(
        &self,
        reviewer: &Reviewer,
        request_id: &str,
        comment: Option<String>,
    ) -> anyhow::Result<Request> {
        self.decide(reviewer, request_id, ApprovalStatus::Rejected, comment)
    }

    fn decide(
        &self,
        reviewer: &Reviewer,
        request_id: &str,
        decision: ApprovalStatus,
        comment: Option<String>,
    ) -> anyhow::Result<Request> {
        let current = self
            .store
            .get(request_id)?
            .ok_or_else(|| ApprovalError::NotFound(request_id.to_string()))?;

        if !resolver::is_actionable(&current, reviewer) {
            warn!(
                request_id,
                reviewer = %reviewer.user_id,
                role = %reviewer.role,
                department = %reviewer.department,
                "reviewer is not an approver of this request"
            );
            return Err(permission_denied(request_id, reviewer).into());
        }

        let overall = current.status();
        if overall.is_terminal() {
            return Err(ApprovalError::AlreadyFinal(overall).into());
        }

        let mut next = current.clone();
        let approver = next
            .approver_for_mut(reviewer.role)
            .ok_or_else(|| permission_denied(request_id, reviewer))?;
        if approver.status != ApprovalStatus::Pending {
            return Err(ApprovalError::AlreadyDecided(approver.level).into());
        }
        approver.status = decision;
        approver.decided_by = Some(reviewer.user_id.clone());
        approver.decided_at = Some(TimeStamp::new());
        approver.comment = comment;
        let level = approver.level;

        let updated = match self.store.update_if(next, current.version) {
            Ok(updated) => updated,
            Err(err) => {
                if let Some(StoreError::VersionConflict { expected, actual }) =
                    err.downcast_ref::<StoreError>()
                {
                    warn!(request_id, expected, actual, "lost a concurrent decision");
                    return Err(ApprovalError::Conflict(request_id.to_string()).into());
                }
                return Err(err.context(format!("failed to record decision on {request_id}")));
            }
        };

        let overall = updated.status();
        info!(
            request_id,
            level,
            decision = %decision,
            overall = %overall,
            reviewer = %reviewer.user_id,
            "decision recorded"
        );

        // the decision stands even if the submitter cannot be told about it
        if let Err(err) = self.notify(&updated, decision, level) {
            error!(request_id, error = %err, "failed to notify submitter");
        }

        Ok(updated)
    }

    fn notify(&self, request: &Request, decision: ApprovalStatus, level: u8) -> anyhow::Result<()> {
        let overall = request.status();
        let kind = NotificationKind::after_decision(decision, overall);
        let message = match kind {
            NotificationKind::LevelApproved => format!(
                "Your {} request was approved at level {level}",
                request.request_type
            ),
            NotificationKind::Approved => {
                format!("Your {} request has been approved", request.request_type)
            }
            NotificationKind::Rejected => {
                format!("Your {} request has been rejected", request.request_type)
            }
        };
        let notification = Notification::new(
            utils::new_notification_id()?,
            request.user_id.clone(),
            request.id.clone(),
            kind,
            message,
        );
        self.store.append_notification(&notification)
    }

    /// Requests the reviewer acts on within `scope`, in store order.
    pub fn review_queue(&self, reviewer: &Reviewer, scope: &ReviewScope) -> anyhow::Result<Vec<ReviewItem>> {
        let requests = self
            .store
            .query(&queue_query(reviewer, scope))
            .context("failed to load review queue")?;
        let profiles = ProfileIndex::new(self.store.users()?);
        Ok(resolver::resolve(&requests, scope, reviewer, &profiles))
    }

    /// Live review queue. `on_change` receives the resolved queue after every change
    /// until the returned subscription is released.
    pub fn watch_queue<F>(
        &self,
        reviewer: &Reviewer,
        scope: &ReviewScope,
        mut on_change: F,
    ) -> anyhow::Result<Subscription>
    where
        F: FnMut(anyhow::Result<Vec<ReviewItem>>) + Send + 'static,
    {
        let store = self.store.clone();
        let watcher = reviewer.clone();
        let watched = scope.clone();

        self.store
            .subscribe(queue_query(reviewer, scope), move |snapshot| {
                let resolved = snapshot.and_then(|requests| {
                    let profiles = ProfileIndex::new(store.users()?);
                    Ok(resolver::resolve(&requests, &watched, &watcher, &profiles))
                });
                on_change(resolved);
            })
    }

    pub fn request(&self, request_id: &str) -> anyhow::Result<Request> {
        self.store
            .get(request_id)?
            .ok_or_else(|| ApprovalError::NotFound(request_id.to_string()).into())
    }

    pub fn payload_of(&self, request: &Request) -> anyhow::Result<RequestPayload> {
        self.store
            .payload(&request.payload_hash)?
            .ok_or_else(|| StoreError::NotFound(request.payload_hash.clone()).into())
    }

    pub fn my_requests(&self, user_id: &str) -> anyhow::Result<Vec<Request>> {
        self.store.query(&RequestQuery::all().submitted_by(user_id))
    }

    pub fn notifications(&self, user_id: &str) -> anyhow::Result<Vec<Notification>> {
        self.store.notifications_for(user_id)
    }
}

// narrows the scan to the reviewer's department; the resolver applies the approver checks
fn queue_query(reviewer: &Reviewer, scope: &ReviewScope) -> RequestQuery {
    RequestQuery::of_types(&scope.request_types).in_department(reviewer.department.clone())
}

fn permission_denied(request_id: &str, reviewer: &Reviewer) -> ApprovalError {
    ApprovalError::PermissionDenied {
        request_id: request_id.to_string(),
        role: reviewer.role,
        department: reviewer.department.to_string(),
    }
}
