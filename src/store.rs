//! Request Store backed by sled.
//!
//! Every record lives in the default tree under a prefix:
//!
//! - `request/<id>`: cbor [`Request`]
//! - `payload/<sha256>`: cbor [`RequestPayload`], content addressed
//! - `user/<user_id>`: cbor [`UserProfile`]
//! - `notification/<user_id>/<id>`: cbor [`Notification`]
use super::error::StoreError;
use super::identity::{Department, UserProfile};
use super::notification::Notification;
use super::request::{NewRequest, Request, RequestPayload, RequestType};
use super::timestamp::TimeStamp;
use super::utils;
use anyhow::Context;
use sled::Batch;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error};

const REQUEST_PREFIX: &str = "request/";
const PAYLOAD_PREFIX: &str = "payload/";
const USER_PREFIX: &str = "user/";
const NOTIFICATION_PREFIX: &str = "notification/";
const MIN_WATCH_POLL: Duration = Duration::from_millis(1);

fn request_key(id: &str) -> String {
    format!("{REQUEST_PREFIX}{id}")
}

fn payload_key(hash: &str) -> String {
    format!("{PAYLOAD_PREFIX}{hash}")
}

fn user_key(user_id: &str) -> String {
    format!("{USER_PREFIX}{user_id}")
}

fn notification_key(user_id: &str, id: &str) -> String {
    format!("{NOTIFICATION_PREFIX}{user_id}/{id}")
}

/// Equality and membership filters. Empty filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQuery {
    pub request_types: Vec<RequestType>,
    pub department: Option<Department>,
    pub user_id: Option<String>,
}

impl RequestQuery {
    pub fn all() -> Self {
        Self::default()
    }
    pub fn of_types(request_types: &[RequestType]) -> Self {
        Self {
            request_types: request_types.to_vec(),
            ..Self::default()
        }
    }
    pub fn in_department(mut self, department: Department) -> Self {
        self.department = Some(department);
        self
    }
    pub fn submitted_by(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn matches(&self, request: &Request) -> bool {
        if !self.request_types.is_empty() && !self.request_types.contains(&request.request_type) {
            return false;
        }
        if let Some(department) = &self.department {
            if request.department != *department {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if request.user_id != *user_id {
                return false;
            }
        }
        true
    }
}

#[derive(Clone)]
pub struct RequestStore {
    instance: Arc<sled::Db>,
    watch_poll: Duration,
}

impl RequestStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self {
            instance,
            watch_poll: Duration::from_millis(100),
        }
    }

    /// How often a subscription wakes to check whether it was released.
    /// Clamped to at least one millisecond.
    pub fn with_watch_poll(mut self, watch_poll: Duration) -> Self {
        self.watch_poll = watch_poll.max(MIN_WATCH_POLL);
        self
    }

    pub fn watch_poll(&self) -> Duration {
        self.watch_poll
    }

    /// Store a new request and its payload. Returns the stored request.
    pub fn add(&self, new_request: NewRequest) -> anyhow::Result<Request> {
        let (payload_hash, payload_cbor) = new_request.payload.validate_and_finalise()?;

        let now = TimeStamp::new();
        let request = Request {
            id: utils::new_request_id()?,
            request_type: new_request.request_type(),
            department: new_request.department,
            employee_id: new_request.employee_id,
            employee_name: new_request.employee_name,
            user_id: new_request.user_id,
            payload_hash: payload_hash.clone(),
            approvers: new_request.approvers,
            version: 0,
            created_at: now.clone(),
            updated_at: now,
        };

        // payload and request land together or not at all
        let mut batch = Batch::default();
        batch.insert(payload_key(&payload_hash).as_bytes(), payload_cbor);
        batch.insert(request_key(&request.id).as_bytes(), minicbor::to_vec(&request)?);
        self.instance
            .apply_batch(batch)
            .context("failed to store request")?;

        Ok(request)
    }

    pub fn get(&self, id: &str) -> anyhow::Result<Option<Request>> {
        match self.instance.get(request_key(id).as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn payload(&self, hash: &str) -> anyhow::Result<Option<RequestPayload>> {
        match self.instance.get(payload_key(hash).as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Matching requests in store order.
    pub fn query(&self, query: &RequestQuery) -> anyhow::Result<Vec<Request>> {
        let mut requests = vec![];
        for entry in self.instance.scan_prefix(REQUEST_PREFIX.as_bytes()) {
            let (_, value) = entry?;
            let request: Request = minicbor::decode(&value)?;
            if query.matches(&request) {
                requests.push(request);
            }
        }
        debug!(matched = requests.len(), "request query");
        Ok(requests)
    }

    /// Replace a request only if its stored version is still `expected_version`.
    ///
    /// The write is a single compare-and-swap on the stored bytes, so two
    /// writers racing from the same version cannot both succeed.
    pub fn update_if(&self, mut next: Request, expected_version: u64) -> anyhow::Result<Request> {
        let key = request_key(&next.id);
        let current_bytes = self
            .instance
            .get(key.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(next.id.clone()))?;
        let current: Request = minicbor::decode(&current_bytes)?;

        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            }
            .into());
        }

        next.version = expected_version + 1;
        next.created_at = current.created_at;
        next.updated_at = TimeStamp::new();
        let next_bytes = minicbor::to_vec(&next)?;

        let swapped = self.instance.compare_and_swap(
            key.as_bytes(),
            Some(&current_bytes),
            Some(next_bytes),
        )?;

        if let Err(cas) = swapped {
            let actual = match cas.current {
                Some(bytes) => minicbor::decode::<Request>(&bytes)?.version,
                None => return Err(StoreError::NotFound(next.id).into()),
            };
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual,
            }
            .into());
        }

        Ok(next)
    }

    /// Push a snapshot of `query` to `on_change` now and after every change.
    ///
    /// The watcher runs on its own thread until the returned handle is
    /// dropped or [`Subscription::unsubscribe`] is called. A handle released
    /// from inside `on_change` stops the watcher once the callback returns.
    pub fn subscribe<F>(&self, query: RequestQuery, mut on_change: F) -> anyhow::Result<Subscription>
    where
        F: FnMut(anyhow::Result<Vec<Request>>) + Send + 'static,
    {
        // registered before the first snapshot so no write slips between them
        let mut subscriber = self.instance.watch_prefix(REQUEST_PREFIX.as_bytes());
        let store = self.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = stop.clone();
        let poll = self.watch_poll;

        let worker = std::thread::Builder::new()
            .name("request-subscription".into())
            .spawn(move || {
                on_change(store.query(&query));
                while !stopped.load(Ordering::Acquire) {
                    match subscriber.next_timeout(poll) {
                        Ok(_event) => {
                            let snapshot = store.query(&query);
                            if let Err(err) = &snapshot {
                                error!(error = %err, "failed to refresh subscription snapshot");
                            }
                            on_change(snapshot);
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .context("failed to start subscription watcher")?;

        Ok(Subscription {
            stop,
            worker: Some(worker),
        })
    }

    pub fn put_user(&self, profile: &UserProfile) -> anyhow::Result<()> {
        self.instance
            .insert(user_key(&profile.user_id).as_bytes(), minicbor::to_vec(profile)?)?;
        Ok(())
    }

    pub fn user(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>> {
        match self.instance.get(user_key(user_id).as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn users(&self) -> anyhow::Result<Vec<UserProfile>> {
        let mut users = vec![];
        for entry in self.instance.scan_prefix(USER_PREFIX.as_bytes()) {
            let (_, value) = entry?;
            users.push(minicbor::decode(&value)?);
        }
        Ok(users)
    }

    pub fn append_notification(&self, notification: &Notification) -> anyhow::Result<()> {
        let key = notification_key(&notification.user_id, &notification.id);
        self.instance.insert(key.as_bytes(), minicbor::to_vec(notification)?)?;
        Ok(())
    }

    /// Notifications addressed to `user_id`, oldest first.
    pub fn notifications_for(&self, user_id: &str) -> anyhow::Result<Vec<Notification>> {
        let prefix = format!("{NOTIFICATION_PREFIX}{user_id}/");
        let mut notifications: Vec<Notification> = vec![];
        for entry in self.instance.scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry?;
            notifications.push(minicbor::decode(&value)?);
        }
        notifications.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(notifications)
    }

    pub fn mark_notification_read(&self, user_id: &str, id: &str) -> anyhow::Result<()> {
        let key = notification_key(user_id, id);
        let bytes = self
            .instance
            .get(key.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut notification: Notification = minicbor::decode(&bytes)?;
        notification.read = true;
        self.instance.insert(key.as_bytes(), minicbor::to_vec(&notification)?)?;
        Ok(())
    }
}

/// Handle for a live query. Releasing it stops and joins the watcher thread.
pub struct Subscription {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    pub fn is_active(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    fn release(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            // released from its own callback, the loop sees `stop` on return
            if worker.thread().id() == std::thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                error!("subscription watcher panicked");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
