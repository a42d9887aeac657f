//! Requests, their approver chain and the typed payload for each request type
use super::error::ValidationError;
use super::identity::{Department, Role, UserProfile};
use super::status::{self, ApprovalStatus};
use super::timestamp::{CalendarDate, TimeStamp};
use chrono::Utc;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum RequestType {
    #[n(0)]
    Leave,
    #[n(1)]
    GatePass,
    #[n(2)]
    Resignation,
    #[n(3)]
    Bus,
    #[n(4)]
    Transport,
    #[n(5)]
    Uniform,
    #[n(6)]
    Sim,
    #[n(7)]
    GuestHouse,
    #[n(8)]
    General,
}

impl RequestType {
    pub const ALL: [RequestType; 9] = [
        RequestType::Leave,
        RequestType::GatePass,
        RequestType::Resignation,
        RequestType::Bus,
        RequestType::Transport,
        RequestType::Uniform,
        RequestType::Sim,
        RequestType::GuestHouse,
        RequestType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Leave => "leave",
            RequestType::GatePass => "gate_pass",
            RequestType::Resignation => "resignation",
            RequestType::Bus => "bus",
            RequestType::Transport => "transport",
            RequestType::Uniform => "uniform",
            RequestType::Sim => "sim",
            RequestType::GuestHouse => "guest_house",
            RequestType::General => "general",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum LeaveType {
    #[n(0)]
    Casual,
    #[n(1)]
    Sick,
    #[n(2)]
    Earned,
    #[n(3)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct UniformItem {
    #[n(0)]
    pub item: String,
    #[n(1)]
    pub size: String,
    #[n(2)]
    pub quantity: u16,
}

// one shape per request type, stored by the hash of its cbor encoding
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum RequestPayload {
    #[n(0)]
    Leave {
        #[n(0)]
        leave_type: LeaveType,
        #[n(1)]
        start_date: CalendarDate,
        #[n(2)]
        end_date: CalendarDate,
        #[n(3)]
        reason: String,
    },
    #[n(1)]
    GatePass {
        #[n(0)]
        date: CalendarDate,
        #[n(1)]
        out_time: TimeStamp<Utc>,
        #[n(2)]
        expected_return: Option<TimeStamp<Utc>>,
        #[n(3)]
        purpose: String,
    },
    #[n(2)]
    Resignation {
        #[n(0)]
        last_working_date: CalendarDate,
        #[n(1)]
        notice_period_days: u16,
        #[n(2)]
        reason_for_leaving: String,
    },
    #[n(3)]
    Bus {
        #[n(0)]
        route: String,
        #[n(1)]
        pickup_point: String,
        #[n(2)]
        effective_from: CalendarDate,
    },
    #[n(4)]
    Transport {
        #[n(0)]
        destination: String,
        #[n(1)]
        travel_date: CalendarDate,
        #[n(2)]
        passengers: u16,
        #[n(3)]
        purpose: String,
    },
    #[n(5)]
    Uniform {
        #[n(0)]
        items: Vec<UniformItem>,
    },
    #[n(6)]
    Sim {
        #[n(0)]
        mobile_number: Option<String>,
        #[n(1)]
        reason: String,
    },
    #[n(7)]
    GuestHouse {
        #[n(0)]
        check_in: CalendarDate,
        #[n(1)]
        check_out: CalendarDate,
        #[n(2)]
        guests: u16,
        #[n(3)]
        purpose: String,
    },
    #[n(8)]
    General {
        #[n(0)]
        subject: String,
        #[n(1)]
        details: String,
    },
}

fn require_text(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(())
}

fn require_order<T: PartialOrd>(
    start: &T,
    end: &T,
    start_field: &'static str,
    end_field: &'static str,
) -> Result<(), ValidationError> {
    if start > end {
        return Err(ValidationError::DateOrder {
            start: start_field,
            end: end_field,
        });
    }
    Ok(())
}

fn require_positive(value: u16, field: &'static str) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::ZeroQuantity(field));
    }
    Ok(())
}

impl RequestPayload {
    pub fn request_type(&self) -> RequestType {
        match self {
            RequestPayload::Leave { .. } => RequestType::Leave,
            RequestPayload::GatePass { .. } => RequestType::GatePass,
            RequestPayload::Resignation { .. } => RequestType::Resignation,
            RequestPayload::Bus { .. } => RequestType::Bus,
            RequestPayload::Transport { .. } => RequestType::Transport,
            RequestPayload::Uniform { .. } => RequestType::Uniform,
            RequestPayload::Sim { .. } => RequestType::Sim,
            RequestPayload::GuestHouse { .. } => RequestType::GuestHouse,
            RequestPayload::General { .. } => RequestType::General,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            RequestPayload::Leave {
                start_date,
                end_date,
                reason,
                ..
            } => {
                require_order(start_date, end_date, "start_date", "end_date")?;
                require_text(reason, "reason")
            }
            RequestPayload::GatePass {
                out_time,
                expected_return,
                purpose,
                ..
            } => {
                if let Some(back) = expected_return {
                    require_order(out_time, back, "out_time", "expected_return")?;
                }
                require_text(purpose, "purpose")
            }
            RequestPayload::Resignation {
                reason_for_leaving, ..
            } => require_text(reason_for_leaving, "reason_for_leaving"),
            RequestPayload::Bus {
                route,
                pickup_point,
                ..
            } => {
                require_text(route, "route")?;
                require_text(pickup_point, "pickup_point")
            }
            RequestPayload::Transport {
                destination,
                passengers,
                purpose,
                ..
            } => {
                require_text(destination, "destination")?;
                require_positive(*passengers, "passengers")?;
                require_text(purpose, "purpose")
            }
            RequestPayload::Uniform { items } => {
                if items.is_empty() {
                    return Err(ValidationError::NoItems);
                }
                for item in items {
                    require_text(&item.item, "item")?;
                    require_text(&item.size, "size")?;
                    require_positive(item.quantity, "quantity")?;
                }
                Ok(())
            }
            RequestPayload::Sim {
                mobile_number,
                reason,
            } => {
                if let Some(number) = mobile_number {
                    require_text(number, "mobile_number")?;
                }
                require_text(reason, "reason")
            }
            RequestPayload::GuestHouse {
                check_in,
                check_out,
                guests,
                purpose,
            } => {
                require_order(check_in, check_out, "check_in", "check_out")?;
                require_positive(*guests, "guests")?;
                require_text(purpose, "purpose")
            }
            RequestPayload::General { subject, details } => {
                require_text(subject, "subject")?;
                require_text(details, "details")
            }
        }
    }

    // validates then returns the hash of the payload and its cbor encoding
    pub fn validate_and_finalise(&self) -> anyhow::Result<(String, Vec<u8>)> {
        self.validate()?;

        let contents = minicbor::to_vec(self)?;
        let hash = sha256::digest(&contents);

        Ok((hash, contents))
    }
}

/// One level of a request's approval chain.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Approver {
    #[n(0)]
    pub level: u8, // 1 = first reviewer
    #[n(1)]
    pub role: Role,
    #[n(2)]
    pub department: Department,
    #[n(3)]
    pub status: ApprovalStatus,
    #[n(4)]
    pub decided_by: Option<String>,
    #[n(5)]
    pub decided_at: Option<TimeStamp<Utc>>,
    #[n(6)]
    pub comment: Option<String>,
}

impl Approver {
    pub fn new(level: u8, role: Role, department: Department) -> Self {
        Self {
            level,
            role,
            department,
            status: ApprovalStatus::Pending,
            decided_by: None,
            decided_at: None,
            comment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Request {
    #[n(0)]
    pub id: String, // assigned by the store
    #[n(1)]
    pub request_type: RequestType,
    #[n(2)]
    pub department: Department,
    #[n(3)]
    pub employee_id: String,
    #[n(4)]
    pub employee_name: String,
    #[n(5)]
    pub user_id: String,
    #[n(6)]
    pub payload_hash: String,
    #[n(7)]
    pub approvers: Vec<Approver>,
    #[n(8)]
    pub version: u64, // bumped on every accepted write
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
    #[n(10)]
    pub updated_at: TimeStamp<Utc>,
}

impl Request {
    pub fn status(&self) -> ApprovalStatus {
        status::aggregate(&self.approvers)
    }
    pub fn approver_for(&self, role: Role) -> Option<&Approver> {
        self.approvers.iter().find(|a| a.role == role)
    }
    pub fn approver_for_mut(&mut self, role: Role) -> Option<&mut Approver> {
        self.approvers.iter_mut().find(|a| a.role == role)
    }
}

/// A submission before the store has assigned an id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRequest {
    pub department: Department,
    pub employee_id: String,
    pub employee_name: String,
    pub user_id: String,
    pub payload: RequestPayload,
    pub approvers: Vec<Approver>,
}

impl NewRequest {
    pub fn from_profile(
        profile: &UserProfile,
        payload: RequestPayload,
        approvers: Vec<Approver>,
    ) -> Self {
        Self {
            department: profile.department.clone(),
            employee_id: profile.employee_id.clone(),
            employee_name: profile.name.clone(),
            user_id: profile.user_id.clone(),
            payload,
            approvers,
        }
    }
    pub fn request_type(&self) -> RequestType {
        self.payload.request_type()
    }
}
