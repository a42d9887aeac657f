//! Approval chains seeded onto new requests
use super::error::ValidationError;
use super::identity::{Department, Role};
use super::request::{Approver, RequestType};
use std::collections::HashMap;

/// Ordered reviewer roles; position 0 becomes level 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTemplate {
    roles: Vec<Role>,
}

impl ChainTemplate {
    pub fn new(roles: Vec<Role>) -> Result<Self, ValidationError> {
        if roles.is_empty() {
            return Err(ValidationError::EmptyChain);
        }
        for (i, role) in roles.iter().enumerate() {
            if roles[..i].contains(role) {
                return Err(ValidationError::DuplicateRole(*role));
            }
        }
        Ok(Self { roles })
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    // every level is scoped to the department the request was raised in
    pub fn seed(&self, department: &Department) -> Vec<Approver> {
        self.roles
            .iter()
            .zip(1u8..)
            .map(|(role, level)| Approver::new(level, *role, department.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChainConfig {
    overrides: HashMap<RequestType, ChainTemplate>,
}

impl ChainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain(mut self, request_type: RequestType, roles: Vec<Role>) -> anyhow::Result<Self> {
        let template = ChainTemplate::new(roles)?;
        self.overrides.insert(request_type, template);
        Ok(self)
    }

    pub fn chain_for(&self, request_type: RequestType) -> ChainTemplate {
        if let Some(template) = self.overrides.get(&request_type) {
            return template.clone();
        }
        let roles = match request_type {
            RequestType::Leave
            | RequestType::GatePass
            | RequestType::Resignation
            | RequestType::General => vec![Role::Hod, Role::HrAdmin],
            RequestType::Bus | RequestType::Transport => vec![Role::Hod, Role::PersonnelAdmin],
            RequestType::Uniform | RequestType::Sim => vec![Role::PersonnelAdmin],
            RequestType::GuestHouse => vec![Role::Hod, Role::Reception],
        };
        ChainTemplate { roles }
    }
}
