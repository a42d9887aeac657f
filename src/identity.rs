//! Users, roles and the reviewer identity passed into every decision.
use super::error::IdentityError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum Role {
    #[n(0)]
    Employee,
    #[n(1)]
    Hod,
    #[n(2)]
    HrAdmin,
    #[n(3)]
    PersonnelAdmin, // P&A
    #[n(4)]
    Reception,
    #[n(5)]
    Events,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "Employee",
            Role::Hod => "HOD",
            Role::HrAdmin => "HR Admin",
            Role::PersonnelAdmin => "P&A",
            Role::Reception => "Reception",
            Role::Events => "Events",
        }
    }

    pub const ALL: [Role; 6] = [
        Role::Employee,
        Role::Hod,
        Role::HrAdmin,
        Role::PersonnelAdmin,
        Role::Reception,
        Role::Events,
    ];

    // exact canonical tag, ignoring case. aliases such as "hr" do not count
    pub fn from_tag(tag: &str) -> Option<Role> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(tag))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match folded.as_str() {
            "employee" => Ok(Role::Employee),
            "hod" | "head of department" => Ok(Role::Hod),
            "hr admin" | "hr" => Ok(Role::HrAdmin),
            "p&a" | "pa" | "p&a admin" => Ok(Role::PersonnelAdmin),
            "reception" => Ok(Role::Reception),
            "events" => Ok(Role::Events),
            _ => Err(IdentityError::UnknownRole(s.to_string())),
        }
    }
}

/// A normalized department name.
///
/// Only [`Department::parse`] builds one, so a department that is blank or
/// that actually holds a role tag never reaches the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Department(String);

impl Department {
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return Err(IdentityError::EmptyDepartment);
        }
        if Role::from_tag(&normalized).is_some() {
            return Err(IdentityError::DepartmentIsRole(normalized));
        }
        Ok(Department(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<C> minicbor::Encode<C> for Department {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Department {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        // stored values were normalized when written
        Ok(Department(d.str()?.to_string()))
    }
}

// a record of the Users collection
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct UserProfile {
    #[n(0)]
    pub user_id: String, // stable id issued by the identity provider
    #[n(1)]
    pub employee_id: String,
    #[n(2)]
    pub name: String,
    #[n(3)]
    pub designation: String,
    #[n(4)]
    pub department: Department,
    #[n(5)]
    pub role: Role,
}

impl UserProfile {
    pub fn new(
        user_id: &str,
        employee_id: &str,
        name: &str,
        designation: &str,
        department: Department,
        role: Role,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            employee_id: employee_id.to_string(),
            name: name.to_string(),
            designation: designation.to_string(),
            department,
            role,
        }
    }
}

/// The acting identity for resolver queries and approve/reject calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reviewer {
    pub user_id: String,
    pub role: Role,
    pub department: Department,
}

impl Reviewer {
    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            user_id: profile.user_id.clone(),
            role: profile.role,
            department: profile.department.clone(),
        }
    }
}
