use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::error::{Error, Result};

text_enum! {
    pub enum Role {
        SuperAdmin => "super_admin",
        Admin => "admin",
        SystemUser => "system_user",
        Driver => "driver",
        Contractor => "contractor",
    }
}

impl Role {
    /// Seniority for user management. Drivers and contractors share the bottom rank.
    pub fn rank(&self) -> u8 {
        match self {
            Role::SuperAdmin => 3,
            Role::Admin => 2,
            Role::SystemUser => 1,
            Role::Driver | Role::Contractor => 0,
        }
    }
}

text_enum! {
    pub enum UserStatus {
        Active => "active",
        Inactive => "inactive",
        Pending => "pending",
        OnLeave => "on_leave",
    }
}

text_enum! {
    pub enum Permission {
        AllocateJobs => "can_allocate_jobs",
        ApproveExpenses => "can_approve_expenses",
        CreateJobs => "can_create_jobs",
        EditJobs => "can_edit_jobs",
        ManageUsers => "can_manage_users",
        ViewReports => "can_view_reports",
        ViewUnallocated => "can_view_unallocated",
        IsAdmin => "is_admin",
        ViewSystemSettings => "can_view_system_settings",
        ManageCompanies => "can_manage_companies",
        ViewAllJobs => "can_view_all_jobs",
        ViewAssignedJobs => "can_view_assigned_jobs",
        CreateExpenses => "can_create_expenses",
    }
}

/// Granted permission flags. Unlisted flags are denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    granted: Vec<Permission>,
}

impl Permissions {
    pub fn from_granted(granted: impl IntoIterator<Item = Permission>) -> Self {
        let mut permissions = Self::default();
        for permission in granted {
            permissions.grant(permission);
        }
        permissions
    }

    pub fn preset(role: Role) -> Self {
        use Permission::*;
        match role {
            Role::SuperAdmin | Role::Admin => Self::from_granted(Permission::ALL.iter().copied()),
            Role::SystemUser => Self::from_granted(
                Permission::ALL
                    .iter()
                    .copied()
                    .filter(|p| !matches!(p, IsAdmin | ViewSystemSettings)),
            ),
            Role::Driver | Role::Contractor => {
                Self::from_granted([ViewAssignedJobs, CreateExpenses])
            }
        }
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.granted.contains(&permission)
    }

    pub fn grant(&mut self, permission: Permission) {
        if !self.contains(permission) {
            self.granted.push(permission);
        }
    }

    pub fn revoke(&mut self, permission: Permission) {
        self.granted.retain(|p| *p != permission);
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.granted.iter().copied()
    }
}

/// Input for a new user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub license_number: Option<String>,
}

impl NewUser {
    pub fn validate(&self) -> Result<()> {
        let email = self.email.trim();
        let valid = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid {
            return Err(Error::validation("email", format!("`{email}` is not an e-mail address")));
        }
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub permissions: Json<Permissions>,
    pub license_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn from_new(new: NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            email: new.email.trim().to_lowercase(),
            name: new.name.trim().to_string(),
            phone: new.phone,
            role: new.role,
            status: UserStatus::Active,
            permissions: Json(Permissions::preset(new.role)),
            license_number: new.license_number,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, UserStatus::Active | UserStatus::OnLeave)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin | Role::SuperAdmin)
    }

    /// Drivers and contractors both carry vehicles.
    pub fn is_driver(&self) -> bool {
        matches!(self.role, Role::Driver | Role::Contractor)
    }

    pub fn can(&self, permission: Permission) -> bool {
        if !self.is_active() {
            return false;
        }
        self.role == Role::SuperAdmin || self.permissions.contains(permission)
    }

    /// Fails with `Forbidden` unless the user holds `permission`.
    pub fn require(&self, permission: Permission) -> Result<()> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(Error::forbidden(self.id, permission.as_str()))
        }
    }

    pub fn change_role(&mut self, role: Role, now: DateTime<Utc>) {
        self.role = role;
        self.permissions = Json(Permissions::preset(role));
        self.updated_at = now;
    }
}
