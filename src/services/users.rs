use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{AuditTrail, ensure};
use crate::error::{Error, Result};
use crate::models::{NewUser, Permission, Role, User, UserStatus};
use crate::store::{Store, UserFilter};

/// Self-service profile fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub license_number: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn Store>,
    audit: AuditTrail,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>, audit: AuditTrail) -> Self {
        Self { store, audit }
    }

    /// Creates the first super admin of an empty store. Fails once any user exists.
    pub async fn bootstrap(&self, new: NewUser) -> Result<User> {
        new.validate()?;
        if !self.store.list_users(&UserFilter::default()).await?.is_empty() {
            return Err(Error::validation("users", "the store already has users"));
        }
        let user = User::from_new(
            NewUser {
                role: Role::SuperAdmin,
                ..new
            },
            Utc::now(),
        );
        let user = self.store.insert_user(&user).await?;
        info!(user_id = user.id, "bootstrap administrator created");
        Ok(user)
    }

    pub async fn create_user(&self, actor: &User, new: NewUser) -> Result<User> {
        ensure(actor, actor.can(Permission::ManageUsers), "create users")?;
        ensure_may_assign(actor, new.role)?;
        new.validate()?;

        let user = User::from_new(new, Utc::now());
        let user = self.store.insert_user(&user).await?;
        info!(user_id = user.id, role = %user.role, "user created");
        self.audit
            .note(
                actor,
                "user.create",
                "user",
                user.id,
                json!({ "email": user.email, "role": user.role }),
            )
            .await;
        Ok(user)
    }

    pub async fn get(&self, actor: &User, user_id: i32) -> Result<User> {
        ensure(
            actor,
            user_id == actor.id || actor.can(Permission::ManageUsers) || actor.can(Permission::AllocateJobs),
            "view users",
        )?;
        self.store.get_user(user_id).await
    }

    pub async fn list(&self, actor: &User, filter: &UserFilter) -> Result<Vec<User>> {
        ensure(
            actor,
            actor.can(Permission::ManageUsers) || actor.can(Permission::AllocateJobs),
            "list users",
        )?;
        self.store.list_users(filter).await
    }

    /// Users may edit their own profile; managers may edit anyone's.
    pub async fn update_profile(&self, actor: &User, user_id: i32, update: ProfileUpdate) -> Result<User> {
        ensure(
            actor,
            user_id == actor.id || actor.can(Permission::ManageUsers),
            "edit this profile",
        )?;
        let mut user = self.store.get_user(user_id).await?;

        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(Error::validation("name", "must not be empty"));
            }
            user.name = name.trim().to_string();
        }
        if update.phone.is_some() {
            user.phone = update.phone;
        }
        if update.license_number.is_some() {
            user.license_number = update.license_number;
        }
        user.updated_at = Utc::now();

        self.save(actor, user, "user.update", json!({})).await
    }

    /// Sets the role and resets permissions to that role's preset.
    pub async fn change_role(&self, actor: &User, user_id: i32, role: Role) -> Result<User> {
        ensure(actor, actor.can(Permission::ManageUsers), "change roles")?;
        if user_id == actor.id {
            return Err(Error::forbidden(actor.id, "change their own role"));
        }
        ensure_may_assign(actor, role)?;
        let mut user = self.store.get_user(user_id).await?;
        ensure_may_manage(actor, &user)?;
        let from = user.role;
        user.change_role(role, Utc::now());
        self.save(actor, user, "user.role", json!({ "from": from, "to": role }))
            .await
    }

    pub async fn grant(&self, actor: &User, user_id: i32, permission: Permission) -> Result<User> {
        ensure(actor, actor.can(Permission::ManageUsers), "grant permissions")?;
        if permission == Permission::IsAdmin && !actor.is_admin() {
            return Err(Error::forbidden(actor.id, "grant admin rights"));
        }
        let mut user = self.store.get_user(user_id).await?;
        ensure_may_manage(actor, &user)?;
        user.permissions.grant(permission);
        user.updated_at = Utc::now();
        self.save(actor, user, "user.grant", json!({ "permission": permission }))
            .await
    }

    pub async fn revoke(&self, actor: &User, user_id: i32, permission: Permission) -> Result<User> {
        ensure(actor, actor.can(Permission::ManageUsers), "revoke permissions")?;
        let mut user = self.store.get_user(user_id).await?;
        ensure_may_manage(actor, &user)?;
        user.permissions.revoke(permission);
        user.updated_at = Utc::now();
        self.save(actor, user, "user.revoke", json!({ "permission": permission }))
            .await
    }

    pub async fn set_active(&self, actor: &User, user_id: i32, active: bool) -> Result<User> {
        ensure(actor, actor.can(Permission::ManageUsers), "activate or deactivate users")?;
        if user_id == actor.id && !active {
            return Err(Error::validation("user_id", "you cannot deactivate yourself"));
        }
        let mut user = self.store.get_user(user_id).await?;
        ensure_may_manage(actor, &user)?;
        user.status = if active {
            UserStatus::Active
        } else {
            UserStatus::Inactive
        };
        user.updated_at = Utc::now();
        self.save(actor, user, "user.status", json!({ "active": active }))
            .await
    }

    async fn save(
        &self,
        actor: &User,
        user: User,
        action: &str,
        details: serde_json::Value,
    ) -> Result<User> {
        let user = self.store.update_user(&user).await?;
        info!(user_id = user.id, action, "user updated");
        self.audit.note(actor, action, "user", user.id, details).await;
        Ok(user)
    }
}

/// No one hands out a role above their own.
fn ensure_may_assign(actor: &User, role: Role) -> Result<()> {
    if role.rank() > actor.role.rank() {
        return Err(Error::forbidden(actor.id, format!("assign the {role} role")));
    }
    Ok(())
}

fn ensure_may_manage(actor: &User, target: &User) -> Result<()> {
    if target.role.rank() > actor.role.rank() {
        return Err(Error::forbidden(actor.id, format!("manage a {} account", target.role)));
    }
    Ok(())
}
