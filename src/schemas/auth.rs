use crate::db::types::UserRole;

/// Caller identity, threaded explicitly into every service operation.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: UserRole) -> Self {
        Self { user_id: user_id.into(), role }
    }

    pub fn is_instructor(&self) -> bool {
        matches!(self.role, UserRole::Teacher | UserRole::Admin)
    }
}
