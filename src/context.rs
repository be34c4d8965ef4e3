//! Request Context
//!
//! Authenticated caller identity passed into every transfer operation.

use serde::Serialize;
use uuid::Uuid;

use crate::core_types::{ProjectId, UserId};

/// Authenticated caller of a transfer operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    pub user_id: UserId,
    pub project_id: ProjectId,
    /// Admins see every transfer and every volume's admin metadata
    pub is_admin: bool,
    /// Correlation id carried into logs and notifications
    pub request_id: String,
}

impl RequestContext {
    pub fn new(user_id: impl Into<UserId>, project_id: impl Into<ProjectId>) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: project_id.into(),
            is_admin: false,
            request_id: format!("req-{}", Uuid::new_v4()),
        }
    }

    pub fn admin(user_id: impl Into<UserId>, project_id: impl Into<ProjectId>) -> Self {
        Self {
            is_admin: true,
            ..Self::new(user_id, project_id)
        }
    }

    /// Whether this caller may see resources owned by `project_id`
    #[inline]
    pub fn can_see_project(&self, project_id: &str) -> bool {
        self.is_admin || self.project_id == project_id
    }
}
