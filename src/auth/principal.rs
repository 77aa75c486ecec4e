use serde::{Deserialize, Serialize};

/// Authenticated identity of one call. Passed explicitly to every use case.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Option<i64>,
    pub username: String,
    pub org_id: Option<i64>,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(user_id: i64, username: &str) -> Self {
        Principal {
            user_id: Some(user_id),
            username: username.to_string(),
            ..Default::default()
        }
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|r| self.roles.iter().any(|own| own == r))
    }
}
