use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type BusinessId = Uuid;

/// A merchant that accounts can pay into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Business {
    pub id: BusinessId,
    pub name: String,
    pub category: String,
    /// Sanctioned businesses cannot receive money.
    pub sanctioned: bool,
    pub created_at: DateTime<Utc>,
}

impl Business {
    pub fn new(name: String, category: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            category,
            sanctioned: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_sanctioned(mut self, sanctioned: bool) -> Self {
        self.sanctioned = sanctioned;
        self
    }
}
