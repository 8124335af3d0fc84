use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Facilitator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Facilitator => "facilitator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "facilitator" => Ok(Role::Facilitator),
            other => Err(format!("Unknown role '{other}'")),
        }
    }
}

/// Profile document stored in the `users` collection, keyed by the identity provider's uid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub email: String,
    pub username: String,
    pub role: Role,
    pub created_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Profile created on first login for a subject with no document yet.
    pub fn default_facilitator(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            username: "Facilitator".to_string(),
            role: Role::Facilitator,
            created_at: Some(Utc::now()),
        }
    }
}
