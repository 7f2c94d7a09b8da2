use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Attendee,
    Organizer,
    Admin,
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attendee" => Ok(Self::Attendee),
            "organizer" => Ok(Self::Organizer),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// The caller of an operation, as established by the upstream gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: uuid::Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: uuid::Uuid, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Admins, or the organizer who owns the event.
    pub fn can_manage(&self, event: &super::Event) -> bool {
        self.is_admin() || (self.role == UserRole::Organizer && event.organizer_id == self.user_id)
    }
}
