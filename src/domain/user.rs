#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Unknown role strings degrade to `User`; a corrupt row must never
    /// grant admin access.
    pub fn from_db(value: &str) -> Role {
        match value {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}
