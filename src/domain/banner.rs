use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::DomainError;

#[derive(Debug, Clone)]
pub struct BannerView {
    pub id: Uuid,
    pub message: String,
    pub link: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating or replacing a banner. A missing link falls back to
/// the storefront's product listing; a missing expiry means the banner does
/// not expire.
#[derive(Debug, Clone)]
pub struct BannerInput {
    pub message: String,
    pub link: Option<String>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl BannerInput {
    pub const DEFAULT_LINK: &'static str = "/products";

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.message.trim().is_empty() {
            return Err(DomainError::InvalidInput(
                "Banner message must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn link_or_default(&self) -> String {
        self.link
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_LINK.to_string())
    }
}
