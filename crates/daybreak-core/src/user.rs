use serde::{Deserialize, Serialize};

use crate::clock::sanitize_offset;
use crate::tier::Tier;

/// The caller as resolved by the identity collaborator. Trusted input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub tier: Tier,
    /// Minutes east of UTC
    #[serde(default)]
    pub tz_offset_minutes: i32,
    #[serde(default)]
    pub archetype: Option<String>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, tier: Tier) -> Self {
        Self {
            user_id: user_id.into(),
            tier,
            tz_offset_minutes: 0,
            archetype: None,
        }
    }

    pub fn with_offset(mut self, tz_offset_minutes: i32) -> Self {
        self.tz_offset_minutes = tz_offset_minutes;
        self
    }

    pub fn with_archetype(mut self, archetype: impl Into<String>) -> Self {
        self.archetype = Some(archetype.into());
        self
    }

    /// The stored offset, or 0 when it is outside the valid range.
    pub fn effective_offset(&self) -> i32 {
        sanitize_offset(self.tz_offset_minutes)
    }
}
