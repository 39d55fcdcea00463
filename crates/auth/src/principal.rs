use serde::{Deserialize, Serialize};

use stockroom_core::ActorId;

/// An authenticated user acting on the stockroom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: ActorId,
    pub display_name: Option<String>,
}

impl Principal {
    pub fn new(id: ActorId) -> Self {
        Self {
            id,
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.display_name = if name.trim().is_empty() {
            None
        } else {
            Some(name.trim().to_string())
        };
        self
    }
}
