//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a movement record in a product's stock ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(Uuid);

impl MovementId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MovementId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for MovementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for MovementId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for MovementId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("MovementId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// String identifiers: stable, opaque, assigned by the caller or generated.
macro_rules! impl_string_newtype {
    ($t:ident, $name:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $t(String);

        impl $t {
            /// Parse a caller-supplied identifier (trimmed, must be non-empty).
            pub fn parse(raw: impl AsRef<str>) -> Result<Self, DomainError> {
                let trimmed = raw.as_ref().trim();
                if trimmed.is_empty() {
                    return Err(DomainError::invalid_id(concat!($name, ": cannot be empty")));
                }
                if trimmed.contains('/') {
                    return Err(DomainError::invalid_id(concat!($name, ": cannot contain '/'")));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_newtype!(ProductId, "ProductId");
impl_string_newtype!(ActorId, "ActorId");

impl ProductId {
    /// Generate a fresh product identifier (UUIDv7 rendered as a string).
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_id_is_trimmed() {
        let id = ProductId::parse("  SKU-1 ").unwrap();
        assert_eq!(id.as_str(), "SKU-1");
    }

    #[test]
    fn product_id_rejects_blank_and_path_separators() {
        assert!(matches!(ProductId::parse("   "), Err(DomainError::InvalidId(_))));
        assert!(matches!(ProductId::parse("a/b"), Err(DomainError::InvalidId(_))));
    }

    #[test]
    fn generated_product_ids_are_unique() {
        assert_ne!(ProductId::generate(), ProductId::generate());
    }

    #[test]
    fn product_id_deserialization_validates() {
        let ok: ProductId = serde_json::from_str("\"p-1\"").unwrap();
        assert_eq!(ok.as_str(), "p-1");
        assert!(serde_json::from_str::<ProductId>("\"\"").is_err());
    }

    #[test]
    fn movement_id_roundtrips_through_display() {
        let id = MovementId::new();
        let parsed: MovementId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
