use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, ProductId};

/// Free-form status label (open set, stored lowercase).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ProductStatus(String);

impl ProductStatus {
    pub const ACTIVE: &'static str = "active";

    pub fn new(label: impl AsRef<str>) -> Self {
        let label = label.as_ref().trim().to_lowercase();
        if label.is_empty() {
            Self::default()
        } else {
            Self(label)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_active(&self) -> bool {
        self.0 == Self::ACTIVE
    }
}

impl Default for ProductStatus {
    fn default() -> Self {
        Self(Self::ACTIVE.to_string())
    }
}

impl From<String> for ProductStatus {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<ProductStatus> for String {
    fn from(value: ProductStatus) -> Self {
        value.0
    }
}

impl core::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptive product fields: everything a full-record edit replaces.
///
/// Prices are in the smallest currency unit (e.g. cents).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductDetails {
    pub name: String,
    pub description: String,
    pub barcode: String,
    pub cost_price: u64,
    pub selling_price: u64,
    pub minimum_stock: u64,
    pub category: String,
    pub brand: String,
    pub unit: String,
    pub supplier: String,
    pub location: String,
    pub status: ProductStatus,
    pub notes: String,
    pub image_ref: Option<String>,
}

impl ProductDetails {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Normalize and validate before the details are stored.
    pub fn validated(mut self) -> Result<Self, DomainError> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        self.barcode = self.barcode.trim().to_string();
        self.image_ref = self
            .image_ref
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        Ok(self)
    }
}

/// Registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    /// Caller-chosen id; generated when absent.
    pub id: Option<ProductId>,
    pub details: ProductDetails,
    pub initial_stock: u64,
}

impl NewProduct {
    pub fn new(details: ProductDetails) -> Self {
        Self {
            id: None,
            details,
            initial_stock: 0,
        }
    }
}

/// Product record.
///
/// `current_stock` has no public setter: it changes only through
/// [`crate::StockChange`] values produced by the ledger decision logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    #[serde(flatten)]
    details: ProductDetails,
    current_stock: u64,
    registration_date: DateTime<Utc>,
    last_update_date: DateTime<Utc>,
}

impl Product {
    /// Build a freshly registered product.
    pub fn register(request: NewProduct, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let details = request.details.validated()?;
        Ok(Self {
            id: request.id.unwrap_or_else(ProductId::generate),
            details,
            current_stock: request.initial_stock,
            registration_date: now,
            last_update_date: now,
        })
    }

    /// Rebuild a product from persisted fields.
    pub fn restore(
        id: ProductId,
        details: ProductDetails,
        current_stock: u64,
        registration_date: DateTime<Utc>,
        last_update_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            details,
            current_stock,
            registration_date,
            last_update_date,
        }
    }

    pub fn id(&self) -> &ProductId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn details(&self) -> &ProductDetails {
        &self.details
    }

    pub fn current_stock(&self) -> u64 {
        self.current_stock
    }

    pub fn minimum_stock(&self) -> u64 {
        self.details.minimum_stock
    }

    pub fn registration_date(&self) -> DateTime<Utc> {
        self.registration_date
    }

    pub fn last_update_date(&self) -> DateTime<Utc> {
        self.last_update_date
    }

    /// At or below the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.details.minimum_stock
    }

    /// Replace every descriptive field. Stock, id and registration date are kept.
    pub fn replace_details(
        &mut self,
        details: ProductDetails,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.details = details.validated()?;
        self.last_update_date = now;
        Ok(())
    }

    pub(crate) fn set_stock(&mut self, stock: u64, now: DateTime<Utc>) {
        self.current_stock = stock;
        self.last_update_date = now;
    }
}
