use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DomainError;

const MAX_NAME_LEN: usize = 255;

/// Catalog product. Deletion is soft: rows keep their history and reads
/// filter on `deleted_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::EmptyProductName);
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::ProductNameTooLong);
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            description: description.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }
}

/// Priceable variant of a product; each SKU owns exactly one inventory row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sku {
    pub id: Uuid,
    pub product_id: Uuid,
    pub code: String,
    pub price_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Sku {
    pub fn new(
        product_id: Uuid,
        code: impl Into<String>,
        price_cents: i64,
    ) -> Result<Self, DomainError> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(DomainError::EmptySkuCode);
        }
        if price_cents < 0 {
            return Err(DomainError::InvalidPrice);
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            product_id,
            code,
            price_cents,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }
}
