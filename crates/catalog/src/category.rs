use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleamarket_core::{CategoryId, DomainError, DomainResult, Entity};

/// Name of the category used when a listing does not name one.
pub const DEFAULT_CATEGORY_NAME: &str = "general";

/// Longest category name a store accepts, in characters.
pub const CATEGORY_NAME_MAX_LEN: usize = 255;

/// Item category. Categories may nest via `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub parent_id: Option<CategoryId>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Category {
    type Id = CategoryId;
    const KIND: &'static str = "category";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Category {
    pub fn create(id: CategoryId, new: NewCategory, now: DateTime<Utc>) -> DomainResult<Self> {
        new.validate()?;
        Ok(Self {
            id,
            name: new.name,
            parent_id: new.parent_id,
            created_at: now,
        })
    }

    pub fn summary(&self) -> CategorySummary {
        CategorySummary {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub id: CategoryId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    pub name: String,
    pub parent_id: Option<CategoryId>,
}

impl NewCategory {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::invalid_input("category name cannot be empty"));
        }
        if self.name.chars().count() > CATEGORY_NAME_MAX_LEN {
            return Err(DomainError::invalid_input(format!(
                "category name exceeds {CATEGORY_NAME_MAX_LEN} characters"
            )));
        }
        Ok(())
    }
}
