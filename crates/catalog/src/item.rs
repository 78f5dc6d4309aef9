use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fleamarket_core::{CategoryId, DomainError, DomainResult, Entity, ItemId, UserId};

use crate::category::CategorySummary;
use crate::user::UserSummary;

/// Longest item name a store accepts, in characters.
pub const NAME_MAX_LEN: usize = 255;

/// Longest item description a store accepts, in characters.
pub const DESCRIPTION_MAX_LEN: usize = 2_000;

/// Largest amount (price or balance) that fits the durable column width.
pub const MAX_STORED_AMOUNT: u64 = i64::MAX as u64;

/// A listed, purchasable good.
///
/// `price` is in the currency's minor unit. `sold_out` only ever moves from
/// `false` to `true`; re-listing a sold good means creating a new item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub price: u64,
    pub description: String,
    pub sold_out: bool,
    pub owner_id: UserId,
    pub category_id: CategoryId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set by a logical delete. Deleted items are invisible to every read path.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for Item {
    type Id = ItemId;
    const KIND: &'static str = "item";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Item {
    /// Materialize a freshly created item from validated fields.
    pub fn create(id: ItemId, new: NewItem, now: DateTime<Utc>) -> DomainResult<Self> {
        new.validate()?;
        Ok(Self {
            id,
            name: new.name,
            price: new.price,
            description: new.description,
            sold_out: false,
            owner_id: new.owner_id,
            category_id: new.category_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Apply a partial mutation in place.
    ///
    /// Only fields set on the mutation are touched. Nothing is changed when the
    /// mutation is rejected.
    pub fn apply(&mut self, mutation: &ItemMutation, now: DateTime<Utc>) -> Result<(), MutationError> {
        if mutation.precondition == Precondition::Unsold && self.sold_out {
            return Err(MutationError::PreconditionFailed);
        }
        mutation.validate().map_err(|e| MutationError::Invalid(e.to_string()))?;
        if mutation.sold_out == Some(false) && self.sold_out {
            return Err(MutationError::Invalid(
                "sold_out cannot be reverted once set".to_string(),
            ));
        }

        if let Some(name) = &mutation.name {
            self.name = name.clone();
        }
        if let Some(price) = mutation.price {
            self.price = price;
        }
        if let Some(description) = &mutation.description {
            self.description = description.clone();
        }
        if mutation.sold_out == Some(true) {
            self.sold_out = true;
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Fields a store needs to create an item. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub name: String,
    pub price: u64,
    pub description: String,
    pub owner_id: UserId,
    pub category_id: CategoryId,
}

impl NewItem {
    /// Data-model invariants; stores call this before persisting.
    pub fn validate(&self) -> DomainResult<()> {
        check_name(&self.name)?;
        check_price(self.price)?;
        check_description(&self.description)
    }
}

/// Write precondition evaluated atomically with an update.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Precondition {
    /// Apply unconditionally.
    #[default]
    Any,
    /// Apply only while the item is not sold out.
    Unsold,
}

/// Field-level partial mutation of an item. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemMutation {
    pub name: Option<String>,
    pub price: Option<u64>,
    pub description: Option<String>,
    pub sold_out: Option<bool>,
    pub precondition: Precondition,
}

impl ItemMutation {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.price.is_none()
            && self.description.is_none()
            && self.sold_out.is_none()
    }

    pub fn validate(&self) -> DomainResult<()> {
        if let Some(name) = &self.name {
            check_name(name)?;
        }
        if let Some(price) = self.price {
            check_price(price)?;
        }
        if let Some(description) = &self.description {
            check_description(description)?;
        }
        Ok(())
    }
}

/// Why an [`ItemMutation`] could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("{0}")]
    Invalid(String),
    #[error("item is already sold out")]
    PreconditionFailed,
}

/// An item with its owner and category resolved in the same fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDetails {
    pub item: Item,
    pub owner: UserSummary,
    pub category: CategorySummary,
}

fn check_name(name: &str) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::invalid_input("item name cannot be empty"));
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(DomainError::invalid_input(format!(
            "item name exceeds {NAME_MAX_LEN} characters"
        )));
    }
    Ok(())
}

fn check_price(price: u64) -> DomainResult<()> {
    if price > MAX_STORED_AMOUNT {
        return Err(DomainError::invalid_input("item price out of range"));
    }
    Ok(())
}

fn check_description(description: &str) -> DomainResult<()> {
    if description.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(DomainError::invalid_input(format!(
            "item description exceeds {DESCRIPTION_MAX_LEN} characters"
        )));
    }
    Ok(())
}
