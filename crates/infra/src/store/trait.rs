use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use fleamarket_catalog::{
    Category, Item, ItemDetails, ItemFilter, ItemMutation, NewCategory, NewItem, NewUser, Page,
    PageRequest, User, UserMutation,
};
use fleamarket_core::{BusinessRule, CategoryId, DomainError, ItemId, UserId};

/// Storage operation error.
///
/// These are the only failure kinds a repository surfaces. Business-rule
/// failures are raised by the service, never by a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Data that breaks a data-model invariant reached the store.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A write precondition did not hold (or a uniqueness constraint fired).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage unavailable, transaction aborted, lock poisoned, etc.
    #[error("storage failure: {0}")]
    Infrastructure(String),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<DomainError> for RepositoryError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound { entity, id } => RepositoryError::NotFound { entity, id },
            DomainError::InvalidInput(msg) => RepositoryError::InvalidInput(msg),
            DomainError::BusinessRuleViolation(rule) => RepositoryError::Conflict(rule.to_string()),
            DomainError::Infrastructure(msg) => RepositoryError::Infrastructure(msg),
        }
    }
}

impl From<RepositoryError> for DomainError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound { entity, id } => DomainError::NotFound { entity, id },
            RepositoryError::InvalidInput(msg) => DomainError::InvalidInput(msg),
            RepositoryError::Conflict(msg) => DomainError::InvalidInput(msg),
            RepositoryError::Infrastructure(msg) => DomainError::Infrastructure(msg),
        }
    }
}

/// Why a purchase could not be settled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// The item was sold before this settlement got to it.
    #[error("item is no longer available")]
    ItemUnavailable,

    #[error("buyer balance does not cover the price")]
    InsufficientFunds,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<SettlementError> for DomainError {
    fn from(value: SettlementError) -> Self {
        match value {
            SettlementError::ItemUnavailable => DomainError::rule(BusinessRule::AlreadySoldOut),
            SettlementError::InsufficientFunds => {
                DomainError::rule(BusinessRule::InsufficientBalance)
            }
            SettlementError::Repository(e) => e.into(),
        }
    }
}

/// Committed result of a purchase: both rows as they were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub item: Item,
    pub buyer: User,
    /// Amount debited, i.e. the item price read inside the atomic scope.
    pub amount: u64,
}

/// Item persistence.
///
/// Every read path treats logically deleted items as absent. Ordering of
/// listings is stable for unchanged data.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn find_all(&self, filter: &ItemFilter) -> Result<Vec<Item>, RepositoryError>;

    /// Like [`find_all`](Self::find_all), with owner and category resolved in the
    /// same operation rather than one lookup per row.
    async fn find_all_with_relations(
        &self,
        filter: &ItemFilter,
    ) -> Result<Vec<ItemDetails>, RepositoryError>;

    async fn find_by_id(&self, id: ItemId) -> Result<Item, RepositoryError>;

    async fn find_by_id_with_relations(&self, id: ItemId) -> Result<ItemDetails, RepositoryError>;

    /// Assign a fresh id and timestamps, persist, and return the stored row.
    async fn create(&self, item: NewItem) -> Result<Item, RepositoryError>;

    /// Apply a field-level partial mutation atomically.
    ///
    /// Fields the mutation does not set are never written. A failed
    /// `Precondition::Unsold` surfaces as [`RepositoryError::Conflict`].
    async fn update(&self, id: ItemId, mutation: ItemMutation) -> Result<Item, RepositoryError>;

    /// Logical delete; subsequent reads report `NotFound`.
    async fn delete(&self, id: ItemId) -> Result<(), RepositoryError>;

    /// Items with `min <= price <= max`, ascending by price.
    async fn find_by_price_range(&self, min: u64, max: u64) -> Result<Vec<Item>, RepositoryError> {
        let mut items = self.find_all(&ItemFilter::price_range(min, max)).await?;
        // Stable sort keeps the listing order among equal prices.
        items.sort_by_key(|i| i.price);
        Ok(items)
    }

    /// One page of matching items (eagerly resolved) plus the total match count.
    ///
    /// A page past the end is empty, not an error.
    async fn find_with_pagination(
        &self,
        filter: &ItemFilter,
        page: PageRequest,
    ) -> Result<Page<ItemDetails>, RepositoryError>;
}

/// User persistence. There is no balance write path here; see [`PurchaseSettlement`].
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<User, RepositoryError>;

    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;

    async fn update(&self, id: UserId, mutation: UserMutation) -> Result<User, RepositoryError>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn find_by_id(&self, id: CategoryId) -> Result<Category, RepositoryError>;

    /// Oldest category with exactly this name, if any.
    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepositoryError>;

    async fn find_all(&self) -> Result<Vec<Category>, RepositoryError>;

    async fn create(&self, category: NewCategory) -> Result<Category, RepositoryError>;
}

/// Multi-entity atomic commit for a purchase.
///
/// Implementations must, in one isolated unit: mark the item sold (only if it is
/// live and unsold) and debit the buyer by the item price (only if the balance
/// covers it). Either both writes land or neither does.
#[async_trait]
pub trait PurchaseSettlement: Send + Sync {
    async fn settle_purchase(
        &self,
        item_id: ItemId,
        buyer_id: UserId,
    ) -> Result<Settlement, SettlementError>;
}

/// The set of repositories the service depends on, injected at construction.
#[derive(Clone)]
pub struct Repositories {
    pub items: Arc<dyn ItemRepository>,
    pub users: Arc<dyn UserRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub settlement: Arc<dyn PurchaseSettlement>,
}

impl Repositories {
    /// Use one store for every repository role.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ItemRepository + UserRepository + CategoryRepository + PurchaseSettlement + 'static,
    {
        Self {
            items: store.clone(),
            users: store.clone(),
            categories: store.clone(),
            settlement: store,
        }
    }
}

impl core::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
