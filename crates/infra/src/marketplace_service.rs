//! Marketplace orchestration (application-level business rules).
//!
//! `MarketplaceService` is the only entry point the presentation layer talks to.
//! It owns the rules that span entities or depend on current state:
//!
//! ```text
//! Valid<Input> (DTO already checked)
//!   ↓
//! 1. Load current state through the repositories (NotFound propagates)
//!   ↓
//! 2. Apply business rules (sold-out, balance, price immutability)
//!   ↓
//! 3. Persist: a field-level mutation, or one atomic settlement for purchases
//! ```
//!
//! Rule checks done here before a write are re-checked by the store inside the
//! write (`Precondition::Unsold`, the settlement guards), so a concurrent caller
//! cannot slip between the check and the write.
//!
//! This module contains no IO itself; it composes the repository traits.

use serde::Serialize;
use tracing::{info, instrument, warn};

use fleamarket_catalog::{
    Category, CreateCategoryInput, CreateItemInput, Item, ItemDetails, ItemMutation,
    ItemStatistics, NewCategory, NewItem, NewUser, Page, Precondition, RegisterUserInput,
    SearchItemsInput, UpdateItemInput, User, Valid,
};
use fleamarket_core::{BusinessRule, CategoryId, DomainError, DomainResult, ItemId, Patch, UserId};

use crate::store::{Repositories, RepositoryError};

/// Outcome of a settled purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    pub item_id: ItemId,
    pub buyer_id: UserId,
    /// Amount debited from the buyer.
    pub amount: u64,
    pub remaining_balance: u64,
}

/// Business orchestrator over injected repositories.
#[derive(Debug, Clone)]
pub struct MarketplaceService {
    repos: Repositories,
    default_category: Option<CategoryId>,
}

impl MarketplaceService {
    pub fn new(repos: Repositories) -> Self {
        Self {
            repos,
            default_category: None,
        }
    }

    /// Category assigned to items created without one.
    pub fn with_default_category(mut self, category_id: CategoryId) -> Self {
        self.default_category = Some(category_id);
        self
    }

    pub fn default_category(&self) -> Option<CategoryId> {
        self.default_category
    }

    // -------------------------
    // Items
    // -------------------------

    /// List a new item owned by `owner_id`.
    ///
    /// The owner and category must exist. The price is stored exactly as given.
    #[instrument(skip(self, input), fields(owner_id = %owner_id), err)]
    pub async fn create_item(
        &self,
        owner_id: UserId,
        input: Valid<CreateItemInput>,
    ) -> DomainResult<ItemDetails> {
        let input = input.into_inner();

        let owner = self.repos.users.find_by_id(owner_id).await?;
        let category_id = input
            .category_id
            .or(self.default_category)
            .ok_or_else(|| DomainError::invalid_input("category_id is required"))?;
        let category = self.repos.categories.find_by_id(category_id).await?;

        let item = self
            .repos
            .items
            .create(NewItem {
                name: input.name.trim().to_string(),
                price: input.price,
                description: input.description.unwrap_or_default(),
                owner_id: owner.id,
                category_id: category.id,
            })
            .await?;

        info!(item_id = %item.id, price = item.price, "item listed");
        Ok(ItemDetails {
            item,
            owner: owner.summary(),
            category: category.summary(),
        })
    }

    /// Apply the fields present in `input` to an existing item.
    ///
    /// A sold item keeps its price (`ImmutablePriceAfterSale`) and stays sold
    /// (`SoldOutIrreversible`); its other fields may still change. Re-sending the
    /// current price is not a change.
    #[instrument(skip(self, input), fields(item_id = %id), err)]
    pub async fn update_item(
        &self,
        id: ItemId,
        input: Valid<UpdateItemInput>,
    ) -> DomainResult<ItemDetails> {
        let input = input.into_inner();
        let current = self.repos.items.find_by_id(id).await?;

        let mut mutation = ItemMutation::default();
        if let Patch::Set(name) = input.name {
            mutation.name = Some(name.trim().to_string());
        }
        match input.description {
            Patch::Set(description) => mutation.description = Some(description),
            Patch::Null => mutation.description = Some(String::new()),
            Patch::Absent => {}
        }
        match input.sold_out {
            Patch::Set(false) if current.sold_out => {
                return Err(DomainError::rule(BusinessRule::SoldOutIrreversible));
            }
            Patch::Set(true) if !current.sold_out => mutation.sold_out = Some(true),
            _ => {}
        }
        if let Patch::Set(price) = input.price {
            if price != current.price {
                if current.sold_out {
                    return Err(DomainError::rule(BusinessRule::ImmutablePriceAfterSale));
                }
                mutation.price = Some(price);
                // A sale may land between the read above and the write.
                mutation.precondition = Precondition::Unsold;
            }
        }

        if !mutation.is_empty() {
            let guarded = mutation.precondition == Precondition::Unsold;
            self.repos
                .items
                .update(id, mutation)
                .await
                .map_err(|e| match e {
                    RepositoryError::Conflict(_) if guarded => {
                        DomainError::rule(BusinessRule::ImmutablePriceAfterSale)
                    }
                    other => other.into(),
                })?;
        }

        Ok(self.repos.items.find_by_id_with_relations(id).await?)
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    pub async fn delete_item(&self, id: ItemId) -> DomainResult<()> {
        self.repos.items.delete(id).await?;
        info!(item_id = %id, "item deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    pub async fn find_item(&self, id: ItemId) -> DomainResult<ItemDetails> {
        Ok(self.repos.items.find_by_id_with_relations(id).await?)
    }

    /// One page of items matching the search, owners and categories resolved.
    #[instrument(skip(self, input), err)]
    pub async fn list_items(
        &self,
        input: Valid<SearchItemsInput>,
    ) -> DomainResult<Page<ItemDetails>> {
        let page = input.page_request()?;
        let filter = input.filter();
        Ok(self.repos.items.find_with_pagination(&filter, page).await?)
    }

    /// Items with `min <= price <= max`, cheapest first.
    #[instrument(skip(self), err)]
    pub async fn items_in_price_range(
        &self,
        min: u64,
        max: u64,
    ) -> DomainResult<Vec<Item>> {
        if min > max {
            return Err(DomainError::invalid_input("min must not exceed max"));
        }
        Ok(self.repos.items.find_by_price_range(min, max).await?)
    }

    #[instrument(skip(self), err)]
    pub async fn statistics(&self) -> DomainResult<ItemStatistics> {
        let items = self.repos.items.find_all(&Default::default()).await?;
        Ok(ItemStatistics::from_items(&items))
    }

    /// Sell `item_id` to `buyer_id`, debiting the buyer by the item price.
    ///
    /// The pre-checks give precise errors for the common case; the settlement
    /// repeats them atomically, so under contention at most one buyer wins and a
    /// losing buyer is never charged.
    #[instrument(skip(self), fields(item_id = %item_id, buyer_id = %buyer_id), err)]
    pub async fn purchase_item(
        &self,
        item_id: ItemId,
        buyer_id: UserId,
    ) -> DomainResult<PurchaseReceipt> {
        let result = self.try_purchase(item_id, buyer_id).await;
        match &result {
            Ok(receipt) => info!(
                item_id = %item_id,
                buyer_id = %buyer_id,
                amount = receipt.amount,
                remaining_balance = receipt.remaining_balance,
                "purchase settled"
            ),
            Err(e) => {
                if let Some(rule) = e.business_rule() {
                    warn!(item_id = %item_id, buyer_id = %buyer_id, rule = rule.as_str(), "purchase rejected");
                }
            }
        }
        result
    }

    async fn try_purchase(&self, item_id: ItemId, buyer_id: UserId) -> DomainResult<PurchaseReceipt> {
        let item = self.repos.items.find_by_id(item_id).await?;
        if item.sold_out {
            return Err(DomainError::rule(BusinessRule::AlreadySoldOut));
        }

        let buyer = self.repos.users.find_by_id(buyer_id).await?;
        if buyer.balance < item.price {
            return Err(DomainError::rule(BusinessRule::InsufficientBalance));
        }

        let settlement = self
            .repos
            .settlement
            .settle_purchase(item_id, buyer_id)
            .await?;

        Ok(PurchaseReceipt {
            item_id,
            buyer_id,
            amount: settlement.amount,
            remaining_balance: settlement.buyer.balance,
        })
    }

    // -------------------------
    // Users & categories
    // -------------------------

    #[instrument(skip(self, input), err)]
    pub async fn register_user(&self, input: Valid<RegisterUserInput>) -> DomainResult<User> {
        let user = self.repos.users.create(NewUser::from(input)).await?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    pub async fn find_user(&self, id: UserId) -> DomainResult<User> {
        Ok(self.repos.users.find_by_id(id).await?)
    }

    /// Create a category, optionally under an existing parent.
    #[instrument(skip(self, input), err)]
    pub async fn create_category(&self, input: Valid<CreateCategoryInput>) -> DomainResult<Category> {
        let category = NewCategory::from(input);
        if let Some(parent_id) = category.parent_id {
            self.repos.categories.find_by_id(parent_id).await?;
        }
        Ok(self.repos.categories.create(category).await?)
    }

    #[instrument(skip(self), err)]
    pub async fn list_categories(&self) -> DomainResult<Vec<Category>> {
        Ok(self.repos.categories.find_all().await?)
    }

    /// Return the top-level category called `name`, creating it when missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_category(&self, name: &str) -> DomainResult<Category> {
        if let Some(existing) = self.repos.categories.find_by_name(name).await? {
            return Ok(existing);
        }
        Ok(self
            .repos
            .categories
            .create(NewCategory {
                name: name.to_string(),
                parent_id: None,
            })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fleamarket_catalog::{DEFAULT_CATEGORY_NAME, Validate};

    use super::*;
    use crate::store::InMemoryMarketStore;

    async fn service() -> MarketplaceService {
        let store = Arc::new(InMemoryMarketStore::new());
        let service = MarketplaceService::new(Repositories::from_store(store));
        let general = service.ensure_category(DEFAULT_CATEGORY_NAME).await.unwrap();
        service.with_default_category(general.id)
    }

    async fn user(service: &MarketplaceService, email: &str, balance: u64) -> User {
        service
            .register_user(
                RegisterUserInput {
                    name: "someone".into(),
                    email: email.into(),
                    balance,
                }
                .validated()
                .unwrap(),
            )
            .await
            .unwrap()
    }

    fn listing(name: &str, price: u64) -> Valid<CreateItemInput> {
        CreateItemInput {
            name: name.into(),
            price,
            description: None,
            category_id: None,
        }
        .validated()
        .unwrap()
    }

    #[tokio::test]
    async fn ensure_category_is_idempotent() {
        let service = service().await;
        let again = service.ensure_category(DEFAULT_CATEGORY_NAME).await.unwrap();
        assert_eq!(Some(again.id), service.default_category());
        assert_eq!(service.list_categories().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_item_resolves_owner_and_default_category() {
        let service = service().await;
        let owner = user(&service, "o@example.com", 0).await;

        let details = service.create_item(owner.id, listing("Lamp", 1200)).await.unwrap();
        assert_eq!(details.item.price, 1200);
        assert!(!details.item.sold_out);
        assert_eq!(details.item.description, "");
        assert_eq!(details.owner.id, owner.id);
        assert_eq!(Some(details.category.id), service.default_category());
    }

    #[tokio::test]
    async fn create_item_checks_references_first() {
        let service = service().await;
        let err = service
            .create_item(UserId::new(), listing("Lamp", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "user", .. }));

        let owner = user(&service, "o@example.com", 0).await;
        let input = CreateItemInput {
            name: "Lamp".into(),
            price: 10,
            description: None,
            category_id: Some(CategoryId::new()),
        }
        .validated()
        .unwrap();
        let err = service.create_item(owner.id, input).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "category", .. }));
    }

    #[tokio::test]
    async fn create_item_without_any_category_is_invalid() {
        let store = Arc::new(InMemoryMarketStore::new());
        let service = MarketplaceService::new(Repositories::from_store(store));
        let owner = user(&service, "o@example.com", 0).await;
        let err = service.create_item(owner.id, listing("Lamp", 10)).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn null_description_clears_it() {
        let service = service().await;
        let owner = user(&service, "o@example.com", 0).await;
        let input = CreateItemInput {
            name: "Lamp".into(),
            price: 10,
            description: Some("brass".into()),
            category_id: None,
        }
        .validated()
        .unwrap();
        let created = service.create_item(owner.id, input).await.unwrap();

        let patch: UpdateItemInput = serde_json::from_str(r#"{"description":null}"#).unwrap();
        let updated = service
            .update_item(created.item.id, patch.validated().unwrap())
            .await
            .unwrap();
        assert_eq!(updated.item.description, "");
        assert_eq!(updated.item.name, "Lamp");
    }

    #[tokio::test]
    async fn sold_out_cannot_be_reverted_through_update() {
        let service = service().await;
        let owner = user(&service, "o@example.com", 0).await;
        let buyer = user(&service, "b@example.com", 100).await;
        let item = service.create_item(owner.id, listing("Lamp", 100)).await.unwrap();
        service.purchase_item(item.item.id, buyer.id).await.unwrap();

        let patch = UpdateItemInput {
            sold_out: Patch::Set(false),
            ..Default::default()
        };
        let err = service
            .update_item(item.item.id, patch.validated().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.business_rule(), Some(BusinessRule::SoldOutIrreversible));
    }

    #[tokio::test]
    async fn resending_the_same_price_on_a_sold_item_is_allowed() {
        let service = service().await;
        let owner = user(&service, "o@example.com", 0).await;
        let buyer = user(&service, "b@example.com", 100).await;
        let item = service.create_item(owner.id, listing("Lamp", 100)).await.unwrap();
        service.purchase_item(item.item.id, buyer.id).await.unwrap();

        let patch = UpdateItemInput {
            price: Patch::Set(100),
            name: Patch::Set("Brass lamp".into()),
            ..Default::default()
        };
        let updated = service
            .update_item(item.item.id, patch.validated().unwrap())
            .await
            .unwrap();
        assert_eq!(updated.item.name, "Brass lamp");
        assert_eq!(updated.item.price, 100);
    }

    #[tokio::test]
    async fn empty_update_returns_the_item_unchanged() {
        let service = service().await;
        let owner = user(&service, "o@example.com", 0).await;
        let item = service.create_item(owner.id, listing("Lamp", 100)).await.unwrap();

        let same = service
            .update_item(item.item.id, UpdateItemInput::default().validated().unwrap())
            .await
            .unwrap();
        assert_eq!(same, item);
    }

    #[tokio::test]
    async fn create_category_requires_existing_parent() {
        let service = service().await;
        let err = service
            .create_category(
                CreateCategoryInput {
                    name: "Lamps".into(),
                    parent_id: Some(CategoryId::new()),
                }
                .validated()
                .unwrap(),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let child = service
            .create_category(
                CreateCategoryInput {
                    name: "Lamps".into(),
                    parent_id: service.default_category(),
                }
                .validated()
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(child.parent_id, service.default_category());
    }

    #[tokio::test]
    async fn price_range_rejects_inverted_bounds() {
        let service = service().await;
        assert!(matches!(
            service.items_in_price_range(10, 1).await,
            Err(DomainError::InvalidInput(_))
        ));
    }
}
