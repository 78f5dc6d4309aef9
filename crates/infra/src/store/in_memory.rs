use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use fleamarket_catalog::{
    Category, Item, ItemDetails, ItemFilter, ItemMutation, MutationError, NewCategory, NewItem,
    NewUser, Page, PageRequest, User, UserMutation,
};
use fleamarket_core::{CategoryId, Entity, ItemId, UserId};

use super::r#trait::{
    CategoryRepository, ItemRepository, PurchaseSettlement, RepositoryError, Settlement,
    SettlementError, UserRepository,
};

#[derive(Debug, Default)]
struct Tables {
    // Keyed by time-ordered ids, so iteration order is creation order.
    items: BTreeMap<ItemId, Item>,
    users: BTreeMap<UserId, User>,
    categories: BTreeMap<CategoryId, Category>,
}

impl Tables {
    fn live_item(&self, id: ItemId) -> Result<&Item, RepositoryError> {
        self.items
            .get(&id)
            .filter(|i| !i.is_deleted())
            .ok_or_else(|| RepositoryError::not_found(Item::KIND, id))
    }

    fn user(&self, id: UserId) -> Result<&User, RepositoryError> {
        lookup(&self.users, id)
    }

    fn category(&self, id: CategoryId) -> Result<&Category, RepositoryError> {
        lookup(&self.categories, id)
    }

    fn details(&self, item: &Item) -> Result<ItemDetails, RepositoryError> {
        let owner = self.users.get(&item.owner_id).ok_or_else(|| {
            RepositoryError::Infrastructure(format!("item {} references a missing owner", item.id))
        })?;
        let category = self.categories.get(&item.category_id).ok_or_else(|| {
            RepositoryError::Infrastructure(format!(
                "item {} references a missing category",
                item.id
            ))
        })?;
        Ok(ItemDetails {
            item: item.clone(),
            owner: owner.summary(),
            category: category.summary(),
        })
    }
}

fn lookup<E: Entity>(table: &BTreeMap<E::Id, E>, id: E::Id) -> Result<&E, RepositoryError> {
    table
        .get(&id)
        .ok_or_else(|| RepositoryError::not_found(E::KIND, id))
}

/// In-memory marketplace store.
///
/// Intended for tests/dev. All tables sit behind a single `RwLock`: reads share it,
/// every write (including a two-row purchase settlement) holds it exclusively.
#[derive(Debug, Default)]
pub struct InMemoryMarketStore {
    tables: RwLock<Tables>,
}

impl InMemoryMarketStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, RepositoryError> {
        self.tables
            .read()
            .map_err(|_| RepositoryError::Infrastructure("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, RepositoryError> {
        self.tables
            .write()
            .map_err(|_| RepositoryError::Infrastructure("lock poisoned".to_string()))
    }
}

#[async_trait]
impl ItemRepository for InMemoryMarketStore {
    async fn find_all(&self, filter: &ItemFilter) -> Result<Vec<Item>, RepositoryError> {
        let tables = self.read()?;
        Ok(tables
            .items
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }

    async fn find_all_with_relations(
        &self,
        filter: &ItemFilter,
    ) -> Result<Vec<ItemDetails>, RepositoryError> {
        let tables = self.read()?;
        tables
            .items
            .values()
            .filter(|i| filter.matches(i))
            .map(|i| tables.details(i))
            .collect()
    }

    async fn find_by_id(&self, id: ItemId) -> Result<Item, RepositoryError> {
        let tables = self.read()?;
        tables.live_item(id).cloned()
    }

    async fn find_by_id_with_relations(&self, id: ItemId) -> Result<ItemDetails, RepositoryError> {
        let tables = self.read()?;
        let item = tables.live_item(id)?;
        tables.details(item)
    }

    async fn create(&self, item: NewItem) -> Result<Item, RepositoryError> {
        let item = Item::create(ItemId::new(), item, Utc::now())?;
        let mut tables = self.write()?;
        tables.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update(&self, id: ItemId, mutation: ItemMutation) -> Result<Item, RepositoryError> {
        let mut tables = self.write()?;
        tables.live_item(id)?;
        let Some(item) = tables.items.get_mut(&id) else {
            return Err(RepositoryError::not_found(Item::KIND, id));
        };
        if mutation.is_empty() {
            return Ok(item.clone());
        }

        // `apply` validates before touching anything, so a rejection leaves the row as it was.
        item.apply(&mutation, Utc::now()).map_err(|e| match e {
            MutationError::PreconditionFailed => RepositoryError::Conflict(e.to_string()),
            MutationError::Invalid(msg) => RepositoryError::InvalidInput(msg),
        })?;
        Ok(item.clone())
    }

    async fn delete(&self, id: ItemId) -> Result<(), RepositoryError> {
        let mut tables = self.write()?;
        match tables.items.get_mut(&id) {
            Some(item) if !item.is_deleted() => {
                let now = Utc::now();
                item.deleted_at = Some(now);
                item.updated_at = now;
                Ok(())
            }
            _ => Err(RepositoryError::not_found(Item::KIND, id)),
        }
    }

    async fn find_with_pagination(
        &self,
        filter: &ItemFilter,
        page: PageRequest,
    ) -> Result<Page<ItemDetails>, RepositoryError> {
        let tables = self.read()?;
        let matching: Vec<&Item> = tables.items.values().filter(|i| filter.matches(i)).collect();
        let total = matching.len() as u64;
        let rows = page
            .slice(matching)
            .into_iter()
            .map(|i| tables.details(i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(rows, total, page))
    }
}

#[async_trait]
impl UserRepository for InMemoryMarketStore {
    async fn find_by_id(&self, id: UserId) -> Result<User, RepositoryError> {
        let tables = self.read()?;
        tables.user(id).cloned()
    }

    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let user = User::create(UserId::new(), user, Utc::now())?;
        let mut tables = self.write()?;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict(format!(
                "email already registered: {}",
                user.email
            )));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: UserId, mutation: UserMutation) -> Result<User, RepositoryError> {
        let mut tables = self.write()?;
        if let Some(email) = &mutation.email {
            if tables.users.values().any(|u| u.id != id && &u.email == email) {
                return Err(RepositoryError::Conflict(format!(
                    "email already registered: {email}"
                )));
            }
        }
        let Some(user) = tables.users.get_mut(&id) else {
            return Err(RepositoryError::not_found(User::KIND, id));
        };
        user.apply(&mutation, Utc::now())?;
        Ok(user.clone())
    }
}

#[async_trait]
impl CategoryRepository for InMemoryMarketStore {
    async fn find_by_id(&self, id: CategoryId) -> Result<Category, RepositoryError> {
        let tables = self.read()?;
        tables.category(id).cloned()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepositoryError> {
        let tables = self.read()?;
        Ok(tables.categories.values().find(|c| c.name == name).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Category>, RepositoryError> {
        let tables = self.read()?;
        Ok(tables.categories.values().cloned().collect())
    }

    async fn create(&self, category: NewCategory) -> Result<Category, RepositoryError> {
        let category = Category::create(CategoryId::new(), category, Utc::now())?;
        let mut tables = self.write()?;
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }
}

#[async_trait]
impl PurchaseSettlement for InMemoryMarketStore {
    async fn settle_purchase(
        &self,
        item_id: ItemId,
        buyer_id: UserId,
    ) -> Result<Settlement, SettlementError> {
        let mut guard = self.write()?;
        let Tables { items, users, .. } = &mut *guard;

        // Check everything first; nothing is written unless both rows can change.
        let item = items
            .get_mut(&item_id)
            .filter(|i| !i.is_deleted())
            .ok_or_else(|| RepositoryError::not_found(Item::KIND, item_id))?;
        if item.sold_out {
            return Err(SettlementError::ItemUnavailable);
        }
        let buyer = users
            .get_mut(&buyer_id)
            .ok_or_else(|| RepositoryError::not_found(User::KIND, buyer_id))?;
        if buyer.balance < item.price {
            return Err(SettlementError::InsufficientFunds);
        }

        let now = Utc::now();
        let amount = item.price;
        item.sold_out = true;
        item.updated_at = now;
        buyer.balance -= amount;
        buyer.updated_at = now;

        Ok(Settlement {
            item: item.clone(),
            buyer: buyer.clone(),
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fleamarket_catalog::Precondition;

    use super::*;

    struct Fixture {
        store: Arc<InMemoryMarketStore>,
        owner: User,
        category: Category,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryMarketStore::new());
        let owner = UserRepository::create(
            &*store,
            NewUser {
                name: "seller".into(),
                email: "seller@example.com".into(),
                balance: 0,
            },
        )
        .await
        .unwrap();
        let category = CategoryRepository::create(
            &*store,
            NewCategory {
                name: "general".into(),
                parent_id: None,
            },
        )
        .await
        .unwrap();
        Fixture {
            store,
            owner,
            category,
        }
    }

    impl Fixture {
        fn items(&self) -> &dyn ItemRepository {
            &*self.store
        }

        async fn list(&self, name: &str, price: u64) -> Item {
            self.items()
                .create(NewItem {
                    name: name.into(),
                    price,
                    description: String::new(),
                    owner_id: self.owner.id,
                    category_id: self.category.id,
                })
                .await
                .unwrap()
        }

        async fn buyer(&self, email: &str, balance: u64) -> User {
            UserRepository::create(
                &*self.store,
                NewUser {
                    name: "buyer".into(),
                    email: email.into(),
                    balance,
                },
            )
            .await
            .unwrap()
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_reads_back_equal() {
        let fx = fixture().await;
        let created = fx.list("Lamp", 100).await;
        assert!(!created.sold_out);

        let first = fx.items().find_by_id(created.id).await.unwrap();
        let second = fx.items().find_by_id(created.id).await.unwrap();
        assert_eq!(first, created);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn find_by_id_of_unknown_item_is_not_found() {
        let fx = fixture().await;
        let err = fx.items().find_by_id(ItemId::new()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { entity: "item", .. }));
    }

    #[tokio::test]
    async fn create_rejects_invariant_breaking_rows() {
        let fx = fixture().await;
        let err = fx
            .items()
            .create(NewItem {
                name: "".into(),
                price: 1,
                description: String::new(),
                owner_id: fx.owner.id,
                category_id: fx.category.id,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn partial_update_leaves_untouched_fields() {
        let fx = fixture().await;
        let item = fx.list("A", 100).await;
        let updated = fx
            .items()
            .update(
                item.id,
                ItemMutation {
                    price: Some(150),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "A");
        assert_eq!(updated.price, 150);
    }

    #[tokio::test]
    async fn update_honours_unsold_precondition() {
        let fx = fixture().await;
        let item = fx.list("A", 100).await;
        fx.items()
            .update(
                item.id,
                ItemMutation {
                    sold_out: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = fx
            .items()
            .update(
                item.id,
                ItemMutation {
                    price: Some(1),
                    precondition: Precondition::Unsold,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert_eq!(fx.items().find_by_id(item.id).await.unwrap().price, 100);
    }

    #[tokio::test]
    async fn concurrent_updates_to_distinct_fields_both_land() {
        let fx = fixture().await;
        let item = fx.list("A", 100).await;

        let items: Arc<dyn ItemRepository> = fx.store.clone();
        let rename = {
            let items = items.clone();
            tokio::spawn(async move {
                items
                    .update(
                        item.id,
                        ItemMutation {
                            name: Some("B".into()),
                            ..Default::default()
                        },
                    )
                    .await
            })
        };
        let reprice = {
            let items = items.clone();
            tokio::spawn(async move {
                items
                    .update(
                        item.id,
                        ItemMutation {
                            price: Some(300),
                            ..Default::default()
                        },
                    )
                    .await
            })
        };
        rename.await.unwrap().unwrap();
        reprice.await.unwrap().unwrap();

        let stored = items.find_by_id(item.id).await.unwrap();
        assert_eq!(stored.name, "B");
        assert_eq!(stored.price, 300);
    }

    #[tokio::test]
    async fn deleted_items_disappear_from_every_read_path() {
        let fx = fixture().await;
        let item = fx.list("A", 100).await;
        fx.items().delete(item.id).await.unwrap();

        assert!(matches!(
            fx.items().find_by_id(item.id).await,
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(matches!(
            fx.items().find_by_id_with_relations(item.id).await,
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(fx.items().find_all(&ItemFilter::default()).await.unwrap().is_empty());
        assert!(matches!(
            fx.items().delete(item.id).await,
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(matches!(
            fx.items().update(item.id, ItemMutation { price: Some(1), ..Default::default() }).await,
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn price_range_is_sorted_ascending() {
        let fx = fixture().await;
        fx.list("c", 300).await;
        fx.list("a", 100).await;
        fx.list("z", 900).await;
        fx.list("b", 200).await;

        let prices: Vec<u64> = fx
            .items()
            .find_by_price_range(100, 300)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.price)
            .collect();
        assert_eq!(prices, vec![100, 200, 300]);
    }

    #[tokio::test]
    async fn eager_fetch_resolves_owner_and_category() {
        let fx = fixture().await;
        fx.list("a", 100).await;
        fx.list("b", 200).await;

        let rows = fx
            .items()
            .find_all_with_relations(&ItemFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert_eq!(row.owner, fx.owner.summary());
            assert_eq!(row.category, fx.category.summary());
        }
    }

    #[tokio::test]
    async fn pagination_reports_total_and_empty_tail() {
        let fx = fixture().await;
        for n in 0..25 {
            fx.list(&format!("item {n}"), 100 + n).await;
        }

        let page3 = fx
            .items()
            .find_with_pagination(&ItemFilter::default(), PageRequest::new(3, 10).unwrap())
            .await
            .unwrap();
        assert_eq!(page3.items.len(), 5);
        assert_eq!(page3.total, 25);
        assert!(!page3.has_more());

        let page4 = fx
            .items()
            .find_with_pagination(&ItemFilter::default(), PageRequest::new(4, 10).unwrap())
            .await
            .unwrap();
        assert!(page4.items.is_empty());
        assert_eq!(page4.total, 25);
    }

    #[tokio::test]
    async fn listing_order_is_stable() {
        let fx = fixture().await;
        for n in 0..5 {
            fx.list(&format!("item {n}"), 10).await;
        }
        let first = fx.items().find_all(&ItemFilter::default()).await.unwrap();
        let second = fx.items().find_all(&ItemFilter::default()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn settlement_writes_both_rows_or_neither() {
        let fx = fixture().await;
        let item = fx.list("A", 500).await;
        let poor = fx.buyer("poor@example.com", 100).await;

        let err = fx.store.settle_purchase(item.id, poor.id).await.unwrap_err();
        assert_eq!(err, SettlementError::InsufficientFunds);
        assert!(!fx.items().find_by_id(item.id).await.unwrap().sold_out);
        assert_eq!(UserRepository::find_by_id(&*fx.store, poor.id).await.unwrap().balance, 100);

        let rich = fx.buyer("rich@example.com", 500).await;
        let settled = fx.store.settle_purchase(item.id, rich.id).await.unwrap();
        assert!(settled.item.sold_out);
        assert_eq!(settled.buyer.balance, 0);
        assert_eq!(settled.amount, 500);

        let err = fx.store.settle_purchase(item.id, rich.id).await.unwrap_err();
        assert_eq!(err, SettlementError::ItemUnavailable);
    }

    #[tokio::test]
    async fn user_update_never_touches_balance() {
        let fx = fixture().await;
        let buyer = fx.buyer("b@example.com", 700).await;
        let updated = UserRepository::update(
            &*fx.store,
            buyer.id,
            UserMutation {
                name: Some("renamed".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.balance, 700);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let fx = fixture().await;
        fx.buyer("dup@example.com", 0).await;
        let err = UserRepository::create(
            &*fx.store,
            NewUser {
                name: "other".into(),
                email: "dup@example.com".into(),
                balance: 0,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn oversized_user_and_category_fields_are_invalid_input() {
        let fx = fixture().await;
        let err = UserRepository::create(
            &*fx.store,
            NewUser {
                name: "long".into(),
                email: format!("{}@example.com", "x".repeat(300)),
                balance: 0,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidInput(_)));

        let err = CategoryRepository::create(
            &*fx.store,
            NewCategory {
                name: "c".repeat(400),
                parent_id: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidInput(_)));
    }
}
