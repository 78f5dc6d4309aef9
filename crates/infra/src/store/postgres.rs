//! Postgres-backed marketplace store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | RepositoryError |
//! |------------|----------------------|-----------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `InvalidInput` |
//! | Database (check constraint violation) | `23514` | `InvalidInput` |
//! | Database (string too long for column) | `22001` | `InvalidInput` |
//! | Database (other) | Any other | `Infrastructure` |
//! | PoolClosed / RowNotFound / Other | N/A | `Infrastructure` |
//!
//! ## Purchase settlement
//!
//! `settle_purchase` runs in one transaction with two conditional updates: the
//! item row first (`sold_out = FALSE` guard), then the buyer row
//! (`balance >= price` guard). The row locks taken by those updates serialize
//! concurrent buyers; the loser re-evaluates the guard and matches nothing.
//! Locks are always taken items-then-users, so two settlements cannot deadlock.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;

use fleamarket_catalog::{
    Category, CategorySummary, Item, ItemDetails, ItemFilter, ItemMutation, NewCategory, NewItem,
    NewUser, Page, PageRequest, Precondition, User, UserMutation, UserSummary,
};
use fleamarket_core::{CategoryId, Entity, ItemId, UserId};

use super::r#trait::{
    CategoryRepository, ItemRepository, PurchaseSettlement, RepositoryError, Settlement,
    SettlementError, UserRepository,
};

const ITEM_COLUMNS: &str = "i.id, i.name, i.price, i.description, i.sold_out, i.user_id, \
     i.category_id, i.created_at, i.updated_at, i.deleted_at";

const USER_COLUMNS: &str = "id, name, email, balance, created_at, updated_at";

const CATEGORY_COLUMNS: &str = "id, name, parent_id, created_at";

/// Postgres-backed implementation of every repository role.
///
/// `Send + Sync`; clones share the same pool.
#[derive(Debug, Clone)]
pub struct PostgresMarketStore {
    pool: Arc<PgPool>,
}

impl PostgresMarketStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Work out why a conditional item update matched no row.
    async fn diagnose_item_update_miss(
        &self,
        id: ItemId,
        mutation: &ItemMutation,
    ) -> RepositoryError {
        let row = sqlx::query("SELECT sold_out FROM items WHERE id = $1 AND deleted_at IS NULL")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await;

        match row {
            Err(e) => map_sqlx_error("diagnose_item_update", e),
            Ok(None) => RepositoryError::not_found(Item::KIND, id),
            Ok(Some(row)) => match row.try_get::<bool, _>("sold_out") {
                Ok(true) if mutation.precondition == Precondition::Unsold => {
                    RepositoryError::Conflict(format!("item {id} was sold"))
                }
                Ok(true) => RepositoryError::InvalidInput(
                    "sold_out cannot be reverted once set".to_string(),
                ),
                // The blocking state went away between the update and this read.
                Ok(false) => RepositoryError::Conflict(format!(
                    "item {id} changed concurrently, retry"
                )),
                Err(e) => map_sqlx_error("diagnose_item_update", e),
            },
        }
    }
}

fn push_item_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ItemFilter) {
    qb.push(" WHERE i.deleted_at IS NULL");
    if let Some(min) = filter.min_price {
        qb.push(" AND i.price >= ").push_bind(clamp_amount(min));
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND i.price <= ").push_bind(clamp_amount(max));
    }
    if let Some(owner) = filter.owner_id {
        qb.push(" AND i.user_id = ").push_bind(*owner.as_uuid());
    }
    if let Some(category) = filter.category_id {
        qb.push(" AND i.category_id = ").push_bind(*category.as_uuid());
    }
    if let Some(sold_out) = filter.sold_out {
        qb.push(" AND i.sold_out = ").push_bind(sold_out);
    }
    if let Some(pattern) = filter.keyword_pattern() {
        qb.push(" AND (i.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR i.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn select_details() -> QueryBuilder<'static, Postgres> {
    QueryBuilder::new(format!(
        "SELECT {ITEM_COLUMNS}, u.name AS owner_name, c.name AS category_name \
         FROM items i \
         JOIN users u ON u.id = i.user_id \
         JOIN categories c ON c.id = i.category_id"
    ))
}

#[async_trait]
impl ItemRepository for PostgresMarketStore {
    #[instrument(skip(self), err)]
    async fn find_all(&self, filter: &ItemFilter) -> Result<Vec<Item>, RepositoryError> {
        let mut qb = QueryBuilder::new(format!("SELECT {ITEM_COLUMNS} FROM items i"));
        push_item_filter(&mut qb, filter);
        qb.push(" ORDER BY i.created_at ASC, i.id ASC");

        let rows = qb
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_all_items", e))?;
        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn find_all_with_relations(
        &self,
        filter: &ItemFilter,
    ) -> Result<Vec<ItemDetails>, RepositoryError> {
        let mut qb = select_details();
        push_item_filter(&mut qb, filter);
        qb.push(" ORDER BY i.created_at ASC, i.id ASC");

        let rows = qb
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_all_item_details", e))?;
        rows.iter().map(details_from_row).collect()
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn find_by_id(&self, id: ItemId) -> Result<Item, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items i WHERE i.id = $1 AND i.deleted_at IS NULL"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_item", e))?;

        match row {
            Some(row) => item_from_row(&row),
            None => Err(RepositoryError::not_found(Item::KIND, id)),
        }
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn find_by_id_with_relations(&self, id: ItemId) -> Result<ItemDetails, RepositoryError> {
        let mut qb = select_details();
        qb.push(" WHERE i.deleted_at IS NULL AND i.id = ")
            .push_bind(*id.as_uuid());

        let row = qb
            .build()
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_item_details", e))?;

        match row {
            Some(row) => details_from_row(&row),
            None => Err(RepositoryError::not_found(Item::KIND, id)),
        }
    }

    #[instrument(skip(self, item), fields(owner_id = %item.owner_id), err)]
    async fn create(&self, item: NewItem) -> Result<Item, RepositoryError> {
        item.validate()?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO items AS i (id, name, price, description, sold_out, user_id, category_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, FALSE, $5, $6, NOW(), NOW())
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(ItemId::new().as_uuid())
        .bind(&item.name)
        .bind(to_db_amount("price", item.price)?)
        .bind(&item.description)
        .bind(item.owner_id.as_uuid())
        .bind(item.category_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;

        item_from_row(&row)
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn update(&self, id: ItemId, mutation: ItemMutation) -> Result<Item, RepositoryError> {
        if mutation.is_empty() {
            return ItemRepository::find_by_id(self, id).await;
        }
        mutation.validate()?;
        let price = mutation
            .price
            .map(|p| to_db_amount("price", p))
            .transpose()?;

        // Each column is only rewritten when the mutation sets it; concurrent
        // updates to different fields therefore both survive.
        let row = sqlx::query(&format!(
            r#"
            UPDATE items AS i SET
                name = COALESCE($2, i.name),
                price = COALESCE($3, i.price),
                description = COALESCE($4, i.description),
                sold_out = i.sold_out OR COALESCE($5, FALSE),
                updated_at = NOW()
            WHERE i.id = $1
              AND i.deleted_at IS NULL
              AND NOT ($6 AND i.sold_out)
              AND NOT (i.sold_out AND COALESCE($5, TRUE) = FALSE)
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(mutation.name.as_deref())
        .bind(price)
        .bind(mutation.description.as_deref())
        .bind(mutation.sold_out)
        .bind(mutation.precondition == Precondition::Unsold)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_item", e))?;

        match row {
            Some(row) => item_from_row(&row),
            None => Err(self.diagnose_item_update_miss(id, &mutation).await),
        }
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn delete(&self, id: ItemId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE items SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_item", e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(Item::KIND, id));
        }
        Ok(())
    }

    #[instrument(
        skip(self, filter),
        fields(page = page.page(), page_size = page.page_size()),
        err
    )]
    async fn find_with_pagination(
        &self,
        filter: &ItemFilter,
        page: PageRequest,
    ) -> Result<Page<ItemDetails>, RepositoryError> {
        // Count and page come from the same snapshot.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) AS total FROM items i");
        push_item_filter(&mut count, filter);
        let total: i64 = count
            .build()
            .fetch_one(&mut *tx)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("count_items", e))?;

        let mut qb = select_details();
        push_item_filter(&mut qb, filter);
        qb.push(" ORDER BY i.created_at ASC, i.id ASC LIMIT ")
            .push_bind(i64::from(page.page_size()))
            .push(" OFFSET ")
            .push_bind(clamp_amount(page.offset()));
        let rows = qb
            .build()
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("page_items", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let items = rows
            .iter()
            .map(details_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total.max(0) as u64, page))
    }
}

#[async_trait]
impl UserRepository for PostgresMarketStore {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_by_id(&self, id: UserId) -> Result<User, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user", e))?;

        match row {
            Some(row) => user_from_row(&row),
            None => Err(RepositoryError::not_found(User::KIND, id)),
        }
    }

    #[instrument(skip(self, user), err)]
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        user.validate()?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, name, email, balance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(UserId::new().as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(to_db_amount("balance", user.balance)?)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;

        user_from_row(&row)
    }

    #[instrument(skip(self, mutation), fields(user_id = %id), err)]
    async fn update(&self, id: UserId, mutation: UserMutation) -> Result<User, RepositoryError> {
        mutation.validate()?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(mutation.name.as_deref())
        .bind(mutation.email.as_deref())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_user", e))?;

        match row {
            Some(row) => user_from_row(&row),
            None => Err(RepositoryError::not_found(User::KIND, id)),
        }
    }
}

#[async_trait]
impl CategoryRepository for PostgresMarketStore {
    #[instrument(skip(self), fields(category_id = %id), err)]
    async fn find_by_id(&self, id: CategoryId) -> Result<Category, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_category", e))?;

        match row {
            Some(row) => category_from_row(&row),
            None => Err(RepositoryError::not_found(Category::KIND, id)),
        }
    }

    #[instrument(skip(self), err)]
    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE name = $1 \
             ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_category_by_name", e))?;

        row.as_ref().map(category_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_all(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_all_categories", e))?;

        rows.iter().map(category_from_row).collect()
    }

    #[instrument(skip(self, category), err)]
    async fn create(&self, category: NewCategory) -> Result<Category, RepositoryError> {
        category.validate()?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO categories (id, name, parent_id, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING {CATEGORY_COLUMNS}
            "#
        ))
        .bind(CategoryId::new().as_uuid())
        .bind(&category.name)
        .bind(category.parent_id.map(|p| *p.as_uuid()))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_category", e))?;

        category_from_row(&row)
    }
}

#[async_trait]
impl PurchaseSettlement for PostgresMarketStore {
    #[instrument(skip(self), fields(item_id = %item_id, buyer_id = %buyer_id), err)]
    async fn settle_purchase(
        &self,
        item_id: ItemId,
        buyer_id: UserId,
    ) -> Result<Settlement, SettlementError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let item_row = sqlx::query(&format!(
            r#"
            UPDATE items AS i SET sold_out = TRUE, updated_at = NOW()
            WHERE i.id = $1 AND i.deleted_at IS NULL AND i.sold_out = FALSE
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(item_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("claim_item", e))?;

        let item = match item_row {
            Some(row) => item_from_row(&row)?,
            None => {
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS (SELECT 1 FROM items WHERE id = $1 AND deleted_at IS NULL)",
                )
                .bind(item_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("check_item", e))?;
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(if exists {
                    SettlementError::ItemUnavailable
                } else {
                    RepositoryError::not_found(Item::KIND, item_id).into()
                });
            }
        };

        // The price charged is the one held under the item row lock.
        let amount = to_db_amount("price", item.price)?;
        let buyer_row = sqlx::query(&format!(
            r#"
            UPDATE users SET balance = balance - $2, updated_at = NOW()
            WHERE id = $1 AND balance >= $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(buyer_id.as_uuid())
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("debit_buyer", e))?;

        let buyer = match buyer_row {
            Some(row) => user_from_row(&row)?,
            None => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                        .bind(buyer_id.as_uuid())
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(|e| map_sqlx_error("check_buyer", e))?;
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(if exists {
                    SettlementError::InsufficientFunds
                } else {
                    RepositoryError::not_found(User::KIND, buyer_id).into()
                });
            }
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(Settlement {
            amount: item.price,
            item,
            buyer,
        })
    }
}

/// Amounts are `u64` in the model and `BIGINT` on disk.
fn to_db_amount(column: &str, value: u64) -> Result<i64, RepositoryError> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::InvalidInput(format!("{column} {value} out of range")))
}

fn from_db_amount(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| {
        RepositoryError::Infrastructure(format!("negative {column} stored: {value}"))
    })
}

/// Filter bounds saturate instead of failing.
fn clamp_amount(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Map SQLx errors to RepositoryError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            error_for_sqlstate(db_err.code().as_deref(), msg)
        }
        sqlx::Error::PoolClosed => {
            RepositoryError::Infrastructure(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            RepositoryError::Infrastructure(format!("unexpected row not found in {}", operation))
        }
        _ => RepositoryError::Infrastructure(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn error_for_sqlstate(code: Option<&str>, msg: String) -> RepositoryError {
    match code {
        // Unique violation
        Some("23505") => RepositoryError::Conflict(msg),
        // Foreign key violation
        Some("23503") => RepositoryError::InvalidInput(msg),
        // Check constraint violation
        Some("23514") => RepositoryError::InvalidInput(msg),
        // String data right truncation
        Some("22001") => RepositoryError::InvalidInput(msg),
        _ => RepositoryError::Infrastructure(msg),
    }
}

// SQLx row types

#[derive(Debug)]
struct ItemRow {
    id: uuid::Uuid,
    name: String,
    price: i64,
    description: String,
    sold_out: bool,
    user_id: uuid::Uuid,
    category_id: uuid::Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
            description: row.try_get("description")?,
            sold_out: row.try_get("sold_out")?,
            user_id: row.try_get("user_id")?,
            category_id: row.try_get("category_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl TryFrom<ItemRow> for Item {
    type Error = RepositoryError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(Item {
            id: ItemId::from_uuid(row.id),
            name: row.name,
            price: from_db_amount("price", row.price)?,
            description: row.description,
            sold_out: row.sold_out,
            owner_id: UserId::from_uuid(row.user_id),
            category_id: CategoryId::from_uuid(row.category_id),
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

fn item_from_row(row: &PgRow) -> Result<Item, RepositoryError> {
    ItemRow::from_row(row)
        .map_err(|e| RepositoryError::Infrastructure(format!("failed to decode item row: {e}")))?
        .try_into()
}

fn details_from_row(row: &PgRow) -> Result<ItemDetails, RepositoryError> {
    let item = item_from_row(row)?;
    let decode = |column: &str| -> Result<String, RepositoryError> {
        row.try_get(column).map_err(|e| {
            RepositoryError::Infrastructure(format!("failed to decode {column}: {e}"))
        })
    };
    Ok(ItemDetails {
        owner: UserSummary {
            id: item.owner_id,
            name: decode("owner_name")?,
        },
        category: CategorySummary {
            id: item.category_id,
            name: decode("category_name")?,
        },
        item,
    })
}

#[derive(Debug)]
struct UserRow {
    id: uuid::Uuid,
    name: String,
    email: String,
    balance: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            balance: row.try_get("balance")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn user_from_row(row: &PgRow) -> Result<User, RepositoryError> {
    let row = UserRow::from_row(row)
        .map_err(|e| RepositoryError::Infrastructure(format!("failed to decode user row: {e}")))?;
    Ok(User {
        id: UserId::from_uuid(row.id),
        name: row.name,
        email: row.email,
        balance: from_db_amount("balance", row.balance)?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[derive(Debug)]
struct CategoryRow {
    id: uuid::Uuid,
    name: String,
    parent_id: Option<uuid::Uuid>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for CategoryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CategoryRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            parent_id: row.try_get("parent_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn category_from_row(row: &PgRow) -> Result<Category, RepositoryError> {
    let row = CategoryRow::from_row(row).map_err(|e| {
        RepositoryError::Infrastructure(format!("failed to decode category row: {e}"))
    })?;
    Ok(Category {
        id: CategoryId::from_uuid(row.id),
        name: row.name,
        parent_id: row.parent_id.map(CategoryId::from_uuid),
        created_at: row.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_above_bigint_are_rejected_on_write() {
        assert_eq!(to_db_amount("price", 42).unwrap(), 42);
        assert!(matches!(
            to_db_amount("price", u64::MAX),
            Err(RepositoryError::InvalidInput(_))
        ));
    }

    #[test]
    fn negative_stored_amounts_are_infrastructure_errors() {
        assert!(matches!(
            from_db_amount("balance", -1),
            Err(RepositoryError::Infrastructure(_))
        ));
        assert_eq!(from_db_amount("balance", 7).unwrap(), 7);
    }

    #[test]
    fn filter_bounds_saturate() {
        assert_eq!(clamp_amount(u64::MAX), i64::MAX);
        assert_eq!(clamp_amount(10), 10);
    }

    #[test]
    fn filter_pushdown_always_excludes_deleted_rows() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM items i");
        push_item_filter(
            &mut qb,
            &ItemFilter {
                min_price: Some(1),
                keyword: Some("lamp".into()),
                ..Default::default()
            },
        );
        let sql = qb.sql();
        assert!(sql.contains("i.deleted_at IS NULL"));
        assert!(sql.contains("i.price >= $1"));
        assert!(sql.contains("i.name ILIKE $2 OR i.description ILIKE $3"));
    }

    #[test]
    fn oversized_values_map_to_invalid_input() {
        let err = error_for_sqlstate(Some("22001"), "value too long".into());
        assert!(matches!(err, RepositoryError::InvalidInput(_)));
        assert!(matches!(
            error_for_sqlstate(Some("23505"), "dup".into()),
            RepositoryError::Conflict(_)
        ));
        assert!(matches!(
            error_for_sqlstate(Some("40001"), "serialization".into()),
            RepositoryError::Infrastructure(_)
        ));
        assert!(matches!(
            error_for_sqlstate(None, "unknown".into()),
            RepositoryError::Infrastructure(_)
        ));
    }

    #[test]
    fn owner_and_category_filters_bind_ids() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM items i");
        push_item_filter(
            &mut qb,
            &ItemFilter {
                owner_id: Some(UserId::new()),
                category_id: Some(CategoryId::new()),
                ..Default::default()
            },
        );
        let sql = qb.sql();
        assert!(sql.contains("i.user_id = $1"));
        assert!(sql.contains("i.category_id = $2"));
    }
}
