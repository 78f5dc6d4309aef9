//! Marketplace persistence boundary.
//!
//! Repository contracts live in [`r#trait`]; two implementations back them:
//! an in-memory store for tests/dev and a Postgres store for durable deployments.
//! Both implement every role, so either can be handed to
//! [`Repositories::from_store`].

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryMarketStore;
pub use postgres::PostgresMarketStore;
pub use r#trait::{
    CategoryRepository, ItemRepository, PurchaseSettlement, Repositories, RepositoryError,
    Settlement, SettlementError, UserRepository,
};
