//! Marketplace catalog: entity model and transfer contracts.
//!
//! This crate holds the shapes of items, users and categories, their invariants,
//! and the validated inputs that cross the service boundary (no IO, no HTTP, no
//! storage).

pub mod category;
pub mod dto;
pub mod item;
pub mod query;
pub mod user;

pub use category::{Category, CategorySummary, DEFAULT_CATEGORY_NAME, NewCategory};
pub use dto::{
    CreateCategoryInput, CreateItemInput, ItemView, RegisterUserInput, SearchItemsInput,
    UpdateItemInput, Valid, Validate,
};
pub use item::{Item, ItemDetails, ItemMutation, MutationError, NewItem, Precondition};
pub use query::{ItemFilter, ItemStatistics, Page, PageRequest};
pub use user::{NewUser, User, UserMutation, UserSummary};
