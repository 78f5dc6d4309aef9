//! Transfer contracts: validated inputs and the item wire shape.
//!
//! Inputs are checked by [`Validate::validated`], which is the only way to build
//! a [`Valid`] wrapper. Orchestrator entry points take `Valid<_>`, so an input that
//! failed validation cannot reach them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleamarket_core::{CategoryId, DomainError, DomainResult, ItemId, Patch, UserId};

use crate::category::{CATEGORY_NAME_MAX_LEN, CategorySummary, NewCategory};
use crate::item::{DESCRIPTION_MAX_LEN, ItemDetails, MAX_STORED_AMOUNT, NAME_MAX_LEN};
use crate::query::{DEFAULT_PAGE_SIZE, ItemFilter, PageRequest};
use crate::user::{EMAIL_MAX_LEN, NewUser, USER_NAME_MAX_LEN, UserSummary};

pub const NAME_MIN_LEN: usize = 2;
pub const PRICE_MIN: u64 = 1;
pub const PRICE_MAX: u64 = 999_999;
pub const KEYWORD_MAX_LEN: usize = 100;

/// Proof that the wrapped input passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Valid<T>(T);

impl<T> Valid<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> core::ops::Deref for Valid<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

pub trait Validate: Sized {
    fn validate(&self) -> DomainResult<()>;

    fn validated(self) -> DomainResult<Valid<Self>> {
        self.validate()?;
        Ok(Valid(self))
    }
}

// -------------------------
// Items
// -------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CreateItemInput {
    pub name: String,
    pub price: u64,
    #[serde(default)]
    pub description: Option<String>,
    /// Falls back to the default category when omitted.
    #[serde(default)]
    pub category_id: Option<CategoryId>,
}

impl Validate for CreateItemInput {
    fn validate(&self) -> DomainResult<()> {
        check_item_name(&self.name)?;
        check_listing_price(self.price)?;
        if let Some(description) = &self.description {
            check_item_description(description)?;
        }
        Ok(())
    }
}

/// Partial item update. Every field distinguishes "absent" from `null` from a value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UpdateItemInput {
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub name: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub price: Patch<u64>,
    /// `null` clears the description.
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub description: Patch<String>,
    #[serde(default, alias = "soldOut", skip_serializing_if = "Patch::is_absent")]
    pub sold_out: Patch<bool>,
}

impl UpdateItemInput {
    pub fn is_empty(&self) -> bool {
        self.name.is_absent()
            && self.price.is_absent()
            && self.description.is_absent()
            && self.sold_out.is_absent()
    }
}

impl Validate for UpdateItemInput {
    fn validate(&self) -> DomainResult<()> {
        match &self.name {
            Patch::Null => return Err(DomainError::invalid_input("name cannot be null")),
            Patch::Set(name) => check_item_name(name)?,
            Patch::Absent => {}
        }
        match self.price {
            Patch::Null => return Err(DomainError::invalid_input("price cannot be null")),
            Patch::Set(price) => check_listing_price(price)?,
            Patch::Absent => {}
        }
        if let Patch::Set(description) = &self.description {
            check_item_description(description)?;
        }
        if self.sold_out == Patch::Null {
            return Err(DomainError::invalid_input("sold_out cannot be null"));
        }
        Ok(())
    }
}

/// Browse/search request (query-string shaped).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SearchItemsInput {
    pub keyword: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub owner_id: Option<UserId>,
    pub category_id: Option<CategoryId>,
    pub sold_out: Option<bool>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl SearchItemsInput {
    pub fn filter(&self) -> ItemFilter {
        ItemFilter {
            min_price: self.min_price,
            max_price: self.max_price,
            owner_id: self.owner_id,
            category_id: self.category_id,
            sold_out: self.sold_out,
            keyword: self
                .keyword
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
        }
    }

    pub fn page_request(&self) -> DomainResult<PageRequest> {
        PageRequest::new(
            self.page.unwrap_or(1),
            self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }
}

impl Validate for SearchItemsInput {
    fn validate(&self) -> DomainResult<()> {
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(DomainError::invalid_input(
                    "min_price must not exceed max_price",
                ));
            }
        }
        if let Some(keyword) = &self.keyword {
            if keyword.chars().count() > KEYWORD_MAX_LEN {
                return Err(DomainError::invalid_input(format!(
                    "keyword exceeds {KEYWORD_MAX_LEN} characters"
                )));
            }
        }
        self.page_request().map(|_| ())
    }
}

/// Item as it goes over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    pub id: ItemId,
    pub name: String,
    pub price: u64,
    pub description: String,
    pub sold_out: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: UserSummary,
    pub category: CategorySummary,
}

impl From<ItemDetails> for ItemView {
    fn from(details: ItemDetails) -> Self {
        let ItemDetails {
            item,
            owner,
            category,
        } = details;
        Self {
            id: item.id,
            name: item.name,
            price: item.price,
            description: item.description,
            sold_out: item.sold_out,
            created_at: item.created_at,
            updated_at: item.updated_at,
            user: owner,
            category,
        }
    }
}

// -------------------------
// Users & categories
// -------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegisterUserInput {
    pub name: String,
    pub email: String,
    /// Opening balance in minor units.
    #[serde(default)]
    pub balance: u64,
}

impl Validate for RegisterUserInput {
    fn validate(&self) -> DomainResult<()> {
        let len = self.name.trim().chars().count();
        if !(NAME_MIN_LEN..=USER_NAME_MAX_LEN).contains(&len) {
            return Err(DomainError::invalid_input(format!(
                "user name must be {NAME_MIN_LEN}..={USER_NAME_MAX_LEN} characters"
            )));
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(DomainError::invalid_input("email is malformed")),
        }
        if email.chars().count() > EMAIL_MAX_LEN {
            return Err(DomainError::invalid_input(format!(
                "email must be at most {EMAIL_MAX_LEN} characters"
            )));
        }
        if self.balance > MAX_STORED_AMOUNT {
            return Err(DomainError::invalid_input("balance out of range"));
        }
        Ok(())
    }
}

impl From<Valid<RegisterUserInput>> for NewUser {
    fn from(input: Valid<RegisterUserInput>) -> Self {
        let input = input.into_inner();
        Self {
            name: input.name.trim().to_string(),
            email: input.email.trim().to_string(),
            balance: input.balance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CreateCategoryInput {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
}

impl Validate for CreateCategoryInput {
    fn validate(&self) -> DomainResult<()> {
        let len = self.name.trim().chars().count();
        if !(NAME_MIN_LEN..=CATEGORY_NAME_MAX_LEN).contains(&len) {
            return Err(DomainError::invalid_input(format!(
                "category name must be {NAME_MIN_LEN}..={CATEGORY_NAME_MAX_LEN} characters"
            )));
        }
        Ok(())
    }
}

impl From<Valid<CreateCategoryInput>> for NewCategory {
    fn from(input: Valid<CreateCategoryInput>) -> Self {
        let input = input.into_inner();
        Self {
            name: input.name.trim().to_string(),
            parent_id: input.parent_id,
        }
    }
}

// -------------------------
// Field rules
// -------------------------

fn check_item_name(name: &str) -> DomainResult<()> {
    let len = name.trim().chars().count();
    if len < NAME_MIN_LEN {
        return Err(DomainError::invalid_input(format!(
            "name must be at least {NAME_MIN_LEN} characters"
        )));
    }
    if len > NAME_MAX_LEN {
        return Err(DomainError::invalid_input(format!(
            "name must be at most {NAME_MAX_LEN} characters"
        )));
    }
    Ok(())
}

fn check_listing_price(price: u64) -> DomainResult<()> {
    if !(PRICE_MIN..=PRICE_MAX).contains(&price) {
        return Err(DomainError::invalid_input(format!(
            "price must be between {PRICE_MIN} and {PRICE_MAX}"
        )));
    }
    Ok(())
}

fn check_item_description(description: &str) -> DomainResult<()> {
    if description.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(DomainError::invalid_input(format!(
            "description must be at most {DESCRIPTION_MAX_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn create(name: &str, price: u64) -> CreateItemInput {
        CreateItemInput {
            name: name.to_string(),
            price,
            description: None,
            category_id: None,
        }
    }

    #[test]
    fn create_input_enforces_name_and_price_bounds() {
        assert!(create("ok", 1).validated().is_ok());
        assert!(create("ok", PRICE_MAX).validated().is_ok());
        assert!(create("x", 100).validated().is_err());
        assert!(create("ok", 0).validated().is_err());
        assert!(create("ok", PRICE_MAX + 1).validated().is_err());
    }

    #[test]
    fn create_input_requires_name_and_price_on_the_wire() {
        assert!(serde_json::from_str::<CreateItemInput>(r#"{"price": 10}"#).is_err());
        assert!(serde_json::from_str::<CreateItemInput>(r#"{"name": "lamp"}"#).is_err());
        assert!(serde_json::from_str::<CreateItemInput>(r#"{"name": "lamp", "price": -1}"#).is_err());

        let input: CreateItemInput =
            serde_json::from_str(r#"{"name": "lamp", "price": 10, "description": "brass"}"#).unwrap();
        assert_eq!(input.description.as_deref(), Some("brass"));
        assert_eq!(input.category_id, None);
    }

    #[test]
    fn update_input_keeps_absent_fields_absent() {
        let input: UpdateItemInput = serde_json::from_str(r#"{"price": 150}"#).unwrap();
        assert_eq!(input.price, Patch::Set(150));
        assert!(input.name.is_absent());
        assert!(input.description.is_absent());
        assert!(input.sold_out.is_absent());
        assert!(input.validated().is_ok());
    }

    #[test]
    fn update_input_accepts_legacy_sold_out_key() {
        let input: UpdateItemInput = serde_json::from_str(r#"{"soldOut": true}"#).unwrap();
        assert_eq!(input.sold_out, Patch::Set(true));
    }

    #[test]
    fn update_input_rejects_null_for_required_fields() {
        for body in [r#"{"name": null}"#, r#"{"price": null}"#, r#"{"sold_out": null}"#] {
            let input: UpdateItemInput = serde_json::from_str(body).unwrap();
            assert!(
                matches!(input.validated(), Err(DomainError::InvalidInput(_))),
                "{body} should be rejected"
            );
        }

        let input: UpdateItemInput = serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(input.description, Patch::Null);
        assert!(input.validated().is_ok());
    }

    #[test]
    fn search_input_checks_range_and_paging() {
        let bad_range = SearchItemsInput {
            min_price: Some(10),
            max_price: Some(5),
            ..Default::default()
        };
        assert!(bad_range.validated().is_err());

        let bad_page = SearchItemsInput {
            page: Some(0),
            ..Default::default()
        };
        assert!(bad_page.validated().is_err());

        let ok = SearchItemsInput {
            keyword: Some("  lamp ".into()),
            ..Default::default()
        };
        let ok = ok.validated().unwrap();
        assert_eq!(ok.filter().keyword.as_deref(), Some("lamp"));
        assert_eq!(ok.page_request().unwrap(), PageRequest::default());
    }

    #[test]
    fn register_user_input_checks_email_shape() {
        let input = RegisterUserInput {
            name: "alice".into(),
            email: "alice.example.com".into(),
            balance: 0,
        };
        assert!(input.validated().is_err());

        let input = RegisterUserInput {
            name: "alice".into(),
            email: " alice@example.com ".into(),
            balance: 500,
        };
        let user: NewUser = input.validated().unwrap().into();
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.balance, 500);
    }

    #[test]
    fn register_and_category_inputs_respect_column_widths() {
        let input = RegisterUserInput {
            name: "alice".into(),
            email: format!("{}@example.com", "a".repeat(300)),
            balance: 0,
        };
        assert!(matches!(input.validated(), Err(DomainError::InvalidInput(_))));

        let input = CreateCategoryInput {
            name: "c".repeat(CATEGORY_NAME_MAX_LEN + 1),
            parent_id: None,
        };
        assert!(matches!(input.validated(), Err(DomainError::InvalidInput(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: every accepted create input carries a positive, in-range price.
        #[test]
        fn accepted_prices_are_in_range(
            name in "[A-Za-z]{2}[A-Za-z0-9 ]{0,40}",
            price in 0u64..2_000_000u64
        ) {
            let accepted = create(&name, price).validated().is_ok();
            prop_assert_eq!(accepted, (PRICE_MIN..=PRICE_MAX).contains(&price));
        }

        /// Property: a present price in an update obeys the same bounds as on create.
        #[test]
        fn update_and_create_agree_on_price(price in 0u64..2_000_000u64) {
            let update = UpdateItemInput { price: Patch::Set(price), ..Default::default() };
            prop_assert_eq!(
                update.validated().is_ok(),
                create("name", price).validated().is_ok()
            );
        }
    }
}
