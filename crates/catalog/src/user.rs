use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleamarket_core::{DomainError, DomainResult, Entity, UserId};

use crate::item::MAX_STORED_AMOUNT;

/// Longest user name a store accepts, in characters.
pub const USER_NAME_MAX_LEN: usize = 100;

/// Longest email a store accepts, in characters.
pub const EMAIL_MAX_LEN: usize = 255;

/// A marketplace participant. Sells by owning items and buys against `balance`.
///
/// `balance` is in the currency's minor unit and only a settled purchase debits
/// it; there is no other write path for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub balance: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for User {
    type Id = UserId;
    const KIND: &'static str = "user";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl User {
    pub fn create(id: UserId, new: NewUser, now: DateTime<Utc>) -> DomainResult<Self> {
        new.validate()?;
        Ok(Self {
            id,
            name: new.name,
            email: new.email,
            balance: new.balance,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// Profile-only update. Balance is not part of [`UserMutation`].
    pub fn apply(&mut self, mutation: &UserMutation, now: DateTime<Utc>) -> DomainResult<()> {
        mutation.validate()?;
        if let Some(name) = &mutation.name {
            self.name = name.clone();
        }
        if let Some(email) = &mutation.email {
            self.email = email.clone();
        }
        self.updated_at = now;
        Ok(())
    }
}

/// The owner projection embedded in item responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub balance: u64,
}

impl NewUser {
    pub fn validate(&self) -> DomainResult<()> {
        check_name(&self.name)?;
        check_email(&self.email)?;
        if self.balance > MAX_STORED_AMOUNT {
            return Err(DomainError::invalid_input("balance out of range"));
        }
        Ok(())
    }
}

/// Partial profile update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserMutation {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserMutation {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(name) = &self.name {
            check_name(name)?;
        }
        if let Some(email) = &self.email {
            check_email(email)?;
        }
        Ok(())
    }
}

fn check_name(name: &str) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::invalid_input("user name cannot be empty"));
    }
    if name.chars().count() > USER_NAME_MAX_LEN {
        return Err(DomainError::invalid_input(format!(
            "user name exceeds {USER_NAME_MAX_LEN} characters"
        )));
    }
    Ok(())
}

fn check_email(email: &str) -> DomainResult<()> {
    if email.trim().is_empty() {
        return Err(DomainError::invalid_input("email cannot be empty"));
    }
    if email.chars().count() > EMAIL_MAX_LEN {
        return Err(DomainError::invalid_input(format!(
            "email exceeds {EMAIL_MAX_LEN} characters"
        )));
    }
    Ok(())
}
