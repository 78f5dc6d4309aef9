//! Domain error model.

use thiserror::Error;

/// Result type used across the domain and orchestration layers.
pub type DomainResult<T> = Result<T, DomainError>;

/// A named business rule that rejected an operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BusinessRule {
    /// The item has already been purchased.
    AlreadySoldOut,
    /// The buyer's balance does not cover the item price.
    InsufficientBalance,
    /// The price of a sold item cannot be changed.
    ImmutablePriceAfterSale,
    /// A sold item cannot be put back on sale.
    SoldOutIrreversible,
}

impl BusinessRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessRule::AlreadySoldOut => "AlreadySoldOut",
            BusinessRule::InsufficientBalance => "InsufficientBalance",
            BusinessRule::ImmutablePriceAfterSale => "ImmutablePriceAfterSale",
            BusinessRule::SoldOutIrreversible => "SoldOutIrreversible",
        }
    }
}

impl core::fmt::Display for BusinessRule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-level error.
///
/// The presentation layer maps each variant to a transport response; nothing in
/// here knows about HTTP.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced entity does not exist (or was logically deleted).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Structurally malformed data or a failed input validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A business rule rejected the operation.
    #[error("business rule violated: {0}")]
    BusinessRuleViolation(BusinessRule),

    /// Storage unavailable, transaction aborted, or any other infrastructure failure.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn rule(rule: BusinessRule) -> Self {
        Self::BusinessRuleViolation(rule)
    }

    pub fn infrastructure(msg: impl Into<String>) -> Self {
        Self::Infrastructure(msg.into())
    }

    /// Returns the violated rule, if this is a business-rule rejection.
    pub fn business_rule(&self) -> Option<BusinessRule> {
        match self {
            DomainError::BusinessRuleViolation(rule) => Some(*rule),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::NotFound { .. })
    }
}
