//! Shopping cart.
//!
//! Catalog prices are free text ("$275.00"). They are parsed into integer cents
//! when a collection goes into the cart, so totals never suffer float rounding.
//! Checkout only produces a receipt; no payment is taken.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors from price parsing and cart operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("Invalid price '{0}'")]
    InvalidPrice(String),

    #[error("Cart is empty")]
    Empty,

    #[error("No cart item at position {0}")]
    NoSuchItem(usize),

    #[error("Cart total overflowed")]
    Overflow,
}

pub type CartResult<T> = Result<T, CartError>;

/// An amount of money in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Price {
    cents: u64,
}

impl Price {
    pub const ZERO: Price = Price { cents: 0 };

    pub fn from_cents(cents: u64) -> Self {
        Self { cents }
    }

    pub fn cents(&self) -> u64 {
        self.cents
    }

    /// Parse catalog price text such as `"$275.00"`, `"275"` or `"$1,275.5"`.
    ///
    /// # Errors
    /// Returns `CartError::InvalidPrice` for empty, negative or non-numeric text
    /// and for more than two decimal places
    pub fn parse(text: &str) -> CartResult<Self> {
        let invalid = || CartError::InvalidPrice(text.to_string());

        let trimmed = text.trim();
        let digits = trimmed.strip_prefix('$').unwrap_or(trimmed).trim().replace(',', "");
        let (whole, fraction) = match digits.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (digits.as_str(), ""),
        };

        let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() && fraction.is_empty()
            || !is_digits(whole)
            || !is_digits(fraction)
            || fraction.len() > 2
        {
            return Err(invalid());
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let fraction: u64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        whole
            .checked_mul(100)
            .and_then(|cents| cents.checked_add(fraction))
            .map(Price::from_cents)
            .ok_or_else(invalid)
    }

    pub fn checked_add(self, other: Price) -> Option<Price> {
        self.cents.checked_add(other.cents).map(Price::from_cents)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.cents / 100, self.cents % 100)
    }
}

impl FromStr for Price {
    type Err = CartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Price::parse(s)
    }
}

/// A collection for one grade, placed in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub collection: String,
    pub grade: String,
    pub price: Price,
}

impl CartItem {
    pub fn new(collection: impl Into<String>, grade: impl Into<String>, price: Price) -> Self {
        Self {
            collection: collection.into(),
            grade: grade.into(),
            price,
        }
    }
}

/// Result of a checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub order_id: Uuid,
    pub items: Vec<CartItem>,
    pub total: Price,
    pub placed_at: DateTime<Utc>,
}

/// In-memory cart for the current session.
#[derive(Debug, Clone, Default)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: CartItem) -> &CartItem {
        self.items.push(item);
        &self.items[self.items.len() - 1]
    }

    /// Remove the item at a zero-based position.
    pub fn remove(&mut self, index: usize) -> CartResult<CartItem> {
        if index >= self.items.len() {
            return Err(CartError::NoSuchItem(index));
        }
        Ok(self.items.remove(index))
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of item prices.
    pub fn total(&self) -> CartResult<Price> {
        self.items
            .iter()
            .try_fold(Price::ZERO, |total, item| total.checked_add(item.price))
            .ok_or(CartError::Overflow)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Turn the cart into a receipt and empty it.
    ///
    /// # Errors
    /// Returns `CartError::Empty` if there is nothing to check out; the cart is
    /// left untouched on any error
    pub fn checkout(&mut self) -> CartResult<Receipt> {
        if self.items.is_empty() {
            return Err(CartError::Empty);
        }
        let total = self.total()?;

        Ok(Receipt {
            order_id: Uuid::new_v4(),
            items: std::mem::take(&mut self.items),
            total,
            placed_at: Utc::now(),
        })
    }
}
