//! Raw field set as returned by the field extractor.
//!
//! Every value is wrapped in [`Field`] so downstream code has to decide what
//! an absent value means instead of receiving an empty string.

use serde::{Deserialize, Serialize};

/// A single extracted value, or an explicit marker that the extractor found nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum Field<T> {
    Present(T),
    Absent,
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> Field<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Field::Present(_))
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Present(v) => Field::Present(v),
            Field::Absent => Field::Absent,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Present(v) => Some(v),
            Field::Absent => None,
        }
    }

    pub fn or(self, other: Field<T>) -> Field<T> {
        match self {
            Field::Present(_) => self,
            Field::Absent => other,
        }
    }
}

impl Field<String> {
    /// Build from optional text, treating blank text as absent.
    pub fn text(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => Field::Present(v.to_string()),
            _ => Field::Absent,
        }
    }

    /// Borrow the trimmed text when present.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::Present(v) => Some(v.as_str()),
            Field::Absent => None,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Present(v),
            None => Field::Absent,
        }
    }
}

impl From<&str> for Field<String> {
    fn from(value: &str) -> Self {
        Field::text(Some(value))
    }
}

/// Token counts for one extraction call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(model: impl Into<String>, prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            model: model.into(),
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Supplier or customer block as extracted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawParty {
    pub name: Field<String>,
    pub street: Field<String>,
    pub city: Field<String>,
    pub postal_code: Field<String>,
    pub country: Field<String>,
    pub cvr: Field<String>,
    pub vat_number: Field<String>,
    pub contact_name: Field<String>,
    pub contact_phone: Field<String>,
    pub contact_email: Field<String>,
}

impl RawParty {
    /// A party block with only a name.
    pub fn named(name: &str) -> Self {
        Self {
            name: Field::from(name),
            ..Default::default()
        }
    }

    /// True when the extractor produced nothing usable for this party.
    pub fn is_empty(&self) -> bool {
        ![
            &self.name,
            &self.street,
            &self.city,
            &self.postal_code,
            &self.cvr,
            &self.vat_number,
        ]
        .iter()
        .any(|f| f.is_present())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLineItem {
    pub item_number: Field<String>,
    pub description: Field<String>,
    pub quantity: Field<String>,
    pub unit: Field<String>,
    pub unit_price: Field<String>,
    pub discount_percent: Field<String>,
    pub line_total: Field<String>,
    pub tax_category: Field<String>,
}

/// Kind of surcharge found on the invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeKind {
    Environmental,
    Freight,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCharge {
    pub kind: ChargeKind,
    pub label: Field<String>,
    pub amount: Field<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPayment {
    pub terms: Field<String>,
    pub means_code: Field<String>,
    pub fik_code: Field<String>,
    pub reg_number: Field<String>,
    pub account_number: Field<String>,
    pub iban: Field<String>,
    pub bic: Field<String>,
}

/// Best-effort field set for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawExtraction {
    pub invoice_number: Field<String>,
    pub issue_date: Field<String>,
    pub due_date: Field<String>,
    pub currency: Field<String>,
    pub customer_reference: Field<String>,
    pub order_number: Field<String>,
    pub supplier: RawParty,
    pub customer: RawParty,
    pub line_items: Vec<RawLineItem>,
    pub charges: Vec<RawCharge>,
    pub payment: RawPayment,
    pub total_amount: Field<String>,
    /// One entry per extraction call made for this document.
    pub usage: Vec<TokenUsage>,
}
