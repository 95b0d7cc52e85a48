//! Typed invoice data produced by the normalizer.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Danish VAT category of a line or charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum TaxCategory {
    /// 25% Danish VAT.
    #[default]
    StandardRated,
    /// 0% (exports, exempt goods).
    ZeroRated,
}

impl TaxCategory {
    /// Category ID from the OIOUBL tax category code list.
    pub fn code(&self) -> &'static str {
        match self {
            TaxCategory::StandardRated => "StandardRated",
            TaxCategory::ZeroRated => "ZeroRated",
        }
    }

    /// Rate as a fraction (0.25 for 25%).
    pub fn rate(&self) -> Decimal {
        match self {
            TaxCategory::StandardRated => Decimal::new(25, 2),
            TaxCategory::ZeroRated => Decimal::ZERO,
        }
    }

    /// Rate as a percentage (25 for 25%).
    pub fn percent(&self) -> Decimal {
        self.rate() * Decimal::ONE_HUNDRED
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "StandardRated" => Some(TaxCategory::StandardRated),
            "ZeroRated" => Some(TaxCategory::ZeroRated),
            _ => None,
        }
    }
}

/// Postal address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    /// ISO 3166 alpha-2 code.
    pub country: String,
}

impl Address {
    /// Check if the address has any data besides the country.
    pub fn is_empty(&self) -> bool {
        self.street.is_none() && self.postal_code.is_none() && self.city.is_none()
    }

    /// True when every part required by the StructuredDK address format is present.
    pub fn is_structured(&self) -> bool {
        self.street.is_some()
            && self.building_number.is_some()
            && self.postal_code.is_some()
            && self.city.is_some()
    }

    /// Format address as a single line.
    pub fn format(&self) -> String {
        let mut parts = Vec::new();
        match (&self.street, &self.building_number) {
            (Some(street), Some(number)) => parts.push(format!("{} {}", street, number)),
            (Some(street), None) => parts.push(street.clone()),
            _ => {}
        }
        match (&self.postal_code, &self.city) {
            (Some(postal), Some(city)) => parts.push(format!("{} {}", postal, city)),
            (None, Some(city)) => parts.push(city.clone()),
            (Some(postal), None) => parts.push(postal.clone()),
            (None, None) => {}
        }
        if self.country != "DK" {
            parts.push(self.country.clone());
        }
        parts.join(", ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Contact {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone.is_none() && self.email.is_none()
    }
}

/// Supplier or customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub address: Address,

    /// Danish business register number, digits only once validated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvr: Option<String>,

    /// VAT (SE) number, usually "DK" + CVR.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gln: Option<String>,

    pub contact: Contact,
}

/// A single line item on the invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Seller's item number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_number: Option<String>,

    pub description: String,

    /// Absent when the extracted text was missing or malformed.
    pub quantity: Option<Decimal>,

    /// UN/ECE Recommendation 20 unit code.
    pub unit_code: String,

    pub unit_price: Option<Decimal>,

    /// Discount in percent (62 means 62% off).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<Decimal>,

    pub tax_category: TaxCategory,

    /// Line total as printed on the invoice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stated_total: Option<Decimal>,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            item_number: None,
            description: description.into(),
            quantity: Some(quantity),
            unit_code: "EA".to_string(),
            unit_price: Some(unit_price),
            discount_percent: None,
            tax_category: TaxCategory::StandardRated,
            stated_total: None,
        }
    }

    /// Unit price after the line discount, unrounded.
    ///
    /// `None` when the price is missing or the result is out of range.
    pub fn net_unit_price(&self) -> Option<Decimal> {
        let price = self.unit_price?;
        match self.discount_percent {
            Some(discount) => price
                .checked_mul(Decimal::ONE_HUNDRED.checked_sub(discount)?)?
                .checked_div(Decimal::ONE_HUNDRED),
            None => Some(price),
        }
    }

    /// Quantity times discounted unit price, unrounded.
    ///
    /// `None` when an input is missing or the product is out of range.
    pub fn net_amount(&self) -> Option<Decimal> {
        self.quantity?.checked_mul(self.net_unit_price()?)
    }

    /// Quantity and price are both present but their product does not fit a `Decimal`.
    pub fn is_out_of_range(&self) -> bool {
        self.quantity.is_some() && self.unit_price.is_some() && self.net_amount().is_none()
    }
}

/// Surcharge added at document level (fees, freight).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalCharge {
    /// UNCL 7161 reason code (ENV, FC, ZZZ).
    pub reason_code: String,
    pub label: String,
    pub amount: Decimal,
}

/// Danish FIK (indbetalingskort) payment line `+71<...+...<`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FikPayment {
    /// Card type: 71, 73 or 75.
    pub card_type: String,
    /// Payment identification (15 digits for 71, 16 for 75, none for 73).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    /// 8-digit creditor number.
    pub creditor_account: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reg_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bic: Option<String>,
}

impl BankAccount {
    pub fn is_empty(&self) -> bool {
        self.reg_number.is_none() && self.account_number.is_none() && self.iban.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank: Option<BankAccount>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fik: Option<FikPayment>,
}

/// Payment means as rendered, by precedence FIK > bank transfer > unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMeansKind {
    Fik,
    Bank,
    Unspecified,
}

impl PaymentMeansKind {
    /// UNCL 4461 payment means code.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentMeansKind::Fik => "93",
            PaymentMeansKind::Bank => "42",
            PaymentMeansKind::Unspecified => "1",
        }
    }
}

impl PaymentInfo {
    pub fn means(&self) -> PaymentMeansKind {
        if self.fik.is_some() {
            PaymentMeansKind::Fik
        } else if self.bank.as_ref().is_some_and(|b| !b.is_empty()) {
            PaymentMeansKind::Bank
        } else {
            PaymentMeansKind::Unspecified
        }
    }
}

/// Something the normalizer had to assume or drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationNote {
    pub field: String,
    pub message: String,
}

/// Typed invoice fields ready for validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedInvoiceFields {
    pub invoice_number: String,
    pub issue_date: NaiveDate,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,

    /// ISO 4217 code.
    pub currency: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_reference: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,

    pub supplier: Party,
    pub customer: Party,

    /// Customer was replaced by the configured default customer.
    pub customer_is_default: bool,

    pub line_items: Vec<LineItem>,
    pub charges: Vec<AdditionalCharge>,
    pub payment: PaymentInfo,

    /// Grand total including VAT as printed on the invoice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stated_total: Option<Decimal>,

    pub notes: Vec<NormalizationNote>,
}

/// Identity of a party after directory resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvr: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gln: Option<String>,
}
