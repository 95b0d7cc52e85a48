//! Data models: raw extraction output, typed invoice fields and configuration.

pub mod config;
pub mod invoice;
pub mod raw;

pub use config::{AppConfig, DefaultCustomer};
pub use invoice::{
    AdditionalCharge, Address, BankAccount, Contact, FikPayment, LineItem, NormalizationNote,
    NormalizedInvoiceFields, Party, PaymentInfo, PaymentMeansKind, ResolvedIdentity, TaxCategory,
};
pub use raw::{Field, RawExtraction, RawLineItem, RawParty, TokenUsage};
