//! VAT breakdown and monetary totals.
//!
//! All sums are taken over unrounded amounts; rounding to two decimals
//! (half away from zero) happens once per reported total.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::invoice::{AdditionalCharge, LineItem, TaxCategory};
use crate::normalize::rules::round_money;

/// Document-level charges are taxed at the standard rate.
pub const CHARGE_TAX_CATEGORY: TaxCategory = TaxCategory::StandardRated;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxSubtotal {
    pub category: TaxCategory,
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Totals {
    /// One entry per tax category present, in category order.
    pub subtotals: Vec<TaxSubtotal>,
    /// Sum of line net amounts.
    pub line_extension: Decimal,
    pub charge_total: Decimal,
    pub amount_before_tax: Decimal,
    pub total_tax: Decimal,
    pub amount_after_tax: Decimal,
}

impl Totals {
    pub fn payable(&self) -> Decimal {
        self.amount_after_tax
    }
}

/// Compute totals, or `None` when a line has no quantity or price or an
/// amount does not fit a `Decimal`.
pub fn compute_totals(lines: &[LineItem], charges: &[AdditionalCharge]) -> Option<Totals> {
    let mut bases: BTreeMap<TaxCategory, Decimal> = BTreeMap::new();
    let mut line_sum = Decimal::ZERO;

    for line in lines {
        let net = line.net_amount()?;
        line_sum = line_sum.checked_add(net)?;
        let base = bases.entry(line.tax_category).or_default();
        *base = base.checked_add(net)?;
    }

    let charge_sum = charges
        .iter()
        .try_fold(Decimal::ZERO, |sum, c| sum.checked_add(c.amount))?;
    if !charges.is_empty() {
        let base = bases.entry(CHARGE_TAX_CATEGORY).or_default();
        *base = base.checked_add(charge_sum)?;
    }

    let mut unrounded_tax = Decimal::ZERO;
    let mut subtotals = Vec::with_capacity(bases.len());
    for (category, base) in bases {
        let tax = base.checked_mul(category.rate())?;
        unrounded_tax = unrounded_tax.checked_add(tax)?;
        subtotals.push(TaxSubtotal {
            category,
            taxable_amount: round_money(base),
            tax_amount: round_money(tax),
        });
    }

    let line_extension = round_money(line_sum);
    let charge_total = round_money(charge_sum);
    let amount_before_tax = line_extension.checked_add(charge_total)?;
    let total_tax = round_money(unrounded_tax);

    Some(Totals {
        subtotals,
        line_extension,
        charge_total,
        amount_before_tax,
        total_tax,
        amount_after_tax: amount_before_tax.checked_add(total_tax)?,
    })
}
