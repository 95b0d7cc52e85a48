//! OIOUBL 2.02 rendering.
//!
//! Element order follows the UBL 2.0 Invoice schema as profiled by OIOUBL.
//! Optional elements are left out entirely when there is no value.

use rust_decimal::Decimal;

use crate::models::invoice::{Address, Contact, PaymentMeansKind, TaxCategory};
use crate::validate::identifiers::format_vat_number;

use super::totals::CHARGE_TAX_CATEGORY;
use super::xml::{XmlResult, XmlWriter, format_amount, format_decimal};
use super::{CompiledInvoice, CompiledLine};

pub mod ns {
    pub const INVOICE: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
    pub const CAC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
    pub const CBC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
    pub const CCTS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CoreComponentParameters-2";
    pub const SDT: &str = "urn:oasis:names:specification:ubl:schema:xsd:SpecializedDatatypes-2";
    pub const UDT: &str = "urn:un:unece:uncefact:data:specification:UnqualifiedDataTypesSchemaModule:2";
}

pub const UBL_VERSION_ID: &str = "2.0";
pub const CUSTOMIZATION_ID: &str = "OIOUBL-2.02";
pub const PROFILE_ID: &str = "urn:www.nesubl.eu:profiles:profile5:ver2.0";
pub const INVOICE_TYPE_CODE: &str = "380";

const OIOUBL_AGENCY: &str = "320";
const PROFILE_SCHEME: &str = "urn:oioubl:id:profileid-1.2";
const INVOICE_TYPE_LIST: &str = "urn:oioubl:codelist:invoicetypecode-1.1";
const TAX_CATEGORY_SCHEME: &str = "urn:oioubl:id:taxcategoryid-1.1";
const TAX_SCHEME_SCHEME: &str = "urn:oioubl:id:taxschemeid-1.1";

/// Which side of the trade a party block describes.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Supplier,
    Customer,
}

pub fn render(invoice: &CompiledInvoice) -> XmlResult<String> {
    let fields = &invoice.fields;
    let currency = fields.currency.as_str();
    let mut w = XmlWriter::new()?;

    w.start_element_with_attrs(
        "Invoice",
        &[
            ("xmlns", ns::INVOICE),
            ("xmlns:cac", ns::CAC),
            ("xmlns:cbc", ns::CBC),
            ("xmlns:ccts", ns::CCTS),
            ("xmlns:sdt", ns::SDT),
            ("xmlns:udt", ns::UDT),
        ],
    )?;

    w.text_element("cbc:UBLVersionID", UBL_VERSION_ID)?;
    w.text_element("cbc:CustomizationID", CUSTOMIZATION_ID)?;
    w.text_element_with_attrs(
        "cbc:ProfileID",
        &[("schemeAgencyID", OIOUBL_AGENCY), ("schemeID", PROFILE_SCHEME)],
        PROFILE_ID,
    )?;
    w.text_element("cbc:ID", &fields.invoice_number)?;
    w.text_element("cbc:CopyIndicator", "false")?;
    w.text_element("cbc:UUID", &invoice.uuid)?;
    w.text_element("cbc:IssueDate", &fields.issue_date.to_string())?;
    w.text_element_with_attrs(
        "cbc:InvoiceTypeCode",
        &[("listAgencyID", OIOUBL_AGENCY), ("listID", INVOICE_TYPE_LIST)],
        INVOICE_TYPE_CODE,
    )?;
    w.text_element("cbc:DocumentCurrencyCode", currency)?;
    w.text_element("cbc:LineCountNumeric", &invoice.lines.len().to_string())?;

    write_order_reference(&mut w, invoice)?;
    write_party(&mut w, invoice, Role::Supplier)?;
    write_party(&mut w, invoice, Role::Customer)?;
    write_payment_means(&mut w, invoice)?;
    write_payment_terms(&mut w, invoice)?;

    for (index, charge) in fields.charges.iter().enumerate() {
        w.start_element("cac:AllowanceCharge")?;
        w.text_element("cbc:ID", &(index + 1).to_string())?;
        w.text_element("cbc:ChargeIndicator", "true")?;
        w.text_element("cbc:AllowanceChargeReasonCode", &charge.reason_code)?;
        w.text_element("cbc:AllowanceChargeReason", &charge.label)?;
        w.text_element("cbc:SequenceNumeric", &(index + 1).to_string())?;
        w.amount_element("cbc:Amount", charge.amount, currency)?;
        write_tax_category(&mut w, CHARGE_TAX_CATEGORY)?;
        w.end_element("cac:AllowanceCharge")?;
    }

    w.start_element("cac:TaxTotal")?;
    w.amount_element("cbc:TaxAmount", invoice.totals.total_tax, currency)?;
    for subtotal in &invoice.totals.subtotals {
        w.start_element("cac:TaxSubtotal")?;
        w.amount_element("cbc:TaxableAmount", subtotal.taxable_amount, currency)?;
        w.amount_element("cbc:TaxAmount", subtotal.tax_amount, currency)?;
        write_tax_category(&mut w, subtotal.category)?;
        w.end_element("cac:TaxSubtotal")?;
    }
    w.end_element("cac:TaxTotal")?;

    // OIOUBL defines TaxExclusiveAmount as the total VAT amount.
    let totals = &invoice.totals;
    w.start_element("cac:LegalMonetaryTotal")?;
    w.amount_element("cbc:LineExtensionAmount", totals.line_extension, currency)?;
    w.amount_element("cbc:TaxExclusiveAmount", totals.total_tax, currency)?;
    w.amount_element("cbc:TaxInclusiveAmount", totals.amount_after_tax, currency)?;
    if !fields.charges.is_empty() {
        w.amount_element("cbc:ChargeTotalAmount", totals.charge_total, currency)?;
    }
    w.amount_element("cbc:PayableAmount", totals.payable(), currency)?;
    w.end_element("cac:LegalMonetaryTotal")?;

    for line in &invoice.lines {
        write_line(&mut w, line, currency)?;
    }

    w.end_element("Invoice")?;
    w.into_string()
}

fn write_order_reference(w: &mut XmlWriter, invoice: &CompiledInvoice) -> XmlResult<()> {
    let fields = &invoice.fields;
    let id = fields
        .customer_reference
        .as_deref()
        .or(fields.order_number.as_deref())
        .unwrap_or(&fields.invoice_number);

    w.start_element("cac:OrderReference")?;
    w.text_element("cbc:ID", id)?;
    w.optional_text_element("cbc:SalesOrderID", fields.order_number.as_deref())?;
    w.text_element("cbc:IssueDate", &fields.issue_date.to_string())?;
    w.end_element("cac:OrderReference")
}

fn write_party(w: &mut XmlWriter, invoice: &CompiledInvoice, role: Role) -> XmlResult<()> {
    let (wrapper, party, identity) = match role {
        Role::Supplier => (
            "cac:AccountingSupplierParty",
            &invoice.fields.supplier,
            &invoice.supplier,
        ),
        Role::Customer => (
            "cac:AccountingCustomerParty",
            &invoice.fields.customer,
            &invoice.customer,
        ),
    };
    let name = party.name.as_deref().unwrap_or(&identity.name);
    let cvr_id = identity.cvr.as_deref().map(format_vat_number);

    w.start_element(wrapper)?;
    w.start_element("cac:Party")?;

    match (&identity.gln, &cvr_id) {
        (Some(gln), _) => w.text_element_with_attrs(
            "cbc:EndpointID",
            &[("schemeAgencyID", "9"), ("schemeID", "GLN")],
            gln,
        )?,
        (None, Some(cvr)) => {
            w.text_element_with_attrs("cbc:EndpointID", &[("schemeID", "DK:CVR")], cvr)?
        }
        (None, None) => {}
    }

    if let Some(cvr) = &cvr_id {
        w.start_element("cac:PartyIdentification")?;
        w.text_element_with_attrs("cbc:ID", &[("schemeID", "DK:CVR")], cvr)?;
        w.end_element("cac:PartyIdentification")?;
    }

    w.start_element("cac:PartyName")?;
    w.text_element("cbc:Name", name)?;
    w.end_element("cac:PartyName")?;

    write_address(w, &party.address)?;

    let vat_number = party.vat_number.clone().or_else(|| cvr_id.clone());
    if let Some(vat) = vat_number {
        w.start_element("cac:PartyTaxScheme")?;
        w.text_element_with_attrs("cbc:CompanyID", &[("schemeID", "DK:SE")], &vat)?;
        write_tax_scheme(w)?;
        w.end_element("cac:PartyTaxScheme")?;
    }

    w.start_element("cac:PartyLegalEntity")?;
    w.text_element("cbc:RegistrationName", name)?;
    if let Some(cvr) = &cvr_id {
        w.text_element_with_attrs("cbc:CompanyID", &[("schemeID", "DK:CVR")], cvr)?;
    }
    w.end_element("cac:PartyLegalEntity")?;

    write_contact(w, &party.contact)?;

    w.end_element("cac:Party")?;
    w.end_element(wrapper)
}

fn write_address(w: &mut XmlWriter, address: &Address) -> XmlResult<()> {
    let format = if address.is_structured() {
        "StructuredDK"
    } else {
        "StructuredLax"
    };
    w.start_element("cac:PostalAddress")?;
    w.text_element_with_attrs(
        "cbc:AddressFormatCode",
        &[
            ("listAgencyID", OIOUBL_AGENCY),
            ("listID", "urn:oioubl:codelist:addressformatcode-1.1"),
        ],
        format,
    )?;
    w.optional_text_element("cbc:StreetName", address.street.as_deref())?;
    w.optional_text_element("cbc:BuildingNumber", address.building_number.as_deref())?;
    w.optional_text_element("cbc:CityName", address.city.as_deref())?;
    w.optional_text_element("cbc:PostalZone", address.postal_code.as_deref())?;
    w.start_element("cac:Country")?;
    w.text_element("cbc:IdentificationCode", &address.country)?;
    w.end_element("cac:Country")?;
    w.end_element("cac:PostalAddress")
}

/// Contact block, identified by e-mail, name or phone in that order.
/// Omitted when none of them is known.
fn write_contact(w: &mut XmlWriter, contact: &Contact) -> XmlResult<()> {
    let Some(id) = contact
        .email
        .as_deref()
        .or(contact.name.as_deref())
        .or(contact.phone.as_deref())
    else {
        return Ok(());
    };
    w.start_element("cac:Contact")?;
    w.text_element("cbc:ID", id)?;
    w.optional_text_element("cbc:Name", contact.name.as_deref())?;
    w.optional_text_element("cbc:Telephone", contact.phone.as_deref())?;
    w.optional_text_element("cbc:ElectronicMail", contact.email.as_deref())?;
    w.end_element("cac:Contact")
}

fn write_payment_means(w: &mut XmlWriter, invoice: &CompiledInvoice) -> XmlResult<()> {
    let fields = &invoice.fields;
    let payment = &fields.payment;
    let kind = payment.means();

    w.start_element("cac:PaymentMeans")?;
    w.text_element("cbc:ID", "1")?;
    w.text_element("cbc:PaymentMeansCode", kind.code())?;
    if let Some(due) = fields.due_date {
        w.text_element("cbc:PaymentDueDate", &due.to_string())?;
    }

    match (kind, &payment.fik, &payment.bank) {
        (PaymentMeansKind::Fik, Some(fik), _) => {
            w.text_element_with_attrs("cbc:PaymentChannelCode", &[("listAgencyID", OIOUBL_AGENCY)], "DK:FIK")?;
            w.optional_text_element("cbc:InstructionID", fik.payment_id.as_deref())?;
            w.text_element("cbc:PaymentID", &fik.card_type)?;
            w.start_element("cac:CreditAccount")?;
            w.text_element("cbc:AccountID", &fik.creditor_account)?;
            w.end_element("cac:CreditAccount")?;
        }
        (PaymentMeansKind::Bank, _, Some(bank)) => {
            let domestic = bank.reg_number.is_some() && bank.account_number.is_some();
            let channel = if domestic { "DK:BANK" } else { "IBAN" };
            w.text_element_with_attrs("cbc:PaymentChannelCode", &[("listAgencyID", OIOUBL_AGENCY)], channel)?;
            w.start_element("cac:PayeeFinancialAccount")?;
            if domestic {
                w.optional_text_element("cbc:ID", bank.account_number.as_deref())?;
                w.start_element("cac:FinancialInstitutionBranch")?;
                w.optional_text_element("cbc:ID", bank.reg_number.as_deref())?;
                w.end_element("cac:FinancialInstitutionBranch")?;
            } else {
                w.optional_text_element("cbc:ID", bank.iban.as_deref())?;
                if let Some(bic) = &bank.bic {
                    w.start_element("cac:FinancialInstitutionBranch")?;
                    w.start_element("cac:FinancialInstitution")?;
                    w.text_element("cbc:ID", bic)?;
                    w.end_element("cac:FinancialInstitution")?;
                    w.end_element("cac:FinancialInstitutionBranch")?;
                }
            }
            w.end_element("cac:PayeeFinancialAccount")?;
        }
        _ => {}
    }

    w.end_element("cac:PaymentMeans")
}

fn write_payment_terms(w: &mut XmlWriter, invoice: &CompiledInvoice) -> XmlResult<()> {
    let fields = &invoice.fields;
    w.start_element("cac:PaymentTerms")?;
    w.text_element("cbc:ID", "1")?;
    w.text_element("cbc:PaymentMeansID", "1")?;
    w.optional_text_element("cbc:Note", fields.payment.terms.as_deref())?;
    w.amount_element("cbc:Amount", invoice.totals.payable(), &fields.currency)?;
    if let Some(due) = fields.due_date {
        w.start_element("cac:SettlementPeriod")?;
        w.text_element("cbc:EndDate", &due.to_string())?;
        w.end_element("cac:SettlementPeriod")?;
    }
    w.end_element("cac:PaymentTerms")
}

fn write_tax_scheme(w: &mut XmlWriter) -> XmlResult<()> {
    w.start_element("cac:TaxScheme")?;
    w.text_element_with_attrs(
        "cbc:ID",
        &[("schemeAgencyID", OIOUBL_AGENCY), ("schemeID", TAX_SCHEME_SCHEME)],
        "63",
    )?;
    w.text_element("cbc:Name", "Moms")?;
    w.end_element("cac:TaxScheme")
}

fn write_tax_category(w: &mut XmlWriter, category: TaxCategory) -> XmlResult<()> {
    w.start_element("cac:TaxCategory")?;
    w.text_element_with_attrs(
        "cbc:ID",
        &[("schemeAgencyID", OIOUBL_AGENCY), ("schemeID", TAX_CATEGORY_SCHEME)],
        category.code(),
    )?;
    w.text_element("cbc:Percent", &format_amount(category.percent()))?;
    write_tax_scheme(w)?;
    w.end_element("cac:TaxCategory")
}

fn write_line(w: &mut XmlWriter, line: &CompiledLine, currency: &str) -> XmlResult<()> {
    let item = &line.item;
    w.start_element("cac:InvoiceLine")?;
    w.text_element("cbc:ID", &line.line_number.to_string())?;
    w.text_element_with_attrs(
        "cbc:InvoicedQuantity",
        &[("unitCode", item.unit_code.as_str())],
        &format_decimal(line.quantity),
    )?;
    w.amount_element("cbc:LineExtensionAmount", line.line_extension, currency)?;

    w.start_element("cac:TaxTotal")?;
    w.amount_element("cbc:TaxAmount", line.tax_amount, currency)?;
    w.start_element("cac:TaxSubtotal")?;
    w.amount_element("cbc:TaxableAmount", line.line_extension, currency)?;
    w.amount_element("cbc:TaxAmount", line.tax_amount, currency)?;
    write_tax_category(w, item.tax_category)?;
    w.end_element("cac:TaxSubtotal")?;
    w.end_element("cac:TaxTotal")?;

    let name = if item.description.trim().is_empty() {
        format!("Linje {}", line.line_number)
    } else {
        item.description.clone()
    };
    w.start_element("cac:Item")?;
    w.text_element("cbc:Description", &name)?;
    w.text_element("cbc:Name", &name)?;
    if let Some(number) = &item.item_number {
        w.start_element("cac:SellersItemIdentification")?;
        w.text_element("cbc:ID", number)?;
        w.end_element("cac:SellersItemIdentification")?;
    }
    w.end_element("cac:Item")?;

    // Price carries more than two decimals when the discount demands it
    w.start_element("cac:Price")?;
    w.text_element_with_attrs(
        "cbc:PriceAmount",
        &[("currencyID", currency)],
        &format_price(line.net_unit_price),
    )?;
    w.text_element_with_attrs("cbc:BaseQuantity", &[("unitCode", item.unit_code.as_str())], "1")?;
    w.end_element("cac:Price")?;

    w.end_element("cac:InvoiceLine")
}

fn format_price(price: Decimal) -> String {
    let rounded = price.round_dp(4).normalize();
    if rounded.scale() <= 2 {
        format_amount(rounded)
    } else {
        rounded.to_string()
    }
}
