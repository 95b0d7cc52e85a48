//! Small element-oriented wrapper around the quick-xml writer.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use rust_decimal::Decimal;

use crate::normalize::rules::round_money;

/// Error raised while writing XML.
#[derive(Debug, thiserror::Error)]
#[error("XML error: {0}")]
pub struct XmlError(pub String);

pub type XmlResult<T> = std::result::Result<T, XmlError>;

fn xml_err<E: std::fmt::Display>(e: E) -> XmlError {
    XmlError(e.to_string())
}

/// Writes an indented UTF-8 document.
pub struct XmlWriter {
    writer: Writer<Vec<u8>>,
}

impl XmlWriter {
    /// Start a document with its XML declaration.
    pub fn new() -> XmlResult<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;
        Ok(Self { writer })
    }

    pub fn start_element(&mut self, name: &str) -> XmlResult<()> {
        self.writer
            .write_event(Event::Start(BytesStart::new(name)))
            .map_err(xml_err)
    }

    pub fn start_element_with_attrs(&mut self, name: &str, attrs: &[(&str, &str)]) -> XmlResult<()> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Start(start)).map_err(xml_err)
    }

    pub fn end_element(&mut self, name: &str) -> XmlResult<()> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_err)
    }

    pub fn text_element(&mut self, name: &str, text: &str) -> XmlResult<()> {
        self.text_element_with_attrs(name, &[], text)
    }

    pub fn text_element_with_attrs(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> XmlResult<()> {
        self.start_element_with_attrs(name, attrs)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_err)?;
        self.end_element(name)
    }

    /// Write the element only when a non-blank value is given.
    pub fn optional_text_element(&mut self, name: &str, text: Option<&str>) -> XmlResult<()> {
        match text.map(str::trim) {
            Some(text) if !text.is_empty() => self.text_element(name, text),
            _ => Ok(()),
        }
    }

    /// Monetary amount with two decimals and a currencyID attribute.
    pub fn amount_element(&mut self, name: &str, amount: Decimal, currency: &str) -> XmlResult<()> {
        let text = format_amount(amount);
        self.text_element_with_attrs(name, &[("currencyID", currency)], &text)
    }

    pub fn into_string(self) -> XmlResult<String> {
        String::from_utf8(self.writer.into_inner()).map_err(xml_err)
    }
}

/// Two-decimal rendering used for every monetary element.
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", round_money(amount))
}

/// Decimal rendering without trailing zeros (quantities, percentages).
pub fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}
