//! External product catalog: record shape, normalization and sources.
//!
//! A source returns either a bare JSON array of records or an object with
//! the array under `products`. Records are loosely shaped; every default is
//! applied in one place, `CatalogRecord::normalize`.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::product::ProductDraft;

/// Default timeout for catalog HTTP requests.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog source address is not configured")]
    MissingAddress,

    #[error("invalid catalog source address '{0}'")]
    InvalidAddress(String),

    #[error("reqwest error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog source returned status {0}")]
    Status(u16),

    #[error("catalog payload is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("catalog payload is neither a list nor an object with 'products'")]
    UnexpectedShape,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Errors caused by configuration rather than by the source itself.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingAddress | Self::InvalidAddress(_))
    }
}

/// A record as delivered by the catalog source.
///
/// Sources are loosely typed, so the raw JSON is kept as is and every field
/// is checked in `normalize`. A badly typed field fails only its own record.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRecord(Value);

/// Why a single catalog record could not be turned into a product.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("catalog record '{name}' has no identifier")]
    MissingIdentifier { name: String },

    #[error("catalog record is {found}, expected an object")]
    NotAnObject { found: &'static str },

    #[error("product {product_id}: field '{field}' is {found}, expected {expected}")]
    InvalidField {
        product_id: String,
        field: &'static str,
        found: &'static str,
        expected: &'static str,
    },
}

impl CatalogRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    /// `id`, falling back to `product_id`. Strings and numbers are accepted;
    /// blank strings count as absent.
    pub fn identifier(&self) -> Option<String> {
        ["id", "product_id"]
            .into_iter()
            .filter_map(|name| self.field(name))
            .find_map(|value| match value {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    /// Name for logs and failure reports; empty when absent or not text.
    pub fn display_name(&self) -> String {
        match self.field("name") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    /// Map to a draft product, applying defaults:
    /// - name, brand, category, image_url: empty string
    /// - effects, ingredients: empty list; a single string becomes one entry
    /// - price: 0 when absent, unparseable, negative or non-finite
    ///
    /// Numbers are accepted where text is expected. Objects, booleans and
    /// nested lists are rejected with `RecordError::InvalidField`.
    pub fn normalize(&self) -> Result<ProductDraft, RecordError> {
        if !self.0.is_object() {
            return Err(RecordError::NotAnObject {
                found: kind_of(&self.0),
            });
        }
        let Some(product_id) = self.identifier() else {
            return Err(RecordError::MissingIdentifier {
                name: self.display_name(),
            });
        };

        Ok(ProductDraft {
            name: self.text("name", &product_id)?,
            brand: self.text("brand", &product_id)?,
            category: self.text("category", &product_id)?,
            effects: self.list("effects", &product_id)?,
            ingredients: self.list("ingredients", &product_id)?,
            price: normalize_price(self.field("price"), &product_id),
            image_url: self.text("image_url", &product_id)?,
            product_id,
        })
    }

    fn text(&self, field: &'static str, product_id: &str) -> Result<String, RecordError> {
        match self.field(field) {
            None => Ok(String::new()),
            Some(value) => scalar_text(value)
                .ok_or_else(|| invalid_field(product_id, field, value, "text")),
        }
    }

    fn list(&self, field: &'static str, product_id: &str) -> Result<Vec<String>, RecordError> {
        match self.field(field) {
            None => Ok(Vec::new()),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(vec![s.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .filter(|item| !item.is_null())
                .map(|item| {
                    scalar_text(item)
                        .ok_or_else(|| invalid_field(product_id, field, item, "a list of text"))
                })
                .collect(),
            Some(value) => Err(invalid_field(product_id, field, value, "a list of text")),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn invalid_field(
    product_id: &str,
    field: &'static str,
    value: &Value,
    expected: &'static str,
) -> RecordError {
    RecordError::InvalidField {
        product_id: product_id.to_string(),
        field,
        found: kind_of(value),
        expected,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn normalize_price(value: Option<&Value>, product_id: &str) -> f64 {
    let parsed = match value {
        None | Some(Value::Null) => return 0.0,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(p) if p.is_finite() && p >= 0.0 => p,
        _ => {
            log::warn!("Product {product_id}: invalid price {value:?}, using 0");
            0.0
        }
    }
}

/// Decode a catalog payload: a bare list, or a list under `products`.
///
/// Only the payload shape is checked here; records are validated one by one
/// during ingestion.
pub fn parse_catalog(payload: Value) -> Result<Vec<CatalogRecord>, CatalogError> {
    let list = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("products") {
            Some(Value::Array(items)) => items,
            _ => return Err(CatalogError::UnexpectedShape),
        },
        _ => return Err(CatalogError::UnexpectedShape),
    };

    Ok(list.into_iter().map(CatalogRecord::new).collect())
}

/// Where catalog records come from.
pub trait CatalogSource: Send + Sync {
    fn fetch(&self) -> Result<Vec<CatalogRecord>, CatalogError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Catalog behind an HTTP endpoint (e.g. a workflow webhook).
pub struct HttpCatalogSource {
    url: Option<String>,
    timeout: Duration,
}

impl HttpCatalogSource {
    pub fn new(url: Option<String>, timeout: Duration) -> Self {
        Self { url, timeout }
    }
}

impl CatalogSource for HttpCatalogSource {
    fn fetch(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
        let url = self
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or(CatalogError::MissingAddress)?;
        let url =
            url::Url::parse(url).map_err(|_| CatalogError::InvalidAddress(url.to_string()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;

        log::debug!("{url}: requesting catalog");
        let resp = client.get(url.clone()).send()?;

        let status = resp.status();
        if !status.is_success() {
            log::error!("{url}: catalog request failed with {status}");
            return Err(CatalogError::Status(status.as_u16()));
        }

        let payload: Value = resp.json()?;
        parse_catalog(payload)
    }

    fn describe(&self) -> String {
        self.url.clone().unwrap_or_else(|| "<unset>".to_string())
    }
}

/// Catalog exported to a JSON file.
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CatalogSource for FileCatalogSource {
    fn fetch(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
        let contents = std::fs::read_to_string(&self.path)?;
        parse_catalog(serde_json::from_str(&contents)?)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
