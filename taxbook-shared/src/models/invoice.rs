/// Invoice and invoice item models (tenant database)
///
/// An invoice snapshots the buyer's details at issue time and owns its line
/// items (`invoice_items.invoice_id`, cascade on delete). Line amounts follow
/// the FBR digital invoicing layout:
///
/// ```text
/// value excl. ST = quantity × unit price − discount     (2 dp)
/// sales tax      = value excl. ST × rate / 100            (2 dp)
/// total          = value excl. ST + sales tax
/// ```
///
/// Quantities must be positive; prices and discounts must not be negative.
/// Every input and computed amount has to fit its column (`DECIMAL(15, 4)`
/// for quantity, `DECIMAL(15, 2)` for money), otherwise the line is rejected
/// with [`InvoiceError::InvalidAmount`].
///
/// Invoices start as `draft` and become `posted` once FBR has issued an
/// invoice number for them.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::str::FromStr;
use validator::Validate;

/// Invoice errors
#[derive(Debug, thiserror::Error)]
pub enum InvoiceError {
    /// Tax rate label could not be parsed
    #[error("Invalid tax rate: {0}")]
    InvalidRate(String),

    /// Amount out of range or of the wrong sign
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Invoice has no line items
    #[error("Invoice must have at least one item")]
    NoItems,

    /// Invoice number already used in this tenant
    #[error("Invoice number already exists: {0}")]
    DuplicateNumber(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Invoice lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Saved locally, not yet submitted
    Draft,

    /// Accepted by FBR
    Posted,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Posted => "posted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InvoiceStatus::Draft),
            "posted" => Some(InvoiceStatus::Posted),
            _ => None,
        }
    }
}

/// Invoice header
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invoice {
    pub id: i64,

    /// Seller-side invoice number, unique per tenant
    pub invoice_number: String,

    /// `Sale Invoice` or `Debit Note`
    pub invoice_type: String,

    pub invoice_date: NaiveDate,
    pub buyer_id: Option<i64>,
    pub buyer_ntn_cnic: String,
    pub buyer_business_name: String,
    pub buyer_province: String,
    pub buyer_address: Option<String>,
    pub buyer_registration_type: String,

    /// Original invoice reference (debit notes only)
    pub invoice_ref_no: Option<String>,

    /// FBR sandbox scenario id, e.g. `SN001`
    pub scenario_id: Option<String>,

    pub status: String,

    /// Number assigned by FBR on successful submission
    pub fbr_invoice_number: Option<String>,

    pub total_value_excl_st: Decimal,
    pub total_sales_tax: Decimal,
    pub total_amount: Decimal,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Gets the parsed status enum
    pub fn get_status(&self) -> Option<InvoiceStatus> {
        InvoiceStatus::from_str(&self.status)
    }
}

/// Invoice line
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InvoiceItem {
    pub id: i64,
    pub invoice_id: i64,
    pub hs_code: String,
    pub product_description: String,
    pub rate: String,
    pub uom: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub value_sales_excluding_st: Decimal,
    pub sales_tax_applicable: Decimal,
    pub total_values: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Invoice with its lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceWithItems {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

/// Input for one invoice line
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateInvoiceItem {
    #[validate(length(min = 1, max = 50))]
    pub hs_code: String,

    #[validate(length(min = 1))]
    pub product_description: String,

    /// Rate label, e.g. `18%` or `Exempt`
    pub rate: String,

    #[validate(length(min = 1, max = 100))]
    pub uom: String,

    pub quantity: Decimal,
    pub unit_price: Decimal,

    #[serde(default)]
    pub discount: Decimal,
}

/// Input for creating an invoice
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateInvoice {
    #[validate(length(min = 1, max = 100))]
    pub invoice_number: String,

    #[serde(default = "default_invoice_type")]
    pub invoice_type: String,

    pub invoice_date: NaiveDate,

    pub buyer_id: Option<i64>,

    #[validate(length(min = 1, max = 50))]
    pub buyer_ntn_cnic: String,

    #[validate(length(min = 1, max = 255))]
    pub buyer_business_name: String,

    #[validate(length(min = 1, max = 100))]
    pub buyer_province: String,

    pub buyer_address: Option<String>,

    #[serde(default = "default_registration_type")]
    pub buyer_registration_type: String,

    pub invoice_ref_no: Option<String>,
    pub scenario_id: Option<String>,

    #[validate(nested)]
    pub items: Vec<CreateInvoiceItem>,
}

fn default_invoice_type() -> String {
    "Sale Invoice".to_string()
}

fn default_registration_type() -> String {
    "Unregistered".to_string()
}

/// Computed amounts for one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub value_sales_excluding_st: Decimal,
    pub sales_tax_applicable: Decimal,
    pub total_values: Decimal,
}

/// Parses an FBR rate label into a percentage
///
/// Accepts `18%`, `18`, `0.5%` and `Exempt` / `Exempted` (zero).
pub fn parse_rate_percent(rate: &str) -> Option<Decimal> {
    let trimmed = rate.trim();

    if trimmed.eq_ignore_ascii_case("exempt") || trimmed.eq_ignore_ascii_case("exempted") {
        return Some(Decimal::ZERO);
    }

    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    let percent = Decimal::from_str(number).ok()?;

    if percent.is_sign_negative() {
        return None;
    }

    Some(percent)
}

/// Largest value of a `DECIMAL(15, 2)` column
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999_999, 2)
}

/// Largest value of the `DECIMAL(15, 4)` quantity column
pub fn max_quantity() -> Decimal {
    Decimal::new(999_999_999_999_999, 4)
}

fn invalid_amount(message: impl Into<String>) -> InvoiceError {
    InvoiceError::InvalidAmount(message.into())
}

fn ensure_in_range(field: &str, value: Decimal, max: Decimal) -> Result<(), InvoiceError> {
    if value.is_sign_negative() {
        return Err(invalid_amount(format!("{} must not be negative: {}", field, value)));
    }
    if value > max {
        return Err(invalid_amount(format!("{} exceeds {}: {}", field, max, value)));
    }
    Ok(())
}

/// Computes the amounts of one line
///
/// # Errors
///
/// - `InvalidRate` if the rate label cannot be parsed
/// - `InvalidAmount` if an input is out of range, the discount exceeds the
///   line value, or a computed amount does not fit its column
pub fn compute_line(item: &CreateInvoiceItem) -> Result<LineAmounts, InvoiceError> {
    let percent =
        parse_rate_percent(&item.rate).ok_or_else(|| InvoiceError::InvalidRate(item.rate.clone()))?;

    if item.quantity <= Decimal::ZERO {
        return Err(invalid_amount(format!("quantity must be positive: {}", item.quantity)));
    }
    ensure_in_range("quantity", item.quantity, max_quantity())?;
    ensure_in_range("unit_price", item.unit_price, max_amount())?;
    ensure_in_range("discount", item.discount, max_amount())?;

    let gross = item
        .quantity
        .checked_mul(item.unit_price)
        .ok_or_else(|| invalid_amount("quantity × unit price overflows"))?;

    let value = gross
        .checked_sub(item.discount)
        .ok_or_else(|| invalid_amount("line value overflows"))?
        .round_dp(2);
    if value.is_sign_negative() {
        return Err(invalid_amount(format!(
            "discount {} exceeds line value {}",
            item.discount, gross
        )));
    }

    let tax = value
        .checked_mul(percent)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(|| invalid_amount("sales tax overflows"))?
        .round_dp(2);

    let total = value
        .checked_add(tax)
        .ok_or_else(|| invalid_amount("line total overflows"))?;

    ensure_in_range("value_sales_excluding_st", value, max_amount())?;
    ensure_in_range("sales_tax_applicable", tax, max_amount())?;
    ensure_in_range("total_values", total, max_amount())?;

    Ok(LineAmounts {
        value_sales_excluding_st: value,
        sales_tax_applicable: tax,
        total_values: total,
    })
}

/// Invoice totals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub value_excl_st: Decimal,
    pub sales_tax: Decimal,
    pub amount: Decimal,
}

/// Sums line amounts into invoice totals
///
/// # Errors
///
/// `InvalidAmount` if a total does not fit its column
pub fn invoice_totals(lines: &[LineAmounts]) -> Result<InvoiceTotals, InvoiceError> {
    let overflow = || invalid_amount("invoice total overflows");

    let mut totals = InvoiceTotals {
        value_excl_st: Decimal::ZERO,
        sales_tax: Decimal::ZERO,
        amount: Decimal::ZERO,
    };

    for line in lines {
        totals.value_excl_st = totals
            .value_excl_st
            .checked_add(line.value_sales_excluding_st)
            .ok_or_else(overflow)?;
        totals.sales_tax = totals
            .sales_tax
            .checked_add(line.sales_tax_applicable)
            .ok_or_else(overflow)?;
        totals.amount = totals
            .amount
            .checked_add(line.total_values)
            .ok_or_else(overflow)?;
    }

    ensure_in_range("total_value_excl_st", totals.value_excl_st, max_amount())?;
    ensure_in_range("total_sales_tax", totals.sales_tax, max_amount())?;
    ensure_in_range("total_amount", totals.amount, max_amount())?;

    Ok(totals)
}

const INVOICE_COLUMNS: &str = "id, invoice_number, invoice_type, invoice_date, buyer_id, buyer_ntn_cnic, \
     buyer_business_name, buyer_province, buyer_address, buyer_registration_type, invoice_ref_no, \
     scenario_id, status, fbr_invoice_number, total_value_excl_st, total_sales_tax, total_amount, \
     posted_at, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, invoice_id, hs_code, product_description, rate, uom, quantity, unit_price, \
     discount, value_sales_excluding_st, sales_tax_applicable, total_values, created_at, updated_at";

/// Invoice header operations bound to one tenant database
#[derive(Debug, Clone)]
pub struct InvoiceStore {
    pool: MySqlPool,
    items: InvoiceItemStore,
}

impl InvoiceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            items: InvoiceItemStore::new(pool.clone()),
            pool,
        }
    }

    /// Creates an invoice and its lines in one transaction
    ///
    /// # Errors
    ///
    /// - `NoItems` if `items` is empty
    /// - `InvalidRate` if any line's rate cannot be parsed
    /// - `InvalidAmount` if any line or total is out of range
    /// - `DuplicateNumber` if the invoice number is taken
    pub async fn create(&self, data: CreateInvoice) -> Result<InvoiceWithItems, InvoiceError> {
        if data.items.is_empty() {
            return Err(InvoiceError::NoItems);
        }

        let amounts: Vec<LineAmounts> = data
            .items
            .iter()
            .map(compute_line)
            .collect::<Result<_, _>>()?;

        let totals = invoice_totals(&amounts)?;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO invoices (invoice_number, invoice_type, invoice_date, buyer_id,
                                  buyer_ntn_cnic, buyer_business_name, buyer_province,
                                  buyer_address, buyer_registration_type, invoice_ref_no,
                                  scenario_id, status, total_value_excl_st, total_sales_tax,
                                  total_amount)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&data.invoice_number)
        .bind(&data.invoice_type)
        .bind(data.invoice_date)
        .bind(data.buyer_id)
        .bind(&data.buyer_ntn_cnic)
        .bind(&data.buyer_business_name)
        .bind(&data.buyer_province)
        .bind(&data.buyer_address)
        .bind(&data.buyer_registration_type)
        .bind(&data.invoice_ref_no)
        .bind(&data.scenario_id)
        .bind(InvoiceStatus::Draft.as_str())
        .bind(totals.value_excl_st)
        .bind(totals.sales_tax)
        .bind(totals.amount)
        .execute(&mut *tx)
        .await;

        let invoice_id = match inserted {
            Ok(result) => result.last_insert_id() as i64,
            Err(e) if crate::error::is_unique_violation(&e) => {
                return Err(InvoiceError::DuplicateNumber(data.invoice_number));
            }
            Err(e) => return Err(e.into()),
        };

        for (item, line) in data.items.iter().zip(amounts.iter()) {
            sqlx::query(
                r#"
                INSERT INTO invoice_items (invoice_id, hs_code, product_description, rate, uom,
                                           quantity, unit_price, discount,
                                           value_sales_excluding_st, sales_tax_applicable,
                                           total_values)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(invoice_id)
            .bind(&item.hs_code)
            .bind(&item.product_description)
            .bind(&item.rate)
            .bind(&item.uom)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.discount)
            .bind(line.value_sales_excluding_st)
            .bind(line.sales_tax_applicable)
            .bind(line.total_values)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(invoice_id, items = data.items.len(), "Invoice created");

        self.find_with_items(invoice_id)
            .await?
            .ok_or(InvoiceError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Invoice>, sqlx::Error> {
        let query = format!("SELECT {} FROM invoices WHERE id = ?", INVOICE_COLUMNS);

        sqlx::query_as::<_, Invoice>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Finds an invoice together with its lines
    pub async fn find_with_items(&self, id: i64) -> Result<Option<InvoiceWithItems>, sqlx::Error> {
        let Some(invoice) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let items = self.items.list_for_invoice(id).await?;

        Ok(Some(InvoiceWithItems { invoice, items }))
    }

    /// Lists invoices, newest first
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Invoice>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM invoices ORDER BY invoice_date DESC, id DESC LIMIT ? OFFSET ?",
            INVOICE_COLUMNS
        );

        sqlx::query_as::<_, Invoice>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
    }

    /// Marks a draft invoice as posted with the FBR-issued number
    ///
    /// # Returns
    ///
    /// The updated invoice, or None if no draft invoice has this id
    pub async fn mark_posted(
        &self,
        id: i64,
        fbr_invoice_number: &str,
    ) -> Result<Option<Invoice>, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = ?, fbr_invoice_number = ?, posted_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(InvoiceStatus::Posted.as_str())
        .bind(fbr_invoice_number)
        .bind(id)
        .bind(InvoiceStatus::Draft.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }
}

/// Invoice line operations bound to one tenant database
#[derive(Debug, Clone)]
pub struct InvoiceItemStore {
    pool: MySqlPool,
}

impl InvoiceItemStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_invoice(&self, invoice_id: i64) -> Result<Vec<InvoiceItem>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM invoice_items WHERE invoice_id = ? ORDER BY id ASC",
            ITEM_COLUMNS
        );

        sqlx::query_as::<_, InvoiceItem>(&query)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await
    }
}
