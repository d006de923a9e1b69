use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    fees::Cents,
    validation::{
        as_field_error, validate_author, validate_isbn, validate_patron_id, validate_title,
        validate_total_copies,
    },
};

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Book {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub total_copies: i32,
    pub available_copies: i32,
}

impl Book {
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available_copies >= 1
    }
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Loan {
    pub id: Uuid,
    pub isbn: String,
    pub patron_id: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub late_fee_cents: Option<i64>,
}

impl Loan {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.return_date.is_none()
    }
}

/// A loan joined with the catalog entry it refers to.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct PatronLoan {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub late_fee_cents: Option<i64>,
}

fn isbn_shape(isbn: &str) -> Result<(), ValidationError> {
    as_field_error(validate_isbn(isbn))
}

fn patron_id_shape(patron_id: &str) -> Result<(), ValidationError> {
    as_field_error(validate_patron_id(patron_id))
}

fn title_shape(title: &str) -> Result<(), ValidationError> {
    as_field_error(validate_title(title))
}

fn author_shape(author: &str) -> Result<(), ValidationError> {
    as_field_error(validate_author(author))
}

fn copies_shape(total_copies: i32) -> Result<(), ValidationError> {
    as_field_error(validate_total_copies(total_copies))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewBook {
    #[validate(custom(function = "isbn_shape"))]
    pub isbn: String,
    #[validate(custom(function = "title_shape"))]
    pub title: String,
    #[validate(custom(function = "author_shape"))]
    pub author: String,
    #[validate(custom(function = "copies_shape"))]
    pub total_copies: i32,
}

/// Body of the borrow and return endpoints.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoanRequest {
    #[validate(custom(function = "patron_id_shape"))]
    pub patron_id: String,
    #[validate(custom(function = "isbn_shape"))]
    pub isbn: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanResponse {
    pub loan_id: Uuid,
    pub isbn: String,
    pub title: String,
    pub patron_id: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReturnReceipt {
    pub isbn: String,
    pub title: String,
    pub return_date: DateTime<Utc>,
    pub fee_amount: Cents,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Title,
    Author,
    Isbn,
    Unknown,
}

impl SearchType {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "title" => SearchType::Title,
            "author" => SearchType::Author,
            "isbn" => SearchType::Isbn,
            _ => SearchType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(rename = "type")]
    pub search_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentLoan {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub days_overdue: i64,
    pub current_fee: Cents,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: DateTime<Utc>,
    pub late_fee: Cents,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatronStatus {
    pub patron_id: String,
    pub current_loans: Vec<CurrentLoan>,
    pub current_count: usize,
    pub total_late_fees: Cents,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    pub transaction_id: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub transaction_id: String,
    pub amount: Cents,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundResponse {
    pub transaction_id: String,
    pub amount: Cents,
    pub message: String,
}
