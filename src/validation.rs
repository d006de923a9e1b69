//! Field shape checks shared by the service layer and request payloads.

use std::borrow::Cow;

use validator::ValidationError;

use crate::{
    errors::{AppError, AppResult},
    fees::{Cents, MAX_LATE_FEE},
};

pub const ISBN_LEN: usize = 13;
pub const PATRON_ID_LEN: usize = 6;
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_AUTHOR_LEN: usize = 100;

fn all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

/// Passes iff `isbn` is exactly 13 ASCII digits.
///
/// # Errors
/// Returns a validation error on the `isbn` field otherwise.
pub fn validate_isbn(isbn: &str) -> AppResult<()> {
    if all_digits(isbn, ISBN_LEN) {
        Ok(())
    } else {
        Err(AppError::validation("isbn", "ISBN must be exactly 13 digits."))
    }
}

/// Passes iff `patron_id` is exactly 6 ASCII digits. Surrounding whitespace is rejected.
///
/// # Errors
/// Returns a validation error on the `patron_id` field otherwise.
pub fn validate_patron_id(patron_id: &str) -> AppResult<()> {
    if all_digits(patron_id, PATRON_ID_LEN) {
        Ok(())
    } else {
        Err(AppError::validation(
            "patron_id",
            "Invalid patron ID. Must be exactly 6 digits.",
        ))
    }
}

fn required_text(field: &str, label: &str, value: &str, max: usize) -> AppResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(field, format!("{label} is required.")));
    }
    if trimmed.chars().count() > max {
        return Err(AppError::validation(
            field,
            format!("{label} must be at most {max} characters."),
        ));
    }
    Ok(())
}

/// # Errors
/// Returns a validation error when the trimmed title is empty or longer than 200 characters.
pub fn validate_title(title: &str) -> AppResult<()> {
    required_text("title", "Title", title, MAX_TITLE_LEN)
}

/// # Errors
/// Returns a validation error when the trimmed author is empty or longer than 100 characters.
pub fn validate_author(author: &str) -> AppResult<()> {
    required_text("author", "Author", author, MAX_AUTHOR_LEN)
}

/// # Errors
/// Returns a validation error unless `total_copies` is positive.
pub fn validate_total_copies(total_copies: i32) -> AppResult<()> {
    if total_copies > 0 {
        Ok(())
    } else {
        Err(AppError::validation(
            "total_copies",
            "Total copies must be a positive integer.",
        ))
    }
}

/// Converts a refund amount in dollars to cents. The amount must lie in
/// `(0, 15.00]` before any rounding and carry no fraction of a cent.
///
/// # Errors
/// Returns a validation error on the `amount` field otherwise.
pub fn validate_refund_amount(amount: f64) -> AppResult<Cents> {
    if amount.is_nan() || amount <= 0.0 {
        return Err(AppError::validation(
            "amount",
            "Refund amount must be greater than 0.",
        ));
    }
    if amount > MAX_LATE_FEE.as_dollars() {
        return Err(AppError::validation(
            "amount",
            "Refund amount exceeds maximum late fee.",
        ));
    }
    let cents = amount * 100.0;
    if (cents - cents.round()).abs() > 1e-6 {
        return Err(AppError::validation(
            "amount",
            "Refund amount must be in whole cents.",
        ));
    }
    Ok(Cents::from_dollars(amount))
}

/// Bridges a check into the `validator` derive so request payloads run the same rules.
pub(crate) fn as_field_error(result: AppResult<()>) -> Result<(), ValidationError> {
    match result {
        Ok(()) => Ok(()),
        Err(AppError::Validation { message, .. }) => {
            Err(ValidationError::new("format").with_message(Cow::Owned(message)))
        }
        Err(other) => Err(ValidationError::new("format").with_message(Cow::Owned(other.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isbn_requires_thirteen_digits() {
        assert!(validate_isbn("9780132350884").is_ok());
        assert!(validate_isbn("978013235088").is_err());
        assert!(validate_isbn("97801323508845").is_err());
        assert!(validate_isbn("978013235088X").is_err());
        assert!(validate_isbn("").is_err());
    }

    #[test]
    fn patron_id_rejects_whitespace_and_letters() {
        assert!(validate_patron_id("123456").is_ok());
        assert!(validate_patron_id(" 12345").is_err());
        assert!(validate_patron_id("123456 ").is_err());
        assert!(validate_patron_id("12a456").is_err());
        assert!(validate_patron_id("1234567").is_err());
    }

    #[test]
    fn text_fields_are_trimmed_before_checking() {
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"t".repeat(200)).is_ok());
        assert!(validate_title(&"t".repeat(201)).is_err());
        assert!(validate_author(&format!("  {}  ", "a".repeat(100))).is_ok());
        assert!(validate_author(&"a".repeat(101)).is_err());
    }

    #[test]
    fn copies_must_be_positive() {
        assert!(validate_total_copies(1).is_ok());
        assert!(validate_total_copies(0).is_err());
        assert!(validate_total_copies(-3).is_err());
    }

    fn rejected_refund(amount: f64) -> String {
        match validate_refund_amount(amount) {
            Err(AppError::Validation { field, message }) => {
                assert_eq!(field, "amount");
                message
            }
            other => panic!("expected amount validation error, got {other:?}"),
        }
    }

    #[test]
    fn refund_amount_is_bounded_before_rounding() {
        assert_eq!(validate_refund_amount(15.0).unwrap(), Cents(1500));
        assert_eq!(validate_refund_amount(0.01).unwrap(), Cents(1));
        assert_eq!(validate_refund_amount(0.1 + 0.2).unwrap(), Cents(30));

        assert_eq!(rejected_refund(15.004), "Refund amount exceeds maximum late fee.");
        assert_eq!(rejected_refund(0.0), "Refund amount must be greater than 0.");
        assert_eq!(rejected_refund(-1.0), "Refund amount must be greater than 0.");
        assert_eq!(rejected_refund(0.004), "Refund amount must be in whole cents.");
        assert_eq!(rejected_refund(6.505), "Refund amount must be in whole cents.");
    }
}
