//! Catalog and circulation rules on top of a [`LibraryStore`].

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::Clock,
    errors::{AppError, AppResult, Conflict},
    fees::{Cents, FeeLookup, LateFee, MAX_LATE_FEE, calculate_late_fee, due_date_for},
    models::{
        Book, CurrentLoan, HistoryEntry, Loan, LoanResponse, NewBook, PatronStatus,
        PaymentResponse, RefundResponse, ReturnReceipt, SearchType,
    },
    payment::PaymentGateway,
    store::LibraryStore,
    validation::{validate_isbn, validate_patron_id},
};

/// Open loans a patron may hold at once.
pub const BORROW_LIMIT: i64 = 5;

#[derive(Clone)]
pub struct LibraryService {
    store: Arc<dyn LibraryStore>,
    clock: Arc<dyn Clock>,
    payments: Option<Arc<dyn PaymentGateway>>,
    late_fees_enabled: bool,
}

impl LibraryService {
    pub fn new(store: Arc<dyn LibraryStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            payments: None,
            late_fees_enabled: true,
        }
    }

    #[must_use]
    pub fn with_payment_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.payments = Some(gateway);
        self
    }

    #[must_use]
    pub fn with_late_fees_enabled(mut self, enabled: bool) -> Self {
        self.late_fees_enabled = enabled;
        self
    }

    /// # Errors
    /// Returns database errors.
    pub async fn catalog(&self) -> AppResult<Vec<Book>> {
        self.store.list_books().await
    }

    /// # Errors
    /// Returns validation, not found, or database errors.
    pub async fn book(&self, isbn: &str) -> AppResult<Book> {
        validate_isbn(isbn)?;
        self.store
            .find_book(isbn)
            .await?
            .ok_or(AppError::NotFound("book"))
    }

    /// Adds a book with every copy on the shelf.
    ///
    /// # Errors
    /// Returns a validation error naming the offending field (including a
    /// duplicate ISBN), or database errors.
    pub async fn add_book(&self, new_book: NewBook) -> AppResult<Book> {
        new_book.validate()?;

        if self.store.find_book(&new_book.isbn).await?.is_some() {
            return Err(AppError::validation(
                "isbn",
                "A book with this ISBN already exists.",
            ));
        }

        let book = Book {
            isbn: new_book.isbn,
            title: new_book.title.trim().to_string(),
            author: new_book.author.trim().to_string(),
            total_copies: new_book.total_copies,
            available_copies: new_book.total_copies,
        };
        self.store.insert_book(&book).await?;

        info!(isbn = %book.isbn, copies = book.total_copies, "book added to catalog");
        Ok(book)
    }

    /// # Errors
    /// Returns validation, not found, conflict (unavailable, limit reached,
    /// already borrowed), or database errors.
    pub async fn borrow_book(&self, patron_id: &str, isbn: &str) -> AppResult<LoanResponse> {
        validate_patron_id(patron_id)?;
        validate_isbn(isbn)?;

        let book = self
            .store
            .find_book(isbn)
            .await?
            .ok_or(AppError::NotFound("book"))?;
        if !book.is_available() {
            return Err(Conflict::BookUnavailable.into());
        }

        let open = self.store.count_open_loans(patron_id).await?;
        if open >= BORROW_LIMIT {
            debug!(patron_id, open, "borrow limit reached");
            return Err(Conflict::BorrowLimitReached {
                limit: BORROW_LIMIT,
            }
            .into());
        }

        if self
            .store
            .latest_loan(patron_id, isbn)
            .await?
            .is_some_and(|l| l.is_open())
        {
            return Err(Conflict::AlreadyBorrowed.into());
        }

        let borrow_date = self.clock.now();
        let loan = Loan {
            id: Uuid::new_v4(),
            isbn: book.isbn.clone(),
            patron_id: patron_id.to_string(),
            borrow_date,
            due_date: due_date_for(borrow_date),
            return_date: None,
            late_fee_cents: None,
        };
        self.store.open_loan(&loan).await.inspect_err(|e| {
            warn!(patron_id, isbn, error = %e, "borrow was not recorded");
        })?;

        info!(patron_id, isbn, due = %loan.due_date.date_naive(), "book borrowed");
        Ok(LoanResponse {
            loan_id: loan.id,
            isbn: loan.isbn,
            title: book.title,
            patron_id: loan.patron_id,
            borrow_date: loan.borrow_date,
            due_date: loan.due_date,
        })
    }

    /// # Errors
    /// Returns validation, not found, conflict (not borrowed, already
    /// returned), or database errors.
    pub async fn return_book(&self, patron_id: &str, isbn: &str) -> AppResult<ReturnReceipt> {
        validate_patron_id(patron_id)?;
        validate_isbn(isbn)?;

        let book = self
            .store
            .find_book(isbn)
            .await?
            .ok_or(AppError::NotFound("book"))?;
        let loan = self
            .store
            .latest_loan(patron_id, isbn)
            .await?
            .ok_or(Conflict::NotBorrowed)?;
        if !loan.is_open() {
            return Err(Conflict::AlreadyReturned.into());
        }

        let return_date = self.clock.now();
        let fee = calculate_late_fee(loan.due_date, return_date);
        self.store
            .close_loan(loan.id, isbn, return_date, fee.fee_amount)
            .await
            .inspect_err(|e| {
                warn!(patron_id, isbn, error = %e, "return was not recorded");
            })?;

        info!(
            patron_id,
            isbn,
            days_overdue = fee.days_overdue,
            fee = %fee.fee_amount,
            "book returned"
        );
        Ok(ReturnReceipt {
            isbn: book.isbn,
            title: book.title,
            return_date,
            fee_amount: fee.fee_amount,
            days_overdue: fee.days_overdue,
        })
    }

    /// Fee owed on the patron's open loan of `isbn` as of now. A patron with
    /// no open loan owes nothing.
    ///
    /// # Errors
    /// Returns validation or database errors.
    pub async fn late_fee_for(&self, patron_id: &str, isbn: &str) -> AppResult<FeeLookup> {
        validate_patron_id(patron_id)?;
        validate_isbn(isbn)?;
        if !self.late_fees_enabled {
            return Ok(FeeLookup::NotImplemented);
        }

        let fee = self.open_loan_fee(patron_id, isbn).await?;
        Ok(FeeLookup::Computed(fee))
    }

    async fn open_loan_fee(&self, patron_id: &str, isbn: &str) -> AppResult<LateFee> {
        let fee = match self.store.latest_loan(patron_id, isbn).await? {
            Some(loan) if loan.is_open() => calculate_late_fee(loan.due_date, self.clock.now()),
            _ => LateFee::NONE,
        };
        Ok(fee)
    }

    /// Case-insensitive substring match on title or author, exact match on
    /// ISBN. Blank queries and unknown search types match nothing.
    ///
    /// # Errors
    /// Returns database errors.
    pub async fn search(&self, query: &str, search_type: SearchType) -> AppResult<Vec<Book>> {
        let query = query.trim();
        if query.is_empty() || search_type == SearchType::Unknown {
            return Ok(Vec::new());
        }

        let needle = query.to_lowercase();
        let books = self.store.list_books().await?;
        let matches = books
            .into_iter()
            .filter(|b| match search_type {
                SearchType::Title => b.title.to_lowercase().contains(&needle),
                SearchType::Author => b.author.to_lowercase().contains(&needle),
                SearchType::Isbn => b.isbn == query,
                SearchType::Unknown => false,
            })
            .collect();
        Ok(matches)
    }

    /// # Errors
    /// Returns validation or database errors.
    pub async fn patron_status(&self, patron_id: &str) -> AppResult<PatronStatus> {
        validate_patron_id(patron_id)?;

        let now = self.clock.now();
        let mut current_loans = Vec::new();
        let mut history = Vec::new();
        for loan in self.store.patron_loans(patron_id).await? {
            match loan.return_date {
                None => {
                    let fee = calculate_late_fee(loan.due_date, now);
                    current_loans.push(CurrentLoan {
                        isbn: loan.isbn,
                        title: loan.title,
                        author: loan.author,
                        borrow_date: loan.borrow_date,
                        due_date: loan.due_date,
                        days_overdue: fee.days_overdue,
                        current_fee: fee.fee_amount,
                    });
                }
                Some(return_date) => history.push(HistoryEntry {
                    isbn: loan.isbn,
                    title: loan.title,
                    author: loan.author,
                    borrow_date: loan.borrow_date,
                    due_date: loan.due_date,
                    return_date,
                    late_fee: Cents(loan.late_fee_cents.unwrap_or_default()),
                }),
            }
        }

        Ok(PatronStatus {
            patron_id: patron_id.to_string(),
            current_count: current_loans.len(),
            total_late_fees: current_loans.iter().map(|l| l.current_fee).sum(),
            current_loans,
            history,
        })
    }

    /// Charges the fee accrued so far on the patron's open loan of `isbn`.
    ///
    /// # Errors
    /// Returns validation, not found, conflict (nothing owed), not
    /// implemented (no gateway), or payment errors.
    pub async fn pay_late_fees(&self, patron_id: &str, isbn: &str) -> AppResult<PaymentResponse> {
        validate_patron_id(patron_id)?;
        validate_isbn(isbn)?;

        let fee = self.open_loan_fee(patron_id, isbn).await?;
        if fee.fee_amount.is_zero() {
            return Err(Conflict::NoLateFees.into());
        }
        let book = self
            .store
            .find_book(isbn)
            .await?
            .ok_or(AppError::NotFound("book"))?;
        let gateway = self
            .payments
            .as_ref()
            .ok_or(AppError::NotImplemented("late fee payment"))?;

        let description = format!("Late fees for '{}'", book.title);
        let receipt = gateway
            .process_payment(patron_id, fee.fee_amount, &description)
            .await
            .inspect_err(|e| warn!(patron_id, isbn, error = %e, "late fee payment failed"))?;

        info!(patron_id, isbn, amount = %fee.fee_amount, txn = %receipt.transaction_id, "late fee paid");
        Ok(PaymentResponse {
            transaction_id: receipt.transaction_id,
            amount: fee.fee_amount,
            message: format!("Payment successful! {}", receipt.message),
        })
    }

    /// # Errors
    /// Returns validation errors for a malformed transaction id or an amount
    /// outside `(0, 15.00]`, not implemented (no gateway), or payment errors.
    pub async fn refund_late_fee(&self, transaction_id: &str, amount: Cents) -> AppResult<RefundResponse> {
        if !transaction_id.starts_with("txn_") {
            return Err(AppError::validation("transaction_id", "Invalid transaction ID."));
        }
        if amount <= Cents::ZERO {
            return Err(AppError::validation(
                "amount",
                "Refund amount must be greater than 0.",
            ));
        }
        if amount > MAX_LATE_FEE {
            return Err(AppError::validation(
                "amount",
                "Refund amount exceeds maximum late fee.",
            ));
        }
        let gateway = self
            .payments
            .as_ref()
            .ok_or(AppError::NotImplemented("late fee refund"))?;

        let message = gateway
            .refund_payment(transaction_id, amount)
            .await
            .inspect_err(|e| warn!(transaction_id, error = %e, "refund failed"))?;

        info!(transaction_id, amount = %amount, "late fee refunded");
        Ok(RefundResponse {
            transaction_id: transaction_id.to_string(),
            amount,
            message,
        })
    }
}
