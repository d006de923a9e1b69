//! Persistence seam for the catalog and loan records.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    errors::AppResult,
    fees::Cents,
    models::{Book, Loan, PatronLoan},
};

/// Storage operations used by the library service.
///
/// `open_loan` and `close_loan` each change a loan record and the book's
/// availability counter together: either both changes become visible or
/// neither does.
#[mockall::automock]
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// # Errors
    /// Validation error on the `isbn` field when the ISBN is already catalogued.
    async fn insert_book(&self, book: &Book) -> AppResult<()>;

    async fn find_book(&self, isbn: &str) -> AppResult<Option<Book>>;

    /// All books in catalog (insertion) order.
    async fn list_books(&self) -> AppResult<Vec<Book>>;

    async fn count_open_loans(&self, patron_id: &str) -> AppResult<i64>;

    /// The most recently borrowed loan for this patron and book, open or not.
    async fn latest_loan(&self, patron_id: &str, isbn: &str) -> AppResult<Option<Loan>>;

    /// Every loan of the patron joined with its book, newest first.
    async fn patron_loans(&self, patron_id: &str) -> AppResult<Vec<PatronLoan>>;

    /// Records `loan` and takes one copy of its book off the shelf.
    async fn open_loan(&self, loan: &Loan) -> AppResult<()>;

    /// Marks the loan returned with its fee and puts the copy back on the shelf.
    async fn close_loan(
        &self,
        loan_id: Uuid,
        isbn: &str,
        return_date: DateTime<Utc>,
        late_fee: Cents,
    ) -> AppResult<()>;
}
