use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult, Conflict},
    fees::Cents,
    models::{Book, Loan, PatronLoan},
};

use super::LibraryStore;

/// PostgreSQL-backed store. Borrow and return each run in one transaction;
/// returning early drops the transaction, which rolls it back.
#[derive(Clone, Debug)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl LibraryStore for PgStore {
    async fn insert_book(&self, book: &Book) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO books (isbn, title, author, total_copies, available_copies)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&book.isbn)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::validation("isbn", "A book with this ISBN already exists.")
            } else {
                AppError::Database(e)
            }
        })?;
        Ok(())
    }

    async fn find_book(&self, isbn: &str) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            "SELECT isbn, title, author, total_copies, available_copies FROM books WHERE isbn = $1",
        )
        .bind(isbn)
        .fetch_optional(&self.db)
        .await?;
        Ok(book)
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            "SELECT isbn, title, author, total_copies, available_copies FROM books ORDER BY id",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(books)
    }

    async fn count_open_loans(&self, patron_id: &str) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM loans WHERE patron_id = $1 AND return_date IS NULL",
        )
        .bind(patron_id)
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }

    async fn latest_loan(&self, patron_id: &str, isbn: &str) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(
            "SELECT id, isbn, patron_id, borrow_date, due_date, return_date, late_fee_cents
             FROM loans WHERE patron_id = $1 AND isbn = $2
             ORDER BY borrow_date DESC, return_date IS NULL DESC LIMIT 1",
        )
        .bind(patron_id)
        .bind(isbn)
        .fetch_optional(&self.db)
        .await?;
        Ok(loan)
    }

    async fn patron_loans(&self, patron_id: &str) -> AppResult<Vec<PatronLoan>> {
        let loans = sqlx::query_as::<_, PatronLoan>(
            "SELECT l.isbn, b.title, b.author, l.borrow_date, l.due_date, l.return_date, l.late_fee_cents
             FROM loans l JOIN books b ON b.isbn = l.isbn
             WHERE l.patron_id = $1
             ORDER BY l.borrow_date DESC",
        )
        .bind(patron_id)
        .fetch_all(&self.db)
        .await?;
        Ok(loans)
    }

    async fn open_loan(&self, loan: &Loan) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO loans (id, isbn, patron_id, borrow_date, due_date)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(loan.id)
        .bind(&loan.isbn)
        .bind(&loan.patron_id)
        .bind(loan.borrow_date)
        .bind(loan.due_date)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(Conflict::AlreadyBorrowed)
            } else {
                AppError::Database(e)
            }
        })?;

        let taken = sqlx::query(
            "UPDATE books SET available_copies = available_copies - 1
             WHERE isbn = $1 AND available_copies > 0",
        )
        .bind(&loan.isbn)
        .execute(&mut *tx)
        .await?;
        if taken.rows_affected() == 0 {
            return Err(Conflict::BookUnavailable.into());
        }

        tx.commit().await?;
        Ok(())
    }

    async fn close_loan(
        &self,
        loan_id: Uuid,
        isbn: &str,
        return_date: DateTime<Utc>,
        late_fee: Cents,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let closed = sqlx::query(
            "UPDATE loans SET return_date = $2, late_fee_cents = $3
             WHERE id = $1 AND return_date IS NULL",
        )
        .bind(loan_id)
        .bind(return_date)
        .bind(late_fee.0)
        .execute(&mut *tx)
        .await?;
        if closed.rows_affected() == 0 {
            return Err(Conflict::AlreadyReturned.into());
        }

        let shelved = sqlx::query(
            "UPDATE books SET available_copies = available_copies + 1
             WHERE isbn = $1 AND available_copies < total_copies",
        )
        .bind(isbn)
        .execute(&mut *tx)
        .await?;
        if shelved.rows_affected() == 0 {
            return Err(AppError::Storage(format!(
                "availability of {isbn} is already at its total copies"
            )));
        }

        tx.commit().await?;
        Ok(())
    }
}
