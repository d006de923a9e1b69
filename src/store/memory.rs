use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult, Conflict},
    fees::Cents,
    models::{Book, Loan, PatronLoan},
};

use super::LibraryStore;

#[derive(Debug, Default)]
struct Tables {
    books: Vec<Book>,
    loans: Vec<Loan>,
}

/// Process-local store. Every mutation runs its checks and writes under one
/// write guard, so readers never see half of a borrow or return.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with existing books and loans, bypassing business checks.
    #[must_use]
    pub fn with_records(books: Vec<Book>, loans: Vec<Loan>) -> Self {
        Self {
            tables: RwLock::new(Tables { books, loans }),
        }
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn insert_book(&self, book: &Book) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if tables.books.iter().any(|b| b.isbn == book.isbn) {
            return Err(AppError::validation(
                "isbn",
                "A book with this ISBN already exists.",
            ));
        }
        tables.books.push(book.clone());
        Ok(())
    }

    async fn find_book(&self, isbn: &str) -> AppResult<Option<Book>> {
        let tables = self.tables.read().await;
        Ok(tables.books.iter().find(|b| b.isbn == isbn).cloned())
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        Ok(self.tables.read().await.books.clone())
    }

    async fn count_open_loans(&self, patron_id: &str) -> AppResult<i64> {
        let tables = self.tables.read().await;
        let count = tables
            .loans
            .iter()
            .filter(|l| l.patron_id == patron_id && l.is_open())
            .count();
        i64::try_from(count).map_err(|e| AppError::Storage(e.to_string()))
    }

    async fn latest_loan(&self, patron_id: &str, isbn: &str) -> AppResult<Option<Loan>> {
        let tables = self.tables.read().await;
        Ok(tables
            .loans
            .iter()
            .filter(|l| l.patron_id == patron_id && l.isbn == isbn)
            .max_by_key(|l| (l.borrow_date, l.is_open()))
            .cloned())
    }

    async fn patron_loans(&self, patron_id: &str) -> AppResult<Vec<PatronLoan>> {
        let tables = self.tables.read().await;
        let mut loans: Vec<PatronLoan> = tables
            .loans
            .iter()
            .filter(|l| l.patron_id == patron_id)
            .filter_map(|l| {
                let book = tables.books.iter().find(|b| b.isbn == l.isbn)?;
                Some(PatronLoan {
                    isbn: l.isbn.clone(),
                    title: book.title.clone(),
                    author: book.author.clone(),
                    borrow_date: l.borrow_date,
                    due_date: l.due_date,
                    return_date: l.return_date,
                    late_fee_cents: l.late_fee_cents,
                })
            })
            .collect();
        loans.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date));
        Ok(loans)
    }

    async fn open_loan(&self, loan: &Loan) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let Tables { books, loans } = &mut *tables;

        if loans
            .iter()
            .any(|l| l.is_open() && l.patron_id == loan.patron_id && l.isbn == loan.isbn)
        {
            return Err(Conflict::AlreadyBorrowed.into());
        }
        let book = books
            .iter_mut()
            .find(|b| b.isbn == loan.isbn)
            .ok_or(AppError::NotFound("book"))?;
        if book.available_copies < 1 {
            return Err(Conflict::BookUnavailable.into());
        }

        book.available_copies -= 1;
        loans.push(loan.clone());
        Ok(())
    }

    async fn close_loan(
        &self,
        loan_id: Uuid,
        isbn: &str,
        return_date: DateTime<Utc>,
        late_fee: Cents,
    ) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let Tables { books, loans } = &mut *tables;

        let loan = loans
            .iter_mut()
            .find(|l| l.id == loan_id)
            .ok_or(Conflict::NotBorrowed)?;
        if !loan.is_open() {
            return Err(Conflict::AlreadyReturned.into());
        }
        let book = books
            .iter_mut()
            .find(|b| b.isbn == isbn)
            .ok_or(AppError::NotFound("book"))?;
        if book.available_copies >= book.total_copies {
            return Err(AppError::Storage(format!(
                "availability of {isbn} is already at its total of {} copies",
                book.total_copies
            )));
        }

        book.available_copies += 1;
        loan.return_date = Some(return_date);
        loan.late_fee_cents = Some(late_fee.0);
        Ok(())
    }
}
