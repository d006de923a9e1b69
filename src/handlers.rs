use std::{fmt::Write as _, sync::Arc};

use axum::{
    Form, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, Redirect},
};
use validator::Validate;

use crate::{
    AppState,
    errors::{AppError, AppResult},
    fees::{FeeLookup, LateFee},
    models::{
        Book, LoanRequest, LoanResponse, NewBook, PatronStatus, PaymentResponse, RefundRequest,
        RefundResponse, ReturnReceipt, SearchParams, SearchType,
    },
    validation::validate_refund_amount,
};

/// Health check endpoint.
#[must_use]
#[allow(clippy::unused_async)]
pub async fn health_check() -> &'static str { "OK" }

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders the catalog as an HTML table.
#[must_use]
pub fn render_catalog(books: &[Book]) -> String {
    let mut html = String::from(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>Library Catalog</title></head><body>\n<h1>Library Catalog</h1>\n",
    );

    if books.is_empty() {
        html.push_str("<p class=\"empty\">No books in catalog.</p>\n");
    } else {
        html.push_str(
            "<table>\n<thead><tr><th>Title</th><th>Author</th><th>ISBN</th><th>Availability</th><th>Actions</th></tr></thead>\n<tbody>\n",
        );
        for book in books {
            let isbn = escape_html(&book.isbn);
            let availability = if book.is_available() {
                format!("{}/{} Available", book.available_copies, book.total_copies)
            } else {
                "Not Available".to_string()
            };
            let action = if book.is_available() {
                format!(
                    "<form method=\"post\" action=\"/catalog/borrow\"><input type=\"hidden\" name=\"isbn\" value=\"{isbn}\"><input type=\"text\" name=\"patron_id\" placeholder=\"Patron ID\" pattern=\"[0-9]{{6}}\" maxlength=\"6\" required><button type=\"submit\">Borrow</button></form>"
                )
            } else {
                String::new()
            };
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{isbn}</td><td>{availability}</td><td>{action}</td></tr>",
                escape_html(&book.title),
                escape_html(&book.author),
            );
        }
        html.push_str("</tbody>\n</table>\n");
    }

    html.push_str("<p><a href=\"/api/v1/books\">Catalog as JSON</a></p>\n</body></html>\n");
    html
}

/// Catalog page.
///
/// # Errors
/// Returns database errors.
pub async fn catalog_page(State(state): State<Arc<AppState>>) -> AppResult<Html<String>> {
    let books = state.library.catalog().await?;
    Ok(Html(render_catalog(&books)))
}

/// Borrow form posted from the catalog page.
///
/// # Errors
/// Returns the same errors as [`borrow_book`].
pub async fn catalog_borrow(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoanRequest>,
) -> AppResult<Redirect> {
    form.validate()?;
    state.library.borrow_book(&form.patron_id, &form.isbn).await?;
    Ok(Redirect::to("/catalog"))
}

/// List all books in catalog order.
///
/// # Errors
/// Returns database errors.
pub async fn list_books(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Book>>> {
    Ok(Json(state.library.catalog().await?))
}

/// Get a single book by ISBN.
///
/// # Errors
/// Returns validation, not found, or database errors.
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(isbn): Path<String>,
) -> AppResult<Json<Book>> {
    Ok(Json(state.library.book(&isbn).await?))
}

/// Add a book to the catalog.
///
/// # Errors
/// Returns validation or database errors.
pub async fn create_book(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let book = state.library.add_book(payload).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Borrow a book.
///
/// # Errors
/// Returns validation, not found, conflict, or database errors.
pub async fn borrow_book(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoanRequest>,
) -> AppResult<(StatusCode, Json<LoanResponse>)> {
    body.validate()?;
    let loan = state.library.borrow_book(&body.patron_id, &body.isbn).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return a borrowed book.
///
/// # Errors
/// Returns validation, not found, conflict, or database errors.
pub async fn return_book(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoanRequest>,
) -> AppResult<Json<ReturnReceipt>> {
    body.validate()?;
    Ok(Json(state.library.return_book(&body.patron_id, &body.isbn).await?))
}

/// Current late fee on a patron's loan.
///
/// # Errors
/// Returns validation or database errors, or not implemented when late fees are switched off.
pub async fn late_fee(
    State(state): State<Arc<AppState>>,
    Path((patron_id, isbn)): Path<(String, String)>,
) -> AppResult<Json<LateFee>> {
    match state.library.late_fee_for(&patron_id, &isbn).await? {
        FeeLookup::Computed(fee) => Ok(Json(fee)),
        FeeLookup::NotImplemented => Err(AppError::NotImplemented("late fee calculation")),
    }
}

/// Search the catalog.
///
/// # Errors
/// Returns database errors.
pub async fn search_books(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<Vec<Book>>> {
    let search_type = params
        .search_type
        .as_deref()
        .map_or(SearchType::Title, SearchType::parse);
    Ok(Json(state.library.search(&params.q, search_type).await?))
}

/// Patron status report.
///
/// # Errors
/// Returns validation or database errors.
pub async fn patron_status(
    State(state): State<Arc<AppState>>,
    Path(patron_id): Path<String>,
) -> AppResult<Json<PatronStatus>> {
    Ok(Json(state.library.patron_status(&patron_id).await?))
}

/// Pay the late fee accrued on an open loan.
///
/// # Errors
/// Returns validation, not found, conflict, not implemented, or payment errors.
pub async fn pay_late_fees(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoanRequest>,
) -> AppResult<Json<PaymentResponse>> {
    body.validate()?;
    Ok(Json(state.library.pay_late_fees(&body.patron_id, &body.isbn).await?))
}

/// Refund a late fee payment.
///
/// # Errors
/// Returns validation, not implemented, or payment errors.
pub async fn refund_late_fee(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefundRequest>,
) -> AppResult<Json<RefundResponse>> {
    let amount = validate_refund_amount(body.amount)?;
    Ok(Json(state.library.refund_late_fee(&body.transaction_id, amount).await?))
}
