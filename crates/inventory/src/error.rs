use common::BookId;
use thiserror::Error;

/// Errors that can occur when mutating or reading the stock ledger.
#[derive(Debug, Error)]
pub enum StockError {
    /// The requested item does not exist in the ledger.
    #[error("no stock record for book {book_id}")]
    NoSuchItem { book_id: BookId },

    /// Not enough available units to satisfy a reservation line.
    #[error("insufficient stock for book {book_id}: need {needed}, available {available}")]
    InsufficientStock {
        book_id: BookId,
        needed: i64,
        available: i64,
    },

    /// A line carried a zero or negative quantity.
    #[error("invalid quantity {qty} for book {book_id}")]
    InvalidQuantity { book_id: BookId, qty: i64 },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StockError {
    /// True for rejections that will never succeed on retry; these drive
    /// the order to `Failed` instead of being redelivered.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            StockError::NoSuchItem { .. }
                | StockError::InsufficientStock { .. }
                | StockError::InvalidQuantity { .. }
        )
    }
}
