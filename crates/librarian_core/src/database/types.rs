use chrono::NaiveDateTime;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Circulation state of a single book.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    #[default]
    Available,
    Issued,
}

impl BookStatus {
    /// Text stored in the `status` column
    #[must_use]
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Issued => "issued",
        }
    }
}

impl fmt::Display for BookStatus {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookStatus {
    type Err = UnknownStatus;

    #[inline]
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "available" => Ok(Self::Available),
            "issued" => Ok(Self::Issued),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

impl TryFrom<String> for BookStatus {
    type Error = UnknownStatus;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown book status `{0}`")]
pub struct UnknownStatus(pub String);

#[non_exhaustive]
#[derive(Serialize, Debug, Deserialize, Clone, PartialEq, sqlx::FromRow)]
pub struct BookRecord {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    #[sqlx(try_from = "String")]
    pub status: BookStatus,
    pub added_date: NaiveDateTime,
}

/// User supplied fields of a book that is about to be added to the catalog. None of them are
/// validated, empty strings and duplicate ISBNs are accepted.
#[non_exhaustive]
#[derive(Serialize, Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
}

impl NewBook {
    #[must_use]
    #[inline]
    pub fn new(title: &str, author: &str, isbn: &str, category: &str) -> Self {
        Self {
            title: title.to_owned(),
            author: author.to_owned(),
            isbn: isbn.to_owned(),
            category: category.to_owned(),
        }
    }
}

/// Aggregate counts shown on the dashboard
#[non_exhaustive]
#[derive(Serialize, Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct LibraryStats {
    pub total: i64,
    pub available: i64,
    pub issued: i64,
}

impl LibraryStats {
    #[must_use]
    #[inline]
    pub const fn new(total: i64, available: i64, issued: i64) -> Self {
        Self {
            total,
            available,
            issued,
        }
    }

    /// Share of available books in percent, `None` for an empty catalog
    #[allow(
        clippy::cast_precision_loss,
        clippy::as_conversions,
        reason = "Book counts stay far below 2^52"
    )]
    #[must_use]
    #[inline]
    pub fn fill_rate(&self) -> Option<f64> {
        if self.total <= 0 {
            return None;
        }
        Some(self.available as f64 / self.total as f64 * 100.0)
    }
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("failed to prepare database schema: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_text_round_trip() {
        for status in [BookStatus::Available, BookStatus::Issued] {
            assert_eq!(status.as_str().parse::<BookStatus>(), Ok(status));
        }
        assert_eq!(
            "lost".parse::<BookStatus>(),
            Err(UnknownStatus(String::from("lost")))
        );
    }

    #[test]
    fn test_status_is_case_sensitive() {
        assert!("Available".parse::<BookStatus>().is_err());
    }

    #[test]
    fn test_fill_rate() {
        let stats = LibraryStats::new(3, 2, 1);
        let rate = stats.fill_rate().unwrap_or_default();
        assert!((rate - 66.666_666).abs() < 0.001);

        assert_eq!(LibraryStats::new(4, 4, 0).fill_rate(), Some(100.0));
        assert_eq!(LibraryStats::new(2, 0, 2).fill_rate(), Some(0.0));
    }

    #[test]
    fn test_fill_rate_of_empty_catalog() {
        assert_eq!(LibraryStats::default().fill_rate(), None);
    }
}
