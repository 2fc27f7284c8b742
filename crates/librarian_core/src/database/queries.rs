use crate::database::types::{BookRecord, BookStatus, DatabaseError, LibraryStats, NewBook};
use chrono::Local;
use core::str::FromStr as _;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;

const BOOK_COLUMNS: &str = "id, title, author, isbn, category, status, added_date";

/// Local time with a `T` separator and microseconds, the format rows have always been stored in
const ADDED_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Handle to the catalog database. Cloning is cheap, every clone checks connections out of the
/// same pool, so no connection is ever used by two tasks at once.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Opens (and creates, if missing) the database file at `path` and brings the schema up to
    /// date. Safe to call on every start.
    /// # Errors
    /// Fails if the file cannot be opened or the schema cannot be created
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub async fn init(path: &Path) -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        Self::with_pool(pool).await
    }

    /// In-memory database on a single long-lived connection, every new connection to
    /// `:memory:` would otherwise see its own empty database.
    /// # Errors
    /// Fails if the schema cannot be created
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once per test or scratch session"
    )]
    pub async fn init_in_memory() -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, DatabaseError> {
        sqlx::migrate!().run(&pool).await?;
        log::info!("Catalog schema ready");
        Ok(Self { pool })
    }

    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at end of program"
    )]
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Adds a book with status `available` and the current local time as `added_date`,
    /// returning the new id.
    /// # Errors
    /// Fails if the database is unavailable
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn insert_book(&self, book: &NewBook) -> Result<i64, DatabaseError> {
        let added_date = Local::now()
            .naive_local()
            .format(ADDED_DATE_FORMAT)
            .to_string();
        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO books (title, author, isbn, category, status, added_date)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id;
        ",
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.category)
        .bind(BookStatus::Available.as_str())
        .bind(&added_date)
        .fetch_one(&self.pool)
        .await?;

        log::info!("Inserted book {id} ({:?} by {:?})", book.title, book.author);
        Ok(id)
    }

    /// All books, newest first. Dates are compared as points in time, so rows written with a
    /// space or a `T` between date and time sort together.
    /// # Errors
    /// Fails if the database is unavailable or a row cannot be decoded
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called whenever the catalog changes"
    )]
    pub async fn fetch_books(&self) -> Result<Vec<BookRecord>, DatabaseError> {
        let books = sqlx::query_as(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY julianday(added_date) DESC, id DESC;"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    /// Books whose title or author contains `needle`. Matching follows SQLite's `LIKE`, so it
    /// ignores ASCII case; wildcard characters in `needle` are matched literally. An empty
    /// needle matches every book.
    /// # Errors
    /// Fails if the database is unavailable or a row cannot be decoded
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called on every search input change"
    )]
    pub async fn search_books(&self, needle: &str) -> Result<Vec<BookRecord>, DatabaseError> {
        let pattern = format!("%{}%", escape_like(needle));
        let books = sqlx::query_as(&format!(
            r"SELECT {BOOK_COLUMNS} FROM books
            WHERE title LIKE ?1 ESCAPE '\' OR author LIKE ?1 ESCAPE '\'
            ORDER BY id ASC;"
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    /// Sets the status of book `id`. Unknown ids are not an error, the call just changes
    /// nothing. Returns the number of rows touched.
    /// # Errors
    /// Fails if the database is unavailable
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn set_status(&self, id: i64, status: BookStatus) -> Result<u64, DatabaseError> {
        let affected = sqlx::query("UPDATE books SET status = ? WHERE id = ?;")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        log::info!("Set status of book {id} to {status} ({affected} row(s))");
        Ok(affected)
    }

    /// Permanently removes book `id`. Unknown ids are not an error. Returns the number of rows
    /// removed.
    /// # Errors
    /// Fails if the database is unavailable
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn delete_book(&self, id: i64) -> Result<u64, DatabaseError> {
        let affected = sqlx::query("DELETE FROM books WHERE id = ?;")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        log::info!("Deleted book {id} ({affected} row(s))");
        Ok(affected)
    }

    /// Counts for the dashboard, always computed fresh.
    /// # Errors
    /// Fails if the database is unavailable
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called whenever the dashboard is shown"
    )]
    pub async fn fetch_stats(&self) -> Result<LibraryStats, DatabaseError> {
        let stats = sqlx::query_as(
            "SELECT
                COUNT(*) AS total,
                COUNT(CASE WHEN status = 'available' THEN 1 END) AS available,
                COUNT(CASE WHEN status = 'issued' THEN 1 END) AS issued
            FROM books;",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    /// The `limit` most recently added books that are currently issued.
    /// # Errors
    /// Fails if the database is unavailable or a row cannot be decoded
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called whenever the dashboard is shown"
    )]
    pub async fn fetch_recently_issued(
        &self,
        limit: u32,
    ) -> Result<Vec<BookRecord>, DatabaseError> {
        let books = sqlx::query_as(&format!(
            "SELECT {BOOK_COLUMNS} FROM books
            WHERE status = ?
            ORDER BY julianday(added_date) DESC, id DESC
            LIMIT ?;"
        ))
        .bind(BookStatus::Issued.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }
}

/// Escapes the `LIKE` wildcards so user input is matched as plain text
fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for character in needle.chars() {
        if matches!(character, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    reason = "Tests work on fixed data and are expected to panic on failure"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn seeded() -> (Db, Vec<i64>) {
        let db = Db::init_in_memory().await.unwrap();
        let mut ids = Vec::new();
        for book in [
            NewBook::new("Dune", "Frank Herbert", "9780441013593", "Sci-Fi"),
            NewBook::new("Emma", "Jane Austen", "9780141439587", "Fiction"),
            NewBook::new("Hyperion", "Dan Simmons", "9780553283686", "Sci-Fi"),
        ] {
            ids.push(db.insert_book(&book).await.unwrap());
        }
        (db, ids)
    }

    fn titles(books: &[BookRecord]) -> Vec<&str> {
        books.iter().map(|book| book.title.as_str()).collect()
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b\\c"), "a\\_b\\\\c");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[tokio::test]
    async fn test_insert_then_fetch() {
        let db = Db::init_in_memory().await.unwrap();
        let before = Local::now().naive_local() - chrono::TimeDelta::milliseconds(1);
        let id = db
            .insert_book(&NewBook::new("Dune", "Frank Herbert", "123", "Sci-Fi"))
            .await
            .unwrap();

        let books = db.fetch_books().await.unwrap();
        assert_eq!(books.len(), 1);
        let book = &books[0];
        assert_eq!(book.id, id);
        assert_eq!(book.title, "Dune");
        assert_eq!(book.author, "Frank Herbert");
        assert_eq!(book.isbn, "123");
        assert_eq!(book.category, "Sci-Fi");
        assert_eq!(book.status, BookStatus::Available);
        assert!(book.added_date >= before);
    }

    #[tokio::test]
    async fn test_empty_fields_and_duplicate_isbn_are_accepted() {
        let db = Db::init_in_memory().await.unwrap();
        let first = db.insert_book(&NewBook::default()).await.unwrap();
        let second = db.insert_book(&NewBook::default()).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(db.fetch_books().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_books_newest_first() {
        let (db, ids) = seeded().await;
        let books = db.fetch_books().await.unwrap();
        let fetched: Vec<i64> = books.iter().map(|book| book.id).collect();
        let expected: Vec<i64> = ids.into_iter().rev().collect();
        assert_eq!(fetched, expected);
    }

    #[tokio::test]
    async fn test_added_date_is_stored_as_local_iso_text() {
        let db = Db::init_in_memory().await.unwrap();
        db.insert_book(&NewBook::new("Dune", "Frank Herbert", "", ""))
            .await
            .unwrap();
        let stored: String = sqlx::query_scalar("SELECT added_date FROM books;")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(stored.len(), "2026-10-16T09:00:00.000000".len());
        assert_eq!(stored.get(10..11), Some("T"));
    }

    #[tokio::test]
    async fn test_mixed_date_formats_sort_by_time() {
        let db = Db::init_in_memory().await.unwrap();
        for (title, added_date) in [
            ("Nine", "2026-10-16T09:00:00.000000"),
            ("Ten", "2026-10-16 10:00:00"),
            ("Eleven", "2026-10-16T11:00:00.250000"),
            ("Yesterday", "2026-10-15 23:59:59.999"),
        ] {
            sqlx::query(
                "INSERT INTO books (title, author, isbn, category, status, added_date)
                VALUES (?, '', '', '', 'issued', ?);",
            )
            .bind(title)
            .bind(added_date)
            .execute(&db.pool)
            .await
            .unwrap();
        }

        assert_eq!(
            titles(&db.fetch_books().await.unwrap()),
            vec!["Eleven", "Ten", "Nine", "Yesterday"]
        );
        assert_eq!(
            titles(&db.fetch_recently_issued(2).await.unwrap()),
            vec!["Eleven", "Ten"]
        );
    }

    #[tokio::test]
    async fn test_fetch_books_on_empty_catalog() {
        let db = Db::init_in_memory().await.unwrap();
        assert!(db.fetch_books().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_title_and_author() {
        let (db, _) = seeded().await;
        assert_eq!(titles(&db.search_books("Dun").await.unwrap()), vec!["Dune"]);
        assert_eq!(
            titles(&db.search_books("Austen").await.unwrap()),
            vec!["Emma"]
        );
        assert_eq!(
            titles(&db.search_books("an").await.unwrap()),
            vec!["Dune", "Emma", "Hyperion"]
        );
    }

    #[tokio::test]
    async fn test_search_ignores_ascii_case() {
        let (db, _) = seeded().await;
        assert_eq!(
            titles(&db.search_books("hyPERion").await.unwrap()),
            vec!["Hyperion"]
        );
    }

    #[tokio::test]
    async fn test_search_empty_needle_returns_everything() {
        let (db, _) = seeded().await;
        assert_eq!(db.search_books("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_search_results_are_subset_of_catalog() {
        let (db, _) = seeded().await;
        let all = db.fetch_books().await.unwrap();
        for needle in ["e", "Frank", "zzz", "9780"] {
            for book in db.search_books(needle).await.unwrap() {
                assert!(all.contains(&book));
                let needle = needle.to_lowercase();
                assert!(
                    book.title.to_lowercase().contains(&needle)
                        || book.author.to_lowercase().contains(&needle)
                );
            }
        }
    }

    #[tokio::test]
    async fn test_search_wildcards_are_literal() {
        let db = Db::init_in_memory().await.unwrap();
        db.insert_book(&NewBook::new("100% Cotton", "A", "", ""))
            .await
            .unwrap();
        db.insert_book(&NewBook::new("1000 Cotton", "B", "", ""))
            .await
            .unwrap();
        assert_eq!(
            titles(&db.search_books("100%").await.unwrap()),
            vec!["100% Cotton"]
        );
        assert!(db.search_books("_").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_round_trip_leaves_other_fields() {
        let (db, ids) = seeded().await;
        let original = db.fetch_books().await.unwrap();

        assert_eq!(db.set_status(ids[1], BookStatus::Issued).await.unwrap(), 1);
        let issued = db.fetch_books().await.unwrap();
        let emma = issued.iter().find(|book| book.id == ids[1]).unwrap();
        assert_eq!(emma.status, BookStatus::Issued);

        db.set_status(ids[1], BookStatus::Available).await.unwrap();
        assert_eq!(db.fetch_books().await.unwrap(), original);
    }

    #[tokio::test]
    async fn test_missing_id_is_a_silent_no_op() {
        let (db, _) = seeded().await;
        let before = db.fetch_books().await.unwrap();

        assert_eq!(db.set_status(999, BookStatus::Issued).await.unwrap(), 0);
        assert_eq!(db.delete_book(999).await.unwrap(), 0);

        assert_eq!(db.fetch_books().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_delete_book() {
        let (db, ids) = seeded().await;
        assert_eq!(db.delete_book(ids[0]).await.unwrap(), 1);
        assert_eq!(
            titles(&db.fetch_books().await.unwrap()),
            vec!["Hyperion", "Emma"]
        );
    }

    #[tokio::test]
    async fn test_stats_scenario() {
        let (db, ids) = seeded().await;
        db.set_status(ids[2], BookStatus::Issued).await.unwrap();

        let stats = db.fetch_stats().await.unwrap();
        assert_eq!(stats, LibraryStats::new(3, 2, 1));
        assert!(stats.available + stats.issued <= stats.total);
        let rate = stats.fill_rate().unwrap_or_default();
        assert!((rate - 66.7).abs() < 0.05);
    }

    #[tokio::test]
    async fn test_stats_on_empty_catalog() {
        let db = Db::init_in_memory().await.unwrap();
        let stats = db.fetch_stats().await.unwrap();
        assert_eq!(stats, LibraryStats::default());
        assert_eq!(stats.fill_rate(), None);
    }

    #[tokio::test]
    async fn test_recently_issued() {
        let (db, ids) = seeded().await;
        db.set_status(ids[0], BookStatus::Issued).await.unwrap();
        db.set_status(ids[2], BookStatus::Issued).await.unwrap();

        assert_eq!(
            titles(&db.fetch_recently_issued(5).await.unwrap()),
            vec!["Hyperion", "Dune"]
        );
        assert_eq!(
            titles(&db.fetch_recently_issued(1).await.unwrap()),
            vec!["Hyperion"]
        );
    }

    #[tokio::test]
    async fn test_unknown_stored_status_fails_to_decode() {
        let (db, ids) = seeded().await;
        sqlx::query("UPDATE books SET status = 'lost' WHERE id = ?;")
            .bind(ids[0])
            .execute(&db.pool)
            .await
            .unwrap();
        assert!(matches!(db.fetch_books().await, Err(DatabaseError::Db(_))));
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let path = std::env::temp_dir().join(format!(
            "librarian-reopen-{}.db",
            std::process::id()
        ));
        {
            let db = Db::init(&path).await.unwrap();
            db.insert_book(&NewBook::new("Dune", "Frank Herbert", "", ""))
                .await
                .unwrap();
            db.close().await;
        }
        let db = Db::init(&path).await.unwrap();
        assert_eq!(titles(&db.fetch_books().await.unwrap()), vec!["Dune"]);
        db.close().await;
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_share_the_file_pool() {
        let path = std::env::temp_dir().join(format!(
            "librarian-concurrent-{}.db",
            std::process::id()
        ));
        let db = Db::init(&path).await.unwrap();

        let writers: Vec<_> = (0..8)
            .map(|writer| {
                let db = db.clone();
                tokio::spawn(async move {
                    let title = format!("Volume {writer}");
                    let id = db
                        .insert_book(&NewBook::new(&title, "Anonymous", "", "Fiction"))
                        .await
                        .unwrap();
                    if writer % 2 == 0 {
                        db.set_status(id, BookStatus::Issued).await.unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        assert_eq!(db.fetch_stats().await.unwrap(), LibraryStats::new(8, 4, 4));
        assert_eq!(db.fetch_books().await.unwrap().len(), 8);
        db.close().await;
        std::fs::remove_file(&path).unwrap();
    }
}
