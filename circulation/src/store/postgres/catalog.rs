//! Books, authors and categories.

use super::rows::{AuthorRow, BOOK_COLUMNS, BookRow, CategoryRow, convert_all, to_i32, to_u64};
use super::{PostgresLibrary, db_error, delete_error};
use crate::catalog::{AuthorListing, BookSearch, CategoryListing};
use crate::error::PersistenceError;
use crate::store::CatalogStore;
use crate::types::{Author, AuthorId, Book, BookId, Category, CategoryId};
use async_trait::async_trait;

#[async_trait]
impl CatalogStore for PostgresLibrary {
    #[tracing::instrument(skip(self, book), fields(book_id = %book.id))]
    async fn insert_book(&self, book: &Book) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO books (id, title, isbn, author_id, category_id, publisher, publish_year, \
                 pages, location, description, cover_image, quantity, available_quantity) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(book.id.as_uuid())
        .bind(&book.title)
        .bind(&book.isbn)
        .bind(book.author_id.map(|a| *a.as_uuid()))
        .bind(book.category_id.map(|c| *c.as_uuid()))
        .bind(&book.publisher)
        .bind(book.publish_year)
        .bind(book.pages)
        .bind(&book.location)
        .bind(&book.description)
        .bind(&book.cover_image)
        .bind(to_i32("quantity", book.quantity)?)
        .bind(to_i32("available_quantity", book.available_quantity)?)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert book", &e))?;
        Ok(())
    }

    async fn book(&self, id: BookId) -> Result<Option<Book>, PersistenceError> {
        let sql = format!("SELECT {BOOK_COLUMNS} FROM books b WHERE b.id = $1");
        sqlx::query_as::<_, BookRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("load book", &e))?
            .map(Book::try_from)
            .transpose()
    }

    async fn books(&self, search: &BookSearch) -> Result<Vec<Book>, PersistenceError> {
        let pattern = search.term().map(|t| format!("%{t}%"));
        let sql = format!(
            "SELECT {BOOK_COLUMNS} FROM books b \
             LEFT JOIN authors a ON a.id = b.author_id \
             WHERE ($1::TEXT IS NULL \
                    OR LOWER(b.title) LIKE $1 \
                    OR LOWER(COALESCE(b.isbn, '')) LIKE $1 \
                    OR LOWER(COALESCE(a.name, '')) LIKE $1) \
               AND ($2::UUID IS NULL OR b.category_id = $2) \
             ORDER BY b.title, b.id"
        );
        let rows = sqlx::query_as::<_, BookRow>(&sql)
            .bind(pattern)
            .bind(search.category_id.map(|c| *c.as_uuid()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("search books", &e))?;
        convert_all(rows)
    }

    async fn insert_author(&self, author: &Author) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO authors (id, name, biography, birth_date, nationality) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(author.id.as_uuid())
        .bind(&author.name)
        .bind(&author.biography)
        .bind(author.birth_date)
        .bind(&author.nationality)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert author", &e))?;
        Ok(())
    }

    async fn update_author(&self, author: &Author) -> Result<bool, PersistenceError> {
        let result = sqlx::query(
            "UPDATE authors SET name = $2, biography = $3, birth_date = $4, nationality = $5 \
             WHERE id = $1",
        )
        .bind(author.id.as_uuid())
        .bind(&author.name)
        .bind(&author.biography)
        .bind(author.birth_date)
        .bind(&author.nationality)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update author", &e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_author(&self, id: AuthorId) -> Result<bool, PersistenceError> {
        let result = sqlx::query("DELETE FROM authors WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| delete_error("delete author", &e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn author(&self, id: AuthorId) -> Result<Option<Author>, PersistenceError> {
        let row = sqlx::query_as::<_, AuthorRow>(
            "SELECT id, name, biography, birth_date, nationality FROM authors WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("load author", &e))?;
        Ok(row.map(Author::from))
    }

    async fn authors(&self) -> Result<Vec<AuthorListing>, PersistenceError> {
        let rows = sqlx::query_as::<_, AuthorRow>(
            "SELECT a.id, a.name, a.biography, a.birth_date, a.nationality, \
                    COUNT(b.id) AS book_count \
             FROM authors a LEFT JOIN books b ON b.author_id = a.id \
             GROUP BY a.id ORDER BY a.name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list authors", &e))?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let book_count = to_u64(row.book_count.unwrap_or_default());
                AuthorListing {
                    author: row.into(),
                    book_count,
                }
            })
            .collect())
    }

    async fn insert_category(&self, category: &Category) -> Result<(), PersistenceError> {
        sqlx::query("INSERT INTO categories (id, name, description) VALUES ($1, $2, $3)")
            .bind(category.id.as_uuid())
            .bind(&category.name)
            .bind(&category.description)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("insert category", &e))?;
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> Result<bool, PersistenceError> {
        let result = sqlx::query("UPDATE categories SET name = $2, description = $3 WHERE id = $1")
            .bind(category.id.as_uuid())
            .bind(&category.name)
            .bind(&category.description)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("update category", &e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_category(&self, id: CategoryId) -> Result<bool, PersistenceError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| delete_error("delete category", &e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn category(&self, id: CategoryId) -> Result<Option<Category>, PersistenceError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, description FROM categories WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("load category", &e))?;
        Ok(row.map(Category::from))
    }

    async fn categories(&self) -> Result<Vec<CategoryListing>, PersistenceError> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT c.id, c.name, c.description, COUNT(b.id) AS book_count \
             FROM categories c LEFT JOIN books b ON b.category_id = c.id \
             GROUP BY c.id ORDER BY c.name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list categories", &e))?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let book_count = to_u64(row.book_count.unwrap_or_default());
                CategoryListing {
                    category: row.into(),
                    book_count,
                }
            })
            .collect())
    }
}
