//! Catalog input types: books, authors and categories as submitted by staff.

use crate::error::LedgerError;
use crate::types::{Author, AuthorId, Book, BookId, Category, CategoryId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Book fields as submitted on create or full update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDraft {
    /// Title
    pub title: String,
    /// ISBN
    #[serde(default)]
    pub isbn: Option<String>,
    /// Author reference
    #[serde(default)]
    pub author_id: Option<AuthorId>,
    /// Category reference
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    /// Publisher
    #[serde(default)]
    pub publisher: Option<String>,
    /// Year of publication
    #[serde(default)]
    pub publish_year: Option<i32>,
    /// Page count
    #[serde(default)]
    pub pages: Option<i32>,
    /// Shelf location
    #[serde(default)]
    pub location: Option<String>,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Cover image reference
    #[serde(default)]
    pub cover_image: Option<String>,
    /// Copies owned
    pub quantity: u32,
}

impl BookDraft {
    /// Trim text fields and turn blank optionals into `None`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.isbn = blank_to_none(self.isbn);
        self.publisher = blank_to_none(self.publisher);
        self.location = blank_to_none(self.location);
        self.description = blank_to_none(self.description);
        self.cover_image = blank_to_none(self.cover_image);
        self
    }

    /// Check field rules.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] describing the first bad field.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.title.trim().is_empty() {
            return Err(LedgerError::Validation("Title is required".to_string()));
        }
        if self.publish_year.is_some_and(|y| !(0..=9999).contains(&y)) {
            return Err(LedgerError::Validation(
                "Publish year must be between 0 and 9999".to_string(),
            ));
        }
        if self.pages.is_some_and(|p| p <= 0) {
            return Err(LedgerError::Validation(
                "Pages must be a positive number".to_string(),
            ));
        }
        Ok(())
    }

    /// A new book with every copy on the shelf.
    #[must_use]
    pub fn into_book(self, id: BookId) -> Book {
        Book {
            id,
            title: self.title,
            isbn: self.isbn,
            author_id: self.author_id,
            category_id: self.category_id,
            publisher: self.publisher,
            publish_year: self.publish_year,
            pages: self.pages,
            location: self.location,
            description: self.description,
            cover_image: self.cover_image,
            quantity: self.quantity,
            available_quantity: self.quantity,
        }
    }

    /// Replace `book`'s fields; the caller sets `available_quantity`.
    pub fn apply_to(self, book: &mut Book) {
        book.title = self.title;
        book.isbn = self.isbn;
        book.author_id = self.author_id;
        book.category_id = self.category_id;
        book.publisher = self.publisher;
        book.publish_year = self.publish_year;
        book.pages = self.pages;
        book.location = self.location;
        book.description = self.description;
        book.cover_image = self.cover_image;
        book.quantity = self.quantity;
    }
}

/// Author fields as submitted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorDraft {
    /// Display name
    pub name: String,
    /// Biography
    #[serde(default)]
    pub biography: Option<String>,
    /// Date of birth
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    /// Nationality
    #[serde(default)]
    pub nationality: Option<String>,
}

impl AuthorDraft {
    /// Validate and build an author.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] when the name is blank.
    pub fn into_author(self, id: AuthorId) -> Result<Author, LedgerError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(LedgerError::Validation("Author name is required".to_string()));
        }
        Ok(Author {
            id,
            name: name.to_string(),
            biography: blank_to_none(self.biography),
            birth_date: self.birth_date,
            nationality: blank_to_none(self.nationality),
        })
    }
}

/// Category fields as submitted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDraft {
    /// Unique name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
}

impl CategoryDraft {
    /// Validate and build a category.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] when the name is blank.
    pub fn into_category(self, id: CategoryId) -> Result<Category, LedgerError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(LedgerError::Validation(
                "Category name is required".to_string(),
            ));
        }
        Ok(Category {
            id,
            name: name.to_string(),
            description: blank_to_none(self.description),
        })
    }
}

/// Catalog search parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct BookSearch {
    /// Case-insensitive match on title, ISBN or author name
    pub q: Option<String>,
    /// Restrict to one category
    pub category_id: Option<CategoryId>,
}

impl BookSearch {
    /// Lowercased search term, `None` when blank.
    #[must_use]
    pub fn term(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }

    /// In-memory match; `author_name` is the resolved author of `book`.
    #[must_use]
    pub fn matches(&self, book: &Book, author_name: Option<&str>) -> bool {
        if self.category_id.is_some_and(|c| book.category_id != Some(c)) {
            return false;
        }
        let Some(term) = self.term() else {
            return true;
        };
        book.title.to_lowercase().contains(&term)
            || book.isbn.as_deref().is_some_and(|i| i.to_lowercase().contains(&term))
            || author_name.is_some_and(|a| a.to_lowercase().contains(&term))
    }
}

/// Author with the number of books referencing it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorListing {
    /// The author
    #[serde(flatten)]
    pub author: Author,
    /// Books by this author
    pub book_count: u64,
}

/// Category with the number of books filed under it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryListing {
    /// The category
    #[serde(flatten)]
    pub category: Category,
    /// Books in this category
    pub book_count: u64,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str) -> BookDraft {
        BookDraft {
            title: title.to_string(),
            quantity: 2,
            ..BookDraft::default()
        }
    }

    #[test]
    fn new_book_has_all_copies_available() {
        let book = draft("Dune").normalized().into_book(BookId::new());
        assert_eq!(book.quantity, 2);
        assert_eq!(book.available_quantity, 2);
    }

    #[test]
    fn blank_title_is_rejected() {
        assert!(matches!(
            draft("   ").validate(),
            Err(LedgerError::Validation(_))
        ));
        let bad_pages = BookDraft {
            pages: Some(0),
            ..draft("Emma")
        };
        assert!(bad_pages.validate().is_err());
    }

    #[test]
    fn normalizing_drops_blank_isbn() {
        let book = BookDraft {
            isbn: Some("  ".into()),
            ..draft(" Persuasion ")
        }
        .normalized();
        assert_eq!(book.title, "Persuasion");
        assert_eq!(book.isbn, None);
    }

    #[test]
    fn search_matches_title_isbn_and_author() {
        let mut book = draft("The Left Hand of Darkness").into_book(BookId::new());
        book.isbn = Some("978-0441478125".into());

        let by_title = BookSearch {
            q: Some("left hand".into()),
            ..BookSearch::default()
        };
        let by_isbn = BookSearch {
            q: Some("0441478".into()),
            ..BookSearch::default()
        };
        let by_author = BookSearch {
            q: Some("le guin".into()),
            ..BookSearch::default()
        };
        let by_category = BookSearch {
            category_id: Some(CategoryId::new()),
            ..BookSearch::default()
        };

        assert!(by_title.matches(&book, None));
        assert!(by_isbn.matches(&book, None));
        assert!(by_author.matches(&book, Some("Ursula K. Le Guin")));
        assert!(!by_author.matches(&book, None));
        assert!(!by_category.matches(&book, None));
    }

    #[test]
    fn author_and_category_names_are_required() {
        assert!(AuthorDraft::default().into_author(AuthorId::new()).is_err());
        assert!(CategoryDraft::default()
            .into_category(CategoryId::new())
            .is_err());
        let author = AuthorDraft {
            name: " Mary Shelley ".into(),
            ..AuthorDraft::default()
        }
        .into_author(AuthorId::new());
        assert_eq!(author.map(|a| a.name).ok().as_deref(), Some("Mary Shelley"));
    }
}
