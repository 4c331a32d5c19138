use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe SQLite store
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                display_name TEXT DEFAULT '',
                role TEXT NOT NULL DEFAULT 'user',
                is_locked INTEGER DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                title TEXT UNIQUE NOT NULL,
                author TEXT DEFAULT '',
                genre TEXT DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                book_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (book_id) REFERENCES books(id)
            );

            CREATE INDEX IF NOT EXISTS idx_comments_book_id ON comments(book_id);
            CREATE INDEX IF NOT EXISTS idx_comments_content ON comments(content);
            CREATE INDEX IF NOT EXISTS idx_books_title ON books(title);
            "#,
        )?;
        Ok(())
    }

    // ==================== User Operations ====================

    pub fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        user.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        user.created_at = now;
        user.updated_at = now;

        conn.execute(
            r#"INSERT INTO users (id, username, password_hash, display_name, role, is_locked, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                &user.id,
                &user.username,
                &user.password_hash,
                &user.display_name,
                role_to_str(user.role),
                user.is_locked,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], |row| {
            self.row_to_user(row)
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("User {}", id)),
            _ => StoreError::Database(e),
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE username = ?1",
            params![username],
            |row| self.row_to_user(row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("User {}", username))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn count_users(&self) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_user(&self, row: &rusqlite::Row) -> rusqlite::Result<User> {
        let role_str: String = row.get("role")?;
        Ok(User {
            id: row.get("id")?,
            username: row.get("username")?,
            password_hash: row.get("password_hash")?,
            display_name: row.get("display_name")?,
            role: role_from_str(&role_str),
            is_locked: row.get("is_locked")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
            updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
        })
    }

    // ==================== Book Operations ====================

    pub fn create_book(&self, book: &mut Book) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        book.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        book.created_at = now;
        book.updated_at = now;

        conn.execute(
            r#"INSERT INTO books (id, title, author, genre, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                &book.id,
                &book.title,
                &book.author,
                &book.genre,
                book.created_at.to_rfc3339(),
                book.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_book_by_title(&self, title: &str) -> StoreResult<Book> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM books WHERE title = ?1",
            params![title],
            |row| self.row_to_book(row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("Book {}", title))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn list_books(&self) -> StoreResult<Vec<Book>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM books ORDER BY title ASC")?;
        let rows = stmt.query_map([], |row| self.row_to_book(row))?;

        let mut books = Vec::new();
        for row in rows {
            books.push(row?);
        }
        Ok(books)
    }

    /// Update a book looked up by its current title. Empty form fields
    /// keep the stored value.
    pub fn update_book(&self, title: &str, book: &BookForm) -> StoreResult<Book> {
        let mut existing = self.get_book_by_title(title)?;

        if !book.title.is_empty() {
            existing.title = book.title.clone();
        }
        if !book.author.is_empty() {
            existing.author = book.author.clone();
        }
        if !book.genre.is_empty() {
            existing.genre = book.genre.clone();
        }
        existing.updated_at = Utc::now();

        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            r#"UPDATE books SET title = ?1, author = ?2, genre = ?3, updated_at = ?4 WHERE id = ?5"#,
            params![
                &existing.title,
                &existing.author,
                &existing.genre,
                existing.updated_at.to_rfc3339(),
                &existing.id,
            ],
        )?;

        if rows == 0 {
            return Err(StoreError::NotFound(format!("Book {}", title)));
        }
        Ok(existing)
    }

    /// Delete a book and all comments attached to it.
    pub fn delete_book_by_title(&self, title: &str) -> StoreResult<()> {
        let book = self.get_book_by_title(title)?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM comments WHERE book_id = ?1", params![&book.id])?;
        tx.execute("DELETE FROM books WHERE id = ?1", params![&book.id])?;
        tx.commit()?;
        Ok(())
    }

    fn row_to_book(&self, row: &rusqlite::Row) -> rusqlite::Result<Book> {
        Ok(Book {
            id: row.get("id")?,
            title: row.get("title")?,
            author: row.get("author")?,
            genre: row.get("genre")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
            updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
        })
    }

    // ==================== Comment Operations ====================

    /// Attach a comment to the book named by `comment.book_title`.
    /// The book must already exist.
    pub fn add_comment(&self, comment: &mut Comment) -> StoreResult<()> {
        let book = self.get_book_by_title(&comment.book_title)?;

        let conn = self.conn.lock().unwrap();
        comment.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        comment.created_at = now;
        comment.updated_at = now;

        conn.execute(
            r#"INSERT INTO comments (id, book_id, content, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                &comment.id,
                &book.id,
                &comment.content,
                comment.created_at.to_rfc3339(),
                comment.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_comments(&self) -> StoreResult<Vec<Comment>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT c.id, c.content, b.title AS book_title, c.created_at, c.updated_at
               FROM comments c JOIN books b ON c.book_id = b.id
               ORDER BY c.created_at ASC"#,
        )?;
        let rows = stmt.query_map([], |row| self.row_to_comment(row))?;

        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    /// Look up a single comment by its text content.
    pub fn get_comment_by_content(&self, content: &str) -> StoreResult<Comment> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"SELECT c.id, c.content, b.title AS book_title, c.created_at, c.updated_at
               FROM comments c JOIN books b ON c.book_id = b.id
               WHERE c.content = ?1
               ORDER BY c.created_at ASC LIMIT 1"#,
            params![content],
            |row| self.row_to_comment(row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("Comment {}", content))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn list_comments_by_book(&self, title: &str) -> StoreResult<Vec<Comment>> {
        // Resolve the book first so an unknown title is a NotFound,
        // not an empty list.
        let book = self.get_book_by_title(title)?;

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT c.id, c.content, b.title AS book_title, c.created_at, c.updated_at
               FROM comments c JOIN books b ON c.book_id = b.id
               WHERE c.book_id = ?1
               ORDER BY c.created_at ASC"#,
        )?;
        let rows = stmt.query_map(params![&book.id], |row| self.row_to_comment(row))?;

        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    /// Replace the text of the comment currently reading `content`.
    pub fn update_comment(&self, content: &str, new_content: &str) -> StoreResult<()> {
        let comment = self.get_comment_by_content(content)?;

        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE comments SET content = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_content, &now, &comment.id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Comment {}", content)));
        }
        Ok(())
    }

    /// Delete the comment currently reading `content`. Like update, this
    /// targets the oldest match when several comments share the text.
    pub fn delete_comment_by_content(&self, content: &str) -> StoreResult<()> {
        let comment = self.get_comment_by_content(content)?;

        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM comments WHERE id = ?1", params![&comment.id])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Comment {}", content)));
        }
        Ok(())
    }

    fn row_to_comment(&self, row: &rusqlite::Row) -> rusqlite::Result<Comment> {
        Ok(Comment {
            id: row.get("id")?,
            content: row.get("content")?,
            book_title: row.get("book_title")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
            updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
        })
    }
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Admin => "admin",
    }
}

fn role_from_str(s: &str) -> Role {
    match s {
        "admin" => Role::Admin,
        _ => Role::User,
    }
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
