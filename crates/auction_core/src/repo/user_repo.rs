//! User repository contract and SQLite implementation.
//!
//! # Invariants
//! - `save`/`update` call `User::validate()` before SQL mutations.
//! - `by_name_and_email` matches exactly and expects at most one row.
//! - Updates are visible to the next read on the same connection.

use super::{ensure_connection_ready, parse_uuid, RepoError, RepoResult};
use crate::model::user::{User, UserId};
use rusqlite::{params, Connection, Row};

const USER_SELECT_SQL: &str = "SELECT id, name, email FROM users";

/// Repository interface for user persistence.
pub trait UserRepository {
    fn save(&self, user: &User) -> RepoResult<()>;
    /// Rewrites name and email of the stored user with the same id.
    fn update(&self, user: &User) -> RepoResult<()>;
    fn delete(&self, id: UserId) -> RepoResult<()>;
    fn by_id(&self, id: UserId) -> RepoResult<Option<User>>;
    /// Every user, ordered by `name ASC, id ASC`.
    fn all(&self) -> RepoResult<Vec<User>>;
    fn by_name_and_email(&self, name: &str, email: &str) -> RepoResult<Option<User>>;
}

/// SQLite-backed user repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, "users", &["id", "name", "email"])?;
        Ok(Self { conn })
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn save(&self, user: &User) -> RepoResult<()> {
        user.validate()?;

        self.conn.execute(
            "INSERT INTO users (id, name, email) VALUES (?1, ?2, ?3);",
            params![user.id.to_string(), user.name.as_str(), user.email.as_str()],
        )?;
        Ok(())
    }

    fn update(&self, user: &User) -> RepoResult<()> {
        user.validate()?;

        let changed = self.conn.execute(
            "UPDATE users SET name = ?2, email = ?3 WHERE id = ?1;",
            params![user.id.to_string(), user.name.as_str(), user.email.as_str()],
        )?;
        if changed == 0 {
            return Err(RepoError::UserNotFound(user.id));
        }
        Ok(())
    }

    fn delete(&self, id: UserId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::UserNotFound(id));
        }
        Ok(())
    }

    fn by_id(&self, id: UserId) -> RepoResult<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_user_row(row)?)),
            None => Ok(None),
        }
    }

    fn all(&self) -> RepoResult<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} ORDER BY name ASC, id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(parse_user_row(row)?);
        }
        Ok(users)
    }

    fn by_name_and_email(&self, name: &str, email: &str) -> RepoResult<Option<User>> {
        let mut stmt = self.conn.prepare(&format!(
            "{USER_SELECT_SQL}
             WHERE name = ?1
               AND email = ?2
             ORDER BY id ASC
             LIMIT 2;"
        ))?;
        let mut rows = stmt.query(params![name, email])?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let user = parse_user_row(row)?;
        if rows.next()?.is_some() {
            return Err(RepoError::NonUniqueUser {
                name: name.to_string(),
                email: email.to_string(),
            });
        }
        Ok(Some(user))
    }
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    let id_text: String = row.get("id")?;
    let user = User::with_id(
        parse_uuid(&id_text, "users.id")?,
        row.get::<_, String>("name")?,
        row.get::<_, String>("email")?,
    );
    user.validate()?;
    Ok(user)
}
