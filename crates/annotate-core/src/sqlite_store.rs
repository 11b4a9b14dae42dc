//! SQLite-backed store backend.
//!
//! A local stand-in for the remote store: accounts, projects, memberships,
//! invitations and items live in one database file. Every commit runs in a
//! single transaction.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::config::Credentials;
use crate::remote::{
    Collection, CollectionManager, Item, ItemManager, Metadata, RemoteAccount, RemoteClient,
    RemoteError,
};

type Shared = Arc<Mutex<Connection>>;

fn lock(conn: &Shared) -> Result<MutexGuard<'_, Connection>, RemoteError> {
    conn.lock().map_err(|e| RemoteError::Storage(e.to_string()))
}

fn storage(op: &str, e: rusqlite::Error) -> RemoteError {
    RemoteError::Storage(format!("{}: {}", op, e))
}

fn meta_to_text(meta: &Metadata) -> Result<String, RemoteError> {
    serde_json::to_string(meta).map_err(|e| RemoteError::Storage(e.to_string()))
}

fn meta_from_text(text: &str) -> Result<Metadata, RemoteError> {
    serde_json::from_str(text).map_err(|e| RemoteError::Storage(format!("stored meta: {}", e)))
}

/// SQLite store. Cloning shares the connection.
#[derive(Clone)]
pub struct SqliteRemote {
    conn: Shared,
}

impl SqliteRemote {
    /// Open (or create) a database at the given path.
    pub fn open(path: &Path) -> Result<Self, RemoteError> {
        let conn = Connection::open(path).map_err(|e| storage("open", e))?;
        Self::init_with_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, RemoteError> {
        let conn = Connection::open_in_memory().map_err(|e| storage("open_in_memory", e))?;
        Self::init_with_connection(conn)
    }

    fn init_with_connection(conn: Connection) -> Result<Self, RemoteError> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                password TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS projects (
                uid TEXT PRIMARY KEY,
                meta TEXT NOT NULL,
                content BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS members (
                project_uid TEXT NOT NULL REFERENCES projects(uid) ON DELETE CASCADE,
                username TEXT NOT NULL,
                PRIMARY KEY (project_uid, username)
            );

            CREATE TABLE IF NOT EXISTS invitations (
                username TEXT NOT NULL,
                project_uid TEXT NOT NULL REFERENCES projects(uid) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS items (
                uid TEXT PRIMARY KEY,
                project_uid TEXT NOT NULL REFERENCES projects(uid) ON DELETE CASCADE,
                meta TEXT NOT NULL,
                content BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_items_project ON items(project_uid);
            CREATE INDEX IF NOT EXISTS idx_invitations_user ON invitations(username);
            ",
        )
        .map_err(|e| storage("init_schema", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Register (or re-key) an account that can log in.
    pub fn register_user(&self, username: &str, password: &str) -> Result<(), RemoteError> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO users (username, password) VALUES (?1, ?2)
             ON CONFLICT(username) DO UPDATE SET password = excluded.password",
            params![username, password],
        )
        .map_err(|e| storage("insert user", e))?;
        Ok(())
    }

    /// Create a project owned by `owner` and return its uid.
    pub fn create_project(&self, owner: &str, content: Vec<u8>) -> Result<String, RemoteError> {
        let uid = Uuid::new_v4().to_string();
        let conn = lock(&self.conn)?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| storage("begin tx", e))?;
        tx.execute(
            "INSERT INTO projects (uid, meta, content) VALUES (?1, ?2, ?3)",
            params![uid, meta_to_text(&Metadata::new())?, content],
        )
        .map_err(|e| storage("insert project", e))?;
        tx.execute(
            "INSERT INTO members (project_uid, username) VALUES (?1, ?2)",
            params![uid, owner],
        )
        .map_err(|e| storage("insert member", e))?;
        tx.commit().map_err(|e| storage("commit", e))?;
        Ok(uid)
    }

    /// Queue an invitation for `username` to join `project_uid`.
    pub fn invite(&self, username: &str, project_uid: &str) -> Result<(), RemoteError> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO invitations (username, project_uid) VALUES (?1, ?2)",
            params![username, project_uid],
        )
        .map_err(|e| storage("insert invitation", e))?;
        Ok(())
    }

    /// Collection manager acting as `username`, without going through login.
    pub fn collections_for(&self, username: &str) -> SqliteCollections {
        SqliteCollections {
            conn: Arc::clone(&self.conn),
            username: username.to_string(),
        }
    }
}

impl RemoteClient for SqliteRemote {
    type Account = SqliteAccount;

    fn login(&self, credentials: &Credentials) -> Result<SqliteAccount, RemoteError> {
        let conn = lock(&self.conn)?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT password FROM users WHERE username = ?1",
                params![credentials.username],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| storage("query user", e))?;

        match stored {
            Some(password) if password == credentials.password => Ok(SqliteAccount {
                conn: Arc::clone(&self.conn),
                username: credentials.username.clone(),
            }),
            _ => Err(RemoteError::Auth(format!(
                "invalid credentials for {}",
                credentials.username
            ))),
        }
    }
}

/// A logged-in account on a [`SqliteRemote`].
pub struct SqliteAccount {
    conn: Shared,
    username: String,
}

impl RemoteAccount for SqliteAccount {
    type Collections = SqliteCollections;

    fn username(&self) -> &str {
        &self.username
    }

    fn collection_manager(&self) -> Result<SqliteCollections, RemoteError> {
        Ok(SqliteCollections {
            conn: Arc::clone(&self.conn),
            username: self.username.clone(),
        })
    }

    fn accept_pending_invitations(&self) -> Result<usize, RemoteError> {
        let conn = lock(&self.conn)?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| storage("begin tx", e))?;
        let accepted = tx
            .execute(
                "INSERT OR IGNORE INTO members (project_uid, username)
                 SELECT project_uid, username FROM invitations WHERE username = ?1",
                params![self.username],
            )
            .map_err(|e| storage("accept invitations", e))?;
        tx.execute(
            "DELETE FROM invitations WHERE username = ?1",
            params![self.username],
        )
        .map_err(|e| storage("delete invitations", e))?;
        tx.commit().map_err(|e| storage("commit", e))?;
        Ok(accepted)
    }

    fn logout(self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Project access for one account.
#[derive(Clone)]
pub struct SqliteCollections {
    conn: Shared,
    username: String,
}

impl CollectionManager for SqliteCollections {
    type Items = SqliteItems;

    fn fetch(&self, uid: &str) -> Result<Collection, RemoteError> {
        let conn = lock(&self.conn)?;
        let row: Option<(String, Vec<u8>)> = conn
            .query_row(
                "SELECT p.meta, p.content FROM projects p
                 JOIN members m ON m.project_uid = p.uid
                 WHERE p.uid = ?1 AND m.username = ?2",
                params![uid, self.username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| storage("query project", e))?;

        let (meta, content) = row.ok_or_else(|| RemoteError::NotFound(format!("project {uid}")))?;
        Ok(Collection {
            uid: uid.to_string(),
            meta: meta_from_text(&meta)?,
            content,
        })
    }

    fn commit(&self, collection: &Collection) -> Result<(), RemoteError> {
        let conn = lock(&self.conn)?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| storage("begin tx", e))?;
        let updated = tx
            .execute(
                "UPDATE projects SET meta = ?1, content = ?2
                 WHERE uid = ?3 AND EXISTS (
                     SELECT 1 FROM members WHERE project_uid = ?3 AND username = ?4
                 )",
                params![
                    meta_to_text(&collection.meta)?,
                    collection.content,
                    collection.uid,
                    self.username
                ],
            )
            .map_err(|e| storage("update project", e))?;
        if updated == 0 {
            return Err(RemoteError::NotFound(format!("project {}", collection.uid)));
        }
        tx.commit().map_err(|e| storage("commit", e))?;
        Ok(())
    }

    fn item_manager(&self, collection: &Collection) -> Result<SqliteItems, RemoteError> {
        Ok(SqliteItems {
            conn: Arc::clone(&self.conn),
            project_uid: collection.uid.clone(),
            username: self.username.clone(),
        })
    }

    fn leave(&self, collection: &Collection) -> Result<(), RemoteError> {
        let conn = lock(&self.conn)?;
        let removed = conn
            .execute(
                "DELETE FROM members WHERE project_uid = ?1 AND username = ?2",
                params![collection.uid, self.username],
            )
            .map_err(|e| storage("delete member", e))?;
        if removed == 0 {
            return Err(RemoteError::NotFound(format!("project {}", collection.uid)));
        }
        Ok(())
    }
}

/// Item access scoped to one project. Every call re-checks membership.
#[derive(Clone)]
pub struct SqliteItems {
    conn: Shared,
    project_uid: String,
    username: String,
}

impl SqliteItems {
    fn check_member(&self, conn: &Connection) -> Result<(), RemoteError> {
        let member: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM members WHERE project_uid = ?1 AND username = ?2",
                params![self.project_uid, self.username],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| storage("query member", e))?;
        member
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(format!("project {}", self.project_uid)))
    }
}

impl ItemManager for SqliteItems {
    fn create(&self, meta: Metadata, content: Vec<u8>) -> Result<Item, RemoteError> {
        Ok(Item {
            uid: Uuid::new_v4().to_string(),
            meta,
            content,
        })
    }

    fn fetch(&self, uid: &str) -> Result<Item, RemoteError> {
        let conn = lock(&self.conn)?;
        self.check_member(&conn)?;
        let row: Option<(String, Vec<u8>)> = conn
            .query_row(
                "SELECT meta, content FROM items WHERE project_uid = ?1 AND uid = ?2",
                params![self.project_uid, uid],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| storage("query item", e))?;

        let (meta, content) = row.ok_or_else(|| RemoteError::NotFound(format!("item {uid}")))?;
        Ok(Item {
            uid: uid.to_string(),
            meta: meta_from_text(&meta)?,
            content,
        })
    }

    fn list(&self) -> Result<Vec<Item>, RemoteError> {
        let conn = lock(&self.conn)?;
        self.check_member(&conn)?;
        let mut stmt = conn
            .prepare(
                "SELECT uid, meta, content FROM items WHERE project_uid = ?1 ORDER BY rowid",
            )
            .map_err(|e| storage("prepare list", e))?;
        let rows = stmt
            .query_map(params![self.project_uid], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })
            .map_err(|e| storage("query list", e))?;

        let mut items = Vec::new();
        for row in rows {
            let (uid, meta, content) = row.map_err(|e| storage("read row", e))?;
            items.push(Item {
                uid,
                meta: meta_from_text(&meta)?,
                content,
            });
        }
        Ok(items)
    }

    fn commit(&self, items: &[Item]) -> Result<(), RemoteError> {
        let conn = lock(&self.conn)?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| storage("begin tx", e))?;
        self.check_member(&tx)?;
        for item in items {
            let written = tx
                .execute(
                    "INSERT INTO items (uid, project_uid, meta, content) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(uid) DO UPDATE SET meta = excluded.meta, content = excluded.content
                     WHERE items.project_uid = excluded.project_uid",
                    params![item.uid, self.project_uid, meta_to_text(&item.meta)?, item.content],
                )
                .map_err(|e| match e {
                    rusqlite::Error::SqliteFailure(ref err, _)
                        if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        RemoteError::NotFound(format!("project {}", self.project_uid))
                    }
                    other => storage("upsert item", other),
                })?;
            // Zero rows: the uid belongs to another project.
            if written == 0 {
                return Err(RemoteError::NotFound(format!("item {}", item.uid)));
            }
        }
        tx.commit().map_err(|e| storage("commit", e))?;
        Ok(())
    }
}
