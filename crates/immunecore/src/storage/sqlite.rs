use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::migrations::run_migrations;
use super::{CertificatesStorage, UsersStorage};
use crate::error::{AppError, AppResult};
use crate::models::{Certificate, Credentials, FindUserFilter, Invite, TelegramData, User};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

const USER_COLUMNS: &str = "id, login, name, invited_by, qr_generations_left, telegram_id, telegram_username, \
                            is_active, created_at, updated_at";

const CERT_COLUMNS: &str =
    "id, code, owner_id, last_name, first_name, second_name, date_birth, expiring_at, created_at";

/// Create a new database connection pool
///
/// Initializes a pool with up to 10 connections and brings the schema up to date.
///
/// # Arguments
///
/// * `database_path` - Path to SQLite database file
pub fn create_pool(database_path: &str) -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;"));
    let pool = Pool::builder().max_size(10).build(manager)?;

    let mut conn = pool.get()?;
    run_migrations(&mut conn)?;

    Ok(pool)
}

/// SQLite implementation of both storage contracts
///
/// rusqlite is blocking, every call hops onto the blocking pool.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: DbPool,
}

impl SqliteStorage {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }
}

fn to_rfc3339(at: &DateTime<Utc>) -> String {
    at.to_rfc3339()
}

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|raw| parse_ts(idx, raw)).transpose()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let telegram_id: Option<i64> = row.get(5)?;
    let telegram_username: Option<String> = row.get(6)?;
    Ok(User {
        id: row.get(0)?,
        login: row.get(1)?,
        name: row.get(2)?,
        invites: Vec::new(),
        invited_by: row.get(3)?,
        qr_generations_left: row.get(4)?,
        telegram: telegram_id.map(|id| TelegramData {
            id: id as u64,
            username: telegram_username,
        }),
        is_active: row.get(7)?,
        created_at: parse_ts(8, row.get(8)?)?,
        updated_at: parse_ts(9, row.get(9)?)?,
    })
}

fn cert_from_row(row: &Row<'_>) -> rusqlite::Result<Certificate> {
    Ok(Certificate {
        id: row.get(0)?,
        code: row.get(1)?,
        owner_id: row.get(2)?,
        credentials: Credentials {
            last_name: row.get(3)?,
            first_name: row.get(4)?,
            second_name: row.get(5)?,
            date_birth: row.get(6)?,
        },
        expiring_at: parse_ts(7, row.get(7)?)?,
        created_at: parse_ts(8, row.get(8)?)?,
    })
}

fn load_invites(conn: &Connection, owner_id: &str) -> AppResult<Vec<Invite>> {
    let mut stmt = conn.prepare("SELECT code, used_by, used_at FROM invites WHERE owner_id = ?1 ORDER BY position")?;
    let invites = stmt
        .query_map(params![owner_id], |row| {
            Ok(Invite {
                code: row.get(0)?,
                used_by: row.get(1)?,
                used_at: parse_opt_ts(2, row.get(2)?)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(invites)
}

fn with_invites(conn: &Connection, user: Option<User>) -> AppResult<Option<User>> {
    match user {
        Some(mut user) => {
            user.invites = load_invites(conn, &user.id)?;
            Ok(Some(user))
        }
        None => Ok(None),
    }
}

/// Appends invites this user does not own yet, a code owned by someone else aborts
fn insert_invites(conn: &Connection, user: &User) -> AppResult<()> {
    let mut insert = conn.prepare(
        "INSERT INTO invites (code, owner_id, used_by, used_at, position) VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(code) DO NOTHING",
    )?;
    let mut owner_of = conn.prepare("SELECT owner_id FROM invites WHERE code = ?1")?;
    for (position, invite) in user.invites.iter().enumerate() {
        let inserted = insert.execute(params![
            invite.code,
            user.id,
            invite.used_by,
            invite.used_at.as_ref().map(to_rfc3339),
            position as i64,
        ])?;
        if inserted == 0 {
            let owner: String = owner_of.query_row(params![invite.code], |row| row.get(0))?;
            if owner != user.id {
                return Err(AppError::InviteCodeTaken {
                    code: invite.code.clone(),
                });
            }
        }
    }
    Ok(())
}

#[async_trait]
impl UsersStorage for SqliteStorage {
    async fn find_user(&self, filter: &FindUserFilter) -> AppResult<Option<User>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE (?1 IS NULL OR id = ?1) AND (?2 IS NULL OR telegram_id = ?2) LIMIT 1"
            );
            let user = conn
                .query_row(&sql, params![filter.id, filter.telegram_id.map(|id| id as i64)], user_from_row)
                .optional()?;
            with_invites(conn, user)
        })
        .await
    }

    async fn find_by_invite(&self, code: &str) -> AppResult<Option<User>> {
        let code = code.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id = (SELECT owner_id FROM invites WHERE code = ?1)"
            );
            let user = conn.query_row(&sql, params![code], user_from_row).optional()?;
            with_invites(conn, user)
        })
        .await
    }

    async fn invite_code_exists(&self, code: &str) -> AppResult<bool> {
        let code = code.to_string();
        self.with_conn(move |conn| {
            let exists = conn.query_row("SELECT EXISTS(SELECT 1 FROM invites WHERE code = ?1)", params![code], |row| {
                row.get(0)
            })?;
            Ok(exists)
        })
        .await
    }

    async fn create_user(&self, user: &User) -> AppResult<()> {
        let user = user.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                params![
                    user.id,
                    user.login,
                    user.name,
                    user.invited_by,
                    user.qr_generations_left,
                    user.telegram_id().map(|id| id as i64),
                    user.telegram.as_ref().and_then(|t| t.username.clone()),
                    user.is_active,
                    to_rfc3339(&user.created_at),
                    to_rfc3339(&user.updated_at),
                ],
            )?;
            insert_invites(&tx, &user)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn update_user(&self, user: &User) -> AppResult<()> {
        let user = user.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE users SET login = ?2, name = ?3, invited_by = ?4, qr_generations_left = ?5, \
                 telegram_id = ?6, telegram_username = ?7, is_active = ?8, updated_at = ?9 WHERE id = ?1",
                params![
                    user.id,
                    user.login,
                    user.name,
                    user.invited_by,
                    user.qr_generations_left,
                    user.telegram_id().map(|id| id as i64),
                    user.telegram.as_ref().and_then(|t| t.username.clone()),
                    user.is_active,
                    to_rfc3339(&user.updated_at),
                ],
            )?;
            if changed == 0 {
                return Err(AppError::UserNotFound);
            }
            insert_invites(&tx, &user)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn mark_invite_used(&self, code: &str, user_id: &str, at: DateTime<Utc>) -> AppResult<bool> {
        let (code, user_id) = (code.to_string(), user_id.to_string());
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE invites SET used_by = ?2, used_at = ?3 WHERE code = ?1 AND used_by IS NULL AND used_at IS NULL",
                params![code, user_id, to_rfc3339(&at)],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn release_invite(&self, code: &str, user_id: &str) -> AppResult<()> {
        let (code, user_id) = (code.to_string(), user_id.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE invites SET used_by = NULL, used_at = NULL WHERE code = ?1 AND used_by = ?2",
                params![code, user_id],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CertificatesStorage for SqliteStorage {
    async fn list(&self) -> AppResult<Vec<Certificate>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {CERT_COLUMNS} FROM certificates ORDER BY created_at"))?;
            let certs = stmt
                .query_map([], cert_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(certs)
        })
        .await
    }

    async fn get_by_code(&self, code: &str) -> AppResult<Option<Certificate>> {
        let code = code.to_string();
        self.with_conn(move |conn| {
            let cert = conn
                .query_row(
                    &format!("SELECT {CERT_COLUMNS} FROM certificates WHERE code = ?1"),
                    params![code],
                    cert_from_row,
                )
                .optional()?;
            Ok(cert)
        })
        .await
    }

    async fn exists(&self, code: &str) -> AppResult<bool> {
        let code = code.to_string();
        self.with_conn(move |conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM certificates WHERE code = ?1)",
                params![code],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn create(&self, cert: &Certificate) -> AppResult<()> {
        let cert = cert.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!("INSERT INTO certificates ({CERT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    cert.id,
                    cert.code,
                    cert.owner_id,
                    cert.credentials.last_name,
                    cert.credentials.first_name,
                    cert.credentials.second_name,
                    cert.credentials.date_birth,
                    to_rfc3339(&cert.expiring_at),
                    to_rfc3339(&cert.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn storage() -> (TempDir, SqliteStorage) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        let pool = create_pool(path.to_str().unwrap()).unwrap();
        (dir, SqliteStorage::new(pool))
    }

    fn user(id: &str, tg: u64, invites: &[&str]) -> User {
        let now = Utc::now();
        User {
            id: id.into(),
            login: format!("login-{id}"),
            name: "Ivanov Ivan".into(),
            invites: invites.iter().map(|c| Invite::new(*c)).collect(),
            invited_by: None,
            qr_generations_left: 1,
            telegram: Some(TelegramData {
                id: tg,
                username: Some("ivan".into()),
            }),
            is_active: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_user_roundtrip_with_invites() {
        let (_dir, storage) = storage();
        let created = user("u1", 100, &["AAAA", "BBBB"]);
        storage.create_user(&created).await.unwrap();

        let found = storage
            .find_user(&FindUserFilter::by_telegram_id(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "u1");
        assert_eq!(found.invites.len(), 2);
        assert_eq!(found.invites[1].code, "BBBB");
        assert_eq!(found.telegram_id(), Some(100));
        assert!(storage.find_user(&FindUserFilter::by_telegram_id(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invite_claim_is_exclusive() {
        let (_dir, storage) = storage();
        storage.create_user(&user("owner", 1, &["CODE"])).await.unwrap();

        assert!(storage.invite_code_exists("CODE").await.unwrap());
        assert!(storage.mark_invite_used("CODE", "a", Utc::now()).await.unwrap());
        assert!(!storage.mark_invite_used("CODE", "b", Utc::now()).await.unwrap());

        let owner = storage.find_by_invite("CODE").await.unwrap().unwrap();
        assert_eq!(owner.id, "owner");
        assert_eq!(owner.invites[0].used_by.as_deref(), Some("a"));
        assert!(owner.invites[0].used_at.is_some());
    }

    #[tokio::test]
    async fn test_update_appends_invites_only() {
        let (_dir, storage) = storage();
        let mut stale = user("owner", 1, &["CODE"]);
        storage.create_user(&stale).await.unwrap();
        storage.mark_invite_used("CODE", "a", Utc::now()).await.unwrap();

        stale.invites.push(Invite::new("NEXT"));
        stale.qr_generations_left = 0;
        storage.update_user(&stale).await.unwrap();

        let stored = storage.find_user(&FindUserFilter::by_id("owner")).await.unwrap().unwrap();
        assert_eq!(stored.qr_generations_left, 0);
        assert_eq!(stored.invites.len(), 2);
        assert!(stored.invites[0].is_used());
        assert!(!stored.invites[1].is_used());
    }

    #[tokio::test]
    async fn test_update_rejects_code_of_another_user() {
        let (_dir, storage) = storage();
        storage.create_user(&user("owner", 1, &["CODE"])).await.unwrap();
        let mut other = user("other", 2, &[]);
        storage.create_user(&other).await.unwrap();

        other.invites = vec![Invite::new("FREE"), Invite::new("CODE")];
        other.is_active = true;
        let err = storage.update_user(&other).await.unwrap_err();
        assert!(matches!(err, AppError::InviteCodeTaken { ref code } if code == "CODE"));

        // The whole update is rolled back
        let stored = storage.find_user(&FindUserFilter::by_id("other")).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(stored.invites.is_empty());
        assert!(!storage.invite_code_exists("FREE").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_invite_only_by_claimer() {
        let (_dir, storage) = storage();
        storage.create_user(&user("owner", 1, &["CODE"])).await.unwrap();
        storage.mark_invite_used("CODE", "a", Utc::now()).await.unwrap();

        storage.release_invite("CODE", "b").await.unwrap();
        assert!(!storage.mark_invite_used("CODE", "b", Utc::now()).await.unwrap());

        storage.release_invite("CODE", "a").await.unwrap();
        assert!(storage.mark_invite_used("CODE", "b", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_certificates() {
        let (_dir, storage) = storage();
        let now = Utc::now();
        let cert = Certificate {
            id: "c1".into(),
            code: "QWERTY123456".into(),
            owner_id: Some("u1".into()),
            credentials: Credentials {
                last_name: "Ivanov".into(),
                first_name: "Ivan".into(),
                second_name: "Ivanovich".into(),
                date_birth: "01.01.2000".into(),
            },
            expiring_at: now,
            created_at: now,
        };
        storage.create(&cert).await.unwrap();
        assert!(storage.exists("QWERTY123456").await.unwrap());
        assert!(!storage.exists("NOPE").await.unwrap());

        let fetched = storage.get_by_code("QWERTY123456").await.unwrap().unwrap();
        assert_eq!(fetched.credentials, cert.credentials);
        assert_eq!(storage.list().await.unwrap().len(), 1);
        assert!(storage.create(&cert).await.is_err());
    }
}
