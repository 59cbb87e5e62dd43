//! SQLite Storage for installed-plugin data
//!
//! 저장 데이터:
//! - `plugins`: 설치된 플러그인 (핸들, 버전, 스키마 버전, 라이선스, 설정)
//! - `plugin_migrations`: 플러그인별 적용된 마이그레이션 기록
//!
//! ## 스키마 버전
//!
//! `MIGRATIONS` 의 각 단계는 자신의 트랜잭션 안에서 적용되고
//! `schema_version` 테이블에 기록됩니다. 열 때마다 밀린 단계만 실행됩니다.
//! - v1: plugins, plugin_migrations
//! - v2: license_key, license_key_status 컬럼

use crate::{Error, Result};
use rusqlite::{params, Connection, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// 데이터 디렉토리 안의 DB 파일명
pub const DATABASE_FILE: &str = "hearth.db";

struct Migration {
    version: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "installed plugins and per-plugin migration history",
        sql: r#"
            CREATE TABLE plugins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                handle TEXT NOT NULL UNIQUE,
                version TEXT NOT NULL,
                schema_version TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 0,
                settings TEXT,
                install_date TEXT NOT NULL
            );

            CREATE TABLE plugin_migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plugin_id INTEGER NOT NULL REFERENCES plugins(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL,
                UNIQUE (plugin_id, name)
            );

            CREATE INDEX idx_plugin_migrations_plugin ON plugin_migrations(plugin_id);
        "#,
    },
    Migration {
        version: 2,
        description: "license key tracking",
        sql: r#"
            ALTER TABLE plugins ADD COLUMN license_key TEXT;
            ALTER TABLE plugins ADD COLUMN license_key_status TEXT NOT NULL DEFAULT 'unknown';
        "#,
    },
];

fn latest_version() -> i32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

fn storage_err(context: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::Storage(format!("{}: {}", context, e))
}

/// 설치된 플러그인 상태 저장소 (공유 커넥션 하나)
#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// `<data_dir>/hearth.db` 를 열거나 생성
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| {
            Error::Storage(format!("cannot create {}: {}", data_dir.display(), e))
        })?;

        let conn = Connection::open(data_dir.join(DATABASE_FILE))
            .map_err(storage_err("open database"))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )
        .map_err(storage_err("set pragmas"))?;

        Self::bootstrap(conn)
    }

    /// 테스트용 메모리 DB
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err("open in-memory database"))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(storage_err("set pragmas"))?;
        Self::bootstrap(conn)
    }

    fn bootstrap(mut conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .map_err(storage_err("create schema_version"))?;

        Self::migrate(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate(conn: &mut Connection) -> Result<()> {
        let current = Self::read_version(conn)?;
        let target = latest_version();

        if current > target {
            warn!(
                "Database schema v{} is newer than this build (v{})",
                current, target
            );
            return Ok(());
        }
        if current == target {
            debug!("Database schema is up to date (v{})", current);
            return Ok(());
        }

        info!("Migrating database schema v{} -> v{}", current, target);
        for step in MIGRATIONS.iter().filter(|m| m.version > current) {
            let tx = conn.transaction().map_err(storage_err("begin migration"))?;
            tx.execute_batch(step.sql).map_err(|e| {
                Error::Storage(format!("migration v{} failed: {}", step.version, e))
            })?;
            tx.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![step.version],
            )
            .map_err(storage_err("record schema version"))?;
            tx.commit().map_err(storage_err("commit migration"))?;

            info!("Applied schema v{}: {}", step.version, step.description);
        }
        Ok(())
    }

    fn read_version(conn: &Connection) -> Result<i32> {
        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(storage_err("read schema version"))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("storage connection lock poisoned".into()))
    }

    /// 적용된 DB 스키마 버전
    pub fn get_schema_version(&self) -> Result<i32> {
        Self::read_version(&*self.lock()?)
    }

    // ========================================================================
    // Connection Access
    // ========================================================================

    /// 트랜잭션 없이 공유 커넥션으로 `f` 실행
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// 트랜잭션 안에서 `f` 실행
    ///
    /// - `Ok(Some(v))`: 커밋 후 `Some(v)`
    /// - `Ok(None)`: 롤백 후 `None`
    /// - `Err(e)`: 롤백 후 `e` 전파
    ///
    /// 호출 동안 커넥션 잠금을 쥐고 있으므로 `f` 안에서 이 `Storage` 를 다시 부르면 안 됩니다.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<Option<T>>,
    ) -> Result<Option<T>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage_err("begin transaction"))?;

        match f(&tx) {
            Ok(Some(value)) => {
                tx.commit().map_err(storage_err("commit"))?;
                Ok(Some(value))
            }
            Ok(None) => {
                tx.rollback().map_err(storage_err("roll back"))?;
                debug!("Transaction rolled back");
                Ok(None)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Rollback after error failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }
}
