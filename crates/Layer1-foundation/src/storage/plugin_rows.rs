//! Installed-plugin rows
//!
//! `plugins` / `plugin_migrations` 테이블 접근 함수.
//! 모든 함수는 `&Connection`을 받으므로 트랜잭션 안팎에서 동일하게 사용 가능
//! (`Transaction`은 `Connection`으로 deref 됨).

use super::db::Storage;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// LicenseKeyStatus
// ============================================================================

/// 캐시된 라이선스 키 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseKeyStatus {
    /// 아직 원격 검증되지 않음 (리셋 상태)
    #[default]
    Unknown,
    Valid,
    Invalid,
    Mismatched,
    Astray,
}

impl LicenseKeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Mismatched => "mismatched",
            Self::Astray => "astray",
        }
    }

    /// 저장된 문자열 파싱 (알 수 없는 값은 Unknown)
    pub fn parse(s: &str) -> Self {
        match s {
            "valid" => Self::Valid,
            "invalid" => Self::Invalid,
            "mismatched" => Self::Mismatched,
            "astray" => Self::Astray,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for LicenseKeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// InstalledPluginRecord
// ============================================================================

/// `plugins` 테이블 행 - 설치된 플러그인 하나
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPluginRecord {
    pub id: i64,
    pub handle: String,
    pub version: String,
    pub schema_version: String,
    pub license_key: Option<String>,
    pub license_key_status: LicenseKeyStatus,
    pub enabled: bool,
    pub settings: Option<Map<String, Value>>,
    pub install_date: DateTime<Utc>,
}

/// 설치 시 삽입할 값
#[derive(Debug, Clone)]
pub struct NewPluginRecord<'a> {
    pub handle: &'a str,
    pub version: &'a str,
    pub schema_version: &'a str,
    pub enabled: bool,
    pub install_date: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = "SELECT id, handle, version, schema_version, license_key, \
     license_key_status, enabled, settings, install_date FROM plugins";

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<InstalledPluginRecord> {
    let status: String = row.get(5)?;
    let settings: Option<String> = row.get(7)?;
    let settings = match settings {
        Some(raw) => serde_json::from_str::<Value>(&raw)
            .map_err(|e| conversion_error(7, e))?
            .as_object()
            .cloned(),
        None => None,
    };
    let install_date: String = row.get(8)?;
    let install_date = DateTime::parse_from_rfc3339(&install_date)
        .map_err(|e| conversion_error(8, e))?
        .with_timezone(&Utc);

    Ok(InstalledPluginRecord {
        id: row.get(0)?,
        handle: row.get(1)?,
        version: row.get(2)?,
        schema_version: row.get(3)?,
        license_key: row.get(4)?,
        license_key_status: LicenseKeyStatus::parse(&status),
        enabled: row.get(6)?,
        settings,
        install_date,
    })
}

// ============================================================================
// Row functions
// ============================================================================

/// 플러그인 행 삽입, 새 id 반환
pub fn insert_plugin(conn: &Connection, record: &NewPluginRecord<'_>) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO plugins (handle, version, schema_version, enabled, install_date)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            record.handle,
            record.version,
            record.schema_version,
            record.enabled,
            record.install_date.to_rfc3339(),
        ],
    )
    .map_err(|e| Error::Storage(format!("Failed to insert plugin {}: {}", record.handle, e)))?;

    Ok(conn.last_insert_rowid())
}

/// 플러그인 행 삭제 (마이그레이션 기록은 FK cascade로 함께 삭제)
pub fn delete_plugin(conn: &Connection, id: i64) -> Result<bool> {
    let affected = conn
        .execute("DELETE FROM plugins WHERE id = ?1", params![id])
        .map_err(|e| Error::Storage(format!("Failed to delete plugin {}: {}", id, e)))?;
    Ok(affected > 0)
}

pub fn find_plugin(conn: &Connection, handle: &str) -> Result<Option<InstalledPluginRecord>> {
    conn.query_row(
        &format!("{} WHERE handle = ?1", SELECT_COLUMNS),
        params![handle],
        record_from_row,
    )
    .optional()
    .map_err(|e| Error::Storage(format!("Failed to get plugin {}: {}", handle, e)))
}

pub fn all_plugins(conn: &Connection) -> Result<Vec<InstalledPluginRecord>> {
    let mut stmt = conn
        .prepare(&format!("{} ORDER BY id ASC", SELECT_COLUMNS))
        .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map([], record_from_row)
        .map_err(|e| Error::Storage(format!("Failed to query plugins: {}", e)))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::Storage(format!("Failed to read plugin row: {}", e)))?;

    Ok(rows)
}

pub fn update_enabled(conn: &Connection, handle: &str, enabled: bool) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE plugins SET enabled = ?2 WHERE handle = ?1",
            params![handle, enabled],
        )
        .map_err(|e| Error::Storage(format!("Failed to update plugin {}: {}", handle, e)))?;
    Ok(affected > 0)
}

pub fn update_settings(
    conn: &Connection,
    handle: &str,
    settings: &Map<String, Value>,
) -> Result<bool> {
    let encoded = serde_json::to_string(settings)?;
    let affected = conn
        .execute(
            "UPDATE plugins SET settings = ?2 WHERE handle = ?1",
            params![handle, encoded],
        )
        .map_err(|e| Error::Storage(format!("Failed to save settings for {}: {}", handle, e)))?;
    Ok(affected > 0)
}

pub fn update_version(conn: &Connection, handle: &str, version: &str) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE plugins SET version = ?2 WHERE handle = ?1",
            params![handle, version],
        )
        .map_err(|e| Error::Storage(format!("Failed to update version for {}: {}", handle, e)))?;
    Ok(affected > 0)
}

pub fn update_schema_version(conn: &Connection, handle: &str, schema_version: &str) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE plugins SET schema_version = ?2 WHERE handle = ?1",
            params![handle, schema_version],
        )
        .map_err(|e| {
            Error::Storage(format!("Failed to update schema version for {}: {}", handle, e))
        })?;
    Ok(affected > 0)
}

pub fn update_license_key(conn: &Connection, handle: &str, key: Option<&str>) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE plugins SET license_key = ?2 WHERE handle = ?1",
            params![handle, key],
        )
        .map_err(|e| Error::Storage(format!("Failed to set license key for {}: {}", handle, e)))?;
    Ok(affected > 0)
}

pub fn update_license_key_status(
    conn: &Connection,
    handle: &str,
    status: LicenseKeyStatus,
) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE plugins SET license_key_status = ?2 WHERE handle = ?1",
            params![handle, status.as_str()],
        )
        .map_err(|e| {
            Error::Storage(format!("Failed to set license status for {}: {}", handle, e))
        })?;
    Ok(affected > 0)
}

// ============================================================================
// Migration history
// ============================================================================

/// 마이그레이션 적용 기록 (이미 있으면 무시)
pub fn record_migration(conn: &Connection, plugin_id: i64, name: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO plugin_migrations (plugin_id, name, applied_at)
        VALUES (?1, ?2, ?3)
        "#,
        params![plugin_id, name, Utc::now().to_rfc3339()],
    )
    .map_err(|e| Error::Storage(format!("Failed to record migration {}: {}", name, e)))?;
    Ok(())
}

/// 적용된 마이그레이션 이름 (적용 순)
pub fn migrations(conn: &Connection, plugin_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM plugin_migrations WHERE plugin_id = ?1 ORDER BY id ASC")
        .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

    let names = stmt
        .query_map(params![plugin_id], |row| row.get(0))
        .map_err(|e| Error::Storage(format!("Failed to query migrations: {}", e)))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .map_err(|e| Error::Storage(format!("Failed to read migration row: {}", e)))?;

    Ok(names)
}

// ============================================================================
// Storage convenience wrappers
// ============================================================================

impl Storage {
    /// 설치된 모든 플러그인
    pub fn list_plugins(&self) -> Result<Vec<InstalledPluginRecord>> {
        self.with_connection(all_plugins)
    }

    /// 핸들로 플러그인 조회
    pub fn get_plugin(&self, handle: &str) -> Result<Option<InstalledPluginRecord>> {
        self.with_connection(|conn| find_plugin(conn, handle))
    }

    pub fn set_plugin_enabled(&self, handle: &str, enabled: bool) -> Result<bool> {
        self.with_connection(|conn| update_enabled(conn, handle, enabled))
    }

    pub fn set_plugin_settings(&self, handle: &str, settings: &Map<String, Value>) -> Result<bool> {
        self.with_connection(|conn| update_settings(conn, handle, settings))
    }

    pub fn set_plugin_version(&self, handle: &str, version: &str) -> Result<bool> {
        self.with_connection(|conn| update_version(conn, handle, version))
    }

    pub fn set_plugin_schema_version(&self, handle: &str, schema_version: &str) -> Result<bool> {
        self.with_connection(|conn| update_schema_version(conn, handle, schema_version))
    }

    pub fn set_plugin_license_key(&self, handle: &str, key: Option<&str>) -> Result<bool> {
        self.with_connection(|conn| update_license_key(conn, handle, key))
    }

    pub fn set_plugin_license_key_status(
        &self,
        handle: &str,
        status: LicenseKeyStatus,
    ) -> Result<bool> {
        self.with_connection(|conn| update_license_key_status(conn, handle, status))
    }

    /// 플러그인 마이그레이션 기록
    pub fn plugin_migrations(&self, plugin_id: i64) -> Result<Vec<String>> {
        self.with_connection(|conn| migrations(conn, plugin_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(handle: &str) -> NewPluginRecord<'_> {
        NewPluginRecord {
            handle,
            version: "1.0.0",
            schema_version: "1.0.0",
            enabled: true,
            install_date: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let storage = Storage::in_memory().unwrap();
        let id = storage
            .with_connection(|conn| insert_plugin(conn, &new_record("seo")))
            .unwrap();

        let record = storage.get_plugin("seo").unwrap().expect("record");
        assert_eq!(record.id, id);
        assert!(record.enabled);
        assert_eq!(record.license_key, None);
        assert_eq!(record.license_key_status, LicenseKeyStatus::Unknown);
        assert!(record.settings.is_none());
    }

    #[test]
    fn test_unique_handle() {
        let storage = Storage::in_memory().unwrap();
        storage
            .with_connection(|conn| insert_plugin(conn, &new_record("seo")))
            .unwrap();
        let dup = storage.with_connection(|conn| insert_plugin(conn, &new_record("seo")));
        assert!(matches!(dup, Err(Error::Storage(_))));
    }

    #[test]
    fn test_updates() {
        let storage = Storage::in_memory().unwrap();
        storage
            .with_connection(|conn| insert_plugin(conn, &new_record("seo")))
            .unwrap();

        let mut settings = Map::new();
        settings.insert("title".into(), Value::String("Home".into()));

        assert!(storage.set_plugin_enabled("seo", false).unwrap());
        assert!(storage.set_plugin_settings("seo", &settings).unwrap());
        assert!(storage.set_plugin_version("seo", "1.1.0").unwrap());
        assert!(storage
            .set_plugin_license_key("seo", Some("ABCD1234EFGH5678IJKL9012"))
            .unwrap());
        assert!(storage
            .set_plugin_license_key_status("seo", LicenseKeyStatus::Valid)
            .unwrap());

        let record = storage.get_plugin("seo").unwrap().unwrap();
        assert!(!record.enabled);
        assert_eq!(record.settings, Some(settings));
        assert_eq!(record.version, "1.1.0");
        assert_eq!(record.license_key.as_deref(), Some("ABCD1234EFGH5678IJKL9012"));
        assert_eq!(record.license_key_status, LicenseKeyStatus::Valid);

        // 없는 행은 영향 없음
        assert!(!storage.set_plugin_enabled("missing", true).unwrap());
    }

    #[test]
    fn test_delete_cascades_migrations() {
        let storage = Storage::in_memory().unwrap();
        let id = storage
            .with_connection(|conn| {
                let id = insert_plugin(conn, &new_record("seo"))?;
                record_migration(conn, id, "m0001_init")?;
                record_migration(conn, id, "m0002_titles")?;
                record_migration(conn, id, "m0002_titles")?;
                Ok(id)
            })
            .unwrap();

        assert_eq!(
            storage.plugin_migrations(id).unwrap(),
            vec!["m0001_init".to_string(), "m0002_titles".to_string()]
        );

        assert!(storage.with_connection(|conn| delete_plugin(conn, id)).unwrap());
        assert!(storage.plugin_migrations(id).unwrap().is_empty());
        assert!(storage.get_plugin("seo").unwrap().is_none());
    }

    #[test]
    fn test_license_status_parse() {
        assert_eq!(LicenseKeyStatus::parse("astray"), LicenseKeyStatus::Astray);
        assert_eq!(LicenseKeyStatus::parse("garbage"), LicenseKeyStatus::Unknown);
        assert_eq!(LicenseKeyStatus::Mismatched.to_string(), "mismatched");
    }
}
