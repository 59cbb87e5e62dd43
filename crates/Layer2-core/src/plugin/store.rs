//! Plugin Store - 설치된 플러그인 정보 관리
//!
//! SQLite `plugins` 테이블 위에 핸들별 캐시를 둡니다.
//! 캐시는 첫 조회 시 한 번 채워지고, 쓰기 후에는 해당 행만 다시 읽습니다.

use super::traits::Settings;
use hearth_foundation::{plugin_rows, InstalledPluginRecord, LicenseKeyStatus, Result, Storage};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

// ============================================================================
// PluginStore - 설치 정보 저장소
// ============================================================================

/// 설치된 플러그인 저장소
pub struct PluginStore {
    storage: Storage,

    /// 핸들 → 행 캐시 (`None` = 아직 로드 안 됨)
    cache: RwLock<Option<HashMap<String, InstalledPluginRecord>>>,
}

impl PluginStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            cache: RwLock::new(None),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    // ========================================================================
    // 로드
    // ========================================================================

    /// 전체 행을 다시 읽어 캐시 채우기
    pub fn load(&self) -> Result<()> {
        let rows = self.storage.list_plugins()?;
        let map: HashMap<String, InstalledPluginRecord> =
            rows.into_iter().map(|r| (r.handle.clone(), r)).collect();

        debug!("Loaded {} installed plugin records", map.len());
        *self.cache.write() = Some(map);
        Ok(())
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.cache.read().is_none() {
            self.load()?;
        }
        Ok(())
    }

    /// 캐시 폐기 (다음 조회 시 다시 로드)
    pub fn invalidate(&self) {
        *self.cache.write() = None;
    }

    /// 한 행만 다시 읽기
    pub fn refresh(&self, handle: &str) -> Result<Option<InstalledPluginRecord>> {
        let record = self.storage.get_plugin(handle)?;
        if let Some(cache) = self.cache.write().as_mut() {
            match record {
                Some(ref r) => {
                    cache.insert(handle.to_string(), r.clone());
                }
                None => {
                    cache.remove(handle);
                }
            }
        }
        Ok(record)
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 설치된 모든 행 (id 순)
    pub fn list(&self) -> Result<Vec<InstalledPluginRecord>> {
        self.ensure_loaded()?;
        let mut rows: Vec<InstalledPluginRecord> = self
            .cache
            .read()
            .as_ref()
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    /// 활성화된 행만
    pub fn list_enabled(&self) -> Result<Vec<InstalledPluginRecord>> {
        Ok(self.list()?.into_iter().filter(|r| r.enabled).collect())
    }

    pub fn get(&self, handle: &str) -> Result<Option<InstalledPluginRecord>> {
        self.ensure_loaded()?;
        Ok(self
            .cache
            .read()
            .as_ref()
            .and_then(|c| c.get(handle).cloned()))
    }

    pub fn contains(&self, handle: &str) -> Result<bool> {
        Ok(self.get(handle)?.is_some())
    }

    // ========================================================================
    // 변경 - 단일 쓰기
    // ========================================================================

    pub fn set_enabled(&self, handle: &str, enabled: bool) -> Result<bool> {
        let updated = self.storage.set_plugin_enabled(handle, enabled)?;
        if updated {
            info!("Plugin {} {}", handle, if enabled { "enabled" } else { "disabled" });
            self.refresh(handle)?;
        }
        Ok(updated)
    }

    pub fn set_settings(&self, handle: &str, settings: &Settings) -> Result<bool> {
        let updated = self.storage.set_plugin_settings(handle, settings)?;
        if updated {
            self.refresh(handle)?;
        }
        Ok(updated)
    }

    pub fn set_version(&self, handle: &str, version: &str) -> Result<bool> {
        let updated = self.storage.set_plugin_version(handle, version)?;
        if updated {
            self.refresh(handle)?;
        }
        Ok(updated)
    }

    pub fn set_schema_version(&self, handle: &str, schema_version: &str) -> Result<bool> {
        let updated = self.storage.set_plugin_schema_version(handle, schema_version)?;
        if updated {
            self.refresh(handle)?;
        }
        Ok(updated)
    }

    /// 키 저장. 키가 바뀌었으면 상태를 `unknown`으로 되돌림
    pub fn set_license_key(&self, handle: &str, key: Option<&str>) -> Result<bool> {
        let current = self.get(handle)?;
        let changed = current
            .as_ref()
            .map(|r| r.license_key.as_deref() != key)
            .unwrap_or(false);

        let updated = self
            .storage
            .transaction(|tx| {
                let updated = plugin_rows::update_license_key(tx, handle, key)?;
                if updated && changed {
                    plugin_rows::update_license_key_status(tx, handle, LicenseKeyStatus::Unknown)?;
                }
                Ok(Some(updated))
            })?
            .unwrap_or(false);

        if updated {
            self.refresh(handle)?;
        }
        Ok(updated)
    }

    pub fn set_license_key_status(&self, handle: &str, status: LicenseKeyStatus) -> Result<bool> {
        let updated = self.storage.set_plugin_license_key_status(handle, status)?;
        if updated {
            self.refresh(handle)?;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hearth_foundation::NewPluginRecord;

    fn store_with(handles: &[&str]) -> PluginStore {
        let storage = Storage::in_memory().unwrap();
        for handle in handles {
            storage
                .with_connection(|conn| {
                    plugin_rows::insert_plugin(
                        conn,
                        &NewPluginRecord {
                            handle,
                            version: "1.0.0",
                            schema_version: "1.0.0",
                            enabled: true,
                            install_date: Utc::now(),
                        },
                    )
                })
                .unwrap();
        }
        PluginStore::new(storage)
    }

    #[test]
    fn test_list_and_get() {
        let store = store_with(&["seo", "feeds"]);
        let handles: Vec<String> = store.list().unwrap().into_iter().map(|r| r.handle).collect();
        assert_eq!(handles, vec!["seo".to_string(), "feeds".to_string()]);
        assert!(store.contains("feeds").unwrap());
        assert!(!store.contains("missing").unwrap());
    }

    #[test]
    fn test_set_enabled_updates_cache() {
        let store = store_with(&["seo"]);
        assert_eq!(store.list_enabled().unwrap().len(), 1);

        assert!(store.set_enabled("seo", false).unwrap());
        assert!(store.list_enabled().unwrap().is_empty());
        assert!(!store.get("seo").unwrap().unwrap().enabled);

        assert!(!store.set_enabled("missing", true).unwrap());
    }

    #[test]
    fn test_license_key_resets_status_on_change() {
        let store = store_with(&["seo"]);
        let key = "ABCD1234EFGH5678IJKL9012";

        store.set_license_key("seo", Some(key)).unwrap();
        store
            .set_license_key_status("seo", LicenseKeyStatus::Valid)
            .unwrap();

        // same key keeps the status
        store.set_license_key("seo", Some(key)).unwrap();
        assert_eq!(
            store.get("seo").unwrap().unwrap().license_key_status,
            LicenseKeyStatus::Valid
        );

        store.set_license_key("seo", None).unwrap();
        let record = store.get("seo").unwrap().unwrap();
        assert_eq!(record.license_key, None);
        assert_eq!(record.license_key_status, LicenseKeyStatus::Unknown);
    }

    #[test]
    fn test_invalidate_rereads() {
        let store = store_with(&["seo"]);
        assert_eq!(store.list().unwrap().len(), 1);

        store
            .storage()
            .with_connection(|conn| plugin_rows::delete_plugin(conn, 1))
            .unwrap();
        // stale until invalidated
        assert_eq!(store.list().unwrap().len(), 1);

        store.invalidate();
        assert!(store.list().unwrap().is_empty());
    }
}
