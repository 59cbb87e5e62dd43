//! Plugin traits - 핵심 플러그인 인터페이스
//!
//! - `Plugin`: 모든 플러그인 구현이 만족해야 하는 기능 계약
//! - `LivePlugin`: 디스크립터 + 구현 + 설정 모델 + 마이그레이션 추적기
//! - `HookContext`: install/uninstall 훅에 전달되는 트랜잭션 컨텍스트

use super::host::Host;
use super::manifest::PluginDescriptor;
use hearth_foundation::{plugin_rows, Result};
use parking_lot::RwLock;
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::any::Any;
use std::sync::Arc;

/// 플러그인 설정 맵
pub type Settings = Map<String, Value>;

// ============================================================================
// Plugin Trait - 모든 플러그인이 구현해야 하는 인터페이스
// ============================================================================

/// 플러그인 트레이트
///
/// 식별자와 버전은 디스크립터가 가지므로 구현은 동작만 제공합니다.
/// 훅은 저장소 트랜잭션 안에서 동기적으로 호출됩니다.
pub trait Plugin: Send + Sync {
    /// 설치 훅. `Ok(false)`면 설치 전체가 롤백됨
    fn install(&self, _ctx: &HookContext<'_>) -> Result<bool> {
        Ok(true)
    }

    /// 제거 훅. `Ok(false)`면 제거 전체가 롤백됨
    fn uninstall(&self, _ctx: &HookContext<'_>) -> Result<bool> {
        Ok(true)
    }

    /// 설정 모델 기본값 (`None` = 설정 없음)
    fn default_settings(&self) -> Option<Settings> {
        None
    }

    /// 설정 검증. 실패 시 메시지 목록
    fn validate_settings(&self, _settings: &Settings) -> std::result::Result<(), Vec<String>> {
        Ok(())
    }

    /// 저장 직전 훅. `false`면 저장 취소
    fn before_save_settings(&self, _settings: &Settings) -> bool {
        true
    }

    /// 저장 직후 훅
    fn after_save_settings(&self, _settings: &Settings) {}

    /// 다운캐스팅 지원
    fn as_any(&self) -> &dyn Any;
}

// ============================================================================
// PluginInit - 생성자 입력
// ============================================================================

/// 플러그인 생성자에 전달되는 값
#[derive(Clone)]
pub struct PluginInit {
    pub handle: String,
    pub descriptor: PluginDescriptor,
    /// 호스트 역참조
    pub host: Arc<dyn Host>,
}

// ============================================================================
// MigrationTracker
// ============================================================================

/// 플러그인별 마이그레이션 기록
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTracker {
    plugin_id: i64,
    namespace: String,
}

impl MigrationTracker {
    pub fn new(plugin_id: i64, handle: &str) -> Self {
        Self {
            plugin_id,
            namespace: format!("{}.migrations", handle),
        }
    }

    pub fn plugin_id(&self) -> i64 {
        self.plugin_id
    }

    /// `<handle>.migrations`
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn record_applied(&self, conn: &Connection, name: &str) -> Result<()> {
        plugin_rows::record_migration(conn, self.plugin_id, name)
    }

    pub fn applied(&self, conn: &Connection) -> Result<Vec<String>> {
        plugin_rows::migrations(conn, self.plugin_id)
    }

    pub fn is_applied(&self, conn: &Connection, name: &str) -> Result<bool> {
        Ok(self.applied(conn)?.iter().any(|n| n == name))
    }
}

// ============================================================================
// HookContext
// ============================================================================

/// install/uninstall 훅 컨텍스트
pub struct HookContext<'a> {
    conn: &'a Connection,
    descriptor: &'a PluginDescriptor,
    migrator: Option<&'a MigrationTracker>,
    settings: Option<Settings>,
}

impl<'a> HookContext<'a> {
    pub fn new(
        conn: &'a Connection,
        descriptor: &'a PluginDescriptor,
        migrator: Option<&'a MigrationTracker>,
        settings: Option<Settings>,
    ) -> Self {
        Self {
            conn,
            descriptor,
            migrator,
            settings,
        }
    }

    /// 진행 중인 트랜잭션의 커넥션
    pub fn connection(&self) -> &Connection {
        self.conn
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        self.descriptor
    }

    pub fn migrator(&self) -> Option<&MigrationTracker> {
        self.migrator
    }

    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    /// 마이그레이션 적용 기록 (추적기가 없으면 무시)
    pub fn record_migration(&self, name: &str) -> Result<()> {
        match self.migrator {
            Some(m) => m.record_applied(self.conn, name),
            None => Ok(()),
        }
    }
}

// ============================================================================
// LivePlugin - 라이브 인스턴스
// ============================================================================

/// 활성화된 플러그인 인스턴스
pub struct LivePlugin {
    descriptor: PluginDescriptor,
    inner: Box<dyn Plugin>,
    settings: RwLock<Option<Settings>>,
    migrator: Option<MigrationTracker>,
}

impl LivePlugin {
    pub fn new(
        descriptor: PluginDescriptor,
        inner: Box<dyn Plugin>,
        migrator: Option<MigrationTracker>,
    ) -> Self {
        let settings = inner.default_settings();
        Self {
            descriptor,
            inner,
            settings: RwLock::new(settings),
            migrator,
        }
    }

    pub fn handle(&self) -> &str {
        &self.descriptor.handle
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn version(&self) -> &str {
        &self.descriptor.version
    }

    pub fn schema_version(&self) -> &str {
        &self.descriptor.schema_version
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.inner.as_ref()
    }

    /// 구현 타입으로 다운캐스트
    pub fn downcast_ref<T: Plugin + 'static>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    pub fn migrator(&self) -> Option<&MigrationTracker> {
        self.migrator.as_ref()
    }

    // ========================================================================
    // 설정
    // ========================================================================

    pub fn has_settings(&self) -> bool {
        self.settings.read().is_some()
    }

    /// 현재 설정 스냅샷
    pub fn settings(&self) -> Option<Settings> {
        self.settings.read().clone()
    }

    /// 현재 모델 위에 값을 덮어쓴 후보 (모델은 바뀌지 않음)
    pub fn merged_settings(&self, values: &Settings) -> Option<Settings> {
        self.settings.read().as_ref().map(|current| {
            let mut merged = current.clone();
            for (key, value) in values {
                merged.insert(key.clone(), value.clone());
            }
            merged
        })
    }

    /// 검증 없이 값 적용 (설정 모델이 없으면 무시)
    pub fn apply_settings(&self, values: &Settings) {
        if let Some(merged) = self.merged_settings(values) {
            *self.settings.write() = Some(merged);
        }
    }

    /// 모델 전체 교체
    pub(crate) fn replace_settings(&self, settings: Settings) {
        let mut current = self.settings.write();
        if current.is_some() {
            *current = Some(settings);
        }
    }

    /// 훅 컨텍스트 생성
    pub fn hook_context<'a>(&'a self, conn: &'a Connection) -> HookContext<'a> {
        HookContext::new(conn, &self.descriptor, self.migrator.as_ref(), self.settings())
    }
}

impl std::fmt::Debug for LivePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivePlugin")
            .field("handle", &self.descriptor.handle)
            .field("version", &self.descriptor.version)
            .field("migrator", &self.migrator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::version::DEFAULT_SCHEMA_VERSION;
    use chrono::Utc;
    use hearth_foundation::{NewPluginRecord, Storage};
    use serde_json::json;

    struct SeoPlugin;

    impl Plugin for SeoPlugin {
        fn default_settings(&self) -> Option<Settings> {
            let mut s = Settings::new();
            s.insert("title".into(), json!("Untitled"));
            s.insert("limit".into(), json!(10));
            Some(s)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn descriptor() -> PluginDescriptor {
        PluginDescriptor {
            handle: "seo".into(),
            class: "acme::seo::Plugin".into(),
            name: "SEO".into(),
            version: "1.0.0".into(),
            schema_version: DEFAULT_SCHEMA_VERSION.into(),
            base_path: None,
            package_name: None,
            description: None,
            developer: None,
            developer_url: None,
            documentation_url: None,
            changelog_url: None,
            download_url: None,
            aliases: Default::default(),
            components: Default::default(),
        }
    }

    #[test]
    fn test_apply_settings_merges() {
        let live = LivePlugin::new(descriptor(), Box::new(SeoPlugin), None);
        assert!(live.has_settings());

        let mut values = Settings::new();
        values.insert("title".into(), json!("Home"));
        live.apply_settings(&values);

        let settings = live.settings().unwrap();
        assert_eq!(settings["title"], json!("Home"));
        assert_eq!(settings["limit"], json!(10));
        assert!(live.downcast_ref::<SeoPlugin>().is_some());
    }

    #[test]
    fn test_migration_tracker() {
        let storage = Storage::in_memory().unwrap();
        let id = storage
            .with_connection(|conn| {
                plugin_rows::insert_plugin(
                    conn,
                    &NewPluginRecord {
                        handle: "seo",
                        version: "1.0.0",
                        schema_version: "1.0.0",
                        enabled: true,
                        install_date: Utc::now(),
                    },
                )
            })
            .unwrap();

        let tracker = MigrationTracker::new(id, "seo");
        assert_eq!(tracker.namespace(), "seo.migrations");

        storage
            .with_connection(|conn| {
                tracker.record_applied(conn, "m0001_init")?;
                assert!(tracker.is_applied(conn, "m0001_init")?);
                assert!(!tracker.is_applied(conn, "m0002_next")?);
                Ok(())
            })
            .unwrap();
    }
}
