//! Plugin Factory - 디스크립터 + 저장된 행 → 라이브 인스턴스
//!
//! 구현 클래스는 문자열 참조로 찾지 않고, 시작 시 등록된 생성자 테이블에서 찾습니다.

use super::host::{AliasTable, Host};
use super::manifest::PluginDescriptor;
use super::traits::{LivePlugin, MigrationTracker, Plugin, PluginInit};
use hearth_foundation::InstalledPluginRecord;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// 플러그인 생성자
pub type PluginConstructor = Arc<dyn Fn(&PluginInit) -> Box<dyn Plugin> + Send + Sync>;

// ============================================================================
// PluginFactory
// ============================================================================

/// 클래스 참조 → 생성자 레지스트리
#[derive(Default)]
pub struct PluginFactory {
    constructors: RwLock<HashMap<String, PluginConstructor>>,
}

impl PluginFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 생성자 등록 (같은 클래스면 교체)
    pub fn register<F>(&self, class: impl Into<String>, constructor: F)
    where
        F: Fn(&PluginInit) -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        let class = class.into();
        debug!("Registered plugin constructor: {}", class);
        self.constructors
            .write()
            .insert(class, Arc::new(constructor));
    }

    pub fn is_registered(&self, class: &str) -> bool {
        self.constructors.read().contains_key(class)
    }

    /// 등록된 클래스 목록 (정렬)
    pub fn classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.constructors.read().keys().cloned().collect();
        classes.sort();
        classes
    }

    /// 라이브 인스턴스 생성
    ///
    /// 1. 디스크립터 별칭과 `@<handle>` → 플러그인 디렉토리 등록
    /// 2. 생성자 조회 (없으면 경고 후 `None`)
    /// 3. 저장된 설정 적용 (검증 없음)
    /// 4. 행 id가 있으면 마이그레이션 추적기 부착
    pub fn create(
        &self,
        descriptor: PluginDescriptor,
        record: Option<&InstalledPluginRecord>,
        aliases: &AliasTable,
        host: Arc<dyn Host>,
    ) -> Option<LivePlugin> {
        for (name, path) in &descriptor.aliases {
            aliases.set_alias(name, path);
        }
        if let Some(ref base) = descriptor.base_path {
            aliases.set_alias(&descriptor.handle, base);
        }

        let Some(constructor) = self.constructors.read().get(&descriptor.class).cloned() else {
            warn!(
                "Plugin {} declares class {} with no registered constructor",
                descriptor.handle, descriptor.class
            );
            return None;
        };

        let init = PluginInit {
            handle: descriptor.handle.clone(),
            descriptor: descriptor.clone(),
            host,
        };
        let inner = constructor(&init);

        let migrator = record.map(|r| MigrationTracker::new(r.id, &descriptor.handle));
        let live = LivePlugin::new(descriptor, inner, migrator);

        if let Some(settings) = record.and_then(|r| r.settings.as_ref()) {
            live.apply_settings(settings);
        }

        Some(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::host::ModuleTable;
    use crate::plugin::traits::Settings;
    use chrono::Utc;
    use hearth_foundation::LicenseKeyStatus;
    use serde_json::json;
    use std::any::Any;
    use std::path::PathBuf;

    struct Feeds;

    impl Plugin for Feeds {
        fn default_settings(&self) -> Option<Settings> {
            Some(Settings::new())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn descriptor(class: &str) -> PluginDescriptor {
        let mut aliases = std::collections::BTreeMap::new();
        aliases.insert("@acme/feeds".to_string(), PathBuf::from("/p/feeds/src"));
        PluginDescriptor {
            handle: "feeds".into(),
            class: class.into(),
            name: "Feeds".into(),
            version: "1.0.0".into(),
            schema_version: "1.0.0".into(),
            base_path: Some(PathBuf::from("/p/feeds")),
            package_name: None,
            description: None,
            developer: None,
            developer_url: None,
            documentation_url: None,
            changelog_url: None,
            download_url: None,
            aliases,
            components: Default::default(),
        }
    }

    fn record() -> InstalledPluginRecord {
        let mut settings = Settings::new();
        settings.insert("url".into(), json!("https://example.com/feed"));
        InstalledPluginRecord {
            id: 7,
            handle: "feeds".into(),
            version: "1.0.0".into(),
            schema_version: "1.0.0".into(),
            license_key: None,
            license_key_status: LicenseKeyStatus::Unknown,
            enabled: true,
            settings: Some(settings),
            install_date: Utc::now(),
        }
    }

    #[test]
    fn test_create_applies_aliases_settings_and_migrator() {
        let factory = PluginFactory::new();
        factory.register("acme::feeds::Plugin", |_| Box::new(Feeds));

        let aliases = AliasTable::new();
        let host: Arc<dyn Host> = Arc::new(ModuleTable::new());
        let live = factory
            .create(descriptor("acme::feeds::Plugin"), Some(&record()), &aliases, host)
            .unwrap();

        assert_eq!(aliases.get("@feeds"), Some(PathBuf::from("/p/feeds")));
        assert_eq!(aliases.get("@acme/feeds"), Some(PathBuf::from("/p/feeds/src")));
        assert_eq!(live.settings().unwrap()["url"], json!("https://example.com/feed"));

        let migrator = live.migrator().unwrap();
        assert_eq!(migrator.plugin_id(), 7);
        assert_eq!(migrator.namespace(), "feeds.migrations");
    }

    #[test]
    fn test_unknown_class_returns_none() {
        let factory = PluginFactory::new();
        let host: Arc<dyn Host> = Arc::new(ModuleTable::new());
        assert!(factory
            .create(descriptor("acme::missing::Plugin"), None, &AliasTable::new(), host)
            .is_none());
    }

    #[test]
    fn test_no_record_no_migrator() {
        let factory = PluginFactory::new();
        factory.register("acme::feeds::Plugin", |_| Box::new(Feeds));
        let host: Arc<dyn Host> = Arc::new(ModuleTable::new());

        let live = factory
            .create(descriptor("acme::feeds::Plugin"), None, &AliasTable::new(), host)
            .unwrap();
        assert!(live.migrator().is_none());
        assert_eq!(factory.classes(), vec!["acme::feeds::Plugin".to_string()]);
    }
}
