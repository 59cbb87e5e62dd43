//! hearth-core: Core Runtime for Hearth
//!
//! Layer2 - 플러그인 라이프사이클 레이어
//!
//! # 주요 모듈
//!
//! - `plugin`: 플러그인 발견, 설치/제거, 활성화/비활성화, 설정, 라이선스
//!
//! # 사용 예시
//!
//! ```ignore
//! use hearth_core::{ModuleTable, PluginFactory, PluginManager};
//! use hearth_foundation::HearthConfig;
//!
//! let factory = Arc::new(PluginFactory::new());
//! factory.register("acme::seo::Plugin", |_| Box::new(SeoPlugin::default()));
//!
//! let manager = PluginManager::open(
//!     HearthConfig::load(&root)?,
//!     factory,
//!     Arc::new(ModuleTable::new()),
//! )?;
//!
//! for info in manager.get_all_plugin_info().await? {
//!     println!("{} {} installed={}", info.name(), info.descriptor.version, info.is_installed);
//! }
//! ```

pub mod plugin;

// Re-exports: Plugin
pub use plugin::{
    AliasTable, ConfigResolver, EventBus, EventType, HookContext, Host, LivePlugin,
    MigrationTracker, ModuleTable, Plugin, PluginDescriptor, PluginEvent, PluginEventHandler,
    PluginFactory, PluginInfo, PluginInit, PluginManager, PluginRegistry, PluginStore, Settings,
};
