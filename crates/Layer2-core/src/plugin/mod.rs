//! # Plugin System
//!
//! Hearth 플러그인 라이프사이클 관리
//!
//! ## 개요
//!
//! 설치 가능한 확장 패키지를 발견하고, 메타데이터를 해석하고,
//! 명시적인 상태 기계(발견 → 설치 → 활성/비활성 → 제거)로 관리합니다.
//! 상태는 SQLite에 영속화되고, 활성화된 플러그인은 호스트 모듈로 등록됩니다.
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PluginManager                           │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐  │
//! │  │ConfigResolver│─▶│PluginFactory │─▶│ PluginRegistry   │  │
//! │  │ registry +   │  │ constructors │  │ handle → Live    │  │
//! │  │ plugin.json  │  │ + AliasTable │  │ (enabled only)   │  │
//! │  └──────────────┘  └──────────────┘  └────────┬─────────┘  │
//! │          │                                     │ set_module │
//! │  ┌───────┴──────┐   ┌──────────┐      ┌───────▼────────┐   │
//! │  │ PluginStore  │   │ EventBus │      │ Host           │   │
//! │  │ (SQLite)     │   │ before/  │      │ (ModuleTable)  │   │
//! │  └──────────────┘   │ after    │      └────────────────┘   │
//! │                     └──────────┘                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 예시
//!
//! ```ignore
//! let factory = Arc::new(PluginFactory::new());
//! factory.register("acme::seo::Plugin", |_| Box::new(SeoPlugin::default()));
//!
//! let host = Arc::new(ModuleTable::new());
//! let manager = PluginManager::open(HearthConfig::load(&root)?, factory, host)?;
//!
//! manager.install("seo").await?;
//! let seo = manager.get_plugin("seo").await?;
//! ```

mod discovery;
mod events;
mod factory;
mod host;
mod info;
mod license;
mod manager;
mod manifest;
mod registry;
mod store;
mod traits;
mod version;

pub use discovery::{load_registry_file, read_manifest, ConfigResolver};
pub use events::{
    EventBus, EventPhase, EventType, LifecycleAction, PluginEvent, PluginEventHandler,
};
pub use factory::{PluginConstructor, PluginFactory};
pub use host::{AliasTable, Host, ModuleTable};
pub use info::{natural_cmp, PluginInfo, DEFAULT_PLUGIN_ICON, ICON_FILE};
pub use license::{normalize_license_key, LICENSE_KEY_LENGTH};
pub use manager::PluginManager;
pub use manifest::{
    entry_point_candidates, scrape_manifest, PackageManifest, PluginDescriptor, RawPluginConfig,
    ENTRY_POINT_FILE, MANIFEST_FILE,
};
pub use registry::PluginRegistry;
pub use store::PluginStore;
pub use traits::{HookContext, LivePlugin, MigrationTracker, Plugin, PluginInit, Settings};
pub use version::{compare_versions, is_newer, DEFAULT_SCHEMA_VERSION, DEV_VERSION};
