//! # hearth-foundation
//!
//! Foundation layer for Hearth:
//! - Error: 중앙 에러 타입 (`Error`, `Result`)
//! - Config: 호스트 설정 (HearthConfig, 글로벌 + 프로젝트 병합)
//! - Storage: SQLite (설치된 플러그인 상태), JsonStore (범용)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  hearth-core (PluginManager)                            │
//! │                     │                                   │
//! │          ┌─────────┴─────────┐                         │
//! │          ▼                   ▼                         │
//! │   Storage (SQLite)     JsonStore / HearthConfig         │
//! │   plugins              config.json                      │
//! │   plugin_migrations    plugins.json (registry)          │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    HearthConfig, DEFAULT_DATA_DIR, DEFAULT_PLUGINS_PATH, DEFAULT_REGISTRY_FILE,
    HEARTH_CONFIG_FILE,
};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{
    plugin_rows, InstalledPluginRecord, JsonStore, LicenseKeyStatus, NewPluginRecord, Storage,
    DATABASE_FILE,
};
