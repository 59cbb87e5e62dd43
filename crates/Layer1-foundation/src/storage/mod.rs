//! Storage module for Hearth
//!
//! - `db`: SQLite - 설치된 플러그인 상태 (스키마 버전 관리, 트랜잭션)
//! - `plugin_rows`: plugins / plugin_migrations 테이블 접근
//! - `json`: JSON - 범용 파일 저장/로드

mod db;
mod json;
pub mod plugin_rows;

// SQLite Storage
pub use db::{Storage, DATABASE_FILE};
pub use plugin_rows::{InstalledPluginRecord, LicenseKeyStatus, NewPluginRecord};

// JSON Storage (범용)
pub use json::JsonStore;
