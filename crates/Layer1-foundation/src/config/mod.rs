//! Config - 호스트 설정 관리
//!
//! - `hearth.rs` - HearthConfig 통합 설정

mod hearth;

pub use hearth::{
    HearthConfig, DEFAULT_DATA_DIR, DEFAULT_PLUGINS_PATH, DEFAULT_REGISTRY_FILE,
    HEARTH_CONFIG_FILE,
};
