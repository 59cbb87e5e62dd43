//! Hearth Config - 호스트 설정
//!
//! 플러그인 경로, 레지스트리 파일, 데이터 디렉토리 등 호스트 전체 설정

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 설정 파일명
pub const HEARTH_CONFIG_FILE: &str = "config.json";

/// 기본 플러그인 디렉토리
pub const DEFAULT_PLUGINS_PATH: &str = "plugins";

/// 패키지 관리자가 생성하는 플러그인 레지스트리 파일 기본 경로
pub const DEFAULT_REGISTRY_FILE: &str = "vendor/hearth/plugins.json";

/// SQLite 데이터 디렉토리 기본 경로
pub const DEFAULT_DATA_DIR: &str = ".hearth/data";

/// Hearth 호스트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HearthConfig {
    /// 온디스크 플러그인 디렉토리 (`<pluginsPath>/<handle>/plugin.json`)
    #[serde(default = "default_plugins_path")]
    pub plugins_path: PathBuf,

    /// 사전 계산된 플러그인 레지스트리 파일
    #[serde(default = "default_registry_file")]
    pub registry_file: PathBuf,

    /// 데이터베이스 디렉토리
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// 아이콘이 없는 플러그인에 쓸 SVG (없으면 내장 아이콘)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_icon_path: Option<PathBuf>,
}

impl Default for HearthConfig {
    fn default() -> Self {
        Self {
            plugins_path: default_plugins_path(),
            registry_file: default_registry_file(),
            data_dir: default_data_dir(),
            default_icon_path: None,
        }
    }
}

impl HearthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load(project_root: &Path) -> Result<Self> {
        let mut config = Self::new();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) = global.load_optional::<HearthConfig>(HEARTH_CONFIG_FILE)? {
                config.merge(global_config);
            }
        }

        // 2. 프로젝트 설정
        let project = JsonStore::project(project_root);
        if let Some(project_config) = project.load_optional::<HearthConfig>(HEARTH_CONFIG_FILE)? {
            config.merge(project_config);
        }

        Ok(config.resolve_paths(project_root))
    }

    /// 프로젝트 설정 저장
    pub fn save_project(&self, project_root: &Path) -> Result<()> {
        JsonStore::project(project_root).save(HEARTH_CONFIG_FILE, self)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 다른 설정과 병합 (other가 우선, 기본값은 덮어쓰지 않음)
    pub fn merge(&mut self, other: HearthConfig) {
        if other.plugins_path != default_plugins_path() {
            self.plugins_path = other.plugins_path;
        }
        if other.registry_file != default_registry_file() {
            self.registry_file = other.registry_file;
        }
        if other.data_dir != default_data_dir() {
            self.data_dir = other.data_dir;
        }
        if other.default_icon_path.is_some() {
            self.default_icon_path = other.default_icon_path;
        }
    }

    /// 상대 경로를 root 기준 절대 경로로 변환
    pub fn resolve_paths(mut self, root: &Path) -> Self {
        let absolutize = |p: PathBuf| if p.is_absolute() { p } else { root.join(p) };
        self.plugins_path = absolutize(self.plugins_path);
        self.registry_file = absolutize(self.registry_file);
        self.data_dir = absolutize(self.data_dir);
        self.default_icon_path = self.default_icon_path.map(absolutize);
        self
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn plugins_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.plugins_path = path.into();
        self
    }

    pub fn registry_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_file = path.into();
        self
    }

    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }
}

fn default_plugins_path() -> PathBuf {
    PathBuf::from(DEFAULT_PLUGINS_PATH)
}

fn default_registry_file() -> PathBuf {
    PathBuf::from(DEFAULT_REGISTRY_FILE)
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = HearthConfig::default();
        assert_eq!(config.plugins_path, PathBuf::from("plugins"));
        assert!(config.default_icon_path.is_none());
    }

    #[test]
    fn test_merge_keeps_defaults() {
        let mut base = HearthConfig::new().plugins_path("/opt/plugins");
        base.merge(HearthConfig::new().data_dir("/var/hearth"));

        assert_eq!(base.plugins_path, PathBuf::from("/opt/plugins"));
        assert_eq!(base.data_dir, PathBuf::from("/var/hearth"));
    }

    #[test]
    fn test_project_load_resolves_paths() {
        let temp = TempDir::new().unwrap();
        HearthConfig::new()
            .plugins_path("ext")
            .save_project(temp.path())
            .unwrap();

        let config = HearthConfig::load(temp.path()).unwrap();
        assert_eq!(config.plugins_path, temp.path().join("ext"));
        assert_eq!(config.registry_file, temp.path().join(DEFAULT_REGISTRY_FILE));
    }

    #[test]
    fn test_camel_case_json() {
        let json = r#"{ "pluginsPath": "/srv/plugins", "defaultIconPath": "icon.svg" }"#;
        let config: HearthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.plugins_path, PathBuf::from("/srv/plugins"));
        assert_eq!(config.default_icon_path, Some(PathBuf::from("icon.svg")));
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    }
}
