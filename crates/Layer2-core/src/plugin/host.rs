//! Host Interface - 플러그인 매니저가 호스트 애플리케이션과 만나는 경계
//!
//! - `Host`: 호스트 상태 조회 + 모듈 등록
//! - `ModuleTable`: 기본 `Host` 구현 (핸들 → 라이브 인스턴스)
//! - `AliasTable`: `@name` → 파일 시스템 경로 바인딩

use super::traits::LivePlugin;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ============================================================================
// Host trait
// ============================================================================

/// 호스트 애플리케이션
pub trait Host: Send + Sync {
    /// 호스트 자체가 설치되었는지 (아니면 벌크 로드 생략)
    fn is_installed(&self) -> bool {
        true
    }

    /// 호스트 업데이트 중인지 (벌크 로드와 버전 조정 생략)
    fn is_updating(&self) -> bool {
        false
    }

    /// 유지보수 모드인지 (버전 조정 생략)
    fn in_maintenance_mode(&self) -> bool {
        false
    }

    /// 모듈 등록 (`None`이면 해제)
    fn set_module(&self, handle: &str, module: Option<Arc<LivePlugin>>);
}

// ============================================================================
// ModuleTable
// ============================================================================

/// 기본 호스트 - 모듈 테이블과 상태 플래그
pub struct ModuleTable {
    modules: RwLock<HashMap<String, Arc<LivePlugin>>>,
    installed: AtomicBool,
    updating: AtomicBool,
    maintenance: AtomicBool,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
            installed: AtomicBool::new(true),
            updating: AtomicBool::new(false),
            maintenance: AtomicBool::new(false),
        }
    }

    pub fn set_installed(&self, installed: bool) {
        self.installed.store(installed, Ordering::SeqCst);
    }

    pub fn set_updating(&self, updating: bool) {
        self.updating.store(updating, Ordering::SeqCst);
    }

    pub fn set_maintenance_mode(&self, on: bool) {
        self.maintenance.store(on, Ordering::SeqCst);
    }

    /// 등록된 모듈
    pub fn module(&self, handle: &str) -> Option<Arc<LivePlugin>> {
        self.modules.read().get(handle).cloned()
    }

    /// 등록된 모듈 핸들 (정렬)
    pub fn handles(&self) -> Vec<String> {
        let mut handles: Vec<String> = self.modules.read().keys().cloned().collect();
        handles.sort();
        handles
    }
}

impl Default for ModuleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for ModuleTable {
    fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    fn is_updating(&self) -> bool {
        self.updating.load(Ordering::SeqCst)
    }

    fn in_maintenance_mode(&self) -> bool {
        self.maintenance.load(Ordering::SeqCst)
    }

    fn set_module(&self, handle: &str, module: Option<Arc<LivePlugin>>) {
        let mut modules = self.modules.write();
        match module {
            Some(m) => {
                modules.insert(handle.to_string(), m);
            }
            None => {
                modules.remove(handle);
            }
        }
    }
}

// ============================================================================
// AliasTable
// ============================================================================

/// 경로 별칭 테이블
#[derive(Default)]
pub struct AliasTable {
    aliases: RwLock<HashMap<String, PathBuf>>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 별칭 등록 (`@`가 없으면 붙임)
    pub fn set_alias(&self, name: &str, path: impl Into<PathBuf>) {
        let name = normalize_alias(name);
        self.aliases.write().insert(name, path.into());
    }

    pub fn get(&self, name: &str) -> Option<PathBuf> {
        self.aliases.read().get(&normalize_alias(name)).cloned()
    }

    /// `@acme/seo/icon.svg` 같은 경로를 가장 긴 일치 별칭으로 해석
    ///
    /// `@`로 시작하지 않으면 그대로 경로로 취급합니다.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        if !path.starts_with('@') {
            return Some(PathBuf::from(path));
        }

        let aliases = self.aliases.read();
        aliases
            .iter()
            .filter_map(|(name, target)| {
                if path == name {
                    Some((name.len(), target.clone()))
                } else {
                    path.strip_prefix(name.as_str())
                        .and_then(|rest| rest.strip_prefix('/'))
                        .map(|rest| (name.len(), join_relative(target, rest)))
                }
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, resolved)| resolved)
    }

    pub fn len(&self) -> usize {
        self.aliases.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.read().is_empty()
    }

    pub fn clear(&self) {
        self.aliases.write().clear();
    }
}

fn normalize_alias(name: &str) -> String {
    let name = name.trim_end_matches('/');
    if name.starts_with('@') {
        name.to_string()
    } else {
        format!("@{}", name)
    }
}

fn join_relative(base: &Path, rest: &str) -> PathBuf {
    rest.split('/')
        .filter(|s| !s.is_empty())
        .fold(base.to_path_buf(), |acc, part| acc.join(part))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_longest_match() {
        let aliases = AliasTable::new();
        aliases.set_alias("@acme", "/vendor/acme");
        aliases.set_alias("acme/seo", "/plugins/seo/src");

        assert_eq!(aliases.get("@acme/seo"), Some(PathBuf::from("/plugins/seo/src")));
        assert_eq!(
            aliases.resolve("@acme/seo/icon.svg"),
            Some(PathBuf::from("/plugins/seo/src/icon.svg"))
        );
        assert_eq!(
            aliases.resolve("@acme/other/x.rs"),
            Some(PathBuf::from("/vendor/acme/other/x.rs"))
        );
        assert_eq!(aliases.resolve("@acmeish"), None);
        assert_eq!(aliases.resolve("/abs/path"), Some(PathBuf::from("/abs/path")));
    }

    #[test]
    fn test_module_table_flags() {
        let host = ModuleTable::new();
        assert!(host.is_installed());
        assert!(!host.is_updating());

        host.set_updating(true);
        host.set_maintenance_mode(true);
        host.set_installed(false);
        assert!(host.is_updating());
        assert!(host.in_maintenance_mode());
        assert!(!host.is_installed());
        assert!(host.handles().is_empty());
    }
}
