//! Plugin Registry - 활성화된 플러그인의 런타임 맵
//!
//! 맵과 로드 플래그(완료/진행 중)는 하나의 뮤텍스 아래에 있습니다.
//! 유일한 쓰기 주체는 `PluginManager`입니다.

use super::traits::LivePlugin;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

struct RegistryEntry {
    plugin: Arc<LivePlugin>,
    load_order: usize,
}

#[derive(Default)]
struct RegistryState {
    plugins: HashMap<String, RegistryEntry>,
    load_counter: usize,
    loaded: bool,
    loading: bool,
}

/// 플러그인 레지스트리 - 핸들 → 라이브 인스턴스
#[derive(Default)]
pub struct PluginRegistry {
    state: Mutex<RegistryState>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // 로드 가드
    // ========================================================================

    /// 벌크 로드 시작. 이미 끝났거나 진행 중이면 `false`
    pub fn begin_load(&self) -> bool {
        let mut state = self.state.lock();
        if state.loaded || state.loading {
            return false;
        }
        state.loading = true;
        true
    }

    /// 벌크 로드 종료
    pub fn finish_load(&self) {
        let mut state = self.state.lock();
        state.loading = false;
        state.loaded = true;
    }

    /// 로드 실패 시 다시 시도할 수 있도록 진행 플래그만 해제
    pub fn abort_load(&self) {
        self.state.lock().loading = false;
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().loaded
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    // ========================================================================
    // 등록
    // ========================================================================

    /// 등록 (같은 핸들이 있으면 교체 후 이전 인스턴스 반환)
    pub fn register(&self, plugin: Arc<LivePlugin>) -> Option<Arc<LivePlugin>> {
        let mut state = self.state.lock();
        state.load_counter += 1;
        let load_order = state.load_counter;
        let handle = plugin.handle().to_string();

        info!("Registered plugin: {} (v{})", handle, plugin.version());
        state
            .plugins
            .insert(handle, RegistryEntry { plugin, load_order })
            .map(|old| old.plugin)
    }

    pub fn unregister(&self, handle: &str) -> Option<Arc<LivePlugin>> {
        let removed = self.state.lock().plugins.remove(handle).map(|e| e.plugin);
        if removed.is_some() {
            debug!("Unregistered plugin: {}", handle);
        }
        removed
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub fn get(&self, handle: &str) -> Option<Arc<LivePlugin>> {
        self.state
            .lock()
            .plugins
            .get(handle)
            .map(|e| Arc::clone(&e.plugin))
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.state.lock().plugins.contains_key(handle)
    }

    /// 핸들 → 인스턴스 맵
    pub fn all(&self) -> HashMap<String, Arc<LivePlugin>> {
        self.state
            .lock()
            .plugins
            .iter()
            .map(|(h, e)| (h.clone(), Arc::clone(&e.plugin)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().plugins.is_empty()
    }

    /// 모든 인스턴스와 로드 플래그 초기화. 제거된 인스턴스를 로드 순서대로 반환
    pub fn reset(&self) -> Vec<Arc<LivePlugin>> {
        let drained = {
            let mut state = self.state.lock();
            let drained = std::mem::take(&mut state.plugins);
            *state = RegistryState::default();
            drained
        };
        let mut entries: Vec<RegistryEntry> = drained.into_values().collect();
        entries.sort_by_key(|e| e.load_order);
        entries.into_iter().map(|e| e.plugin).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::manifest::RawPluginConfig;
    use crate::plugin::traits::Plugin;
    use std::any::Any;

    struct Noop;

    impl Plugin for Noop {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn live(handle: &str) -> Arc<LivePlugin> {
        let descriptor = RawPluginConfig {
            class: Some("noop".into()),
            name: Some(handle.into()),
            version: Some("1.0.0".into()),
            ..Default::default()
        }
        .into_descriptor(handle)
        .unwrap();
        Arc::new(LivePlugin::new(descriptor, Box::new(Noop), None))
    }

    #[test]
    fn test_load_guard() {
        let registry = PluginRegistry::new();
        assert!(registry.begin_load());
        assert!(registry.is_loading());
        // reentrant call observes "already loading"
        assert!(!registry.begin_load());

        registry.finish_load();
        assert!(registry.is_loaded());
        assert!(!registry.begin_load());

        registry.reset();
        assert!(registry.begin_load());
    }

    #[test]
    fn test_register_order() {
        let registry = PluginRegistry::new();
        registry.register(live("b"));
        registry.register(live("a"));
        assert!(registry.register(live("b")).is_some());

        registry.register(live("c"));

        assert!(registry.unregister("a").is_some());
        assert!(!registry.contains("a"));
        assert_eq!(registry.all().len(), 2);

        // replaced "b" takes a fresh slot after "a"
        let order: Vec<String> = registry
            .reset()
            .iter()
            .map(|p| p.handle().to_string())
            .collect();
        assert_eq!(order, vec!["b".to_string(), "c".to_string()]);
        assert!(registry.is_empty());
    }
}
