//! Plugin Events - 라이프사이클 이벤트 시스템
//!
//! 각 라이프사이클 전이 지점마다 before/after 이벤트를 발행합니다.
//! before 이벤트는 부수 효과 전에, after 이벤트는 커밋과 등록이 끝난 뒤에 발행됩니다.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_HISTORY_LIMIT: usize = 128;

// ============================================================================
// EventType - 전이 지점 (phase × action)
// ============================================================================

/// 전이 전/후
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    Before,
    After,
}

/// 라이프사이클 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    LoadPlugins,
    Install,
    Uninstall,
    Enable,
    Disable,
    SaveSettings,
}

/// 이벤트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BeforeLoadPlugins,
    AfterLoadPlugins,
    BeforeInstallPlugin,
    AfterInstallPlugin,
    BeforeUninstallPlugin,
    AfterUninstallPlugin,
    BeforeEnablePlugin,
    AfterEnablePlugin,
    BeforeDisablePlugin,
    AfterDisablePlugin,
    BeforeSavePluginSettings,
    AfterSavePluginSettings,
}

impl EventType {
    /// (phase, action) 쌍으로 이벤트 타입 구성
    pub fn of(phase: EventPhase, action: LifecycleAction) -> Self {
        use EventPhase::*;
        use LifecycleAction::*;
        match (phase, action) {
            (Before, LoadPlugins) => Self::BeforeLoadPlugins,
            (After, LoadPlugins) => Self::AfterLoadPlugins,
            (Before, Install) => Self::BeforeInstallPlugin,
            (After, Install) => Self::AfterInstallPlugin,
            (Before, Uninstall) => Self::BeforeUninstallPlugin,
            (After, Uninstall) => Self::AfterUninstallPlugin,
            (Before, Enable) => Self::BeforeEnablePlugin,
            (After, Enable) => Self::AfterEnablePlugin,
            (Before, Disable) => Self::BeforeDisablePlugin,
            (After, Disable) => Self::AfterDisablePlugin,
            (Before, SaveSettings) => Self::BeforeSavePluginSettings,
            (After, SaveSettings) => Self::AfterSavePluginSettings,
        }
    }

    pub fn phase(self) -> EventPhase {
        match self {
            Self::BeforeLoadPlugins
            | Self::BeforeInstallPlugin
            | Self::BeforeUninstallPlugin
            | Self::BeforeEnablePlugin
            | Self::BeforeDisablePlugin
            | Self::BeforeSavePluginSettings => EventPhase::Before,
            _ => EventPhase::After,
        }
    }

    pub fn action(self) -> LifecycleAction {
        match self {
            Self::BeforeLoadPlugins | Self::AfterLoadPlugins => LifecycleAction::LoadPlugins,
            Self::BeforeInstallPlugin | Self::AfterInstallPlugin => LifecycleAction::Install,
            Self::BeforeUninstallPlugin | Self::AfterUninstallPlugin => LifecycleAction::Uninstall,
            Self::BeforeEnablePlugin | Self::AfterEnablePlugin => LifecycleAction::Enable,
            Self::BeforeDisablePlugin | Self::AfterDisablePlugin => LifecycleAction::Disable,
            Self::BeforeSavePluginSettings | Self::AfterSavePluginSettings => {
                LifecycleAction::SaveSettings
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeLoadPlugins => "before_load_plugins",
            Self::AfterLoadPlugins => "after_load_plugins",
            Self::BeforeInstallPlugin => "before_install_plugin",
            Self::AfterInstallPlugin => "after_install_plugin",
            Self::BeforeUninstallPlugin => "before_uninstall_plugin",
            Self::AfterUninstallPlugin => "after_uninstall_plugin",
            Self::BeforeEnablePlugin => "before_enable_plugin",
            Self::AfterEnablePlugin => "after_enable_plugin",
            Self::BeforeDisablePlugin => "before_disable_plugin",
            Self::AfterDisablePlugin => "after_disable_plugin",
            Self::BeforeSavePluginSettings => "before_save_plugin_settings",
            Self::AfterSavePluginSettings => "after_save_plugin_settings",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PluginEvent
// ============================================================================

/// 발행된 라이프사이클 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginEvent {
    pub event_type: EventType,

    /// 대상 플러그인 (벌크 로드 이벤트는 없음)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,

    /// save-settings 이벤트의 후보 설정 등
    #[serde(default)]
    pub data: Value,

    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl PluginEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            handle: None,
            data: Value::Null,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn for_plugin(event_type: EventType, handle: impl Into<String>) -> Self {
        Self {
            handle: Some(handle.into()),
            ..Self::new(event_type)
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn is_before(&self) -> bool {
        self.event_type.phase() == EventPhase::Before
    }
}

// ============================================================================
// PluginEventHandler
// ============================================================================

/// 라이프사이클 이벤트 구독자
///
/// 핸들러는 매니저를 다시 호출해도 됩니다. 벌크 로드 중의 재진입 호출은
/// 즉시 반환됩니다.
#[async_trait]
pub trait PluginEventHandler: Send + Sync {
    /// 같은 이름으로 다시 등록하면 교체됩니다
    fn name(&self) -> &str;

    /// 기본값은 모든 이벤트
    fn accepts(&self, _event_type: EventType) -> bool {
        true
    }

    async fn handle(&self, event: &PluginEvent);
}

// ============================================================================
// EventBus
// ============================================================================

/// before/after 이벤트를 핸들러, 브로드캐스트 구독자, 히스토리에 전달
pub struct EventBus {
    sender: broadcast::Sender<PluginEvent>,
    /// 등록 순서대로 호출
    handlers: RwLock<Vec<Arc<dyn PluginEventHandler>>>,
    history: Mutex<VecDeque<PluginEvent>>,
    history_limit: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_capacity(channel_capacity: usize, history_limit: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            sender,
            handlers: RwLock::new(Vec::new()),
            history: Mutex::new(VecDeque::with_capacity(history_limit)),
            history_limit,
        }
    }

    pub fn register_handler(&self, handler: Arc<dyn PluginEventHandler>) {
        let mut handlers = self.handlers.write();
        match handlers.iter().position(|h| h.name() == handler.name()) {
            Some(idx) => handlers[idx] = handler,
            None => handlers.push(handler),
        }
    }

    /// 제거되었으면 true
    pub fn unregister_handler(&self, name: &str) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|h| h.name() != name);
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// 히스토리 기록, 브로드캐스트, 관심 있는 핸들러를 순서대로 await
    pub async fn publish(&self, event: PluginEvent) {
        debug!(
            "Publishing {} ({})",
            event.event_type,
            event.handle.as_deref().unwrap_or("-")
        );

        self.remember(&event);

        if self.sender.send(event.clone()).is_err() {
            trace!("No subscribers for {}", event.event_type);
        }

        // 핸들러가 매니저로 재진입할 수 있으므로 잠금을 놓은 뒤 호출
        let targets: Vec<_> = self
            .handlers
            .read()
            .iter()
            .filter(|h| h.accepts(event.event_type))
            .cloned()
            .collect();

        for handler in targets {
            handler.handle(&event).await;
        }
    }

    fn remember(&self, event: &PluginEvent) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.history.lock();
        while history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(event.clone());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.sender.subscribe()
    }

    /// 오래된 것부터
    pub fn history(&self) -> Vec<PluginEvent> {
        self.history.lock().iter().cloned().collect()
    }

    /// 특정 플러그인 대상 이벤트만
    pub fn history_for(&self, handle: &str) -> Vec<PluginEvent> {
        self.history
            .lock()
            .iter()
            .filter(|e| e.handle.as_deref() == Some(handle))
            .cloned()
            .collect()
    }

    pub fn history_by_type(&self, event_type: EventType) -> Vec<PluginEvent> {
        self.history
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
