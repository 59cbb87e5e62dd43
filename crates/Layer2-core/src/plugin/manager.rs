//! Plugin Manager - 플러그인 라이프사이클 관리
//!
//! ## 상태 전이
//!
//! ```text
//! UNINSTALLED ──install──▶ INSTALLED(enabled) ⇄ INSTALLED(disabled)
//!      ▲                          │                     │
//!      └──────────uninstall───────┴─────────────────────┘
//! ```
//!
//! - 모든 조회/변경은 먼저 `load_all()`을 (한 번만) 실행
//! - 같은 핸들에 대한 라이프사이클 연산은 핸들별 잠금으로 직렬화
//! - install/uninstall은 훅 호출까지 하나의 저장소 트랜잭션 안에서 실행
//! - before 이벤트는 부수 효과 전에, after 이벤트는 커밋 + 등록 후에 발행

use super::discovery::ConfigResolver;
use super::events::{EventBus, EventType, PluginEvent};
use super::factory::PluginFactory;
use super::host::{AliasTable, Host};
use super::info::{is_svg, sort_by_name, PluginInfo, DEFAULT_PLUGIN_ICON, ICON_FILE};
use super::license::normalize_license_key;
use super::manifest::PluginDescriptor;
use super::registry::PluginRegistry;
use super::store::PluginStore;
use super::traits::{LivePlugin, Settings};
use super::version::is_newer;
use chrono::Utc;
use hearth_foundation::{
    plugin_rows, Error, HearthConfig, InstalledPluginRecord, LicenseKeyStatus, NewPluginRecord,
    Result, Storage,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// 플러그인 매니저 - 전체 플러그인 시스템 관리
pub struct PluginManager {
    /// 호스트 설정
    config: HearthConfig,

    /// 설정 해석기
    resolver: ConfigResolver,

    /// 생성자 레지스트리
    factory: Arc<PluginFactory>,

    /// 설치 정보 저장소
    store: PluginStore,

    /// 활성화된 인스턴스
    registry: PluginRegistry,

    /// 경로 별칭
    aliases: AliasTable,

    /// 호스트 애플리케이션
    host: Arc<dyn Host>,

    /// 이벤트 버스
    event_bus: Arc<EventBus>,

    /// 핸들별 라이프사이클 잠금
    handle_locks: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PluginManager {
    /// 새 매니저 생성 (레지스트리 파일은 설정 경로에서 로드)
    pub fn new(
        config: HearthConfig,
        storage: Storage,
        factory: Arc<PluginFactory>,
        host: Arc<dyn Host>,
    ) -> Result<Self> {
        let resolver = ConfigResolver::from_config(&config)?;
        Ok(Self {
            config,
            resolver,
            factory,
            store: PluginStore::new(storage),
            registry: PluginRegistry::new(),
            aliases: AliasTable::new(),
            host,
            event_bus: Arc::new(EventBus::new()),
            handle_locks: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// 설정의 데이터 디렉토리에 데이터베이스를 열어 생성
    pub fn open(
        config: HearthConfig,
        factory: Arc<PluginFactory>,
        host: Arc<dyn Host>,
    ) -> Result<Self> {
        let storage = Storage::new(&config.data_dir)?;
        Self::new(config, storage, factory, host)
    }

    /// 해석기 교체
    pub fn with_resolver(mut self, resolver: ConfigResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// 이벤트 버스 공유
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    // ========================================================================
    // 접근자
    // ========================================================================

    pub fn config(&self) -> &HearthConfig {
        &self.config
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    pub fn factory(&self) -> &Arc<PluginFactory> {
        &self.factory
    }

    pub fn store(&self) -> &PluginStore {
        &self.store
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    // ========================================================================
    // 내부 유틸리티
    // ========================================================================

    fn handle_lock(&self, handle: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.handle_locks.lock();
        Arc::clone(
            locks
                .entry(handle.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    async fn emit(&self, event_type: EventType, handle: &str) {
        self.event_bus
            .publish(PluginEvent::for_plugin(event_type, handle))
            .await;
    }

    /// 디스크립터 해석 + 인스턴스 생성 (생성자가 없으면 `None`)
    pub async fn create_plugin(
        &self,
        handle: &str,
        record: Option<&InstalledPluginRecord>,
    ) -> Result<Option<LivePlugin>> {
        let descriptor = self.resolver.resolve(handle).await?;
        Ok(self
            .factory
            .create(descriptor, record, &self.aliases, Arc::clone(&self.host)))
    }

    fn register_live(&self, live: LivePlugin) -> Arc<LivePlugin> {
        let live = Arc::new(live);
        let handle = live.handle().to_string();
        self.registry.register(Arc::clone(&live));
        self.host.set_module(&handle, Some(Arc::clone(&live)));
        live
    }

    fn unregister_live(&self, handle: &str) {
        self.registry.unregister(handle);
        self.host.set_module(handle, None);
    }

    // ========================================================================
    // 벌크 로드
    // ========================================================================

    /// 활성화된 모든 플러그인 로드 (프로세스당 한 번)
    ///
    /// 호스트가 설치되지 않았거나 업데이트 중이면 아무것도 하지 않습니다.
    /// 로드 중 재진입 호출은 즉시 반환됩니다.
    pub async fn load_all(&self) -> Result<()> {
        if !self.host.is_installed() || self.host.is_updating() {
            return Ok(());
        }
        if !self.registry.begin_load() {
            return Ok(());
        }

        self.event_bus
            .publish(PluginEvent::new(EventType::BeforeLoadPlugins))
            .await;

        let records = match self.store.list_enabled() {
            Ok(records) => records,
            Err(e) => {
                self.registry.abort_load();
                return Err(e);
            }
        };

        let mut loaded = 0;
        for record in &records {
            let live = match self.create_plugin(&record.handle, Some(record)).await {
                Ok(Some(live)) => live,
                Ok(None) => {
                    warn!("Skipping plugin {}: implementation unavailable", record.handle);
                    continue;
                }
                Err(e) => {
                    warn!("Skipping plugin {}: {}", record.handle, e);
                    continue;
                }
            };

            if let Err(e) = self.reconcile_version(&live) {
                warn!("Version reconciliation failed for {}: {}", record.handle, e);
            }
            self.register_live(live);
            loaded += 1;
        }

        self.registry.finish_load();
        info!("Loaded {} enabled plugins", loaded);

        self.event_bus
            .publish(PluginEvent::new(EventType::AfterLoadPlugins))
            .await;
        Ok(())
    }

    /// 모든 프로세스 캐시 초기화 (다음 조회 시 다시 로드)
    ///
    /// 호스트 모듈은 로드의 역순으로 해제됩니다.
    pub fn reset(&self) {
        for plugin in self.registry.reset().into_iter().rev() {
            self.host.set_module(plugin.handle(), None);
        }
        self.store.invalidate();
        self.resolver.clear_cache();
        self.aliases.clear();
        debug!("Plugin manager caches reset");
    }

    // ========================================================================
    // 설치 / 제거
    // ========================================================================

    /// 플러그인 설치 (활성화 상태로)
    ///
    /// 이미 설치되어 있으면 `Ok(true)`. 설치 훅이 실패를 보고하면 행 삽입까지
    /// 롤백하고 `Ok(false)`.
    pub async fn install(&self, handle: &str) -> Result<bool> {
        let handle = handle.to_lowercase();
        self.load_all().await?;

        let lock = self.handle_lock(&handle);
        let guard = lock.lock().await;

        if self.store.contains(&handle)? {
            debug!("Plugin {} is already installed", handle);
            return Ok(true);
        }

        let descriptor = self.resolver.resolve(&handle).await.map_err(|e| {
            debug!("Cannot resolve {}: {}", handle, e);
            Error::invalid_plugin(handle.clone())
        })?;
        if !self.factory.is_registered(&descriptor.class) {
            debug!("No constructor registered for {} ({})", handle, descriptor.class);
            return Err(Error::invalid_plugin(handle.clone()));
        }

        self.emit(EventType::BeforeInstallPlugin, &handle).await;

        let installed = self.store.storage().transaction(|tx| {
            plugin_rows::insert_plugin(
                tx,
                &NewPluginRecord {
                    handle: &handle,
                    version: &descriptor.version,
                    schema_version: &descriptor.schema_version,
                    enabled: true,
                    install_date: Utc::now(),
                },
            )?;
            let record = plugin_rows::find_plugin(tx, &handle)?;

            let live = self
                .factory
                .create(
                    descriptor.clone(),
                    record.as_ref(),
                    &self.aliases,
                    Arc::clone(&self.host),
                )
                .ok_or_else(|| Error::invalid_plugin(handle.clone()))?;

            if !live.plugin().install(&live.hook_context(tx))? {
                warn!("Install hook for {} reported failure, rolling back", handle);
                return Ok(None);
            }
            Ok(Some(live))
        })?;

        let Some(live) = installed else {
            return Ok(false);
        };

        self.store.refresh(&handle)?;
        self.register_live(live);
        info!("Installed plugin: {} (v{})", handle, descriptor.version);
        drop(guard);

        self.emit(EventType::AfterInstallPlugin, &handle).await;
        Ok(true)
    }

    /// 플러그인 제거
    ///
    /// 제거 훅이 실패를 보고하면 롤백하고 `Ok(false)`. 설치 기록과
    /// 마이그레이션 기록은 함께 삭제됩니다.
    pub async fn uninstall(&self, handle: &str) -> Result<bool> {
        let handle = handle.to_lowercase();
        self.load_all().await?;

        if !self.store.contains(&handle)? {
            return Err(Error::not_installed(&handle));
        }

        let lock = self.handle_lock(&handle);
        let guard = lock.lock().await;

        // 잠금을 기다리는 동안 다른 호출이 이미 제거함
        let Some(record) = self.store.get(&handle)? else {
            return Ok(true);
        };

        let live = match self.registry.get(&handle) {
            Some(live) => live,
            None => {
                let created = self
                    .create_plugin(&handle, Some(&record))
                    .await
                    .map_err(|e| {
                        debug!("Cannot resolve {}: {}", handle, e);
                        Error::invalid_plugin(handle.clone())
                    })?
                    .ok_or_else(|| Error::invalid_plugin(handle.clone()))?;
                Arc::new(created)
            }
        };

        self.emit(EventType::BeforeUninstallPlugin, &handle).await;

        let removed = self.store.storage().transaction(|tx| {
            if !live.plugin().uninstall(&live.hook_context(tx))? {
                warn!("Uninstall hook for {} reported failure, rolling back", handle);
                return Ok(None);
            }
            plugin_rows::delete_plugin(tx, record.id)?;
            Ok(Some(()))
        })?;

        if removed.is_none() {
            return Ok(false);
        }

        self.store.refresh(&handle)?;
        self.unregister_live(&handle);
        info!("Uninstalled plugin: {}", handle);
        drop(guard);

        self.emit(EventType::AfterUninstallPlugin, &handle).await;
        Ok(true)
    }

    // ========================================================================
    // 활성화 / 비활성화
    // ========================================================================

    /// 설치된 플러그인 활성화 (이미 활성화면 `Ok(true)`)
    pub async fn enable(&self, handle: &str) -> Result<bool> {
        let handle = handle.to_lowercase();
        self.load_all().await?;

        let lock = self.handle_lock(&handle);
        let guard = lock.lock().await;

        let record = self
            .store
            .get(&handle)?
            .ok_or_else(|| Error::not_installed(&handle))?;

        if self.registry.contains(&handle) {
            return Ok(true);
        }

        self.emit(EventType::BeforeEnablePlugin, &handle).await;

        let live = self
            .create_plugin(&handle, Some(&record))
            .await
            .map_err(|e| {
                debug!("Cannot resolve {}: {}", handle, e);
                Error::invalid_plugin(handle.clone())
            })?
            .ok_or_else(|| Error::invalid_plugin(handle.clone()))?;

        self.store.set_enabled(&handle, true)?;
        if let Err(e) = self.reconcile_version(&live) {
            warn!("Version reconciliation failed for {}: {}", handle, e);
        }
        self.register_live(live);
        drop(guard);

        self.emit(EventType::AfterEnablePlugin, &handle).await;
        Ok(true)
    }

    /// 플러그인 비활성화 (이미 비활성화면 `Ok(true)`)
    ///
    /// 활성화로 기록됐지만 라이브 인스턴스가 없으면 (디스크립터가 더 이상
    /// 해석되지 않는 경우 등) `InvalidPlugin`이고 저장된 행은 그대로입니다.
    pub async fn disable(&self, handle: &str) -> Result<bool> {
        let handle = handle.to_lowercase();
        self.load_all().await?;

        let lock = self.handle_lock(&handle);
        let guard = lock.lock().await;

        let record = self
            .store
            .get(&handle)?
            .ok_or_else(|| Error::not_installed(&handle))?;

        if !record.enabled {
            return Ok(true);
        }
        if !self.registry.contains(&handle) {
            return Err(Error::not_enabled(&handle));
        }

        self.emit(EventType::BeforeDisablePlugin, &handle).await;

        self.store.set_enabled(&handle, false)?;
        self.unregister_live(&handle);
        drop(guard);

        self.emit(EventType::AfterDisablePlugin, &handle).await;
        Ok(true)
    }

    // ========================================================================
    // 설정
    // ========================================================================

    /// 플러그인 설정 저장
    ///
    /// 검증 실패는 `Error::Validation` (저장 없음, 이후 이벤트 없음).
    /// 플러그인이 저장을 거부하면 `Ok(false)`. 그 외에는 행이 갱신됐는지 반환.
    pub async fn save_settings(&self, handle: &str, values: Settings) -> Result<bool> {
        let handle = handle.to_lowercase();
        let plugin = self
            .get_plugin(&handle)
            .await?
            .ok_or_else(|| Error::not_enabled(&handle))?;

        let lock = self.handle_lock(&handle);
        let guard = lock.lock().await;

        let candidate = plugin
            .merged_settings(&values)
            .ok_or_else(|| Error::InvalidInput(format!("{} has no settings", handle)))?;

        plugin
            .plugin()
            .validate_settings(&candidate)
            .map_err(|errors| Error::Validation(format!("{}: {}", handle, errors.join("; "))))?;

        self.event_bus
            .publish(
                PluginEvent::for_plugin(EventType::BeforeSavePluginSettings, &handle)
                    .with_data(serde_json::Value::Object(candidate.clone())),
            )
            .await;

        if !plugin.plugin().before_save_settings(&candidate) {
            debug!("Plugin {} vetoed saving settings", handle);
            return Ok(false);
        }

        plugin.replace_settings(candidate.clone());
        let updated = self.store.set_settings(&handle, &candidate)?;
        plugin.plugin().after_save_settings(&candidate);
        drop(guard);

        self.emit(EventType::AfterSavePluginSettings, &handle).await;
        Ok(updated)
    }

    // ========================================================================
    // 버전
    // ========================================================================

    /// 스키마 변경 없는 릴리스 버전 차이를 저장된 행에 반영
    ///
    /// 호스트가 업데이트 중이거나 유지보수 모드면 건너뜁니다.
    pub fn reconcile_version(&self, plugin: &LivePlugin) -> Result<bool> {
        if self.host.is_updating() || self.host.in_maintenance_mode() {
            return Ok(false);
        }
        let Some(record) = self.store.get(plugin.handle())? else {
            return Ok(false);
        };

        if plugin.version() == record.version
            || is_newer(plugin.schema_version(), &record.schema_version)
        {
            return Ok(false);
        }

        info!(
            "Updating stored version of {}: {} -> {}",
            plugin.handle(),
            record.version,
            plugin.version()
        );
        self.store.set_version(plugin.handle(), plugin.version())
    }

    /// 해석된 릴리스 버전이 저장된 버전과 다른지
    pub fn has_version_changed(&self, plugin: &LivePlugin) -> Result<bool> {
        Ok(self
            .store
            .get(plugin.handle())?
            .map(|r| r.version != plugin.version())
            .unwrap_or(false))
    }

    /// 해석된 스키마 버전이 저장된 것보다 엄격하게 큰지
    pub fn requires_schema_update(&self, plugin: &LivePlugin) -> Result<bool> {
        Ok(self
            .store
            .get(plugin.handle())?
            .map(|r| is_newer(plugin.schema_version(), &r.schema_version))
            .unwrap_or(false))
    }

    /// 마이그레이션 완료 후 저장된 릴리스/스키마 버전을 디스크립터 값으로 갱신
    pub fn mark_schema_updated(&self, plugin: &LivePlugin) -> Result<bool> {
        let handle = plugin.handle();
        let updated = self.store.set_schema_version(handle, plugin.schema_version())?;
        if updated {
            self.store.set_version(handle, plugin.version())?;
            info!(
                "Plugin {} now at v{} (schema {})",
                handle,
                plugin.version(),
                plugin.schema_version()
            );
        }
        Ok(updated)
    }

    // ========================================================================
    // 라이선스
    // ========================================================================

    /// 라이선스 키 설정 (`None` = 삭제). 키가 바뀌면 상태는 `unknown`
    pub async fn set_license_key(&self, handle: &str, key: Option<&str>) -> Result<bool> {
        let handle = handle.to_lowercase();
        let normalized = normalize_license_key(key)?;
        self.load_all().await?;

        let lock = self.handle_lock(&handle);
        let _guard = lock.lock().await;

        if !self.store.contains(&handle)? {
            return Err(Error::not_installed(&handle));
        }
        self.store.set_license_key(&handle, normalized.as_deref())
    }

    pub async fn get_license_key(&self, handle: &str) -> Result<Option<String>> {
        let handle = handle.to_lowercase();
        self.load_all().await?;

        self.store
            .get(&handle)?
            .map(|r| r.license_key)
            .ok_or_else(|| Error::not_installed(&handle))
    }

    /// 캐시된 라이선스 상태 (활성화된 플러그인만)
    pub async fn get_license_key_status(&self, handle: &str) -> Result<LicenseKeyStatus> {
        let handle = handle.to_lowercase();
        let record = self.enabled_record(&handle).await?;
        Ok(record.license_key_status)
    }

    pub async fn set_license_key_status(
        &self,
        handle: &str,
        status: LicenseKeyStatus,
    ) -> Result<bool> {
        let handle = handle.to_lowercase();
        self.enabled_record(&handle).await?;
        self.store.set_license_key_status(&handle, status)
    }

    async fn enabled_record(&self, handle: &str) -> Result<InstalledPluginRecord> {
        self.load_all().await?;
        if !self.registry.contains(handle) {
            return Err(Error::not_enabled(&handle));
        }
        self.store
            .get(handle)?
            .ok_or_else(|| Error::not_installed(&handle))
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 활성화된 플러그인 인스턴스
    pub async fn get_plugin(&self, handle: &str) -> Result<Option<Arc<LivePlugin>>> {
        self.load_all().await?;
        Ok(self.registry.get(&handle.to_lowercase()))
    }

    /// 활성화된 모든 플러그인
    pub async fn get_all_plugins(&self) -> Result<HashMap<String, Arc<LivePlugin>>> {
        self.load_all().await?;
        Ok(self.registry.all())
    }

    /// 저장된 설치 정보
    pub async fn get_stored_plugin_info(&self, handle: &str) -> Result<Option<InstalledPluginRecord>> {
        self.load_all().await?;
        self.store.get(&handle.to_lowercase())
    }

    pub async fn is_plugin_installed(&self, handle: &str) -> Result<bool> {
        Ok(self.get_stored_plugin_info(handle).await?.is_some())
    }

    pub async fn is_plugin_enabled(&self, handle: &str) -> Result<bool> {
        Ok(self
            .get_stored_plugin_info(handle)
            .await?
            .map(|r| r.enabled)
            .unwrap_or(false))
    }

    /// 단일 플러그인 정보
    pub async fn get_plugin_info(&self, handle: &str) -> Result<PluginInfo> {
        let handle = handle.to_lowercase();
        self.load_all().await?;

        let descriptor = self.resolver.resolve(&handle).await.map_err(|e| {
            debug!("Cannot resolve {}: {}", handle, e);
            Error::invalid_plugin(handle.clone())
        })?;
        self.build_info(descriptor)
    }

    /// 발견 가능한 모든 플러그인 정보 (이름순, 대소문자 무시 자연 정렬)
    ///
    /// 해석에 실패한 핸들은 건너뜁니다.
    pub async fn get_all_plugin_info(&self) -> Result<Vec<PluginInfo>> {
        self.load_all().await?;

        let mut handles: BTreeSet<String> =
            self.resolver.discover_handles().await.into_iter().collect();
        handles.extend(self.store.list()?.into_iter().map(|r| r.handle));

        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            match self.resolver.resolve(&handle).await {
                Ok(descriptor) => infos.push(self.build_info(descriptor)?),
                Err(e) if e.is_skippable() => {
                    debug!("Skipping {} in plugin listing: {}", handle, e)
                }
                Err(e) => warn!("Cannot resolve {} for plugin listing: {}", handle, e),
            }
        }

        sort_by_name(&mut infos);
        Ok(infos)
    }

    fn build_info(&self, descriptor: PluginDescriptor) -> Result<PluginInfo> {
        let record = self.store.get(&descriptor.handle)?;
        let has_settings = self
            .registry
            .get(&descriptor.handle)
            .map(|p| p.has_settings())
            .unwrap_or(false);
        Ok(PluginInfo::new(descriptor, record.as_ref(), has_settings))
    }

    /// 플러그인 아이콘 SVG
    ///
    /// `@<handle>/icon.svg` (없으면 플러그인 디렉토리의 `icon.svg`).
    /// 파일이 없거나 SVG가 아니면 설정의 기본 아이콘, 그것도 없으면 내장 아이콘.
    pub async fn get_plugin_icon_svg(&self, handle: &str) -> Result<Vec<u8>> {
        let handle = handle.to_lowercase();

        let candidate = match self.aliases.get(&handle) {
            Some(dir) => Some(dir.join(ICON_FILE)),
            None => self
                .resolver
                .resolve(&handle)
                .await
                .ok()
                .and_then(|d| d.base_path)
                .map(|dir| dir.join(ICON_FILE)),
        };

        if let Some(path) = candidate {
            match tokio::fs::read(&path).await {
                Ok(bytes) if is_svg(&bytes) => return Ok(bytes),
                Ok(_) => debug!("Icon for {} is not an SVG: {:?}", handle, path),
                Err(e) => debug!("No icon for {} at {:?}: {}", handle, path, e),
            }
        }

        if let Some(ref default_icon) = self.config.default_icon_path {
            match tokio::fs::read(default_icon).await {
                Ok(bytes) if is_svg(&bytes) => return Ok(bytes),
                _ => warn!("Configured default icon {:?} is unusable", default_icon),
            }
        }

        Ok(DEFAULT_PLUGIN_ICON.as_bytes().to_vec())
    }
}
