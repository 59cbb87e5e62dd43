//! Plugin Discovery - 플러그인 설정 해석
//!
//! 핸들 → `PluginDescriptor` 해석 순서:
//! 1. 사전 계산된 레지스트리 (`plugins.json`, 대소문자 무시)
//! 2. 온디스크 매니페스트 (`<plugins_path>/<handle>/plugin.json`)

use super::manifest::{
    entry_point_candidates, scrape_manifest, PackageManifest, PluginDescriptor, RawPluginConfig,
    MANIFEST_FILE,
};
use hearth_foundation::{Error, HearthConfig, JsonStore, Result};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

// ============================================================================
// ConfigResolver
// ============================================================================

/// 플러그인 설정 해석기
pub struct ConfigResolver {
    /// 온디스크 플러그인 루트
    plugins_path: PathBuf,

    /// 사전 계산된 레지스트리 (소문자 핸들 → 설정)
    registry: HashMap<String, RawPluginConfig>,

    /// 매니페스트에서 추출한 설정 캐시 (`None` = 해석 불가)
    scraped: RwLock<HashMap<String, Option<RawPluginConfig>>>,
}

impl ConfigResolver {
    /// 레지스트리 없이 생성
    pub fn new(plugins_path: impl Into<PathBuf>) -> Self {
        Self {
            plugins_path: plugins_path.into(),
            registry: HashMap::new(),
            scraped: RwLock::new(HashMap::new()),
        }
    }

    /// 호스트 설정으로 생성 (레지스트리 파일이 있으면 로드)
    pub fn from_config(config: &HearthConfig) -> Result<Self> {
        let registry = load_registry_file(&config.registry_file)?;
        Ok(Self::new(&config.plugins_path).with_registry(registry))
    }

    /// 레지스트리 항목 설정
    pub fn with_registry(mut self, entries: HashMap<String, RawPluginConfig>) -> Self {
        self.registry = entries
            .into_iter()
            .map(|(handle, config)| (handle.to_lowercase(), config))
            .collect();
        self
    }

    pub fn plugins_path(&self) -> &Path {
        &self.plugins_path
    }

    /// 핸들의 온디스크 디렉토리
    ///
    /// 경로 구분자나 `..`가 들어간 핸들은 플러그인 루트 밖을 가리키므로 거부합니다.
    pub fn plugin_dir(&self, handle: &str) -> Result<PathBuf> {
        validate_handle(handle)?;
        Ok(self.plugins_path.join(handle.to_lowercase()))
    }

    /// 핸들 → 검증된 디스크립터
    ///
    /// 잘못된 형식의 핸들은 `InvalidInput`, 레지스트리에도 디스크에도 없으면
    /// `NotFound`, 필수 필드가 빠졌으면 `InvalidPluginConfig`.
    pub async fn resolve(&self, handle: &str) -> Result<PluginDescriptor> {
        let handle = handle.to_lowercase();
        let dir = self.plugin_dir(&handle)?;

        let mut raw = match self.registry.get(&handle) {
            Some(config) => config.clone(),
            None => self.scrape(&handle, &dir).await?,
        };

        if raw.base_path.is_none() && is_dir(&dir).await {
            raw.base_path = Some(dir);
        }

        raw.into_descriptor(&handle)
    }

    /// 해석 가능한지 여부 (에러 무시)
    pub async fn resolves(&self, handle: &str) -> bool {
        self.resolve(handle).await.is_ok()
    }

    async fn scrape(&self, handle: &str, dir: &Path) -> Result<RawPluginConfig> {
        let cached = self.scraped.read().get(handle).cloned();
        if let Some(cached) = cached {
            return cached.ok_or_else(|| Error::invalid_config(handle, "class"));
        }

        let manifest = read_manifest(dir)
            .await?
            .ok_or_else(|| Error::NotFound(format!("plugin `{}`", handle)))?;

        let mut present = HashSet::new();
        for candidate in entry_point_candidates(dir, &manifest) {
            if is_file(&candidate).await {
                present.insert(candidate);
            }
        }

        let scraped = scrape_manifest(handle, dir, &manifest, |p| present.contains(p));
        if scraped.is_none() {
            debug!("Manifest for {} declares no resolvable class", handle);
        }
        self.scraped
            .write()
            .insert(handle.to_string(), scraped.clone());

        scraped.ok_or_else(|| Error::invalid_config(handle, "class"))
    }

    /// 레지스트리 핸들 + 매니페스트가 있는 디렉토리 핸들 (정렬, 중복 제거)
    pub async fn discover_handles(&self) -> Vec<String> {
        let mut handles: BTreeSet<String> = self.registry.keys().cloned().collect();

        match scan_plugin_directories(&self.plugins_path).await {
            Ok(found) => handles.extend(found),
            Err(e) => {
                debug!("Skipping plugin directory scan {:?}: {}", self.plugins_path, e);
            }
        }

        handles.into_iter().collect()
    }

    /// 매니페스트 캐시 비우기
    pub fn clear_cache(&self) {
        self.scraped.write().clear();
    }
}

// ============================================================================
// 파일 읽기
// ============================================================================

/// 레지스트리 파일 로드 (없으면 빈 맵)
pub fn load_registry_file(path: &Path) -> Result<HashMap<String, RawPluginConfig>> {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name().and_then(|n| n.to_str()))
    else {
        return Ok(HashMap::new());
    };

    let entries: Option<HashMap<String, RawPluginConfig>> =
        JsonStore::new(dir).load_optional(name)?;
    let entries = entries.unwrap_or_default();
    debug!("Loaded {} registry entries from {:?}", entries.len(), path);
    Ok(entries)
}

/// `<dir>/plugin.json` 읽기 (없으면 `None`)
pub async fn read_manifest(dir: &Path) -> Result<Option<PackageManifest>> {
    let path = dir.join(MANIFEST_FILE);
    let content = match fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_str(&content).map(Some).map_err(|e| {
        Error::InvalidPluginConfig(format!("{}: {}", path.display(), e))
    })
}

/// 핸들은 플러그인 루트 바로 아래의 디렉토리 이름 하나여야 함
fn validate_handle(handle: &str) -> Result<()> {
    let trimmed = handle.trim();
    if trimmed.is_empty()
        || trimmed != handle
        || handle.contains(['/', '\\'])
        || handle == "."
        || handle.contains("..")
    {
        return Err(Error::InvalidInput(format!("invalid plugin handle `{}`", handle)));
    }
    Ok(())
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

/// 매니페스트가 있는 하위 디렉토리 이름들
async fn scan_plugin_directories(root: &Path) -> Result<Vec<String>> {
    let mut handles = Vec::new();
    let mut entries = fs::read_dir(root).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_file(&path.join(MANIFEST_FILE)).await {
            continue;
        }
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => handles.push(name.to_lowercase()),
            None => warn!("Skipping plugin directory with non UTF-8 name: {:?}", path),
        }
    }

    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_plugin(root: &Path, handle: &str, manifest: &str, entry_point: Option<&str>) {
        let dir = root.join(handle);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
        if let Some(rel) = entry_point {
            let file = dir.join(rel);
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(file, "").unwrap();
        }
    }

    #[tokio::test]
    async fn test_registry_first_case_insensitive() {
        let temp = TempDir::new().unwrap();
        let mut registry = HashMap::new();
        registry.insert(
            "SEO".to_string(),
            RawPluginConfig {
                class: Some("acme::seo::Plugin".into()),
                name: Some("SEO".into()),
                version: Some("1.0.0".into()),
                ..Default::default()
            },
        );

        let resolver = ConfigResolver::new(temp.path()).with_registry(registry);
        let descriptor = resolver.resolve("Seo").await.unwrap();
        assert_eq!(descriptor.handle, "seo");
        assert_eq!(descriptor.class, "acme::seo::Plugin");
    }

    #[tokio::test]
    async fn test_manifest_fallback() {
        let temp = TempDir::new().unwrap();
        write_plugin(
            temp.path(),
            "sitemap",
            r#"{
                "name": "acme/sitemap",
                "version": "0.4.0",
                "autoload": { "namespaces": { "acme::sitemap::": "src/" } }
            }"#,
            Some("src/plugin.rs"),
        );

        let resolver = ConfigResolver::new(temp.path());
        let descriptor = resolver.resolve("sitemap").await.unwrap();
        assert_eq!(descriptor.class, "acme::sitemap::Plugin");
        assert_eq!(descriptor.version, "0.4.0");
        assert_eq!(descriptor.base_path, Some(temp.path().join("sitemap/src")));
    }

    #[tokio::test]
    async fn test_missing_and_invalid() {
        let temp = TempDir::new().unwrap();
        write_plugin(temp.path(), "broken", r#"{ "name": "acme/broken" }"#, None);
        write_plugin(temp.path(), "garbled", "{ not json", None);

        let resolver = ConfigResolver::new(temp.path());
        assert!(matches!(resolver.resolve("nope").await, Err(Error::NotFound(_))));
        assert!(matches!(
            resolver.resolve("broken").await,
            Err(Error::InvalidPluginConfig(_))
        ));
        // cached result gives the same answer
        assert!(matches!(
            resolver.resolve("broken").await,
            Err(Error::InvalidPluginConfig(_))
        ));
        assert!(matches!(
            resolver.resolve("garbled").await,
            Err(Error::InvalidPluginConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_handles_cannot_escape_plugin_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("plugins");
        write_plugin(temp.path(), "outside", r#"{ "extra": { "class": "x::Plugin" } }"#, None);

        let resolver = ConfigResolver::new(&root);
        for handle in ["../outside", "a/b", "a\\b", "..", "", " seo"] {
            assert!(
                matches!(resolver.resolve(handle).await, Err(Error::InvalidInput(_))),
                "{:?} should be rejected",
                handle
            );
        }
        assert!(resolver.plugin_dir("../outside").is_err());
        assert_eq!(resolver.plugin_dir("SEO").unwrap(), root.join("seo"));
    }

    #[test]
    fn test_load_registry_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plugins.json");
        assert!(load_registry_file(&path).unwrap().is_empty());

        std::fs::write(
            &path,
            r#"{ "seo": { "class": "acme::seo::Plugin", "name": "SEO", "version": "1.0.0",
                 "schemaVersion": "1.1.0", "aliases": { "@acme/seo": "/srv/seo" } } }"#,
        )
        .unwrap();
        let entries = load_registry_file(&path).unwrap();
        let seo = &entries["seo"];
        assert_eq!(seo.schema_version.as_deref(), Some("1.1.0"));
        assert_eq!(seo.aliases["@acme/seo"], PathBuf::from("/srv/seo"));
    }

    #[tokio::test]
    async fn test_discover_handles() {
        let temp = TempDir::new().unwrap();
        write_plugin(temp.path(), "feeds", "{}", None);
        std::fs::create_dir_all(temp.path().join("not-a-plugin")).unwrap();

        let mut registry = HashMap::new();
        registry.insert("seo".to_string(), RawPluginConfig::default());
        let resolver = ConfigResolver::new(temp.path()).with_registry(registry);

        assert_eq!(
            resolver.discover_handles().await,
            vec!["feeds".to_string(), "seo".to_string()]
        );
    }
}
