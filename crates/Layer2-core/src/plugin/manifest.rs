//! Plugin Manifest - 플러그인 메타데이터 정의
//!
//! - `PluginDescriptor`: 해석·검증이 끝난 플러그인 메타데이터
//! - `RawPluginConfig`: 레지스트리 파일 항목 / 매니페스트에서 추출한 미검증 설정
//! - `PackageManifest`: 플러그인 디렉토리의 `plugin.json`
//!
//! 매니페스트 → 설정 변환(`scrape_manifest`)은 파일 시스템 없이 테스트 가능한
//! 순수 함수입니다. 엔트리 포인트 존재 여부만 콜백으로 주입받습니다.

use super::version::{DEFAULT_SCHEMA_VERSION, DEV_VERSION};
use hearth_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 플러그인 디렉토리의 매니페스트 파일명
pub const MANIFEST_FILE: &str = "plugin.json";

/// 네임스페이스 경로 아래의 관례적 엔트리 포인트 파일
pub const ENTRY_POINT_FILE: &str = "plugin.rs";

/// 네임스페이스 구분자
pub const NAMESPACE_SEPARATOR: &str = "::";

// ============================================================================
// PluginDescriptor
// ============================================================================

/// 해석된 플러그인 메타데이터 (설치 여부와 무관)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    /// 소문자 고유 핸들
    pub handle: String,

    /// 구현 참조 (생성자 레지스트리 키)
    pub class: String,

    /// 표시 이름
    pub name: String,

    /// 릴리스 버전
    pub version: String,

    /// 스키마 버전 (항상 값이 있음)
    pub schema_version: String,

    /// 플러그인 루트 경로
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,

    /// 패키지 이름 (`vendor/name`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,

    /// 경로 별칭 (`@acme/seo` → 디렉토리)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, PathBuf>,

    /// 하위 컴포넌트 선언 (플러그인 정의 형태)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub components: Map<String, Value>,
}

// ============================================================================
// RawPluginConfig - 검증 전 설정
// ============================================================================

/// 레지스트리 파일 항목 또는 매니페스트에서 추출한 설정 (검증 전)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPluginConfig {
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub schema_version: Option<String>,
    #[serde(default)]
    pub base_path: Option<PathBuf>,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub developer: Option<String>,
    #[serde(default)]
    pub developer_url: Option<String>,
    #[serde(default)]
    pub documentation_url: Option<String>,
    #[serde(default)]
    pub changelog_url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub aliases: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub components: Map<String, Value>,
}

impl RawPluginConfig {
    /// 필수 필드(class, name, version) 검증 후 디스크립터로 변환
    pub fn into_descriptor(self, handle: &str) -> Result<PluginDescriptor> {
        let class = required(self.class, handle, "class")?;
        let name = required(self.name, handle, "name")?;
        let version = required(self.version, handle, "version")?;

        Ok(PluginDescriptor {
            handle: handle.to_lowercase(),
            class,
            name,
            version,
            schema_version: self
                .schema_version
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SCHEMA_VERSION.to_string()),
            base_path: self.base_path,
            package_name: self.package_name,
            description: self.description,
            developer: self.developer,
            developer_url: self.developer_url,
            documentation_url: self.documentation_url,
            changelog_url: self.changelog_url,
            download_url: self.download_url,
            aliases: self.aliases,
            components: self.components,
        })
    }
}

fn required(value: Option<String>, handle: &str, field: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::invalid_config(handle, field))
}

// ============================================================================
// PackageManifest - plugin.json 구조
// ============================================================================

/// `plugin.json` 파일 구조
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    /// 패키지 이름 (예: "acme/seo-tools")
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub homepage: Option<String>,

    #[serde(default)]
    pub authors: Vec<ManifestAuthor>,

    #[serde(default)]
    pub support: ManifestSupport,

    #[serde(default)]
    pub autoload: ManifestAutoload,

    #[serde(default)]
    pub extra: ManifestExtra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestAuthor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestSupport {
    #[serde(default)]
    pub docs: Option<String>,
}

/// 네임스페이스 → 상대 경로 매핑
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestAutoload {
    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespacePaths>,
}

/// 단일 경로 또는 경로 목록 (목록이면 첫 번째만 사용)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NamespacePaths {
    One(String),
    Many(Vec<String>),
}

impl NamespacePaths {
    fn first(&self) -> Option<&str> {
        match self {
            Self::One(p) => Some(p.as_str()),
            Self::Many(ps) => ps.first().map(String::as_str),
        }
    }
}

/// `extra` 섹션 - 플러그인 전용 필드
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestExtra {
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub schema_version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub developer: Option<String>,
    #[serde(default)]
    pub developer_url: Option<String>,
    #[serde(default)]
    pub documentation_url: Option<String>,
    #[serde(default)]
    pub changelog_url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub components: Map<String, Value>,
}

// ============================================================================
// 매니페스트 → 설정 변환
// ============================================================================

/// 후보 중 비어 있지 않은 첫 값
fn first_of<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// `acme::seo::` → `@acme/seo`
fn namespace_alias(namespace: &str) -> String {
    let trimmed = namespace.trim_matches(|c: char| c == ':');
    format!("@{}", trimmed.replace(NAMESPACE_SEPARATOR, "/"))
}

/// 상대 경로를 플러그인 디렉토리 기준으로 정규화
fn namespace_dir(plugin_dir: &Path, relative: &str) -> PathBuf {
    let relative = relative.trim_end_matches(['/', '\\']);
    if relative.is_empty() || relative == "." {
        plugin_dir.to_path_buf()
    } else {
        plugin_dir.join(relative)
    }
}

/// 클래스 추론 시 `scrape_manifest`가 확인할 엔트리 포인트 경로들
pub fn entry_point_candidates(plugin_dir: &Path, manifest: &PackageManifest) -> Vec<PathBuf> {
    manifest
        .autoload
        .namespaces
        .values()
        .filter_map(|paths| paths.first())
        .map(|relative| namespace_dir(plugin_dir, relative).join(ENTRY_POINT_FILE))
        .collect()
}

/// `plugin.json`에서 설정 추출
///
/// 구현 클래스를 알 수 없으면 `None`. `has_entry_point`는 주어진 경로에
/// 엔트리 포인트 파일이 있는지 알려주는 콜백입니다.
pub fn scrape_manifest(
    handle: &str,
    plugin_dir: &Path,
    manifest: &PackageManifest,
    has_entry_point: impl Fn(&Path) -> bool,
) -> Option<RawPluginConfig> {
    let extra = &manifest.extra;

    let (vendor, package) = match manifest.name.as_deref() {
        Some(full) => match full.split_once('/') {
            Some((vendor, package)) => (Some(vendor), Some(package)),
            None => (None, Some(full)),
        },
        None => (None, None),
    };

    // class + base path + aliases
    let mut class = first_of([extra.class.as_deref()]);
    let mut base_path: Option<PathBuf> = None;
    let mut aliases = BTreeMap::new();

    for (namespace, paths) in &manifest.autoload.namespaces {
        let Some(relative) = paths.first() else {
            continue;
        };
        let dir = namespace_dir(plugin_dir, relative);
        aliases.insert(namespace_alias(namespace), dir.clone());

        let prefix = if namespace.ends_with(NAMESPACE_SEPARATOR) {
            namespace.clone()
        } else {
            format!("{}{}", namespace, NAMESPACE_SEPARATOR)
        };

        if class.is_none() && has_entry_point(&dir.join(ENTRY_POINT_FILE)) {
            class = Some(format!("{}Plugin", prefix));
        }
        if base_path.is_none() {
            if let Some(ref c) = class {
                if c.starts_with(&prefix) {
                    base_path = Some(dir);
                }
            }
        }
    }

    let class = class?;

    let author = manifest.authors.first();
    let author_name = author.and_then(|a| a.name.as_deref());
    let author_homepage = author.and_then(|a| a.homepage.as_deref());

    Some(RawPluginConfig {
        class: Some(class),
        name: first_of([extra.name.as_deref(), package, Some(handle)]),
        version: first_of([
            extra.version.as_deref(),
            manifest.version.as_deref(),
            Some(DEV_VERSION),
        ]),
        schema_version: first_of([extra.schema_version.as_deref()]),
        base_path: Some(base_path.unwrap_or_else(|| plugin_dir.to_path_buf())),
        package_name: manifest.name.clone(),
        description: first_of([extra.description.as_deref(), manifest.description.as_deref()]),
        developer: first_of([extra.developer.as_deref(), author_name, vendor]),
        developer_url: first_of([
            extra.developer_url.as_deref(),
            manifest.homepage.as_deref(),
            author_homepage,
        ]),
        documentation_url: first_of([
            extra.documentation_url.as_deref(),
            manifest.support.docs.as_deref(),
        ]),
        changelog_url: first_of([extra.changelog_url.as_deref()]),
        download_url: first_of([extra.download_url.as_deref()]),
        aliases,
        components: extra.components.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(json: &str) -> PackageManifest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_explicit_class_and_extra_fields() {
        let m = manifest(
            r#"{
                "name": "acme/seo-tools",
                "version": "2.0.0",
                "homepage": "https://acme.dev",
                "authors": [{ "name": "Jo Acme", "homepage": "https://jo.dev" }],
                "support": { "docs": "https://docs.acme.dev" },
                "autoload": { "namespaces": { "acme::seo::": "src/" } },
                "extra": {
                    "class": "acme::seo::Plugin",
                    "name": "SEO Tools",
                    "schemaVersion": "1.2.0",
                    "developer": "Acme Inc"
                }
            }"#,
        );

        let raw = scrape_manifest("seo", Path::new("/p/seo"), &m, |_| false).unwrap();
        assert_eq!(raw.class.as_deref(), Some("acme::seo::Plugin"));
        assert_eq!(raw.name.as_deref(), Some("SEO Tools"));
        assert_eq!(raw.version.as_deref(), Some("2.0.0"));
        assert_eq!(raw.schema_version.as_deref(), Some("1.2.0"));
        assert_eq!(raw.developer.as_deref(), Some("Acme Inc"));
        assert_eq!(raw.developer_url.as_deref(), Some("https://acme.dev"));
        assert_eq!(raw.documentation_url.as_deref(), Some("https://docs.acme.dev"));
        assert_eq!(raw.base_path, Some(PathBuf::from("/p/seo/src")));
        assert_eq!(raw.aliases.get("@acme/seo"), Some(&PathBuf::from("/p/seo/src")));
    }

    #[test]
    fn test_class_inferred_from_entry_point() {
        let m = manifest(
            r#"{
                "name": "acme/sitemap",
                "autoload": { "namespaces": { "acme::sitemap": ["lib", "extra"] } }
            }"#,
        );

        let raw = scrape_manifest("sitemap", Path::new("/p/sitemap"), &m, |p| {
            p == Path::new("/p/sitemap/lib/plugin.rs")
        })
        .unwrap();

        assert_eq!(raw.class.as_deref(), Some("acme::sitemap::Plugin"));
        assert_eq!(raw.name.as_deref(), Some("sitemap"));
        assert_eq!(raw.version.as_deref(), Some(DEV_VERSION));
        assert_eq!(raw.developer.as_deref(), Some("acme"));
        assert_eq!(raw.base_path, Some(PathBuf::from("/p/sitemap/lib")));
        assert_eq!(
            entry_point_candidates(Path::new("/p/sitemap"), &m),
            vec![PathBuf::from("/p/sitemap/lib/plugin.rs")]
        );
    }

    #[test]
    fn test_author_fallbacks() {
        let m = manifest(
            r#"{
                "name": "acme/feeds",
                "authors": [{ "name": "Jo Acme", "homepage": "https://jo.dev" }],
                "extra": { "class": "acme::feeds::Plugin", "version": "0.3.0" }
            }"#,
        );

        let raw = scrape_manifest("feeds", Path::new("/p/feeds"), &m, |_| false).unwrap();
        assert_eq!(raw.developer.as_deref(), Some("Jo Acme"));
        assert_eq!(raw.developer_url.as_deref(), Some("https://jo.dev"));
        assert_eq!(raw.version.as_deref(), Some("0.3.0"));
        assert_eq!(raw.base_path, Some(PathBuf::from("/p/feeds")));
    }

    #[test]
    fn test_missing_class_yields_none() {
        let m = manifest(r#"{ "name": "acme/broken", "version": "1.0.0" }"#);
        assert!(scrape_manifest("broken", Path::new("/p/broken"), &m, |_| true).is_none());
    }

    #[test]
    fn test_descriptor_validation() {
        let raw = RawPluginConfig {
            class: Some("acme::seo::Plugin".into()),
            name: Some("SEO".into()),
            version: Some("1.0.0".into()),
            ..Default::default()
        };
        let descriptor = raw.clone().into_descriptor("SEO").unwrap();
        assert_eq!(descriptor.handle, "seo");
        assert_eq!(descriptor.schema_version, DEFAULT_SCHEMA_VERSION);

        let missing_name = RawPluginConfig { name: None, ..raw };
        let err = missing_name.into_descriptor("seo").unwrap_err();
        assert!(matches!(err, Error::InvalidPluginConfig(_)));
    }
}
