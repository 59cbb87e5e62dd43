//! Plugin Info - 조회용 플러그인 정보와 정렬, 아이콘 유틸리티

use super::manifest::PluginDescriptor;
use hearth_foundation::{InstalledPluginRecord, LicenseKeyStatus};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// 플러그인 디렉토리의 아이콘 파일명
pub const ICON_FILE: &str = "icon.svg";

/// 아이콘이 없거나 SVG가 아닐 때 쓰는 내장 아이콘
pub const DEFAULT_PLUGIN_ICON: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100"><rect x="10" y="10" width="80" height="80" rx="16" fill="#e5e7eb"/><path d="M38 30h24v14h10v24H62v10H38V68H28V44h10z" fill="#9ca3af"/></svg>"##;

// ============================================================================
// PluginInfo
// ============================================================================

/// 디스크립터 + 설치 상태
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    #[serde(flatten)]
    pub descriptor: PluginDescriptor,

    pub is_installed: bool,
    pub is_enabled: bool,
    pub has_settings: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_key_status: Option<LicenseKeyStatus>,
}

impl PluginInfo {
    pub fn new(
        descriptor: PluginDescriptor,
        record: Option<&InstalledPluginRecord>,
        has_settings: bool,
    ) -> Self {
        Self {
            descriptor,
            is_installed: record.is_some(),
            is_enabled: record.map(|r| r.enabled).unwrap_or(false),
            has_settings,
            installed_version: record.map(|r| r.version.clone()),
            license_key: record.and_then(|r| r.license_key.clone()),
            license_key_status: record.map(|r| r.license_key_status),
        }
    }

    pub fn handle(&self) -> &str {
        &self.descriptor.handle
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// 이름 기준 정렬 (대소문자 무시, 자연 순서)
pub fn sort_by_name(infos: &mut [PluginInfo]) {
    infos.sort_by(|a, b| natural_cmp(a.name(), b.name()).then_with(|| a.handle().cmp(b.handle())));
}

// ============================================================================
// 자연 순서 비교
// ============================================================================

enum Chunk<'a> {
    Digits(&'a str),
    Text(String),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits: Option<bool> = None;

    for (i, c) in s.char_indices() {
        let digit = c.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != digit => {
                out.push(make_chunk(&s[start..i], prev));
                start = i;
            }
            _ => {}
        }
        in_digits = Some(digit);
    }
    if let Some(prev) = in_digits {
        out.push(make_chunk(&s[start..], prev));
    }
    out
}

fn make_chunk(s: &str, digits: bool) -> Chunk<'_> {
    if digits {
        Chunk::Digits(s)
    } else {
        Chunk::Text(s.to_lowercase())
    }
}

fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// 대소문자를 무시하는 자연 순서 비교 ("Plugin 2" < "plugin 10")
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let ca = chunks(a);
    let cb = chunks(b);

    for (x, y) in ca.iter().zip(cb.iter()) {
        let ord = match (x, y) {
            (Chunk::Digits(x), Chunk::Digits(y)) => cmp_digits(x, y),
            (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
            (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    ca.len().cmp(&cb.len())
}

// ============================================================================
// SVG 판별
// ============================================================================

/// 내용이 SVG 문서인지 (앞부분에서 `<svg` 태그 탐지)
pub fn is_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with('<') && text.to_ascii_lowercase().contains("<svg")
}
