//! Plugin Version - 릴리스/스키마 버전 비교
//!
//! 버전 문자열은 가능한 한 semver로 해석하고 ("1.2" → "1.2.0"),
//! 해석할 수 없으면 점(.)으로 나눈 세그먼트 단위로 비교합니다.

use std::cmp::Ordering;

/// 스키마 버전이 선언되지 않은 경우의 기본값
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0.0";

/// 버전이 고정되지 않은 개발 버전
pub const DEV_VERSION: &str = "dev-master";

/// 두 버전 문자열 비교
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_lenient(a), parse_lenient(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        _ => compare_segments(a, b),
    }
}

/// `candidate`가 `current`보다 엄격하게 큰지
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare_versions(candidate, current) == Ordering::Greater
}

/// semver 파싱 (누락된 minor/patch는 0으로 채움)
pub fn parse_lenient(s: &str) -> Option<semver::Version> {
    let s = s.trim();
    let s = s.strip_prefix('v').unwrap_or(s);

    let split = s.find(|c: char| c == '-' || c == '+').unwrap_or(s.len());
    let (core, rest) = s.split_at(split);

    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }

    semver::Version::parse(&format!("{}{}", parts.join("."), rest)).ok()
}

fn compare_segments(a: &str, b: &str) -> Ordering {
    let sa: Vec<&str> = a.trim().split('.').collect();
    let sb: Vec<&str> = b.trim().split('.').collect();

    for i in 0..sa.len().max(sb.len()) {
        let x = sa.get(i).copied().unwrap_or("0");
        let y = sb.get(i).copied().unwrap_or("0");
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(nx), Ok(ny)) => nx.cmp(&ny),
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    Ordering::Equal
}
