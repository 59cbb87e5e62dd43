//! Error types for Hearth
//!
//! 모든 레이어가 공유하는 단일 에러 타입.
//! 플러그인 훅 실패는 에러가 아니라 `Ok(false)` 로 표현됩니다.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 플러그인 라이프사이클
    // ========================================================================
    /// 매니페스트/레지스트리에 필수 필드(class, name, version)가 없음.
    /// 발견 단계에서는 해당 핸들만 건너뜁니다.
    #[error("invalid plugin config: {0}")]
    InvalidPluginConfig(String),

    /// 해석할 수 없는 핸들이거나 기대한 라이프사이클 상태가 아님
    #[error("invalid plugin: {0}")]
    InvalidPlugin(String),

    /// 정규화 후 24자가 아닌 키. 저장 전에 거부됩니다.
    #[error("invalid license key: {0}")]
    InvalidLicenseKey(String),

    /// 플러그인이 거부한 설정 값
    #[error("settings rejected: {0}")]
    Validation(String),

    // ========================================================================
    // 환경
    // ========================================================================
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    pub fn invalid_plugin(handle: impl Into<String>) -> Self {
        Error::InvalidPlugin(handle.into())
    }

    /// 필수 필드 누락
    pub fn invalid_config(handle: &str, missing: &str) -> Self {
        Error::InvalidPluginConfig(format!("{}: missing `{}`", handle, missing))
    }

    /// 설치 기록이 없는 핸들에 대한 작업
    pub fn not_installed(handle: &str) -> Self {
        Error::InvalidPlugin(format!("{} is not installed", handle))
    }

    /// 라이브 인스턴스가 필요한 작업
    pub fn not_enabled(handle: &str) -> Self {
        Error::InvalidPlugin(format!("{} is not enabled", handle))
    }

    /// 호출자에게 그대로 보여줘도 되는 에러 (환경 장애가 아님)
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::InvalidPlugin(_)
                | Error::InvalidPluginConfig(_)
                | Error::InvalidLicenseKey(_)
                | Error::Validation(_)
                | Error::NotFound(_)
                | Error::InvalidInput(_)
        )
    }

    /// 벌크 로드/목록 조회에서 해당 플러그인만 건너뛰면 되는 에러
    pub fn is_skippable(&self) -> bool {
        matches!(self, Error::InvalidPluginConfig(_) | Error::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_helpers() {
        assert_eq!(
            Error::not_installed("seo").to_string(),
            "invalid plugin: seo is not installed"
        );
        assert!(matches!(Error::not_enabled("seo"), Error::InvalidPlugin(_)));
        assert_eq!(
            Error::invalid_config("seo", "class").to_string(),
            "invalid plugin config: seo: missing `class`"
        );
    }

    #[test]
    fn test_classification() {
        assert!(Error::invalid_plugin("seo").is_user_facing());
        assert!(Error::InvalidLicenseKey("short".into()).is_user_facing());
        assert!(!Error::Storage("disk full".into()).is_user_facing());

        assert!(Error::invalid_config("seo", "class").is_skippable());
        assert!(Error::NotFound("seo".into()).is_skippable());
        assert!(!Error::invalid_plugin("seo").is_skippable());
    }

    #[test]
    fn test_sqlite_error_converts() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Sqlite(_)));
        assert!(!err.is_user_facing());
    }
}
