//! Plugin License Keys

use hearth_foundation::{Error, Result};

/// 정규화된 라이선스 키 길이
pub const LICENSE_KEY_LENGTH: usize = 24;

/// 라이선스 키 정규화
///
/// 대문자로 바꾼 뒤 `[A-Z0-9]` 이외의 문자를 모두 제거합니다.
/// 결과는 정확히 24자여야 합니다. `None`은 키 삭제를 뜻합니다.
pub fn normalize_license_key(key: Option<&str>) -> Result<Option<String>> {
    let Some(key) = key else {
        return Ok(None);
    };

    let normalized: String = key
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect();

    if normalized.len() != LICENSE_KEY_LENGTH {
        return Err(Error::InvalidLicenseKey(format!(
            "expected {} alphanumeric characters, got {}",
            LICENSE_KEY_LENGTH,
            normalized.len()
        )));
    }

    Ok(Some(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_mixed_input() {
        let key = normalize_license_key(Some("ab-cd 1234efgh5678ijkl9012")).unwrap();
        assert_eq!(key.as_deref(), Some("ABCD1234EFGH5678IJKL9012"));
    }

    #[test]
    fn test_rejects_wrong_length() {
        let err = normalize_license_key(Some("TOO-SHORT")).unwrap_err();
        assert!(matches!(err, Error::InvalidLicenseKey(_)));

        let long = "A".repeat(25);
        assert!(normalize_license_key(Some(&long)).is_err());
    }

    #[test]
    fn test_none_clears() {
        assert_eq!(normalize_license_key(None).unwrap(), None);
    }

    #[test]
    fn test_non_ascii_letters_dropped() {
        // 'É'는 [A-Z]가 아니므로 제거됨
        let key = normalize_license_key(Some("é-ABCD1234EFGH5678IJKL9012")).unwrap();
        assert_eq!(key.as_deref(), Some("ABCD1234EFGH5678IJKL9012"));
    }
}
