//! JSON 파일 저장소 (설정 파일, 플러그인 레지스트리 파일)

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "hearth";
const PROJECT_DIR: &str = ".hearth";

/// 디렉토리 하나에 묶인 JSON 파일 저장소
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 사용자 설정 디렉토리 (`<config_dir>/hearth`)
    pub fn global() -> Result<Self> {
        dirs::config_dir()
            .map(|dir| Self::new(dir.join(APP_DIR)))
            .ok_or_else(|| Error::Config("no user config directory on this platform".into()))
    }

    /// 프로젝트 로컬 설정 (`<root>/.hearth`)
    pub fn project(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(PROJECT_DIR))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// 파일이 없으면 `Ok(None)`, 형식이 틀리면 `Error::Config`
    pub fn load_optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.path(name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Config(format!("{}: {}", path.display(), e))),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// 파일이 반드시 있어야 하는 로드
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        self.load_optional(name)?
            .ok_or_else(|| Error::NotFound(self.path(name).display().to_string()))
    }

    /// 임시 파일에 쓴 뒤 rename
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;

        let path = self.path(name);
        let tmp = path.with_extension("json.tmp");
        let mut body = serde_json::to_vec_pretty(value)?;
        body.push(b'\n');

        std::fs::write(&tmp, &body)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.path(name).is_file()
    }
}
