//! # ファイルシステムモジュールソース
//!
//! ローカルパスからモジュールバイナリを読み込む。
//! 同期読み込み（`BlockingModuleSource`）と非同期読み込み（`ModuleSource`）の
//! 両方を提供する。
//!
//! パスはローダー自身の設置場所（実行ファイルのディレクトリ）から解決でき、
//! プロセスのカレントディレクトリには依存しない。

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{BlockingModuleSource, FetchPayload, ModuleBytes, ModuleSource};
use crate::error::LoaderError;

/// ローカルパスからモジュールバイナリを読み込むソース。
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// 指定パスを読むソースを作成する。
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 実行ファイルと同じディレクトリのモジュールを指すソースを作成する。
    /// 呼び出し元のカレントディレクトリに関係なくモジュールを発見できる。
    pub fn beside_executable(file_name: &str) -> Result<Self, LoaderError> {
        let exe = std::env::current_exe().map_err(|e| LoaderError::Fetch {
            location: file_name.to_string(),
            reason: format!("実行ファイルパスの取得に失敗: {e}"),
        })?;
        let dir = exe.parent().ok_or_else(|| LoaderError::Fetch {
            location: file_name.to_string(),
            reason: "実行ファイルの親ディレクトリを解決できません".to_string(),
        })?;
        Ok(Self {
            path: dir.join(file_name),
        })
    }

    /// 読み込み対象のパス。
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn location_string(&self) -> String {
        format!("file://{}", self.path.display())
    }

    fn read_blocking(&self) -> Result<ModuleBytes, LoaderError> {
        let bytes = std::fs::read(&self.path).map_err(|e| LoaderError::Fetch {
            location: self.location_string(),
            reason: e.to_string(),
        })?;
        Ok(ModuleBytes {
            bytes,
            location: self.location_string(),
        })
    }
}

impl BlockingModuleSource for FileSource {
    fn location(&self) -> String {
        self.location_string()
    }

    fn fetch(&self) -> Result<ModuleBytes, LoaderError> {
        self.read_blocking()
    }
}

#[async_trait]
impl ModuleSource for FileSource {
    fn location(&self) -> String {
        self.location_string()
    }

    async fn fetch(&self) -> Result<FetchPayload, LoaderError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| LoaderError::Fetch {
                location: self.location_string(),
                reason: e.to_string(),
            })?;
        Ok(FetchPayload::Buffer(ModuleBytes {
            bytes,
            location: self.location_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DEFAULT_MODULE_FILE_NAME;

    /// 同期読み込みがファイル内容を返すことを確認
    #[test]
    fn test_blocking_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module.wasm");
        std::fs::write(&path, b"\0asm\x01\0\0\0").unwrap();

        let source = FileSource::new(&path);
        let binary = BlockingModuleSource::fetch(&source).unwrap();
        assert_eq!(binary.bytes, b"\0asm\x01\0\0\0");
        assert!(binary.location.starts_with("file://"));
    }

    /// 非同期読み込みがファイル内容を返すことを確認
    #[tokio::test]
    async fn test_async_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module.wasm");
        tokio::fs::write(&path, b"\0asm\x01\0\0\0").await.unwrap();

        let source = FileSource::new(&path);
        let payload = ModuleSource::fetch(&source).await.unwrap();
        match payload {
            FetchPayload::Buffer(binary) => assert_eq!(binary.bytes, b"\0asm\x01\0\0\0"),
            FetchPayload::Stream(_) => panic!("一括取得のはず"),
        }
    }

    /// 存在しないパスのエラーがパスを含むことを確認
    #[test]
    fn test_missing_file_error_contains_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.wasm");

        let source = FileSource::new(&path);
        let err = BlockingModuleSource::fetch(&source).unwrap_err();
        assert!(err.to_string().contains("absent.wasm"));
    }

    /// 実行ファイル基準のパス解決がカレントディレクトリに依存しないことを確認
    #[test]
    fn test_beside_executable_resolution() {
        let source = FileSource::beside_executable(DEFAULT_MODULE_FILE_NAME).unwrap();
        let exe_dir = std::env::current_exe().unwrap().parent().unwrap().to_path_buf();
        assert_eq!(source.path(), exe_dir.join(DEFAULT_MODULE_FILE_NAME));
    }
}
