//! # モジュールバイトソース
//!
//! モジュールバイナリの取得を抽象化する。
//! ホスト環境の能力はソースが実装するトレイトで表現される:
//! 非同期取得（`ModuleSource`）と同期取得（`BlockingModuleSource`）。
//!
//! ## ソース実装
//! - `HttpSource`: URL経由でモジュールを取得する（ストリーミング優先）
//! - `FileSource`: ローカルパスからモジュールを読み込む（同期・非同期両対応）

pub mod file;
pub mod http;

pub use file::FileSource;
pub use http::HttpSource;

use async_trait::async_trait;

use crate::error::LoaderError;

/// 既定のモジュールファイル名。
/// ファイル系ソースはローダー自身の設置場所からこの名前で解決する。
pub const DEFAULT_MODULE_FILE_NAME: &str = "module.wasm";

/// 取得済みのモジュールバイナリ。
#[derive(Debug)]
pub struct ModuleBytes {
    /// モジュールバイナリデータ
    pub bytes: Vec<u8>,
    /// 取得元（診断メッセージに記録される）
    pub location: String,
}

/// モジュールバイナリのチャンク列。
/// ダウンロード完了を待たずにコンパイラへ渡すために使う。
#[async_trait]
pub trait ByteStream: Send {
    /// 取得元（診断メッセージに記録される）
    fn location(&self) -> &str;

    /// 次のチャンクを返す。ストリーム終端では `None`。
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, LoaderError>;
}

/// 取得結果。ストリーミング取得か一括取得かはソースが決める。
pub enum FetchPayload {
    /// ストリーミング取得（チャンク順次）
    Stream(Box<dyn ByteStream>),
    /// 一括取得済みバッファ
    Buffer(ModuleBytes),
}

impl std::fmt::Debug for FetchPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchPayload::Stream(stream) => f
                .debug_tuple("Stream")
                .field(&stream.location())
                .finish(),
            FetchPayload::Buffer(binary) => f.debug_tuple("Buffer").field(binary).finish(),
        }
    }
}

/// モジュールバイナリを非同期に取得するトレイト。
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// 取得先の表示用文字列（URLまたはパス）。
    fn location(&self) -> String;

    /// モジュールバイナリを取得する。
    async fn fetch(&self) -> Result<FetchPayload, LoaderError>;
}

/// モジュールバイナリを呼び出しスレッドをブロックして取得するトレイト。
/// ブロッキング読み込みと同期コンパイルが利用できる環境でのみ使う。
pub trait BlockingModuleSource: Send + Sync {
    /// 取得先の表示用文字列（URLまたはパス）。
    fn location(&self) -> String;

    /// モジュールバイナリを取得する。
    fn fetch(&self) -> Result<ModuleBytes, LoaderError>;
}
