//! # Hatch モジュールローダー
//!
//! 外部コンパイラが生成したポータブルなWASMモジュールを取得・コンパイル・
//! インスタンス化し、そのエクスポートを一貫したインターフェースとして
//! 提供するブートストラップローダー。
//!
//! ## 初期化戦略
//! - ネットワーク・ストリーミング取得（`HttpSource`、既定）
//! - ネットワーク・一括取得（`HttpSource::buffered_only`、フォールバック兼用）
//! - 同期ファイル読み込み（`FileSource` + `Loader::init_blocking` / 自動ロード）
//! - 非同期ファイル読み込み（`FileSource` + `Loader::init`）
//!
//! ## ライフサイクル
//! 1. `Loader` を構築する（エクスポートは未初期化状態で始まる）
//! 2. `init()` / `init_blocking()` で 取得 → コンパイル → インスタンス化 → 起動
//! 3. `exports()` で得たエクスポート表からモジュールの機能を呼び出す
//!
//! 初期化前のアクセスは初期化手順を示すエラーで即座に失敗する。
//! 同期ソースでは `exports_or_load()` が初回アクセス時に透過的に
//! 初期化を行う。

pub mod binding;
pub mod error;
pub mod source;

mod compiler;
mod instance;
mod loader;

pub use binding::{BindingSurface, NullBindings, DEFAULT_IMPORT_MODULE};
pub use error::LoaderError;
pub use instance::{ExportTable, STARTUP_EXPORT_NAME};
pub use loader::Loader;
pub use source::{
    BlockingModuleSource, ByteStream, FetchPayload, FileSource, HttpSource, ModuleBytes,
    ModuleSource, DEFAULT_MODULE_FILE_NAME,
};

// バインディングサーフェス実装が Linker / Val を参照するため再エクスポートする
pub use wasmtime;
