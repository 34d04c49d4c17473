//! # バインディングサーフェス
//!
//! モジュールが要求する唯一の名前付きインポートを満たすグルー層の抽象化。
//! グルー関数そのものは別途生成済みのものを想定し、ここでは
//! リンカーへの登録方法だけを定義する。

use wasmtime::Linker;

use crate::error::LoaderError;

/// 既定のインポートモジュール名。
pub const DEFAULT_IMPORT_MODULE: &str = "env";

/// モジュールのインポートを満たすグルー層のトレイト。
///
/// 実装は `import_module()` の名前の下にグルー関数を登録する。
/// 登録内容とモジュールのインポート要求が一致しない場合、
/// インスタンス化はリンクエラーとして失敗する。
pub trait BindingSurface: Send + Sync {
    /// モジュールが要求する唯一のインポートモジュール名。
    fn import_module(&self) -> &str {
        DEFAULT_IMPORT_MODULE
    }

    /// グルー関数をリンカーへ登録する。
    fn register(&self, linker: &mut Linker<()>) -> Result<(), LoaderError>;
}

/// インポートを要求しないモジュール用のバインディング。何も登録しない。
pub struct NullBindings;

impl BindingSurface for NullBindings {
    fn register(&self, _linker: &mut Linker<()>) -> Result<(), LoaderError> {
        Ok(())
    }
}
