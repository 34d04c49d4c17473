//! # インスタンス化とエクスポート表
//!
//! コンパイル済みモジュールをインスタンス化し、起動エクスポートを
//! ちょうど一度だけ実行してから、エクスポート表として公開する。
//!
//! 起動エクスポートが欠落している、または失敗した場合は
//! インスタンス化失敗として扱い、エクスポート表は公開されない。

use std::sync::Mutex;

use wasmtime::{Engine, Instance, Linker, Store, Val};

use crate::binding::BindingSurface;
use crate::compiler::CompiledModule;
use crate::error::LoaderError;

/// 起動エクスポート名（WASIリアクター規約）。
/// インスタンス化直後、他のエクスポートを使う前に一度だけ呼び出される。
pub const STARTUP_EXPORT_NAME: &str = "_initialize";

/// 実行中インスタンスのエクスポート表。
/// エクスポート名による動的呼び出しを提供する。呼び出しはストアの
/// ロックで直列化される。
pub struct ExportTable {
    store: Mutex<Store<()>>,
    instance: Instance,
    digest: String,
    location: String,
}

impl std::fmt::Debug for ExportTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportTable")
            .field("digest", &self.digest)
            .field("location", &self.location)
            .finish()
    }
}

impl ExportTable {
    /// エクスポートを名前で呼び出し、結果値の列を返す。
    pub fn invoke(&self, name: &str, params: &[Val]) -> Result<Vec<Val>, LoaderError> {
        let mut store = self.store.lock().unwrap();
        let func = self
            .instance
            .get_func(&mut *store, name)
            .ok_or_else(|| LoaderError::ExportNotFound {
                name: name.to_string(),
            })?;
        let result_len = func.ty(&*store).results().len();
        let mut results = vec![Val::I32(0); result_len];
        func.call(&mut *store, params, &mut results)
            .map_err(|e| LoaderError::Call {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(results)
    }

    /// 指定名の関数エクスポートが存在するか。
    pub fn has_export(&self, name: &str) -> bool {
        let mut store = self.store.lock().unwrap();
        self.instance.get_func(&mut *store, name).is_some()
    }

    /// モジュールバイナリのSHA-256ダイジェスト（hex）。
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// モジュールの取得元（URLまたはパス）。
    pub fn location(&self) -> &str {
        &self.location
    }
}

/// コンパイル済みモジュールをインスタンス化し、起動エクスポートを実行する。
///
/// バインディングサーフェスをモジュールの唯一のインポートとして登録する。
/// インポートが満たされない場合はリンクエラーが伝播する。
pub(crate) fn instantiate(
    engine: &Engine,
    compiled: &CompiledModule,
    binding: &dyn BindingSurface,
) -> Result<ExportTable, LoaderError> {
    let mut store = Store::new(engine, ());
    let mut linker: Linker<()> = Linker::new(engine);
    binding.register(&mut linker)?;

    let instance = linker
        .instantiate(&mut store, &compiled.module)
        .map_err(|e| LoaderError::Instantiate(e.to_string()))?;

    // 起動エクスポートをちょうど一度だけ実行する。
    // 失敗した場合はエクスポート表を返さない。
    let start = instance
        .get_func(&mut store, STARTUP_EXPORT_NAME)
        .ok_or_else(|| LoaderError::Startup {
            name: STARTUP_EXPORT_NAME.to_string(),
            reason: "エクスポートが見つかりません".to_string(),
        })?;
    let start = start
        .typed::<(), ()>(&store)
        .map_err(|e| LoaderError::Startup {
            name: STARTUP_EXPORT_NAME.to_string(),
            reason: e.to_string(),
        })?;
    start.call(&mut store, ()).map_err(|e| LoaderError::Startup {
        name: STARTUP_EXPORT_NAME.to_string(),
        reason: e.to_string(),
    })?;

    Ok(ExportTable {
        store: Mutex::new(store),
        instance,
        digest: compiled.digest.clone(),
        location: compiled.location.clone(),
    })
}
