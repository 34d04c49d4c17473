//! # モジュールローダー
//!
//! 取得 → コンパイル → インスタンス化 → 起動を束ねるコンテキストオブジェクト。
//! プロセスグローバルな状態は持たず、組み込み側がローダーを所有する。
//!
//! ## ライフサイクル保証
//! - コンパイルはローダーごとに最大一度。同時初期化は直列化され、
//!   一度の取得・コンパイル・インスタンス化に集約される。
//! - ライブエクスポートスロットは初期化成功時にちょうど一度だけ
//!   `Ready` に遷移し、以後戻らない。
//! - 取得・コンパイルの失敗はキャッシュされず、再試行できる。

use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;
use wasmtime::Engine;

use crate::binding::BindingSurface;
use crate::compiler::{self, CompiledModule};
use crate::error::LoaderError;
use crate::instance::{self, ExportTable};
use crate::source::{BlockingModuleSource, ModuleSource};

/// ライブエクスポートスロット。
/// 未初期化の間はあらゆるアクセスを未初期化エラーで失敗させる。
enum ExportsSlot {
    /// 未初期化。アクセスは全て失敗する。
    Uninitialized,
    /// 初期化済み。以後この状態から戻らない。
    Ready(Arc<ExportTable>),
}

/// モジュールローダー。
///
/// バイトソース `S` の実装するトレイトが初期化経路を決める:
/// `ModuleSource`（非同期）なら [`Loader::init`]、
/// `BlockingModuleSource`（同期）なら [`Loader::init_blocking`] と
/// 自動ロードの [`Loader::exports_or_load`] が使える。
pub struct Loader<S> {
    engine: Engine,
    source: S,
    binding: Arc<dyn BindingSurface>,
    /// コンパイル済みモジュールのキャッシュ。成功時のみ書き込まれる。
    module: OnceCell<CompiledModule>,
    /// 初回初期化を直列化するロック。
    /// 同期経路は `blocking_lock` を使うため、同期経路を非同期
    /// ランタイム上で呼び出してはならない。
    init_lock: tokio::sync::Mutex<()>,
    /// ライブエクスポートスロット
    exports: RwLock<ExportsSlot>,
}

impl<S> Loader<S> {
    /// 新しいローダーを作成する。スロットは未初期化状態で始まる。
    pub fn new(source: S, binding: Arc<dyn BindingSurface>) -> Self {
        Self {
            engine: Engine::default(),
            source,
            binding,
            module: OnceCell::new(),
            init_lock: tokio::sync::Mutex::new(()),
            exports: RwLock::new(ExportsSlot::Uninitialized),
        }
    }

    /// バイトソースへの参照。
    pub fn source(&self) -> &S {
        &self.source
    }

    /// 初期化が完了しているか。
    pub fn is_initialized(&self) -> bool {
        matches!(*self.exports.read().unwrap(), ExportsSlot::Ready(_))
    }

    /// エクスポート表を返す。未初期化の間は初期化手順を示すエラーで失敗する。
    pub fn exports(&self) -> Result<Arc<ExportTable>, LoaderError> {
        self.ready_exports().ok_or(LoaderError::NotInitialized)
    }

    fn ready_exports(&self) -> Option<Arc<ExportTable>> {
        match &*self.exports.read().unwrap() {
            ExportsSlot::Ready(table) => Some(table.clone()),
            ExportsSlot::Uninitialized => None,
        }
    }

    /// エクスポート表をスロットへ設置する。未初期化の場合のみ遷移し、
    /// 一度設置された表が置き換わることはない。
    fn install(&self, table: Arc<ExportTable>) {
        let mut slot = self.exports.write().unwrap();
        if matches!(*slot, ExportsSlot::Uninitialized) {
            *slot = ExportsSlot::Ready(table);
        }
    }

    /// インスタンス化と起動を行い、成功したらスロットへ設置する。
    /// 呼び出し元は初期化ロックを保持していること。
    fn instantiate_and_install(
        &self,
        compiled: &CompiledModule,
    ) -> Result<Arc<ExportTable>, LoaderError> {
        let table = Arc::new(instance::instantiate(
            &self.engine,
            compiled,
            self.binding.as_ref(),
        )?);
        self.install(table.clone());
        tracing::info!(
            digest = %table.digest(),
            "モジュールの初期化完了 ({})",
            table.location()
        );
        Ok(table)
    }
}

impl<S: ModuleSource> Loader<S> {
    /// モジュールを非同期に初期化する。
    ///
    /// 取得 → コンパイル → インスタンス化 → 起動を順に行い、
    /// スロットが `Ready` になってから解決する。二度目以降の呼び出しは
    /// キャッシュ済みの結果を返すだけで、作業は繰り返されない。
    pub async fn init(&self) -> Result<Arc<ExportTable>, LoaderError> {
        if let Some(table) = self.ready_exports() {
            return Ok(table);
        }
        let _guard = self.init_lock.lock().await;
        if let Some(table) = self.ready_exports() {
            return Ok(table);
        }

        let compiled = match self.module.get() {
            Some(compiled) => compiled,
            None => {
                tracing::info!("モジュールバイナリを取得中 ({})", self.source.location());
                let payload = self.source.fetch().await?;
                let compiled = compiler::compile_payload(&self.engine, payload).await?;
                self.module.get_or_init(|| compiled)
            }
        };
        self.instantiate_and_install(compiled)
    }
}

impl<S: BlockingModuleSource> Loader<S> {
    /// モジュールを同期に初期化する。呼び出しスレッドをブロックする。
    ///
    /// 非同期ランタイムのスレッド上では呼び出さないこと。
    pub fn init_blocking(&self) -> Result<Arc<ExportTable>, LoaderError> {
        if let Some(table) = self.ready_exports() {
            return Ok(table);
        }
        let _guard = self.init_lock.blocking_lock();
        if let Some(table) = self.ready_exports() {
            return Ok(table);
        }

        let compiled = match self.module.get() {
            Some(compiled) => compiled,
            None => {
                tracing::info!("モジュールバイナリを取得中 ({})", self.source.location());
                let binary = self.source.fetch()?;
                let compiled = compiler::compile(&self.engine, &binary)?;
                self.module.get_or_init(|| compiled)
            }
        };
        self.instantiate_and_install(compiled)
    }

    /// エクスポート表を返す。未初期化なら透過的に同期初期化を行う。
    ///
    /// 初回アクセスで競合した呼び出しは一度の初期化に集約され、
    /// 全員が同じエクスポート表を受け取る。
    pub fn exports_or_load(&self) -> Result<Arc<ExportTable>, LoaderError> {
        if let Some(table) = self.ready_exports() {
            return Ok(table);
        }
        self.init_blocking()
    }
}
