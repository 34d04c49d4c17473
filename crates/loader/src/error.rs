//! # ローダーエラー型
//!
//! ローダー全体で共通のエラー型。
//! どのエラーも握りつぶさず、初期化を起動した呼び出し元まで伝播させる。

/// ローダーエラー型。
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// 初期化前にエクスポートへアクセスした
    #[error(
        "モジュールが未初期化です。先に Loader::init() (非同期) または \
         Loader::init_blocking() (同期) を呼び出してください"
    )]
    NotInitialized,
    /// モジュールバイナリの取得に失敗（ネットワーク・ファイルシステム）
    #[error("モジュールバイナリの取得に失敗 ({location}): {reason}")]
    Fetch {
        /// 取得先（URLまたはパス）
        location: String,
        /// 失敗の内容
        reason: String,
    },
    /// モジュールバイナリのコンパイルに失敗（不正なバイナリ、非対応バージョン）
    #[error("モジュールのコンパイルに失敗 ({location}): {reason}")]
    Compile {
        /// 取得先（URLまたはパス）
        location: String,
        /// 失敗の内容
        reason: String,
    },
    /// インスタンス化・リンクに失敗（インポート不一致）。
    /// バインディング層とモジュールバイナリのパッケージング不整合を示す。
    #[error("モジュールのインスタンス化に失敗: {0}")]
    Instantiate(String),
    /// 起動エクスポートの実行に失敗（欠落またはトラップ）。
    /// インスタンス化失敗として扱い、エクスポート表は公開されない。
    #[error("起動エクスポート {name} の実行に失敗: {reason}")]
    Startup {
        /// 起動エクスポート名
        name: String,
        /// 失敗の内容
        reason: String,
    },
    /// エクスポートが見つからない
    #[error("エクスポート {name} が見つかりません")]
    ExportNotFound {
        /// 要求されたエクスポート名
        name: String,
    },
    /// エクスポート呼び出しに失敗（トラップ、引数型の不一致）
    #[error("エクスポート {name} の呼び出しに失敗: {reason}")]
    Call {
        /// 呼び出したエクスポート名
        name: String,
        /// 失敗の内容
        reason: String,
    },
}
