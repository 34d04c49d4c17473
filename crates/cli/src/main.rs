//! # Hatch CLI
//!
//! モジュールを取得・初期化し、エクスポートを呼び出す操作ツール。
//!
//! ## 使い方
//! ```text
//! hatch https://example.com/module.wasm --call add --arg 2 --arg 3
//! hatch ./module.wasm --call answer
//! ```

use std::sync::Arc;

use clap::Parser;

use hatch_loader::wasmtime::Val;
use hatch_loader::{
    ExportTable, FileSource, HttpSource, Loader, NullBindings, DEFAULT_MODULE_FILE_NAME,
};

/// コマンドライン引数
#[derive(Parser)]
#[command(name = "hatch", about = "ポータブルモジュールのブートストラップローダー")]
struct Args {
    /// モジュールの場所（URLまたはファイルパス）。
    /// 省略時は実行ファイルと同じディレクトリの module.wasm を読む。
    module: Option<String>,
    /// 初期化後に呼び出すエクスポート名
    #[arg(long)]
    call: Option<String>,
    /// 呼び出しに渡すi32引数（複数指定可）
    #[arg(long = "arg")]
    args: Vec<i32>,
    /// ストリーミング取得を無効化し、常に一括取得する
    #[arg(long)]
    buffered: bool,
}

/// 結果値をJSONへ変換する。
fn val_to_json(val: &Val) -> serde_json::Value {
    match val {
        Val::I32(v) => serde_json::json!(v),
        Val::I64(v) => serde_json::json!(v),
        Val::F32(bits) => serde_json::json!(f32::from_bits(*bits)),
        Val::F64(bits) => serde_json::json!(f64::from_bits(*bits)),
        other => serde_json::json!(format!("{other:?}")),
    }
}

/// エクスポートを呼び出し、結果をJSON配列として出力する。
fn invoke_and_print(table: &ExportTable, name: &str, args: &[i32]) -> anyhow::Result<()> {
    let params: Vec<Val> = args.iter().map(|&v| Val::I32(v)).collect();
    let results = table.invoke(name, &params)?;
    let json: Vec<serde_json::Value> = results.iter().map(val_to_json).collect();
    println!("{}", serde_json::Value::Array(json));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Args::parse();
    let binding = Arc::new(NullBindings);

    // URLならHTTP取得、パスならファイル読み込み（非同期）、
    // 省略時はローダー自身の設置場所から解決する
    let table = match &cli.module {
        Some(location)
            if location.starts_with("http://") || location.starts_with("https://") =>
        {
            let mut source = HttpSource::new(location)?;
            if cli.buffered {
                source = source.buffered_only();
            }
            Loader::new(source, binding).init().await?
        }
        Some(path) => Loader::new(FileSource::new(path), binding).init().await?,
        None => {
            let source = FileSource::beside_executable(DEFAULT_MODULE_FILE_NAME)?;
            Loader::new(source, binding).init().await?
        }
    };

    tracing::info!(
        "モジュール初期化完了 ({}, digest: {})",
        table.location(),
        table.digest()
    );

    if let Some(name) = &cli.call {
        invoke_and_print(&table, name, &cli.args)?;
    }

    Ok(())
}
