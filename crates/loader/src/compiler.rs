//! # モジュールコンパイラ
//!
//! モジュールバイナリ（バッファまたはチャンク列）を検証済みの
//! コンパイル済みモジュールへ変換する。
//!
//! ストリーミング取得の場合、ダウンロード完了を待たずにヘッダ
//! （マジックナンバーとバージョン）を検証し、不正なペイロードを
//! 早期に失敗させる。コンパイル自体は蓄積したバイナリ全体に対して行う。

use sha2::{Digest, Sha256};
use wasmtime::{Engine, Module};

use crate::error::LoaderError;
use crate::source::{FetchPayload, ModuleBytes};

/// WASMバイナリのマジックナンバー（"\0asm"）
const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];

/// 対応するWASMバイナリフォーマットのバージョン
const WASM_VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// ヘッダ長（マジックナンバー + バージョン）
const HEADER_LEN: usize = 8;

/// コンパイル済みモジュール。
/// 検証済みだがまだ実行可能ではない。ローダーのキャッシュが所有する。
#[derive(Debug)]
pub(crate) struct CompiledModule {
    /// コンパイル済みのwasmtimeモジュール
    pub module: Module,
    /// バイナリのSHA-256ダイジェスト（hex）
    pub digest: String,
    /// 取得元（URLまたはパス）
    pub location: String,
}

/// バイナリ先頭のマジックナンバーとバージョンを検証する。
fn validate_header(bytes: &[u8], location: &str) -> Result<(), LoaderError> {
    if bytes.len() < HEADER_LEN {
        return Err(LoaderError::Compile {
            location: location.to_string(),
            reason: format!("バイナリが短すぎます ({} バイト)", bytes.len()),
        });
    }
    if bytes[..4] != WASM_MAGIC {
        return Err(LoaderError::Compile {
            location: location.to_string(),
            reason: "マジックナンバーが一致しません".to_string(),
        });
    }
    if bytes[4..HEADER_LEN] != WASM_VERSION {
        return Err(LoaderError::Compile {
            location: location.to_string(),
            reason: format!(
                "非対応のバイナリフォーマットバージョン: {:?}",
                &bytes[4..HEADER_LEN]
            ),
        });
    }
    Ok(())
}

/// バイナリ全体のSHA-256ダイジェストをhex文字列で返す。
fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// バッファからモジュールをコンパイルする。
pub(crate) fn compile(
    engine: &Engine,
    binary: &ModuleBytes,
) -> Result<CompiledModule, LoaderError> {
    validate_header(&binary.bytes, &binary.location)?;
    let module = Module::new(engine, &binary.bytes).map_err(|e| LoaderError::Compile {
        location: binary.location.clone(),
        reason: e.to_string(),
    })?;
    Ok(CompiledModule {
        module,
        digest: digest_hex(&binary.bytes),
        location: binary.location.clone(),
    })
}

/// 取得結果からモジュールをコンパイルする。ストリーミング取得の場合は
/// チャンクを蓄積しながらヘッダを先行検証する。
pub(crate) async fn compile_payload(
    engine: &Engine,
    payload: FetchPayload,
) -> Result<CompiledModule, LoaderError> {
    match payload {
        FetchPayload::Buffer(binary) => compile(engine, &binary),
        FetchPayload::Stream(mut stream) => {
            let location = stream.location().to_string();
            let mut bytes = Vec::new();
            let mut header_checked = false;
            while let Some(chunk) = stream.next_chunk().await? {
                bytes.extend_from_slice(&chunk);
                // ダウンロード完了を待たずに不正なペイロードを検出する
                if !header_checked && bytes.len() >= HEADER_LEN {
                    validate_header(&bytes, &location)?;
                    header_checked = true;
                }
            }
            if bytes.is_empty() {
                return Err(LoaderError::Fetch {
                    location,
                    reason: "空のレスポンス".to_string(),
                });
            }
            compile(engine, &ModuleBytes { bytes, location })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::source::ByteStream;

    const EMPTY_MODULE_WAT: &str = r#"(module (func (export "noop")))"#;

    /// チャンク列を順に返すテスト用ストリーム。取り出した回数を数える。
    struct TestStream {
        chunks: VecDeque<Vec<u8>>,
        pulled: Arc<AtomicUsize>,
    }

    impl TestStream {
        fn new(chunks: Vec<Vec<u8>>) -> (Self, Arc<AtomicUsize>) {
            let pulled = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    chunks: chunks.into(),
                    pulled: pulled.clone(),
                },
                pulled,
            )
        }
    }

    #[async_trait::async_trait]
    impl ByteStream for TestStream {
        fn location(&self) -> &str {
            "mem://stream"
        }

        async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, LoaderError> {
            let chunk = self.chunks.pop_front();
            if chunk.is_some() {
                self.pulled.fetch_add(1, Ordering::SeqCst);
            }
            Ok(chunk)
        }
    }

    /// 正常なバイナリのコンパイルとダイジェスト計算を確認
    #[test]
    fn test_compile_valid_module() {
        let engine = Engine::default();
        let bytes = wat::parse_str(EMPTY_MODULE_WAT).unwrap();
        let expected_digest = digest_hex(&bytes);

        let compiled = compile(
            &engine,
            &ModuleBytes {
                bytes,
                location: "mem://valid".to_string(),
            },
        )
        .unwrap();

        assert_eq!(compiled.digest, expected_digest);
        assert_eq!(compiled.location, "mem://valid");
    }

    /// マジックナンバー不一致が取得元を含むエラーになることを確認
    #[test]
    fn test_compile_bad_magic() {
        let engine = Engine::default();
        let err = compile(
            &engine,
            &ModuleBytes {
                bytes: b"notwasm!".to_vec(),
                location: "mem://garbage".to_string(),
            },
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("mem://garbage"));
        assert!(message.contains("マジックナンバー"));
    }

    /// 非対応バージョンがエラーになることを確認
    #[test]
    fn test_compile_bad_version() {
        let engine = Engine::default();
        let err = compile(
            &engine,
            &ModuleBytes {
                bytes: b"\0asm\x02\0\0\0".to_vec(),
                location: "mem://future".to_string(),
            },
        )
        .unwrap_err();

        assert!(err.to_string().contains("バージョン"));
    }

    /// ヘッダより短いバイナリがエラーになることを確認
    #[test]
    fn test_compile_truncated() {
        let engine = Engine::default();
        let err = compile(
            &engine,
            &ModuleBytes {
                bytes: b"\0as".to_vec(),
                location: "mem://short".to_string(),
            },
        )
        .unwrap_err();

        assert!(err.to_string().contains("短すぎます"));
    }

    /// チャンク列からのコンパイルを確認
    #[tokio::test]
    async fn test_compile_stream() {
        let engine = Engine::default();
        let bytes = wat::parse_str(EMPTY_MODULE_WAT).unwrap();
        let mid = bytes.len() / 2;
        let (stream, _) = TestStream::new(vec![bytes[..mid].to_vec(), bytes[mid..].to_vec()]);

        let compiled = compile_payload(&engine, FetchPayload::Stream(Box::new(stream)))
            .await
            .unwrap();
        assert_eq!(compiled.digest, digest_hex(&bytes));
    }

    /// 不正なヘッダがストリーム全体を消費せずに検出されることを確認
    #[tokio::test]
    async fn test_compile_stream_rejects_header_early() {
        let engine = Engine::default();
        let (stream, pulled) = TestStream::new(vec![
            b"notwasm!".to_vec(),
            b"rest-of-payload".to_vec(),
            b"more".to_vec(),
        ]);

        let err = compile_payload(&engine, FetchPayload::Stream(Box::new(stream)))
            .await
            .unwrap_err();

        assert!(matches!(err, LoaderError::Compile { .. }));
        // 最初のチャンクで検証が走り、残りは取り出されない
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
    }

    /// 空のストリームがエラーになることを確認
    #[tokio::test]
    async fn test_compile_empty_stream() {
        let engine = Engine::default();
        let (stream, _) = TestStream::new(Vec::new());

        let err = compile_payload(&engine, FetchPayload::Stream(Box::new(stream)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("空のレスポンス"));
    }
}
