//! # HTTPモジュールソース
//!
//! URL経由でモジュールバイナリを取得する。
//!
//! ストリーミング取得を優先し、使用可能なストリームを得られない場合は
//! 一括取得へフォールバックする。成功ステータス以外のレスポンスは
//! URLを含むエラーとして失敗させる。

use std::time::Duration;

use async_trait::async_trait;

use super::{ByteStream, FetchPayload, ModuleBytes, ModuleSource};
use crate::error::LoaderError;

/// HTTP取得のタイムアウト
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// URL経由でモジュールバイナリを取得するソース。
#[derive(Debug)]
pub struct HttpSource {
    client: reqwest::Client,
    url: reqwest::Url,
    /// ストリーミング取得を試みるか
    streaming: bool,
}

impl HttpSource {
    /// 新しいHttpSourceを作成する。既定でストリーミング取得を優先する。
    pub fn new(url: &str) -> Result<Self, LoaderError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| LoaderError::Fetch {
            location: url.to_string(),
            reason: format!("URLの解析に失敗: {e}"),
        })?;
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| LoaderError::Fetch {
                location: url.to_string(),
                reason: format!("HTTPクライアントの構築に失敗: {e}"),
            })?;
        Ok(Self {
            client,
            url: parsed,
            streaming: true,
        })
    }

    /// ストリーミング取得を無効化し、常に一括取得する。
    /// ストリーミングコンパイルが利用できないホスト用。
    pub fn buffered_only(mut self) -> Self {
        self.streaming = false;
        self
    }

    /// GETリクエストを送信し、成功ステータスを確認する。
    async fn send(&self) -> Result<reqwest::Response, LoaderError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| LoaderError::Fetch {
                location: self.url.to_string(),
                reason: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoaderError::Fetch {
                location: self.url.to_string(),
                reason: format!("HTTPステータス {status}"),
            });
        }
        Ok(response)
    }

    /// レスポンス全体をバッファへ読み込む。
    async fn fetch_buffered(&self) -> Result<ModuleBytes, LoaderError> {
        let response = self.send().await?;
        let bytes = response.bytes().await.map_err(|e| LoaderError::Fetch {
            location: self.url.to_string(),
            reason: e.to_string(),
        })?;
        if bytes.is_empty() {
            return Err(LoaderError::Fetch {
                location: self.url.to_string(),
                reason: "空のレスポンス".to_string(),
            });
        }
        Ok(ModuleBytes {
            bytes: bytes.to_vec(),
            location: self.url.to_string(),
        })
    }
}

/// 受信中のHTTPレスポンスをチャンク列として公開する。
struct HttpStream {
    response: reqwest::Response,
    location: String,
}

#[async_trait]
impl ByteStream for HttpStream {
    fn location(&self) -> &str {
        &self.location
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, LoaderError> {
        let chunk = self.response.chunk().await.map_err(|e| LoaderError::Fetch {
            location: self.location.clone(),
            reason: e.to_string(),
        })?;
        Ok(chunk.map(|bytes| bytes.to_vec()))
    }
}

#[async_trait]
impl ModuleSource for HttpSource {
    fn location(&self) -> String {
        self.url.to_string()
    }

    async fn fetch(&self) -> Result<FetchPayload, LoaderError> {
        if self.streaming {
            match self.send().await {
                Ok(response) => {
                    return Ok(FetchPayload::Stream(Box::new(HttpStream {
                        response,
                        location: self.url.to_string(),
                    })));
                }
                Err(e) => {
                    // 使用可能なストリームを得られなかった場合のみ一括取得へ
                    // フォールバックする。それでも失敗すればそのエラーを返す。
                    tracing::warn!("ストリーミング取得に失敗、一括取得へフォールバック: {e}");
                }
            }
        }
        Ok(FetchPayload::Buffer(self.fetch_buffered().await?))
    }
}
