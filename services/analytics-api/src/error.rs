//! APIエラーハンドリング
//!
//! 統一されたエラーレスポンス形式を提供する。
//! すべてのエラーはJSON形式で返却され、`error`と`message`フィールドを含む。

use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::repository::PostRepositoryError;

/// APIエラーレスポンスのボディ
///
/// JSON形式で`error`（エラー種別）と`message`（詳細メッセージ）を含む。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiErrorBody {
    /// エラー種別（"bad_request", "not_found", "internal_error"）
    pub error: String,
    /// 詳細なエラーメッセージ
    pub message: String,
}

/// APIエラー
///
/// ステータスコードとJSON形式のエラーボディを含む。
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

impl ApiError {
    /// 新しいApiErrorを作成
    pub fn new(status: StatusCode, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                error: error.into(),
                message: message.into(),
            },
        }
    }

    /// 400 Bad Requestエラーを作成
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    /// 404 Not Foundエラーを作成
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// 500 Internal Server Errorを作成
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    /// ストアエラーから500エラーを作成
    ///
    /// `context`の後ろに元のエラーメッセージを埋め込む。
    pub fn store_failure(context: &str, err: &PostRepositoryError) -> Self {
        Self::internal_error(format!("{}: {}", context, err))
    }

    pub fn error(&self) -> &str {
        &self.body.error
    }

    pub fn message(&self) -> &str {
        &self.body.message
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// クエリパラメータの抽出失敗は400として他のエラーと同じJSON形式で返す
impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!(
            "不正なクエリパラメータです: {}",
            rejection.body_text()
        ))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
