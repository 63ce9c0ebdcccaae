// Supabase投稿リポジトリ - PostRepository実装
//
// SupabaseのPostgREST HTTPインターフェースに接続して投稿テーブルを読み取る。
// 等価フィルター、範囲フィルター、並び替え、件数制限をクエリパラメータで指定する。

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, info, instrument};

use crate::config::SupabaseConfig;
use crate::post::{Post, PostOrder, ViewRecord};
use crate::repository::{PostRepository, PostRepositoryError};

/// リクエストタイムアウト（秒）
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// 接続タイムアウト（秒）
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// PostgRESTクエリ
///
/// `select`、フィルター、`order`、`limit`をクエリパラメータとして保持する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgrestQuery {
    params: Vec<(String, String)>,
}

impl PostgrestQuery {
    /// 取得カラムを指定してクエリを開始
    pub fn select(columns: &str) -> Self {
        Self {
            params: vec![("select".to_string(), columns.to_string())],
        }
    }

    fn filter(mut self, column: &str, operator: &str, value: impl Display) -> Self {
        self.params
            .push((column.to_string(), format!("{}.{}", operator, value)));
        self
    }

    /// `column = value`
    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "eq", value)
    }

    /// `column >= value`
    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "gte", value)
    }

    /// `column <= value`
    pub fn lte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "lte", value)
    }

    /// 降順に並び替え
    pub fn order_desc(mut self, column: &str) -> Self {
        self.params
            .push(("order".to_string(), format!("{}.desc", column)));
        self
    }

    /// 最大件数
    pub fn limit(mut self, limit: u32) -> Self {
        self.params.push(("limit".to_string(), limit.to_string()));
        self
    }

    /// クエリパラメータを取得
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// タイムスタンプをPostgRESTの範囲フィルター用にフォーマット
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `account`カラムのみの行
#[derive(Debug, Deserialize)]
struct AccountRow {
    account: String,
}

/// Supabase投稿リポジトリ
///
/// PostgRESTエンドポイントに接続してクエリを実行する。
/// `apikey`ヘッダーとAuthorizationヘッダーにアクセスキーを付与する。
#[derive(Clone)]
pub struct SupabasePostRepository {
    /// HTTPクライアント
    client: Client,
    /// 設定
    config: SupabaseConfig,
}

impl std::fmt::Debug for SupabasePostRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabasePostRepository")
            .field("url", &self.config.url())
            .field("table", &self.config.table())
            .finish_non_exhaustive()
    }
}

impl SupabasePostRepository {
    /// 設定からSupabasePostRepositoryを作成
    ///
    /// # 引数
    /// * `config` - Supabase接続設定
    ///
    /// # 戻り値
    /// * `Ok(SupabasePostRepository)` - 初期化されたリポジトリ
    /// * `Err(PostRepositoryError::ClientBuildError)` - HTTPクライアントの構築に失敗
    pub fn new(config: SupabaseConfig) -> Result<Self, PostRepositoryError> {
        info!(
            url = config.url(),
            table = config.table(),
            "SupabasePostRepositoryを初期化"
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| PostRepositoryError::ClientBuildError(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// クエリを実行して行をデシリアライズ
    ///
    /// # 戻り値
    /// * `Ok(Vec<T>)` - 行の配列
    /// * `Err(PostRepositoryError)` - 通信・ステータス・デシリアライズのエラー
    async fn execute<T: DeserializeOwned>(
        &self,
        query: &PostgrestQuery,
    ) -> Result<Vec<T>, PostRepositoryError> {
        let url = self.config.table_url();

        debug!(url = %url, params = ?query.params(), "クエリを送信");

        let response = self
            .client
            .get(&url)
            .header("apikey", self.config.api_key())
            .header("Authorization", format!("Bearer {}", self.config.api_key()))
            .header("Accept", "application/json")
            .query(query.params())
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "HTTPリクエスト送信に失敗");
                if e.is_connect() || e.is_timeout() {
                    PostRepositoryError::ConnectionError(e.to_string())
                } else {
                    PostRepositoryError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            error!(status = %status, "認証エラー: アクセスキーが無効です");
            return Err(PostRepositoryError::AuthenticationError);
        }

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "サーバーエラー");
            return Err(PostRepositoryError::ServerError(format!(
                "ステータス {}: {}",
                status, body
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "HTTPエラー");
            return Err(PostRepositoryError::HttpError(format!(
                "ステータス {}: {}",
                status, body
            )));
        }

        let rows: Vec<T> = response.json().await.map_err(|e| {
            error!(error = %e, "レスポンスのデシリアライズに失敗");
            PostRepositoryError::DeserializationError(e.to_string())
        })?;

        debug!(row_count = rows.len(), "クエリが完了");

        Ok(rows)
    }
}

#[async_trait]
impl PostRepository for SupabasePostRepository {
    #[instrument(skip(self), fields(table = %self.config.table()))]
    async fn account_names(&self) -> Result<Vec<String>, PostRepositoryError> {
        let query = PostgrestQuery::select("account");
        let rows: Vec<AccountRow> = self.execute(&query).await?;
        Ok(rows.into_iter().map(|row| row.account).collect())
    }

    #[instrument(skip(self), fields(table = %self.config.table()))]
    async fn all_posts(&self) -> Result<Vec<Post>, PostRepositoryError> {
        self.execute(&PostgrestQuery::select("*")).await
    }

    #[instrument(skip(self), fields(table = %self.config.table()))]
    async fn posts_by_account(
        &self,
        account: &str,
        order: Option<PostOrder>,
        limit: Option<u32>,
    ) -> Result<Vec<Post>, PostRepositoryError> {
        let mut query = PostgrestQuery::select("*").eq("account", account);
        if let Some(order) = order {
            query = query.order_desc(order.column());
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        self.execute(&query).await
    }

    #[instrument(skip(self), fields(table = %self.config.table()))]
    async fn view_records(
        &self,
        account: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ViewRecord>, PostRepositoryError> {
        let query = PostgrestQuery::select("views,created_at")
            .eq("account", account)
            .gte("created_at", format_timestamp(since))
            .lte("created_at", format_timestamp(until));
        self.execute(&query).await
    }
}
