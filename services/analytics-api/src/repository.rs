//! 投稿リポジトリ
//!
//! 外部ストアへの読み取りクエリを抽象化するトレイトとエラー型。
//! 各操作はストアへの1回のクエリに対応する。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::post::{Post, PostOrder, ViewRecord};

/// PostRepositoryのエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PostRepositoryError {
    /// 接続エラー
    #[error("接続エラー: {0}")]
    ConnectionError(String),

    /// HTTPリクエストエラー（4xx等）
    #[error("HTTPリクエストエラー: {0}")]
    HttpError(String),

    /// 認証エラー（401/403）
    #[error("認証エラー: アクセスキーが無効です")]
    AuthenticationError,

    /// サーバーエラー（5xx）
    #[error("サーバーエラー: {0}")]
    ServerError(String),

    /// レスポンスのデシリアライズエラー
    #[error("レスポンスのデシリアライズエラー: {0}")]
    DeserializationError(String),

    /// クライアント構築エラー
    #[error("クライアント構築エラー: {0}")]
    ClientBuildError(String),
}

/// 投稿テーブルへの読み取り専用リポジトリ
///
/// Supabase実装とテスト用インメモリ実装の共通インターフェース。
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// 全行の`account`カラムを取得（重複を含む）
    async fn account_names(&self) -> Result<Vec<String>, PostRepositoryError>;

    /// 全投稿を取得
    async fn all_posts(&self) -> Result<Vec<Post>, PostRepositoryError>;

    /// アカウントの投稿を取得
    ///
    /// # 引数
    /// * `account` - アカウント名（完全一致）
    /// * `order` - 並び順（`None`の場合はストアの既定順）
    /// * `limit` - 最大件数（`None`の場合は無制限）
    async fn posts_by_account(
        &self,
        account: &str,
        order: Option<PostOrder>,
        limit: Option<u32>,
    ) -> Result<Vec<Post>, PostRepositoryError>;

    /// 期間内（両端を含む）に作成された投稿の再生数を取得
    async fn view_records(
        &self,
        account: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ViewRecord>, PostRepositoryError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// テスト用のインメモリPostRepository
    #[derive(Debug, Clone, Default)]
    pub struct MockPostRepository {
        /// 保存された投稿
        posts: Arc<Mutex<Vec<Post>>>,
        /// 次の操作で返すエラー（エラーパスのテスト用）
        next_error: Arc<Mutex<Option<PostRepositoryError>>>,
        /// クエリ実行回数
        query_count: Arc<Mutex<usize>>,
    }

    impl MockPostRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_posts(posts: Vec<Post>) -> Self {
            let repo = Self::new();
            *repo.posts.lock().unwrap() = posts;
            repo
        }

        pub fn set_next_error(&self, error: PostRepositoryError) {
            *self.next_error.lock().unwrap() = Some(error);
        }

        pub fn query_count(&self) -> usize {
            *self.query_count.lock().unwrap()
        }

        fn begin_query(&self) -> Result<Vec<Post>, PostRepositoryError> {
            *self.query_count.lock().unwrap() += 1;
            if let Some(error) = self.next_error.lock().unwrap().take() {
                return Err(error);
            }
            Ok(self.posts.lock().unwrap().clone())
        }
    }

    /// 作成日時をパース（タイムゾーン無しの場合はUTCとみなす）
    fn parse_created_at(value: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    #[async_trait]
    impl PostRepository for MockPostRepository {
        async fn account_names(&self) -> Result<Vec<String>, PostRepositoryError> {
            Ok(self.begin_query()?.into_iter().map(|p| p.account).collect())
        }

        async fn all_posts(&self) -> Result<Vec<Post>, PostRepositoryError> {
            self.begin_query()
        }

        async fn posts_by_account(
            &self,
            account: &str,
            order: Option<PostOrder>,
            limit: Option<u32>,
        ) -> Result<Vec<Post>, PostRepositoryError> {
            let mut result: Vec<Post> = self
                .begin_query()?
                .into_iter()
                .filter(|p| p.account == account)
                .collect();

            match order {
                Some(PostOrder::Newest) => {
                    result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                }
                Some(PostOrder::Top(metric)) => {
                    result.sort_by(|a, b| b.metric(metric).cmp(&a.metric(metric)));
                }
                None => {}
            }

            if let Some(limit) = limit {
                result.truncate(limit as usize);
            }

            Ok(result)
        }

        async fn view_records(
            &self,
            account: &str,
            since: DateTime<Utc>,
            until: DateTime<Utc>,
        ) -> Result<Vec<ViewRecord>, PostRepositoryError> {
            Ok(self
                .begin_query()?
                .into_iter()
                .filter(|p| p.account == account)
                .filter_map(|p| {
                    let created_at = p.created_at?;
                    let parsed = parse_created_at(&created_at)?;
                    (since <= parsed && parsed <= until).then_some(ViewRecord {
                        views: p.views,
                        created_at,
                    })
                })
                .collect())
        }
    }
}
