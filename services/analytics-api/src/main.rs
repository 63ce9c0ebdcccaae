//! 投稿メトリクス集計用の読み取り専用HTTP APIサーバー
//!
//! 本バイナリは以下の機能を提供する:
//! - ステータス確認 (GET /)
//! - アカウント一覧 (GET /accounts)
//! - アカウント別集計の一覧 (GET /accounts/summary)
//! - アカウントの投稿一覧 (GET /posts/{account})
//! - アカウントの集計値 (GET /stats/{account})
//! - 日別再生数 (GET /daily-views/{account})
//! - 上位投稿 (GET /top-posts/{account})
//!
//! データは外部のSupabase（PostgREST）から都度取得し、プロセス内に状態を持たない。

mod aggregation;
mod config;
mod error;
mod logging;
mod post;
mod repository;
mod supabase;

pub use config::{ApiConfig, ConfigError, SupabaseConfig};
pub use error::ApiError;
pub use post::{AccountStats, DailyViews, Post, PostOrder, SortMetric};
pub use repository::{PostRepository, PostRepositoryError};
pub use supabase::SupabasePostRepository;

use aggregation::{DateWindow, DEFAULT_DAILY_VIEWS_DAYS};
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::HeaderValue,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// ルートエンドポイントのメッセージ
const ROOT_MESSAGE: &str = "TikTok Analytics API";

/// 投稿一覧のデフォルト件数
const DEFAULT_POSTS_LIMIT: u32 = 50;

/// 上位投稿のデフォルト件数
const DEFAULT_TOP_POSTS_LIMIT: u32 = 10;

/// アプリケーション状態
///
/// ルーター全体で共有される状態を保持する。リクエスト間で可変状態は共有しない。
#[derive(Clone)]
pub struct AppState {
    /// 投稿リポジトリ
    pub repository: Arc<dyn PostRepository>,
    /// 現在時刻の取得関数（日別集計の期間計算に使用）
    pub clock: fn() -> DateTime<Utc>,
}

impl AppState {
    /// 新しいAppStateを作成（時刻はシステム時計）
    pub fn new(repository: Arc<dyn PostRepository>) -> Self {
        Self {
            repository,
            clock: Utc::now,
        }
    }

    /// 時刻取得関数を差し替える
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }
}

/// 投稿一覧のクエリパラメータ
#[derive(Debug, Deserialize)]
pub struct PostsParams {
    #[serde(default = "default_posts_limit")]
    pub limit: u32,
}

fn default_posts_limit() -> u32 {
    DEFAULT_POSTS_LIMIT
}

/// 日別再生数のクエリパラメータ
#[derive(Debug, Deserialize)]
pub struct DailyViewsParams {
    #[serde(default = "default_daily_views_days")]
    pub days: u32,
}

fn default_daily_views_days() -> u32 {
    DEFAULT_DAILY_VIEWS_DAYS
}

/// 上位投稿のクエリパラメータ
///
/// `sort_by`は文字列のまま受け取り、ハンドラー内で検証する。
#[derive(Debug, Deserialize)]
pub struct TopPostsParams {
    #[serde(default = "default_top_posts_limit")]
    pub limit: u32,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
}

fn default_top_posts_limit() -> u32 {
    DEFAULT_TOP_POSTS_LIMIT
}

fn default_sort_by() -> String {
    SortMetric::Views.as_str().to_string()
}

/// クエリパラメータの抽出結果を取り出す
///
/// 抽出に失敗した場合は`{error, message}`形式の400レスポンスを返す。
fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    params.map(|Query(params)| params).map_err(|rejection| {
        tracing::warn!(error = %rejection, "不正なクエリパラメータ");
        ApiError::from(rejection).into_response()
    })
}

/// ステータス確認エンドポイント (GET /)
async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": ROOT_MESSAGE }))
}

/// アカウント一覧エンドポイント (GET /accounts)
///
/// 全行の`account`カラムを取得し、重複を除いて昇順で返す。
///
/// # Returns
/// - 200 OK: アカウント名の配列
/// - 500 Internal Server Error: ストアエラー
async fn list_accounts(State(state): State<AppState>) -> Response {
    tracing::info!("アカウント一覧リクエストを受信");

    match state.repository.account_names().await {
        Ok(names) => {
            let accounts = aggregation::distinct_sorted_accounts(names);
            tracing::info!(count = accounts.len(), "アカウント一覧を返却");
            Json(accounts).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "アカウント一覧取得エラー");
            ApiError::store_failure("アカウント取得エラー", &e).into_response()
        }
    }
}

/// アカウント別集計一覧エンドポイント (GET /accounts/summary)
///
/// 全投稿を取得し、アカウントごとの集計値をアカウント名順で返す。
///
/// # Returns
/// - 200 OK: AccountStatsの配列
/// - 500 Internal Server Error: ストアエラー
async fn accounts_summary(State(state): State<AppState>) -> Response {
    tracing::info!("アカウント別集計一覧リクエストを受信");

    match state.repository.all_posts().await {
        Ok(posts) => {
            let summary = aggregation::summarize_accounts(posts);
            tracing::info!(count = summary.len(), "アカウント別集計一覧を返却");
            Json(summary).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "アカウント別集計取得エラー");
            ApiError::store_failure("アカウント集計取得エラー", &e).into_response()
        }
    }
}

/// 投稿一覧エンドポイント (GET /posts/{account})
///
/// 作成日時の新しい順に最大`limit`件（デフォルト50）を返す。
///
/// # Returns
/// - 200 OK: Postの配列
/// - 400 Bad Request: `limit`が非負整数でない（JSON形式のエラー）
/// - 500 Internal Server Error: ストアエラー
async fn posts_by_account(
    State(state): State<AppState>,
    Path(account): Path<String>,
    params: Result<Query<PostsParams>, QueryRejection>,
) -> Response {
    let params = match query_params(params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    tracing::info!(account = %account, limit = params.limit, "投稿一覧リクエストを受信");

    match state
        .repository
        .posts_by_account(&account, Some(PostOrder::Newest), Some(params.limit))
        .await
    {
        Ok(posts) => {
            tracing::info!(account = %account, count = posts.len(), "投稿一覧を返却");
            Json(posts).into_response()
        }
        Err(e) => {
            tracing::error!(account = %account, error = %e, "投稿一覧取得エラー");
            ApiError::store_failure("投稿取得エラー", &e).into_response()
        }
    }
}

/// 集計値エンドポイント (GET /stats/{account})
///
/// # Returns
/// - 200 OK: AccountStats
/// - 404 Not Found: アカウントの投稿が存在しない
/// - 500 Internal Server Error: ストアエラー
async fn account_stats(State(state): State<AppState>, Path(account): Path<String>) -> Response {
    tracing::info!(account = %account, "集計値リクエストを受信");

    let posts = match state.repository.posts_by_account(&account, None, None).await {
        Ok(posts) => posts,
        Err(e) => {
            tracing::error!(account = %account, error = %e, "集計値取得エラー");
            return ApiError::store_failure("統計取得エラー", &e).into_response();
        }
    };

    if posts.is_empty() {
        tracing::warn!(account = %account, "投稿が存在しないアカウント");
        return ApiError::not_found(format!("アカウントが見つかりません: {}", account))
            .into_response();
    }

    let stats = aggregation::account_stats(&account, &posts);
    tracing::info!(
        account = %account,
        total_posts = stats.total_posts,
        total_views = stats.total_views,
        "集計値を返却"
    );
    Json(stats).into_response()
}

/// 日別再生数エンドポイント (GET /daily-views/{account})
///
/// 現在時刻から`days`日前（デフォルト30）までの期間について、
/// 1日1件・昇順で再生数を返す。データの無い日は0。
///
/// # Returns
/// - 200 OK: `{date, views}`の配列（days + 1件）
/// - 400 Bad Request: `days`が非負整数でない、または期間の開始が西暦1年より前
/// - 500 Internal Server Error: ストアエラー
async fn daily_views(
    State(state): State<AppState>,
    Path(account): Path<String>,
    params: Result<Query<DailyViewsParams>, QueryRejection>,
) -> Response {
    let params = match query_params(params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    tracing::info!(account = %account, days = params.days, "日別再生数リクエストを受信");

    let now = (state.clock)();
    let Some(window) = DateWindow::ending_at(now, params.days) else {
        tracing::warn!(days = params.days, "日数が範囲外");
        return ApiError::bad_request(format!("日数が範囲外です: {}", params.days))
            .into_response();
    };

    match state
        .repository
        .view_records(&account, window.start(), window.end())
        .await
    {
        Ok(records) => {
            let result = aggregation::daily_views(&records, &window);
            tracing::info!(
                account = %account,
                record_count = records.len(),
                day_count = result.len(),
                "日別再生数を返却"
            );
            Json(result).into_response()
        }
        Err(e) => {
            tracing::error!(account = %account, error = %e, "日別再生数取得エラー");
            ApiError::store_failure("日別再生数取得エラー", &e).into_response()
        }
    }
}

/// 上位投稿エンドポイント (GET /top-posts/{account})
///
/// `sort_by`（views/likes/comments/shares、デフォルトviews）の降順で
/// 最大`limit`件（デフォルト10）を返す。`sort_by`はストアへ問い合わせる前に検証する。
///
/// # Returns
/// - 200 OK: Postの配列
/// - 400 Bad Request: `sort_by`が不正
/// - 500 Internal Server Error: ストアエラー
async fn top_posts(
    State(state): State<AppState>,
    Path(account): Path<String>,
    params: Result<Query<TopPostsParams>, QueryRejection>,
) -> Response {
    let params = match query_params(params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    tracing::info!(
        account = %account,
        limit = params.limit,
        sort_by = %params.sort_by,
        "上位投稿リクエストを受信"
    );

    let metric = match params.sort_by.parse::<SortMetric>() {
        Ok(metric) => metric,
        Err(e) => {
            tracing::warn!(sort_by = %params.sort_by, "不正な並び替え指標");
            return ApiError::bad_request(e.to_string()).into_response();
        }
    };

    match state
        .repository
        .posts_by_account(&account, Some(PostOrder::Top(metric)), Some(params.limit))
        .await
    {
        Ok(posts) => {
            tracing::info!(account = %account, count = posts.len(), "上位投稿を返却");
            Json(posts).into_response()
        }
        Err(e) => {
            tracing::error!(account = %account, error = %e, "上位投稿取得エラー");
            ApiError::store_failure("上位投稿取得エラー", &e).into_response()
        }
    }
}

/// CORSレイヤーを構築する
///
/// 許可オリジンのみ資格情報付きリクエストを許可し、メソッドとヘッダーはリクエストをミラーする。
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "不正なCORSオリジンを無視");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// ルーターを構築する
///
/// 全エンドポイントのルーティングを定義し、CORSとリクエストトレーシングを適用する。
///
/// # Arguments
/// * `state` - アプリケーション状態
/// * `cors_origins` - CORS許可オリジン
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/accounts", get(list_accounts))
        .route("/accounts/summary", get(accounts_summary))
        .route("/posts/{account}", get(posts_by_account))
        .route("/stats/{account}", get(account_stats))
        .route("/daily-views/{account}", get(daily_views))
        .route("/top-posts/{account}", get(top_posts))
        .layer(cors_layer(cors_origins))
        // リクエストトレーシングレイヤー（method, path, status, latencyを自動記録）
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// シャットダウンシグナルを待機する
///
/// SIGTERMまたはCtrl+C (SIGINT) を待機し、いずれかを受信したらリターンする。
///
/// # Panics
/// シグナルハンドラーの登録に失敗した場合はパニックする。
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Ctrl+C シグナルハンドラーの登録に失敗しました");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM シグナルハンドラーの登録に失敗しました")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C (SIGINT) を受信しました。graceful shutdownを開始します");
        }
        _ = terminate => {
            tracing::info!("SIGTERM を受信しました。graceful shutdownを開始します");
        }
    }
}

/// メイン関数
///
/// .envファイルと環境変数から設定を読み込み、HTTPサーバーを起動する。
/// 必須の環境変数が無い場合は起動しない。
///
/// # 環境変数
/// - `SUPABASE_URL`: SupabaseのベースURL（必須）
/// - `SUPABASE_ANON_KEY`: アクセスキー（必須）
/// - `POSTS_TABLE`: 投稿テーブル名（デフォルト: tiktok_raw）
/// - `BIND_ADDR`: リッスンアドレス（デフォルト: 0.0.0.0:8000）
/// - `CORS_ALLOWED_ORIGINS`: CORS許可オリジン（カンマ区切り）
/// - `RUST_LOG`: ログレベル（デフォルト: info）
#[tokio::main]
async fn main() {
    // .envファイルは任意
    dotenvy::dotenv().ok();

    logging::init_logging();

    tracing::info!("Analytics API サーバーを起動します");

    let config = ApiConfig::from_env()
        .unwrap_or_else(|e| panic!("設定の読み込みに失敗しました: {}", e));
    tracing::info!(
        supabase = ?config.supabase,
        cors_origins = ?config.cors_origins,
        "設定を読み込みました"
    );

    let repository = SupabasePostRepository::new(config.supabase.clone())
        .unwrap_or_else(|e| panic!("Supabaseリポジトリの初期化に失敗しました: {}", e));

    let state = AppState::new(Arc::new(repository));
    let app = create_router(state, &config.cors_origins);

    tracing::info!("リッスン開始: {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("アドレスのバインドに失敗しました");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("サーバーの起動に失敗しました");

    tracing::info!("サーバーが正常に停止しました");
}
