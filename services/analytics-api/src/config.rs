//! APIサーバー設定
//!
//! 環境変数からSupabase接続設定、リッスンアドレス、CORS許可オリジンを読み込む。

use std::net::SocketAddr;

use thiserror::Error;

/// Supabase URL環境変数名
pub const SUPABASE_URL_ENV: &str = "SUPABASE_URL";

/// Supabaseアクセスキー環境変数名
pub const SUPABASE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

/// 投稿テーブル名環境変数名
pub const POSTS_TABLE_ENV: &str = "POSTS_TABLE";

/// リッスンアドレス環境変数名
pub const BIND_ADDR_ENV: &str = "BIND_ADDR";

/// CORS許可オリジン環境変数名（カンマ区切り）
pub const CORS_ALLOWED_ORIGINS_ENV: &str = "CORS_ALLOWED_ORIGINS";

/// デフォルトの投稿テーブル名
pub const DEFAULT_POSTS_TABLE: &str = "tiktok_raw";

/// デフォルトのリッスンアドレス
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// デフォルトのCORS許可オリジン（ローカル開発用フロントエンド）
pub const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];

/// 設定エラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// 必須の環境変数が設定されていない
    #[error("必須の環境変数が設定されていません: {0}")]
    MissingEnvVar(String),

    /// 環境変数の値が不正
    #[error("環境変数 {name} の値が不正です: {value}")]
    InvalidValue { name: String, value: String },
}

/// Supabase接続設定
///
/// # フィールド
/// - `url`: SupabaseプロジェクトのベースURL (例: "https://xxx.supabase.co")
/// - `api_key`: アクセスキー（`apikey`ヘッダーとBearerトークンに使用）
/// - `table`: 投稿テーブル名
#[derive(Clone)]
pub struct SupabaseConfig {
    url: String,
    api_key: String,
    table: String,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl SupabaseConfig {
    /// 新しい設定を作成（テーブル名はデフォルト）
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            table: DEFAULT_POSTS_TABLE.to_string(),
        }
    }

    /// テーブル名を指定
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// テーブルのREST エンドポイントURLを構築
    ///
    /// # 戻り値
    /// 例: "https://xxx.supabase.co/rest/v1/tiktok_raw"
    pub fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url.trim_end_matches('/'), self.table)
    }
}

/// APIサーバー全体の設定
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub supabase: SupabaseConfig,
    pub bind_addr: SocketAddr,
    pub cors_origins: Vec<String>,
}

impl ApiConfig {
    /// 環境変数から設定を読み込み
    ///
    /// # 環境変数
    /// - `SUPABASE_URL`: SupabaseのベースURL（必須）
    /// - `SUPABASE_ANON_KEY`: アクセスキー（必須）
    /// - `POSTS_TABLE`: 投稿テーブル名（デフォルト: tiktok_raw）
    /// - `BIND_ADDR`: リッスンアドレス（デフォルト: 0.0.0.0:8000）
    /// - `CORS_ALLOWED_ORIGINS`: カンマ区切りの許可オリジン（デフォルト: localhost:3000の2件）
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = required_env(SUPABASE_URL_ENV)?;
        let api_key = required_env(SUPABASE_ANON_KEY_ENV)?;

        let mut supabase = SupabaseConfig::new(url, api_key);
        if let Some(table) = optional_env(POSTS_TABLE_ENV) {
            supabase = supabase.with_table(table);
        }

        let bind_addr_raw =
            optional_env(BIND_ADDR_ENV).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                name: BIND_ADDR_ENV.to_string(),
                value: bind_addr_raw.clone(),
            })?;

        let cors_origins = optional_env(CORS_ALLOWED_ORIGINS_ENV)
            .map(|raw| parse_origins(&raw))
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect());

        Ok(Self {
            supabase,
            bind_addr,
            cors_origins,
        })
    }
}

/// 必須の環境変数を取得（空文字は未設定とみなす）
fn required_env(name: &str) -> Result<String, ConfigError> {
    optional_env(name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// カンマ区切りのオリジン一覧をパース
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
