//! 投稿メトリクスの型定義
//!
//! 外部ストア（`tiktok_raw`テーブル）の行と、読み取り時に導出される集計値を表す。
//! ストアから返る行はこのモジュールの型でデシリアライズされ、形が合わない行はエラーとなる。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 投稿
///
/// 外部ストアが所有する1投稿分のレコード。本APIは書き込みを行わない。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    /// ストア側の連番ID
    #[serde(default)]
    pub id: Option<i64>,
    /// アカウント名
    pub account: String,
    /// 投稿ID
    pub post_id: String,
    /// いいね数
    pub likes: i64,
    /// 再生数
    pub views: i64,
    /// コメント数
    pub comments: i64,
    /// シェア数
    pub shares: i64,
    /// 作成日時（ISO 8601文字列、先頭10文字が暦日）
    #[serde(default)]
    pub created_at: Option<String>,
    /// 非正規化された日付文字列
    #[serde(default)]
    pub date: Option<String>,
}

impl Post {
    /// 指定された指標の値を取得
    pub fn metric(&self, metric: SortMetric) -> i64 {
        match metric {
            SortMetric::Views => self.views,
            SortMetric::Likes => self.likes,
            SortMetric::Comments => self.comments,
            SortMetric::Shares => self.shares,
        }
    }
}

/// 日別集計用の射影（`views, created_at`のみ）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewRecord {
    /// 再生数
    pub views: i64,
    /// 作成日時
    pub created_at: String,
}

impl ViewRecord {
    /// 作成日時の先頭10文字（YYYY-MM-DD）を取得
    ///
    /// 10文字未満の場合は`None`を返す。
    pub fn calendar_date(&self) -> Option<&str> {
        self.created_at.get(..10)
    }
}

/// アカウント単位の集計値
///
/// 永続化されず、アカウントの投稿集合から読み取り時に計算される。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountStats {
    pub account: String,
    pub total_posts: u64,
    pub total_views: i64,
    pub total_likes: i64,
    pub total_comments: i64,
    pub total_shares: i64,
    /// 投稿あたり平均再生数（小数点以下2桁に丸め）
    pub avg_views_per_post: f64,
}

/// 1日分の再生数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyViews {
    /// 暦日（YYYY-MM-DD）
    pub date: String,
    pub views: i64,
}

/// 上位投稿の並び替えに使える指標
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortMetric {
    Views,
    Likes,
    Comments,
    Shares,
}

impl SortMetric {
    /// 受け付ける全指標（エラーメッセージの表示順）
    pub const ALL: [SortMetric; 4] = [
        SortMetric::Views,
        SortMetric::Likes,
        SortMetric::Comments,
        SortMetric::Shares,
    ];

    /// ストア上のカラム名
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMetric::Views => "views",
            SortMetric::Likes => "likes",
            SortMetric::Comments => "comments",
            SortMetric::Shares => "shares",
        }
    }

    /// 受け付ける値の一覧（例: `views, likes, comments, shares`）
    pub fn accepted_values() -> String {
        Self::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for SortMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 並び替え指標のパースエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("不正な並び替え指標です: {value}（指定可能: {}）", SortMetric::accepted_values())]
pub struct InvalidSortMetric {
    /// 指定された値
    pub value: String,
}

impl FromStr for SortMetric {
    type Err = InvalidSortMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| InvalidSortMetric {
                value: s.to_string(),
            })
    }
}

/// 投稿一覧の並び順（いずれも降順）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOrder {
    /// 作成日時の新しい順
    Newest,
    /// 指定指標の大きい順
    Top(SortMetric),
}

impl PostOrder {
    /// 並び替えに使うカラム名
    pub fn column(&self) -> &'static str {
        match self {
            PostOrder::Newest => "created_at",
            PostOrder::Top(metric) => metric.as_str(),
        }
    }
}
