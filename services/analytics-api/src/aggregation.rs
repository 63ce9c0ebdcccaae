//! 集計処理
//!
//! ストアから取得した行に対する純粋な集計関数群。
//! - アカウント名の重複除去とソート
//! - アカウント単位の合計・平均
//! - 日別再生数のバケット化と欠損日の0埋め

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};

use crate::post::{AccountStats, DailyViews, Post, ViewRecord};

/// 日別集計のデフォルト日数
pub const DEFAULT_DAILY_VIEWS_DAYS: u32 = 30;

/// 期間の開始日として許容する最小の年（西暦1年）
const MIN_WINDOW_YEAR: i32 = 1;

/// 小数点以下2桁に丸める
pub fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// アカウント名を重複除去して昇順に並べる
pub fn distinct_sorted_accounts<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    names
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// 1アカウント分の投稿から集計値を計算
///
/// 投稿が0件の場合、平均再生数は0となる（ゼロ除算は発生しない）。
pub fn account_stats(account: &str, posts: &[Post]) -> AccountStats {
    let total_posts = posts.len() as u64;
    let total_views: i64 = posts.iter().map(|p| p.views).sum();
    let total_likes: i64 = posts.iter().map(|p| p.likes).sum();
    let total_comments: i64 = posts.iter().map(|p| p.comments).sum();
    let total_shares: i64 = posts.iter().map(|p| p.shares).sum();

    let avg_views_per_post = if total_posts > 0 {
        round_to_hundredths(total_views as f64 / total_posts as f64)
    } else {
        0.0
    };

    AccountStats {
        account: account.to_string(),
        total_posts,
        total_views,
        total_likes,
        total_comments,
        total_shares,
        avg_views_per_post,
    }
}

/// 全アカウントの集計値をアカウント名順に計算
pub fn summarize_accounts(posts: Vec<Post>) -> Vec<AccountStats> {
    let mut by_account: BTreeMap<String, Vec<Post>> = BTreeMap::new();
    for post in posts {
        by_account.entry(post.account.clone()).or_default().push(post);
    }

    by_account
        .iter()
        .map(|(account, posts)| account_stats(account, posts))
        .collect()
}

/// 日別集計の対象期間
///
/// `[end - days日, end]`の両端を含む。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateWindow {
    /// `end`で終わる`days`日間の期間を作成
    ///
    /// 開始日時が西暦1年より前になる場合は`None`を返す。
    pub fn ending_at(end: DateTime<Utc>, days: u32) -> Option<Self> {
        let span = TimeDelta::try_days(i64::from(days))?;
        let start = end.checked_sub_signed(span)?;
        if start.year() < MIN_WINDOW_YEAR {
            return None;
        }
        Some(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// 開始日から終了日までの暦日（両端を含む、昇順）
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.end.date_naive();
        self.start
            .date_naive()
            .iter_days()
            .take_while(move |date| *date <= last)
    }
}

/// 日別再生数を計算
///
/// 再生数を作成日時の先頭10文字でバケット化し、期間内の全暦日について
/// 1件ずつ昇順で出力する。データの無い日は0となる。
pub fn daily_views(records: &[ViewRecord], window: &DateWindow) -> Vec<DailyViews> {
    let mut buckets: HashMap<&str, i64> = HashMap::new();
    for record in records {
        match record.calendar_date() {
            Some(date) => *buckets.entry(date).or_insert(0) += record.views,
            None => {
                tracing::warn!(created_at = %record.created_at, "作成日時から日付を取り出せない行をスキップ");
            }
        }
    }

    window
        .dates()
        .map(|date| {
            let key = date.format("%Y-%m-%d").to_string();
            let views = buckets.get(key.as_str()).copied().unwrap_or(0);
            DailyViews { date: key, views }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(account: &str, views: i64, likes: i64, comments: i64, shares: i64) -> Post {
        Post {
            id: None,
            account: account.to_string(),
            post_id: format!("{}-{}", account, views),
            likes,
            views,
            comments,
            shares,
            created_at: None,
            date: None,
        }
    }

    fn record(created_at: &str, views: i64) -> ViewRecord {
        ViewRecord {
            views,
            created_at: created_at.to_string(),
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    // ==================== アカウント名 テスト ====================

    #[test]
    fn test_distinct_sorted_accounts_removes_duplicates() {
        let names = vec!["carol", "alice", "bob", "alice", "carol"]
            .into_iter()
            .map(String::from);
        assert_eq!(distinct_sorted_accounts(names), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_distinct_sorted_accounts_empty() {
        assert!(distinct_sorted_accounts(Vec::<String>::new()).is_empty());
    }

    // ==================== 集計値 テスト ====================

    #[test]
    fn test_account_stats_sums_counters() {
        let posts = vec![
            post("x", 10, 1, 2, 3),
            post("x", 20, 4, 5, 6),
            post("x", 30, 7, 8, 9),
        ];
        let stats = account_stats("x", &posts);

        assert_eq!(stats.account, "x");
        assert_eq!(stats.total_posts, 3);
        assert_eq!(stats.total_views, 60);
        assert_eq!(stats.total_likes, 12);
        assert_eq!(stats.total_comments, 15);
        assert_eq!(stats.total_shares, 18);
        assert_eq!(stats.avg_views_per_post, 20.0);
    }

    #[test]
    fn test_account_stats_rounds_average() {
        let posts = vec![post("x", 10, 0, 0, 0), post("x", 0, 0, 0, 0), post("x", 0, 0, 0, 0)];
        let stats = account_stats("x", &posts);
        assert_eq!(stats.avg_views_per_post, 3.33);

        let posts = vec![post("x", 2, 0, 0, 0), post("x", 0, 0, 0, 0), post("x", 0, 0, 0, 0)];
        assert_eq!(account_stats("x", &posts).avg_views_per_post, 0.67);
    }

    #[test]
    fn test_account_stats_without_posts_has_zero_average() {
        let stats = account_stats("nobody", &[]);
        assert_eq!(stats.total_posts, 0);
        assert_eq!(stats.avg_views_per_post, 0.0);
    }

    #[test]
    fn test_summarize_accounts_groups_and_sorts() {
        let posts = vec![
            post("bob", 5, 0, 0, 0),
            post("alice", 10, 1, 0, 0),
            post("bob", 15, 0, 0, 0),
        ];
        let summary = summarize_accounts(posts);

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].account, "alice");
        assert_eq!(summary[0].total_posts, 1);
        assert_eq!(summary[1].account, "bob");
        assert_eq!(summary[1].total_views, 20);
        assert_eq!(summary[1].avg_views_per_post, 10.0);
    }

    // ==================== 期間 テスト ====================

    #[test]
    fn test_window_has_days_plus_one_dates() {
        let window = DateWindow::ending_at(at(2026, 10, 19, 15), 30).unwrap();
        let dates: Vec<NaiveDate> = window.dates().collect();

        assert_eq!(dates.len(), 31);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2026, 9, 19).unwrap());
        assert_eq!(dates[30], NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_window_with_zero_days_is_single_date() {
        let window = DateWindow::ending_at(at(2026, 10, 19, 0), 0).unwrap();
        assert_eq!(window.dates().count(), 1);
        assert_eq!(window.start(), window.end());
    }

    #[test]
    fn test_window_crosses_month_and_leap_day() {
        let window = DateWindow::ending_at(at(2028, 3, 1, 8), 2).unwrap();
        let dates: Vec<String> = window.dates().map(|d| d.to_string()).collect();
        assert_eq!(dates, vec!["2028-02-28", "2028-02-29", "2028-03-01"]);
    }

    #[test]
    fn test_window_out_of_range_is_none() {
        assert!(DateWindow::ending_at(at(2026, 10, 19, 0), u32::MAX).is_none());
    }

    #[test]
    fn test_window_before_year_one_is_none() {
        // chronoでは表現できるが負の年になる日数
        assert!(DateWindow::ending_at(at(2026, 10, 19, 12), 90_000_000).is_none());
    }

    #[test]
    fn test_window_can_reach_back_to_year_one() {
        let end = at(2026, 10, 19, 12);
        let first_day = NaiveDate::from_ymd_opt(1, 1, 1).unwrap();
        let days = (end.date_naive() - first_day).num_days() as u32;

        let window = DateWindow::ending_at(end, days).unwrap();
        assert_eq!(window.start().date_naive(), first_day);
        assert_eq!(window.dates().next().unwrap().to_string(), "0001-01-01");

        assert!(DateWindow::ending_at(end, days + 1).is_none());
    }

    // ==================== 日別再生数 テスト ====================

    #[test]
    fn test_daily_views_fills_missing_dates_with_zero() {
        let window = DateWindow::ending_at(at(2026, 10, 19, 12), 2).unwrap();
        let records = vec![record("2026-10-19T09:00:00+00:00", 5)];

        let result = daily_views(&records, &window);

        assert_eq!(
            result,
            vec![
                DailyViews { date: "2026-10-17".to_string(), views: 0 },
                DailyViews { date: "2026-10-18".to_string(), views: 0 },
                DailyViews { date: "2026-10-19".to_string(), views: 5 },
            ]
        );
    }

    #[test]
    fn test_daily_views_sums_same_day() {
        let window = DateWindow::ending_at(at(2026, 10, 19, 12), 1).unwrap();
        let records = vec![
            record("2026-10-18T01:00:00", 3),
            record("2026-10-18T23:00:00", 4),
            record("2026-10-19T00:00:00", 10),
        ];

        let result = daily_views(&records, &window);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].views, 7);
        assert_eq!(result[1].views, 10);
    }

    #[test]
    fn test_daily_views_total_matches_in_range_views() {
        let window = DateWindow::ending_at(at(2026, 10, 19, 12), 7).unwrap();
        let records = vec![
            record("2026-10-12T13:00:00+00:00", 1),
            record("2026-10-15T00:00:00+00:00", 20),
            record("2026-10-19T11:59:59+00:00", 300),
        ];

        let result = daily_views(&records, &window);

        assert_eq!(result.len(), 8);
        assert!(result.iter().all(|d| d.views >= 0));
        assert_eq!(result.iter().map(|d| d.views).sum::<i64>(), 321);
    }

    #[test]
    fn test_daily_views_ignores_unparsable_dates() {
        let window = DateWindow::ending_at(at(2026, 10, 19, 12), 0).unwrap();
        let records = vec![record("bad", 99), record("2026-10-19", 1)];

        let result = daily_views(&records, &window);

        assert_eq!(result, vec![DailyViews { date: "2026-10-19".to_string(), views: 1 }]);
    }
}
