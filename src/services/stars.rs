//! Reward stars, counted per day
//!
//! Parents award or take back stars by voice ("给朵朵加一颗星星"); the
//! weekly report lists each day since Monday with a total.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use chrono::{Datelike, Days, Local, NaiveDate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DuoError, Result};

/// Stars recorded for one day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStars {
    pub date: NaiveDate,
    pub stars: u32,
}

/// Persistent star counter with daily granularity
pub trait StarStore: Send + Sync {
    /// Add stars to today, returning today's new count
    fn increment(&self, count: u32) -> Result<u32>;

    /// Take stars from today, never below zero; a day without a record is
    /// left alone
    fn decrement(&self, count: u32) -> Result<u32>;

    /// Today's count
    fn get(&self) -> Result<u32>;

    /// Every recorded day from Monday of this week, oldest first
    fn weekly_report(&self) -> Result<Vec<DailyStars>>;
}

type Clock = Box<dyn Fn() -> NaiveDate + Send + Sync>;

/// Star counter persisted as a JSON `date -> count` map
pub struct JsonStarStore {
    path: PathBuf,
    records: Mutex<BTreeMap<NaiveDate, u32>>,
    today: Clock,
}

impl JsonStarStore {
    /// Open the store at `path`, starting empty if the file does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = Self::load(&path)?;
        debug!(path = %path.display(), days = records.len(), "star store opened");
        Ok(Self {
            path,
            records: Mutex::new(records),
            today: Box::new(|| Local::now().date_naive()),
        })
    }

    /// Replace the source of "today"
    #[must_use]
    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Box::new(today);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete every record from Monday of this week onward
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn reset_week(&self) -> Result<()> {
        let start = week_start(self.today());
        let mut records = self.records.lock();
        records.retain(|date, _| *date < start);
        self.persist(&records)?;
        info!(since = %start, "weekly stars reset");
        Ok(())
    }

    fn today(&self) -> NaiveDate {
        (self.today)()
    }

    fn load(path: &Path) -> Result<BTreeMap<NaiveDate, u32>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).map_err(|e| {
            DuoError::Other(format!("star file {} is corrupt: {e}", path.display()))
        })
    }

    fn persist(&self, records: &BTreeMap<NaiveDate, u32>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(records)?)?;
        Ok(())
    }
}

impl StarStore for JsonStarStore {
    fn increment(&self, count: u32) -> Result<u32> {
        let today = self.today();
        let mut records = self.records.lock();
        let stars = records.entry(today).or_insert(0);
        *stars = stars.saturating_add(count);
        let stars = *stars;
        self.persist(&records)?;
        info!(%today, added = count, stars, "stars added");
        Ok(stars)
    }

    fn decrement(&self, count: u32) -> Result<u32> {
        let today = self.today();
        let mut records = self.records.lock();
        let Some(stars) = records.get_mut(&today) else {
            debug!(%today, "no stars recorded today, nothing to remove");
            return Ok(0);
        };
        *stars = stars.saturating_sub(count);
        let stars = *stars;
        self.persist(&records)?;
        info!(%today, removed = count, stars, "stars removed");
        Ok(stars)
    }

    fn get(&self) -> Result<u32> {
        Ok(self
            .records
            .lock()
            .get(&self.today())
            .copied()
            .unwrap_or(0))
    }

    fn weekly_report(&self) -> Result<Vec<DailyStars>> {
        let start = week_start(self.today());
        Ok(self
            .records
            .lock()
            .range(start..)
            .map(|(date, stars)| DailyStars {
                date: *date,
                stars: *stars,
            })
            .collect())
    }
}

impl std::fmt::Debug for JsonStarStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonStarStore")
            .field("path", &self.path)
            .field("days", &self.records.lock().len())
            .finish_non_exhaustive()
    }
}

/// Monday of the week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(offset)).unwrap_or(date)
}

const WEEKDAYS: [&str; 7] = ["一", "二", "三", "四", "五", "六", "日"];

/// Render the weekly table shown to the family
pub fn format_weekly_report(report: &[DailyStars]) -> String {
    let total: u32 = report.iter().map(|day| day.stars).sum();

    let mut message = String::from("本周星星统计表 ⭐️\n");
    message.push_str("┌──────┬──────┐\n");
    message.push_str("│ 日期 │ 星星 │\n");
    message.push_str("├──────┼──────┤\n");
    for day in report {
        let weekday = WEEKDAYS[day.date.weekday().num_days_from_monday() as usize];
        message.push_str(&format!("│ 周{weekday}   │  {}   │\n", day.stars));
    }
    message.push_str("└──────┴──────┘\n");
    message.push_str(&format!("\n总计：{total}颗星星 ✨"));
    message
}

/// A star request recognised in an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarCommand {
    Add(u32),
    Remove(u32),
    Report,
}

impl StarCommand {
    /// Recognise a star command; voice commands always move one star
    pub fn parse(text: &str) -> Option<Self> {
        if !text.contains("星星") {
            return None;
        }
        if text.contains('加') {
            Some(Self::Add(1))
        } else if text.contains('减') || text.contains("扣除") {
            Some(Self::Remove(1))
        } else if text.contains("查看") || text.contains("多少") {
            Some(Self::Report)
        } else {
            None
        }
    }

    /// Apply the command and produce the reply
    pub fn execute(self, store: &dyn StarStore) -> String {
        match self {
            Self::Add(count) => match store.increment(count) {
                Ok(_) => format!("已经帮你增加了{count}颗星星！"),
                Err(e) => {
                    warn!(error = %e, "failed to add stars");
                    "抱歉，增加星星时出现错误".to_string()
                }
            },
            Self::Remove(count) => match store.decrement(count) {
                Ok(_) => format!("已经减少了{count}颗星星。"),
                Err(e) => {
                    warn!(error = %e, "failed to remove stars");
                    "抱歉，减少星星时出现错误".to_string()
                }
            },
            Self::Report => match store.weekly_report() {
                Ok(report) => format_weekly_report(&report),
                Err(e) => {
                    warn!(error = %e, "failed to build star report");
                    "抱歉，查询星星时出现错误".to_string()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store_on(dir: &TempDir, today: NaiveDate) -> JsonStarStore {
        JsonStarStore::open(dir.path().join("stars.json"))
            .unwrap()
            .with_clock(move || today)
    }

    #[test]
    fn test_increment_and_decrement() {
        let dir = TempDir::new().unwrap();
        let store = store_on(&dir, date(2025, 3, 5));

        assert_eq!(store.get().unwrap(), 0);
        assert_eq!(store.increment(3).unwrap(), 3);
        assert_eq!(store.decrement(1).unwrap(), 2);
        assert_eq!(store.decrement(10).unwrap(), 0);
        assert_eq!(store.get().unwrap(), 0);
    }

    #[test]
    fn test_decrement_without_record_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = store_on(&dir, date(2025, 3, 5));
        assert_eq!(store.decrement(1).unwrap(), 0);
        assert!(store.weekly_report().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        store_on(&dir, date(2025, 3, 5)).increment(2).unwrap();
        let reopened = store_on(&dir, date(2025, 3, 5));
        assert_eq!(reopened.get().unwrap(), 2);
    }

    #[test]
    fn test_weekly_report_starts_monday() {
        let dir = TempDir::new().unwrap();
        // Sunday of the previous week, then Monday and Wednesday
        store_on(&dir, date(2025, 3, 2)).increment(5).unwrap();
        store_on(&dir, date(2025, 3, 5)).increment(1).unwrap();
        store_on(&dir, date(2025, 3, 3)).increment(2).unwrap();

        let store = store_on(&dir, date(2025, 3, 5));
        assert_eq!(
            store.weekly_report().unwrap(),
            vec![
                DailyStars { date: date(2025, 3, 3), stars: 2 },
                DailyStars { date: date(2025, 3, 5), stars: 1 },
            ]
        );

        store.reset_week().unwrap();
        assert!(store.weekly_report().unwrap().is_empty());
        assert_eq!(store_on(&dir, date(2025, 3, 2)).get().unwrap(), 5);
    }

    #[test]
    fn test_week_start() {
        assert_eq!(week_start(date(2025, 3, 3)), date(2025, 3, 3));
        assert_eq!(week_start(date(2025, 3, 9)), date(2025, 3, 3));
    }

    #[test]
    fn test_format_weekly_report() {
        let report = vec![
            DailyStars { date: date(2025, 3, 3), stars: 2 },
            DailyStars { date: date(2025, 3, 9), stars: 4 },
        ];
        let text = format_weekly_report(&report);
        assert!(text.starts_with("本周星星统计表 ⭐️\n"));
        assert!(text.contains("│ 周一   │  2   │\n"));
        assert!(text.contains("│ 周日   │  4   │\n"));
        assert!(text.ends_with("总计：6颗星星 ✨"));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(StarCommand::parse("给朵朵加一颗星星"), Some(StarCommand::Add(1)));
        assert_eq!(StarCommand::parse("星星增加"), Some(StarCommand::Add(1)));
        assert_eq!(StarCommand::parse("减少一颗星星"), Some(StarCommand::Remove(1)));
        assert_eq!(StarCommand::parse("扣除星星"), Some(StarCommand::Remove(1)));
        assert_eq!(StarCommand::parse("我有多少星星"), Some(StarCommand::Report));
        assert_eq!(StarCommand::parse("查看星星"), Some(StarCommand::Report));
        assert_eq!(StarCommand::parse("天上的星星"), None);
        assert_eq!(StarCommand::parse("加油"), None);
    }

    #[test]
    fn test_execute_replies() {
        let dir = TempDir::new().unwrap();
        let store = store_on(&dir, date(2025, 3, 5));
        assert_eq!(StarCommand::Add(1).execute(&store), "已经帮你增加了1颗星星！");
        assert_eq!(StarCommand::Remove(1).execute(&store), "已经减少了1颗星星。");
        assert!(StarCommand::Report.execute(&store).contains("周三"));
    }
}
