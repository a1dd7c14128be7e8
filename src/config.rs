//! Runtime configuration, read from the environment (and `.env` via dotenv).

use crate::error::{Result, SyncError};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_HISTORY_URL: &str = "https://point.sooplive.co.kr/Report/AfreecaBalloonList.asp";
pub const DEFAULT_LOGIN_HOST: &str = "login.sooplive.co.kr";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote history endpoint
    pub history_url: String,
    /// Host that identifies a login redirect
    pub login_host: String,
    /// Raw `Cookie` header carrying the user's session
    pub session_cookie: Option<String>,
    /// Pause inserted before every page request after the first
    pub request_delay: Duration,
    pub request_timeout: Duration,
    /// Size of the recent window, current month included
    pub recent_months: u32,
    /// Oldest year a full sync walks back to
    pub epoch_year: i32,
    /// Last outgoing page a full sync will request
    pub gift_page_cap: u32,
    /// Age after which a cached snapshot is considered stale
    pub stale_after: chrono::Duration,
    pub database_url: String,
    pub port: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            history_url: DEFAULT_HISTORY_URL.to_string(),
            login_host: DEFAULT_LOGIN_HOST.to_string(),
            session_cookie: None,
            request_delay: Duration::from_millis(300),
            request_timeout: Duration::from_secs(15),
            recent_months: 12,
            epoch_year: 2010,
            gift_page_cap: 100,
            stale_after: chrono::Duration::minutes(30),
            database_url: "sqlite://data/balloon_sync.db".to_string(),
            port: 3001,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let defaults = Self::default();
        Ok(Self {
            history_url: std::env::var("HISTORY_URL").unwrap_or(defaults.history_url),
            login_host: std::env::var("LOGIN_HOST").unwrap_or(defaults.login_host),
            session_cookie: std::env::var("SESSION_COOKIE")
                .ok()
                .filter(|c| !c.trim().is_empty()),
            request_delay: Duration::from_millis(env_or("REQUEST_DELAY_MS", 300u64)?),
            request_timeout: Duration::from_secs(env_or("REQUEST_TIMEOUT_SECS", 15u64)?),
            recent_months: env_or("RECENT_MONTHS", defaults.recent_months)?.max(1),
            epoch_year: env_or("EPOCH_YEAR", defaults.epoch_year)?,
            gift_page_cap: env_or("GIFT_PAGE_CAP", defaults.gift_page_cap)?,
            stale_after: chrono::Duration::minutes(env_or("STALE_AFTER_MINUTES", 30i64)?),
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            port: env_or("PORT", defaults.port)?,
        })
    }

    /// Same settings with no pacing, for tests and scripted fetchers.
    pub fn without_delay(mut self) -> Self {
        self.request_delay = Duration::ZERO;
        self
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| SyncError::Config(format!("{name}={raw:?}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.request_delay, Duration::from_millis(300));
        assert_eq!(cfg.recent_months, 12);
        assert_eq!(cfg.gift_page_cap, 100);
        assert_eq!(cfg.stale_after, chrono::Duration::minutes(30));
    }

    #[test]
    fn env_or_rejects_garbage() {
        // SAFETY: the variable name is unique to this test
        unsafe { std::env::set_var("BALLOON_SYNC_TEST_BAD_NUMBER", "twelve") };
        let res: Result<u32> = env_or("BALLOON_SYNC_TEST_BAD_NUMBER", 1);
        assert!(matches!(res, Err(SyncError::Config(_))));
        unsafe { std::env::remove_var("BALLOON_SYNC_TEST_BAD_NUMBER") };
    }

    #[test]
    fn env_or_falls_back_when_unset() {
        let res: Result<u32> = env_or("BALLOON_SYNC_TEST_UNSET", 7);
        assert_eq!(res.unwrap(), 7);
    }
}
