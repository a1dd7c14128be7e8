use crate::api_client::{FetchResult, HistoryFetcher, PageCursors};
use crate::config::SyncConfig;
use crate::domain::models::{
    Balance, CachedState, HistorySnapshot, SyncPhase, SyncProgress, YearMonth,
};
use crate::domain::repository::{CacheStore, load_state, save_state};
use crate::extract::{ExtractedPage, extract};
use crate::usecases::merge::{merge_charges, merge_gifts};
use crate::usecases::summary::compute_summary;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Complete(HistorySnapshot),
    /// The remote session is gone; the cached snapshot was left as it was.
    LoginRequired,
    /// The base fetch failed; the cached snapshot was left as it was.
    Failed(String),
    /// Stopped between pages. Whatever was merged so far is kept.
    Cancelled(HistorySnapshot),
    /// Another run was active; nothing was done.
    AlreadyRunning,
}

// Reasons a page loop stops before running out of coordinates
enum Interrupt {
    LoginRequired,
    Cancelled,
}

type Clock = Box<dyn Fn() -> NaiveDate + Send + Sync>;

pub struct SyncService {
    fetcher: Arc<dyn HistoryFetcher>,
    cache: Arc<dyn CacheStore>,
    config: SyncConfig,
    today: Clock,
    running: AtomicBool,
    phase: Mutex<SyncPhase>,
    progress: Mutex<SyncProgress>,
    cancel: Mutex<Option<CancellationToken>>,
}

// Clears the single-run flag on every exit path
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncService {
    pub fn new(fetcher: Arc<dyn HistoryFetcher>, cache: Arc<dyn CacheStore>, config: SyncConfig) -> Self {
        Self {
            fetcher,
            cache,
            config,
            today: Box::new(|| chrono::Local::now().date_naive()),
            running: AtomicBool::new(false),
            phase: Mutex::new(SyncPhase::Idle),
            progress: Mutex::new(SyncProgress::default()),
            cancel: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Box::new(today);
        self
    }

    pub fn cache(&self) -> &dyn CacheStore {
        self.cache.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> SyncPhase {
        *lock(&self.phase)
    }

    pub fn progress(&self) -> SyncProgress {
        lock(&self.progress).clone()
    }

    /// Asks the active run to stop at its next page boundary.
    /// Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        match lock(&self.cancel).as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// True when nothing is cached yet or the last successful sync is stale.
    pub async fn should_sync(&self) -> bool {
        match load_state(self.cache.as_ref()).await {
            Ok(Some(state)) => is_stale(&state, Utc::now(), self.config.stale_after),
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, "Failed reading cached state");
                true
            }
        }
    }

    /// Runs one sync. A call made while another run is active returns
    /// `AlreadyRunning` without touching anything.
    #[tracing::instrument(skip(self))]
    pub async fn sync(&self, full_sync: bool) -> SyncOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Sync already running, request ignored");
            return SyncOutcome::AlreadyRunning;
        }
        let _guard = RunGuard(&self.running);

        let token = CancellationToken::new();
        *lock(&self.cancel) = Some(token.clone());
        let outcome = self.run(full_sync, &token).await;
        *lock(&self.cancel) = None;

        self.set_phase(match &outcome {
            SyncOutcome::Complete(_) => SyncPhase::Complete,
            SyncOutcome::LoginRequired => SyncPhase::LoginRequired,
            SyncOutcome::Failed(_) => SyncPhase::Failed,
            SyncOutcome::Cancelled(_) | SyncOutcome::AlreadyRunning => SyncPhase::Idle,
        });
        outcome
    }

    async fn run(&self, full_sync: bool, token: &CancellationToken) -> SyncOutcome {
        let (previous, cache_readable) = match load_state(self.cache.as_ref()).await {
            Ok(state) => (state.unwrap_or_default(), true),
            Err(e) => {
                warn!(error = %e, "Cached state unreadable, starting from empty history");
                (CachedState::default(), false)
            }
        };
        let current = YearMonth::of((self.today)());

        self.set_phase(SyncPhase::FetchingBase);
        if full_sync {
            self.reset_progress(current);
        } else {
            *lock(&self.progress) = SyncProgress::default();
        }

        let base = match self.fetcher.fetch_page(current, PageCursors::first()).await {
            FetchResult::Ok { raw_payload } => extract(&raw_payload),
            FetchResult::AuthRequired => {
                return self.halt_for_login(previous, cache_readable).await;
            }
            FetchResult::HttpError { status } => {
                error!(period = %current, status, "Base fetch failed");
                return SyncOutcome::Failed(format!("base fetch returned HTTP {status}"));
            }
            FetchResult::NetworkError { message } => {
                error!(period = %current, error = %message, "Base fetch failed");
                return SyncOutcome::Failed(format!("base fetch failed: {message}"));
            }
        };

        let mut snapshot = previous.data.clone().unwrap_or_default();
        snapshot.balance = base.balance.unwrap_or_else(|| {
            warn!(period = %current, "No balance found on base page");
            Balance::default()
        });
        let charges = merge_charges(&mut snapshot.charge_history, base.charge_records);
        let gifts = merge_gifts(&mut snapshot.gift_history, base.gift_records);
        info!(period = %current, charges, gifts, balance = snapshot.balance.current, "Merged base page");
        self.step_done("base page");

        let walked = if full_sync {
            self.full_history(current, &mut snapshot, token).await
        } else {
            self.recent_window(current, &mut snapshot, token).await
        };
        let cancelled = match walked {
            Ok(()) => false,
            Err(Interrupt::Cancelled) => {
                info!("Sync cancelled, keeping pages merged so far");
                true
            }
            Err(Interrupt::LoginRequired) => {
                return self.halt_for_login(previous, cache_readable).await;
            }
        };

        self.set_phase(SyncPhase::Aggregating);
        snapshot.summary = compute_summary(
            &snapshot.charge_history,
            &snapshot.gift_history,
            &snapshot.exchange_history,
        );

        let state = CachedState {
            last_sync: if cancelled {
                previous.last_sync
            } else {
                Some(Utc::now().timestamp_millis())
            },
            is_logged_in: Some(true),
            data: Some(snapshot.clone()),
            settings: previous.settings,
        };
        if let Err(e) = save_state(self.cache.as_ref(), &state).await {
            warn!(error = %e, "Failed to persist snapshot, result is only held in memory");
        }

        info!(
            charges = snapshot.charge_history.len(),
            gifts = snapshot.gift_history.len(),
            total_gifted = snapshot.summary.total_gifted,
            "Sync finished"
        );
        if cancelled {
            SyncOutcome::Cancelled(snapshot)
        } else {
            self.finish_progress();
            SyncOutcome::Complete(snapshot)
        }
    }

    // Charge page 1 for each of the previous N-1 months, newest first
    async fn recent_window(
        &self,
        current: YearMonth,
        snapshot: &mut HistorySnapshot,
        token: &CancellationToken,
    ) -> Result<(), Interrupt> {
        self.set_phase(SyncPhase::RecentWindow);
        for period in current.trailing(self.config.recent_months.saturating_sub(1)) {
            self.pace(token).await?;
            if let Some(page) = self.fetch_extracted(period, PageCursors::first()).await? {
                let added = merge_charges(&mut snapshot.charge_history, page.charge_records);
                debug!(period = %period, added, "Merged charge page");
            }
        }
        Ok(())
    }

    // Every month back to the epoch year, then gift pages until one adds nothing
    async fn full_history(
        &self,
        current: YearMonth,
        snapshot: &mut HistorySnapshot,
        token: &CancellationToken,
    ) -> Result<(), Interrupt> {
        self.set_phase(SyncPhase::FullSync);

        for period in current.back_to_epoch(self.config.epoch_year) {
            self.pace(token).await?;
            if let Some(page) = self.fetch_extracted(period, PageCursors::first()).await? {
                let added = merge_charges(&mut snapshot.charge_history, page.charge_records);
                debug!(period = %period, added, "Merged charge page");
            }
            self.step_done(&format!("charge history {period}"));
        }

        for page in 2..=self.config.gift_page_cap {
            self.pace(token).await?;
            let fetched = self.fetch_extracted(current, PageCursors::outgoing(page)).await?;
            self.gift_page_done(page);
            let Some(fetched) = fetched else {
                continue;
            };
            let added = merge_gifts(&mut snapshot.gift_history, fetched.gift_records);
            debug!(page, added, "Merged gift page");
            if added == 0 {
                info!(page, "Gift history exhausted");
                break;
            }
        }
        Ok(())
    }

    async fn fetch_extracted(
        &self,
        period: YearMonth,
        cursors: PageCursors,
    ) -> Result<Option<ExtractedPage>, Interrupt> {
        match self.fetcher.fetch_page(period, cursors).await {
            FetchResult::Ok { raw_payload } => Ok(Some(extract(&raw_payload))),
            FetchResult::AuthRequired => {
                warn!(period = %period, "Login required, halting sync");
                Err(Interrupt::LoginRequired)
            }
            FetchResult::HttpError { status } => {
                warn!(period = %period, incoming = cursors.incoming, outgoing = cursors.outgoing, status, "Page fetch failed, skipping");
                Ok(None)
            }
            FetchResult::NetworkError { message } => {
                warn!(period = %period, incoming = cursors.incoming, outgoing = cursors.outgoing, error = %message, "Page fetch failed, skipping");
                Ok(None)
            }
        }
    }

    // Fixed gap before every request after the base fetch; doubles as the cancellation checkpoint
    async fn pace(&self, token: &CancellationToken) -> Result<(), Interrupt> {
        if token.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        if self.config.request_delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = token.cancelled() => Err(Interrupt::Cancelled),
            _ = tokio::time::sleep(self.config.request_delay) => Ok(()),
        }
    }

    async fn halt_for_login(&self, previous: CachedState, cache_readable: bool) -> SyncOutcome {
        if cache_readable {
            let state = CachedState {
                is_logged_in: Some(false),
                ..previous
            };
            if let Err(e) = save_state(self.cache.as_ref(), &state).await {
                warn!(error = %e, "Failed to persist login state");
            }
        }
        SyncOutcome::LoginRequired
    }

    fn set_phase(&self, phase: SyncPhase) {
        debug!(?phase, "Sync phase");
        *lock(&self.phase) = phase;
    }

    fn reset_progress(&self, current: YearMonth) {
        let months = current.back_to_epoch(self.config.epoch_year).len() as u32;
        let gift_pages = self.config.gift_page_cap.saturating_sub(1);
        *lock(&self.progress) = SyncProgress {
            is_full_sync: true,
            current_step: "base page".to_string(),
            total_steps: 1 + months + gift_pages,
            completed_steps: 0,
            gift_pages: 0,
            total_gift_pages: gift_pages,
        };
    }

    fn step_done(&self, label: &str) {
        let mut p = lock(&self.progress);
        if p.is_full_sync {
            p.current_step = label.to_string();
            p.completed_steps += 1;
        }
    }

    fn gift_page_done(&self, page: u32) {
        let mut p = lock(&self.progress);
        p.current_step = format!("gift history page {page}");
        p.completed_steps += 1;
        p.gift_pages += 1;
    }

    fn finish_progress(&self) {
        let mut p = lock(&self.progress);
        if p.is_full_sync {
            p.current_step = "done".to_string();
            p.completed_steps = p.total_steps;
        }
    }
}

pub fn is_stale(state: &CachedState, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
    match (state.last_sync, &state.data) {
        (Some(last), Some(_)) => now.timestamp_millis() - last > stale_after.num_milliseconds(),
        _ => true,
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::MockHistoryFetcher;
    use crate::infra::memory::MemoryCacheStore;

    fn june_2024() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).expect("valid date")
    }

    fn service(fetcher: MockHistoryFetcher, cache: Arc<MemoryCacheStore>) -> SyncService {
        SyncService::new(Arc::new(fetcher), cache, SyncConfig::default().without_delay())
            .with_clock(june_2024)
    }

    #[test]
    fn staleness_rules() {
        let now = Utc::now();
        let fresh = CachedState {
            last_sync: Some(now.timestamp_millis() - 60_000),
            data: Some(HistorySnapshot::default()),
            ..Default::default()
        };
        let old = CachedState {
            last_sync: Some(now.timestamp_millis() - 31 * 60_000),
            ..fresh.clone()
        };
        let no_data = CachedState {
            data: None,
            ..fresh.clone()
        };
        let thirty = chrono::Duration::minutes(30);
        assert!(!is_stale(&fresh, now, thirty));
        assert!(is_stale(&old, now, thirty));
        assert!(is_stale(&no_data, now, thirty));
        assert!(is_stale(&CachedState::default(), now, thirty));
    }

    #[tokio::test]
    async fn recent_window_walks_previous_months_in_order() {
        let cache = Arc::new(MemoryCacheStore::new());
        let fetcher = Arc::new(MockHistoryFetcher::new());
        let svc = SyncService::new(fetcher.clone(), cache, SyncConfig::default().without_delay())
            .with_clock(june_2024);

        assert!(matches!(svc.sync(false).await, SyncOutcome::Complete(_)));
        let calls = fetcher.calls();
        assert_eq!(calls.len(), 12);
        assert_eq!(calls[0].0, YearMonth::new(2024, 6));
        assert_eq!(calls[1].0, YearMonth::new(2024, 5));
        assert_eq!(calls[11].0, YearMonth::new(2023, 7));
        assert!(calls.iter().all(|(_, c)| *c == PageCursors::first()));
        assert_eq!(svc.phase(), SyncPhase::Complete);
        assert!(!svc.is_running());
    }

    #[tokio::test]
    async fn base_failure_keeps_cached_snapshot() {
        let cache = Arc::new(MemoryCacheStore::new());
        let prior = CachedState {
            last_sync: Some(1),
            is_logged_in: Some(true),
            data: Some(HistorySnapshot {
                balance: Balance {
                    current: 9,
                    ..Default::default()
                },
                ..Default::default()
            }),
            settings: Default::default(),
        };
        save_state(cache.as_ref(), &prior).await.unwrap();

        let fetcher = MockHistoryFetcher::new().with_fallback(FetchResult::NetworkError {
            message: "connection reset".into(),
        });
        let svc = service(fetcher, cache.clone());
        assert!(matches!(svc.sync(false).await, SyncOutcome::Failed(_)));
        assert_eq!(svc.phase(), SyncPhase::Failed);
        assert_eq!(load_state(cache.as_ref()).await.unwrap(), Some(prior));
    }

    #[tokio::test]
    async fn failed_page_is_skipped_not_fatal() {
        let cache = Arc::new(MemoryCacheStore::new());
        let fetcher = MockHistoryFetcher::new()
            .with_result(
                YearMonth::new(2024, 3),
                PageCursors::first(),
                FetchResult::HttpError { status: 502 },
            )
            .with_page(
                YearMonth::new(2024, 2),
                PageCursors::first(),
                r#"<table><tr><th>구매일</th><th>충전</th><th>수단</th><th>결제금액</th></tr>
                   <tr><td>2024-02-11</td><td>100</td><td>card</td><td>11,000</td></tr></table>"#,
            );
        let svc = service(fetcher, cache);
        match svc.sync(false).await {
            SyncOutcome::Complete(s) => assert_eq!(s.charge_history.len(), 1),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn gift_pagination_stops_at_safety_cap() {
        // every gift page yields a fresh record, so only the cap ends the loop
        struct EndlessGifts;

        #[async_trait::async_trait]
        impl HistoryFetcher for EndlessGifts {
            async fn fetch_page(&self, _period: YearMonth, cursors: PageCursors) -> FetchResult {
                let html = format!(
                    r#"<table><tr><th>선물일시</th><th>스트리머</th><th>개수</th><th>횟수</th></tr>
                       <tr><td>2024-06-01</td><td>s{}</td><td>1</td><td>1</td></tr></table>"#,
                    cursors.outgoing
                );
                FetchResult::Ok { raw_payload: html }
            }
        }

        let mut config = SyncConfig::default().without_delay();
        config.epoch_year = 2024;
        config.gift_page_cap = 7;
        let svc = SyncService::new(Arc::new(EndlessGifts), Arc::new(MemoryCacheStore::new()), config)
            .with_clock(june_2024);
        match svc.sync(true).await {
            SyncOutcome::Complete(s) => assert_eq!(s.gift_history.len(), 7),
            other => panic!("unexpected outcome {other:?}"),
        }
        let progress = svc.progress();
        assert_eq!(progress.gift_pages, 6);
        assert_eq!(progress.total_gift_pages, 6);
        assert_eq!(progress.completed_steps, progress.total_steps);
    }

    #[tokio::test]
    async fn persistence_failure_still_returns_result() {
        let cache = Arc::new(MemoryCacheStore::new());
        cache.fail_writes(true);
        let fetcher = MockHistoryFetcher::new().with_page(
            YearMonth::new(2024, 6),
            PageCursors::first(),
            "<p>보유 별풍선 5개</p>",
        );
        let svc = service(fetcher, cache.clone());
        match svc.sync(false).await {
            SyncOutcome::Complete(s) => assert_eq!(s.balance.current, 5),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(load_state(cache.as_ref()).await.unwrap(), None);
        assert!(svc.should_sync().await);
    }

    #[tokio::test]
    async fn cancel_without_run_is_noop() {
        let svc = service(MockHistoryFetcher::new(), Arc::new(MemoryCacheStore::new()));
        assert!(!svc.cancel());
    }
}
