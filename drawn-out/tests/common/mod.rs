#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chesscom_extractor::{
    ExtractorError, FetchFailure, FetchStage, ListingPage, ListingSource, PageCount, PgnFetch,
    PgnSource,
};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tempfile::TempDir;

use drawn_out::config::PipelineConfig;
use drawn_out::database::repositories::Repositories;
use drawn_out::database::{DbPool, init_pool, run_migrations};
use drawn_out::pipeline::JobClaimer;

pub struct TestDb {
    // Held so the database file outlives the test.
    _dir: TempDir,
    pub pool: DbPool,
    pub repos: Repositories,
}

pub async fn setup_test_db() -> TestDb {
    let dir = TempDir::new().unwrap();
    let url = format!(
        "sqlite:{}?mode=rwc",
        dir.path().join("scraped.db").to_string_lossy()
    );
    let pool = init_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    let repos = Repositories::from_pool(pool.clone());
    TestDb {
        _dir: dir,
        pool,
        repos,
    }
}

/// Enqueue `tournament_id` and claim it, leaving it `pending` with a
/// tournament row.
pub async fn claim(repos: &Repositories, tournament_id: &str) {
    repos
        .jobs
        .enqueue(&[tournament_id.to_string()])
        .await
        .unwrap();
    let claimer = JobClaimer::new(repos.jobs.clone(), repos.tournaments.clone());
    assert_eq!(
        claimer.claim_job().await.unwrap().as_deref(),
        Some(tournament_id)
    );
}

/// Pipeline settings with millisecond backoff.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        backoff_base: Duration::from_millis(1),
        ..PipelineConfig::default()
    }
}

pub fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

/// Listing pages keyed by `(round, page)`. Unknown pages are empty
/// single-page listings.
#[derive(Default)]
pub struct FakeListings {
    pages: Mutex<HashMap<(u32, u32), ListingPage>>,
    failing_rounds: Mutex<HashSet<u32>>,
    pub requests: AtomicUsize,
}

impl FakeListings {
    pub fn add_page(&self, round: u32, page: u32, game_ids: &[&str], total_pages: PageCount) {
        self.pages.lock().insert(
            (round, page),
            ListingPage {
                game_ids: game_ids.iter().map(|id| id.to_string()).collect(),
                pages: total_pages,
            },
        );
    }

    pub fn fail_round(&self, round: u32) {
        self.failing_rounds.lock().insert(round);
    }

    pub fn heal_round(&self, round: u32) {
        self.failing_rounds.lock().remove(&round);
    }
}

#[async_trait]
impl ListingSource for FakeListings {
    async fn fetch_listing(
        &self,
        tournament_id: &str,
        round: u32,
        page: u32,
    ) -> Result<ListingPage, ExtractorError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.failing_rounds.lock().contains(&round) {
            return Err(ExtractorError::HttpStatus {
                status: 503,
                url: format!("/tournament/live/{tournament_id}?round={round}&pairings={page}"),
            });
        }
        Ok(self
            .pages
            .lock()
            .get(&(round, page))
            .cloned()
            .unwrap_or(ListingPage {
                game_ids: BTreeSet::new(),
                pages: PageCount::Missing,
            }))
    }
}

/// Scripted PGN source. Sessions are plain numbers; every fetch records
/// which session it holds so overlapping use can be detected.
#[derive(Default)]
pub struct FakePgnSource {
    opened: AtomicUsize,
    pub closed: AtomicUsize,
    /// Failures to return before a game succeeds.
    failures_left: DashMap<String, u32>,
    always_fail: DashSet<String>,
    pub attempts: DashMap<String, u32>,
    pub first_launches: AtomicUsize,
    holders: DashSet<usize>,
    pub overlap_seen: AtomicBool,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    pub fetch_delay: Duration,
}

impl FakePgnSource {
    pub fn with_delay(fetch_delay: Duration) -> Self {
        Self {
            fetch_delay,
            ..Self::default()
        }
    }

    pub fn fail_times(&self, game_id: &str, times: u32) {
        self.failures_left.insert(game_id.to_string(), times);
    }

    pub fn fail_always(&self, game_id: &str) {
        self.always_fail.insert(game_id.to_string());
    }

    pub fn attempts_for(&self, game_id: &str) -> u32 {
        self.attempts.get(game_id).map_or(0, |a| *a)
    }

    pub fn pgn_for(game_id: &str) -> String {
        format!("[Event \"Live Chess\"]\n[Site \"{game_id}\"]\n[Result \"1-0\"]\n\n1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6 4. Qxf7# 1-0\n")
    }

    fn should_fail(&self, game_id: &str) -> bool {
        if self.always_fail.contains(game_id) {
            return true;
        }
        match self.failures_left.get_mut(game_id) {
            Some(mut left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl PgnSource for FakePgnSource {
    type Session = usize;

    async fn open_session(&self) -> Result<usize, ExtractorError> {
        Ok(self.opened.fetch_add(1, Ordering::SeqCst))
    }

    async fn close_session(&self, _session: usize) -> Result<(), ExtractorError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_pgn(&self, session: &mut usize, game_id: &str, first_launch: bool) -> PgnFetch {
        if !self.holders.insert(*session) {
            self.overlap_seen.store(true, Ordering::SeqCst);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if first_launch {
            self.first_launches.fetch_add(1, Ordering::SeqCst);
        }
        *self.attempts.entry(game_id.to_string()).or_insert(0) += 1;

        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        let fetch = if self.should_fail(game_id) {
            PgnFetch::Failure(FetchFailure::new(
                FetchStage::GameOverModal,
                "timed out waiting for game over modal",
            ))
        } else {
            PgnFetch::from_text(Self::pgn_for(game_id))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.holders.remove(&*session);
        fetch
    }
}
