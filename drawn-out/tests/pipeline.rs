mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chesscom_extractor::PageCount;
use tokio_util::sync::CancellationToken;

use common::{FakeListings, FakePgnSource, claim, fast_config, ids, setup_test_db};
use drawn_out::database::models::{GameStatus, JobStatus};
use drawn_out::pipeline::{
    CompletionCheck, CompletionDetector, GameFetcher, LocalRetryPolicy, Pipeline,
    PopulateOutcome, RoundPopulator, SessionPool, StopReason,
};

fn fetcher(
    db: &common::TestDb,
    source: &Arc<FakePgnSource>,
    sessions: usize,
) -> GameFetcher<FakePgnSource> {
    let config = fast_config();
    GameFetcher::new(
        Arc::clone(source),
        SessionPool::from_sessions((0..sessions).collect()).unwrap(),
        db.repos.games.clone(),
        LocalRetryPolicy::from_config(&config),
        config.batch_size,
        config.max_retries,
    )
}

fn detector(db: &common::TestDb) -> CompletionDetector {
    CompletionDetector::new(
        db.repos.jobs.clone(),
        db.repos.tournaments.clone(),
        db.repos.games.clone(),
        4,
        3,
    )
}

#[tokio::test]
async fn round_with_duplicate_ids_across_pages() {
    let db = setup_test_db().await;
    claim(&db.repos, "T1").await;

    let listings = Arc::new(FakeListings::default());
    listings.add_page(1, 1, &["g1", "g2"], PageCount::Known(2));
    listings.add_page(1, 2, &["g2"], PageCount::Known(2));

    let populator = RoundPopulator::new(Arc::clone(&listings), db.repos.tournaments.clone(), 1);
    let outcome = populator.populate("T1").await.unwrap();
    assert!(matches!(outcome, PopulateOutcome::Complete { rounds_fetched: 1 }));

    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT id, round FROM game WHERE tournament_id = 'T1' ORDER BY id")
            .fetch_all(&db.pool)
            .await
            .unwrap();
    assert_eq!(rows, vec![("g1".to_string(), 1), ("g2".to_string(), 1)]);
    assert_eq!(db.repos.tournaments.rounds_fetched("T1").await.unwrap(), 1);
    assert_eq!(listings.requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn malformed_page_count_reads_one_page() {
    let db = setup_test_db().await;
    claim(&db.repos, "T1").await;

    let listings = Arc::new(FakeListings::default());
    listings.add_page(1, 1, &["g1"], PageCount::Malformed("two".into()));
    listings.add_page(1, 2, &["g9"], PageCount::Malformed("two".into()));

    let populator = RoundPopulator::new(Arc::clone(&listings), db.repos.tournaments.clone(), 1);
    populator.populate("T1").await.unwrap();

    assert_eq!(listings.requests.load(Ordering::SeqCst), 1);
    assert!(db.repos.games.get_game("g9").await.is_err());
}

#[tokio::test]
async fn failed_listing_does_not_advance_round() {
    let db = setup_test_db().await;
    claim(&db.repos, "T1").await;

    let listings = Arc::new(FakeListings::default());
    listings.add_page(1, 1, &["g1"], PageCount::Missing);
    listings.add_page(2, 1, &["g2"], PageCount::Missing);
    listings.fail_round(2);

    let populator = RoundPopulator::new(Arc::clone(&listings), db.repos.tournaments.clone(), 11);
    let outcome = populator.populate("T1").await.unwrap();
    assert!(matches!(outcome, PopulateOutcome::Aborted { round: 2, .. }));
    assert_eq!(db.repos.tournaments.rounds_fetched("T1").await.unwrap(), 1);

    listings.heal_round(2);
    let outcome = populator.populate("T1").await.unwrap();
    assert!(matches!(outcome, PopulateOutcome::Complete { rounds_fetched: 11 }));
    assert!(db.repos.games.get_game("g2").await.is_ok());
}

#[tokio::test]
async fn flaky_game_recovers_within_local_retries() {
    let db = setup_test_db().await;
    claim(&db.repos, "T1").await;
    db.repos
        .tournaments
        .record_round("T1", 1, &ids(&["g1", "g2"]))
        .await
        .unwrap();

    let source = Arc::new(FakePgnSource::default());
    source.fail_times("g1", 2);
    let fetcher = fetcher(&db, &source, 2);

    let report = fetcher.drain("T1", &CancellationToken::new()).await.unwrap();
    assert_eq!(report.batches, 1);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(source.attempts_for("g1"), 3);
    assert_eq!(fetcher.tracked_games(), 0);

    let game = db.repos.games.get_game("g1").await.unwrap();
    assert_eq!(game.status, GameStatus::Success.as_str());
    assert_eq!(game.retries, 0);
    assert_eq!(game.pgn, FakePgnSource::pgn_for("g1"));
}

#[tokio::test]
async fn stuck_game_reaches_retry_ceiling() {
    let db = setup_test_db().await;
    claim(&db.repos, "T1").await;
    db.repos
        .tournaments
        .record_round("T1", 1, &ids(&["g1"]))
        .await
        .unwrap();

    let source = Arc::new(FakePgnSource::default());
    source.fail_always("g1");
    let fetcher = fetcher(&db, &source, 1);

    // Each pass spends three local attempts and records one durable failure.
    let report = fetcher.drain("T1", &CancellationToken::new()).await.unwrap();
    assert_eq!(report.batches, 3);
    assert_eq!(report.failed, 3);
    assert_eq!(source.attempts_for("g1"), 9);

    let game = db.repos.games.get_game("g1").await.unwrap();
    assert_eq!(game.status, GameStatus::Error.as_str());
    assert_eq!(game.retries, 3);
    assert!(db.repos.games.select_batch("T1", 3, 50).await.unwrap().is_empty());

    let again = fetcher.drain("T1", &CancellationToken::new()).await.unwrap();
    assert_eq!(again.batches, 0);
    assert_eq!(source.attempts_for("g1"), 9);
    assert_eq!(fetcher.tracked_games(), 0);
}

#[tokio::test]
async fn sessions_are_never_shared() {
    let db = setup_test_db().await;
    claim(&db.repos, "T1").await;
    let games: Vec<String> = (0..30).map(|i| format!("g{i:02}")).collect();
    db.repos
        .tournaments
        .record_round("T1", 1, &games)
        .await
        .unwrap();

    let source = Arc::new(FakePgnSource::with_delay(Duration::from_millis(5)));
    source.fail_times("g03", 1);
    source.fail_times("g17", 2);
    let fetcher = fetcher(&db, &source, 3);

    let report = fetcher.drain("T1", &CancellationToken::new()).await.unwrap();
    assert_eq!(report.fetched, 30);
    assert!(!source.overlap_seen.load(Ordering::SeqCst));
    assert!(source.peak_in_flight.load(Ordering::SeqCst) <= 3);
    // Each session runs its first fetch exactly once as a first launch.
    assert_eq!(source.first_launches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn completes_after_four_rounds_with_all_games_fetched() {
    let db = setup_test_db().await;
    claim(&db.repos, "T1").await;
    for round in 1..=4 {
        let game = format!("g{round}");
        db.repos
            .tournaments
            .record_round("T1", round, &[game.clone()])
            .await
            .unwrap();
        db.repos.games.mark_success(&game, "1. e4 e5 *").await.unwrap();
    }

    let detector = detector(&db);
    assert_eq!(detector.check("T1").await.unwrap(), CompletionCheck::Completed);
    assert_eq!(
        db.repos.jobs.get_job("T1").await.unwrap().status,
        JobStatus::Complete.as_str()
    );

    // Running the check again never reverts the job.
    assert_eq!(
        detector.check("T1").await.unwrap(),
        CompletionCheck::AlreadyComplete
    );
    assert!(!db.repos.jobs.mark_complete("T1").await.unwrap());
    assert_eq!(
        db.repos.jobs.get_job("T1").await.unwrap().status,
        JobStatus::Complete.as_str()
    );
}

#[tokio::test]
async fn incomplete_jobs_stay_pending() {
    let db = setup_test_db().await;
    claim(&db.repos, "T1").await;
    for round in 1..=3 {
        db.repos
            .tournaments
            .record_round("T1", round, &[format!("g{round}")])
            .await
            .unwrap();
    }

    let detector = detector(&db);
    assert_eq!(
        detector.check("T1").await.unwrap(),
        CompletionCheck::Pending {
            rounds_fetched: 3,
            live_games: 3
        }
    );

    db.repos
        .tournaments
        .record_round("T1", 4, &ids(&["g4"]))
        .await
        .unwrap();
    for game in ["g1", "g2", "g3"] {
        db.repos.games.mark_success(game, "1. d4 *").await.unwrap();
    }
    // An exhausted game counts as resolved; a game with budget left does not.
    db.repos.games.mark_failed("g4").await.unwrap();
    assert_eq!(
        detector.check("T1").await.unwrap(),
        CompletionCheck::Pending {
            rounds_fetched: 4,
            live_games: 1
        }
    );

    db.repos.games.mark_failed("g4").await.unwrap();
    db.repos.games.mark_failed("g4").await.unwrap();
    assert_eq!(detector.check("T1").await.unwrap(), CompletionCheck::Completed);
}

#[tokio::test]
async fn pipeline_runs_jobs_to_completion() {
    let db = setup_test_db().await;
    db.repos.jobs.enqueue(&ids(&["T1", "T2"])).await.unwrap();

    let listings = Arc::new(FakeListings::default());
    listings.add_page(1, 1, &["a1", "a2"], PageCount::Known(1));
    listings.add_page(2, 1, &["a3"], PageCount::Missing);
    let source = Arc::new(FakePgnSource::default());
    source.fail_times("a2", 1);

    let pipeline = Pipeline::new(
        &db.repos,
        Arc::clone(&listings),
        Arc::clone(&source),
        SessionPool::from_sessions(vec![0, 1]).unwrap(),
        fast_config(),
    )
    .unwrap();

    let summary = pipeline.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.stop, StopReason::NoJobs);
    assert_eq!(summary.jobs_completed, 2);
    assert_eq!(summary.passes, 2);
    // The fake serves the same listing for every tournament.
    assert_eq!(summary.games_fetched, 3);

    let counts = db.repos.jobs.count_by_status().await.unwrap();
    assert_eq!(counts.complete, 2);
    assert_eq!(db.repos.tournaments.rounds_fetched("T1").await.unwrap(), 11);
    assert_eq!(
        db.repos.games.get_game("a2").await.unwrap().status,
        GameStatus::Success.as_str()
    );
}

#[tokio::test]
async fn pipeline_stops_on_a_job_whose_listing_keeps_failing() {
    let db = setup_test_db().await;
    db.repos.jobs.enqueue(&ids(&["T1", "T2"])).await.unwrap();

    let listings = Arc::new(FakeListings::default());
    listings.fail_round(1);
    let source = Arc::new(FakePgnSource::default());

    let pipeline = Pipeline::new(
        &db.repos,
        listings,
        source,
        SessionPool::from_sessions(vec![0]).unwrap(),
        fast_config(),
    )
    .unwrap();

    let summary = pipeline.run(CancellationToken::new()).await.unwrap();
    assert_eq!(
        summary.stop,
        StopReason::Stalled {
            tournament_id: "T1".to_string()
        }
    );
    assert_eq!(summary.passes, 3);
    assert_eq!(summary.jobs_completed, 0);

    let job = db.repos.jobs.get_job("T1").await.unwrap();
    assert_eq!(job.status, JobStatus::Pending.as_str());
    assert_eq!(db.repos.tournaments.rounds_fetched("T1").await.unwrap(), 0);
    assert_eq!(
        db.repos.jobs.get_job("T2").await.unwrap().status,
        JobStatus::NotAsked.as_str()
    );
}

#[tokio::test]
async fn cancelled_pipeline_returns_sessions() {
    let db = setup_test_db().await;
    db.repos.jobs.enqueue(&ids(&["T1"])).await.unwrap();

    let listings = Arc::new(FakeListings::default());
    listings.add_page(1, 1, &["slow1", "slow2"], PageCount::Missing);
    let source = Arc::new(FakePgnSource::with_delay(Duration::from_secs(60)));
    let sessions = SessionPool::from_sessions(vec![0, 1]).unwrap();

    let pipeline = Pipeline::new(
        &db.repos,
        listings,
        Arc::clone(&source),
        sessions.clone(),
        fast_config(),
    )
    .unwrap();

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let summary = pipeline.run(token).await.unwrap();
    assert_eq!(summary.stop, StopReason::Interrupted);
    // Aborted fetches have already handed their sessions back.
    assert_eq!(sessions.available(), 2);

    let closed = sessions.shutdown(Arc::clone(&source), Duration::ZERO).await;
    assert_eq!(closed, 2);
    assert_eq!(source.closed.load(Ordering::SeqCst), 2);
    assert_eq!(
        db.repos.jobs.get_job("T1").await.unwrap().status,
        JobStatus::Pending.as_str()
    );
}
