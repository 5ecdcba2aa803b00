mod common;

use std::collections::{HashMap, HashSet};

use tokio_test::{assert_err, assert_ok};

use article_recommender::config::{EvaluationConfig, GroundTruthSource};
use article_recommender::evaluation::{self, GroundTruth};
use article_recommender::factorization::train_and_save;
use article_recommender::models::{Algorithm, FeedbackIntent, FeedbackType, InteractionKind};
use common::Fixture;

async fn with_readers(fixture: &Fixture) -> Vec<i64> {
    let mut users = Vec::new();
    for (name, reads, liked) in [("ana", [1, 3, 8], 2), ("ben", [4, 5, 8], 7)] {
        let user = fixture.user(name).await;
        for n in reads {
            fixture.interact(user, n, InteractionKind::Read).await;
        }
        fixture
            .repository
            .submit_feedback(user, fixture.article(liked), FeedbackType::Like, FeedbackIntent::Insert)
            .await
            .unwrap();
        users.push(user);
    }
    users
}

#[tokio::test]
async fn ground_truth_sources() {
    let fixture = Fixture::new().await;
    let users = with_readers(&fixture).await;
    fixture.interact(users[0], 6, InteractionKind::ClickExternalLink).await;

    let liked = assert_ok!(evaluation::ground_truth(&fixture.repository, GroundTruthSource::Liked).await);
    assert_eq!(liked[&users[0]], HashSet::from([fixture.article(2)]));

    let engaged =
        assert_ok!(evaluation::ground_truth(&fixture.repository, GroundTruthSource::LikedOrClicked).await);
    assert_eq!(
        engaged[&users[0]],
        HashSet::from([fixture.article(2), fixture.article(6)])
    );
}

#[tokio::test]
async fn run_records_batches_that_rescoring_reproduces() {
    let fixture = Fixture::new().await;
    let users = with_readers(&fixture).await;
    let engine = fixture.engine();
    let config = EvaluationConfig {
        k: 5,
        top_n: 5,
        ..EvaluationConfig::default()
    };

    let truth = assert_ok!(evaluation::ground_truth(engine.repository(), GroundTruthSource::Liked).await);
    let run = evaluation::run(&engine, &[Algorithm::Keyword, Algorithm::Rating], &truth, &config).await;
    assert_eq!(run.reports.len(), 2);
    assert_eq!(run.run_id.len(), 8);
    assert_eq!(run.reports[0].batch_id, format!("{}-keyword-v1", run.run_id));
    assert_eq!(run.reports[1].batch_id, format!("{}-svdpp-v1", run.run_id));

    let keyword = &run.reports[0];
    assert_eq!(keyword.algorithm, Algorithm::Keyword);
    assert_eq!(keyword.metrics.users, users.len());
    for value in [keyword.metrics.map, keyword.metrics.ndcg, keyword.metrics.hit_rate] {
        assert!((0.0..=1.0).contains(&value));
    }

    // no trained model: every user scores zero but still counts
    let rating = &run.reports[1];
    assert_eq!(rating.metrics.users, users.len());
    assert_eq!(rating.metrics.map, 0.0);
    assert_eq!(rating.metrics.hit_rate, 0.0);
    assert_eq!(rating.precision_recall.users, 0);

    let rescored = assert_ok!(
        evaluation::evaluate_run(engine.ledger(), &run.run_id, Algorithm::Keyword, &truth, &config)
            .await
    );
    assert_eq!(rescored.metrics, keyword.metrics);
    assert_eq!(rescored.precision_recall, keyword.precision_recall);

    let entries = assert_ok!(engine.ledger().entries_for_batch(&keyword.batch_id).await);
    assert!(entries.iter().all(|e| e.algorithm_version == "keyword-v1"));
    assert!(!entries.is_empty());
    for &user in &users {
        assert!(entries.iter().filter(|e| e.user_id == user).count() <= 5);
    }
}

#[tokio::test]
async fn overlapping_latent_lists_keep_every_row() {
    let fixture = Fixture::new().await;
    let mut readers = Vec::new();
    for (name, reads) in [
        ("ana", &[1, 2, 3][..]),
        ("ben", &[2, 3, 8][..]),
        ("cai", &[4, 5, 8][..]),
        ("dan", &[1, 2, 3, 4, 5][..]),
        ("eve", &[6, 7, 8][..]),
    ] {
        let user = fixture.user(name).await;
        for &n in reads {
            fixture.interact(user, n, InteractionKind::Read).await;
        }
        readers.push(user);
    }
    fixture
        .repository
        .submit_feedback(readers[1], fixture.article(1), FeedbackType::Like, FeedbackIntent::Toggle)
        .await
        .unwrap();
    fixture
        .repository
        .submit_feedback(readers[2], fixture.article(6), FeedbackType::Dislike, FeedbackIntent::Toggle)
        .await
        .unwrap();
    for algorithm in [Algorithm::Rating, Algorithm::Implicit] {
        assert_ok!(train_and_save(&fixture.repository, algorithm, &fixture.config()).await);
    }

    // every article has a reader, and ana and dan have no more than top_n
    // unseen articles, so both models return the same sets
    let (ana, dan) = (readers[0], readers[3]);
    let truth: GroundTruth = HashMap::from([
        (ana, HashSet::from([fixture.article(8)])),
        (dan, HashSet::from([fixture.article(7)])),
    ]);
    let config = EvaluationConfig {
        k: 5,
        top_n: 5,
        ..EvaluationConfig::default()
    };
    let engine = fixture.engine();
    let run = evaluation::run(
        &engine,
        &[Algorithm::Rating, Algorithm::Implicit, Algorithm::Rating],
        &truth,
        &config,
    )
    .await;
    assert_eq!(run.reports.len(), 2);
    assert_ne!(run.reports[0].batch_id, run.reports[1].batch_id);

    for report in &run.reports {
        assert_eq!(report.metrics.users, 2);
        assert_eq!(report.metrics.hit_rate, 1.0);

        let entries = assert_ok!(engine.ledger().entries_for_batch(&report.batch_id).await);
        assert!(entries
            .iter()
            .all(|e| e.algorithm_version == report.algorithm.version()));
        assert_eq!(entries.iter().filter(|e| e.user_id == ana).count(), 5);
        assert_eq!(entries.iter().filter(|e| e.user_id == dan).count(), 3);

        let rescored = assert_ok!(
            evaluation::evaluate_run(engine.ledger(), &run.run_id, report.algorithm, &truth, &config)
                .await
        );
        assert_eq!(rescored.batch_id, report.batch_id);
        assert_eq!(rescored.metrics, report.metrics);
        assert_eq!(rescored.precision_recall, report.precision_recall);
    }
}

#[tokio::test]
async fn rescoring_a_shared_batch_with_lost_rows_fails() {
    let fixture = Fixture::new().await;
    let user = fixture.user("reader").await;
    let engine = fixture.engine();
    let shown = [fixture.article(2), fixture.article(3)];
    engine
        .ledger()
        .record(user, &shown, Some("shared02"), None, Algorithm::Keyword.version())
        .await;
    engine
        .ledger()
        .record(
            user,
            &[fixture.article(3), fixture.article(4)],
            Some("shared02"),
            None,
            Algorithm::Implicit.version(),
        )
        .await;

    let truth: GroundTruth = HashMap::from([(user, HashSet::from([fixture.article(3)]))]);
    let config = EvaluationConfig::default();
    assert_ok!(
        evaluation::evaluate_batch(engine.ledger(), "shared02", Algorithm::Keyword, &truth, &config)
            .await
    );
    assert_err!(
        evaluation::evaluate_batch(engine.ledger(), "shared02", Algorithm::Implicit, &truth, &config)
            .await
    );
}

#[tokio::test]
async fn unknown_batch_scores_zero() {
    let fixture = Fixture::new().await;
    let users = with_readers(&fixture).await;
    let engine = fixture.engine();
    let truth: GroundTruth = HashMap::from([(users[0], HashSet::from([fixture.article(2)]))]);

    let report = assert_ok!(
        evaluation::evaluate_batch(
            engine.ledger(),
            "missing1",
            Algorithm::Keyword,
            &truth,
            &EvaluationConfig::default()
        )
        .await
    );
    assert_eq!(report.metrics.users, 1);
    assert_eq!(report.metrics.ndcg, 0.0);
}

#[tokio::test]
async fn holdout_export_keeps_the_latest_likes() {
    let fixture = Fixture::new().await;
    let users = with_readers(&fixture).await;
    fixture
        .repository
        .submit_feedback(users[0], fixture.article(5), FeedbackType::Dislike, FeedbackIntent::Insert)
        .await
        .unwrap();
    fixture
        .repository
        .submit_feedback(users[1], fixture.article(1), FeedbackType::Like, FeedbackIntent::Insert)
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("holdout").join("feedback.json");

    // four rows, the newest half is held out
    let rows = assert_ok!(evaluation::export_holdout(&fixture.repository, 0.5, &path).await);
    assert_eq!(rows, 2);

    let truth = assert_ok!(evaluation::load_holdout(&path));
    assert_eq!(truth.len(), 1);
    assert_eq!(truth[&users[1]], HashSet::from([fixture.article(1)]));
}
