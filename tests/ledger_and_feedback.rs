mod common;

use std::collections::HashSet;
use std::sync::Arc;

use tokio_test::{assert_err, assert_ok};

use article_recommender::error::AppError;
use article_recommender::models::{Algorithm, FeedbackChange, FeedbackIntent, FeedbackType};
use common::Fixture;

#[tokio::test]
async fn recording_a_batch_twice_is_idempotent() {
    let fixture = Fixture::new().await;
    let user = fixture.user("reader").await;
    let engine = fixture.engine();
    let list = vec![fixture.article(4), fixture.article(2), fixture.article(7)];

    let first = engine
        .ledger()
        .record(user, &list, Some("batch001"), Some("sess"), "keyword-v1")
        .await;
    assert_eq!((first.inserted, first.skipped, first.failed), (3, 0, 0));

    let second = engine
        .ledger()
        .record(user, &list, Some("batch001"), Some("sess"), "keyword-v1")
        .await;
    assert_eq!((second.inserted, second.skipped, second.failed), (0, 3, 0));

    let entries = assert_ok!(engine.ledger().entries_for_batch("batch001").await);
    assert_eq!(entries.len(), 3);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.article_id, list[i]);
        assert_eq!(entry.rank, i as u32 + 1);
        assert!((entry.score - 1.0 / (i as f64 + 1.0)).abs() < 1e-12);
        assert_eq!(entry.session_id.as_deref(), Some("sess"));
    }

    let predictions = assert_ok!(engine.ledger().predictions_for_batch("batch001", "keyword-v1").await);
    assert_eq!(predictions[&user], list);
}

#[tokio::test]
async fn recommend_and_record_uses_a_fresh_batch_by_default() {
    let fixture = Fixture::new().await;
    let user = fixture.user("reader").await;
    let engine = fixture.engine();

    let (articles, summary) = engine
        .recommend_and_record(user, Algorithm::Keyword, 3, None, None)
        .await;
    assert_eq!(articles.len(), 3);
    assert_eq!(summary.batch_id.len(), 8);
    assert_eq!(summary.inserted, 3);

    let history = assert_ok!(engine.ledger().entries_for_user(user).await);
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|e| e.algorithm_version == "keyword-v1"));

    // shown articles count as seen
    let seen = assert_ok!(fixture.repository.seen_article_ids(user).await);
    assert!(articles.iter().all(|a| seen.contains(&a.id)));
}

#[tokio::test]
async fn toggle_cancels_and_switches_feedback() {
    let fixture = Fixture::new().await;
    let user = fixture.user("reader").await;
    let article = fixture.article(1);
    let engine = fixture.engine();

    let steps = [
        (FeedbackType::Like, FeedbackChange::Inserted),
        (FeedbackType::Like, FeedbackChange::Cancelled),
        (FeedbackType::Like, FeedbackChange::Inserted),
        (FeedbackType::Dislike, FeedbackChange::Updated),
    ];
    for (feedback_type, expected) in steps {
        let change = assert_ok!(
            engine
                .submit_feedback(user, article, feedback_type, FeedbackIntent::Toggle)
                .await
        );
        assert_eq!(change, expected);
    }

    let disliked = assert_ok!(fixture.repository.disliked_article_ids(user).await);
    assert_eq!(disliked, HashSet::from([article]));
}

#[tokio::test]
async fn replace_and_insert_intents() {
    let fixture = Fixture::new().await;
    let user = fixture.user("reader").await;
    let article = fixture.article(2);
    let engine = fixture.engine();

    let change = engine
        .submit_feedback(user, article, FeedbackType::Like, FeedbackIntent::Insert)
        .await;
    assert_eq!(assert_ok!(change), FeedbackChange::Inserted);

    let duplicate = engine
        .submit_feedback(user, article, FeedbackType::Dislike, FeedbackIntent::Insert)
        .await;
    let err = assert_err!(duplicate);
    assert!(matches!(err, AppError::DuplicateFeedback { .. }));

    let same = engine
        .submit_feedback(user, article, FeedbackType::Like, FeedbackIntent::Replace)
        .await;
    assert_eq!(assert_ok!(same), FeedbackChange::Unchanged);

    let flipped = engine
        .submit_feedback(user, article, FeedbackType::Dislike, FeedbackIntent::Replace)
        .await;
    assert_eq!(assert_ok!(flipped), FeedbackChange::Updated);

    let feedback = assert_ok!(fixture.repository.feedback_events(user).await);
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].feedback_type, FeedbackType::Dislike);
}

#[tokio::test]
async fn concurrent_toggles_leave_one_consistent_row() {
    let fixture = Fixture::new().await;
    let user = fixture.user("reader").await;
    let article = fixture.article(3);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let repository = Arc::clone(&fixture.repository);
        handles.push(tokio::spawn(async move {
            repository
                .submit_feedback(user, article, FeedbackType::Like, FeedbackIntent::Toggle)
                .await
        }));
    }

    let mut inserted = 0;
    let mut cancelled = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            FeedbackChange::Inserted => inserted += 1,
            FeedbackChange::Cancelled => cancelled += 1,
            other => panic!("unexpected change {:?}", other),
        }
    }
    assert_eq!((inserted, cancelled), (2, 2));

    // an even number of toggles leaves no row behind
    let feedback = fixture.repository.feedback_events(user).await.unwrap();
    assert!(feedback.is_empty());
}

#[tokio::test]
async fn shared_batch_with_overlapping_lists_is_refused() {
    let fixture = Fixture::new().await;
    let user = fixture.user("reader").await;
    let engine = fixture.engine();
    let (a, b, c) = (fixture.article(1), fixture.article(2), fixture.article(3));

    let first = engine
        .ledger()
        .record(user, &[a, b], Some("shared01"), None, "keyword-v1")
        .await;
    assert_eq!(first.inserted, 2);

    // b is already keyed to keyword-v1 in this batch
    let second = engine
        .ledger()
        .record(user, &[b, c], Some("shared01"), None, "svdpp-v1")
        .await;
    assert_eq!((second.inserted, second.skipped), (1, 1));

    let keyword = assert_ok!(engine.ledger().predictions_for_batch("shared01", "keyword-v1").await);
    assert_eq!(keyword[&user], vec![a, b]);

    let err = assert_err!(engine.ledger().predictions_for_batch("shared01", "svdpp-v1").await);
    assert!(matches!(err, AppError::IncompleteBatch { rank: 1, .. }));
}
