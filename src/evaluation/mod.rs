mod harness;
mod metrics;

pub use harness::{
    evaluate_batch, evaluate_run, export_holdout, ground_truth, load_holdout, run,
    score_predictions, strategy_batch_id, EvaluationRun, GroundTruth, HoldoutRow, Predictions,
    StrategyReport,
};
pub use metrics::{
    average_precision, evaluate, hit, ndcg, precision_recall, PrecisionRecall, RankingMetrics,
};
