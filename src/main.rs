use std::path::PathBuf;

use clap::{Parser, Subcommand};

use article_recommender::config::Config;
use article_recommender::db::Repository;
use article_recommender::engine::Engine;
use article_recommender::error::{AppError, Result};
use article_recommender::evaluation::{self, GroundTruth};
use article_recommender::factorization::train_and_save;
use article_recommender::models::{Algorithm, FeedbackIntent, FeedbackType};

#[derive(Parser)]
#[command(name = "newsrec")]
#[command(about = "Article recommendations and offline ranking evaluation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the user config directory)
    #[arg(long, env = "NEWSREC_CONFIG")]
    config: Option<PathBuf>,

    /// Database path (overrides the config file)
    #[arg(long, env = "NEWSREC_DB_PATH")]
    db_path: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend articles for a user
    Recommend {
        #[arg(short, long)]
        user: i64,

        /// keyword, rating or implicit
        #[arg(short, long, default_value = "keyword")]
        algorithm: String,

        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// Ledger batch id (a fresh one when omitted)
        #[arg(long)]
        batch: Option<String>,

        #[arg(long)]
        session: Option<String>,
    },

    /// Like or dislike an article
    Feedback {
        #[arg(short, long)]
        user: i64,

        #[arg(long)]
        article: i64,

        /// like or dislike
        #[arg(short = 't', long = "type")]
        feedback_type: String,

        /// toggle, replace or insert
        #[arg(long, default_value = "toggle")]
        intent: String,
    },

    /// Train a latent-factor model and save its artifact
    Train {
        /// rating or implicit
        #[arg(short, long)]
        algorithm: String,
    },

    /// Compute ranking metrics for one or more algorithms
    Evaluate {
        /// Algorithms to evaluate (defaults to all)
        #[arg(short, long)]
        algorithm: Vec<String>,

        /// Score an existing ledger batch instead of generating new lists
        #[arg(long, conflicts_with = "run")]
        batch: Option<String>,

        /// Re-score the per-algorithm batches of an earlier run
        #[arg(long)]
        run: Option<String>,

        /// Holdout feedback file to use as ground truth
        #[arg(long)]
        holdout: Option<PathBuf>,

        /// Cutoff for the ranking metrics
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Write the most recent feedback rows to a holdout file
    ExportHoldout {
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long)]
        fraction: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Only warnings and errors by default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }

    match cli.command {
        Commands::Recommend {
            user,
            algorithm,
            top_n,
            batch,
            session,
        } => {
            let algorithm: Algorithm = algorithm.parse()?;
            let top_n = top_n.unwrap_or(config.default_top_n);
            let engine = Engine::new(config).await?;

            let (articles, summary) = engine
                .recommend_and_record(user, algorithm, top_n, batch.as_deref(), session.as_deref())
                .await;
            eprintln!(
                "Recorded batch {} ({} new, {} already present)",
                summary.batch_id, summary.inserted, summary.skipped
            );

            if articles.is_empty() {
                println!("No recommendations for user {}", user);
            }
            for (i, article) in articles.iter().enumerate() {
                println!("{:>3}. [{}] {}", i + 1, article.id, article.title);
            }
        }
        Commands::Feedback {
            user,
            article,
            feedback_type,
            intent,
        } => {
            let feedback_type: FeedbackType = feedback_type.parse()?;
            let intent: FeedbackIntent = intent.parse()?;
            let engine = Engine::new(config).await?;
            let change = engine
                .submit_feedback(user, article, feedback_type, intent)
                .await?;
            println!("{:?}", change);
        }
        Commands::Train { algorithm } => {
            let algorithm: Algorithm = algorithm.parse()?;
            if !algorithm.is_latent() {
                return Err(AppError::InvalidInput(format!(
                    "{} has no trained model; choose rating or implicit",
                    algorithm
                )));
            }
            let repository = Repository::new(&config.db_path).await?;
            let (path, report) = train_and_save(&repository, algorithm, &config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            eprintln!("Saved model to {:?}", path);
        }
        Commands::Evaluate {
            algorithm,
            batch,
            run,
            holdout,
            k,
        } => {
            let algorithms: Vec<Algorithm> = if algorithm.is_empty() {
                Algorithm::ALL.to_vec()
            } else {
                algorithm
                    .iter()
                    .map(|a| a.parse())
                    .collect::<Result<Vec<_>>>()?
            };
            let mut evaluation_config = config.evaluation.clone();
            if let Some(k) = k {
                if k == 0 {
                    return Err(AppError::InvalidInput("k must be positive".into()));
                }
                evaluation_config.k = k;
            }
            let engine = Engine::new(config).await?;

            let truth: GroundTruth = match &holdout {
                Some(path) => evaluation::load_holdout(path)?,
                None => {
                    evaluation::ground_truth(engine.repository(), evaluation_config.ground_truth)
                        .await?
                }
            };

            match (batch, run) {
                (Some(batch_id), _) => {
                    for algorithm in algorithms {
                        let report = evaluation::evaluate_batch(
                            engine.ledger(),
                            &batch_id,
                            algorithm,
                            &truth,
                            &evaluation_config,
                        )
                        .await?;
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    }
                }
                (None, Some(run_id)) => {
                    for algorithm in algorithms {
                        let report = evaluation::evaluate_run(
                            engine.ledger(),
                            &run_id,
                            algorithm,
                            &truth,
                            &evaluation_config,
                        )
                        .await?;
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    }
                }
                (None, None) => {
                    let run = evaluation::run(&engine, &algorithms, &truth, &evaluation_config).await;
                    println!("{}", serde_json::to_string_pretty(&run)?);
                }
            }
        }
        Commands::ExportHoldout { output, fraction } => {
            let fraction = fraction.unwrap_or(config.evaluation.holdout_fraction);
            let repository = Repository::new(&config.db_path).await?;
            let rows = evaluation::export_holdout(&repository, fraction, &output).await?;
            println!("Exported {} feedback rows to {:?}", rows, output);
        }
    }

    Ok(())
}
