use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crypto_trading_env::{
    constants::{
        defaults::{EPISODES, WORKERS},
        env::PRICE_COLUMN,
        files::MONITOR_PATH,
    },
    data::MarketData,
    env::{EnvConfig, ResetOptions, VecEnv},
    history::{write_records, EpisodeSummary, MetaHistory},
    policy::{Policy, PolicyKind},
};

#[derive(Parser)]
#[command(name = "crypto_trading_env")]
#[command(about = "BTC accumulation environment over minute, hour and day bars", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct TablePaths {
    #[arg(long)]
    minute: PathBuf,

    #[arg(long)]
    hour: PathBuf,

    #[arg(long)]
    day: PathBuf,

    #[arg(long, default_value = PRICE_COLUMN)]
    price_column: String,
}

impl TablePaths {
    fn load(&self) -> Result<Arc<MarketData>> {
        MarketData::load(&self.minute, &self.hour, &self.day, &self.price_column).with_context(
            || {
                format!(
                    "loading tables {:?}, {:?}, {:?}",
                    self.minute, self.hour, self.day
                )
            },
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Load the tables and check every minute bar has an hour and a day bar
    Check {
        #[command(flatten)]
        tables: TablePaths,
    },
    /// Run baseline policy episodes on a pool of workers
    Rollout {
        #[command(flatten)]
        tables: TablePaths,

        #[arg(short, long, default_value_t = EPISODES)]
        episodes: usize,

        #[arg(short, long, default_value_t = WORKERS)]
        workers: usize,

        #[arg(long, default_value_t = 1)]
        envs_per_worker: usize,

        #[arg(short, long, value_enum, default_value_t = PolicyKind::Dca)]
        policy: PolicyKind,

        #[arg(short, long)]
        seed: Option<u64>,

        #[arg(long)]
        initial_balance: Option<f64>,

        #[arg(long)]
        episode_length: Option<usize>,

        #[arg(short, long, default_value_t = false)]
        testing: bool,

        #[arg(long, default_value_t = false)]
        raw_observations: bool,

        /// Directory for the monitor csv files of worker 0 (testing mode)
        #[arg(long, default_value = MONITOR_PATH)]
        monitor_out: PathBuf,

        /// Write the episode summaries here as a postcard report
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

struct RolloutJob {
    worker_id: usize,
    episodes: usize,
    envs: usize,
    policy: PolicyKind,
    config: EnvConfig,
    options: ResetOptions,
    monitor_dir: Option<PathBuf>,
    run_id: Uuid,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    println!("{}", "Start".green());

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { tables } => check(&tables)?,
        Commands::Rollout {
            tables,
            episodes,
            workers,
            envs_per_worker,
            policy,
            seed,
            initial_balance,
            episode_length,
            testing,
            raw_observations,
            monitor_out,
            report,
        } => {
            let config = EnvConfig {
                testing,
                normalize: !raw_observations,
                price_column: tables.price_column.clone(),
                seed,
                ..EnvConfig::default()
            };
            let options = ResetOptions {
                initial_balance,
                episode_length,
                start_index: None,
            };

            let history = rollout(
                &tables,
                config,
                options,
                policy,
                episodes,
                workers,
                envs_per_worker,
                testing.then_some(monitor_out),
            )
            .await?;

            history.print_summary(&format!("{policy:?}"));

            if let Some(path) = report {
                history
                    .write_report(&path)
                    .with_context(|| format!("writing report {path:?}"))?;
                info!(?path, "wrote rollout report");
            }
        }
    }

    println!("{}", "End".green());
    Ok(())
}

fn check(tables: &TablePaths) -> Result<()> {
    let data = tables.load()?;

    for table in [&data.minute, &data.hour, &data.day] {
        println!(
            "{} {} rows x {} features ({} .. {})",
            table.name().bright_blue().bold(),
            table.len(),
            table.feature_count(),
            table.time(0),
            table.time(table.len() - 1),
        );
    }

    data.validate_alignment()
        .context("minute bars are not covered by the hour and day tables")?;
    println!("{}", "Alignment ok".bright_green());

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn rollout(
    tables: &TablePaths,
    config: EnvConfig,
    options: ResetOptions,
    policy: PolicyKind,
    episodes: usize,
    workers: usize,
    envs_per_worker: usize,
    monitor_dir: Option<PathBuf>,
) -> Result<MetaHistory> {
    if workers == 0 || envs_per_worker == 0 {
        bail!("need at least one worker and one env per worker");
    }

    let data = tables.load()?;
    let run_id = Uuid::new_v4();
    info!(%run_id, episodes, workers, ?policy, "starting rollout");

    if let Some(dir) = &monitor_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {dir:?}"))?;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<EpisodeSummary>();
    let mut handles = Vec::with_capacity(workers);

    for worker_id in 0..workers {
        let worker_episodes = episodes / workers + usize::from(worker_id < episodes % workers);
        if worker_episodes == 0 {
            continue;
        }

        let job = RolloutJob {
            worker_id,
            episodes: worker_episodes,
            envs: envs_per_worker,
            policy,
            config: EnvConfig {
                testing: config.testing && worker_id == 0,
                seed: config
                    .seed
                    .map(|seed| seed.wrapping_add((worker_id * envs_per_worker) as u64)),
                ..config.clone()
            },
            options,
            monitor_dir: monitor_dir.clone().filter(|_| worker_id == 0),
            run_id,
        };

        let data = Arc::clone(&data);
        let tx = tx.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            run_worker(job, data, tx)
        }));
    }
    drop(tx);

    let mut history = MetaHistory::default();
    while let Some(summary) = rx.recv().await {
        history.record(summary);
    }

    for handle in handles {
        handle.await.context("rollout worker panicked")??;
    }

    Ok(history)
}

fn run_worker(
    job: RolloutJob,
    data: Arc<MarketData>,
    tx: mpsc::UnboundedSender<EpisodeSummary>,
) -> Result<()> {
    let mut vec_env = VecEnv::new(data, job.config.clone(), job.envs)?.with_reset_options(job.options);
    let base_seed = job.config.seed.unwrap_or(job.worker_id as u64);
    let mut policies: Vec<Box<dyn Policy>> = (0..job.envs)
        .map(|index| job.policy.build(base_seed.wrapping_add(index as u64)))
        .collect();

    let mut observations = vec_env.reset()?;
    let mut completed = 0;

    while completed < job.episodes {
        let actions: Vec<Vec<f64>> = policies
            .iter_mut()
            .zip(&vec_env.envs)
            .enumerate()
            .map(|(row, (policy, env))| policy.act(observations.row(row), env).to_vec())
            .collect();

        let step = vec_env.step(&actions)?;

        for (summary, records) in step.summaries.into_iter().zip(step.episode_records) {
            let Some(summary) = summary else {
                continue;
            };

            if let (Some(dir), Some(records)) = (&job.monitor_dir, records) {
                let path = monitor_path(dir, &job.run_id, &summary);
                match write_records(&path, &records) {
                    Ok(()) => info!(?path, rows = records.len(), "wrote monitor"),
                    Err(err) => warn!(?path, %err, "failed to write monitor"),
                }
            }

            if completed < job.episodes {
                completed += 1;
                tx.send(summary).context("rollout collector closed")?;
            }
        }

        observations = step.observations;
    }

    Ok(())
}

fn monitor_path(dir: &Path, run_id: &Uuid, summary: &EpisodeSummary) -> PathBuf {
    dir.join(format!(
        "{run_id}_env{}_ep{}.csv",
        summary.env_id, summary.episode
    ))
}
