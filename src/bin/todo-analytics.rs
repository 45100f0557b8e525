//! todo-analytics CLI: operator interface to the analytics pipeline.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use secrecy::ExposeSecret;
use todo_analytics::config::Config;
use todo_analytics::consumer::{Consumer, ConsumerConfig, Router};
use todo_analytics::db::Db;
use todo_analytics::dispatch::{Dispatcher, HttpTransport};
use todo_analytics::identity::IdentityResolver;
use todo_analytics::model::{Context, License};
use todo_analytics::producer::Tracker;
use todo_analytics::queue::PgmqQueue;
use todo_analytics::schedule::{GroupRefreshJob, refresh_group};
use todo_analytics::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "todo-analytics", about = "Analytics event pipeline for the to-do app")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the queue consumer, plus the daily group refresh if an instance is given
    Serve {
        /// Poll interval in milliseconds when the queue is empty
        #[arg(long, default_value_t = 1000)]
        poll_ms: u64,
        /// Visibility timeout (seconds) before an unacked delivery reappears
        #[arg(long, default_value_t = 60)]
        visibility_timeout: i32,
        /// Instance to refresh on a daily schedule
        #[arg(long)]
        refresh_cloud_id: Option<String>,
        /// License is active (scheduled refresh)
        #[arg(long)]
        license_active: Option<bool>,
        /// License is an evaluation (scheduled refresh)
        #[arg(long)]
        license_evaluation: Option<bool>,
    },
    /// Process everything currently on the queue, then exit
    Consume,
    /// Enqueue an identify/group/track bundle
    Track {
        /// Human-readable event name
        event: String,
        #[arg(long)]
        account_id: String,
        #[arg(long)]
        cloud_id: String,
    },
    /// Send a group refresh now, bypassing the queue
    RefreshGroup {
        #[command(flatten)]
        instance: InstanceArgs,
        /// Number of to-do items to report
        #[arg(long)]
        todo_count: Option<u64>,
    },
    /// Install pgmq and create the analytics queue
    InitQueue,
}

#[derive(Args)]
struct InstanceArgs {
    /// Instance (cloud) identifier
    #[arg(long)]
    cloud_id: String,
    /// License is active
    #[arg(long)]
    license_active: Option<bool>,
    /// License is an evaluation
    #[arg(long)]
    license_evaluation: Option<bool>,
}

impl InstanceArgs {
    fn context(&self) -> Context {
        Context::new("", &self.cloud_id).with_license(License {
            is_active: self.license_active,
            is_evaluation: self.license_evaluation,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env();

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "todo-analytics".to_string(),
        log_level: config.log_level.clone(),
    })?;

    match cli.command {
        Command::Serve {
            poll_ms,
            visibility_timeout,
            refresh_cloud_id,
            license_active,
            license_evaluation,
        } => {
            let refresh = refresh_cloud_id.map(|cloud_id| InstanceArgs {
                cloud_id,
                license_active,
                license_evaluation,
            });
            cmd_serve(&config, poll_ms, visibility_timeout, refresh).await
        }
        Command::Consume => cmd_consume(&config).await,
        Command::Track {
            event,
            account_id,
            cloud_id,
        } => cmd_track(&config, &event, Context::new(account_id, cloud_id)).await,
        Command::RefreshGroup {
            instance,
            todo_count,
        } => cmd_refresh_group(&config, instance, todo_count).await,
        Command::InitQueue => {
            open_queue(&config, 60).await?;
            println!("Queue {} ready.", config.queue_name);
            Ok(())
        }
    }
}

async fn open_queue(config: &Config, visibility_timeout: i32) -> anyhow::Result<Arc<PgmqQueue>> {
    let db = Db::connect(config.database_url()?.expose_secret()).await?;
    let queue = PgmqQueue::new(Arc::new(db), &config.queue_name)
        .visibility_timeout(visibility_timeout);
    queue.ensure().await?;
    Ok(Arc::new(queue))
}

fn dispatcher(config: &Config) -> anyhow::Result<Arc<Dispatcher>> {
    let transport = HttpTransport::new()?;
    Ok(Arc::new(Dispatcher::from_config(config, Arc::new(transport))))
}

async fn cmd_serve(
    config: &Config,
    poll_ms: u64,
    visibility_timeout: i32,
    refresh: Option<InstanceArgs>,
) -> anyhow::Result<()> {
    let queue = open_queue(config, visibility_timeout).await?;
    let dispatcher = dispatcher(config)?;
    let resolver = IdentityResolver::from_config(config);

    let consumer = Consumer::new(
        queue,
        Router::new(Arc::clone(&dispatcher)),
        ConsumerConfig {
            poll_interval: Duration::from_millis(poll_ms),
        },
    );

    let refresh_job = refresh.map(|r| {
        Arc::new(GroupRefreshJob::new(
            Arc::clone(&dispatcher),
            resolver,
            r.context(),
        ))
    });
    let refresh_task = refresh_job.as_ref().map(|job| {
        let job = Arc::clone(job);
        tokio::spawn(async move { job.run().await })
    });

    let ctrl = consumer.clone();
    let refresh_stop = refresh_job.as_ref().map(|job| job.shutdown_handle());
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl.shutdown();
        if let Some(stop) = refresh_stop {
            stop.notify_one();
        }
    });

    consumer.run().await?;
    if let Some(task) = refresh_task {
        task.await?;
    }
    Ok(())
}

async fn cmd_consume(config: &Config) -> anyhow::Result<()> {
    let queue = open_queue(config, 60).await?;
    let consumer = Consumer::new(
        queue,
        Router::new(dispatcher(config)?),
        ConsumerConfig::default(),
    );

    let stats = consumer.drain().await?;
    println!(
        "Handled: {}  Discarded: {}  Released: {}",
        stats.handled, stats.discarded, stats.released
    );
    Ok(())
}

async fn cmd_track(config: &Config, event: &str, context: Context) -> anyhow::Result<()> {
    let queue = open_queue(config, 60).await?;
    let tracker = Tracker::new(IdentityResolver::from_config(config), queue);
    tracker.track(&context, event).await?;
    println!("Enqueued bundle for \"{event}\" ({}).", context.cloud_id);
    Ok(())
}

async fn cmd_refresh_group(
    config: &Config,
    instance: InstanceArgs,
    todo_count: Option<u64>,
) -> anyhow::Result<()> {
    let dispatcher = dispatcher(config)?;
    let resolver = IdentityResolver::from_config(config);
    refresh_group(dispatcher.as_ref(), &resolver, &instance.context(), todo_count).await?;
    println!("Refreshed group {}.", instance.cloud_id);
    Ok(())
}
