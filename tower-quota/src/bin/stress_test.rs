use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use clap::Parser;
use hdrhistogram::Histogram;
use rand::Rng;
use tokio::sync::Barrier;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tower::BoxError;
use tower::Service;
use tower::ServiceBuilder;
use tower::ServiceExt;
use tower::service_fn;
use tower_quota::AdmissionConfig;
use tower_quota::AdmissionLayer;
use tower_quota::GatewayError;
use tower_quota::Reply;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quota_limit::UpstreamError;

/// Drive concurrent prompts through the admission stack against a simulated
/// upstream that fails some of the time.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file layered over the bundled defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of concurrent calls to issue
    #[arg(short = 'n', long, default_value_t = 200)]
    requests: usize,

    /// Share of upstream calls answered with "too many requests"
    #[arg(long, default_value_t = 0.05)]
    rate_limited: f64,

    /// Share of upstream calls that fail transiently
    #[arg(long, default_value_t = 0.1)]
    transient: f64,

    /// Simulated upstream latency
    #[arg(long, default_value = "20ms", value_parser = humantime::parse_duration)]
    latency: Duration,
}

#[derive(Default)]
struct OutcomeCounter {
    content: usize,
    daily_limit: usize,
    try_again: usize,
    rate_limited: usize,
    unknown: usize,
}

async fn run_load_test<S>(svc: S, total_reqs: usize) -> Result<(), BoxError>
where
    S: Service<String, Response = Reply<String>, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send,
{
    let mut hist_elapsed = Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3)?;
    let mut tasks = JoinSet::new();
    let mut outcomes = OutcomeCounter::default();

    let start = Instant::now();
    let barrier = Arc::new(Barrier::new(total_reqs));

    for i in 0..total_reqs {
        let local_svc = svc.clone();
        let bar = barrier.clone();
        tasks.spawn(async move {
            bar.wait().await;
            let req_start = Instant::now();
            let res = local_svc.oneshot(format!("prompt #{i}")).await;
            (res, req_start.elapsed())
        });
    }

    while let Some(task) = tasks.join_next().await {
        let (res, elapsed) = task?;
        hist_elapsed.saturating_record(elapsed.as_micros() as u64);
        match res {
            Ok(Reply::Content(_)) => outcomes.content += 1,
            Ok(Reply::DailyLimitExceeded) => outcomes.daily_limit += 1,
            Ok(Reply::TryAgainLater) => outcomes.try_again += 1,
            Err(e) => match e.downcast_ref::<GatewayError>() {
                Some(GatewayError::UpstreamRateLimited { .. }) => outcomes.rate_limited += 1,
                _ => outcomes.unknown += 1,
            },
        }
    }

    let total_duration = start.elapsed();
    let goodput = outcomes.content as f64 / total_duration.as_secs_f64();

    println!("--- Admission ---");
    println!("Total Duration:  {:.2?}", total_duration);
    println!("Content/Total:   {}/{}", outcomes.content, total_reqs);
    println!("Content Rate:    {:.2} req/sec (Goodput)", goodput);
    println!("P50 (Elapsed):   {}µs", hist_elapsed.value_at_quantile(0.5));
    println!("P99 (Elapsed):   {}µs", hist_elapsed.value_at_quantile(0.99));
    println!("Max (Elapsed):   {}µs", hist_elapsed.max());
    println!("Degraded:        {}", outcomes.daily_limit + outcomes.try_again);
    println!("  └─ DayLimit:   {}", outcomes.daily_limit);
    println!("  └─ TryAgain:   {}", outcomes.try_again);
    println!("Errors:          {}", outcomes.rate_limited + outcomes.unknown);
    println!("  └─ RateLimit:  {}", outcomes.rate_limited);
    if outcomes.unknown > 0 {
        println!("  └─ Unknown:    {}", outcomes.unknown);
    }
    println!();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AdmissionConfig::from_file(path)?,
        None => AdmissionConfig::load()?,
    };
    info!(?config, requests = args.requests, "starting load test");

    let (rate_limited, transient, latency) = (args.rate_limited, args.transient, args.latency);
    let upstream = service_fn(move |prompt: String| async move {
        sleep(latency).await;
        let roll: f64 = rand::rng().random();
        if roll < rate_limited {
            Err(BoxError::from(UpstreamError::RateLimited))
        } else if roll < rate_limited + transient {
            Err(BoxError::from(UpstreamError::transient(
                "503 Service Unavailable",
            )))
        } else {
            Ok(format!("answer to {prompt}"))
        }
    });

    let svc = ServiceBuilder::new()
        .layer(AdmissionLayer::new(config.build()))
        .service(upstream);
    run_load_test(svc, args.requests).await
}
