use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use taskweave::{CallMode, FetchResult, Orchestrator, Payload, WorkerRegistration};
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let orchestrator: Orchestrator<String, u64, u64> = Orchestrator::from_env()?;

    eprintln!("taskweave v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Dispatcher: {:?}", orchestrator.dispatcher().config());

    // Heartbeat: fires on an interval and on demand.
    let beats = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&beats);
    orchestrator.worker().register(
        "heartbeat",
        WorkerRegistration::new(move |payload: Payload<String>| {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                match payload {
                    Payload::Data(note) => tracing::info!(beat = n, note = %note, "Heartbeat"),
                    _ => tracing::info!(beat = n, "Heartbeat"),
                }
                true
            }
        })
        .interval(Duration::from_millis(200)),
    );

    // Debounced bursts collapse into a single run.
    for _ in 0..5 {
        orchestrator.worker().call("heartbeat", CallMode::Debounced);
    }
    orchestrator.worker().push("heartbeat", "manual".to_string());

    // Fetcher: square numbers through the shared dispatcher.
    orchestrator.fetcher().register(
        "square",
        Duration::ZERO,
        |n: u64| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, anyhow::Error>(FetchResult::ok(n * n))
        },
        |result: FetchResult<u64>| tracing::debug!(code = result.code, "Square fetched"),
        || true,
    );

    let (tx, rx) = oneshot::channel();
    let mut payloads = HashMap::new();
    payloads.insert("square".to_string(), (1..=8).collect::<Vec<u64>>());
    orchestrator
        .fetcher()
        .dispatch(
            payloads,
            |total| tracing::info!(total, "Fetch batch submitted"),
            move |results| {
                let _ = tx.send(results);
            },
        )
        .await;

    let results = rx.await?;
    let mut squares: Vec<(u64, u64)> = results
        .into_iter()
        .filter_map(|(item, result)| result.data.map(|data| (item, data)))
        .collect();
    squares.sort();
    eprintln!("   Squares: {:?}", squares);

    tokio::time::sleep(Duration::from_secs(1)).await;

    let status = serde_json::to_string_pretty(&orchestrator.worker().status())?;
    eprintln!("   Beats: {}", beats.load(Ordering::SeqCst));
    eprintln!("   Worker status:\n{}", status);
    eprintln!("   Dispatcher stats: {:?}", orchestrator.dispatcher().stats());

    orchestrator.shutdown();
    Ok(())
}
