//! Demo runner for the dispatcher.
//!
//! Usage: `dispatch-demo [config.json] [jobs] [stop_after_ms]`
//!
//! Submits `jobs` short sleeping jobs, stops the dispatcher after
//! `stop_after_ms` and prints the final counters.

use std::time::Duration;

use dispatcher::{Dispatcher, DispatcherConfig, FnJob};

const DEFAULT_JOBS: usize = 200;
const DEFAULT_STOP_AFTER_MS: u64 = 100;

fn load_config(path: Option<&str>) -> Result<DispatcherConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Ok(DispatcherConfig::from_json(&raw)?)
        }
        None => Ok(DispatcherConfig::new(5, 10).with_name("demo")),
    }
}

fn demo_job(n: usize) -> FnJob {
    let id = format!("demo-{}", n);
    let job = if n % 50 == 49 {
        // Every fiftieth job fails to show panic containment.
        FnJob::new(id, move || async move {
            panic!("demo job {} failed", n);
        })
    } else {
        FnJob::new(id, move || async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tracing::debug!("demo job {} done", n);
        })
    };
    job.on_cancel(move || tracing::info!("demo job {} cancelled", n))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config(args.first().map(String::as_str))?;
    let jobs = match args.get(1) {
        Some(raw) => raw.parse()?,
        None => DEFAULT_JOBS,
    };
    let stop_after = match args.get(2) {
        Some(raw) => Duration::from_millis(raw.parse()?),
        None => Duration::from_millis(DEFAULT_STOP_AFTER_MS),
    };

    let dispatcher = Dispatcher::builder(config)
        .with_diagnostics(std::io::stderr())
        .on_exit(|| tracing::info!("demo dispatcher exited"))
        .spawn()
        .await?;
    dispatcher.run();

    let producer = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            for n in 0..jobs {
                dispatcher.add(demo_job(n)).await;
            }
        })
    };

    tokio::time::sleep(stop_after).await;
    tracing::info!(
        queue = dispatcher.queue(),
        running = dispatcher.running(),
        "stopping demo dispatcher"
    );
    dispatcher.stop();

    producer.await?;
    dispatcher.wait_close().await;

    let stats = dispatcher.stats();
    tracing::info!("{}", stats.summary());
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
