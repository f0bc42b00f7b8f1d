// Demo binary for the connpool library.
// Run with: RUST_LOG=connpool=trace cargo run

use connpool::{MetricsExporter, Pool, PoolConfiguration, PoolError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct DemoConnection {
    id: usize,
}

fn main() -> Result<(), PoolError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let next_id = Arc::new(AtomicUsize::new(1));
    let pool = Pool::new(
        PoolConfiguration::new()
            .with_factory(move || Ok(DemoConnection { id: next_id.fetch_add(1, Ordering::Relaxed) }))
            .with_close(|conn: DemoConnection| {
                tracing::info!(id = conn.id, "closing connection");
                Ok(())
            })
            .with_initial_cap(1)
            .with_max_cap(2)
            .with_max_idle(2)
            .with_wait_timeout(Duration::from_millis(200)),
    )?;

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let pool = pool.clone();
            thread::spawn(move || match pool.get() {
                Ok(conn) => {
                    tracing::info!(worker, conn = conn.id, "working");
                    thread::sleep(Duration::from_millis(50));
                }
                Err(err) => tracing::warn!(worker, error = %err, "no connection"),
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker thread panicked");
    }

    println!("{:?}", pool.stats());
    print!("{}", MetricsExporter::export_prometheus(&pool.metrics(), "demo", None));

    pool.release();
    Ok(())
}
