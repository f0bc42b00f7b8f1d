//! Benchmark: acquisition and return on the uncontended and contended paths

use connpool::{Pool, PoolConfiguration};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::thread;
use std::time::Duration;

fn pool(max_cap: usize) -> Pool<Vec<u8>> {
    Pool::new(
        PoolConfiguration::new()
            .with_factory(|| Ok(vec![0u8; 256]))
            .with_close(|_| Ok(()))
            .with_initial_cap(max_cap)
            .with_max_cap(max_cap)
            .with_max_idle(max_cap)
            .with_wait_timeout(Duration::from_secs(1)),
    )
    .unwrap()
}

fn benchmark_idle_reuse(c: &mut Criterion) {
    let pool = pool(4);

    c.bench_function("get_put_idle_reuse", |b| {
        b.iter(|| {
            let conn = pool.get().unwrap();
            black_box(conn.len());
        });
    });
}

fn benchmark_contended_handoff(c: &mut Criterion) {
    let pool = pool(2);

    c.bench_function("get_put_8_threads_2_resources", |b| {
        b.iter(|| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let pool = pool.clone();
                    thread::spawn(move || {
                        for _ in 0..16 {
                            let conn = pool.get().unwrap();
                            black_box(conn.len());
                        }
                    })
                })
                .collect();

            for worker in workers {
                worker.join().unwrap();
            }
        });
    });
}

criterion_group!(benches, benchmark_idle_reuse, benchmark_contended_handoff);
criterion_main!(benches);
