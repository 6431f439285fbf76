use std::sync::Arc;

use surge_metrics::{Aggregate, Registry, Tags};

fn tags(vu_id: u64, iteration: u64) -> Tags {
    Tags::new(
        vu_id,
        iteration,
        Arc::from("ultralight"),
        Arc::from("homepage"),
    )
}

/// Writes `9_900` true and `100` false observations spread over `writers` tasks.
async fn write_rates(registry: Arc<Registry>, writers: u64) {
    let total: u64 = 10_000;
    let mut handles = Vec::new();

    for w in 0..writers {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let mut i = w;
            while i < total {
                registry.observe_rate("successes", i >= 100, &tags(w, i));
                registry.increment_counter("total_requests", 1, &tags(w, i));
                i += writers;
                if i % 64 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }

    for h in handles {
        h.await.unwrap_or_else(|e| panic!("writer task failed: {e}"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn rate_is_exact_under_concurrent_writers() {
    for writers in [1, 3, 16, 97] {
        let registry = Arc::new(Registry::default());
        write_rates(registry.clone(), writers).await;

        let snap = registry.snapshot().unwrap_or_else(|e| panic!("{e}"));
        let rate = snap
            .rate("successes")
            .unwrap_or_else(|| panic!("missing successes rate"));
        assert_eq!(rate.total, 10_000);
        assert_eq!(rate.hits, 9_900);
        assert_eq!(rate.rate(), Some(0.99), "writers={writers}");
        assert_eq!(snap.counter("total_requests"), Some(10_000));
    }
}

#[test]
fn trend_summary_does_not_depend_on_interleaving() {
    let values: Vec<f64> = (0..2_000).map(|i| f64::from((i * 7919) % 1_000) / 10.0).collect();

    let summarize = |threads: usize| {
        let registry = Arc::new(Registry::default());
        std::thread::scope(|scope| {
            for t in 0..threads {
                let registry = registry.clone();
                let values = &values;
                scope.spawn(move || {
                    for (i, v) in values.iter().enumerate().skip(t).step_by(threads) {
                        registry.observe_trend("response_time", *v, &tags(t as u64, i as u64));
                    }
                });
            }
        });
        match registry.snapshot() {
            Ok(snap) => snap.get("response_time").cloned(),
            Err(e) => panic!("{e}"),
        }
    };

    let single = summarize(1);
    let many = summarize(12);
    assert_eq!(single, many);

    let Some(Aggregate::Trend(t)) = single else {
        panic!("expected trend aggregate");
    };
    assert_eq!(t.count(), 2_000);
    assert_eq!(t.min(), Some(0.0));
    assert_eq!(t.max(), Some(99.9));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn gauge_peak_survives_concurrent_enter_and_leave() {
    let registry = Arc::new(Registry::default());
    let mut handles = Vec::new();

    for vu in 0..50u64 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.adjust_gauge("active_users", 1, &tags(vu, 0));
            tokio::task::yield_now().await;
            registry.adjust_gauge("active_users", -1, &tags(vu, 0));
        }));
    }
    for h in handles {
        h.await.unwrap_or_else(|e| panic!("{e}"));
    }

    let snap = registry.snapshot().unwrap_or_else(|e| panic!("{e}"));
    let gauge = snap
        .gauge("active_users")
        .unwrap_or_else(|| panic!("missing gauge"));
    assert_eq!(gauge.value, 0);
    assert!((1..=50).contains(&gauge.max), "max={}", gauge.max);
}
