use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stockham_ntt::{EngineConfig, Goldilocks, HostBackend, NttContext};

fn shared_context(slots: usize) -> Arc<NttContext<HostBackend>> {
    let _ = pretty_env_logger::try_init();
    let config = EngineConfig {
        max_log_size: 9,
        scratch_slots: slots,
        host_threads: Some(2),
        ..EngineConfig::default()
    };
    Arc::new(NttContext::<HostBackend>::open(&config).unwrap())
}

#[test]
fn threads_outnumbering_slots_all_succeed() {
    let ctx = shared_context(2);
    assert_eq!(ctx.concurrency_limit(), 2);
    let done = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8u64)
        .map(|seed| {
            let ctx = ctx.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                for round in 0..10 {
                    let n = 1usize << (round % 6 + 1);
                    let coeffs: Vec<Goldilocks> = (0..n)
                        .map(|_| Goldilocks::from_u64(rng.random::<u64>()))
                        .collect();
                    let shift = Goldilocks::from_u64(seed + 3);
                    let lde = ctx
                        .evaluate_poly_with_offset(&coeffs, n, shift, 4, 4 * n)
                        .unwrap();
                    let back = ctx.interpolate_poly_with_offset(&lde, 4 * n, shift).unwrap();
                    assert_eq!(&back[..n], &coeffs[..]);
                    assert!(back[n..].iter().all(|v| v.is_zero()));
                }
                done.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(done.load(Ordering::SeqCst), 8);
}

#[test]
fn single_slot_serializes_without_deadlock() {
    let ctx = shared_context(1);
    std::thread::scope(|scope| {
        for t in 0..4u64 {
            let ctx = &ctx;
            scope.spawn(move || {
                let values: Vec<Goldilocks> = (0..64).map(|i| Goldilocks::from(i * t + 1)).collect();
                for _ in 0..5 {
                    let coeffs = ctx.interpolate_poly(&values, 64).unwrap();
                    let again = ctx.evaluate_poly(&coeffs, 64).unwrap();
                    assert_eq!(&again[..], &values[..]);
                }
            });
        }
    });
}

#[test]
fn context_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NttContext<HostBackend>>();
    assert_send_sync::<stockham_ntt::NttContext>();
}
