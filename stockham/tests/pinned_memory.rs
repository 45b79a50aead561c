use stockham_ntt::{
    allocate_vector, build_context, free_vector, Goldilocks, HostMemoryConfig, HostMemoryPool,
    NttError, MODULUS,
};

#[test]
fn vectors_start_zeroed() {
    let _ = pretty_env_logger::try_init();
    let vec = allocate_vector(1000).unwrap();
    assert_eq!(vec.len(), 1000);
    assert!(!vec.is_empty());
    assert!(vec.iter().all(|v| v.is_zero()));
    free_vector(vec);
}

#[test]
fn vectors_are_page_aligned() {
    let vec = allocate_vector(3).unwrap();
    assert_eq!(vec.as_ptr() as usize % 4096, 0);
    assert!(vec.capacity_bytes() >= 3 * 8);
    assert_eq!(vec.capacity_bytes() % 4096, 0);
}

#[test]
fn zero_length_is_rejected() {
    assert!(matches!(
        allocate_vector(0),
        Err(NttError::InvalidSize { size: 0, .. })
    ));
}

#[test]
fn raw_words_are_reduced() {
    let mut vec = allocate_vector(3).unwrap();
    vec.copy_from_u64s(&[1, MODULUS, u64::MAX]).unwrap();
    assert_eq!(vec.to_u64s(), vec![1, 0, u64::MAX - MODULUS]);
    assert_eq!(
        vec.copy_from_u64s(&[1, 2]).unwrap_err(),
        NttError::SizeMismatch {
            expected: 3,
            actual: 2
        }
    );
}

#[test]
fn pool_limit_is_enforced() {
    let pool = HostMemoryPool::new(&HostMemoryConfig {
        lock_pages: false,
        require_lock: false,
        pool_limit_mb: Some(1),
    });
    assert_eq!(pool.limit_bytes(), Some(1 << 20));

    let half = pool.allocate(1 << 16).unwrap();
    assert_eq!(pool.in_use_bytes(), 1 << 19);
    let other_half = pool.allocate(1 << 16).unwrap();
    assert!(matches!(
        pool.allocate(1),
        Err(NttError::OutOfHostMemory { available: 0, .. })
    ));

    drop(half);
    assert_eq!(pool.in_use_bytes(), 1 << 19);
    let again = pool.allocate(1 << 10).unwrap();
    drop(again);
    drop(other_half);
    assert_eq!(pool.in_use_bytes(), 0);
}

// Without CAP_IPC_LOCK a zero RLIMIT_MEMLOCK makes mlock fail, so a pool
// that requires locking has to refuse and release its reservation.
#[cfg(all(unix, not(feature = "gpu")))]
#[test]
fn required_lock_failure_is_out_of_host_memory() {
    let mut saved = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut saved) }, 0);
    let zero = libc::rlimit {
        rlim_cur: 0,
        rlim_max: saved.rlim_max,
    };
    assert_eq!(unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &zero) }, 0);

    let pool = HostMemoryPool::new(&HostMemoryConfig {
        lock_pages: true,
        require_lock: true,
        pool_limit_mb: None,
    });
    let result = pool.allocate(1 << 12);
    unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &saved) };

    match result {
        // Privileged callers lock regardless of the limit.
        Ok(vec) => assert!(vec.is_locked()),
        Err(NttError::OutOfHostMemory {
            requested,
            available: 0,
        }) => {
            assert!(requested >= 1 << 15);
            assert_eq!(pool.in_use_bytes(), 0);
        }
        Err(err) => panic!("unexpected error: {}", err),
    }
}

#[test]
fn clones_share_accounting() {
    let pool = HostMemoryPool::unlimited();
    let clone = pool.clone();
    let vec = clone.allocate(512).unwrap();
    assert_eq!(pool.in_use_bytes(), vec.capacity_bytes());
    free_vector(vec);
    assert_eq!(pool.in_use_bytes(), 0);
}

#[test]
fn allocate_from_copies_values() {
    let pool = HostMemoryPool::unlimited();
    let values: Vec<Goldilocks> = (0..10u64).map(Goldilocks::from).collect();
    let vec = pool.allocate_from(&values).unwrap();
    assert_eq!(&vec[..], &values[..]);
    assert_eq!(vec.to_vec(), values);
}

#[test]
fn context_results_are_charged_to_its_pool() {
    let ctx = build_context(64).unwrap();
    assert_eq!(ctx.host_pool().in_use_bytes(), 0);
    let coeffs = vec![Goldilocks::ONE; 64];
    let values = ctx.evaluate_poly(&coeffs, 64).unwrap();
    assert!(ctx.host_pool().in_use_bytes() >= 64 * 8);
    drop(values);
    assert_eq!(ctx.host_pool().in_use_bytes(), 0);
}

#[test]
fn pinned_vectors_move_across_threads() {
    let mut vec = allocate_vector(16).unwrap();
    vec[3] = Goldilocks::from(5u64);
    let vec = std::thread::spawn(move || {
        assert_eq!(vec[3], Goldilocks::from(5u64));
        vec
    })
    .join()
    .unwrap();
    assert_eq!(vec.len(), 16);
}
