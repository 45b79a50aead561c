use super::*;
use crate::field::MULTIPLICATIVE_GENERATOR;
use crate::twiddle::{coset_powers, scaled_coset_powers, MAX_LOG_SIZE};

fn host_context(max_log_size: u32, slots: usize) -> NttContext<HostBackend> {
    let config = EngineConfig {
        max_log_size,
        scratch_slots: slots,
        host_threads: Some(2),
        ..EngineConfig::default()
    };
    NttContext::<HostBackend>::open(&config).unwrap()
}

fn elems(values: &[u64]) -> Vec<Goldilocks> {
    values.iter().map(|&v| Goldilocks::from_u64(v)).collect()
}

fn poly_eval(coeffs: &[Goldilocks], x: Goldilocks) -> Goldilocks {
    let mut res = Goldilocks::ZERO;
    let mut current_x_power = Goldilocks::ONE;
    for &coeff in coeffs {
        res += coeff * current_x_power;
        current_x_power *= x;
    }
    res
}

fn naive_dft(coeffs: &[Goldilocks], root: Goldilocks) -> Vec<Goldilocks> {
    (0..coeffs.len())
        .map(|k| poly_eval(coeffs, root.pow(k as u64)))
        .collect()
}

#[test]
fn stage_tables_have_half_size_entries() {
    let tables = TwiddleTables::build(5, 10).unwrap();
    assert_eq!(tables.forward.len(), 5);
    assert_eq!(tables.inverse.len(), 5);
    for stage in tables.forward.iter().chain(tables.inverse.iter()) {
        assert_eq!(stage.len(), 16);
    }
    assert_eq!(tables.table_bytes(), 2 * 5 * 16 * 8);
}

#[test]
fn last_stage_holds_consecutive_powers() {
    let tables = TwiddleTables::build(4, 4).unwrap();
    let last = tables.forward.last().unwrap();
    for (j, &w) in last.iter().enumerate() {
        assert_eq!(w, tables.root.pow(j as u64));
    }
    // The first stage only ever multiplies by one.
    assert!(tables.forward[0].iter().all(|&w| w == Goldilocks::ONE));
}

#[test]
fn inverse_tables_invert_forward_tables() {
    let tables = TwiddleTables::build(6, 6).unwrap();
    for (f, i) in tables.forward.iter().zip(&tables.inverse) {
        for (&a, &b) in f.iter().zip(i) {
            assert_eq!(a * b, Goldilocks::ONE);
        }
    }
    assert_eq!(tables.size_inv * Goldilocks::from_u64(64), Goldilocks::ONE);
}

#[test]
fn twiddle_builder_rejects_bad_sizes() {
    assert!(matches!(
        TwiddleTables::build(11, 10),
        Err(NttError::UnsupportedSize { .. })
    ));
    assert!(matches!(
        TwiddleTables::build(33, 40),
        Err(NttError::UnsupportedSize { .. })
    ));
    assert_eq!(
        TwiddleTables::build(64, 64),
        Err(NttError::UnsupportedSize {
            size: usize::MAX,
            max: 1usize << MAX_LOG_SIZE,
        })
    );
    assert!(matches!(
        TwiddleTables::for_size(12, 16),
        Err(NttError::UnsupportedSize { size: 12, max: 16 })
    ));
    assert_eq!(TwiddleTables::for_size(8, 16).unwrap().size(), 8);
}

#[test]
fn twiddle_fingerprint_is_deterministic() {
    let a = TwiddleTables::build(7, 7).unwrap();
    let b = TwiddleTables::build(7, 7).unwrap();
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_ne!(a.fingerprint(), TwiddleTables::build(6, 7).unwrap().fingerprint());
}

#[test]
fn coset_powers_scale() {
    let g = Goldilocks::from_u64(MULTIPLICATIVE_GENERATOR);
    let plain = coset_powers(g, 5);
    assert_eq!(plain[0], Goldilocks::ONE);
    assert_eq!(plain[4], g.pow(4));
    let scaled = scaled_coset_powers(g, Goldilocks::from_u64(3), 5);
    for (p, s) in plain.iter().zip(&scaled) {
        assert_eq!(*p * Goldilocks::from_u64(3), *s);
    }
}

#[test]
fn forward_matches_naive_dft() {
    let ctx = host_context(6, 1);
    for log_n in 0..=6u32 {
        let n = 1usize << log_n;
        let coeffs = elems(&(0..n as u64).map(|i| i * i + 7).collect::<Vec<_>>());
        let values = ctx.evaluate_poly(&coeffs, n).unwrap();
        let expected = naive_dft(&coeffs, ctx.root_of_unity(n).unwrap());
        assert_eq!(&values[..], &expected[..], "n = {}", n);
    }
}

#[test]
fn extension_matches_naive_coset_evaluation() {
    let ctx = host_context(6, 1);
    let coeffs = elems(&[3, 1, 4, 1, 5, 9, 2, 6]);
    let offset = Goldilocks::from_u64(MULTIPLICATIVE_GENERATOR);
    let values = ctx
        .evaluate_poly_with_offset(&coeffs, 8, offset, 4, 32)
        .unwrap();
    let root = ctx.root_of_unity(32).unwrap();
    for (j, &v) in values.iter().enumerate() {
        assert_eq!(v, poly_eval(&coeffs, offset * root.pow(j as u64)), "j = {}", j);
    }
}

#[test]
fn coset_interpolation_undoes_coset_evaluation() {
    let ctx = host_context(5, 1);
    let coeffs = elems(&(1..=32).collect::<Vec<_>>());
    let offset = Goldilocks::from_u64(11);
    let values = ctx
        .evaluate_poly_with_offset(&coeffs, 32, offset, 1, 32)
        .unwrap();
    let back = ctx.interpolate_poly_with_offset(&values, 32, offset).unwrap();
    assert_eq!(&back[..], &coeffs[..]);
}

#[test]
fn failed_call_leaves_output_untouched() {
    let ctx = host_context(4, 1);
    let coeffs = elems(&[1, 2, 3, 4]);
    let mut out = elems(&[9, 9, 9, 9, 9, 9, 9, 9]);
    let err = ctx
        .evaluate_poly_with_offset_into(&coeffs, 4, Goldilocks::ZERO, 2, &mut out)
        .unwrap_err();
    assert_eq!(err, NttError::InvalidOffset);
    assert!(out.iter().all(|&v| v == Goldilocks::from_u64(9)));
}

#[test]
fn extension_checks_run_in_order() {
    let ctx = host_context(4, 1);
    let coeffs = elems(&[1, 2, 3, 4]);
    let one = Goldilocks::ONE;
    assert!(matches!(
        ctx.evaluate_poly_with_offset(&coeffs, 4, one, 3, 12),
        Err(NttError::InvalidSize { size: 3, .. })
    ));
    assert!(matches!(
        ctx.evaluate_poly_with_offset(&coeffs, 4, one, 8, 32),
        Err(NttError::InvalidSize { size: 32, max: 16 })
    ));
    assert_eq!(
        ctx.evaluate_poly_with_offset(&coeffs, 4, one, 2, 9).unwrap_err(),
        NttError::SizeMismatch {
            expected: 8,
            actual: 9
        }
    );
    assert_eq!(
        ctx.evaluate_poly_with_offset(&coeffs[..2], 4, one, 2, 8)
            .unwrap_err(),
        NttError::SizeMismatch {
            expected: 4,
            actual: 2
        }
    );
}

#[test]
fn context_reports_capacity_and_limit() {
    let ctx = host_context(8, 3);
    assert_eq!(ctx.max_n(), 256);
    assert_eq!(ctx.max_log_size(), 8);
    assert_eq!(ctx.concurrency_limit(), 3);
    assert_eq!(ctx.backend().name(), "host");
    assert_eq!(ctx.backend().threads(), 2);
    assert_eq!(
        ctx.table_fingerprint(),
        TwiddleTables::build(8, 8).unwrap().fingerprint()
    );
    assert!(matches!(
        ctx.root_of_unity(512),
        Err(NttError::InvalidSize { size: 512, max: 256 })
    ));
}

#[test]
fn uploaded_tables_match_host_tables_at_every_size() {
    let ctx = host_context(6, 1);
    assert_eq!(ctx.tables.len(), 7);
    for (log_size, uploaded) in ctx.tables.iter().enumerate() {
        let host = TwiddleTables::build(log_size as u32, 6).unwrap();
        let forward: Vec<Goldilocks> = host.forward.iter().flatten().copied().collect();
        let inverse: Vec<Goldilocks> = host.inverse.iter().flatten().copied().collect();
        assert_eq!(uploaded.forward.as_slice(), &forward[..], "forward, log {}", log_size);
        assert_eq!(uploaded.inverse.as_slice(), &inverse[..], "inverse, log {}", log_size);
        assert_eq!(uploaded.root, host.root);
        assert_eq!(uploaded.size_inv, host.size_inv);
    }
}

#[test]
fn single_slot_serves_consecutive_calls() {
    let ctx = host_context(3, 1);
    let values = elems(&[1, 2, 3, 4]);
    for _ in 0..3 {
        let coeffs = ctx.interpolate_poly(&values, 4).unwrap();
        assert_eq!(&ctx.evaluate_poly(&coeffs, 4).unwrap()[..], &values[..]);
    }
}

#[test]
fn open_rejects_mismatched_backend_kind() {
    let config = EngineConfig {
        max_log_size: 2,
        backend: BackendKind::Cuda,
        ..EngineConfig::default()
    };
    assert!(matches!(
        NttContext::<HostBackend>::open(&config),
        Err(NttError::AcceleratorUnavailable(_))
    ));
}
