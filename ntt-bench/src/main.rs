#[macro_use]
extern crate log;

use clap::{CommandFactory, FromArgMatches, Parser};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use stockham_ntt::{
    Backend, BackendKind, DefaultBackend, EngineConfig, Goldilocks, HostBackend, NttContext,
    NttError,
};

/// Times and self-checks the Stockham transforms.
#[derive(Parser)]
pub struct Args {
    /// TOML engine configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// log2 of the coefficient count.
    #[arg(long, default_value_t = 16)]
    log_size: u32,

    /// Low-degree extension blowup factor (power of two).
    #[arg(long, default_value_t = 4)]
    blowup: usize,

    #[arg(long, default_value_t = 10)]
    iterations: u32,

    /// Host backend worker threads; overrides the config file.
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,

    /// Print a JSON report instead of log lines.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report {
    backend: &'static str,
    n: usize,
    blowup: usize,
    iterations: u32,
    evaluate_us: f64,
    interpolate_us: f64,
    extend_us: f64,
    round_trip_ok: bool,
    extension_ok: bool,
}

fn mean_us(total: Duration, iterations: u32) -> f64 {
    total.as_secs_f64() * 1e6 / iterations.max(1) as f64
}

fn run<B: Backend>(config: &EngineConfig, args: &Args) -> Result<Report, NttError> {
    let ctx = NttContext::<B>::open(config)?;
    let n = 1usize << args.log_size;
    let total = n * args.blowup;
    let shift = Goldilocks::from_u64(7);

    let mut rng = StdRng::seed_from_u64(args.seed);
    let coeffs: Vec<Goldilocks> = (0..n)
        .map(|_| Goldilocks::from_u64(rng.random::<u64>()))
        .collect();
    let mut values = ctx.allocate_vector(n)?;
    let mut back = ctx.allocate_vector(n)?;
    let mut extended = ctx.allocate_vector(total)?;

    let mut evaluate = Duration::ZERO;
    let mut interpolate = Duration::ZERO;
    let mut extend = Duration::ZERO;
    for _ in 0..args.iterations {
        let started = Instant::now();
        ctx.evaluate_poly_into(&coeffs, n, &mut values)?;
        evaluate += started.elapsed();

        let started = Instant::now();
        ctx.interpolate_poly_into(&values, n, &mut back)?;
        interpolate += started.elapsed();

        let started = Instant::now();
        ctx.evaluate_poly_with_offset_into(&coeffs, n, shift, args.blowup, &mut extended)?;
        extend += started.elapsed();
    }

    let round_trip_ok = back[..] == coeffs[..];
    let coset = ctx.interpolate_poly_with_offset(&extended, total, shift)?;
    let extension_ok =
        coset[..n] == coeffs[..] && coset[n..].iter().all(|v| v.is_zero());

    Ok(Report {
        backend: ctx.backend().name(),
        n,
        blowup: args.blowup,
        iterations: args.iterations,
        evaluate_us: mean_us(evaluate, args.iterations),
        interpolate_us: mean_us(interpolate, args.iterations),
        extend_us: mean_us(extend, args.iterations),
        round_trip_ok,
        extension_ok,
    })
}

fn main() {
    pretty_env_logger::init();

    let mut command = Args::command();
    let args = match Args::from_arg_matches_mut(&mut command.get_matches_mut()) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).unwrap_or_else(|err| {
            command
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format_args!("{}: {}", path.display(), err),
                )
                .exit()
        }),
        None => EngineConfig::default(),
    };

    if args.blowup == 0 || !args.blowup.is_power_of_two() {
        command
            .error(
                clap::error::ErrorKind::ValueValidation,
                "--blowup must be a power of two",
            )
            .exit();
    }
    let needed = args.log_size + args.blowup.trailing_zeros();
    config.max_log_size = config.max_log_size.max(needed);
    if args.threads.is_some() {
        config.host_threads = args.threads;
    }
    if let Err(err) = config.validate() {
        command
            .error(clap::error::ErrorKind::ValueValidation, err)
            .exit();
    }

    let result = match config.backend {
        BackendKind::Host => run::<HostBackend>(&config, &args),
        #[cfg(feature = "gpu")]
        BackendKind::Cuda => run::<stockham_ntt::CudaBackend>(&config, &args),
        #[cfg(not(feature = "gpu"))]
        BackendKind::Cuda => Err(NttError::AcceleratorUnavailable(
            "built without the gpu feature".into(),
        )),
        BackendKind::Auto => run::<DefaultBackend>(&config, &args),
    };

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            error!("benchmark failed: {}", err);
            std::process::exit(1);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(err) => {
                error!("cannot encode report: {}", err);
                std::process::exit(1);
            }
        }
    } else {
        info!(
            "{} n={} blowup={}: evaluate {:.1}us, interpolate {:.1}us, extend {:.1}us",
            report.backend,
            report.n,
            report.blowup,
            report.evaluate_us,
            report.interpolate_us,
            report.extend_us
        );
    }

    if !report.round_trip_ok || !report.extension_ok {
        error!(
            "self-check failed: round_trip_ok={} extension_ok={}",
            report.round_trip_ok, report.extension_ok
        );
        std::process::exit(1);
    }
}
