use cfir::{cli::Args, profile::Profiler};

use tracing_subscriber::EnvFilter;

fn main() {
    let args = Args::from_cli();
    init_logger(args.verbose);
    let mut profiler = Profiler::new(args.profile);
    let r = cfir::run(&args, &mut profiler, &mut std::io::stdout().lock());
    if let Err(e) = profiler.report(&mut std::io::stdout()) {
        eprintln!("failed to write profile report: {e}");
    }
    if let Err(e) = r {
        eprintln!("{:?}", e);
        std::process::exit(1)
    }
}

/// Logs to stderr, filtered by `RUST_LOG`. `--verbose` overrides it with
/// `debug`.
fn init_logger(verbose: bool) {
    let filter = match verbose {
        true => EnvFilter::new("debug"),
        false => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let r = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(e) = r {
        eprintln!("failed to initialize logging: {e}");
    }
}
