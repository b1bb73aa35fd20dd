pub mod cli;
pub mod profile;
pub mod scenario;

use cli::Args;
use profile::Profiler;

use anyhow::{bail, Context, Result};
use tracing::info;

use std::io::Write;

/// Builds the selected graph, transforms it and writes the outcome to `out`
/// (or to `args.output`, for the final graph).
pub fn run<W: Write>(args: &Args, profiler: &mut Profiler, out: &mut W) -> Result<()> {
    let mut cfg = profiler
        .time("Build", || scenario::build(args.scenario))
        .context("failed to build the scenario graph")?;
    cfg.verify().context("the built graph is malformed")?;
    let built = cfg.to_string();
    if args.verbose {
        writeln!(out, "; built\n{built}")?;
    }

    let (stats, log) = cfg.record(|cfg| -> Result<_> {
        let inlined = profiler.time("Inline", || scenario::transform(args.scenario, cfg))?;
        if let Some(inlined) = inlined {
            info!(continuation = %inlined.continuation, "inlined");
            cfg.divider("inlined");
        }
        Ok(profiler.time("Cleanup", || cfg.cleanup())?)
    });
    let stats = stats.context("failed to transform the graph")?;
    info!(%stats, "cleanup done");

    profiler
        .time("Verify", || cfg.verify())
        .context("the transformed graph is malformed")?;

    let dump = cfg.to_string();
    match &args.output {
        Some(path) => std::fs::write(path, &dump)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            if args.verbose {
                writeln!(out, "; transformed ({stats})")?;
            }
            write!(out, "{dump}")?;
        }
    }
    if args.edits {
        writeln!(out, "; edits\n{log}")?;
    }

    if args.undo {
        log.undo(&mut cfg).context("failed to undo the recorded edits")?;
        if cfg.to_string() != built {
            bail!("undoing the recorded edits did not restore the built graph");
        }
        writeln!(out, "; undo restored the built graph")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cli::Scenario;

    fn args(scenario: Scenario) -> Args {
        Args {
            scenario,
            verbose: false,
            profile: false,
            edits: false,
            undo: false,
            output: None,
        }
    }

    fn run_to_string(args: &Args) -> String {
        let mut profiler = Profiler::new(args.profile);
        let mut out = Vec::new();
        run(args, &mut profiler, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_prints_the_final_graph() {
        let out = run_to_string(&args(Scenario::Straight));
        assert!(out.starts_with("entry:\n"), "{out}");
        assert!(out.contains("ret %m"), "{out}");
        assert!(!out.contains("next:"), "{out}");
    }

    #[test]
    fn test_edits_and_undo() {
        let mut args = args(Scenario::Inline);
        args.edits = true;
        args.undo = true;
        let out = run_to_string(&args);
        assert!(out.contains("; edits\n"), "{out}");
        assert!(out.contains("inline {"), "{out}");
        assert!(out.contains("-- inlined --"), "{out}");
        assert!(out.contains("cleanup {"), "{out}");
        assert!(out.ends_with("; undo restored the built graph\n"), "{out}");
    }

    #[test]
    fn test_output_goes_to_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.cfg");
        let mut args = args(Scenario::Loop);
        args.output = Some(path.clone());

        let out = run_to_string(&args);
        assert!(out.is_empty(), "{out}");
        let dump = std::fs::read_to_string(&path).unwrap();
        assert!(dump.contains("head: ; preds = body, entry\n"), "{dump}");
    }

    #[test]
    fn test_profile_stages() {
        let mut profiler = Profiler::new(true);
        run(&args(Scenario::Diamond), &mut profiler, &mut Vec::new()).unwrap();
        assert_eq!(
            profiler.stages().collect::<Vec<_>>(),
            vec!["Build", "Inline", "Cleanup", "Verify"]
        );
    }
}
