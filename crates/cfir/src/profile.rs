use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Profiler
// ---------------------------------------------------------------------------

/// Wall-clock timing of the driver stages. Disabled profilers only run the
/// closures.
pub struct Profiler {
    log: Option<Vec<(&'static str, Duration)>>,
}

impl Profiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            log: enabled.then(|| Vec::with_capacity(8)),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.log.is_some()
    }

    #[inline]
    pub fn time<F, R>(&mut self, label: &'static str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        match &mut self.log {
            None => f(),
            Some(stages) => {
                let start = Instant::now();
                let result = f();
                stages.push((label, start.elapsed()));
                result
            }
        }
    }

    /// The recorded stage labels, in order.
    pub fn stages(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.log.iter().flatten().map(|(label, _)| *label)
    }

    pub fn report<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let Some(stages) = &self.log else {
            return Ok(());
        };
        let width = stages
            .iter()
            .map(|(label, _)| label.len())
            .max()
            .unwrap_or(0)
            .max("Total".len());
        let separator = "-".repeat(width + 28);
        let total: Duration = stages.iter().map(|(_, d)| *d).sum();

        writeln!(writer, "{separator}")?;
        writeln!(writer, "Profiler Report")?;
        writeln!(writer, "{separator}")?;
        for (label, duration) in stages {
            let percentage = match total.as_nanos() {
                0 => 0.0,
                _ => duration.as_secs_f64() / total.as_secs_f64() * 100.0,
            };
            writeln!(
                writer,
                "{:<width$} : {:>10.4}ms ({:>5.1}%)",
                label,
                duration.as_micros() as f64 / 1000.0,
                percentage,
            )?;
        }
        writeln!(writer, "{separator}")?;
        writeln!(
            writer,
            "{:<width$} : {:>10.4}ms (100.0%)",
            "Total",
            total.as_micros() as f64 / 1000.0,
        )?;
        writeln!(writer, "{separator}")
    }
}
