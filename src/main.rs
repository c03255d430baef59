#[cfg(feature = "mimalloc-global")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use dual_life::{Advance, ExecutionMode, ReadMode, SimConfig, Simulation};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Sequential,
    Parallel,
}

impl From<ModeArg> for ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => ExecutionMode::Sequential,
            ModeArg::Parallel => ExecutionMode::Parallel,
        }
    }
}

/// Headless runner for the dual-engine Life simulation.
#[derive(Debug, Parser)]
#[command(name = "dual-life", version)]
struct Args {
    /// JSON configuration file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    width: Option<usize>,
    #[arg(long)]
    height: Option<usize>,
    /// Rule string such as "2,3/3" or a preset name.
    #[arg(long)]
    rule: Option<String>,
    /// Chance for each cell to start alive.
    #[arg(long)]
    density: Option<f32>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    /// Work-group size as WxH.
    #[arg(long, value_parser = parse_work_group)]
    work_group: Option<(usize, usize)>,
    #[arg(long)]
    generations_per_copy: Option<u32>,
    /// Read device results back asynchronously.
    #[arg(long)]
    deferred: bool,
    #[arg(long)]
    threads: Option<usize>,
    #[arg(long, default_value_t = 1000)]
    generations: u64,
    /// Switch engines every N generations (0 disables).
    #[arg(long, default_value_t = 0)]
    switch_every: u64,
    #[arg(long, default_value_t = 250)]
    report_every: u64,
    /// Run both engines side by side and compare boards.
    #[arg(long)]
    check: bool,
}

fn parse_work_group(s: &str) -> Result<(usize, usize), String> {
    let (x, y) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {s:?}"))?;
    let x = x.parse().map_err(|e| format!("bad width {x:?}: {e}"))?;
    let y = y.parse().map_err(|e| format!("bad height {y:?}: {e}"))?;
    Ok((x, y))
}

fn build_config(args: &Args) -> dual_life::Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_json_file(path)?,
        None => SimConfig::default(),
    };
    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }
    if let Some(rule) = &args.rule {
        config.rule = rule.clone();
    }
    if let Some(density) = args.density {
        config = config.density(density);
    }
    if let Some(seed) = args.seed {
        config = config.seed(seed);
    }
    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }
    if let Some((x, y)) = args.work_group {
        config.parallel.work_group = [x, y];
    }
    if let Some(n) = args.generations_per_copy {
        config.parallel.generations_per_copy = n;
    }
    if args.deferred {
        config.parallel.read_mode = ReadMode::Deferred;
    }
    if let Some(n) = args.threads {
        config.parallel = config.parallel.thread_count(n);
    }
    Ok(config)
}

fn run(config: &SimConfig, args: &Args) -> dual_life::Result<()> {
    let mut sim = Simulation::with_config(config)?;
    if let Some(info) = sim.kernel_info() {
        info!(%info, "kernel");
    }
    sim.toggle_pause()?;

    let mut next_switch = args.switch_every;
    let mut next_report = args.report_every;
    let mut busy = Duration::ZERO;
    while sim.generation() < args.generations {
        let start = Instant::now();
        let advance = sim.advance()?;
        busy += start.elapsed();
        let Advance::Completed { generation } = advance else {
            continue;
        };

        if args.report_every > 0 && generation >= next_report {
            next_report = generation + args.report_every;
            info!(
                generation,
                population = sim.population(),
                step_us = sim.last_step_time().as_micros() as u64,
                mode = ?sim.mode(),
                "progress"
            );
        }
        if args.switch_every > 0 && generation >= next_switch && sim.has_parallel() {
            next_switch = generation + args.switch_every;
            let mode = sim.switch_engine()?;
            info!(generation, ?mode, "engine switched");
        }
    }
    sim.sync()?;

    let generations = sim.generation();
    let total_ms = busy.as_secs_f64() * 1000.0;
    println!("\n--- Summary ({generations} generations, rule {}) ---", args_rule(&sim));
    println!(
        "population {} | {total_ms:.3} ms total, {:.6} ms/gen",
        sim.population(),
        total_ms / generations.max(1) as f64
    );
    sim.teardown();
    Ok(())
}

fn args_rule(sim: &Simulation) -> String {
    sim.rule().map(ToString::to_string).unwrap_or_default()
}

fn run_checked(config: &SimConfig, args: &Args) -> dual_life::Result<bool> {
    let seed = config.seed.unwrap_or(0x5EED_1234_ABCD_EF01);
    let base = config.clone().seed(seed);
    let mut sequential = Simulation::with_config(&base.clone().sequential_only())?;
    let mut parallel = Simulation::with_config(&base.mode(ExecutionMode::Parallel))?;
    if parallel.mode() != ExecutionMode::Parallel {
        error!("parallel engine unavailable; nothing to compare");
        return Ok(false);
    }
    sequential.toggle_pause()?;
    parallel.toggle_pause()?;

    let interval = args.report_every.max(1);
    let mut all_match = true;
    let mut seq_time = Duration::ZERO;
    let mut par_time = Duration::ZERO;
    while parallel.generation() < args.generations {
        let start = Instant::now();
        parallel.advance()?;
        parallel.sync()?;
        par_time += start.elapsed();

        let start = Instant::now();
        while sequential.generation() < parallel.generation() {
            sequential.advance()?;
        }
        seq_time += start.elapsed();

        let generation = parallel.generation();
        if generation % interval == 0 || generation >= args.generations {
            let same =
                sequential.snapshot().map(|s| s.pixels) == parallel.snapshot().map(|s| s.pixels);
            all_match &= same;
            let status = if same { "MATCH" } else { "MISMATCH" };
            println!(
                "Generation {generation}: sequential pop = {}, parallel pop = {} [{status}]",
                sequential.population(),
                parallel.population()
            );
        }
    }

    let seq_ms = seq_time.as_secs_f64() * 1000.0;
    let par_ms = par_time.as_secs_f64() * 1000.0;
    println!("\n--- Summary ({} generations) ---", parallel.generation());
    println!("Sequential: {seq_ms:.3} ms total");
    println!("Parallel:   {par_ms:.3} ms total");
    println!("Speedup (sequential / parallel): {:.2}x", seq_ms / par_ms.max(f64::EPSILON));
    Ok(all_match)
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let result = build_config(&args).and_then(|config| {
        if args.check {
            run_checked(&config, &args)
        } else {
            run(&config, &args).map(|()| true)
        }
    });
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(%err, "simulation failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
