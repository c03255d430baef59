#[cfg(feature = "mimalloc-global")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

use dual_life::{
    Board, Engine, ParallelConfig, ParallelEngine, RuleTable, SequentialEngine, StepOutcome,
};
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::env;
use std::time::Instant;

#[derive(Clone, Debug, Serialize)]
struct BenchConfig {
    size: usize,
    density: f64,
    warmup: u64,
    iters: u64,
    seed: u64,
    threads: Option<usize>,
    work_group: [usize; 2],
    generations_per_copy: u32,
    #[serde(skip)]
    json: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            size: 1024,
            density: 0.42,
            warmup: 3,
            iters: 30,
            seed: 0xA5A5_5EED_7788_1122,
            threads: None,
            work_group: [16, 16],
            generations_per_copy: 1,
            json: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
struct RunResult {
    total_ms: f64,
    avg_ms: f64,
    population: u64,
}

#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    config: &'a BenchConfig,
    sequential: RunResult,
    parallel: RunResult,
    speedup: f64,
    identical: Option<bool>,
}

fn parse_args() -> BenchConfig {
    let mut cfg = BenchConfig::default();
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--size" => {
                if let Some(v) = args.next() {
                    cfg.size = v.parse().expect("--size expects usize");
                }
            }
            "--density" => {
                if let Some(v) = args.next() {
                    cfg.density = v.parse().expect("--density expects f64");
                }
            }
            "--warmup" => {
                if let Some(v) = args.next() {
                    cfg.warmup = v.parse().expect("--warmup expects u64");
                }
            }
            "--iters" => {
                if let Some(v) = args.next() {
                    cfg.iters = v.parse().expect("--iters expects u64");
                }
            }
            "--seed" => {
                if let Some(v) = args.next() {
                    cfg.seed = if let Some(hex) = v.strip_prefix("0x") {
                        u64::from_str_radix(hex, 16).expect("--seed hex parse failed")
                    } else {
                        v.parse().expect("--seed expects u64")
                    };
                }
            }
            "--threads" => {
                if let Some(v) = args.next() {
                    cfg.threads = Some(v.parse().expect("--threads expects usize"));
                }
            }
            "--work-group" => {
                if let Some(v) = args.next() {
                    let (x, y) = v.split_once('x').expect("--work-group expects WxH");
                    cfg.work_group = [
                        x.parse().expect("--work-group width expects usize"),
                        y.parse().expect("--work-group height expects usize"),
                    ];
                }
            }
            "--generations-per-copy" => {
                if let Some(v) = args.next() {
                    cfg.generations_per_copy =
                        v.parse().expect("--generations-per-copy expects u32");
                }
            }
            "--json" => {
                cfg.json = true;
            }
            other => panic!("unknown arg: {other}"),
        }
    }
    cfg
}

fn seed_board(size: usize, density: f64, seed: u64) -> Board {
    let mut board = Board::allocate(size, size).expect("board allocation failed");
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    for y in 0..size {
        for x in 0..size {
            board.set_cell(x, y, rng.random_bool(density));
        }
    }
    board.mirror_front();
    board
}

/// Step `engine` until it has covered `generations`, swapping after each call.
fn drive(engine: &mut dyn Engine, board: &mut Board, rules: &RuleTable, generations: u64) {
    let mut done = 0;
    while done < generations {
        match engine.step(board, rules).expect("engine step failed") {
            StepOutcome::Ready => {}
            StepOutcome::Pending(handle) => {
                let data = handle.wait().expect("read-back failed");
                board.back_mut().copy_from_slice(&data);
            }
        }
        board.swap_buffers();
        done += engine.generations_per_step();
    }
}

fn run_engine(cfg: &BenchConfig, engine: &mut dyn Engine) -> (RunResult, Board) {
    let rules = RuleTable::life();
    let mut board = seed_board(cfg.size, cfg.density, cfg.seed);
    drive(engine, &mut board, &rules, cfg.warmup);

    let start = Instant::now();
    drive(engine, &mut board, &rules, cfg.iters);
    let total_ms = start.elapsed().as_secs_f64() * 1000.0;
    let result = RunResult {
        total_ms,
        avg_ms: total_ms / cfg.iters.max(1) as f64,
        population: board.population(),
    };
    (result, board)
}

fn main() {
    let cfg = parse_args();
    let (sequential, seq_board) = run_engine(&cfg, &mut SequentialEngine::new());

    let mut parallel_config = ParallelConfig::default()
        .work_group(cfg.work_group[0], cfg.work_group[1])
        .generations_per_copy(cfg.generations_per_copy);
    if let Some(t) = cfg.threads {
        parallel_config = parallel_config.thread_count(t);
    }
    let mut engine = ParallelEngine::new(&parallel_config, cfg.size, cfg.size)
        .expect("parallel engine setup failed");
    let (parallel, par_board) = run_engine(&cfg, &mut engine);

    // Batched runs overshoot unless both counts are multiples of N.
    let n = u64::from(cfg.generations_per_copy.max(1));
    let identical = (cfg.warmup % n == 0 && cfg.iters % n == 0)
        .then(|| seq_board.front() == par_board.front());
    let speedup = sequential.avg_ms / parallel.avg_ms;

    if cfg.json {
        let report = Report {
            config: &cfg,
            sequential,
            parallel,
            speedup,
            identical,
        };
        println!(
            "{}",
            serde_json::to_string(&report).expect("report serialization failed")
        );
    } else {
        println!(
            "sequential: total_ms={:.6}, avg_ms={:.6}, population={}",
            sequential.total_ms, sequential.avg_ms, sequential.population
        );
        println!(
            "parallel:   total_ms={:.6}, avg_ms={:.6}, population={}, speedup={:.3}x",
            parallel.total_ms, parallel.avg_ms, parallel.population, speedup
        );
        if identical == Some(false) {
            println!("WARNING: final boards differ");
        }
    }
}
