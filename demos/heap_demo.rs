//! Walks the heap through a short scenario and prints the memory map after
//! every step, then hammers it from several threads.
//!
//! ```text
//! cargo run --example heap_demo -- [first-fit|best-fit]
//! RUST_LOG=trace cargo run --example heap_demo
//! ```

use std::process::ExitCode;
use std::thread;

use heapsim::{Heap, HeapError, Ptr, Strategy};
use log::{error, info};

const WORKERS: usize = 4;
const ROUNDS: usize = 500;

static HEAP: Heap = Heap::new();

fn print_state(label: &str) -> Result<(), HeapError> {
    println!("{label}:");
    println!("{}", HEAP.dump_map()?);
    Ok(())
}

fn sequential() -> Result<(), HeapError> {
    HEAP.init();
    print_state("Initial heap")?;

    let p1 = HEAP.allocate(100)?;
    print_state("After allocating 100 bytes")?;

    let p2 = HEAP.allocate(200)?;
    print_state("After allocating 200 bytes")?;

    HEAP.release(p1)?;
    print_state("After freeing first block")?;

    // reported and ignored
    if let Err(err) = HEAP.release(p1) {
        println!("Second release of the first block rejected: {err}\n");
    }

    let p3 = HEAP.allocate(48)?;
    print_state("After allocating 48 bytes into the hole")?;

    let p2 = HEAP.resize(p2, 400)?;
    print_state("After growing the 200 byte block to 400")?;

    for p in [p2, p3] {
        HEAP.release(p)?;
    }
    print_state("After releasing everything")?;

    Ok(())
}

fn worker(id: usize) -> usize {
    let mut live: Vec<Ptr> = Vec::new();
    let mut failed = 0;

    for round in 0..ROUNDS {
        let size = 16 + (round * 31 + id * 17) % 512;

        match HEAP.allocate(size) {
            Ok(p) => {
                if HEAP.write(p, &vec![id as u8; size]).is_ok() {
                    live.push(p);
                }
            }
            Err(_) => failed += 1,
        }

        if round % 2 == 1 {
            if let Some(p) = live.pop() {
                let _ = HEAP.release(p);
            }
        }
    }

    for p in live {
        let _ = HEAP.release(p);
    }

    failed
}

fn concurrent() -> Result<(), HeapError> {
    let failed: usize = thread::scope(|s| {
        let handles: Vec<_> = (0..WORKERS).map(|id| s.spawn(move || worker(id))).collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(0))
            .sum()
    });

    info!(
        "{} workers finished, {} allocations ran out of memory",
        WORKERS, failed
    );

    HEAP.check_integrity()?;
    println!("{}", HEAP.dump_stats()?);

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Some(arg) = std::env::args().nth(1) {
        match arg.parse::<Strategy>() {
            Ok(strategy) => HEAP.set_strategy(strategy),
            Err(err) => {
                error!("{}", err);
                return ExitCode::FAILURE;
            }
        }
    }
    info!("using {} allocation", HEAP.strategy());

    if let Err(err) = sequential().and_then(|()| concurrent()) {
        error!("{}", err);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
