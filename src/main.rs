mod bridge;
mod repl;

use std::env;

use bridge::{run_bridge, Args};

fn main() {
    let result = Args::parse(env::args().skip(1)).and_then(run_bridge);
    if let Err(e) = result {
        eprintln!("mdb-bridge: {:#}", e);
        std::process::exit(1);
    }
}
