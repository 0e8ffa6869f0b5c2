//! Command-line driver for the state comparison checker.
//!
//! Decodes one x86-64 basic block from hex, runs it through the checker on the
//! reference host, and executes the transformed block from seeded random
//! register files.
//!
//! # Usage
//!
//! ```bash
//! # add rax, rcx ; ret
//! statecmp --hex "48 01 c8 c3"
//!
//! # Same block with a faulty tool clobbering rax ahead of the checker
//! statecmp --hex "48 01 c8 c3" --clobber rax
//! ```

use clap::Parser;
use iced_x86::{Decoder, DecoderOptions, FlowControl, Instruction};
use statecmp::core::{classify, Arch, Config, Eligibility, Host, InstrList, Status};
use statecmp::sim::{random_state, ClobberClient, SimHost};
use statecmp::StateCmpRuntime;
use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "statecmp")]
#[command(about = "Check a basic block for instrumentation-induced state corruption", long_about = None)]
struct Cli {
    /// Machine code of the block, as hex bytes (whitespace allowed)
    #[arg(long)]
    hex: String,

    /// Register overwritten by a simulated faulty tool before the checker runs
    #[arg(long)]
    clobber: Option<String>,

    /// Seed of the first random register file
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Number of executions, each from a fresh random register file
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
    runs: u64,

    /// Address the block is decoded at
    #[arg(long, default_value = "0x401000", value_parser = parse_address)]
    ip: u64,

    /// Show debug output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_address(s: &str) -> Result<u64, String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid address {s}: {e}"))
}

fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err("odd number of hex digits".to_string());
    }
    digits
        .chunks(2)
        .map(|pair| {
            let byte: String = pair.iter().collect();
            u8::from_str_radix(&byte, 16).map_err(|_| format!("invalid hex byte {byte:?}"))
        })
        .collect()
}

/// Decode up to and including the first control transfer.
fn decode_block(bytes: &[u8], ip: u64) -> Result<Vec<Instruction>, String> {
    let mut decoder = Decoder::with_ip(64, bytes, ip, DecoderOptions::NONE);
    let mut insns = Vec::new();
    for insn in &mut decoder {
        if insn.is_invalid() {
            return Err(format!("invalid instruction at {:#x}", insn.ip()));
        }
        insns.push(insn);
        if insn.flow_control() != FlowControl::Next {
            break;
        }
    }
    let consumed = decoder.position();
    if consumed < bytes.len() {
        log::warn!("ignoring {} bytes after the block terminator", bytes.len() - consumed);
    }
    Ok(insns)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown failure".to_string()
    }
}

/// Run `f`, keeping state-mismatch panics away from the installed panic hook.
/// Other panics still reach it.
fn catch_mismatch<R>(f: impl FnOnce() -> R) -> std::thread::Result<R> {
    let previous = Arc::new(panic::take_hook());
    let fallback = previous.clone();
    panic::set_hook(Box::new(move |info| {
        if !is_mismatch(info.payload()) {
            (*fallback)(info);
        }
    }));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    drop(panic::take_hook());
    match Arc::try_unwrap(previous) {
        Ok(hook) => panic::set_hook(hook),
        Err(shared) => panic::set_hook(Box::new(move |info| (*shared)(info))),
    }
    result
}

fn is_mismatch(payload: &(dyn std::any::Any + Send)) -> bool {
    panic_message(payload).starts_with("state mismatch")
}

fn run(cli: &Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let bytes = parse_hex(&cli.hex)?;
    let insns = decode_block(&bytes, cli.ip)?;

    match classify(&InstrList::from_app(insns.iter().copied())) {
        Eligibility::Eligible => println!("block is side-effect free"),
        Eligibility::SideEffects { effect, .. } => {
            println!("block has side effects ({effect}), it will not be checked")
        }
    }

    let host = Arc::new(SimHost::new());
    if let Some(field) = &cli.clobber {
        let client = ClobberClient::new(field).ok_or_else(|| format!("cannot clobber {field}"))?;
        if !host.register_client(Arc::new(client), ClobberClient::PRIORITY) {
            return Err("clobber client registration failed".into());
        }
    }

    let runtime = StateCmpRuntime::new(host.clone(), Config::new(Arch::X86_64));
    if runtime.activate() != Status::Success {
        return Err("checker activation failed".into());
    }
    let checker = runtime.checker().ok_or("checker not active")?;

    let mut passed = true;
    for n in 0..cli.runs {
        let seed = cli.seed.wrapping_add(n);
        let mut thread = host.spawn_thread(Arch::X86_64);
        *thread.state_mut() = random_state(Arch::X86_64, seed);

        let mut bb = InstrList::from_app(insns.iter().copied());
        host.process_block(&mut thread, &mut bb, false, true);
        if n == 0 {
            print!("{}", checker.describe(&bb));
        }

        match catch_mismatch(|| thread.execute(&bb)) {
            Ok(Ok(exit)) => log::debug!("seed {seed}: block left via {exit:?}"),
            Ok(Err(e)) => return Err(e.into()),
            Err(payload) if is_mismatch(payload.as_ref()) => {
                println!("seed {seed}: {}", panic_message(payload.as_ref()));
                passed = false;
                break;
            }
            Err(payload) => panic::resume_unwind(payload),
        }
        host.exit_thread(&mut thread);
    }

    if runtime.deactivate() != Status::Success {
        return Err("checker teardown failed".into());
    }
    Ok(passed)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_module("statecmp", level)
        .parse_default_env()
        .format_timestamp(None)
        .init();

    match run(&cli) {
        Ok(true) => {
            println!("ok: {} run(s) without state mismatch", cli.runs);
            ExitCode::SUCCESS
        }
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}
