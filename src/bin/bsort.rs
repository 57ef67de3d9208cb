use std::fs::File;
use std::io::{self};
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;

use clap::Parser;

use bsort::common::{io_error_msg, reset_sigpipe};
use bsort::sort::{parse_buffer_size, run, Input, SortConfig};
use bsort::{Cancel, SortError};

#[derive(Parser)]
#[command(
    name = "bsort",
    about = "Sort newline-delimited tokens, spilling to disk when input exceeds memory"
)]
struct Cli {
    /// Write result to FILE instead of standard output
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Use SIZE for the main memory buffer (e.g. 64M, 1G)
    #[arg(short = 'S', long = "buffer-size", value_name = "SIZE")]
    buffer_size: Option<String>,

    /// Number of concurrent sort workers
    #[arg(long = "parallel", value_name = "N")]
    parallel: Option<usize>,

    /// Use DIR for run files, not the system temp directory
    #[arg(short = 'T', long = "temporary-directory", value_name = "DIR")]
    temp_dir: Option<PathBuf>,

    /// Files to sort ('-' means standard input)
    files: Vec<String>,
}

static CANCEL: OnceLock<Cancel> = OnceLock::new();

extern "C" fn on_interrupt(_sig: libc::c_int) {
    // Only an atomic store; async-signal-safe.
    if let Some(cancel) = CANCEL.get() {
        cancel.cancel();
    }
}

/// Ctrl-C flips the cancellation flag so every stage stops at its next
/// boundary instead of the process dying mid-write.
fn install_interrupt_handler() {
    #[cfg(unix)]
    unsafe {
        let handler = on_interrupt as extern "C" fn(libc::c_int);
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

fn main() {
    reset_sigpipe();
    env_logger::init();

    let cli = Cli::parse();

    let buffer_size = cli.buffer_size.as_deref().map(|s| {
        parse_buffer_size(s).unwrap_or_else(|e| {
            eprintln!("bsort: {}", e);
            process::exit(2);
        })
    });

    let defaults = SortConfig::default();
    let mut config = SortConfig::for_buffer(
        buffer_size.unwrap_or(defaults.buffer_size),
        cli.parallel.unwrap_or(defaults.parallel),
    );
    if let Some(dir) = cli.temp_dir {
        config.temp_dir = dir;
    }

    let files = if cli.files.is_empty() {
        vec!["-".to_string()]
    } else {
        cli.files
    };

    let mut inputs: Vec<Input> = Vec::with_capacity(files.len());
    for name in &files {
        if name == "-" {
            inputs.push(Box::new(io::stdin()));
        } else {
            match File::open(name) {
                Ok(file) => inputs.push(Box::new(file)),
                Err(e) => {
                    eprintln!("bsort: open failed: {}: {}", name, io_error_msg(&e));
                    process::exit(2);
                }
            }
        }
    }

    let cancel = CANCEL.get_or_init(Cancel::new).clone();
    install_interrupt_handler();

    let result = match cli.output {
        Some(path) => match File::create(&path) {
            Ok(file) => run(&config, inputs, file, &cancel),
            Err(e) => {
                eprintln!(
                    "bsort: open failed: {}: {}",
                    path.display(),
                    io_error_msg(&e)
                );
                process::exit(2);
            }
        },
        None => run(&config, inputs, io::stdout().lock(), &cancel),
    };

    if let Err(e) = result {
        match &e {
            SortError::DelimiterNotFound => {
                eprintln!("bsort: {} (a token is larger than the buffer; raise -S)", e)
            }
            _ => eprintln!("bsort: {}", e),
        }
        process::exit(2);
    }

    if cancel.is_cancelled() {
        process::exit(130);
    }
}
