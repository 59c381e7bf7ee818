use std::{
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;

use cinder_ir::{
    ir::{Module, checking, reader, writer},
    opt,
    stats::{Statistics, summarize_module},
};

/// SSA module optimizer: reads a module, removes redundant computations,
/// loads and stores, and writes the result plus a `.stats` counter report.
#[derive(Parser)]
#[command(name = "cinder-opt", version)]
struct Cli {
    /// Input IR file (`-` reads standard input)
    input: PathBuf,

    /// Output IR file
    #[arg(default_value = "out.bc")]
    output: PathBuf,

    /// Promote memory slots to registers before the CSE pass
    #[arg(long)]
    mem2reg: bool,

    /// Skip the CSE pass (the module is still summarized and written)
    #[arg(long)]
    no_cse: bool,

    /// Print statistics to standard error on completion
    #[arg(long)]
    verbose: bool,

    /// Skip IR verification after the passes
    #[arg(long = "no")]
    no_verify: bool,
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }
    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }
    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logger() {
    let level = std::env::var("CINDER_LOG")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(log::LevelFilter::Warn);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn main() -> ExitCode {
    init_logger();
    let cli = Cli::parse();
    run(&cli)
}

fn run(cli: &Cli) -> ExitCode {
    let module_name = cli.input.display().to_string();
    let src = match read_input(&cli.input) {
        Ok(src) => src,
        Err(error) => {
            eprintln!("cinder-opt: cannot read {module_name}: {error}");
            return ExitCode::from(1);
        }
    };
    let mut module = match reader::parse_module(module_name.clone(), &src) {
        Ok(module) => module,
        Err(error) => {
            eprintln!("cinder-opt: {module_name}:{error}");
            return ExitCode::from(1);
        }
    };

    let mut stats = Statistics::new();
    if cli.mem2reg {
        opt::mem2reg_pass(&mut module);
    }
    if !cli.no_cse {
        opt::cse_pass(&mut module, &mut stats);
    }
    summarize_module(&module, &mut stats);

    let stats_path = PathBuf::from(format!("{}.stats", cli.output.display()));
    if let Err(error) = write_stats(&stats_path, &stats) {
        eprintln!("cinder-opt: cannot write {}: {error}", stats_path.display());
        return ExitCode::from(1);
    }

    if cli.verbose {
        let _ = stats.print_report(&mut io::stderr());
    }

    if !cli.no_verify {
        if let Err(error) = checking::verify_module(&module) {
            eprintln!("cinder-opt: verification failed: {error}");
            return ExitCode::from(2);
        }
    }

    if let Err(error) = write_output(&cli.output, &module) {
        eprintln!("cinder-opt: cannot write {}: {error}", cli.output.display());
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn read_input(path: &Path) -> io::Result<String> {
    if path == Path::new("-") {
        let mut src = String::new();
        io::stdin().read_to_string(&mut src)?;
        Ok(src)
    } else {
        fs::read_to_string(path)
    }
}

fn write_stats(path: &Path, stats: &Statistics) -> io::Result<()> {
    let mut out = fs::File::create(path)?;
    stats.write_csv(&mut out)
}

/// Writes through a temporary sibling and renames on success, so a failed
/// run never leaves a partial output file behind.
fn write_output(path: &Path, module: &Module) -> io::Result<()> {
    let tmp_path = PathBuf::from(format!("{}.tmp", path.display()));
    {
        let mut out = fs::File::create(&tmp_path)?;
        writer::write_module(module, &mut out)?;
        out.flush()?;
    }
    fs::rename(&tmp_path, path)
}
