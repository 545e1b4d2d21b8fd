use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::PathBuf,
};

use clap::Parser;
use simple_cache::{
    CacheConfig, Clock, SimpleCache,
    memory_access::read_trace,
    sim::{SimpleMemory, System},
    types::AddrRange,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Run a memory access trace through a blocking random-replacement cache")]
struct Args {
    /// Trace file, one `<insn>,[-1,]<0xaddr>[,size][,cpuN]` record per line
    #[arg(short, long)]
    trace: PathBuf,

    /// Cache capacity in bytes
    #[arg(long, default_value_t = 1024)]
    size: usize,

    /// Block size in bytes
    #[arg(long, default_value_t = 64)]
    block_size: usize,

    /// Cache lookup latency in cycles
    #[arg(long, default_value_t = 1)]
    latency: u64,

    /// Memory response latency in ticks
    #[arg(long, default_value_t = 100)]
    mem_latency: u64,

    /// Memory size in bytes, starting at address 0
    #[arg(long, default_value_t = 1 << 24)]
    mem_size: u64,

    /// Number of CPU-side ports
    #[arg(long, default_value_t = 1)]
    cpus: usize,

    /// Seed for victim selection
    #[arg(long, default_value_t = CacheConfig::DEFAULT_SEED)]
    seed: u64,

    /// Ticks per clock cycle
    #[arg(long, default_value_t = 1)]
    period: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = CacheConfig::new(args.size, args.block_size)?
        .with_latency(args.latency)
        .with_cpu_ports(args.cpus)
        .with_seed(args.seed);
    let cache = SimpleCache::new("system.cache", &config, Clock::new(args.period)?)?;
    let memory = SimpleMemory::new(AddrRange::new(0, args.mem_size), args.mem_latency);
    let mut system = System::new(cache, memory, args.period);

    let records = read_trace(BufReader::new(File::open(&args.trace)?))?;
    system.load_trace(&records)?;
    system.run()?;

    let mut writer = BufWriter::new(io::stdout());
    writeln!(writer, "sim_ticks {}", system.now())?;
    system
        .cache()
        .stats()
        .write_to(system.cache().name(), &mut writer)?;
    writer.flush()?;
    Ok(())
}
