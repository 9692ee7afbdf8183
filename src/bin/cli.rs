use clap::{App, Arg, ArgMatches, SubCommand};
use handoff::{
    BufferPoolConfig, FormatDescriptor, HandoffError, HandoffQueue, MmapSharing, PoolSource,
    QueueConfig, Result,
};
use std::{sync::Arc, thread, time::Instant};

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("handoff-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Producer/consumer buffer handoff demo")
        .subcommand(
            SubCommand::with_name("run")
                .about("Push frames from a producer thread to a consumer thread")
                .arg(
                    Arg::with_name("frames")
                        .short("f")
                        .long("frames")
                        .value_name("FRAMES")
                        .help("Number of frames to hand off")
                        .default_value("1000")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("buffers")
                        .short("b")
                        .long("buffers")
                        .value_name("COUNT")
                        .help("Number of buffers in the pool")
                        .default_value("4")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("size")
                        .short("s")
                        .long("size")
                        .value_name("BYTES")
                        .help("Size of each buffer")
                        .default_value("4096")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("local")
                        .long("local")
                        .help("Allocate buffers locally instead of negotiating shared ones"),
                ),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("Show version and build information"),
        )
        .get_matches();

    match matches.subcommand() {
        ("run", Some(run_matches)) => run_pipeline(run_matches),
        ("info", Some(_)) => show_info(),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn parse_arg(matches: &ArgMatches, name: &str) -> Result<usize> {
    matches
        .value_of(name)
        .unwrap_or_default()
        .parse()
        .map_err(|_| HandoffError::invalid_parameter(name, "Expected a positive integer"))
}

fn run_pipeline(matches: &ArgMatches) -> Result<()> {
    let frames = parse_arg(matches, "frames")?;
    let buffers = parse_arg(matches, "buffers")?;
    let size = parse_arg(matches, "size")?;

    let pool_config = BufferPoolConfig::new("cli")
        .with_buffer_count(buffers)
        .with_buffer_size(size);
    pool_config.validate()?;
    let pool_memory = pool_config.total_memory_required();

    let source = if matches.is_present("local") {
        PoolSource::Local(pool_config)
    } else {
        PoolSource::Shared(Arc::new(MmapSharing::new(buffers, size)))
    };

    let format = FormatDescriptor::with_mime("application/octet-stream")
        .with("frames", frames.to_string());
    let queue = Arc::new(HandoffQueue::new(format, source, QueueConfig::new("cli"))?);
    queue.start()?;

    println!("Handing off {} frames through {} buffers of {} bytes", frames, buffers, size);
    println!("Mode: {}", if queue.is_shared() { "shared" } else { "local" });
    println!("Pool memory: {} bytes", pool_memory);

    let start = Instant::now();

    let consumer_queue = Arc::clone(&queue);
    let consumer = thread::spawn(move || -> Result<u64> {
        let mut bytes = 0u64;
        loop {
            match consumer_queue.read() {
                Ok(buffer) => {
                    bytes += buffer.len() as u64;
                    consumer_queue.release(buffer);
                }
                Err(e) if e.is_end_of_stream() => return Ok(bytes),
                Err(e) => return Err(e),
            }
        }
    });

    for frame in 0..frames {
        // The consumer hands buffers back as it goes; spin until one is free
        let mut buffer = loop {
            match queue.request_buffer() {
                Ok(buffer) => break buffer,
                Err(HandoffError::PoolExhausted { .. }) => thread::yield_now(),
                Err(e) => return Err(e),
            }
        };
        let payload = format!("frame {}", frame);
        let len = payload.len().min(buffer.capacity());
        buffer.fill(&payload.as_bytes()[..len])?;
        queue.store_buffer(Some(buffer))?;
    }
    queue.store_buffer(None)?;

    let bytes = consumer
        .join()
        .map_err(|_| HandoffError::invalid_parameter("consumer", "Consumer thread panicked"))??;
    let elapsed = start.elapsed();

    let stats = queue.stats();
    let pool_stats = queue.pool_stats();
    let report = queue.stop()?;

    println!("\nResults:");
    println!("  Total time: {:.2}ms", elapsed.as_secs_f64() * 1000.0);
    println!("  Frames/sec: {:.0}", frames as f64 / elapsed.as_secs_f64());
    println!("  Bytes consumed: {}", bytes);
    println!("  Peak queue depth: {}", stats.peak_depth);
    println!("  Reader waits: {}", stats.waits);
    println!("  Discarded on stop: {}", report.discarded);
    if let Some(pool_stats) = pool_stats {
        println!("  Pool: {}", pool_stats.summary());
    }
    Ok(())
}

fn show_info() -> Result<()> {
    println!("handoff {}", handoff::VERSION);
    println!("Default buffer size: {} bytes", handoff::config::DEFAULT_BUFFER_SIZE);
    println!("Default buffer count: {}", handoff::config::DEFAULT_BUFFER_COUNT);
    println!("Default alignment: {}", handoff::config::DEFAULT_ALIGNMENT);
    Ok(())
}
