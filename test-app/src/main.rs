// rsplib test application -- CLI tool for exercising the device-control
// layer against a simulated SDRplay receiver.
//
// Usage:
//   rsplib-test-app list
//   rsplib-test-app list --family rspdx
//   rsplib-test-app --model RSP1A devices
//   rsplib-test-app --model RSPdxR2 --hdr --bias-t info
//   rsplib-test-app --model RSP1A --freq 7074000 --gain-reduction 35 stream --blocks 50
//   rsplib-test-app --model RSPdxR2 monitor --duration 5
//   rsplib-test-app --model RSP1B -v stress --count 200

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::Rng;
use tracing::{debug, info};

use rsplib::models::{MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ};
use rsplib::{
    Antenna, DeviceControl, DeviceEvent, DeviceInfo, GainUpdate, Model,
    PowerOverload, Receiver, SampleBlock, format_freq_mhz, format_sample_rate, power_to_dbfs,
    sample_channel,
};
use rsplib_test_harness::{MockApi, MockEmitter};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// rsplib test application -- exercises the device-control layer from the
/// command line.
#[derive(Parser)]
#[command(name = "rsplib-test-app", version, about)]
struct Cli {
    /// Model of the simulated receiver (e.g. RSP1A, RSPdxR2, RSPduo).
    #[arg(long, default_value = "RSPdxR2")]
    model: Model,

    /// Serial number of the simulated receiver.
    #[arg(long, default_value = "2305012345")]
    serial: String,

    /// Number of additional simulated RSP1A receivers on the bus.
    #[arg(long, default_value_t = 1)]
    extra_devices: u8,

    /// Tuner frequency in hertz applied after selection.
    #[arg(long)]
    freq: Option<f64>,

    /// Sample rate in hertz applied after selection.
    #[arg(long)]
    sample_rate: Option<f64>,

    /// IF gain reduction in dB (RSP1A family only).
    #[arg(long)]
    gain_reduction: Option<i32>,

    /// LNA state index (RSP1A family only).
    #[arg(long)]
    lna_state: Option<u8>,

    /// Enable HDR mode (RSPdx family only).
    #[arg(long)]
    hdr: bool,

    /// Enable bias-tee power (RSPdx family only).
    #[arg(long)]
    bias_t: bool,

    /// Antenna port: A, B or C (RSPdx family only).
    #[arg(long, value_parser = parse_antenna)]
    antenna: Option<Antenna>,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

fn parse_antenna(s: &str) -> std::result::Result<Antenna, String> {
    match s.to_ascii_uppercase().as_str() {
        "A" => Ok(Antenna::A),
        "B" => Ok(Antenna::B),
        "C" => Ok(Antenna::C),
        other => Err(format!("unknown antenna port '{other}' (expected A, B or C)")),
    }
}

#[derive(Subcommand)]
enum Command {
    /// List all supported receiver models.
    List {
        /// Filter by family: rsp1a, rspdx, basic.
        #[arg(long)]
        family: Option<String>,
    },

    /// Enumerate the simulated receivers.
    Devices,

    /// Select the receiver, apply settings and print its parameters.
    Info,

    /// Stream simulated noise and print a power meter per block.
    Stream {
        /// Number of blocks to receive.
        #[arg(long, default_value_t = 100)]
        blocks: u32,

        /// Samples per block.
        #[arg(long, default_value_t = 1024)]
        block_size: usize,
    },

    /// Stream while printing device events (AGC changes, overloads).
    Monitor {
        /// Duration in seconds.
        #[arg(long, default_value_t = 5)]
        duration: u64,
    },

    /// Rapid-fire frequency set/get cycles.
    Stress {
        /// Number of set/get cycles.
        #[arg(long, default_value_t = 100)]
        count: u32,
    },
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "rsplib_control=debug,rsplib_test_app=debug,info",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn create_api(cli: &Cli) -> MockApi {
    let mut devices = vec![DeviceInfo::new(&cli.serial, cli.model)];
    for i in 0..cli.extra_devices {
        devices.push(DeviceInfo::new(&format!("1000{i:06}"), Model::Rsp1A));
    }
    MockApi::with_devices(devices)
}

fn create_control(cli: &Cli, api: &MockApi) -> Result<DeviceControl> {
    let mut builder = DeviceControl::builder(Arc::new(api.clone()));
    if let Some(freq) = cli.freq {
        builder = builder.frequency(freq);
    }
    if let Some(rate) = cli.sample_rate {
        builder = builder.sample_rate(rate);
    }
    let control = builder.build().context("invalid settings")?;
    control.open().context("failed to open hardware API")?;
    Ok(control)
}

/// Select the device named by `--serial` and apply variant settings.
fn select<'a>(cli: &Cli, control: &'a DeviceControl) -> Result<Receiver<'a>> {
    let devices = control.get_available_devices()?;
    let info = devices
        .iter()
        .find(|d| d.serial == cli.serial)
        .with_context(|| format!("device {} not found", cli.serial))?;
    let receiver = control.select_device(info)?;
    info!(device = %info, "selected");

    match &receiver {
        Receiver::Rsp1a(rx) => {
            if let Some(db) = cli.gain_reduction {
                let applied = rx.set_gain_reduction(db)?;
                if i32::from(applied) != db {
                    println!("gain reduction clamped to {applied} dB");
                }
            }
            if let Some(state) = cli.lna_state {
                rx.set_lna_state(state)?;
            }
        }
        Receiver::RspDxR2(rx) => {
            rx.set_hdr_mode(cli.hdr)?;
            rx.set_bias_t_enabled(cli.bias_t)?;
            if let Some(port) = cli.antenna {
                rx.set_antenna(port)?;
            }
        }
        Receiver::Basic(_) => {
            let variant_only = cli.gain_reduction.is_some()
                || cli.lna_state.is_some()
                || cli.hdr
                || cli.bias_t
                || cli.antenna.is_some();
            if variant_only {
                bail!("{} has no variant-specific controls", receiver.model());
            }
        }
    }
    Ok(receiver)
}

// ---------------------------------------------------------------------------
// Simulated hardware delivery thread
// ---------------------------------------------------------------------------

struct Noise {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Noise {
    /// Emit Gaussian-ish noise blocks, with an occasional AGC step or
    /// overload, until stopped.
    fn start(emitter: MockEmitter, block_size: usize, events: bool) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let thread = thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut first = 0u32;
            let mut amplitude = 800.0f32;
            let mut overloaded = false;
            while flag.load(Ordering::Relaxed) {
                let mut sample = || -> i16 {
                    let s: f32 = (0..4).map(|_| rng.gen_range(-1.0f32..1.0)).sum();
                    (s * amplitude).clamp(i16::MIN as f32, i16::MAX as f32) as i16
                };
                let xi: Vec<i16> = (0..block_size).map(|_| sample()).collect();
                let xq: Vec<i16> = (0..block_size).map(|_| sample()).collect();
                emitter.emit_samples(&SampleBlock::new(xi, xq, first));
                first = first.wrapping_add(block_size as u32);

                if events && rng.gen_bool(0.05) {
                    let gr = rng.gen_range(20..=59);
                    amplitude = 2_000.0 * 10f32.powf(-(gr as f32 - 20.0) / 40.0);
                    emitter.emit_gain(GainUpdate {
                        gain_reduction_db: gr,
                        lna_gain_reduction_db: 0,
                        current_gain_db: 102.0 - gr as f64,
                    });
                }
                if events && rng.gen_bool(0.01) {
                    overloaded = !overloaded;
                    emitter.emit_power_overload(if overloaded {
                        PowerOverload::Detected
                    } else {
                        PowerOverload::Corrected
                    });
                }
                thread::sleep(Duration::from_millis(2));
            }
        });
        Noise {
            running,
            thread: Some(thread),
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            thread.join().ok();
        }
    }
}

impl Drop for Noise {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_list(filter: Option<&str>) -> Result<()> {
    let filter = filter.map(|f| f.to_lowercase());
    if let Some(f) = &filter {
        if !["rsp1a", "rspdx", "basic"].contains(&f.as_str()) {
            bail!("unknown family '{f}'. Supported: rsp1a, rspdx, basic");
        }
    }

    let models: Vec<_> = rsplib::supported_models()
        .into_iter()
        .filter(|m| {
            let family = match m.family {
                rsplib::Family::Rsp1a => "rsp1a",
                rsplib::Family::RspDx => "rspdx",
                rsplib::Family::Basic => "basic",
            };
            filter.as_deref().is_none_or(|f| f == family)
        })
        .collect();

    println!(
        "{:<8}  {:<16}  {:>5}  {:>3}  {:>6}  {:>8}",
        "Model", "Family", "HWver", "HDR", "Bias-T", "Antennas"
    );
    println!(
        "{:<8}  {:<16}  {:>5}  {:>3}  {:>6}  {:>8}",
        "-".repeat(8),
        "-".repeat(16),
        "-----",
        "---",
        "------",
        "--------"
    );
    for m in &models {
        println!(
            "{:<8}  {:<16}  {:>5}  {:>3}  {:>6}  {:>8}",
            m.name,
            m.family.as_str(),
            m.model.hw_version(),
            if m.has_hdr { "yes" } else { "no" },
            if m.has_bias_t { "yes" } else { "no" },
            m.antenna_ports
        );
    }
    println!();
    println!("{} models total.", models.len());
    Ok(())
}

fn cmd_devices(control: &DeviceControl) -> Result<()> {
    let devices = control.get_available_devices()?;
    if devices.is_empty() {
        println!("No devices attached.");
        return Ok(());
    }
    println!("{:<12}  {:<8}  HWver", "Serial", "Model");
    for d in &devices {
        println!("{:<12}  {:<8}  {}", d.serial, d.model, d.hw_version);
    }
    Ok(())
}

fn cmd_info(cli: &Cli, control: &DeviceControl) -> Result<()> {
    let receiver = select(cli, control)?;
    let params = control
        .get_device_params()
        .context("no parameters for selected device")?;

    println!("API version:    {:.2}", control.get_api_version()?);
    if let Some(device) = control.selected_device() {
        println!("Device:         {device}");
    }
    println!("State:          {}", control.state());
    println!("Frequency:      {}", format_freq_mhz(params.frequency_hz));
    println!("Sample rate:    {}", format_sample_rate(params.sample_rate_hz));
    println!("Gain reduction: {} dB", params.gain_reduction_db);
    println!("LNA state:      {}", params.lna_state);
    println!("AGC:            {}", if params.agc_enabled { "on" } else { "off" });

    match &receiver {
        Receiver::Rsp1a(rx) => {
            println!("LNA states:     {} at this frequency", rx.lna_state_count()?);
        }
        Receiver::RspDxR2(rx) => {
            println!("HDR mode:       {}", if rx.hdr_mode()? { "on" } else { "off" });
            println!("Bias-T:         {}", if rx.bias_t_enabled()? { "on" } else { "off" });
            println!("Antenna:        {}", rx.antenna()?);
        }
        Receiver::Basic(_) => {}
    }
    Ok(())
}

async fn cmd_stream(
    cli: &Cli,
    control: &DeviceControl,
    emitter: MockEmitter,
    blocks: u32,
    block_size: usize,
) -> Result<()> {
    select(cli, control)?;
    let (handler, mut samples) = sample_channel(64);
    let handler = Arc::new(handler);
    control.set_stream_callback(Some(handler.clone()));
    control.initialize_streaming()?;
    control.start_streaming()?;

    let mut noise = Noise::start(emitter, block_size, false);
    let start = Instant::now();
    let mut received = 0u32;
    while received < blocks {
        let block = match tokio::time::timeout(Duration::from_secs(2), samples.recv()).await {
            Ok(Some(block)) => block,
            Ok(None) => break,
            Err(_) => bail!("no samples received for 2 s"),
        };
        received += 1;
        display_power_meter(received, &block);
    }
    println!();

    control.stop_streaming()?;
    noise.stop();
    let elapsed = start.elapsed().as_secs_f64();
    let stats = control.stream_stats();
    println!("Received:       {received} blocks in {elapsed:.2} s");
    println!("Delivered:      {}", stats.delivered);
    println!("Dropped:        {} (channel full: {})", stats.dropped, handler.dropped_blocks());
    Ok(())
}

fn display_power_meter(n: u32, block: &SampleBlock) {
    let dbfs = power_to_dbfs(block.mean_power());
    let width = 40;
    let bar_len = ((dbfs + 60.0) / 60.0 * width as f32).clamp(0.0, width as f32) as usize;
    let bar = "#".repeat(bar_len) + &" ".repeat(width - bar_len);
    print!("\r#{n:<6} [{bar}] {dbfs:>6.1} dBFS");
    io::stdout().flush().ok();
}

async fn cmd_monitor(
    cli: &Cli,
    control: &DeviceControl,
    emitter: MockEmitter,
    duration_secs: u64,
) -> Result<()> {
    select(cli, control)?;
    let mut events = control.subscribe();

    let overload_log: Arc<dyn rsplib::PowerOverloadHandler> = Arc::new(|e: PowerOverload| {
        debug!(%e, "overload handler");
    });
    control.set_power_overload_callback(Some(overload_log.clone()));
    control.initialize_streaming()?;
    control.start_streaming()?;
    let mut noise = Noise::start(emitter, 256, true);

    println!("Monitoring device events for {duration_secs} s...");
    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            println!("Monitor duration elapsed.");
            break;
        }
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(DeviceEvent::GainChanged(g))) => {
                println!(
                    "[gain]     GR {:>2} dB  LNA GR {:>2} dB  gain {:>5.1} dB",
                    g.gain_reduction_db, g.lna_gain_reduction_db, g.current_gain_db
                );
            }
            Ok(Ok(DeviceEvent::PowerOverload(e))) => println!("[overload] {e}"),
            Ok(Ok(DeviceEvent::StateChanged { from, to })) => println!("[state]    {from} -> {to}"),
            Ok(Ok(DeviceEvent::DeviceRemoved)) => {
                println!("[removed]  device removed");
                break;
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(n))) => {
                println!("[warning]  missed {n} events (consumer too slow)");
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => break,
            Err(_) => {
                println!("Monitor duration elapsed.");
                break;
            }
        }
    }

    control.stop_streaming()?;
    noise.stop();
    if let Some(g) = control.last_gain() {
        println!("Last gain: {:.1} dB", g.current_gain_db);
    }
    Ok(())
}

fn cmd_stress(cli: &Cli, control: &DeviceControl, count: u32) -> Result<()> {
    select(cli, control)?;
    let base = control.get_frequency()?;
    println!("Stress test: {count} cycles");
    println!("Base frequency: {}", format_freq_mhz(base));

    let mut rng = rand::thread_rng();
    let mut success = 0u32;
    let mut failures = 0u32;
    let start = Instant::now();

    for i in 1..=count {
        let offset: f64 = rng.gen_range(-500_000.0..=500_000.0);
        let target = (base + offset).round().clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ);

        if let Err(e) = control.set_frequency(target) {
            eprintln!("[{i}/{count}] set_frequency failed: {e}");
            failures += 1;
            continue;
        }
        match control.get_frequency() {
            Ok(readback) if (readback - target).abs() < 1.0 => success += 1,
            Ok(readback) => {
                eprintln!(
                    "[{i}/{count}] mismatch: set {} but read back {}",
                    format_freq_mhz(target),
                    format_freq_mhz(readback)
                );
                failures += 1;
            }
            Err(e) => {
                eprintln!("[{i}/{count}] get_frequency failed: {e}");
                failures += 1;
            }
        }
    }

    let elapsed = start.elapsed();
    let rate = if elapsed.as_secs_f64() > 0.0 {
        count as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    println!();
    println!("Results:");
    println!("  Total cycles:   {count}");
    println!("  Successes:      {success}");
    println!("  Failures:       {failures}");
    println!("  Elapsed:        {:.3} s", elapsed.as_secs_f64());
    println!("  Rate:           {rate:.1} cycles/sec");

    if let Err(e) = control.set_frequency(base) {
        eprintln!("Warning: failed to restore base frequency: {e}");
    } else {
        println!("  Restored:       {}", format_freq_mhz(base));
    }

    if failures > 0 {
        bail!("{failures} out of {count} stress test cycles failed");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // The `list` command does not need a receiver.
    if let Command::List { family } = &cli.command {
        return cmd_list(family.as_deref());
    }

    let api = create_api(&cli);
    let control = create_control(&cli, &api)?;

    let result = match &cli.command {
        Command::Devices => cmd_devices(&control),
        Command::Info => cmd_info(&cli, &control),
        Command::Stream { blocks, block_size } => {
            cmd_stream(&cli, &control, api.emitter(), *blocks, *block_size).await
        }
        Command::Monitor { duration } => {
            cmd_monitor(&cli, &control, api.emitter(), *duration).await
        }
        Command::Stress { count } => cmd_stress(&cli, &control, *count),
        Command::List { .. } => unreachable!("list handled above"),
    };

    control.close();
    if let Some(e) = control.get_last_error() {
        debug!(error = %e, "last recorded error");
    }
    result
}
