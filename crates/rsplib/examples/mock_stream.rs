//! Stream sample blocks from a simulated receiver into async code.
//!
//! Demonstrates the full lifecycle against `MockApi`: a background thread
//! plays the role of the hardware delivery thread, blocks travel through a
//! `sample_channel` into a tokio task, and device events are printed as
//! they arrive.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p rsplib --example mock_stream
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rsplib::{
    DeviceControl, DeviceInfo, GainUpdate, Model, Receiver, SampleBlock, format_freq_mhz,
    power_to_dbfs, sample_channel,
};
use rsplib_test_harness::MockApi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let api = MockApi::with_devices([
        DeviceInfo::new("1000", Model::Rsp1A),
        DeviceInfo::new("2000", Model::RspDxR2),
    ]);
    let emitter = api.emitter();
    let control = DeviceControl::builder(Arc::new(api))
        .frequency(100_000_000.0)
        .sample_rate(2_000_000.0)
        .build()?;

    control.open()?;
    println!("API version {:.2}", control.get_api_version()?);

    let devices = control.get_available_devices()?;
    for device in &devices {
        println!("found {device}");
    }

    match control.select_device(&devices[1])? {
        Receiver::RspDxR2(rx) => {
            rx.set_hdr_mode(false)?;
            rx.set_bias_t_enabled(false)?;
        }
        Receiver::Rsp1a(rx) => {
            rx.set_gain_reduction(40)?;
        }
        Receiver::Basic(_) => {}
    }
    println!("tuned to {}", format_freq_mhz(control.get_frequency()?));

    let mut events = control.subscribe();
    let (handler, mut samples) = sample_channel(16);
    let handler = Arc::new(handler);
    control.set_stream_callback(Some(handler.clone()));

    control.initialize_streaming()?;
    control.start_streaming()?;

    // Simulated delivery thread.
    let running = Arc::new(AtomicBool::new(true));
    let producer = {
        let running = running.clone();
        thread::spawn(move || {
            let mut n = 0u32;
            while running.load(Ordering::Relaxed) {
                let xi = (0..1024).map(|i| ((i * 37 % 200) as i16 - 100) * 40).collect();
                let xq = (0..1024).map(|i| ((i * 53 % 200) as i16 - 100) * 40).collect();
                emitter.emit_samples(&SampleBlock::new(xi, xq, n * 1024));
                if n % 10 == 0 {
                    emitter.emit_gain(GainUpdate {
                        gain_reduction_db: 40,
                        lna_gain_reduction_db: 0,
                        current_gain_db: 20.0,
                    });
                }
                n += 1;
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    for _ in 0..20 {
        let Some(block) = samples.recv().await else {
            break;
        };
        println!(
            "block @{:>7}: {} samples, {:>6.1} dBFS",
            block.first_sample_num,
            block.num_samples(),
            power_to_dbfs(block.mean_power())
        );
    }

    control.stop_streaming()?;
    running.store(false, Ordering::Relaxed);
    producer.join().ok();

    while let Ok(event) = events.try_recv() {
        println!("[event] {event:?}");
    }

    control.close();
    println!("dropped blocks: {}", handler.dropped_blocks());
    Ok(())
}
