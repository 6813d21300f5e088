//! Terminal demo binary wiring a [`ClockSender`] or [`ClockReceiver`] to a
//! transport and rendering tempo/beat/transport state. Demo scaffolding
//! only, not part of the library's public contract.

use std::thread;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use phasorsyncrs::config::{Args, EngineConfig, Mode};
use phasorsyncrs::transport::MockTransport;
use phasorsyncrs::ClockSender;
#[cfg(feature = "midir-backend")]
use phasorsyncrs::{transport::notification_channel, ClockReceiver};

fn main() {
    if let Err(e) = phasorsyncrs::logging::init_logger() {
        eprintln!("failed to initialize logger: {e}");
        std::process::exit(1);
    }

    let args = Args::parse();
    let engine = match EngineConfig::load(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    match args.mode {
        Mode::Master => run_master(&args, &engine),
        Mode::Slave => run_slave(&args),
    }
}

fn run_master(args: &Args, engine: &EngineConfig) {
    info!("starting in master mode at {} bpm", engine.bpm);
    let transport = resolve_transport(args.device.as_deref());

    let mut sender = ClockSender::with_config(
        transport,
        Duration::from_millis(engine.lookahead_ms),
        Duration::from_millis(engine.safety_margin_ms),
        Duration::from_millis(10),
    );
    sender.set_tempo(engine.bpm);
    sender.set_send_clock_while_stopped(engine.send_clock_while_stopped);
    let apply_time = sender.start(0).expect("tempo was just set");
    let handle = sender.handle();

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} beat {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    for _ in 0..40 {
        thread::sleep(Duration::from_millis(125));
        let beat = handle.timeline_position_for(phasorsyncrs::time::now());
        bar.set_message(format!("{beat:.2}"));
        bar.tick();
    }
    bar.finish_with_message(format!("stopped at apply time {apply_time}"));
    sender.stop();
}

fn run_slave(args: &Args) {
    #[cfg(feature = "midir-backend")]
    {
        run_slave_midir(args);
    }
    #[cfg(not(feature = "midir-backend"))]
    {
        let _ = args;
        eprintln!(
            "slave mode needs a live MIDI input; rebuild with --features midir-backend to receive an upstream clock"
        );
    }
}

#[cfg(feature = "midir-backend")]
fn run_slave_midir(args: &Args) {
    use phasorsyncrs::cli;
    use phasorsyncrs::midir_transport::MidirClockInput;
    use std::sync::{Arc, Mutex};

    let (sink, rx) = notification_channel(16);
    let receiver = Arc::new(Mutex::new(ClockReceiver::new(Some(sink))));
    let handle = receiver.lock().unwrap().handle();

    let ports = MidirClockInput::available_ports("phasorsyncrs").unwrap_or_default();
    let Some(device) = cli::resolve_device(args.device.as_deref(), &ports) else {
        eprintln!("no MIDI input device selected");
        return;
    };
    let _input = match MidirClockInput::open("phasorsyncrs", &device, receiver.clone()) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("failed to open MIDI input {device}: {e}");
            return;
        }
    };
    info!("listening for an upstream clock on {device}");

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );

    thread::spawn(move || {
        while let Ok(event) = rx.recv() {
            info!("clock event: {event:?}");
        }
    });

    loop {
        thread::sleep(Duration::from_millis(125));
        receiver.lock().unwrap().check_timeout(phasorsyncrs::time::now());
        let beat = handle.timeline_position_for(phasorsyncrs::time::now());
        bar.set_message(format!("tempo {:.1} bpm, beat {:.2}", handle.tempo(), beat));
        bar.tick();
    }
}

#[cfg(feature = "midir-backend")]
fn resolve_transport(device: Option<&str>) -> Box<dyn phasorsyncrs::transport::MidiSender> {
    use phasorsyncrs::cli;
    use phasorsyncrs::midir_transport::MidirTransport;

    let ports = MidirTransport::available_ports("phasorsyncrs").unwrap_or_default();
    match cli::resolve_device(device, &ports) {
        Some(name) => match MidirTransport::open("phasorsyncrs", &name) {
            Ok(transport) => Box::new(transport),
            Err(e) => {
                eprintln!("failed to open MIDI port {name}: {e}, falling back to mock transport");
                Box::new(MockTransport::new())
            }
        },
        None => {
            eprintln!("no MIDI device selected, falling back to mock transport");
            Box::new(MockTransport::new())
        }
    }
}

#[cfg(not(feature = "midir-backend"))]
fn resolve_transport(_device: Option<&str>) -> Box<dyn phasorsyncrs::transport::MidiSender> {
    Box::new(MockTransport::new())
}
