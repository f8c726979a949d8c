use k8056_spectrograph::config::Args;
use k8056_spectrograph::k8056::RelayDriver;
use k8056_spectrograph::k8056::SimulatedDriver;
use k8056_spectrograph::k8056::K8056;
use k8056_spectrograph::redis_gateway::dispatch_requests;
use k8056_spectrograph::redis_gateway::RedisEventSink;
use k8056_spectrograph::spectrograph_ctl::run_worker;
use k8056_spectrograph::spectrograph_ctl::Request;
use k8056_spectrograph::spectrograph_ctl::SpectrographControl;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use log::info;
use log::warn;
use std::sync::mpsc;
use std::thread;

fn main() -> Result<()> {
    let args = Args::parse();

    stderrlog::new()
        .module(module_path!())
        .quiet(args.quiet)
        .verbosity(args.verbose as usize + 2)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    let driver: Box<dyn RelayDriver + Send> = match args.simulate {
        true => {
            info!("No relay card attached, running simulation");
            Box::new(SimulatedDriver::new())
        }
        false => Box::new(K8056::open(&args.device, args.driver_config())?),
    };

    let client = redis::Client::open(args.redis_url.as_str())?;
    let mut requests_con = client
        .get_connection()
        .context("Failed to connect to redis")?;
    let events_con = client
        .get_connection()
        .context("Failed to connect to redis")?;

    let sink = RedisEventSink::new(events_con, &args.event_stream, &args.instrument_id);
    let control = SpectrographControl::new(driver, sink, &args.instrument_id);

    let (sender, receiver) = mpsc::channel::<Request>();
    let worker = thread::Builder::new()
        .name("spectrograph".to_string())
        .spawn(move || run_worker(control, receiver))?;

    info!("Listening for requests on stream '{}'", args.request_stream);

    let result = dispatch_requests(
        &mut requests_con,
        &args.request_stream,
        &args.last_entry_id_key(),
        args.block_ms,
        |e| {
            warn!("{}", e);
            None
        },
        &mut |requests| {
            for request in requests {
                sender
                    .send(request)
                    .context("Spectrograph worker has stopped")?;
            }
            Ok(())
        },
    );

    drop(sender);
    if worker.join().is_err() {
        warn!("Spectrograph worker panicked");
    }

    Ok(result?)
}
