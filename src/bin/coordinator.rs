use std::{
    error::Error,
    ffi::OsStr,
    path::PathBuf,
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use clap::Parser;
use syndic::{
    common::{panic_abort, Config, InstanceId, LogicError, TypeId},
    facade::{IdAllocator, Launch, RandomIdAllocator},
    launch::Detached,
    service::{Client, Service},
    Coordinator,
};
use tracing::{debug, info, warn};

type BoxError = Box<dyn Error + Send + Sync>;

const GROUP_NAME: &str = "demo";

// one simulated process: join, publish, then go through barrier rounds
// until the round budget is used up or the leader sees a stop request
fn run_process(
    index: usize,
    client: Client,
    coordinator: &Coordinator,
    n_round: usize,
    shutdown: &AtomicBool,
    stop: &AtomicBool,
) -> Result<(), BoxError> {
    let process_id = client.caller();
    let group_id: TypeId = client.invoke("resolve_type", (GROUP_NAME.to_string(),))?;
    // already added on our behalf, joining again is harmless
    let _: bool = client.invoke("add_this_process_into_group", (group_id,))?;

    let instance_id = RandomIdAllocator.allocate();
    let name = format!("process-{}/mixer", index);
    let published: bool = client.invoke("publish_transceiver", (instance_id, name.clone()))?;
    debug!(process_id, published, "publish {:?}", name);

    let mut round = 0;
    while n_round == 0 || round < n_round {
        client.invoke::<Result<bool, LogicError>, _>("barrier", (group_id,))??;
        if index == 0 {
            stop.store(shutdown.load(Ordering::SeqCst), Ordering::SeqCst);
        }
        client.invoke::<Result<bool, LogicError>, _>("barrier", (group_id,))??;
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let peer = format!("process-{}/mixer", (index + 1) % coordinator.group_size(group_id));
        let peer_id: InstanceId = client.invoke("resolve_instance", (peer.clone(),))?;
        client.invoke::<(), _>(
            "print",
            (format!("round {}: {} is {}", round, peer, peer_id),),
        )?;
        round += 1;
    }

    // nobody resolves names any more
    client.invoke::<Result<bool, LogicError>, _>("barrier", (group_id,))??;
    let _: bool = client.invoke("unpublish_transceiver", (instance_id,))?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    panic_abort();

    #[derive(Parser, Debug)]
    #[clap(name = "Syndic Coordinator", version)]
    struct Args {
        #[clap(short, long, parse(from_os_str))]
        config: Option<PathBuf>,
        #[clap(short = 'n', long = "process-number", default_value_t = 3)]
        n_process: usize,
        /// Barrier rounds per process, 0 to run until ctrl-c.
        #[clap(short = 'r', long = "round-number", default_value_t = 4)]
        n_round: usize,
        #[clap(short = 'w', long = "worker-number")]
        n_worker: Option<usize>,
        /// Program started detached once every process is done.
        #[clap(long, parse(from_os_str))]
        then: Option<PathBuf>,
    }
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    // every simulated process may be parked in a barrier at the same time
    let mut n_worker = args.n_worker.unwrap_or(config.n_worker);
    if n_worker <= args.n_process {
        warn!(
            "{} workers cannot serve {} blocked processes, use {}",
            n_worker,
            args.n_process,
            args.n_process + 1
        );
        n_worker = args.n_process + 1;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let shutdown = shutdown.clone();
        move || {
            println!();
            if !shutdown.load(Ordering::SeqCst) {
                shutdown.store(true, Ordering::SeqCst);
            } else {
                warn!("double ctrl-c, quit ungracefully");
                process::abort();
            }
        }
    })?;

    let coordinator = Arc::new(Coordinator::from_config(&config));
    let service = Service::new(coordinator.clone(), Coordinator::exports());
    // processes are members before any of them runs, so the shutdown wait
    // below knows about all of them
    let group_id = coordinator.register_type(GROUP_NAME.to_string());
    let process_id_list: Vec<_> = (0..args.n_process)
        .map(|_| RandomIdAllocator.allocate())
        .collect();
    for &process_id in &process_id_list {
        coordinator.add_process_into_group(process_id, group_id);
    }
    let stop = AtomicBool::new(false);
    let workers_done = AtomicBool::new(false);
    info!(
        process_id = coordinator.process_id(),
        "serve {} processes with {} workers", args.n_process, n_worker
    );

    crossbeam::thread::scope(|scope| -> Result<(), BoxError> {
        for _ in 0..n_worker {
            scope.spawn(|_| service.run_worker(|| workers_done.load(Ordering::SeqCst)));
        }
        let process_list: Vec<_> = process_id_list
            .iter()
            .enumerate()
            .map(|(index, &process_id)| {
                let client = service.client(process_id);
                let (coordinator, shutdown, stop) = (&*coordinator, &*shutdown, &stop);
                scope.spawn(move |_| {
                    let result =
                        run_process(index, client, coordinator, args.n_round, shutdown, stop);
                    if let Err(err) = &result {
                        warn!(process_id, "{}", err);
                    }
                    coordinator.mark_process_done(process_id);
                    result
                })
            })
            .collect();

        coordinator.wait_until_all_other_processes_are_done();
        workers_done.store(true, Ordering::SeqCst);
        for process in process_list {
            process.join().map_err(|_| "process thread panicked")??;
        }
        Ok(())
    })
    .map_err(|_| "demo thread panicked")?
    .map_err(|err| err as Box<dyn Error>)?;

    coordinator.check_publications()?;
    coordinator.check_membership()?;
    if let Some(program) = &args.then {
        if !Detached.launch(program.as_os_str(), &[OsStr::new(GROUP_NAME)]) {
            warn!("failed to launch {:?}", program);
        }
    }
    drop(service);
    info!("coordinator exit");
    Ok(())
}
