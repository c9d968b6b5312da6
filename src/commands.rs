use anyhow::{Context, Result, bail};
use log::info;
use std::time::Duration;

use bench_link::connection::ConnectionManager;
use bench_link::proto::{FrameCodec, Packet};
use bench_link::sim::Bench;
use bench_link::test::{Rig, TestManager, standard_suite};
use bench_link::transport::SerialTransport;

use crate::cli::{LinkOpts, RunOpts, SendOpts, Target};

fn serial_link(name: &str, dev: &str, opts: &LinkOpts, codec: FrameCodec) -> ConnectionManager {
    let transport = SerialTransport::new(dev, opts.baud, codec.close_delim());
    ConnectionManager::new(name, Box::new(transport), codec).with_timeout(opts.timeout())
}

fn open_rig(opts: &LinkOpts) -> Result<Rig> {
    let codec = opts.codec()?;
    if opts.sim {
        info!("[bench] using simulated devices");
        return Ok(Rig::simulated(&Bench::default(), codec, opts.timeout()));
    }
    info!(
        "[bench] receiver={} stand={} baud={} timeout={:?}",
        opts.receiver,
        opts.stand,
        opts.baud,
        opts.timeout()
    );
    Ok(Rig::connect(
        serial_link("receiver", &opts.receiver, opts, codec),
        serial_link("stand", &opts.stand, opts, codec),
    ))
}

fn print_link_stats(rig: &Rig) {
    for dev in [&*rig.receiver, &*rig.stand] {
        let link = dev.link().lock();
        eprintln!("[{}] {} errors={}", dev.name(), link.stats(), link.stats().errors());
    }
}

pub fn info(opts: LinkOpts) -> Result<()> {
    let mut rig = open_rig(&opts)?;
    let mut ok = true;
    for dev in [&mut *rig.receiver, &mut *rig.stand] {
        if dev.read_info() {
            if let Some(info) = dev.info() {
                println!("{}: {}", dev.name(), info);
            }
        } else {
            println!("{}: no identity", dev.name());
            ok = false;
        }
    }
    if !ok {
        bail!("identity query failed");
    }
    Ok(())
}

pub fn status(opts: LinkOpts) -> Result<()> {
    let rig = open_rig(&opts)?;
    for dev in [&*rig.receiver, &*rig.stand] {
        println!("{}: {}", dev.name(), dev.check_connection_status());
    }
    Ok(())
}

pub fn run(opts: RunOpts) -> Result<()> {
    let mut mgr = TestManager::new(standard_suite(Duration::from_millis(opts.settle_ms)));
    for id in &opts.skip {
        if !mgr.set_enabled(*id, false) {
            bail!("no test case with id {}", id);
        }
    }
    if opts.list {
        for case in mgr.test_list() {
            println!(
                "{:>3} {:<24} {}",
                case.id(),
                case.name(),
                if case.enabled { "enabled" } else { "disabled" }
            );
        }
        return Ok(());
    }

    let mut rig = open_rig(&opts.link)?;
    mgr.start_tests(&mut rig);
    let summary = mgr.summary();
    println!("{}", summary);
    print_link_stats(&rig);
    if summary.has_failures() {
        bail!("{} failed, {} aborted", summary.fail, summary.abort);
    }
    Ok(())
}

pub fn send(opts: SendOpts) -> Result<()> {
    let opcode = opts.opcode()?;
    let payload = opts.payload()?;
    let rig = open_rig(&opts.link)?;
    let dev = match opts.target {
        Target::Receiver => &*rig.receiver,
        Target::Stand => &*rig.stand,
    };
    let reply = dev
        .link()
        .exchange(&Packet::new(opcode, payload))
        .with_context(|| format!("{} {}", dev.name(), opcode))?;
    println!(
        "{} check={:04x} payload={:02x?} text={:?}",
        reply.opcode(),
        reply.check(),
        reply.payload(),
        String::from_utf8_lossy(reply.payload())
    );
    Ok(())
}
