//! httpmon - Main Entry Point

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use httpmon::{report, Monitor, MonitorConfig};

/// Passive HTTP connection reuse monitor
#[derive(Parser)]
#[command(name = "httpmon")]
#[command(version = "0.1.0")]
#[command(about = "Counts HTTP requests per TCP connection on monitored ports", long_about = None)]
struct Cli {
    /// Interface to listen on, or a tcpdump capture file; repeatable.
    /// Defaults to the pcap default interface plus loopback.
    #[arg(short = 'i', long = "interface")]
    interfaces: Vec<String>,

    /// Ports to monitor for HTTP traffic [default: 80]
    #[arg(short, long, value_delimiter = ',')]
    port: Vec<u16>,

    /// Disable name resolution
    #[arg(short = 'n')]
    no_resolve: bool,

    /// Do not display per-connection messages
    #[arg(short, long)]
    quiet: bool,

    /// Only print the capture filter, for separate capture via tcpdump
    #[arg(long)]
    show_filter: bool,

    /// JSON configuration file; command-line flags override it
    #[arg(long)]
    config: Option<String>,
}

impl Cli {
    fn into_config(self) -> httpmon::Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::load(path)?,
            None => MonitorConfig::default(),
        };

        if !self.interfaces.is_empty() {
            config.devices = self.interfaces;
        }
        if !self.port.is_empty() {
            config.ports = self.port;
        }
        config.resolve_names = config.resolve_names && !self.no_resolve;
        config.quiet = config.quiet || self.quiet;
        config.show_filter = config.show_filter || self.show_filter;

        Ok(config)
    }
}

static STOP: AtomicBool = AtomicBool::new(false);
static LIVE_STATS: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
fn install_signal_flags() {
    extern "C" fn on_interrupt(_sig: i32) {
        STOP.store(true, Ordering::SeqCst);
    }

    extern "C" fn on_live_stats(_sig: i32) {
        LIVE_STATS.store(true, Ordering::SeqCst);
    }

    let interrupt = on_interrupt as extern "C" fn(i32);
    let live_stats = on_live_stats as extern "C" fn(i32);

    unsafe {
        libc::signal(libc::SIGINT, interrupt as libc::sighandler_t);
        libc::signal(libc::SIGTERM, interrupt as libc::sighandler_t);
        libc::signal(libc::SIGUSR1, live_stats as libc::sighandler_t);
    }
}

#[cfg(unix)]
fn uninstall_signal_flags() {
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
        libc::signal(libc::SIGTERM, libc::SIG_DFL);
        libc::signal(libc::SIGUSR1, libc::SIG_DFL);
    }
}

#[cfg(not(unix))]
fn install_signal_flags() {}

#[cfg(not(unix))]
fn uninstall_signal_flags() {}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Cli::parse().into_config()?;
    let monitor = Monitor::new(config.clone());

    if config.show_filter {
        println!("{}", monitor.filter());
        return Ok(());
    }

    install_signal_flags();

    // Supervisor: turns the signal flags into a snapshot print or a
    // single orderly stop, then exits with the run.
    let handle = monitor.shutdown_handle();
    let aggregate = monitor.aggregate();

    let supervisor = thread::spawn(move || {
        while handle.is_running() {
            if LIVE_STATS.swap(false, Ordering::SeqCst) {
                let snapshot = aggregate.snapshot();

                if snapshot.count == 0 {
                    println!("no requests");
                } else {
                    println!(
                        "{} (count, min, avg, max, stddev)",
                        report::statistic_line(&snapshot)
                    );
                }
            }

            if STOP.load(Ordering::SeqCst) {
                handle.stop();
                break;
            }

            thread::sleep(Duration::from_millis(100));
        }
    });

    let report = monitor.run()?;

    let _ = supervisor.join();
    uninstall_signal_flags();

    if STOP.load(Ordering::SeqCst) {
        // clear the ^C
        println!();
    }

    println!("{report}");

    Ok(())
}
