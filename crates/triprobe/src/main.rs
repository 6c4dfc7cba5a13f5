use std::process::ExitCode;

use triprobe_engine::core::{App, AppControl};
use triprobe_engine::device::GpuInit;
use triprobe_engine::logging::{init_logging, LoggingConfig};
use triprobe_engine::probe::{Measurement, ProbeConfig};
use triprobe_engine::window::{Runtime, RuntimeConfig};

/// Prints the measurement, then idles until the window closes.
struct Report;

impl App for Report {
    fn on_measurement(&mut self, measurement: &Measurement) -> AppControl {
        println!("{measurement}");
        AppControl::Continue
    }
}

fn run() -> anyhow::Result<()> {
    Runtime::run(
        RuntimeConfig::default(),
        GpuInit::default(),
        ProbeConfig::default(),
        Report,
    )
}

fn diagnostic(err: &anyhow::Error) -> String {
    format!("triprobe: {err:#}")
}

fn main() -> ExitCode {
    init_logging(LoggingConfig::default());

    match run() {
        Ok(()) => {
            log::debug!("window closed; exiting");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", diagnostic(&err));
            ExitCode::FAILURE
        }
    }
}
