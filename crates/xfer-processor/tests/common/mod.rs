#![allow(dead_code)]

use std::sync::OnceLock;
use std::time::Duration;

use xfer_module::{ScriptHandle, ScriptedEngine};
use xfer_processor::{Processor, ProcessorConfig};

pub fn init_tracing() {
    static ONCE: OnceLock<()> = OnceLock::new();
    ONCE.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn fast_config() -> ProcessorConfig {
    ProcessorConfig::new()
        .poll_timeout(Duration::ZERO)
        .poll_interval(Duration::from_millis(1))
        .worker_name("xfer-test")
}

/// A processor over a scripted engine, plus the script that drives it.
pub fn scripted() -> (Processor, ScriptHandle) {
    init_tracing();
    let (engine, script) = ScriptedEngine::new();
    let processor = Processor::start(fast_config(), move || Ok(engine)).expect("processor start");
    (processor, script)
}

/// Wait until the engine has seen `n` schedules.
pub async fn wait_scheduled(script: &ScriptHandle, n: usize) {
    for _ in 0..2000 {
        if script.scheduled().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("engine saw {} schedules, expected {}", script.scheduled().len(), n);
}

/// Wait until the engine has seen `n` cancels.
pub async fn wait_cancels(script: &ScriptHandle, n: usize) {
    for _ in 0..2000 {
        if script.cancels().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("engine saw {} cancels, expected {}", script.cancels().len(), n);
}
