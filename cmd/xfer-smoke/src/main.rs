//! xfer End-to-End Smoke Test
//!
//! Drives a processor over the loopback engine:
//!   Part A: single request (echo, refused, timed out)
//!   Part B: concurrent callers sharing one worker
//!   Part C: cancellation
//!   Part D: close
//!
//! Run: ./target/release/xfer-smoke
//! Env: XFER_POLL_TIMEOUT_MS, XFER_POLL_INTERVAL_MS, XFER_WORKER_NAME,
//!      XFER_SMOKE_CALLERS (default 64), RUST_LOG

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use xfer_core::env::env_get;
use xfer_core::{FailureCause, RequestDescriptor, XferError};
use xfer_module::{LoopbackConfig, LoopbackEngine};
use xfer_processor::{Processor, ProcessorConfig};

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

// ════════════════════════════════════════════════════════════
// Part A: Single request
// ════════════════════════════════════════════════════════════

async fn test_single(t: &mut TestRunner, p: &Processor) {
    t.section("Part A: Single request");

    // A1: echo
    match p.execute(RequestDescriptor::post("http://peer/echo", "ping")).await {
        Ok(resp) => t.check(
            "POST echoes body",
            resp.status == 200 && resp.body == b"ping",
            &format!("status={} body={:?}", resp.status, String::from_utf8_lossy(&resp.body)),
        ),
        Err(e) => t.fail("POST echoes body", &e.to_string()),
    }

    // A2: refused
    match p.execute(RequestDescriptor::get("http://unreachable/")).await {
        Err(XferError::Transfer(FailureCause::ConnectionRefused(_))) => t.pass("unreachable target refused"),
        other => t.fail("unreachable target refused", &format!("{:?}", other)),
    }

    // A3: engine-side timeout
    let req = RequestDescriptor::get("http://peer/slow").total_timeout(Duration::from_millis(1));
    match p.execute(req).await {
        Err(XferError::Transfer(FailureCause::Timeout)) => t.pass("total timeout enforced by engine"),
        other => t.fail("total timeout enforced by engine", &format!("{:?}", other)),
    }

    t.check(
        "active count back to zero",
        p.active_count() == 0,
        &format!("active={}", p.active_count()),
    );
}

// ════════════════════════════════════════════════════════════
// Part B: Concurrent callers
// ════════════════════════════════════════════════════════════

async fn test_concurrent(t: &mut TestRunner, p: &Arc<Processor>) {
    let callers: usize = env_get("XFER_SMOKE_CALLERS", 64);
    t.section(&format!("Part B: {} concurrent callers", callers));

    let start = Instant::now();
    let tasks: Vec<_> = (0..callers)
        .map(|i| {
            let p = Arc::clone(p);
            tokio::spawn(async move {
                let body = format!("caller-{}", i);
                let resp = p.execute(RequestDescriptor::post("http://peer/", body.clone())).await;
                matches!(resp, Ok(r) if r.body == body.as_bytes())
            })
        })
        .collect();

    let mut matched = 0;
    for task in tasks {
        if matches!(task.await, Ok(true)) {
            matched += 1;
        }
    }
    let elapsed = start.elapsed();

    t.check(
        "every caller got its own response",
        matched == callers,
        &format!("{}/{} matched", matched, callers),
    );
    let stats = p.stats();
    t.check(
        "no orphaned records",
        stats.orphaned_records == 0,
        &format!("orphans={}", stats.orphaned_records),
    );
    println!(
        "       {} requests in {:?}, {} polls dispatched",
        callers, elapsed, stats.polls_dispatched
    );
}

// ════════════════════════════════════════════════════════════
// Part C: Cancellation
// ════════════════════════════════════════════════════════════

async fn test_cancel(t: &mut TestRunner, p: &Processor) {
    t.section("Part C: Cancellation");

    // The loopback latency (50ms) leaves room for the cancel to win.
    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            token.cancel();
        })
    };
    let result = p
        .execute_request(RequestDescriptor::get("http://peer/cancel-me"), &token)
        .await;
    let _ = canceller.await;
    match result {
        Err(e) if e.is_cancelled() => t.pass("cancel yields cancellation failure"),
        other => t.fail("cancel yields cancellation failure", &format!("{:?}", other)),
    }

    // Already-cancelled token: still terminal, never a hang.
    let token = CancellationToken::new();
    token.cancel();
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        p.execute_request(RequestDescriptor::get("http://peer/pre-cancelled"), &token),
    )
    .await;
    t.check("pre-cancelled request terminates", outcome.is_ok(), "timed out");

    t.check(
        "active count back to zero",
        p.active_count() == 0,
        &format!("active={}", p.active_count()),
    );
}

// ════════════════════════════════════════════════════════════
// Part D: Close
// ════════════════════════════════════════════════════════════

async fn test_close(t: &mut TestRunner, p: &Processor) {
    t.section("Part D: Close");

    match p.close().await {
        Ok(()) => t.pass("close() while idle"),
        Err(e) => t.fail("close() while idle", &e.to_string()),
    }

    match p.execute(RequestDescriptor::get("http://peer/late")).await {
        Err(XferError::WorkerUnavailable) => t.pass("submit after close rejected"),
        other => t.fail("submit after close rejected", &format!("{:?}", other)),
    }

    t.check(
        "second close rejected",
        matches!(p.close().await, Err(XferError::WorkerUnavailable)),
        "close() accepted twice",
    );
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== xfer End-to-End Smoke Test ===");

    let config = ProcessorConfig::from_env();
    println!(
        "    poll_timeout={:?} poll_interval={:?} worker={}",
        config.poll_timeout, config.poll_interval, config.worker_name
    );

    let mut t = TestRunner::new();

    let engine_config = LoopbackConfig::new().latency(Duration::from_millis(50));
    let processor = match Processor::start(config, move || Ok(LoopbackEngine::new(engine_config))) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            println!("\nFATAL: processor start failed: {}", e);
            t.summary();
            std::process::exit(1);
        }
    };

    test_single(&mut t, &processor).await;
    test_concurrent(&mut t, &processor).await;
    test_cancel(&mut t, &processor).await;
    test_close(&mut t, &processor).await;

    let stats = processor.stats();
    tracing::info!(?stats, "smoke run finished");
    println!(
        "\n    scheduled={} succeeded={} failed={} cancels={} polls={}",
        stats.scheduled, stats.succeeded, stats.failed, stats.cancels_dispatched, stats.polls_dispatched
    );

    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
