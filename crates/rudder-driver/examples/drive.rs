//! Headless driver session runner.
//!
//! Spawns a driver executable, prints every event it emits,
//! auto-approves confirmations, and runs a single goal to completion.
//! Useful for exercising a driver binary without any UI in front of it.
//!
//! Usage:
//!   cargo run -p rudder-driver --example drive -- <driver-binary> <goal...>
//!
//! Set RUST_LOG=rudder_driver=debug to watch the protocol traffic.

use rudder_driver::{BinaryLocator, DriverSupervisor, FixedPath};
use rudder_protocol::{Event, EventKind};
use rudder_types::{DriverConfig, StartOptions};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("Usage: drive <driver-binary> <goal...>");
        std::process::exit(1);
    }

    let Some(executable) = FixedPath::new(&args[0]).resolve() else {
        eprintln!("driver binary not found: {}", args[0]);
        std::process::exit(1);
    };
    let goal = args[1..].join(" ");

    let supervisor = DriverSupervisor::new(DriverConfig::new(executable));

    supervisor.on(EventKind::Thinking, |event| {
        if let Event::Thinking { text, .. } = event {
            println!("[THINKING] {text}");
        }
    });
    supervisor.on(EventKind::Action, |event| {
        if let Event::Action { actions, .. } = event {
            println!("[ACTION] {} planned action(s)", actions.len());
        }
    });
    supervisor.on(EventKind::StateChange, |event| {
        if let Event::StateChange { state, .. } = event {
            println!("[STATE] {state}");
        }
    });
    supervisor.on(EventKind::Error, |event| {
        if let Event::Error {
            message,
            recoverable,
            ..
        } = event
        {
            println!("[ERROR] recoverable={recoverable} {message}");
        }
    });
    supervisor.on_diagnostic(|chunk| {
        eprint!("[STDERR] {chunk}");
    });
    supervisor.on_confirm(|req| async move {
        println!("[CONFIRM] {} -- auto-approving", req.reason);
        Some(true)
    });
    supervisor.on_ask_question(|req| async move {
        println!("[QUESTION] {} -- answering with a default", req.question);
        Some("proceed with the default".to_string())
    });

    println!("session {} starting: {goal}", supervisor.session_id());
    match supervisor.start(&goal, StartOptions::default()).await {
        Ok(outcome) => {
            println!(
                "finished at step {}: success={} reason={} summary={}",
                outcome.step, outcome.success, outcome.reason, outcome.summary
            );
        }
        Err(e) => {
            eprintln!("session failed: {e}");
            std::process::exit(1);
        }
    }
}
