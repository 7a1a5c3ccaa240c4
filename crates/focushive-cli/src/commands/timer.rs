//! Timer demos: exercises `TimerCore` end to end against an in-memory
//! `TxnalStore`, printing each state transition as JSON.

use std::sync::Arc;

use clap::Subcommand;

use focushive_core::config::TimerConfig;
use focushive_core::{
    FocusSession, Identifier, InMemoryTxnalStore, NullPublisher, SessionType, SystemClock, TimerCore, TokioScheduler,
};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Run start -> pause -> resume -> complete and print every transition
    Lifecycle {
        #[arg(long, default_value_t = 1500)]
        duration_sec: u32,
    },
    /// Start a session, record a few distractions, then complete it early
    Distracted {
        #[arg(long, default_value_t = 1500)]
        duration_sec: u32,
        #[arg(long, default_value_t = 3)]
        distractions: u32,
    },
}

fn print_session(label: &str, session: &FocusSession) -> Result<(), Box<dyn std::error::Error>> {
    println!("-- {label} --");
    println!("{}", serde_json::to_string_pretty(session)?);
    Ok(())
}

pub async fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        TimerAction::Lifecycle { duration_sec } => lifecycle(duration_sec).await,
        TimerAction::Distracted {
            duration_sec,
            distractions,
        } => distracted(duration_sec, distractions).await,
    }
}

fn new_core() -> Arc<TimerCore> {
    TimerCore::new(
        TimerConfig::default(),
        Arc::new(InMemoryTxnalStore::default()),
        Arc::new(NullPublisher),
        Arc::new(SystemClock),
        Arc::new(TokioScheduler::new()),
    )
}

async fn lifecycle(duration_sec: u32) -> Result<(), Box<dyn std::error::Error>> {
    let core = new_core();
    let user_id = Identifier::new();

    let session = core
        .start(user_id, None, None, SessionType::Individual, duration_sec)
        .await?;
    print_session("started", &session)?;

    let paused = core.pause(session.id).await?;
    print_session("paused", &paused)?;

    let resumed = core.resume(session.id).await?;
    print_session("resumed", &resumed)?;

    let completed = core.complete(session.id).await?;
    print_session("completed", &completed)?;

    Ok(())
}

async fn distracted(duration_sec: u32, distractions: u32) -> Result<(), Box<dyn std::error::Error>> {
    let core = new_core();
    let user_id = Identifier::new();

    let session = core
        .start(user_id, None, None, SessionType::Individual, duration_sec)
        .await?;
    print_session("started", &session)?;

    let mut last = session;
    for _ in 0..distractions {
        last = core.record_distraction(last.id).await?;
    }
    print_session("distractions recorded", &last)?;

    let completed = core.complete(last.id).await?;
    print_session("completed", &completed)?;

    Ok(())
}
