//! Partnership demo: exercises the buddy engine's full lifecycle against
//! in-memory stores -- request, accept, check-ins, a goal with milestones,
//! and the resulting health/accountability scores.

use std::sync::Arc;

use clap::Subcommand;

use focushive_buddy::{CheckinKind, Mood, PartnershipEngine};
use focushive_core::config::PartnershipConfig;
use focushive_core::{Identifier, InMemoryTxnalStore, NullPublisher, SystemClock};

#[derive(Subcommand)]
pub enum PartnershipAction {
    /// Request a partnership, accept it, record check-ins for both users,
    /// then print the partnership and both accountability scores
    Lifecycle,
    /// Create a goal with milestones, complete them one at a time, and
    /// show progress deriving from milestone completion
    Goal,
}

fn new_engine() -> PartnershipEngine {
    let clock = Arc::new(SystemClock);
    PartnershipEngine::new(
        PartnershipConfig::default(),
        Arc::new(InMemoryTxnalStore::default()),
        Arc::new(InMemoryTxnalStore::default()),
        Arc::new(InMemoryTxnalStore::default()),
        Arc::new(InMemoryTxnalStore::default()),
        Arc::new(NullPublisher),
        clock,
    )
}

pub async fn run(action: PartnershipAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        PartnershipAction::Lifecycle => lifecycle().await,
        PartnershipAction::Goal => goal().await,
    }
}

async fn lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let engine = new_engine();
    let alice = Identifier::new();
    let bob = Identifier::new();

    let partnership = engine.request(alice, bob, 0.82).await?;
    println!("-- requested --");
    println!("{}", serde_json::to_string_pretty(&partnership)?);

    let partnership = engine.accept(partnership.id).await?;
    println!("-- accepted --");
    println!("{}", serde_json::to_string_pretty(&partnership)?);

    engine
        .record_checkin(
            partnership.id,
            alice,
            CheckinKind::Daily,
            "finished the draft".to_string(),
            Mood::Accomplished,
            Some(8),
        )
        .await?;
    engine
        .record_checkin(
            partnership.id,
            bob,
            CheckinKind::Daily,
            "stuck on a bug".to_string(),
            Mood::Frustrated,
            Some(4),
        )
        .await?;

    let partnership = engine.get(partnership.id).await?;
    println!("-- after check-ins --");
    println!("{}", serde_json::to_string_pretty(&partnership)?);

    let alice_score = engine.accountability_score(partnership.id, alice).await?;
    let bob_score = engine.accountability_score(partnership.id, bob).await?;
    println!("-- accountability scores --");
    println!("{}", serde_json::to_string_pretty(&vec![alice_score, bob_score])?);

    Ok(())
}

async fn goal() -> Result<(), Box<dyn std::error::Error>> {
    let engine = new_engine();
    let alice = Identifier::new();
    let bob = Identifier::new();

    let partnership = engine.request(alice, bob, 0.75).await?;
    let partnership = engine.accept(partnership.id).await?;

    let target_date = chrono::Utc::now().date_naive() + chrono::Duration::days(30);
    let goal = engine
        .create_goal(
            partnership.id,
            "Ship the v1 launch".to_string(),
            "Three milestones toward GA".to_string(),
            target_date,
            alice,
        )
        .await?;
    println!("-- goal created --");
    println!("{}", serde_json::to_string_pretty(&goal)?);

    let m1 = engine.add_milestone(goal.id, "design review".to_string(), target_date, 1).await?;
    let m2 = engine.add_milestone(goal.id, "beta launch".to_string(), target_date, 2).await?;
    let m3 = engine.add_milestone(goal.id, "GA launch".to_string(), target_date, 3).await?;

    for milestone in [m1, m2, m3] {
        let (_, updated_goal) = engine.complete_milestone(milestone.id, alice).await?;
        println!("-- milestone completed, goal progress now {} --", updated_goal.progress_pct);
        println!("{}", serde_json::to_string_pretty(&updated_goal)?);
    }

    Ok(())
}
