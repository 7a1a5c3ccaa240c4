//! Presence demos: exercises `PresenceCore` end to end against an
//! in-memory `KeyValueStore`, printing the resulting roster as JSON.

use std::sync::Arc;

use clap::Subcommand;

use focushive_core::config::PresenceConfig;
use focushive_core::{FakeClock, Identifier, InMemoryKvStore, NullPublisher, PresenceCore, SystemClock};

#[derive(Subcommand)]
pub enum PresenceAction {
    /// Connect two users to a hive from multiple devices, then print the
    /// roster
    Join,
    /// Connect a user, disconnect their only device, and show that the
    /// presence record survives the grace period until finalized
    GracePeriod,
}

pub async fn run(action: PresenceAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        PresenceAction::Join => join().await,
        PresenceAction::GracePeriod => grace_period().await,
    }
}

fn new_core() -> PresenceCore {
    let clock = Arc::new(SystemClock);
    PresenceCore::new(
        PresenceConfig::default(),
        Arc::new(InMemoryKvStore::new(clock.clone())),
        Arc::new(NullPublisher),
        clock,
    )
}

async fn join() -> Result<(), Box<dyn std::error::Error>> {
    let core = new_core();
    let hive_id = Identifier::new();
    let alice = Identifier::new();
    let bob = Identifier::new();

    core.on_connect(alice, hive_id, "alice-laptop".into(), "conn-1".into(), "desktop".into())
        .await?;
    core.on_connect(alice, hive_id, "alice-phone".into(), "conn-2".into(), "mobile".into())
        .await?;
    core.on_connect(bob, hive_id, "bob-laptop".into(), "conn-3".into(), "desktop".into())
        .await?;

    let roster = core.get_hive_roster(hive_id, &[alice, bob]).await?;
    println!("{}", serde_json::to_string_pretty(&roster)?);
    Ok(())
}

async fn grace_period() -> Result<(), Box<dyn std::error::Error>> {
    let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
    let config = PresenceConfig::default();
    let grace_period = config.grace_period;
    let core = PresenceCore::new(
        config,
        Arc::new(InMemoryKvStore::new(clock.clone())),
        Arc::new(NullPublisher),
        clock.clone(),
    );
    let hive_id = Identifier::new();
    let user_id = Identifier::new();

    core.on_connect(user_id, hive_id, "laptop".into(), "conn-1".into(), "desktop".into())
        .await?;
    core.on_disconnect("conn-1").await?;

    let pending = core.get_record(hive_id, user_id).await?;
    println!("-- pending leave --");
    println!("{}", serde_json::to_string_pretty(&pending)?);

    // The grace period has not yet elapsed: finalizing now is a no-op.
    core.finalize_grace_period(user_id, hive_id).await?;
    let still_pending = core.get_record(hive_id, user_id).await?;
    println!("-- finalize before grace period elapses (no-op) --");
    println!("{}", serde_json::to_string_pretty(&still_pending)?);

    clock.advance(chrono::Duration::from_std(grace_period)? + chrono::Duration::seconds(1));
    core.finalize_grace_period(user_id, hive_id).await?;
    let offline = core.get_record(hive_id, user_id).await?;
    println!("-- finalized after grace period --");
    println!("{}", serde_json::to_string_pretty(&offline)?);
    Ok(())
}
