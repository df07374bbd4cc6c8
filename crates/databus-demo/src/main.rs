#![forbid(unsafe_code)]

//! Channel registry showcase.
//!
//! Wires a small game-flavored state graph through a [`DataBus`]: per-player
//! health channels, a global score, and a disk-backed save-slot kind whose
//! factory captures the store. Run with `RUST_LOG=databus=trace` to watch
//! the registry's construction and eviction decisions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use databus::{
    ArgValue, Channel, ChannelKind, ConstructError, DataBus, ValueSource, args,
};

struct PlayerHealth;

impl ChannelKind for PlayerHealth {
    type Value = i32;

    fn name() -> &'static str {
        "PlayerHealth"
    }

    fn construct(args: &[ArgValue]) -> Result<Channel<i32>, ConstructError> {
        match args {
            [ArgValue::Int(_)] => Ok(Channel::new(100)),
            other => Err(ConstructError::new(format!(
                "expected a player id, got {} parameters",
                other.len()
            ))),
        }
    }
}

struct Score;

impl ChannelKind for Score {
    type Value = u32;

    fn name() -> &'static str {
        "Score"
    }

    fn construct(_args: &[ArgValue]) -> Result<Channel<u32>, ConstructError> {
        Ok(Channel::new(0))
    }
}

struct SaveSlot;

impl ChannelKind for SaveSlot {
    type Value = String;

    fn name() -> &'static str {
        "SaveSlot"
    }

    fn construct(_args: &[ArgValue]) -> Result<Channel<String>, ConstructError> {
        Ok(Channel::new(String::new()))
    }
}

type Disk = Rc<RefCell<HashMap<i64, String>>>;

struct DiskSource {
    disk: Disk,
    slot: i64,
}

#[async_trait(?Send)]
impl ValueSource<String> for DiskSource {
    async fn load(&self, current: String) -> String {
        self.disk.borrow().get(&self.slot).cloned().unwrap_or(current)
    }

    async fn store(&self, value: &String) {
        self.disk.borrow_mut().insert(self.slot, value.clone());
    }
}

fn register_kinds(bus: &DataBus, disk: &Disk) {
    bus.register_kind::<PlayerHealth>();
    bus.register_kind::<Score>();

    let disk = Rc::clone(disk);
    bus.register_kind_with::<SaveSlot>(move |args| {
        let slot = match args {
            [ArgValue::Int(slot)] => *slot,
            other => {
                return Err(ConstructError::new(format!(
                    "expected a slot number, got {} parameters",
                    other.len()
                )));
            }
        };
        let seeded = disk.borrow().get(&slot).cloned().unwrap_or_default();
        Ok(Channel::with_source(
            seeded,
            DiskSource {
                disk: Rc::clone(&disk),
                slot,
            },
        ))
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let bus = DataBus::new();
    let disk: Disk = Rc::new(RefCell::new(HashMap::new()));
    register_kinds(&bus, &disk);

    // HUD watches player 1's health; the replay delivers the seed value.
    let hud = bus
        .add_listener_with_owner::<PlayerHealth>("hud", &args![1], |old, new| {
            println!("[hud] player 1 health: {old} -> {new}");
        })
        .unwrap();

    let _scoreboard = bus
        .add_listener_with_owner::<Score>("scoreboard", &[], |old, new| {
            println!("[scoreboard] score: {old} -> {new}");
        })
        .unwrap();

    bus.set_value::<PlayerHealth>(85, &args![1]);
    bus.set_value::<Score>(250, &[]);

    // Writes to channels nobody watches are dropped on the floor.
    bus.set_value::<PlayerHealth>(10, &args![2]);
    println!(
        "player 2 health (unobserved): {}",
        bus.get_value::<PlayerHealth>(&args![2])
    );

    // The disk-backed kind persists awaited writes through its source.
    let save_watcher = bus
        .add_listener::<SaveSlot>(&args![3], |_, new| {
            println!("[autosave] slot 3 now '{new}'");
        })
        .unwrap();
    bus.set_value_async::<SaveSlot>("checkpoint-9".to_string(), &args![3])
        .await;

    println!("active channel entries:");
    for entry in bus.entries() {
        println!("  {}", entry.name());
    }

    // Dropping the last listener evicts the channel and discards its value;
    // the save slot survives only because its factory reads the disk back.
    bus.remove_listener(save_watcher);
    bus.add_listener::<SaveSlot>(&args![3], |_, new| {
        println!("[reload] slot 3 reseeded to '{new}'");
    })
    .unwrap();

    bus.remove_listener(hud);
    println!(
        "player 1 health after hud left: {}",
        bus.get_value::<PlayerHealth>(&args![1])
    );
}
