//! # Event Rotation
//!
//! Periodic per-slot event scheduler.
//!
//! Each slot owns a schedule of [`EventConfig`]s and a rotation period. A
//! ticking task per slot advances to the next config when the period
//! elapses and picks a random location for its game mode. Readers get the
//! current event under a read lock; rotation takes the write lock briefly.
//!
//! ## Location Fallback
//! 1. Locations registered for the config's game mode
//! 2. Any known location
//! 3. Location 0

use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::error::{constants, ProtocolError, Result};
use crate::service::{ContentLookup, EventService};

pub const GAME_MODE_SHOWDOWN: &str = "BattleRoyale";
pub const GAME_MODE_BOUNTY: &str = "BountyHunter";
pub const GAME_MODE_GEM_GRAB: &str = "CoinRush";
pub const GAME_MODE_HEIST: &str = "AttackDefend";
pub const GAME_MODE_BRAWL_BALL: &str = "LaserBall";

/// Parameters of one event as the client displays it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfig {
    pub game_mode: String,
    #[serde(default)]
    pub required_brawlers: i32,
    #[serde(default)]
    pub coins_to_claim: i32,
    #[serde(default)]
    pub bonus_coins: i32,
    #[serde(default)]
    pub coins_to_win: i32,
    pub event_text: String,
    #[serde(default)]
    pub double_coins: bool,
    #[serde(default)]
    pub double_exp: bool,
}

impl EventConfig {
    fn basic(game_mode: &str, event_text: &str) -> Self {
        Self {
            game_mode: game_mode.to_string(),
            required_brawlers: 0,
            coins_to_claim: 0,
            bonus_coins: 0,
            coins_to_win: 100,
            event_text: event_text.to_string(),
            double_coins: false,
            double_exp: false,
        }
    }
}

/// Configs a slot cycles through, and how long each one runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSlotSchedule {
    pub configs: Vec<EventConfig>,
    #[serde(with = "crate::config::duration_serde")]
    pub duration: Duration,
}

/// The event currently running in a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEvent {
    pub slot: usize,
    pub location_id: i32,
    pub started_at: SystemTime,
    pub ends_at: SystemTime,
    pub config: EventConfig,
}

impl ActiveEvent {
    /// Whole seconds until the event ends, never below 1.
    pub fn seconds_left(&self, now: SystemTime) -> i32 {
        self.ends_at
            .duration_since(now)
            .map(|left| left.as_secs().min(i32::MAX as u64) as i32)
            .unwrap_or(0)
            .max(1)
    }
}

/// The four stock slots.
pub fn default_schedules() -> Vec<EventSlotSchedule> {
    const HOUR: u64 = 3600;

    let mut brawl_ball = EventConfig::basic(GAME_MODE_BRAWL_BALL, "Brawl Ball");
    brawl_ball.double_exp = true;

    let mut heist = EventConfig::basic(GAME_MODE_HEIST, "Heist");
    heist.coins_to_claim = 100;
    heist.double_coins = true;

    vec![
        EventSlotSchedule {
            configs: vec![
                EventConfig::basic(GAME_MODE_SHOWDOWN, "Solo Showdown"),
                EventConfig::basic(GAME_MODE_GEM_GRAB, "Gem Grab"),
            ],
            duration: Duration::from_secs(2 * HOUR),
        },
        EventSlotSchedule {
            configs: vec![brawl_ball],
            duration: Duration::from_secs(HOUR),
        },
        EventSlotSchedule {
            configs: vec![heist, EventConfig::basic(GAME_MODE_BOUNTY, "Bounty")],
            duration: Duration::from_secs(3 * HOUR),
        },
        EventSlotSchedule {
            configs: vec![EventConfig::basic(GAME_MODE_SHOWDOWN, "Solo Showdown")],
            duration: Duration::from_secs(4 * HOUR),
        },
    ]
}

#[derive(Debug)]
struct SlotState {
    schedule: EventSlotSchedule,
    rotation_index: Option<usize>,
    current: Option<ActiveEvent>,
}

/// Rotating event slots served to handlers through [`EventService`].
pub struct EventRotation {
    slots: RwLock<Vec<SlotState>>,
    content: Arc<dyn ContentLookup>,
}

impl EventRotation {
    /// Validate the schedules and start every slot on its first config.
    pub fn new(schedules: Vec<EventSlotSchedule>, content: Arc<dyn ContentLookup>) -> Result<Self> {
        for (index, schedule) in schedules.iter().enumerate() {
            if schedule.configs.is_empty() {
                return Err(ProtocolError::ConfigError(format!(
                    "Schedule for event slot {index} is empty"
                )));
            }
            if schedule.duration.is_zero() {
                return Err(ProtocolError::ConfigError(format!(
                    "Event slot {index} has a zero rotation duration"
                )));
            }
        }

        let rotation = Self {
            slots: RwLock::new(
                schedules
                    .into_iter()
                    .map(|schedule| SlotState {
                        schedule,
                        rotation_index: None,
                        current: None,
                    })
                    .collect(),
            ),
            content,
        };

        for slot in 0..rotation.slot_count() {
            rotation.rotate(slot)?;
        }
        info!(slots = rotation.slot_count(), "event rotation initialized");
        Ok(rotation)
    }

    /// Advance `slot` to its next config, starting now.
    pub fn rotate(&self, slot: usize) -> Result<ActiveEvent> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_EVENT_LOCK.to_string()))?;

        let state = slots
            .get_mut(slot)
            .ok_or_else(|| ProtocolError::Custom(format!("Invalid event slot {slot}")))?;

        let next = state
            .rotation_index
            .map_or(0, |index| (index + 1) % state.schedule.configs.len());
        let config = state.schedule.configs[next].clone();
        let location_id = self.pick_location(&config.game_mode);

        let started_at = SystemTime::now();
        let event = ActiveEvent {
            slot,
            location_id,
            started_at,
            ends_at: started_at + state.schedule.duration,
            config,
        };

        state.rotation_index = Some(next);
        state.current = Some(event.clone());

        info!(
            slot,
            game_mode = %event.config.game_mode,
            location = location_id,
            "rotated event"
        );
        Ok(event)
    }

    fn pick_location(&self, game_mode: &str) -> i32 {
        let mut candidates = self.content.locations_for_mode(game_mode);
        if candidates.is_empty() {
            warn!(game_mode, "no locations for game mode, using any location");
            candidates = self.content.location_ids();
        }
        if candidates.is_empty() {
            error!(game_mode, "no locations known at all, using location 0");
            return 0;
        }
        candidates[rand::rng().random_range(0..candidates.len())]
    }

    fn period(&self, slot: usize) -> Option<Duration> {
        self.slots
            .read()
            .ok()
            .and_then(|slots| slots.get(slot).map(|s| s.schedule.duration))
    }

    /// Spawn one rotation task per slot; each stops when `shutdown` flips to true.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..self.slot_count())
            .filter_map(|slot| {
                let period = self.period(slot)?;
                let rotation = Arc::clone(self);
                let shutdown = shutdown.clone();
                Some(tokio::spawn(async move {
                    rotation.run_slot(slot, period, shutdown).await;
                }))
            })
            .collect()
    }

    #[instrument(skip(self, shutdown))]
    async fn run_slot(&self, slot: usize, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        info!("starting rotation loop");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.rotate(slot) {
                        error!(error = %e, "failed to rotate event");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("stopping rotation loop");
    }
}

impl EventService for EventRotation {
    fn slot_count(&self) -> usize {
        self.slots.read().map(|slots| slots.len()).unwrap_or(0)
    }

    fn current_event(&self, slot: usize) -> Option<ActiveEvent> {
        let slots = self.slots.read().ok()?;
        slots.get(slot)?.current.clone()
    }
}

impl std::fmt::Debug for EventRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRotation")
            .field("slots", &self.slot_count())
            .finish_non_exhaustive()
    }
}
