//! # wifisim-common
//!
//! Common types and traits for the wifisim simulation framework.
//!
//! This crate provides core simulation primitives including:
//! - Time representation ([`SimTime`], nanosecond resolution)
//! - Cartesian positions ([`Position`])
//! - Entity identification ([`EntityId`], [`EventId`])
//! - Event system ([`Event`], [`EventPayload`])
//! - Simulation context with cancellable scheduling ([`SimContext`])
//! - Entity traits ([`Entity`]) and dispatch ([`EntityRegistry`])
//! - 802.11 PHY data carried in events ([`wifi`])

pub mod wifi;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

pub use wifi::{
    AmpduTag, CodeRate, DropReason, MacAddress, ModulationClass, MonitorSniff, NodeRole,
    PacketType, PhyNotification, RxSignal, TxVector, WifiFrame, WifiMode, WifiPreamble,
};

// ============================================================================
// Error Types
// ============================================================================

/// Simulation errors.
#[derive(Debug, Error)]
pub enum SimError {
    /// Entity not found.
    #[error("Entity not found: {0:?}")]
    EntityNotFound(EntityId),

    /// Invalid event target.
    #[error("Invalid event target: {0:?}")]
    InvalidTarget(EntityId),

    /// Simulation time overflow.
    #[error("Simulation time overflow")]
    TimeOverflow,

    /// Event handler error.
    #[error("Event handler error in entity {entity:?}: {message}")]
    HandlerError {
        /// Entity that had the error.
        entity: EntityId,
        /// Error message.
        message: String,
    },
}

// ============================================================================
// Time Types
// ============================================================================

/// Simulation time in nanoseconds since simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SimTime(u64);

impl SimTime {
    /// Zero time.
    pub const ZERO: SimTime = SimTime(0);

    /// Largest representable time.
    pub const MAX: SimTime = SimTime(u64::MAX);

    /// Create from nanoseconds.
    pub const fn from_nanos(ns: u64) -> Self {
        SimTime(ns)
    }

    /// Create from microseconds.
    pub const fn from_micros(us: u64) -> Self {
        SimTime(us * 1_000)
    }

    /// Create from fractional microseconds (e.g. 3.6 µs short-GI symbols).
    pub fn from_micros_f64(us: f64) -> Self {
        SimTime((us * 1_000.0).round() as u64)
    }

    /// Create from milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        SimTime(ms * 1_000_000)
    }

    /// Create from seconds (float).
    pub fn from_secs(s: f64) -> Self {
        SimTime((s * 1_000_000_000.0).round() as u64)
    }

    /// Get as nanoseconds.
    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Get as whole microseconds.
    pub fn as_micros(&self) -> u64 {
        self.0 / 1_000
    }

    /// Get as fractional microseconds.
    pub fn as_micros_f64(&self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    /// Get as milliseconds.
    pub fn as_millis(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// Get as seconds (float).
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Add duration to time.
    pub fn add(&self, duration: SimTime) -> Option<SimTime> {
        self.0.checked_add(duration.0).map(SimTime)
    }

    /// Subtract duration from time.
    pub fn sub(&self, duration: SimTime) -> Option<SimTime> {
        self.0.checked_sub(duration.0).map(SimTime)
    }
}

impl std::ops::Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Self) -> Self::Output {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: Self) -> Self::Output {
        SimTime(self.0.saturating_sub(rhs.0))
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}us", self.as_micros_f64())
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Cartesian position in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate in meters.
    pub x: f64,
    /// Y coordinate in meters.
    pub y: f64,
    /// Z coordinate (height) in meters.
    #[serde(default)]
    pub z: f64,
}

impl Position {
    /// Create a new position.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z }
    }

    /// Euclidean distance to another position in meters.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

// ============================================================================
// Entity Types
// ============================================================================

/// Unique identifier for an entity in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Create a new entity ID.
    pub fn new(id: u64) -> Self {
        EntityId(id)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Event Types
// ============================================================================

/// Unique identifier for an event. Doubles as the cancellation handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

/// A simulation event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Unique event ID.
    pub id: EventId,
    /// Time when the event occurs.
    pub time: SimTime,
    /// Entity that created the event.
    pub source: EntityId,
    /// Target entities for the event.
    pub targets: Vec<EntityId>,
    /// Event payload.
    pub payload: EventPayload,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse ordering for min-heap (earliest time first)
        other.time.cmp(&self.time).then_with(|| other.id.0.cmp(&self.id.0))
    }
}

/// Agent asks its PHY to put a frame on the air.
#[derive(Debug, Clone)]
pub struct PhyTxRequestEvent {
    /// Frame to send.
    pub frame: WifiFrame,
    /// Transmission parameters.
    pub tx_vector: TxVector,
    /// PLCP preamble format.
    pub preamble: WifiPreamble,
    /// Position of the frame within an A-MPDU burst.
    pub packet_type: PacketType,
}

/// Agent asks its PHY to retune.
#[derive(Debug, Clone)]
pub struct SetChannelEvent {
    /// Full channel set, two decimal digits per 20 MHz sub-channel.
    pub channel_number: u64,
    /// Active sub-span of the channel set, same encoding.
    pub active_channels: u64,
    /// Primary sub-channel id.
    pub primary_channel: u16,
}

/// PHY hands a transmission to the channel medium.
#[derive(Debug, Clone)]
pub struct ChannelTransmitEvent {
    /// Transmitting PHY.
    pub phy_id: EntityId,
    /// Frame on the air.
    pub frame: WifiFrame,
    /// Radiated power in dBm (tx power level plus tx gain).
    pub tx_power_dbm: f64,
    /// Transmission parameters.
    pub tx_vector: TxVector,
    /// PLCP preamble format.
    pub preamble: WifiPreamble,
    /// Position of the frame within an A-MPDU burst.
    pub packet_type: PacketType,
}

/// PHY publishes its tuning and location to the channel medium.
#[derive(Debug, Clone)]
pub struct ChannelEndpointUpdateEvent {
    /// PHY entity being described.
    pub phy_id: EntityId,
    /// Operating frequency in MHz.
    pub frequency_mhz: u32,
    /// Full channel set encoding.
    pub channel_number: u64,
    /// Active channel set encoding.
    pub active_channels: u64,
    /// Primary sub-channel id.
    pub primary_channel: u16,
    /// Antenna position.
    pub position: Position,
    /// Network role, used by role-aware loss models.
    pub role: NodeRole,
}

/// Channel medium delivers a signal to a receiving PHY.
#[derive(Debug, Clone)]
pub struct SignalArrivalEvent {
    /// Transmitting PHY.
    pub source_phy: EntityId,
    /// Frame on the air.
    pub frame: WifiFrame,
    /// Received powers per sub-channel of the receiver, in dBm.
    pub signal: RxSignal,
    /// Transmission parameters.
    pub tx_vector: TxVector,
    /// PLCP preamble format.
    pub preamble: WifiPreamble,
}

/// PHY reports an outcome or state change to its agent.
#[derive(Debug, Clone)]
pub struct PhyNotificationEvent {
    /// Reporting PHY.
    pub phy_id: EntityId,
    /// What happened.
    pub notification: PhyNotification,
}

/// Event payload variants.
#[derive(Debug, Clone)]
pub enum EventPayload {
    // =========== Agent → PHY Events ===========
    /// Agent requests a transmission.
    PhyTxRequest(PhyTxRequestEvent),
    /// Agent requests a channel switch.
    SetChannel(SetChannelEvent),

    // =========== PHY ↔ Channel Events ===========
    /// A PHY started transmitting (directed to the channel entity).
    ChannelTransmit(ChannelTransmitEvent),
    /// A PHY changed channel or was registered.
    ChannelEndpointUpdate(ChannelEndpointUpdateEvent),
    /// A signal reaches a receiving PHY.
    SignalArrival(SignalArrivalEvent),

    // =========== PHY → Agent Events ===========
    /// Upward notification from a PHY.
    PhyNotification(PhyNotificationEvent),

    // =========== Scheduling ===========
    /// A delayed callback.
    Timer {
        /// User-defined timer ID.
        timer_id: u64,
    },

    // =========== Simulation Control ===========
    /// End the simulation.
    SimulationEnd,
}

// ============================================================================
// Simulation Context
// ============================================================================

/// Context passed to entities during event handling.
pub struct SimContext {
    time: SimTime,
    rng: ChaCha8Rng,
    seed: u64,
    pending_events: Vec<Event>,
    cancelled: HashSet<EventId>,
    next_event_id: u64,
    source_entity: EntityId,
}

impl SimContext {
    /// Create a new simulation context.
    pub fn new(seed: u64) -> Self {
        SimContext {
            time: SimTime::ZERO,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            pending_events: Vec::new(),
            cancelled: HashSet::new(),
            next_event_id: 0,
            source_entity: EntityId(0),
        }
    }

    /// Get the current simulation time.
    pub fn time(&self) -> SimTime {
        self.time
    }

    /// Get mutable access to the shared random number generator.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Derive an independent, reproducible stream for an entity.
    pub fn stream_for(&self, entity: EntityId) -> ChaCha8Rng {
        derive_stream(self.seed, entity)
    }

    /// Set the current time (used by event loop).
    pub fn set_time(&mut self, time: SimTime) {
        self.time = time;
    }

    /// Set the source entity (used by event loop).
    pub fn set_source(&mut self, entity: EntityId) {
        self.source_entity = entity;
    }

    /// Post an event to occur after a delay. The returned id cancels it.
    pub fn post_event(&mut self, delay: SimTime, targets: Vec<EntityId>, payload: EventPayload) -> EventId {
        let id = EventId(self.next_event_id);
        let event = Event {
            id,
            time: self.time + delay,
            source: self.source_entity,
            targets,
            payload,
        };
        self.next_event_id += 1;
        self.pending_events.push(event);
        id
    }

    /// Post an event to occur immediately (at current time).
    pub fn post_immediate(&mut self, targets: Vec<EntityId>, payload: EventPayload) -> EventId {
        self.post_event(SimTime::ZERO, targets, payload)
    }

    /// Cancel a previously posted event. Cancelling a fired event is a no-op.
    pub fn cancel_event(&mut self, id: EventId) {
        if let Some(idx) = self.pending_events.iter().position(|e| e.id == id) {
            self.pending_events.remove(idx);
        } else {
            self.cancelled.insert(id);
        }
    }

    /// Consume a cancellation mark (used by event loop when popping events).
    pub fn take_cancelled(&mut self, id: EventId) -> bool {
        self.cancelled.remove(&id)
    }

    /// Take all pending events (used by event loop).
    pub fn take_pending_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending_events)
    }

    /// Get the next event ID (used by event loop for external event creation).
    pub fn next_event_id(&mut self) -> u64 {
        let id = self.next_event_id;
        self.next_event_id += 1;
        id
    }
}

/// Seed a per-entity random stream from the scenario seed.
pub fn derive_stream(seed: u64, entity: EntityId) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(entity.0);
    rng
}

// ============================================================================
// Entity Trait
// ============================================================================

/// Base trait for all simulation entities.
pub trait Entity: Send {
    /// Get the entity's unique ID.
    fn entity_id(&self) -> EntityId;

    /// Handle an event.
    fn handle_event(&mut self, event: &Event, ctx: &mut SimContext) -> Result<(), SimError>;

    /// Downcast support for inspection by tests and the runner.
    fn as_any(&self) -> &dyn std::any::Any;
}

// ============================================================================
// Entity Registry
// ============================================================================

/// Registry for managing simulation entities.
pub struct EntityRegistry {
    entities: HashMap<EntityId, Box<dyn Entity>>,
}

impl EntityRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        EntityRegistry {
            entities: HashMap::new(),
        }
    }

    /// Register an entity.
    pub fn register(&mut self, entity: Box<dyn Entity>) {
        let id = entity.entity_id();
        self.entities.insert(id, entity);
    }

    /// Get an entity by ID.
    pub fn get(&self, id: EntityId) -> Option<&dyn Entity> {
        self.entities.get(&id).map(|e| e.as_ref())
    }

    /// Get a concrete entity by ID.
    pub fn get_as<T: 'static>(&self, id: EntityId) -> Option<&T> {
        self.get(id).and_then(|e| e.as_any().downcast_ref::<T>())
    }

    /// Get a mutable reference to an entity by ID.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Box<dyn Entity>> {
        self.entities.get_mut(&id)
    }

    /// Dispatch an event to its target entities.
    pub fn dispatch_event(&mut self, event: &Event, ctx: &mut SimContext) -> Result<(), SimError> {
        for target in &event.targets {
            if let Some(entity) = self.entities.get_mut(target) {
                ctx.set_source(*target);
                entity.handle_event(event, ctx)?;
            } else {
                tracing::error!(target_entity = %target, payload = ?event.payload, "entity not found during dispatch");
                return Err(SimError::EntityNotFound(*target));
            }
        }
        Ok(())
    }

    /// Get all entity IDs.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Get the number of registered entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
