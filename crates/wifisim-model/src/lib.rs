//! # wifisim-model
//!
//! YAML scenario loading and simulation building for wifisim.
//!
//! This crate provides:
//! - YAML schema types for scenarios
//! - Scenario loading from files and strings, with multi-file overlays
//! - Simulation building from loaded scenarios
//! - Property registry listing every tunable with its default
//!
//! ## Scenario Layout
//!
//! ```yaml
//! simulation:
//!   seed: 7
//!   duration_s: 1.0
//! defaults:
//!   phy:
//!     frequency_mhz: 5000
//!     channel_number: 36
//!     active_channels: 36
//!     primary_channel: 36
//! propagation:
//!   - model: log_distance
//!   - model: nakagami
//! delay:
//!   model: constant_speed
//! nodes:
//!   - name: ap
//!     role: ap
//!     position: { x: 0.0, y: 0.0 }
//!   - name: sta
//!     position: { x: 10.0, y: 0.0 }
//!     traffic:
//!       enabled: true
//!       destination: ap
//! ```
//!
//! Node properties (`phy/*`, `traffic/*`) are resolved in order: built-in
//! defaults, then `defaults` sections, then the node's own values.

pub mod properties;

pub use properties::{
    default_value, get_property_def, is_known_property, known_namespaces, properties_by_namespace,
    properties_by_scope, NodeScope, PropertyDef, PropertyDefault, PropertyScope, PropertySetError,
    ResolvedProperties, SimulationScope, UnresolvedProperties, ValueKind, ALL_PROPERTIES,
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use wifisim_agents::{AgentError, TrafficAgent, TrafficConfig, TrafficLink};
use wifisim_common::{
    derive_stream, EntityId, EntityRegistry, Event, EventId, EventPayload, MacAddress, NodeRole, Position, SimTime,
};
use wifisim_phy::{
    build_per_engine, MetricLabels, PerLookupTables, PhyConfig, PhyError, PhyLink, WifiChannel, WifiPhy,
};
use wifisim_propagation::{DelayModelConfig, LossModelConfig, PropagationChain, PropagationError};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Node not found.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Duplicate node name.
    #[error("Duplicate node name: {0}")]
    DuplicateNode(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A propagation model could not be built.
    #[error("Propagation model error: {0}")]
    Propagation(#[from] PropagationError),

    /// A node's PHY configuration is invalid.
    #[error("PHY configuration of node '{node}' is invalid: {source}")]
    Phy {
        /// Node name.
        node: String,
        /// Underlying error.
        #[source]
        source: PhyError,
    },

    /// A node's traffic configuration is invalid.
    #[error("Traffic configuration of node '{node}' is invalid: {source}")]
    Traffic {
        /// Node name.
        node: String,
        /// Underlying error.
        #[source]
        source: AgentError,
    },
}

// ============================================================================
// Public Model API
// ============================================================================

/// Default simulated duration.
pub const DEFAULT_DURATION_S: f64 = 10.0;

/// Scenario-wide settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Scenario seed.
    pub seed: u64,
    /// Simulated time to run, in seconds.
    pub duration_s: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            seed: 0,
            duration_s: DEFAULT_DURATION_S,
        }
    }
}

impl SimulationConfig {
    /// Duration as simulation time.
    pub fn duration(&self) -> SimTime {
        SimTime::from_secs(self.duration_s.max(0.0))
    }
}

/// A loaded and validated scenario.
#[derive(Debug, Clone)]
pub struct Model {
    simulation: SimulationConfig,
    propagation: Vec<LossModelConfig>,
    delay: DelayModelConfig,
    nodes: Vec<Node>,
}

impl Model {
    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Scenario-wide settings.
    pub fn simulation(&self) -> &SimulationConfig {
        &self.simulation
    }

    /// Loss models in chain order.
    pub fn propagation(&self) -> &[LossModelConfig] {
        &self.propagation
    }

    /// Delay model.
    pub fn delay(&self) -> &DelayModelConfig {
        &self.delay
    }

    /// Find a node by name.
    pub fn find_node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }
}

/// A node with its resolved configuration.
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique node name.
    pub name: String,
    /// Network role.
    pub role: NodeRole,
    /// Antenna position.
    pub position: Position,
    /// Resolved PHY configuration.
    pub phy: PhyConfig,
    /// Resolved traffic configuration.
    pub traffic: TrafficConfig,
    properties: ResolvedProperties<NodeScope>,
}

impl Node {
    /// Resolved properties this node was configured from.
    pub fn properties(&self) -> &ResolvedProperties<NodeScope> {
        &self.properties
    }
}

// ============================================================================
// YAML Schema Types (Internal)
// ============================================================================

/// Root scenario structure (YAML schema).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct SimulationModelYaml {
    /// Seed and duration.
    #[serde(default)]
    simulation: Option<UnresolvedProperties<SimulationScope>>,
    /// Node property defaults, keyed by namespace.
    #[serde(default)]
    defaults: UnresolvedProperties<NodeScope>,
    /// Loss chain; a later file replaces the whole chain.
    #[serde(default)]
    propagation: Option<Vec<LossModelConfig>>,
    /// Delay model.
    #[serde(default)]
    delay: Option<DelayModelConfig>,
    /// Node definitions.
    #[serde(default)]
    nodes: Vec<NodeConfigYaml>,
}

/// Position in meters; z defaults to 0.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
struct PositionYaml {
    x: f64,
    y: f64,
    #[serde(default)]
    z: f64,
}

/// Node configuration (YAML schema, internal).
#[derive(Debug, Clone, Deserialize)]
struct NodeConfigYaml {
    /// Node name (must be unique).
    name: String,

    /// When true, this node will be removed during model merging.
    #[serde(default)]
    remove: bool,

    #[serde(default)]
    role: Option<NodeRole>,

    #[serde(default)]
    position: Option<PositionYaml>,

    /// `phy` and `traffic` namespaces.
    #[serde(flatten)]
    properties: UnresolvedProperties<NodeScope>,
}

/// Node being merged across files.
struct PendingNode {
    name: String,
    role: NodeRole,
    position: Option<Position>,
    overrides: UnresolvedProperties<NodeScope>,
}

// ============================================================================
// Model Loading
// ============================================================================

/// Load a scenario from a file.
pub fn load_model(path: &Path) -> Result<Model, ModelError> {
    load_models(&[path])
}

/// Parse a scenario from a YAML string.
pub fn load_model_from_str(yaml_str: &str) -> Result<Model, ModelError> {
    load_models_from_str(&[yaml_str])
}

/// Load and merge multiple scenario files.
///
/// Relative `phy/lut_dir` values resolve against the directory of the last file.
pub fn load_models(paths: &[&Path]) -> Result<Model, ModelError> {
    if paths.is_empty() {
        return Err(ModelError::InvalidConfig("No scenario files provided".to_string()));
    }

    let yaml_strings = paths
        .iter()
        .map(std::fs::read_to_string)
        .collect::<Result<Vec<String>, std::io::Error>>()?;
    let yaml_strs: Vec<&str> = yaml_strings.iter().map(|s| s.as_str()).collect();

    let mut model = load_models_from_str(&yaml_strs)?;
    if let Some(base) = paths.last().and_then(|p| p.parent()) {
        for node in &mut model.nodes {
            if node.phy.lut_dir.is_relative() {
                node.phy.lut_dir = base.join(&node.phy.lut_dir);
            }
        }
    }
    Ok(model)
}

/// Load and merge multiple scenarios from YAML strings.
///
/// Later strings override earlier ones:
/// - Defaults from later strings override defaults from earlier strings
/// - Nodes with the same name merge, later values winning
/// - A later `propagation` or `delay` section replaces the earlier one
///
/// Validation (destinations, configuration values) is performed only on the
/// final merged scenario.
pub fn load_models_from_str(yaml_strs: &[&str]) -> Result<Model, ModelError> {
    if yaml_strs.is_empty() {
        return Err(ModelError::InvalidConfig("No scenario strings provided".to_string()));
    }

    let mut node_defaults: ResolvedProperties<NodeScope> = ResolvedProperties::new();
    let mut yamls = Vec::new();
    for yaml_str in yaml_strs {
        let yaml: SimulationModelYaml = serde_yaml::from_str(yaml_str)?;
        node_defaults.apply_unresolved(&yaml.defaults);
        yamls.push(yaml);
    }

    let mut simulation: ResolvedProperties<SimulationScope> = ResolvedProperties::new();
    let mut propagation = Vec::new();
    let mut delay = DelayModelConfig::default();
    let mut pending: Vec<PendingNode> = Vec::new();

    for yaml in yamls {
        for node in yaml.nodes {
            let existing = pending.iter().position(|p| p.name == node.name);
            match (node.remove, existing) {
                (true, Some(idx)) => {
                    pending.remove(idx);
                }
                (true, None) => return Err(ModelError::NodeNotFound(node.name)),
                (false, Some(idx)) => {
                    let entry = &mut pending[idx];
                    if let Some(role) = node.role {
                        entry.role = role;
                    }
                    if let Some(p) = node.position {
                        entry.position = Some(Position::new(p.x, p.y, p.z));
                    }
                    entry.overrides.merge(&node.properties);
                }
                (false, None) => pending.push(PendingNode {
                    name: node.name,
                    role: node.role.unwrap_or_default(),
                    position: node.position.map(|p| Position::new(p.x, p.y, p.z)),
                    overrides: node.properties,
                }),
            }
        }

        if let Some(chain) = yaml.propagation {
            propagation = chain;
        }
        if let Some(model) = yaml.delay {
            delay = model;
        }
        if let Some(sim_props) = yaml.simulation {
            simulation.apply_unresolved(&sim_props);
        }
    }

    let simulation: SimulationConfig =
        serde_yaml::from_value(Value::Mapping(simulation.section("simulation")))?;

    let mut nodes = Vec::with_capacity(pending.len());
    for node in pending {
        let position = node
            .position
            .ok_or_else(|| ModelError::InvalidConfig(format!("node '{}' has no position", node.name)))?;
        let mut properties = node_defaults.clone();
        properties.apply_unresolved(&node.overrides);
        let phy: PhyConfig = serde_yaml::from_value(Value::Mapping(properties.section("phy")))?;
        let traffic: TrafficConfig = serde_yaml::from_value(Value::Mapping(properties.section("traffic")))?;
        nodes.push(Node {
            name: node.name,
            role: node.role,
            position,
            phy,
            traffic,
            properties,
        });
    }

    let model = Model {
        simulation,
        propagation,
        delay,
        nodes,
    };
    validate_model(&model)?;
    Ok(model)
}

/// Check cross-node references and per-node settings.
fn validate_model(model: &Model) -> Result<(), ModelError> {
    if model.nodes.is_empty() {
        return Err(ModelError::InvalidConfig("scenario defines no nodes".to_string()));
    }

    let first_model = model.nodes[0].phy.use_new_model;
    for node in &model.nodes {
        if node.phy.use_new_model != first_model {
            return Err(ModelError::InvalidConfig(format!(
                "node '{}' disagrees on phy/use_new_model; the channel medium is shared",
                node.name
            )));
        }
        node.traffic.tx_vector().map_err(|source| ModelError::Traffic {
            node: node.name.clone(),
            source,
        })?;
        if let Some(dest) = &node.traffic.destination {
            if model.node_index(dest).is_none() {
                return Err(ModelError::NodeNotFound(dest.clone()));
            }
            if dest == &node.name {
                return Err(ModelError::InvalidConfig(format!("node '{}' sends to itself", node.name)));
            }
        }
    }
    Ok(())
}

// ============================================================================
// Model Building
// ============================================================================

/// Entity id of the shared channel medium.
pub const CHANNEL_ENTITY_ID: u64 = 1;

/// Information about a node for display purposes.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// Node name from the scenario.
    pub name: String,
    /// Network role.
    pub role: NodeRole,
    /// Antenna position.
    pub position: Position,
    /// MAC address.
    pub address: MacAddress,
    /// Entity ID of the PHY.
    pub phy_entity_id: u64,
    /// Entity ID of the traffic agent.
    pub agent_entity_id: u64,
}

/// Result of building a simulation from a scenario.
pub struct BuiltSimulation {
    /// Entity registry with all entities.
    pub entities: EntityRegistry,
    /// Entity ID of the channel medium.
    pub channel_entity_id: u64,
    /// Initial events to seed the simulation.
    pub initial_events: Vec<Event>,
    /// Information about each node for display.
    pub node_infos: Vec<NodeInfo>,
}

/// Build a simulation from a scenario.
///
/// Entity ids: the channel is [`CHANNEL_ENTITY_ID`], node `i` gets PHY
/// `2 + 2i` and agent `3 + 2i`. Every PHY, agent and random model draws from
/// its own stream derived from `seed`.
pub fn build_simulation(model: &Model, seed: u64) -> Result<BuiltSimulation, ModelError> {
    let channel_id = EntityId(CHANNEL_ENTITY_ID);
    let phy_id = |idx: usize| EntityId(2 + 2 * idx as u64);
    let agent_id = |idx: usize| EntityId(3 + 2 * idx as u64);

    let mut entities = EntityRegistry::new();
    let mut initial_events = Vec::new();
    let mut node_infos = Vec::with_capacity(model.nodes.len());

    // Propagation chain; each model gets its own stream
    let mut channel_rng = derive_stream(seed, channel_id);
    let resolve = |name: &str| model.node_index(name).map(phy_id);
    let mut chain = PropagationChain::new();
    for config in &model.propagation {
        let rng = ChaCha8Rng::seed_from_u64(channel_rng.gen());
        chain = chain.with(config.build(rng, resolve)?);
    }
    let delay = model.delay.build(ChaCha8Rng::seed_from_u64(channel_rng.gen()))?;
    let use_new_model = model.nodes.first().map_or(true, |n| n.phy.use_new_model);
    let mut channel = WifiChannel::new(channel_id, Box::new(chain), delay, use_new_model);

    // PER tables are shared between PHYs reading the same directory
    let mut tables: HashMap<PathBuf, Arc<PerLookupTables>> = HashMap::new();

    for (idx, node) in model.nodes.iter().enumerate() {
        let address = MacAddress::from_index(idx as u32);
        let labels = MetricLabels::new(node.name.clone(), node.role);

        let lut = tables
            .entry(node.phy.lut_dir.clone())
            .or_insert_with(|| Arc::new(PerLookupTables::new(node.phy.lut_dir.clone())));
        let engine = build_per_engine(&node.phy, lut);
        let link = PhyLink {
            channel: channel_id,
            agent: agent_id(idx),
            address,
            position: node.position,
            role: node.role,
        };
        let phy = WifiPhy::new(
            phy_id(idx),
            node.phy.clone(),
            link,
            engine,
            derive_stream(seed, phy_id(idx)),
            labels.clone(),
        )
        .map_err(|source| ModelError::Phy {
            node: node.name.clone(),
            source,
        })?;
        channel
            .update_endpoint(&phy.endpoint_update())
            .map_err(|source| ModelError::Phy {
                node: node.name.clone(),
                source,
            })?;
        debug!(node = %node.name, phy = %phy_id(idx), bonding = ?phy.bonding().channels(), "PHY created");
        entities.register(Box::new(phy));

        let destination = match &node.traffic.destination {
            Some(dest) => model
                .node_index(dest)
                .map(|i| MacAddress::from_index(i as u32))
                .ok_or_else(|| ModelError::NodeNotFound(dest.clone()))?,
            None => MacAddress::BROADCAST,
        };
        let agent = TrafficAgent::new(
            agent_id(idx),
            node.name.clone(),
            node.traffic.clone(),
            TrafficLink {
                phy: phy_id(idx),
                address,
                destination,
            },
            derive_stream(seed, agent_id(idx)),
            labels,
        )
        .map_err(|source| ModelError::Traffic {
            node: node.name.clone(),
            source,
        })?;
        entities.register(Box::new(agent));

        initial_events.push(Event {
            id: EventId(initial_events.len() as u64),
            time: SimTime::ZERO,
            source: agent_id(idx),
            targets: vec![agent_id(idx)],
            payload: EventPayload::Timer { timer_id: 0 },
        });

        node_infos.push(NodeInfo {
            name: node.name.clone(),
            role: node.role,
            position: node.position,
            address,
            phy_entity_id: phy_id(idx).0,
            agent_entity_id: agent_id(idx).0,
        });
    }

    info!(
        nodes = node_infos.len(),
        loss_models = model.propagation.len(),
        use_new_model,
        "simulation built"
    );
    entities.register(Box::new(channel));

    Ok(BuiltSimulation {
        entities,
        channel_entity_id: CHANNEL_ENTITY_ID,
        initial_events,
        node_infos,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wifisim_common::WifiPreamble;

    const TWO_NODES: &str = r#"
simulation:
  seed: 7
  duration_s: 0.5
defaults:
  phy:
    use_lut_for_per: false
propagation:
  - model: log_distance
delay:
  model: constant_speed
nodes:
  - name: ap
    role: ap
    position: { x: 0.0, y: 0.0 }
  - name: sta
    position: { x: 10.0, y: 0.0, z: 1.5 }
    phy:
      tx_power_start_dbm: 20.0
      tx_power_end_dbm: 20.0
    traffic:
      enabled: true
      destination: ap
      interval_s: 0.001
"#;

    #[test]
    fn test_load_two_nodes() {
        let model = load_model_from_str(TWO_NODES).unwrap();
        assert_eq!(model.simulation(), &SimulationConfig { seed: 7, duration_s: 0.5 });
        assert_eq!(model.nodes().len(), 2);
        assert_eq!(model.propagation().len(), 1);

        let ap = model.find_node("ap").unwrap();
        assert_eq!(ap.role, NodeRole::Ap);
        assert!(!ap.phy.use_lut_for_per, "defaults apply to every node");
        assert!(!ap.traffic.enabled);

        let sta = model.find_node("sta").unwrap();
        assert_eq!(sta.role, NodeRole::Sta, "role defaults to station");
        assert_eq!(sta.position, Position::new(10.0, 0.0, 1.5));
        assert_eq!(sta.phy.tx_power_start_dbm, 20.0);
        assert_eq!(sta.phy.ed_threshold_dbm, PhyConfig::DEFAULT_ED_THRESHOLD_DBM);
        assert_eq!(sta.traffic.destination.as_deref(), Some("ap"));
        assert_eq!(sta.traffic.preamble, WifiPreamble::Long);
        assert_eq!(sta.properties().get(&properties::TRAFFIC_INTERVAL_S), Value::from(0.001));
    }

    #[test]
    fn test_overlay_merges_and_removes() {
        let overlay = r#"
defaults:
  phy:
    frequency_mhz: 5000
    channel_number: 36
    active_channels: 36
    primary_channel: 36
nodes:
  - name: sta
    traffic:
      frame_size: 200
  - name: ap
    remove: true
  - name: sta2
    position: { x: 5.0, y: 5.0 }
"#;
        let base = TWO_NODES.replace("destination: ap", "destination: sta2");
        let model = load_models_from_str(&[&base, overlay]).unwrap();
        let names: Vec<_> = model.nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["sta", "sta2"]);

        let sta = model.find_node("sta").unwrap();
        assert_eq!(sta.phy.frequency_mhz, 5000, "later defaults apply to earlier nodes");
        assert_eq!(sta.traffic.frame_size, 200);
        assert!(sta.traffic.enabled, "earlier node values survive the overlay");
        assert_eq!(sta.traffic.interval_s, 0.001);
    }

    #[test]
    fn test_removing_unknown_node_fails() {
        let overlay = "nodes:\n  - name: ghost\n    remove: true\n";
        assert!(matches!(
            load_models_from_str(&[TWO_NODES, overlay]),
            Err(ModelError::NodeNotFound(name)) if name == "ghost"
        ));
    }

    #[test]
    fn test_rejects_unknown_property() {
        let yaml = TWO_NODES.replace("tx_power_end_dbm: 20.0", "tx_power_max_dbm: 20.0");
        let err = load_model_from_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("phy/tx_power_max_dbm"), "{}", err);
    }

    #[test]
    fn test_rejects_unknown_destination() {
        let yaml = TWO_NODES.replace("destination: ap", "destination: nowhere");
        assert!(matches!(load_model_from_str(&yaml), Err(ModelError::NodeNotFound(n)) if n == "nowhere"));
    }

    #[test]
    fn test_rejects_bad_traffic_mode() {
        let yaml = TWO_NODES.replace("interval_s: 0.001", "mode: HtMcs9BW20MHz");
        assert!(matches!(load_model_from_str(&yaml), Err(ModelError::Traffic { node, .. }) if node == "sta"));
    }

    #[test]
    fn test_rejects_missing_position() {
        let yaml = "nodes:\n  - name: lonely\n";
        assert!(matches!(load_model_from_str(yaml), Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_mixed_channel_models() {
        let yaml = TWO_NODES.replace("tx_power_end_dbm: 20.0", "tx_power_end_dbm: 20.0\n      use_new_model: false");
        assert!(matches!(load_model_from_str(&yaml), Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn test_lut_dir_relative_to_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.yaml");
        std::fs::write(&path, TWO_NODES).unwrap();
        let model = load_model(&path).unwrap();
        assert_eq!(model.nodes()[0].phy.lut_dir, dir.path().join("per_tables"));
    }

    #[test]
    fn test_build_simulation() {
        let model = load_model_from_str(TWO_NODES).unwrap();
        let built = build_simulation(&model, 7).unwrap();
        assert_eq!(built.entities.len(), 5, "channel plus a PHY and an agent per node");
        assert_eq!(built.initial_events.len(), 2);
        assert_eq!(built.node_infos[1].phy_entity_id, 4);
        assert_eq!(built.node_infos[1].agent_entity_id, 5);
        assert_eq!(built.node_infos[0].address, MacAddress::from_index(0));

        let channel = built
            .entities
            .get_as::<WifiChannel>(EntityId(built.channel_entity_id))
            .unwrap();
        assert_eq!(channel.num_endpoints(), 2, "PHYs are registered with the channel");

        let agent = built.entities.get_as::<TrafficAgent>(EntityId(5)).unwrap();
        assert_eq!(agent.phy(), EntityId(4));
    }

    #[test]
    fn test_build_rejects_bad_channel() {
        let yaml = TWO_NODES.replace("tx_power_end_dbm: 20.0", "tx_power_end_dbm: 20.0\n      primary_channel: 9");
        let model = load_model_from_str(&yaml).unwrap();
        assert!(matches!(build_simulation(&model, 1), Err(ModelError::Phy { node, .. }) if node == "sta"));
    }
}
