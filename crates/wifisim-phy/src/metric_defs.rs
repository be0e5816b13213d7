//! Metric names and descriptions.
//!
//! Every metric carries the `node` and `node_role` labels; drop counters
//! add a `reason` label.

use std::fmt;
use wifisim_common::NodeRole;

/// Kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonic counter.
    Counter,
    /// Distribution of samples.
    Histogram,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Histogram => write!(f, "histogram"),
        }
    }
}

/// Static description of a metric.
#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    /// Metric name.
    pub name: &'static str,
    /// Metric kind.
    pub kind: MetricKind,
    /// Unit, empty when dimensionless.
    pub unit: &'static str,
    /// Human readable description.
    pub description: &'static str,
    /// Labels beyond `node` and `node_role`.
    pub labels: &'static [&'static str],
}

impl MetricDef {
    /// Unit string for display.
    pub fn unit_str(&self) -> &'static str {
        self.unit
    }
}

/// Frames put on the air.
pub const PHY_TX_FRAMES: MetricDef = MetricDef {
    name: "wifisim.phy.tx_frames",
    kind: MetricKind::Counter,
    unit: "",
    description: "Frames transmitted",
    labels: &[],
};

/// Air time spent transmitting.
pub const PHY_TX_AIRTIME: MetricDef = MetricDef {
    name: "wifisim.phy.tx_airtime_us",
    kind: MetricKind::Counter,
    unit: "us",
    description: "Total transmit air time",
    labels: &[],
};

/// Frames decoded.
pub const PHY_RX_OK: MetricDef = MetricDef {
    name: "wifisim.phy.rx_ok",
    kind: MetricKind::Counter,
    unit: "",
    description: "Frames received without error",
    labels: &[],
};

/// Frames that failed the PER draw.
pub const PHY_RX_ERROR: MetricDef = MetricDef {
    name: "wifisim.phy.rx_error",
    kind: MetricKind::Counter,
    unit: "",
    description: "Frames received with errors",
    labels: &[],
};

/// Frames never received.
pub const PHY_RX_DROP: MetricDef = MetricDef {
    name: "wifisim.phy.rx_drop",
    kind: MetricKind::Counter,
    unit: "",
    description: "Arrivals dropped before or during reception",
    labels: &["reason"],
};

/// SNR at the start of each completed reception.
pub const PHY_RX_SNR: MetricDef = MetricDef {
    name: "wifisim.phy.rx_snr_db",
    kind: MetricKind::Histogram,
    unit: "dB",
    description: "SNR of completed receptions",
    labels: &[],
};

/// PER of each completed reception.
pub const PHY_RX_PER: MetricDef = MetricDef {
    name: "wifisim.phy.rx_per",
    kind: MetricKind::Histogram,
    unit: "",
    description: "Packet error rate of completed receptions",
    labels: &[],
};

/// Time reported as CCA busy.
pub const PHY_CCA_BUSY: MetricDef = MetricDef {
    name: "wifisim.phy.cca_busy_us",
    kind: MetricKind::Counter,
    unit: "us",
    description: "CCA busy time announced to the MAC",
    labels: &[],
};

/// Arrivals scheduled by the channel.
pub const CHANNEL_DELIVERIES: MetricDef = MetricDef {
    name: "wifisim.channel.deliveries",
    kind: MetricKind::Counter,
    unit: "",
    description: "Signal arrivals scheduled at receivers",
    labels: &[],
};

/// Receivers that could not see a transmission.
pub const CHANNEL_SUPPRESSED: MetricDef = MetricDef {
    name: "wifisim.channel.suppressed",
    kind: MetricKind::Counter,
    unit: "",
    description: "Receivers skipped for lack of channel overlap",
    labels: &[],
};

/// Frames requested by traffic agents.
pub const AGENT_FRAMES_SENT: MetricDef = MetricDef {
    name: "wifisim.agent.frames_sent",
    kind: MetricKind::Counter,
    unit: "",
    description: "Frames handed to the PHY by the traffic agent",
    labels: &[],
};

/// A-MPDU bursts started by traffic agents.
pub const AGENT_BURSTS_SENT: MetricDef = MetricDef {
    name: "wifisim.agent.bursts_sent",
    kind: MetricKind::Counter,
    unit: "",
    description: "A-MPDU bursts started by the traffic agent",
    labels: &[],
};

/// Frames delivered to traffic agents.
pub const AGENT_FRAMES_RECEIVED: MetricDef = MetricDef {
    name: "wifisim.agent.frames_received",
    kind: MetricKind::Counter,
    unit: "",
    description: "Frames decoded and addressed to the agent's node",
    labels: &[],
};

/// Every metric, in display order.
pub const ALL: &[MetricDef] = &[
    PHY_TX_FRAMES,
    PHY_TX_AIRTIME,
    PHY_RX_OK,
    PHY_RX_ERROR,
    PHY_RX_DROP,
    PHY_RX_SNR,
    PHY_RX_PER,
    PHY_CCA_BUSY,
    CHANNEL_DELIVERIES,
    CHANNEL_SUPPRESSED,
    AGENT_FRAMES_SENT,
    AGENT_BURSTS_SENT,
    AGENT_FRAMES_RECEIVED,
];

/// Labels attached to every metric emitted by one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLabels {
    node: String,
    node_role: String,
}

impl MetricLabels {
    /// Labels for a node.
    pub fn new(node: impl Into<String>, role: NodeRole) -> Self {
        MetricLabels {
            node: node.into(),
            node_role: role.as_label().to_string(),
        }
    }

    /// Labels for an entity that is not a node.
    pub fn entity(name: impl Into<String>, kind: &str) -> Self {
        MetricLabels {
            node: name.into(),
            node_role: kind.to_string(),
        }
    }

    /// Node name.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Label pairs for the `metrics` macros.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("node", self.node.clone()), ("node_role", self.node_role.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_unique_and_prefixed() {
        let mut names: Vec<_> = ALL.iter().map(|m| m.name).collect();
        assert!(names.iter().all(|n| n.starts_with("wifisim.")));
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL.len(), "metric names must be unique");
    }

    #[test]
    fn test_labels() {
        let labels = MetricLabels::new("ap0", NodeRole::Ap).to_labels();
        assert_eq!(labels, vec![("node", "ap0".to_string()), ("node_role", "ap".to_string())]);
    }
}
