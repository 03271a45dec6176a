// Coherent interconnect (CMN "booker-ci") node event descriptors
//
// perf_event config layout of the arm-cmn PMU:
//   nodetype  [15:0]
//   eventid   [23:16]
//   bynodeid  [31]
//   nodeid    [47:32]

use perfscope_raw::register::{field, place};
use perfscope_raw::ConfigLayout;

use crate::enum_with_data;

enum_with_data! {
    pub enum NodeType: u16 {
        Invalid => ("INVALID", 0x0),
        Dvm => ("DVM", 0x1),
        Cfg => ("CFG", 0x2),
        Dtc => ("DTC", 0x3),
        Hni => ("HNI", 0x4),
        Hnf => ("HNF", 0x5),
        Xp => ("XP", 0x6),
        Sbsx => ("SBSX", 0x7),
        MpamS => ("MPAM_S", 0x8),
        MpamNs => ("MPAM_NS", 0x9),
        Rni => ("RNI", 0xA),
        Rnd => ("RND", 0xD),
        Rnsam => ("RNSAM", 0xF),
        Mtsx => ("MTSX", 0x10),
        Cxra => ("CXRA", 0x100),
        Cxha => ("CXHA", 0x101),
        Cxla => ("CXLA", 0x102),
    }
    impl code -> u16
}

impl NodeType {
    /// Map a configured node type name; unknown names become `Invalid`.
    pub fn resolve(name: &str) -> NodeType {
        NodeType::from_name(name).unwrap_or(NodeType::Invalid)
    }
}

const NODE_TYPE_SHIFT: u32 = 0;
const NODE_TYPE_WIDTH: u32 = 16;
const EVENT_ID_SHIFT: u32 = 16;
const EVENT_ID_WIDTH: u32 = 8;
const BY_NODE_ID_SHIFT: u32 = 31;
const NODE_ID_SHIFT: u32 = 32;
const NODE_ID_WIDTH: u32 = 16;

/// Structured form of an interconnect event config word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CmnEventConfig {
    pub node_type: u16,
    pub event_id: u8,
    pub by_node_id: bool,
    pub node_id: u16,
}

impl CmnEventConfig {
    /// Descriptor for `event_id` on `node_type`, addressed to one node when
    /// `node_id` is given.
    ///
    /// Oversized event and node ids are truncated to their bitfields.
    pub fn new(node_type: NodeType, event_id: u64, node_id: Option<u64>) -> Self {
        Self {
            node_type: node_type.code(),
            event_id: field(event_id, 0, EVENT_ID_WIDTH) as u8,
            by_node_id: node_id.is_some(),
            node_id: field(node_id.unwrap_or(0), 0, NODE_ID_WIDTH) as u16,
        }
    }
}

impl ConfigLayout for CmnEventConfig {
    fn to_config(&self) -> u64 {
        place(self.node_type as u64, NODE_TYPE_SHIFT, NODE_TYPE_WIDTH)
            | place(self.event_id as u64, EVENT_ID_SHIFT, EVENT_ID_WIDTH)
            | place(self.by_node_id as u64, BY_NODE_ID_SHIFT, 1)
            | place(self.node_id as u64, NODE_ID_SHIFT, NODE_ID_WIDTH)
    }

    fn from_config(value: u64) -> Self {
        Self {
            node_type: field(value, NODE_TYPE_SHIFT, NODE_TYPE_WIDTH) as u16,
            event_id: field(value, EVENT_ID_SHIFT, EVENT_ID_WIDTH) as u8,
            by_node_id: field(value, BY_NODE_ID_SHIFT, 1) != 0,
            node_id: field(value, NODE_ID_SHIFT, NODE_ID_WIDTH) as u16,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.node_type == NodeType::Invalid.code() {
            return Err("invalid interconnect node type");
        }
        if !self.by_node_id && self.node_id != 0 {
            return Err("node id given without bynodeid");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_without_node_id() {
        let config = CmnEventConfig::new(NodeType::Hnf, 0x42, None).to_config();
        assert_eq!(config, 0x0042_0005);
    }

    #[test]
    fn test_pack_with_node_id() {
        let config = CmnEventConfig::new(NodeType::Xp, 0x01, Some(0x68)).to_config();
        assert_eq!(config, 0x0000_0068_8001_0006);
    }

    #[test]
    fn test_pack_leaves_other_bits_zero() {
        let config = CmnEventConfig::new(NodeType::Cxla, u64::MAX, Some(u64::MAX)).to_config();
        let used = 0x0000_FFFF_80FF_FFFFu64;
        assert_eq!(config & !used, 0);
        assert_eq!(config, 0x0000_FFFF_80FF_0102);
    }

    #[test]
    fn test_unknown_node_type_is_invalid() {
        assert_eq!(NodeType::resolve("HNF"), NodeType::Hnf);
        assert_eq!(NodeType::resolve("BOGUS"), NodeType::Invalid);
        let layout = CmnEventConfig::new(NodeType::resolve(" "), 3, None);
        assert_eq!(layout.to_config(), 0x0003_0000);
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_layout_round_trips_raw_word() {
        let layout = CmnEventConfig {
            node_type: NodeType::Rnd.code(),
            event_id: 0x13,
            by_node_id: true,
            node_id: 9,
        };
        assert_eq!(CmnEventConfig::new(NodeType::Rnd, 0x13, Some(9)), layout);
        assert_eq!(CmnEventConfig::from_config(layout.to_config()), layout);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_layout_validation() {
        let invalid = CmnEventConfig::default();
        assert!(invalid.validate().is_err());

        let stray_node = CmnEventConfig {
            node_type: NodeType::Hni.code(),
            node_id: 4,
            ..Default::default()
        };
        assert!(stray_node.validate().is_err());
    }
}
