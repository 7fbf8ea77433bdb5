//! Semantic codes shared with the front-end and the error-reporting layer.

use crate::value::AttrValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of entity categories a network description can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityCategory {
    Block,
    Layer,
    Input,
    Output,
    MemoryBuffer,
    Predictor,
    Comparator,
    NoveltyModule,
    IntrinsicReward,
    PolicyHead,
    PlasticityRuleDef,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 11] = [
        EntityCategory::Block,
        EntityCategory::Layer,
        EntityCategory::Input,
        EntityCategory::Output,
        EntityCategory::MemoryBuffer,
        EntityCategory::Predictor,
        EntityCategory::Comparator,
        EntityCategory::NoveltyModule,
        EntityCategory::IntrinsicReward,
        EntityCategory::PolicyHead,
        EntityCategory::PlasticityRuleDef,
    ];

    /// Two-digit component code used in compact diagnostic identifiers.
    pub fn code(self) -> &'static str {
        match self {
            EntityCategory::Block => "01",
            EntityCategory::Layer => "02",
            EntityCategory::Input => "03",
            EntityCategory::Output => "04",
            EntityCategory::MemoryBuffer => "05",
            EntityCategory::Predictor => "06",
            EntityCategory::Comparator => "07",
            EntityCategory::NoveltyModule => "08",
            EntityCategory::IntrinsicReward => "09",
            EntityCategory::PolicyHead => "10",
            EntityCategory::PlasticityRuleDef => "11",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EntityCategory::Block => "Block",
            EntityCategory::Layer => "Layer",
            EntityCategory::Input => "Input",
            EntityCategory::Output => "Output",
            EntityCategory::MemoryBuffer => "MemoryBuffer",
            EntityCategory::Predictor => "Predictor",
            EntityCategory::Comparator => "Comparator",
            EntityCategory::NoveltyModule => "NoveltyModule",
            EntityCategory::IntrinsicReward => "IntrinsicReward",
            EntityCategory::PolicyHead => "PolicyHead",
            EntityCategory::PlasticityRuleDef => "PlasticityRuleDef",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Records that link entities together without being entities themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkKind {
    SignalRoute,
    RecurrentConnection,
    ShapeConditional,
}

impl LinkKind {
    pub const ALL: [LinkKind; 3] = [
        LinkKind::SignalRoute,
        LinkKind::RecurrentConnection,
        LinkKind::ShapeConditional,
    ];

    pub fn code(self) -> &'static str {
        match self {
            LinkKind::SignalRoute => "R1",
            LinkKind::RecurrentConnection => "R2",
            LinkKind::ShapeConditional => "R3",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LinkKind::SignalRoute => "SignalRoute",
            LinkKind::RecurrentConnection => "RecurrentConnection",
            LinkKind::ShapeConditional => "ShapeConditional",
        }
    }
}

/// Which axis of a producer's shape feeds an inferred parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DimKind {
    /// Trailing feature axis (`in_features`, `input_size`).
    Features,
    /// Leading channel axis (`in_channels`, `num_features`).
    Channels,
}

/// Concrete refinements of the Layer category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Linear,
    Conv1d,
    Conv2d,
    Conv3d,
    Lstm,
    BatchNorm1d,
    GroupNorm,
}

impl LayerType {
    pub const ALL: [LayerType; 7] = [
        LayerType::Linear,
        LayerType::Conv1d,
        LayerType::Conv2d,
        LayerType::Conv3d,
        LayerType::Lstm,
        LayerType::BatchNorm1d,
        LayerType::GroupNorm,
    ];

    pub const SYMBOLS: &'static [&'static str] =
        &["linear", "conv1d", "conv2d", "conv3d", "lstm", "batchnorm1d", "groupnorm"];

    pub fn code(self) -> i64 {
        match self {
            LayerType::Linear => 1,
            LayerType::Conv1d => 2,
            LayerType::Conv2d => 3,
            LayerType::Conv3d => 4,
            LayerType::Lstm => 5,
            LayerType::BatchNorm1d => 6,
            LayerType::GroupNorm => 7,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            LayerType::Linear => "linear",
            LayerType::Conv1d => "conv1d",
            LayerType::Conv2d => "conv2d",
            LayerType::Conv3d => "conv3d",
            LayerType::Lstm => "lstm",
            LayerType::BatchNorm1d => "batchnorm1d",
            LayerType::GroupNorm => "groupnorm",
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.symbol().eq_ignore_ascii_case(symbol))
    }

    /// Accepts either the integer code or the symbolic name. Strings holding a
    /// numeric code (`"3"`) are accepted as well.
    pub fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Int(code) => Self::from_code(*code),
            AttrValue::Str(s) => match s.trim().parse::<i64>() {
                Ok(code) => Self::from_code(code),
                Err(_) => Self::from_symbol(s.trim()),
            },
            _ => None,
        }
    }

    /// The parameter holding the dimension this layer produces, if it declares one.
    /// Normalization layers pass their input dimension through.
    pub fn output_param(self) -> Option<&'static str> {
        match self {
            LayerType::Linear => Some(params::OUT_FEATURES),
            LayerType::Conv1d | LayerType::Conv2d | LayerType::Conv3d => Some(params::OUT_CHANNELS),
            LayerType::Lstm => Some(params::HIDDEN_SIZE),
            LayerType::BatchNorm1d | LayerType::GroupNorm => None,
        }
    }

    /// The parameter that receives the inferred input dimension.
    pub fn input_param(self) -> &'static str {
        match self {
            LayerType::Linear => params::IN_FEATURES,
            LayerType::Conv1d | LayerType::Conv2d | LayerType::Conv3d => params::IN_CHANNELS,
            LayerType::Lstm => params::INPUT_SIZE,
            LayerType::BatchNorm1d | LayerType::GroupNorm => params::NUM_FEATURES,
        }
    }

    pub fn input_dim_kind(self) -> DimKind {
        match self {
            LayerType::Linear | LayerType::Lstm => DimKind::Features,
            _ => DimKind::Channels,
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.symbol()) }
}

/// Parameter names nested under a layer's `params` map.
pub mod params {
    pub const IN_FEATURES: &str = "in_features";
    pub const OUT_FEATURES: &str = "out_features";
    pub const IN_CHANNELS: &str = "in_channels";
    pub const OUT_CHANNELS: &str = "out_channels";
    pub const KERNEL_SIZE: &str = "kernel_size";
    pub const STRIDE: &str = "stride";
    pub const PADDING: &str = "padding";
    pub const DILATION: &str = "dilation";
    pub const GROUPS: &str = "groups";
    pub const HIDDEN_SIZE: &str = "hidden_size";
    pub const NUM_LAYERS: &str = "num_layers";
    pub const DROPOUT: &str = "dropout";
    pub const INPUT_SIZE: &str = "input_size";
    pub const NUM_FEATURES: &str = "num_features";
    pub const NUM_GROUPS: &str = "num_groups";
    pub const EPS: &str = "eps";
    pub const MOMENTUM: &str = "momentum";
}

/// Capability flags a layer or block may request.
pub mod flags {
    pub const FREEZE: &str = "freeze";
    pub const BIAS: &str = "bias";
    pub const BATCH_FIRST: &str = "batch_first";
    pub const BIDIRECTIONAL: &str = "bidirectional";
    pub const AFFINE: &str = "affine";
    pub const TRACK_RUNNING_STATS: &str = "track_running_stats";
}

pub const ACT_IDENTITY: i64 = 0;
pub const BLOCK_SEQUENTIAL: i64 = 0;
pub const MEM_FIFO: i64 = 0;
pub const PRED_MODEL_LINEAR: i64 = 0;
pub const METRIC_MSE: i64 = 0;
pub const NOVELTY_PRED_ERROR_BASED: i64 = 0;

/// `IntrinsicReward.source_type` values and the category each one points at.
pub fn reward_source_category(source_type: i64) -> Option<EntityCategory> {
    match source_type {
        0 => Some(EntityCategory::Comparator),
        1 => Some(EntityCategory::NoveltyModule),
        2 => Some(EntityCategory::Predictor),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AttrValue::Int(1), Some(LayerType::Linear))]
    #[case(AttrValue::Str("conv2d".into()), Some(LayerType::Conv2d))]
    #[case(AttrValue::Str("LSTM".into()), Some(LayerType::Lstm))]
    #[case(AttrValue::Str("7".into()), Some(LayerType::GroupNorm))]
    #[case(AttrValue::Int(99), None)]
    #[case(AttrValue::Bool(true), None)]
    fn test_layer_type_from_attr(#[case] raw: AttrValue, #[case] expected: Option<LayerType>) {
        assert_eq!(LayerType::from_attr(&raw), expected);
    }

    #[test]
    fn test_category_codes_round_trip() {
        for c in EntityCategory::ALL {
            assert_eq!(EntityCategory::from_code(c.code()), Some(c));
        }
        assert_eq!(EntityCategory::from_name("memorybuffer"), Some(EntityCategory::MemoryBuffer));
    }

    #[test]
    fn test_symbols_match_layer_types() {
        let symbols: Vec<_> = LayerType::ALL.iter().map(|t| t.symbol()).collect();
        assert_eq!(symbols, LayerType::SYMBOLS);
    }
}
