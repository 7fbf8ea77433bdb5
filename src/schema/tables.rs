//! The built-in schema tables: one base table per entity category, the
//! layer-type override tables, and the link record tables.

use super::codes::{self, flags, params, EntityCategory, LayerType, LinkKind};
use super::types::{BaseTable, FieldOverride, FieldSpec, FieldType, OverrideTable};
use crate::value::AttrValue;
use std::collections::{BTreeMap, BTreeSet};

const PADDING_SYMBOLS: &[&str] = &["same", "valid"];

fn table(fields: Vec<(&'static str, FieldSpec)>, allowed_flags: &[&'static str]) -> BaseTable {
    BaseTable {
        fields: fields.into_iter().collect(),
        allowed_flags: allowed_flags.iter().copied().collect(),
    }
}

fn empty_map() -> AttrValue { AttrValue::Map(BTreeMap::new()) }

fn empty_list() -> AttrValue { AttrValue::List(Vec::new()) }

fn opt_map() -> FieldSpec { FieldSpec::with_default(FieldType::OptMap, AttrValue::Null) }

fn opt_float() -> FieldSpec { FieldSpec::with_default(FieldType::OptFloat, AttrValue::Null) }

fn base_layer() -> BaseTable {
    table(
        vec![
            ("layer_idx", FieldSpec::required(FieldType::Int)),
            ("type", FieldSpec::required(FieldType::OneOf(LayerType::SYMBOLS))),
            ("params", FieldSpec::with_default(FieldType::Map, empty_map())),
            ("skip_connections", FieldSpec::with_default(FieldType::Seq, empty_list())),
            ("activation", FieldSpec::with_default(FieldType::Int, codes::ACT_IDENTITY)),
            ("dropout", opt_float().range(0.0, 1.0)),
            ("flags", FieldSpec::with_default(FieldType::UniqueSet, empty_list())),
            ("bias", FieldSpec::with_default(FieldType::Bool, true)),
            ("weight_init", opt_map()),
            ("bias_init", opt_map()),
            ("shape_constraints", opt_map()),
            ("shape_references", opt_map()),
            ("shape_adapter", opt_map()),
            ("reshape", opt_map()),
            ("shared_weights", opt_map()),
            ("weight_scale", opt_float()),
            ("sparsity", opt_float().range(0.0, 1.0)),
            ("plasticity_rules", FieldSpec::with_default(FieldType::OptSeq, AttrValue::Null)),
            ("plasticity_rate", opt_float()),
            ("conv_params", opt_map()),
            ("lstm_params", opt_map()),
            ("batchnorm_params", opt_map()),
            ("maxpool_params", opt_map()),
            ("attention", opt_map()),
            ("dynamic_routing", opt_map()),
            ("temporal_aggregation", opt_map()),
            ("stateful", opt_map()),
            ("recurrent_cell", opt_map()),
            ("initial_state", opt_map()),
            ("shape_checks", opt_map()),
            ("raw_slices", opt_map()),
        ],
        &[],
    )
}

/// Base tables for every entity category.
pub fn base_tables() -> BTreeMap<EntityCategory, BaseTable> {
    let mut tables = BTreeMap::new();

    tables.insert(
        EntityCategory::Block,
        table(
            vec![
                ("type", FieldSpec::with_default(FieldType::Int, codes::BLOCK_SEQUENTIAL)),
                ("connections", FieldSpec::with_default(FieldType::Seq, empty_list())),
                ("attributes", FieldSpec::with_default(FieldType::Map, empty_map())),
                ("flags", FieldSpec::with_default(FieldType::UniqueSet, empty_list())),
                ("subblocks", FieldSpec::with_default(FieldType::Seq, empty_list())),
                ("default_params", FieldSpec::with_default(FieldType::Map, empty_map())),
                ("shape_info", opt_map()),
                ("sequence_params", opt_map()),
            ],
            &[flags::FREEZE],
        ),
    );
    tables.insert(EntityCategory::Layer, base_layer());
    tables.insert(
        EntityCategory::Input,
        table(
            vec![
                ("data_type", FieldSpec::with_default(FieldType::Int, 0i64)),
                ("shape", FieldSpec::required(FieldType::Seq)),
                ("attributes", FieldSpec::with_default(FieldType::Map, empty_map())),
                ("connections", FieldSpec::with_default(FieldType::Seq, empty_list())),
                ("shape_derivation", opt_map()),
            ],
            &[],
        ),
    );
    tables.insert(
        EntityCategory::Output,
        table(
            vec![
                ("data_type", FieldSpec::with_default(FieldType::Int, 0i64)),
                ("shape", FieldSpec::with_default(FieldType::OptSeq, AttrValue::Null)),
                ("attributes", FieldSpec::with_default(FieldType::Map, empty_map())),
                ("connections", FieldSpec::required(FieldType::Seq)),
                ("shape_derivation", opt_map()),
            ],
            &[],
        ),
    );
    tables.insert(
        EntityCategory::MemoryBuffer,
        table(
            vec![
                ("size", FieldSpec::with_default(FieldType::Int, 100i64).range(1.0, f64::INFINITY)),
                ("type", FieldSpec::with_default(FieldType::Int, codes::MEM_FIFO)),
                ("connections", FieldSpec::with_default(FieldType::Seq, empty_list())),
                ("params", FieldSpec::with_default(FieldType::Map, empty_map())),
            ],
            &[],
        ),
    );
    tables.insert(
        EntityCategory::Predictor,
        table(
            vec![
                ("input", FieldSpec::required(FieldType::Map)),
                ("target", FieldSpec::required(FieldType::Map)),
                ("model_type", FieldSpec::with_default(FieldType::Int, codes::PRED_MODEL_LINEAR)),
                ("error_signals", FieldSpec::with_default(FieldType::Seq, empty_list())),
                ("params", FieldSpec::with_default(FieldType::Map, empty_map())),
            ],
            &[],
        ),
    );
    tables.insert(
        EntityCategory::Comparator,
        table(
            vec![
                ("source1", FieldSpec::required(FieldType::Map)),
                ("source2", FieldSpec::required(FieldType::Map)),
                ("metric", FieldSpec::with_default(FieldType::Int, codes::METRIC_MSE)),
                ("connections", FieldSpec::with_default(FieldType::Seq, empty_list())),
            ],
            &[],
        ),
    );
    tables.insert(
        EntityCategory::NoveltyModule,
        table(
            vec![
                ("input", FieldSpec::required(FieldType::Map)),
                ("memory_buffer_id", FieldSpec::with_default(FieldType::Int, -1i64)),
                ("method", FieldSpec::with_default(FieldType::Int, codes::NOVELTY_PRED_ERROR_BASED)),
                ("params", FieldSpec::with_default(FieldType::Map, empty_map())),
            ],
            &[],
        ),
    );
    tables.insert(
        EntityCategory::IntrinsicReward,
        table(
            vec![
                ("source_type", FieldSpec::required(FieldType::Int).range(0.0, 2.0)),
                ("source_id", FieldSpec::required(FieldType::Int)),
                ("scaling_int", FieldSpec::with_default(FieldType::Int, 100i64)),
            ],
            &[],
        ),
    );
    tables.insert(
        EntityCategory::PolicyHead,
        table(
            vec![
                ("action_space", FieldSpec::required(FieldType::Map)),
                ("params_int", FieldSpec::with_default(FieldType::Map, empty_map())),
                ("connections", FieldSpec::with_default(FieldType::Seq, empty_list())),
            ],
            &[],
        ),
    );
    tables.insert(
        EntityCategory::PlasticityRuleDef,
        table(
            vec![
                ("type", FieldSpec::required(FieldType::Int)),
                ("params_int", FieldSpec::with_default(FieldType::Map, empty_map())),
                ("rate_int", FieldSpec::with_default(FieldType::OptInt, AttrValue::Null)),
            ],
            &[],
        ),
    );

    tables
}

/// Tables for the link records that tie entities together.
pub fn link_tables() -> BTreeMap<LinkKind, BaseTable> {
    let mut tables = BTreeMap::new();
    tables.insert(
        LinkKind::SignalRoute,
        table(
            vec![
                ("source", FieldSpec::required(FieldType::Map)),
                ("target", FieldSpec::required(FieldType::Map)),
                ("signal", FieldSpec::with_default(FieldType::Str, "")),
                ("gain", opt_float()),
            ],
            &[],
        ),
    );
    tables.insert(
        LinkKind::RecurrentConnection,
        table(
            vec![
                ("from", FieldSpec::required(FieldType::Map)),
                ("to", FieldSpec::required(FieldType::Map)),
                ("delay", FieldSpec::with_default(FieldType::Int, 1i64).range(1.0, f64::INFINITY)),
            ],
            &[],
        ),
    );
    tables.insert(
        LinkKind::ShapeConditional,
        table(
            vec![
                ("layer", FieldSpec::required(FieldType::Map)),
                ("condition", FieldSpec::with_default(FieldType::Map, empty_map())),
                ("then", opt_map()),
                ("otherwise", opt_map()),
            ],
            &[],
        ),
    );
    tables
}

fn flag_set(names: &[&'static str]) -> BTreeSet<&'static str> { names.iter().copied().collect() }

/// Default value of a per-dimension convolution parameter: `1` for 1-D, `(1, ..)` above.
fn unit_tuple(arity: usize) -> AttrValue {
    if arity == 1 {
        AttrValue::Int(1)
    } else {
        AttrValue::List(vec![AttrValue::Int(1); arity])
    }
}

fn conv(layer: LayerType, arity: usize) -> OverrideTable {
    OverrideTable {
        concrete: layer.symbol(),
        inherits: EntityCategory::Layer,
        fields: vec![("bias", FieldOverride::default_value(true))],
        params: vec![
            (params::OUT_CHANNELS, FieldSpec::required(FieldType::Int)),
            (params::KERNEL_SIZE, FieldSpec::required(FieldType::fixed(arity))),
            (params::STRIDE, FieldSpec::with_default(FieldType::fixed(arity), unit_tuple(arity))),
            (
                params::PADDING,
                FieldSpec::with_default(FieldType::FixedSeq { arity, symbols: PADDING_SYMBOLS }, 0i64),
            ),
            (params::DILATION, FieldSpec::with_default(FieldType::fixed(arity), unit_tuple(arity))),
            (params::GROUPS, FieldSpec::with_default(FieldType::Int, 1i64)),
            (params::IN_CHANNELS, FieldSpec::inferred(FieldType::Int)),
        ],
        allowed_flags: flag_set(&[flags::FREEZE, flags::BIAS]),
    }
}

/// Per-layer-type override tables. Each inherits the base layer table.
pub fn layer_overrides() -> Vec<OverrideTable> {
    let norm_bias = FieldOverride::default_value(AttrValue::Null).ty(FieldType::OptBool);

    vec![
        OverrideTable {
            concrete: LayerType::Linear.symbol(),
            inherits: EntityCategory::Layer,
            fields: vec![("bias", FieldOverride::default_value(true))],
            params: vec![
                (params::OUT_FEATURES, FieldSpec::required(FieldType::Int)),
                (params::IN_FEATURES, FieldSpec::inferred(FieldType::Int)),
            ],
            allowed_flags: flag_set(&[flags::FREEZE, flags::BIAS]),
        },
        conv(LayerType::Conv1d, 1),
        conv(LayerType::Conv2d, 2),
        conv(LayerType::Conv3d, 3),
        OverrideTable {
            concrete: LayerType::Lstm.symbol(),
            inherits: EntityCategory::Layer,
            fields: vec![("bias", FieldOverride::default_value(true))],
            params: vec![
                (params::HIDDEN_SIZE, FieldSpec::required(FieldType::Int)),
                (params::NUM_LAYERS, FieldSpec::with_default(FieldType::Int, 1i64)),
                (params::DROPOUT, FieldSpec::with_default(FieldType::Float, 0.0).range(0.0, 1.0)),
                (params::INPUT_SIZE, FieldSpec::inferred(FieldType::Int)),
            ],
            allowed_flags: flag_set(&[flags::FREEZE, flags::BIAS, flags::BATCH_FIRST, flags::BIDIRECTIONAL]),
        },
        OverrideTable {
            concrete: LayerType::BatchNorm1d.symbol(),
            inherits: EntityCategory::Layer,
            fields: vec![("bias", norm_bias.clone())],
            params: vec![
                (params::NUM_FEATURES, FieldSpec::inferred(FieldType::Int)),
                (params::EPS, FieldSpec::with_default(FieldType::Float, 1e-5)),
                (params::MOMENTUM, FieldSpec::with_default(FieldType::OptFloat, 0.1)),
            ],
            allowed_flags: flag_set(&[flags::AFFINE, flags::TRACK_RUNNING_STATS]),
        },
        OverrideTable {
            concrete: LayerType::GroupNorm.symbol(),
            inherits: EntityCategory::Layer,
            fields: vec![("bias", norm_bias)],
            params: vec![
                (params::NUM_GROUPS, FieldSpec::required(FieldType::Int)),
                (params::NUM_FEATURES, FieldSpec::inferred(FieldType::Int)),
                (params::EPS, FieldSpec::with_default(FieldType::Float, 1e-5)),
            ],
            allowed_flags: flag_set(&[flags::AFFINE]),
        },
    ]
}
