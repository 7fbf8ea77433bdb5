//! builder.rs
//! Turns raw attribute maps into typed entities and collects the draft
//! network definition. Each entity is checked on its own; a rejected entity
//! never stops its siblings from being checked.

use super::definition::{FrozenNetwork, NetworkDefinition};
use super::entity::{AuxEntity, Block, EntityAttrs, EntityRef, Input, Layer, Link, LinkRecord, Output, Reference};
use super::raw::RawNetwork;
use super::refs;
use crate::config::DEFAULT_MAX_INFERENCE_DEPTH;
use crate::integrity::IntegrityChecker;
use crate::logging::{Component, DiagnosticSink, Level};
use crate::schema::{codes, EntityCategory, FieldType, LayerType, LinkKind, ResolvedSchema, SchemaError, SchemaRegistry};
use crate::validation::{
    requested_flags, validate_fields, validate_flags, EntityId, FieldError, FieldTable, ReferenceError, Subject,
    ValidatedFields, ValidationReport, Violation,
};
use crate::value::{AttrValue, RawAttrs};
use std::collections::{BTreeMap, BTreeSet};

/// What survives the per-entity rules.
struct Checked {
    fields: ValidatedFields,
    references: Vec<Reference>,
    flags: Vec<String>,
}

impl Checked {
    fn into_attrs(self) -> (EntityAttrs, FieldTable, Vec<String>) {
        let ValidatedFields { fields, params, extensions, .. } = self.fields;
        (EntityAttrs { fields, references: self.references, extensions }, params, self.flags)
    }

    fn targets(&self, field: &str) -> impl Iterator<Item = EntityRef> + '_ {
        let prefix = format!("{}[", field);
        self.references.iter().filter(move |r| r.field.starts_with(&prefix)).map(|r| r.target)
    }
}

pub struct IrBuilder<'a> {
    registry: &'a SchemaRegistry,
    sink: &'a dyn DiagnosticSink,
    max_inference_depth: usize,
    draft: NetworkDefinition,
    report: ValidationReport,
    claimed: BTreeSet<EntityRef>,
    positions: BTreeMap<EntityCategory, usize>,
    link_positions: BTreeMap<LinkKind, usize>,
}

impl<'a> IrBuilder<'a> {
    pub fn new(registry: &'a SchemaRegistry, sink: &'a dyn DiagnosticSink) -> Self {
        Self {
            registry,
            sink,
            max_inference_depth: DEFAULT_MAX_INFERENCE_DEPTH,
            draft: NetworkDefinition::new(),
            report: ValidationReport::new(),
            claimed: BTreeSet::new(),
            positions: BTreeMap::new(),
            link_positions: BTreeMap::new(),
        }
    }

    pub fn with_max_inference_depth(mut self, depth: usize) -> Self {
        self.max_inference_depth = depth;
        self
    }

    /// Diagnostics collected so far.
    pub fn report(&self) -> &ValidationReport { &self.report }

    pub fn draft(&self) -> &NetworkDefinition { &self.draft }

    pub fn set_meta(&mut self, meta: BTreeMap<String, AttrValue>) { self.draft.meta = meta; }

    /// Adds every entity and link of `raw`, then runs the integrity pass.
    pub fn build(mut self, raw: &RawNetwork) -> Result<FrozenNetwork, ValidationReport> {
        self.sink.record(
            Level::Info,
            Component::IrBuilder,
            &format!("building network with {} raw record(s)", raw.len()),
        );
        for r in &raw.blocks {
            self.add_block(r);
        }
        for r in &raw.layers {
            self.add_layer(r);
        }
        for r in &raw.inputs {
            self.add_input(r);
        }
        for r in &raw.outputs {
            self.add_output(r);
        }
        for category in EntityCategory::ALL {
            for r in raw.aux(category).unwrap_or_default() {
                self.add_aux(category, r);
            }
        }
        for kind in LinkKind::ALL {
            for r in raw.links(kind) {
                self.add_link(kind, r);
            }
        }
        self.set_meta(raw.meta.clone());
        self.finish()
    }

    /// Routes a raw record to the entry point of its category.
    pub fn add(&mut self, category: EntityCategory, raw: &RawAttrs) -> bool {
        match category {
            EntityCategory::Block => self.add_block(raw),
            EntityCategory::Layer => self.add_layer(raw),
            EntityCategory::Input => self.add_input(raw),
            EntityCategory::Output => self.add_output(raw),
            aux => self.add_aux(aux, raw),
        }
    }

    pub fn add_block(&mut self, raw: &RawAttrs) -> bool {
        let Some((id, subject)) = self.identify(EntityCategory::Block, raw) else { return false };
        let Some(schema) = self.schema(&subject, self.registry.resolve_base(EntityCategory::Block)) else {
            return self.reject(subject, EntityRef::Block(id), 1);
        };
        let input = without(raw, &["id"]);
        let Some(checked) = self.run_rules(&subject, EntityRef::Block(id), schema, &input, |f| {
            refs::extract(EntityCategory::Block, &f.fields, None)
        }) else {
            return false;
        };

        let connections = checked.targets("connections").filter_map(|t| t.block_id()).collect();
        let subblocks = checked.targets("subblocks").filter_map(|t| t.block_id()).collect();
        let block_type = checked.fields.get("type").and_then(AttrValue::as_int).unwrap_or(codes::BLOCK_SEQUENTIAL);
        let (attrs, _, flags) = checked.into_attrs();
        self.draft.blocks.insert(id, Block { id, block_type, connections, subblocks, flags, attrs });
        self.accepted(&subject)
    }

    pub fn add_layer(&mut self, raw: &RawAttrs) -> bool {
        let position = self.next_position(EntityCategory::Layer);
        let ids = (read_id(raw, "block_id"), read_id(raw, "layer_idx"));
        let (block, index) = match ids {
            (Ok(block), Ok(index)) => (block, index),
            (block, index) => {
                let subject = Subject::Entity { category: EntityCategory::Layer, id: EntityId::Unidentified(position) };
                let known_block = block.as_ref().ok().copied();
                match known_block {
                    Some(block) => self.draft.partial_blocks.insert(block),
                    None => self.draft.unidentified.insert(EntityCategory::Layer),
                };
                let errors: Vec<Violation> =
                    [block.err(), index.err()].into_iter().flatten().map(Violation::from).collect();
                let registry = self.registry;
                let mut input = raw.clone();
                let schema = read_layer_type(raw).and_then(|t| {
                    input.insert("type".to_string(), AttrValue::from(t.symbol()));
                    registry.resolve(EntityCategory::Layer, t.symbol()).map_err(Violation::from)
                });
                self.check_unidentified(&subject, EntityCategory::Layer, errors, schema, &input, known_block);
                return false;
            }
        };
        let subject = Subject::layer(block, index);
        let me = EntityRef::Layer { block, index };

        let layer_type = match read_layer_type(raw) {
            Ok(t) => t,
            Err(violation) => {
                self.report.push(subject.clone(), violation);
                return self.reject(subject, me, 1);
            }
        };
        let Some(schema) = self.schema(&subject, self.registry.resolve(EntityCategory::Layer, layer_type.symbol())) else {
            return self.reject(subject, me, 1);
        };

        let mut input = without(raw, &["block_id"]);
        input.insert("type".to_string(), AttrValue::from(layer_type.symbol()));
        let Some(mut checked) = self.run_rules(&subject, me, schema, &input, |f| {
            refs::extract(EntityCategory::Layer, &f.fields, Some(block))
        }) else {
            return false;
        };

        checked.references.insert(0, Reference { field: "block_id".into(), target: EntityRef::Block(block) });
        let skip_connections = checked
            .targets("skip_connections")
            .filter_map(|t| match t {
                EntityRef::Layer { block: b, index } if b == block => Some(index),
                _ => None,
            })
            .collect();
        let (attrs, params, flags) = checked.into_attrs();
        let layer = Layer { block_id: block, index, layer_type, skip_connections, flags, params, attrs };
        if let Some((param, value)) = layer.overflowing_output() {
            let half = (i64::MAX / 2) as f64;
            let field = format!("params.{}", param);
            self.push_all(
                &subject,
                vec![FieldError::RangeViolation { field, value: value as f64, min: -half, max: half }.into()],
            );
            return self.reject(subject, me, 1);
        }
        self.draft.layers.entry(block).or_default().insert(index, layer);
        self.accepted(&subject)
    }

    pub fn add_input(&mut self, raw: &RawAttrs) -> bool {
        let Some((id, subject)) = self.identify(EntityCategory::Input, raw) else { return false };
        let Some(schema) = self.schema(&subject, self.registry.resolve_base(EntityCategory::Input)) else {
            return self.reject(subject, EntityRef::Input(id), 1);
        };
        let input = without(raw, &["id"]);
        let Some(checked) = self.run_rules(&subject, EntityRef::Input(id), schema, &input, |f| {
            refs::extract(EntityCategory::Input, &f.fields, None)
        }) else {
            return false;
        };

        let shape = checked.fields.get("shape").and_then(AttrValue::as_list).unwrap_or_default().to_vec();
        let connections = checked.targets("connections").collect();
        let (attrs, _, _) = checked.into_attrs();
        self.draft.inputs.insert(id, Input { id, shape, connections, attrs });
        self.accepted(&subject)
    }

    pub fn add_output(&mut self, raw: &RawAttrs) -> bool {
        let Some((id, subject)) = self.identify(EntityCategory::Output, raw) else { return false };
        let Some(schema) = self.schema(&subject, self.registry.resolve_base(EntityCategory::Output)) else {
            return self.reject(subject, EntityRef::Output(id), 1);
        };
        let input = without(raw, &["id"]);
        let Some(checked) = self.run_rules(&subject, EntityRef::Output(id), schema, &input, |f| {
            refs::extract(EntityCategory::Output, &f.fields, None)
        }) else {
            return false;
        };

        let connections = checked.targets("connections").collect();
        let (attrs, _, _) = checked.into_attrs();
        self.draft.outputs.insert(id, Output { id, connections, attrs });
        self.accepted(&subject)
    }

    /// Adds a memory buffer, predictor, comparator, novelty module, intrinsic
    /// reward, policy head or plasticity rule definition. Other categories are
    /// routed to their own entry points.
    pub fn add_aux(&mut self, category: EntityCategory, raw: &RawAttrs) -> bool {
        if matches!(
            category,
            EntityCategory::Block | EntityCategory::Layer | EntityCategory::Input | EntityCategory::Output
        ) {
            return self.add(category, raw);
        }
        let Some((id, subject)) = self.identify(category, raw) else { return false };
        let Some(me) = EntityRef::of(category, id) else { return false };
        let Some(schema) = self.schema(&subject, self.registry.resolve_base(category)) else {
            return self.reject(subject, me, 1);
        };
        let input = without(raw, &["id"]);
        let Some(checked) = self.run_rules(&subject, me, schema, &input, |f| refs::extract(category, &f.fields, None))
        else {
            return false;
        };

        let (attrs, _, _) = checked.into_attrs();
        self.draft.aux.entry(category).or_default().insert(id, AuxEntity { category, id, attrs });
        self.accepted(&subject)
    }

    pub fn add_signal_route(&mut self, raw: &RawAttrs) -> bool { self.add_link(LinkKind::SignalRoute, raw) }

    pub fn add_recurrent_connection(&mut self, raw: &RawAttrs) -> bool {
        self.add_link(LinkKind::RecurrentConnection, raw)
    }

    pub fn add_shape_conditional(&mut self, raw: &RawAttrs) -> bool { self.add_link(LinkKind::ShapeConditional, raw) }

    /// Link records have no identity of their own; they are named by kind and
    /// position in their input list.
    pub fn add_link(&mut self, kind: LinkKind, raw: &RawAttrs) -> bool {
        let position = {
            let counter = self.link_positions.entry(kind).or_insert(0);
            *counter += 1;
            *counter - 1
        };
        let subject = Subject::Link { kind, position };
        let schema = match self.registry.resolve_link(kind) {
            Ok(schema) => schema,
            Err(e) => {
                self.report.push(subject.clone(), e);
                self.log_rejection(&subject, 1);
                return false;
            }
        };

        let endpoints = link_endpoints(kind);
        let (fields, errors) = validate_fields(schema, raw);
        self.note_advisories(&subject, &fields);
        let mut violations: Vec<Violation> = errors.into_iter().map(Violation::from).collect();
        violations.extend(validate_flags(&schema.allowed_flags, &requested_flags(raw)).into_iter().map(Violation::from));

        let mut references = Vec::new();
        for field in endpoints {
            let Some(value) = fields.get(field) else { continue };
            match refs::parse_ref(value, None) {
                Some(target) if kind != LinkKind::ShapeConditional || matches!(target, EntityRef::Layer { .. }) => {
                    references.push(Reference { field: field.to_string(), target })
                }
                _ => violations.push(
                    FieldError::TypeMismatch {
                        field: field.to_string(),
                        expected: (if kind == LinkKind::ShapeConditional { "layer reference" } else { "entity reference" })
                            .to_string(),
                        found: value.to_string(),
                    }
                    .into(),
                ),
            }
        }

        if !violations.is_empty() {
            let n = violations.len();
            self.push_all(&subject, violations);
            self.log_rejection(&subject, n);
            return false;
        }

        let link = match (kind, references.as_slice()) {
            (LinkKind::SignalRoute, [source, target]) => Link::SignalRoute { source: source.target, target: target.target },
            (LinkKind::RecurrentConnection, [from, to]) => Link::RecurrentConnection { from: from.target, to: to.target },
            (LinkKind::ShapeConditional, [layer]) => Link::ShapeConditional { layer: layer.target },
            _ => {
                // Endpoints are required fields, so a clean validation always yields them all.
                self.report.push(subject.clone(), FieldError::MissingRequired { field: endpoints.join(",") });
                self.log_rejection(&subject, 1);
                return false;
            }
        };
        let ValidatedFields { fields, extensions, .. } = fields;
        self.draft.links.push(LinkRecord { position, link, attrs: EntityAttrs { fields, references, extensions } });
        self.accepted(&subject)
    }

    /// Runs the integrity pass and freezes the definition when nothing at all
    /// was reported.
    pub fn finish(self) -> Result<FrozenNetwork, ValidationReport> {
        let IrBuilder { sink, max_inference_depth, mut draft, mut report, .. } = self;

        let checked = IntegrityChecker::new(&draft, sink).max_depth(max_inference_depth).check();
        match checked {
            Ok(resolutions) => {
                for r in resolutions {
                    draft.resolve_param(r.block, r.index, &r.param, r.value);
                }
                if report.is_clean() {
                    for (subject, field) in draft.pending() {
                        report.push(subject, FieldError::MissingRequired { field });
                    }
                }
            }
            Err(found) => report.merge(found),
        }

        report.sort();
        if report.is_clean() {
            sink.record(
                Level::Info,
                Component::IrBuilder,
                &format!("network frozen: {} entities, {} link(s)", draft.entity_count(), draft.links.len()),
            );
            Ok(draft.freeze(report.advisories))
        } else {
            sink.record(
                Level::Warn,
                Component::IrBuilder,
                &format!("network rejected with {} diagnostic(s)", report.diagnostics.len()),
            );
            Err(report)
        }
    }

    // --- per-entity plumbing ---

    fn next_position(&mut self, category: EntityCategory) -> usize {
        let counter = self.positions.entry(category).or_insert(0);
        *counter += 1;
        *counter - 1
    }

    /// Reads `id`. Without one the entity is rejected, but its other fields
    /// and flags are still checked and reported under its list position.
    fn identify(&mut self, category: EntityCategory, raw: &RawAttrs) -> Option<(i64, Subject)> {
        let position = self.next_position(category);
        match read_id(raw, "id") {
            Ok(id) => Some((id, Subject::entity(category, id))),
            Err(e) => {
                let subject = Subject::Entity { category, id: EntityId::Unidentified(position) };
                self.draft.unidentified.insert(category);
                let schema = self.registry.resolve_base(category).map_err(Violation::from);
                self.check_unidentified(&subject, category, vec![e.into()], schema, raw, None);
                None
            }
        }
    }

    /// Reports the identity errors of a rejected entity together with
    /// whatever its field, flag and reference rules find.
    fn check_unidentified(
        &mut self,
        subject: &Subject,
        category: EntityCategory,
        mut violations: Vec<Violation>,
        schema: Result<&ResolvedSchema, Violation>,
        raw: &RawAttrs,
        block: Option<i64>,
    ) {
        const IDENTITY: [&str; 3] = ["id", "block_id", "layer_idx"];
        match schema {
            Ok(schema) => {
                let input = without(raw, &IDENTITY);
                let (fields, field_errors) = validate_fields(schema, &input);
                let flag_errors = validate_flags(&schema.allowed_flags, &requested_flags(&input));
                let (_, ref_errors) = refs::extract(category, &fields.fields, block);
                self.note_advisories(subject, &fields);
                violations.extend(
                    field_errors
                        .into_iter()
                        .chain(ref_errors)
                        .filter(|e| !IDENTITY.contains(&e.field()))
                        .map(Violation::from),
                );
                violations.extend(flag_errors.into_iter().map(Violation::from));
            }
            Err(violation) => violations.push(violation),
        }
        let n = violations.len();
        self.push_all(subject, violations);
        self.log_rejection(subject, n);
    }

    fn schema(
        &mut self,
        subject: &Subject,
        resolved: Result<&'a ResolvedSchema, SchemaError>,
    ) -> Option<&'a ResolvedSchema> {
        match resolved {
            Ok(schema) => Some(schema),
            Err(e) => {
                self.sink.record(Level::Debug, Component::SchemaRegistry, &e.to_string());
                self.report.push(subject.clone(), e);
                None
            }
        }
    }

    /// Field rule, flag rule and reference extraction for one entity. Every
    /// violation is reported; the entity survives only if there are none.
    fn run_rules(
        &mut self,
        subject: &Subject,
        me: EntityRef,
        schema: &ResolvedSchema,
        raw: &RawAttrs,
        extract: impl FnOnce(&ValidatedFields) -> (Vec<Reference>, Vec<FieldError>),
    ) -> Option<Checked> {
        let duplicate = !self.claimed.insert(me);
        let (fields, field_errors) = validate_fields(schema, raw);
        let flag_errors = validate_flags(&schema.allowed_flags, &requested_flags(raw));
        let (references, ref_errors) = extract(&fields);
        self.note_advisories(subject, &fields);

        let mut violations: Vec<Violation> = Vec::new();
        if duplicate {
            let field = if me.category() == EntityCategory::Layer { "layer_idx" } else { "id" };
            violations.push(ReferenceError::DuplicateId { field: field.into(), id: subject.to_string() }.into());
        }
        violations.extend(field_errors.into_iter().chain(ref_errors).map(Violation::from));
        violations.extend(flag_errors.into_iter().map(Violation::from));

        if !violations.is_empty() {
            let n = violations.len();
            self.push_all(subject, violations);
            if !duplicate {
                self.draft.rejected.insert(me);
            }
            self.log_rejection(subject, n);
            return None;
        }

        let flags = fields.get("flags").and_then(AttrValue::as_str_list).unwrap_or_default();
        Some(Checked { fields, references, flags })
    }

    fn push_all(&mut self, subject: &Subject, violations: Vec<Violation>) {
        for violation in violations {
            let component = match violation {
                Violation::Flag(_) => Component::FlagValidator,
                Violation::Field(_) => Component::FieldValidator,
                _ => Component::IrBuilder,
            };
            self.sink.record(Level::Debug, component, &format!("{}: {}", subject, violation));
            self.report.push(subject.clone(), violation);
        }
    }

    fn note_advisories(&mut self, subject: &Subject, fields: &ValidatedFields) {
        for (field, message) in &fields.advisories {
            self.sink.record(Level::Info, Component::FieldValidator, &format!("{}: {}", subject, message));
            self.report.advise(subject.clone(), field.clone(), message.clone());
        }
    }

    fn reject(&mut self, subject: Subject, me: EntityRef, violations: usize) -> bool {
        self.claimed.insert(me);
        self.draft.rejected.insert(me);
        self.log_rejection(&subject, violations);
        false
    }

    fn log_rejection(&self, subject: &Subject, violations: usize) {
        self.sink.record(
            Level::Warn,
            Component::IrBuilder,
            &format!("rejected {} with {} violation(s)", subject, violations),
        );
    }

    fn accepted(&self, subject: &Subject) -> bool {
        self.sink.record(Level::Debug, Component::IrBuilder, &format!("accepted {}", subject));
        true
    }
}

fn link_endpoints(kind: LinkKind) -> &'static [&'static str] {
    match kind {
        LinkKind::SignalRoute => &["source", "target"],
        LinkKind::RecurrentConnection => &["from", "to"],
        LinkKind::ShapeConditional => &["layer"],
    }
}

/// The layer type named by `type`, as a symbol or a numeric code.
fn read_layer_type(raw: &RawAttrs) -> Result<LayerType, Violation> {
    match raw.get("type") {
        None | Some(AttrValue::Null) => Err(FieldError::MissingRequired { field: "type".into() }.into()),
        Some(value) => LayerType::from_attr(value).ok_or_else(|| {
            let concrete = value.as_str().map_or_else(|| value.to_string(), str::to_string);
            SchemaError::NotFound { category: EntityCategory::Layer, concrete }.into()
        }),
    }
}

/// Reads an integer identity key.
fn read_id(raw: &RawAttrs, key: &str) -> Result<i64, FieldError> {
    match raw.get(key) {
        None | Some(AttrValue::Null) => Err(FieldError::MissingRequired { field: key.to_string() }),
        Some(AttrValue::Int(id)) => Ok(*id),
        Some(other) => Err(FieldError::type_mismatch(key, FieldType::Int, other.kind_name())),
    }
}

/// A copy of `raw` without identity keys the schema does not declare.
fn without(raw: &RawAttrs, keys: &[&str]) -> RawAttrs {
    raw.iter().filter(|(k, _)| !keys.contains(&k.as_str())).map(|(k, v)| (k.clone(), v.clone())).collect()
}
