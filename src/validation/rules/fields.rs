//! Field rule: checks one entity's supplied attributes against a resolved schema.

use crate::schema::{FieldSpec, FieldType, ResolvedSchema};
use crate::validation::error::FieldError;
use crate::value::{AttrValue, RawAttrs};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A validated field: either a concrete value or a marker that the value will
/// be inferred from graph context later.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Slot {
    Value(AttrValue),
    Pending,
}

impl Slot {
    pub fn value(&self) -> Option<&AttrValue> {
        match self { Slot::Value(v) => Some(v), Slot::Pending => None }
    }

    pub fn is_pending(&self) -> bool { matches!(self, Slot::Pending) }
}

pub type FieldTable = BTreeMap<String, Slot>;

/// Attributes outside the schema, kept in arrival order for forward compatibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extensions(pub Vec<(String, AttrValue)>);

impl Extensions {
    pub fn push(&mut self, name: impl Into<String>, value: AttrValue) { self.0.push((name.into(), value)); }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn iter(&self) -> impl Iterator<Item = &(String, AttrValue)> { self.0.iter() }
}

/// Output of the field rule for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedFields {
    pub fields: FieldTable,
    /// Type-specific parameters, present when the schema declares a parameter sub-schema.
    pub params: FieldTable,
    pub extensions: Extensions,
    /// `(field, message)` notes for attributes kept in the extension bag.
    pub advisories: Vec<(String, String)>,
}

impl ValidatedFields {
    pub fn get(&self, name: &str) -> Option<&AttrValue> { self.fields.get(name).and_then(Slot::value) }

    /// The declared fields as a raw map again, pending slots left out. Feeding
    /// this back through `validate_fields` reports nothing new.
    pub fn to_raw(&self) -> RawAttrs {
        let mut raw: RawAttrs = self
            .fields
            .iter()
            .filter_map(|(k, slot)| slot.value().map(|v| (k.clone(), v.clone())))
            .collect();
        if !self.params.is_empty() {
            let params = self
                .params
                .iter()
                .filter_map(|(k, slot)| slot.value().map(|v| (k.clone(), v.clone())))
                .collect();
            raw.insert(PARAMS.to_string(), AttrValue::Map(params));
        }
        raw
    }
}

const PARAMS: &str = "params";

/// Validates `raw` against `schema`, collecting every field error.
pub fn validate_fields(schema: &ResolvedSchema, raw: &RawAttrs) -> (ValidatedFields, Vec<FieldError>) {
    let mut out = ValidatedFields::default();
    let mut errors = Vec::new();
    let has_param_schema = !schema.params.is_empty();

    for (name, spec) in &schema.fields {
        if has_param_schema && name == PARAMS {
            validate_params(schema, raw.get(PARAMS), &mut out, &mut errors);
            continue;
        }
        if let Some(slot) = resolve_slot(name, spec, raw.get(name), &mut errors) {
            out.fields.insert(name.clone(), slot);
        }
    }

    for (name, value) in raw {
        if !schema.fields.contains_key(name) {
            out.advisories.push((name.clone(), format!("attribute '{}' is not in the schema; kept as extension", name)));
            out.extensions.push(name.clone(), value.clone());
        }
    }

    (out, errors)
}

fn validate_params(
    schema: &ResolvedSchema,
    supplied: Option<&AttrValue>,
    out: &mut ValidatedFields,
    errors: &mut Vec<FieldError>,
) {
    let empty = BTreeMap::new();
    let supplied = match supplied {
        None | Some(AttrValue::Null) => &empty,
        Some(AttrValue::Map(m)) => m,
        Some(other) => {
            errors.push(FieldError::type_mismatch(PARAMS, FieldType::Map, other.kind_name()));
            &empty
        }
    };

    for (name, spec) in &schema.params {
        let qualified = format!("{}.{}", PARAMS, name);
        if let Some(slot) = resolve_slot(&qualified, spec, supplied.get(name), errors) {
            out.params.insert(name.clone(), slot);
        }
    }

    for (name, value) in supplied {
        if !schema.params.contains_key(name) {
            let qualified = format!("{}.{}", PARAMS, name);
            out.advisories.push((qualified.clone(), format!("parameter '{}' is not in the schema; kept as extension", name)));
            out.extensions.push(qualified, value.clone());
        }
    }
}

/// Applies the required/default/inferred policy to one field. Returns `None`
/// when the field ends up without a slot (an error was recorded, or the field
/// is optional with no default).
fn resolve_slot(field: &str, spec: &FieldSpec, supplied: Option<&AttrValue>, errors: &mut Vec<FieldError>) -> Option<Slot> {
    match supplied {
        // A null for an inferred field asks for inference, same as leaving it out.
        Some(AttrValue::Null) if spec.inferred && !spec.ty.is_optional() => Some(Slot::Pending),
        Some(value) => match check_value(field, spec, value) {
            Ok(v) => Some(Slot::Value(v)),
            Err(e) => {
                errors.push(e);
                None
            }
        },
        None if spec.required && spec.default.is_none() => {
            errors.push(FieldError::MissingRequired { field: field.to_string() });
            None
        }
        None if spec.inferred => Some(Slot::Pending),
        None => spec.default.clone().map(Slot::Value),
    }
}

/// Checks type, arity and range. Returns the value as it should be stored.
pub fn check_value(field: &str, spec: &FieldSpec, value: &AttrValue) -> Result<AttrValue, FieldError> {
    let stored = check_type(field, spec.ty, value)?;
    if let (Some((min, max)), Some(n)) = (spec.range, stored.as_number()) {
        if !(min..=max).contains(&n) {
            return Err(FieldError::RangeViolation { field: field.to_string(), value: n, min, max });
        }
    }
    Ok(stored)
}

fn check_type(field: &str, ty: FieldType, value: &AttrValue) -> Result<AttrValue, FieldError> {
    let mismatch = || FieldError::type_mismatch(field, ty, value.kind_name());

    match (ty, value) {
        (t, AttrValue::Null) if t.is_optional() => Ok(AttrValue::Null),
        (FieldType::Int | FieldType::OptInt, AttrValue::Int(_))
        | (FieldType::Float | FieldType::OptFloat, AttrValue::Float(_))
        | (FieldType::Bool | FieldType::OptBool, AttrValue::Bool(_))
        | (FieldType::Str, AttrValue::Str(_))
        | (FieldType::Map | FieldType::OptMap, AttrValue::Map(_))
        | (FieldType::Seq | FieldType::OptSeq, AttrValue::List(_)) => Ok(value.clone()),
        (FieldType::Float | FieldType::OptFloat, AttrValue::Int(i)) => Ok(AttrValue::Float(*i as f64)),
        (FieldType::UniqueSet, AttrValue::List(_)) => {
            let names: BTreeSet<String> = value.as_str_list().ok_or_else(mismatch)?.into_iter().collect();
            Ok(AttrValue::List(names.into_iter().map(AttrValue::Str).collect()))
        }
        // A scalar where a fixed-length sequence is declared is kept as given.
        (FieldType::FixedSeq { .. }, AttrValue::Int(_)) => Ok(value.clone()),
        (FieldType::FixedSeq { symbols, .. }, AttrValue::Str(s)) if symbols.contains(&s.as_str()) => Ok(value.clone()),
        (FieldType::FixedSeq { arity, .. }, AttrValue::List(items)) => {
            if items.len() != arity {
                return Err(FieldError::ArityMismatch { field: field.to_string(), expected: arity, found: items.len() });
            }
            if items.iter().all(|i| matches!(i, AttrValue::Int(_))) {
                Ok(value.clone())
            } else {
                Err(mismatch())
            }
        }
        (FieldType::OneOf(symbols), AttrValue::Str(s)) if symbols.contains(&s.as_str()) => Ok(value.clone()),
        (FieldType::OneOf(_), AttrValue::Str(s)) => Err(FieldError::TypeMismatch {
            field: field.to_string(),
            expected: ty.to_string(),
            found: format!("'{}'", s),
        }),
        _ => Err(mismatch()),
    }
}
