//! Key and value templates.
//!
//! A template entry says how one field participates in aggregation: grouped
//! on (key template) or accumulated (value template). Every field appears in
//! at most one entry across both lists.

use serde::{Deserialize, Serialize};

use crate::field::{FieldId, FieldType};

use super::defaults;
use super::error::HeapError;
use super::merge::MergeOp;

/// Requested aggregation for a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggrKind {
    /// Use the field's static default.
    #[default]
    Auto,
    Key,
    Min,
    Max,
    Sum,
    Or,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    None,
    Asc,
    Desc,
}

/// Which tuple of a group holds a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tuple {
    Key,
    Value,
}

/// One compiled template entry. `kind` is never [`AggrKind::Auto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: FieldId,
    pub kind: AggrKind,
    pub sort: SortOrder,
    pub v4_prefix: u8,
    pub v6_prefix: u8,
    pub ty: FieldType,
    pub merge: MergeOp,
}

/// The active sort column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: FieldId,
    pub tuple: Tuple,
    pub offset: usize,
    pub order: SortOrder,
    pub ty: FieldType,
}

#[derive(Debug, Clone, Default)]
pub struct Templates {
    key: Vec<FieldSpec>,
    value: Vec<FieldSpec>,
    sort: Option<SortSpec>,
    stats_mode: bool,
}

impl Templates {
    pub fn key(&self) -> &[FieldSpec] {
        &self.key
    }

    pub fn value(&self) -> &[FieldSpec] {
        &self.value
    }

    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    /// Whether a pair field is grouped on, making every write count for both
    /// directions.
    pub fn stats_mode(&self) -> bool {
        self.stats_mode
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty() && self.value.is_empty()
    }

    /// Finds the tuple and offset holding `field`.
    pub fn locate(&self, field: FieldId) -> Option<(Tuple, usize)> {
        if let Some(i) = self.key.iter().position(|s| s.field == field) {
            return Some((Tuple::Key, i));
        }
        self.value
            .iter()
            .position(|s| s.field == field)
            .map(|i| (Tuple::Value, i))
    }

    pub fn contains(&self, field: FieldId) -> bool {
        self.locate(field).is_some()
    }

    /// Registers a field and, recursively, any missing prerequisites.
    ///
    /// On error `self` may be partially updated; callers work on a copy.
    pub fn configure(
        &mut self,
        field: FieldId,
        aggr: AggrKind,
        sort: SortOrder,
        v4_prefix: u8,
        v6_prefix: u8,
    ) -> Result<(), HeapError> {
        self.configure_with(field, aggr, sort, v4_prefix, v6_prefix, &defaults::prerequisites)
    }

    pub(crate) fn configure_with(
        &mut self,
        field: FieldId,
        aggr: AggrKind,
        sort: SortOrder,
        v4_prefix: u8,
        v6_prefix: u8,
        deps: &dyn Fn(FieldId) -> &'static [FieldId],
    ) -> Result<(), HeapError> {
        check_acyclic(field, deps, &mut Vec::new())?;
        self.register(field, aggr, sort, v4_prefix, v6_prefix, deps)
    }

    fn register(
        &mut self,
        field: FieldId,
        aggr: AggrKind,
        sort: SortOrder,
        v4_prefix: u8,
        v6_prefix: u8,
        deps: &dyn Fn(FieldId) -> &'static [FieldId],
    ) -> Result<(), HeapError> {
        let def = field.def().ok_or(HeapError::UnknownField(field))?;
        if !def.aggregatable && aggr != AggrKind::Auto {
            return Err(HeapError::UnknownField(field));
        }

        let kind = match aggr {
            AggrKind::Auto => defaults::resolve_auto(field, def.ty, v4_prefix, v6_prefix),
            explicit => explicit,
        };

        self.upsert(FieldSpec {
            field,
            kind,
            sort,
            v4_prefix,
            v6_prefix,
            ty: def.ty,
            merge: MergeOp::resolve(kind, def.ty),
        });

        for &dep in deps(field) {
            if !self.contains(dep) {
                self.register(dep, AggrKind::Auto, SortOrder::None, 0, 0, deps)?;
            }
        }
        Ok(())
    }

    /// Inserts or replaces the entry for `spec.field`, moving it between
    /// lists when its kind changes sides.
    fn upsert(&mut self, spec: FieldSpec) {
        let (target, other) = if spec.kind == AggrKind::Key {
            (&mut self.key, &mut self.value)
        } else {
            (&mut self.value, &mut self.key)
        };
        other.retain(|s| s.field != spec.field);
        match target.iter_mut().find(|s| s.field == spec.field) {
            Some(slot) => *slot = spec,
            None => target.push(spec),
        }

        if spec.sort != SortOrder::None {
            self.sort = Some(SortSpec {
                field: spec.field,
                tuple: Tuple::Key,
                offset: 0,
                order: spec.sort,
                ty: spec.ty,
            });
        }
        self.refresh();
    }

    /// Recomputes state derived from the list shapes.
    fn refresh(&mut self) {
        self.stats_mode = self.key.iter().any(|s| s.field.is_pair());
        if let Some(sort) = self.sort {
            self.sort = self
                .locate(sort.field)
                .map(|(tuple, offset)| SortSpec {
                    tuple,
                    offset,
                    ..sort
                });
        }
    }
}

/// Walks the prerequisite graph from `field`, failing on any cycle.
fn check_acyclic(
    field: FieldId,
    deps: &dyn Fn(FieldId) -> &'static [FieldId],
    path: &mut Vec<FieldId>,
) -> Result<(), HeapError> {
    if path.contains(&field) {
        return Err(HeapError::DependencyCycle(field));
    }
    path.push(field);
    for &dep in deps(field) {
        check_acyclic(dep, deps, path)?;
    }
    path.pop();
    Ok(())
}
