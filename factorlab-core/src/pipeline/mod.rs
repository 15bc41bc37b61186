//! Named trees of factors producing nested result namespaces.
//!
//! A leaf yields `{factor_name: result}`; a branch yields
//! `{branch_name: union of its children}`. `apply` and `step` walk the same
//! tree, so their outputs always share one key structure: `apply` holds a
//! series per leaf, `step` a single value.

pub mod spec;

pub use spec::PipelineSpec;

use crate::domain::Bar;
use crate::factors::{Factor, FactorError, FactorOutput, FactorValue};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("branch '{branch}' has more than one child named '{name}'")]
    DuplicateName { branch: String, name: String },

    #[error("factor '{factor}' failed: {source}")]
    Factor {
        factor: String,
        #[source]
        source: FactorError,
    },
}

/// One entry of a nested result mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<T> {
    Value(T),
    Group(Mapping<T>),
}

/// Nested result namespace keyed by factor and branch names.
pub type Mapping<T> = BTreeMap<String, Node<T>>;

impl<T> Node<T> {
    pub fn as_value(&self) -> Option<&T> {
        match self {
            Node::Value(v) => Some(v),
            Node::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Mapping<T>> {
        match self {
            Node::Value(_) => None,
            Node::Group(g) => Some(g),
        }
    }
}

/// Look up a dotted path such as `signals.MA_20`.
pub fn lookup<'a, T>(mapping: &'a Mapping<T>, path: &str) -> Option<&'a Node<T>> {
    let mut parts = path.split('.');
    let mut node = mapping.get(parts.next()?)?;
    for part in parts {
        node = node.as_group()?.get(part)?;
    }
    Some(node)
}

#[derive(Debug, Clone)]
pub enum PipelineNode {
    Leaf(Factor),
    Branch {
        name: String,
        children: Vec<PipelineNode>,
    },
}

impl PipelineNode {
    pub fn leaf(factor: Factor) -> Self {
        PipelineNode::Leaf(factor)
    }

    /// Fails with `DuplicateName` when two children would write the same key.
    pub fn branch(
        name: impl Into<String>,
        children: Vec<PipelineNode>,
    ) -> Result<Self, PipelineError> {
        let name = name.into();
        let mut seen = BTreeSet::new();
        for child in &children {
            if !seen.insert(child.name()) {
                return Err(PipelineError::DuplicateName {
                    branch: name,
                    name: child.name().to_string(),
                });
            }
        }
        Ok(PipelineNode::Branch { name, children })
    }

    /// The top-level key this node writes.
    pub fn name(&self) -> &str {
        match self {
            PipelineNode::Leaf(factor) => factor.name(),
            PipelineNode::Branch { name, .. } => name,
        }
    }

    /// Largest `periods` over every factor in the tree.
    pub fn periods(&self) -> Option<usize> {
        self.factors().filter_map(Factor::periods).max()
    }

    /// All leaf factors, depth first.
    pub fn factors(&self) -> Box<dyn Iterator<Item = &Factor> + '_> {
        match self {
            PipelineNode::Leaf(factor) => Box::new(std::iter::once(factor)),
            PipelineNode::Branch { children, .. } => {
                Box::new(children.iter().flat_map(PipelineNode::factors))
            }
        }
    }

    /// Batch-apply every factor, priming their streaming state.
    pub fn apply(&mut self, bars: &[Bar]) -> Result<Mapping<FactorOutput>, PipelineError> {
        debug!(node = self.name(), rows = bars.len(), "applying pipeline");
        self.walk(&mut |factor: &mut Factor| {
            factor.apply(bars).map_err(|source| PipelineError::Factor {
                factor: factor.name().to_string(),
                source,
            })
        })
    }

    /// Advance every factor by one bar.
    pub fn step(&mut self, bar: &Bar) -> Result<Mapping<FactorValue>, PipelineError> {
        self.walk(&mut |factor: &mut Factor| {
            factor.step(bar).map_err(|source| PipelineError::Factor {
                factor: factor.name().to_string(),
                source,
            })
        })
    }

    fn walk<T>(
        &mut self,
        visit: &mut impl FnMut(&mut Factor) -> Result<T, PipelineError>,
    ) -> Result<Mapping<T>, PipelineError> {
        let mut out = Mapping::new();
        match self {
            PipelineNode::Leaf(factor) => {
                let value = visit(factor)?;
                out.insert(factor.name().to_string(), Node::Value(value));
            }
            PipelineNode::Branch { name, children } => {
                let mut union = Mapping::new();
                for child in children.iter_mut() {
                    union.extend(child.walk(visit)?);
                }
                out.insert(name.clone(), Node::Group(union));
            }
        }
        Ok(out)
    }
}

// ── Flattening ──────────────────────────────────────────────────────

fn flatten_into<T, V>(
    mapping: &Mapping<T>,
    prefix: Option<&str>,
    out: &mut BTreeMap<String, V>,
    leaf: &impl Fn(String, &T, &mut BTreeMap<String, V>),
) {
    for (key, node) in mapping {
        let path = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match node {
            Node::Value(value) => leaf(path, value, out),
            Node::Group(group) => flatten_into(group, Some(&path), out, leaf),
        }
    }
}

/// Dotted column paths for a batch result; multi-column factors expand one
/// level further (`signals.MACD_12_26.fast`).
pub fn flatten_outputs(mapping: &Mapping<FactorOutput>) -> BTreeMap<String, Vec<f64>> {
    let mut out = BTreeMap::new();
    flatten_into(mapping, None, &mut out, &insert_output);
    out
}

/// Dotted column paths for a streaming result, keyed like [`flatten_outputs`].
pub fn flatten_values(mapping: &Mapping<FactorValue>) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    flatten_into(mapping, None, &mut out, &insert_value);
    out
}

fn insert_output(path: String, output: &FactorOutput, out: &mut BTreeMap<String, Vec<f64>>) {
    match output {
        FactorOutput::Series(values) => {
            out.insert(path, values.clone());
        }
        FactorOutput::Columns(columns) => {
            for (column, values) in columns {
                out.insert(format!("{path}.{column}"), values.clone());
            }
        }
    }
}

fn insert_value(path: String, value: &FactorValue, out: &mut BTreeMap<String, f64>) {
    match value {
        FactorValue::Scalar(v) => {
            out.insert(path, *v);
        }
        FactorValue::Columns(columns) => {
            for (column, v) in columns {
                out.insert(format!("{path}.{column}"), *v);
            }
        }
    }
}
