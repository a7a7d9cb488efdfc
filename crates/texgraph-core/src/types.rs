//! Literal values and node type descriptors.
//!
//! A [`TypeDescriptor`] is immutable once registered: it declares the ordered
//! input slots a node of that type accepts, the single output slot it
//! produces, and a [`ComputeDef`] naming the program the rendering backend
//! runs. Input slots double as literal parameters: when no connection is
//! bound to a slot, the node's literal value for it is used instead.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::type_id::TypeId;

/// Ordered parameter name → literal value map carried by every node.
pub type Params = IndexMap<String, ParamValue>;

/// The kind of value a slot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Number,
    Boolean,
    String,
    Array,
    /// A rendered artifact. Only reachable through a connection; texture
    /// slots never hold a literal.
    Texture,
}

/// A JSON-safe literal parameter value.
///
/// Deserialization is untagged, so a parameter map reads naturally from the
/// graph document: `{ "scale": 2.5, "invert": true, "mode": "add" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ParamValue>),
}

impl ParamValue {
    /// Returns the [`ValueKind`] of this literal.
    pub fn kind(&self) -> ValueKind {
        match self {
            ParamValue::Bool(_) => ValueKind::Boolean,
            ParamValue::Number(_) => ValueKind::Number,
            ParamValue::String(_) => ValueKind::String,
            ParamValue::Array(_) => ValueKind::Array,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_string())
    }
}

/// A declared input slot of a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDef {
    pub name: String,
    pub kind: ValueKind,
    /// Literal used when the node does not override it. Always `None` for
    /// texture slots.
    pub default: Option<ParamValue>,
}

impl SlotDef {
    pub fn number(name: &str, default: f64) -> Self {
        SlotDef {
            name: name.to_string(),
            kind: ValueKind::Number,
            default: Some(ParamValue::Number(default)),
        }
    }

    pub fn boolean(name: &str, default: bool) -> Self {
        SlotDef {
            name: name.to_string(),
            kind: ValueKind::Boolean,
            default: Some(ParamValue::Bool(default)),
        }
    }

    pub fn string(name: &str, default: &str) -> Self {
        SlotDef {
            name: name.to_string(),
            kind: ValueKind::String,
            default: Some(ParamValue::String(default.to_string())),
        }
    }

    pub fn array(name: &str, default: Vec<ParamValue>) -> Self {
        SlotDef {
            name: name.to_string(),
            kind: ValueKind::Array,
            default: Some(ParamValue::Array(default)),
        }
    }

    pub fn texture(name: &str) -> Self {
        SlotDef {
            name: name.to_string(),
            kind: ValueKind::Texture,
            default: None,
        }
    }

    /// Returns `true` if `value` may be stored as this slot's literal.
    pub fn accepts(&self, value: &ParamValue) -> bool {
        self.kind != ValueKind::Texture && value.kind() == self.kind
    }
}

/// The output slot of a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDef {
    pub name: String,
    pub kind: ValueKind,
}

impl OutputDef {
    pub fn texture(name: &str) -> Self {
        OutputDef {
            name: name.to_string(),
            kind: ValueKind::Texture,
        }
    }
}

/// Reference to the program the rendering backend executes for a type.
///
/// The core never interprets `program`; backends match on it explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComputeDef {
    pub program: String,
}

impl ComputeDef {
    pub fn new(program: &str) -> Self {
        ComputeDef {
            program: program.to_string(),
        }
    }
}

/// Immutable description of a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub id: TypeId,
    pub name: String,
    pub inputs: Vec<SlotDef>,
    pub output: OutputDef,
    pub compute: ComputeDef,
}

impl TypeDescriptor {
    /// Creates a descriptor with a texture output named `"out"` and no inputs.
    pub fn new(id: &str, name: &str, program: &str) -> Self {
        TypeDescriptor {
            id: TypeId::from(id),
            name: name.to_string(),
            inputs: Vec::new(),
            output: OutputDef::texture("out"),
            compute: ComputeDef::new(program),
        }
    }

    /// Builder-style: appends an input slot.
    pub fn with_input(mut self, slot: SlotDef) -> Self {
        self.inputs.push(slot);
        self
    }

    /// Looks up a declared input slot by name.
    pub fn input(&self, name: &str) -> Option<&SlotDef> {
        self.inputs.iter().find(|slot| slot.name == name)
    }

    /// Returns `true` if `name` is this type's output slot.
    pub fn has_output(&self, name: &str) -> bool {
        self.output.name == name
    }

    /// Default literal values for every slot that has one, in slot order.
    pub fn default_params(&self) -> Params {
        self.inputs
            .iter()
            .filter_map(|slot| {
                slot.default
                    .as_ref()
                    .map(|value| (slot.name.clone(), value.clone()))
            })
            .collect()
    }
}
