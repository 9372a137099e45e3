use indexmap::IndexMap;
use upyc_types::CType;

use crate::expr::Expr;
use crate::func::MethodIr;

#[derive(Debug, Clone)]
pub struct FieldIr {
    pub name: String,
    pub ty: CType,
    /// Byte offset within the instance struct, filled in by the layout
    /// pass. `None` before layout
    /// runs; the invariant "once computed, offsets are immutable" is
    /// enforced by the builder never revisiting a class after layout.
    pub offset: Option<u32>,
    pub default: Option<FieldDefault>,
}

#[derive(Debug, Clone)]
pub enum FieldDefault {
    Literal(Expr),
    /// `field(default_factory=...)`-style: a zero-argument callable name
    /// invoked fresh per instance.
    Factory(String),
}

#[derive(Debug, Clone, Default)]
pub struct DataclassMeta {
    pub is_dataclass: bool,
    pub generate_init: bool,
    pub generate_eq: bool,
    pub generate_repr: bool,
    pub frozen: bool,
    pub order: bool,
}

/// The set of MicroPython type slots a class needs populated.
#[derive(Debug, Clone, Default)]
pub struct RequiredSlots {
    pub make_new: bool,
    pub print: bool,
    pub attr: bool,
    pub binary_op: bool,
    pub locals_dict: bool,
    pub iter: bool,
    pub iternext: bool,
}

/// Class IR. `base_name` is a non-owning reference by
/// name rather than a raw pointer — callers resolve it through the owning
/// `Module`.
#[derive(Debug, Clone)]
pub struct ClassIr {
    pub py_name: String,
    pub c_name: String,
    pub base_name: Option<String>,
    /// Own fields only; parent fields are reached through the embedded
    /// `super` member.
    pub fields: Vec<FieldIr>,
    pub methods: IndexMap<String, MethodIr>,
    /// Virtual method names in slot-assignment order.
    pub virtual_methods: Vec<String>,
    pub vtable_size: u32,
    pub dataclass: DataclassMeta,
    pub slots: RequiredSlots,
}

impl ClassIr {
    pub fn new(py_name: impl Into<String>, c_name: impl Into<String>) -> Self {
        Self {
            py_name: py_name.into(),
            c_name: c_name.into(),
            base_name: None,
            fields: Vec::new(),
            methods: IndexMap::new(),
            virtual_methods: Vec::new(),
            vtable_size: 0,
            dataclass: DataclassMeta::default(),
            slots: RequiredSlots::default(),
        }
    }

    pub fn vtable_index_of(&self, method_name: &str) -> Option<u32> {
        self.methods.get(method_name).and_then(|m| m.vtable_index)
    }
}
