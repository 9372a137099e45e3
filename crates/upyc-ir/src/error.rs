use std::fmt;

use thiserror::Error;

/// A class layout cannot be computed: a cycle in the inheritance DAG, or a
/// field redefinition that conflicts with a parent's layout.
#[derive(Debug, Error)]
pub struct LayoutError {
    pub class_name: String,
    pub kind: LayoutErrorKind,
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LayoutErrorKind::InheritanceCycle(chain) => {
                write!(
                    f,
                    "cyclic base-class reference involving `{}`: {}",
                    self.class_name,
                    chain.join(" -> ")
                )
            }
            LayoutErrorKind::ConflictingField(field) => {
                write!(
                    f,
                    "class `{}` redefines field `{field}` with a conflicting type",
                    self.class_name
                )
            }
            LayoutErrorKind::UnknownBase(base) => {
                write!(
                    f,
                    "class `{}` has unknown base class `{base}`",
                    self.class_name
                )
            }
        }
    }
}

#[derive(Debug)]
pub enum LayoutErrorKind {
    InheritanceCycle(Vec<String>),
    ConflictingField(String),
    UnknownBase(String),
}
