//! The closed C-level type system.
//!
//! `CType` is the only type domain the rest of the compiler speaks in: the
//! builder resolves every annotation and every inferred expression down to
//! one of these variants before anything is emitted, and the emitters never
//! have to reason about Python types directly.

use std::fmt;

use thiserror::Error;

/// A field-type tag understood by the generated class attribute handler,
/// which indexes a constant descriptor table mapping each exposed field
/// qstr to `(offset, field-type-tag)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum FieldTypeTag {
    Bool = 0,
    Int = 1,
    Float = 2,
    Object = 3,
    /// list/dict/set/RTuple are all stored boxed; the tag still
    /// distinguishes them so the attribute handler can pick the right
    /// boxing helper symmetrically with unboxing on store.
    Container = 4,
}

/// The closed set of C-level types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CType {
    Void,
    Bool,
    Int,
    Float,
    Object,
    /// Fixed-arity tuple of fully-typed elements, represented as a plain C
    /// struct for as long as the value stays inside compiled code.
    RTuple(Vec<CType>),
    ListOf(Box<CType>),
    DictOf(Box<CType>, Box<CType>),
}

impl CType {
    pub fn list_of(elem: CType) -> Self {
        Self::ListOf(Box::new(elem))
    }

    pub fn dict_of(key: CType, value: CType) -> Self {
        Self::DictOf(Box::new(key), Box::new(value))
    }

    /// True for every variant except `Void` — boxing/unboxing must be total
    /// for all of these.
    pub const fn is_boxable(&self) -> bool {
        !matches!(self, Self::Void)
    }

    /// The C declaration spelling for a value of this type held as a local
    /// or struct field.
    pub fn c_decl(&self) -> String {
        match self {
            Self::Void => "void".to_string(),
            Self::Bool => "bool".to_string(),
            Self::Int => "mp_int_t".to_string(),
            Self::Float => "mp_float_t".to_string(),
            // Lists, dicts and plain objects are always held boxed; the
            // element typing on List/DictOf only informs box/unbox call
            // sites for their elements, not their own storage.
            Self::Object | Self::ListOf(_) | Self::DictOf(_, _) => "mp_obj_t".to_string(),
            Self::RTuple(elems) => format!("struct {}", rtuple_struct_name(elems)),
        }
    }

    /// The runtime field-type tag used by the generated attribute handler.
    pub const fn field_tag(&self) -> FieldTypeTag {
        match self {
            Self::Void => FieldTypeTag::Object, // never a field type in practice
            Self::Bool => FieldTypeTag::Bool,
            Self::Int => FieldTypeTag::Int,
            Self::Float => FieldTypeTag::Float,
            Self::Object => FieldTypeTag::Object,
            Self::ListOf(_) | Self::DictOf(_, _) | Self::RTuple(_) => FieldTypeTag::Container,
        }
    }

    /// Emits a boxing expression: native `value_text` (of this type) to a
    /// tagged `mp_obj_t`. Total except for `Void`, which the caller must
    /// special-case (there is no value to box).
    pub fn box_expr(&self, value_text: &str) -> String {
        match self {
            Self::Void => "mp_const_none".to_string(),
            Self::Bool => format!("mp_obj_new_bool({value_text})"),
            Self::Int => format!("mp_obj_new_int({value_text})"),
            Self::Float => format!("mp_obj_new_float({value_text})"),
            Self::Object | Self::ListOf(_) | Self::DictOf(_, _) => value_text.to_string(),
            Self::RTuple(elems) => {
                let args = elems
                    .iter()
                    .enumerate()
                    .map(|(i, e)| e.box_expr(&format!("({value_text}).f{i}")))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "mp_obj_new_tuple({}, (mp_obj_t[]){{{}}})",
                    elems.len(),
                    args
                )
            }
        }
    }

    /// Emits an unboxing expression: tagged `mp_obj_t` `value_text` to a
    /// native value of this type.
    pub fn unbox_expr(&self, value_text: &str) -> String {
        match self {
            Self::Void => value_text.to_string(),
            Self::Bool => format!("mp_obj_is_true({value_text})"),
            Self::Int => format!("mp_obj_get_int({value_text})"),
            Self::Float => format!("mp_obj_get_float({value_text})"),
            Self::Object | Self::ListOf(_) | Self::DictOf(_, _) => value_text.to_string(),
            Self::RTuple(elems) => {
                // Unboxing an RTuple reads each slot out of a generic tagged
                // tuple; callers typically only need this at an Object/RTuple
                // boundary crossing back into typed code.
                let fields = elems
                    .iter()
                    .enumerate()
                    .map(|(i, e)| {
                        format!(
                            "\n        .f{i} = {},",
                            e.unbox_expr(&format!(
                                "mp_obj_tuple_at({value_text}, {i})"
                            ))
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("");
                format!("({}){{{}\n    }}", rtuple_struct_name(elems), fields)
            }
        }
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "None"),
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Object => write!(f, "object"),
            Self::RTuple(elems) => {
                write!(f, "tuple[")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
            Self::ListOf(e) => write!(f, "list[{e}]"),
            Self::DictOf(k, v) => write!(f, "dict[{k}, {v}]"),
        }
    }
}

/// A deterministic, collision-free struct name for a fixed-arity RTuple.
/// Shared by `c_decl` and the container emitter so a given element list
/// always names the same generated struct.
pub fn rtuple_struct_name(elems: &[CType]) -> String {
    let parts = elems
        .iter()
        .map(|e| match e {
            CType::Void => "v".to_string(),
            CType::Bool => "b".to_string(),
            CType::Int => "i".to_string(),
            CType::Float => "f".to_string(),
            CType::Object => "o".to_string(),
            CType::RTuple(inner) => format!("t{}", rtuple_struct_name(inner)),
            CType::ListOf(_) | CType::DictOf(_, _) => "o".to_string(),
        })
        .collect::<Vec<_>>()
        .join("");
    format!("upyc_rtuple_{}_{parts}", elems.len())
}

/// Binary operators with a type-driven result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Error)]
pub enum TypeError {
    #[error("unknown or unsupported annotation `{0}`")]
    UnknownAnnotation(String),
    #[error("annotation references an unsupported construct: {0}")]
    UnsupportedConstruct(String),
}

/// Resolves a type-annotation string to a `CType`. Operates on the textual form already extracted
/// from the AST by the builder (e.g. from `ruff_python_ast::Expr` unparsed
/// back to text, or straight from a `Name`/`Subscript` shape) so this crate
/// stays independent of the parser crate.
pub fn resolve_annotation(text: &str) -> Result<CType, TypeError> {
    let text = text.trim();
    match text {
        "int" => return Ok(CType::Int),
        "float" => return Ok(CType::Float),
        "bool" => return Ok(CType::Bool),
        "None" => return Ok(CType::Void),
        "object" | "str" | "bytes" | "Any" => return Ok(CType::Object),
        _ => {}
    }

    if let Some(rest) = text.strip_suffix("| None") {
        return resolve_annotation(rest.trim());
    }
    if let Some(rest) = text.strip_prefix("Optional[").and_then(|r| r.strip_suffix(']')) {
        return resolve_annotation(rest);
    }

    for (prefix, unsupported) in [
        ("TypeVar", "TypeVar"),
        ("Protocol", "Protocol"),
        ("Literal[", "Literal"),
    ] {
        if text.starts_with(prefix) {
            return Err(TypeError::UnsupportedConstruct(unsupported.to_string()));
        }
    }
    if text.starts_with("Callable[") || text == "Callable" {
        // Callable[...] is only meaningful inside C-binding callback stubs;
        // the core type system never resolves it directly.
        return Err(TypeError::UnsupportedConstruct("Callable".to_string()));
    }

    if let Some(inner) = text.strip_prefix("list[").and_then(|r| r.strip_suffix(']')) {
        return Ok(CType::list_of(resolve_annotation(inner)?));
    }
    if let Some(inner) = text.strip_prefix("set[").and_then(|r| r.strip_suffix(']')) {
        // Sets have no dedicated parameterized CType; element typing isn't tracked for them, so
        // a well-formed element annotation is required but the result is
        // always boxed `Object` (see DESIGN.md).
        resolve_annotation(inner)?;
        return Ok(CType::Object);
    }
    if let Some(inner) = text.strip_prefix("dict[").and_then(|r| r.strip_suffix(']')) {
        let (k, v) = split_top_level_comma(inner)
            .ok_or_else(|| TypeError::UnknownAnnotation(text.to_string()))?;
        return Ok(CType::dict_of(resolve_annotation(&k)?, resolve_annotation(&v)?));
    }
    if let Some(inner) = text.strip_prefix("tuple[").and_then(|r| r.strip_suffix(']')) {
        let parts = split_top_level_commas(inner);
        if parts.len() == 2 && parts[1].trim() == "..." {
            // Variable-arity tuple: no fixed struct layout is possible, so
            // this degrades to a generically boxed tagged tuple.
            resolve_annotation(parts[0].trim())?;
            return Ok(CType::Object);
        }
        let elems = parts
            .iter()
            .map(|p| resolve_annotation(p.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(CType::RTuple(elems));
    }

    // A bare identifier that isn't one of the above is treated as a
    // user-defined class name; the builder resolves it against the class
    // table and the type system itself only sees it as an opaque Object.
    if text.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && text.chars().all(|c| c.is_alphanumeric() || c == '_')
    {
        return Ok(CType::Object);
    }

    Err(TypeError::UnknownAnnotation(text.to_string()))
}

fn split_top_level_comma(s: &str) -> Option<(String, String)> {
    let parts = split_top_level_commas(s);
    if parts.len() == 2 {
        Some((parts[0].clone(), parts[1].clone()))
    } else {
        None
    }
}

fn split_top_level_commas(s: &str) -> Vec<String> {
    let mut depth = 0i32;
    let mut parts = vec![String::new()];
    for c in s.chars() {
        match c {
            '[' => {
                depth += 1;
                parts.last_mut().unwrap().push(c);
            }
            ']' => {
                depth -= 1;
                parts.last_mut().unwrap().push(c);
            }
            ',' if depth == 0 => parts.push(String::new()),
            _ => parts.last_mut().unwrap().push(c),
        }
    }
    parts.into_iter().map(|p| p.trim().to_string()).collect()
}

/// Closed binop result table. Any boxed-object operand forces
/// the result to `Object`; integer/integer arithmetic stays integer;
/// mixed/float arithmetic widens to float.
pub fn infer_binop(left: &CType, _op: BinOp, right: &CType) -> CType {
    use CType::*;
    match (left, right) {
        (Int, Int) => Int,
        (Int, Float) | (Float, Int) | (Float, Float) => Float,
        (Bool, Bool) => Int, // `True + True == 2`, matching Python's int-subclass semantics
        (Bool, Int) | (Int, Bool) => Int,
        (Bool, Float) | (Float, Bool) => Float,
        _ => Object,
    }
}

/// Comparisons always yield `bool`.
pub const fn infer_compare(_left: &CType, _op: CompareOp, _right: &CType) -> CType {
    CType::Bool
}

/// Boolean operators (`and`/`or`) always yield `bool` in the supported
/// subset (no truthy-passthrough of the operand value).
pub const fn infer_boolop(_left: &CType, _op: BoolOp, _right: &CType) -> CType {
    CType::Bool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_primitive_annotations() {
        assert_eq!(resolve_annotation("int").unwrap(), CType::Int);
        assert_eq!(resolve_annotation("float").unwrap(), CType::Float);
        assert_eq!(resolve_annotation("bool").unwrap(), CType::Bool);
        assert_eq!(resolve_annotation("None").unwrap(), CType::Void);
        assert_eq!(resolve_annotation("object").unwrap(), CType::Object);
    }

    #[test]
    fn resolves_containers() {
        assert_eq!(
            resolve_annotation("list[int]").unwrap(),
            CType::list_of(CType::Int)
        );
        assert_eq!(
            resolve_annotation("dict[int, float]").unwrap(),
            CType::dict_of(CType::Int, CType::Float)
        );
        assert_eq!(
            resolve_annotation("tuple[int, float]").unwrap(),
            CType::RTuple(vec![CType::Int, CType::Float])
        );
        assert_eq!(resolve_annotation("tuple[int, ...]").unwrap(), CType::Object);
    }

    #[test]
    fn resolves_optional_and_user_class() {
        assert_eq!(resolve_annotation("int | None").unwrap(), CType::Int);
        assert_eq!(resolve_annotation("Optional[int]").unwrap(), CType::Int);
        assert_eq!(resolve_annotation("Point").unwrap(), CType::Object);
    }

    #[test]
    fn rejects_unsupported_constructs() {
        assert!(resolve_annotation("TypeVar").is_err());
        assert!(resolve_annotation("Literal[1]").is_err());
        assert!(resolve_annotation("Callable[[int], int]").is_err());
    }

    #[test]
    fn binop_table_widens_to_float_then_object() {
        assert_eq!(infer_binop(&CType::Int, BinOp::Add, &CType::Int), CType::Int);
        assert_eq!(
            infer_binop(&CType::Int, BinOp::Add, &CType::Float),
            CType::Float
        );
        assert_eq!(
            infer_binop(&CType::Object, BinOp::Add, &CType::Int),
            CType::Object
        );
    }

    #[test]
    fn box_unbox_round_trip_shape() {
        // We can't execute C, but the round-trip invariant is
        // structural: unboxing the boxing of a name yields back an
        // expression built from that same name at the same arity.
        let ct = CType::Int;
        let boxed = ct.box_expr("v");
        let unboxed = ct.unbox_expr(&boxed);
        assert_eq!(unboxed, "mp_obj_get_int(mp_obj_new_int(v))");
    }
}
