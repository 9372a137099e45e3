//! Small shared utilities used by both the IR builder and the emitters:
//! qstr interning, and the C identifier sanitization/mangling rules that
//! every emitter relies on.

pub use ruff_source_file::{OneIndexed, SourceLocation};

use indexmap::IndexSet;

/// C89/C99 reserved words the emitted identifiers must never collide with
///.
pub const C_RESERVED_WORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "_Bool", "_Complex", "_Imaginary", "and",
    "or", "not", "bool", "true", "false", "NULL",
];

/// Rewrites `name` so it is always a legal, non-reserved C identifier:
/// characters outside `[A-Za-z0-9_]` become `_`, a leading digit gets a
/// `_` prefix, and a name colliding with a C reserved word gets a `_`
/// prefix too.
pub fn sanitize_c_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
        if i == 0 && c.is_ascii_digit() {
            out.insert(0, '_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    if C_RESERVED_WORDS.contains(&out.as_str()) {
        out.insert(0, '_');
    }
    out
}

/// `<c_module>_<c_thing>`, the wrapper-naming scheme used throughout codegen.
pub fn mangle_wrapper_name(c_module: &str, c_thing: &str) -> String {
    format!("{}_{}", sanitize_c_ident(c_module), sanitize_c_ident(c_thing))
}

/// The private-name convention: a double-underscore prefix (and no
/// matching dunder suffix, so `__init__` is not private) causes the
/// wrapper and globals-table entry to be omitted while the native
/// implementation is still emitted.
pub fn is_private_name(name: &str) -> bool {
    name.starts_with("__") && !name.ends_with("__")
}

/// An append-only, insertion-ordered set of qstr text used to build the
/// runtime's interned-symbol table. Never supports removal: the qstr set is
/// append-only for the lifetime of a build.
#[derive(Debug, Default, Clone)]
pub struct QstrSet {
    seen: IndexSet<String>,
}

impl QstrSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `s`, returning its stable index in insertion order.
    pub fn intern(&mut self, s: impl Into<String>) -> usize {
        let s = s.into();
        self.seen.insert_full(s).0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.seen.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// The C identifier used to reference qstr `s` in generated code, e.g.
    /// `MP_QSTR_foo`, following MicroPython's own convention.
    pub fn c_macro_name(s: &str) -> String {
        format!("MP_QSTR_{}", sanitize_c_ident(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_reserved_and_invalid_chars() {
        assert_eq!(sanitize_c_ident("int"), "_int");
        assert_eq!(sanitize_c_ident("my-name"), "my_name");
        assert_eq!(sanitize_c_ident("9lives"), "_9lives");
        assert_eq!(sanitize_c_ident("ok_name"), "ok_name");
    }

    #[test]
    fn detects_private_names() {
        assert!(is_private_name("__helper"));
        assert!(!is_private_name("__init__"));
        assert!(!is_private_name("public"));
    }

    #[test]
    fn qstr_set_is_insertion_ordered_and_idempotent() {
        let mut qs = QstrSet::new();
        let a = qs.intern("foo");
        let b = qs.intern("bar");
        let a2 = qs.intern("foo");
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(qs.iter().collect::<Vec<_>>(), vec!["foo", "bar"]);
    }
}
