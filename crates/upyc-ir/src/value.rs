use upyc_types::CType;

/// A typed pair of (C expression text, CType) — the leaf node emitters fold
/// expressions down into during emission.
/// Produced by lowering, consumed directly by emission; never stored
/// inside the persistent IR tree (transient, owned by its producer).
#[derive(Debug, Clone)]
pub struct Value {
    pub expr: String,
    pub ty: CType,
}

impl Value {
    pub fn new(expr: impl Into<String>, ty: CType) -> Self {
        Self { expr: expr.into(), ty }
    }

    pub fn void() -> Self {
        Self::new("", CType::Void)
    }

    /// Boxes this value to `mp_obj_t`, returning a fresh `Value` of type
    /// `Object`. A no-op (returns self) if already boxed.
    pub fn boxed(&self) -> Value {
        match self.ty {
            CType::Object => self.clone(),
            _ => Value::new(self.ty.box_expr(&self.expr), upyc_types::CType::Object),
        }
    }
}
