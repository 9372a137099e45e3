use indexmap::IndexMap;

use upyc_common::QstrSet;

use crate::class::{ClassIr, FieldIr};
use crate::error::{LayoutError, LayoutErrorKind};
use crate::func::FuncIr;

/// Module IR, the root container owning every other
/// node. Immutable once emission begins.
#[derive(Debug, Default)]
pub struct Module {
    /// C-safe module name.
    pub c_name: String,
    /// Original Python source module name.
    pub source_name: String,
    pub classes: IndexMap<String, ClassIr>,
    pub functions: IndexMap<String, FuncIr>,
    pub qstrs: QstrSet,
    /// Recomputed whenever a class is added; base classes precede derived
    /// classes.
    topo_order: Vec<String>,
}

impl Module {
    pub fn new(c_name: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            c_name: c_name.into(),
            source_name: source_name.into(),
            ..Default::default()
        }
    }

    /// Inserts a class without validating its base chain yet. Builders
    /// collect every class up front (base classes may appear after their
    /// derived class in source order) and call `finalize_classes` once all
    /// of them are known.
    pub fn insert_class(&mut self, class: ClassIr) {
        self.classes.insert(class.py_name.clone(), class);
    }

    /// Inserts a single class and immediately recomputes the topological
    /// order. Only safe when `class`'s base (if any) is already present;
    /// callers building up a whole module should use `insert_class` plus a
    /// single trailing `finalize_classes` instead.
    pub fn add_class(&mut self, class: ClassIr) -> Result<(), LayoutError> {
        self.insert_class(class);
        self.recompute_topo_order()
    }

    /// Computes the topological class order once every class has been
    /// inserted, failing on an unknown base or an inheritance cycle.
    pub fn finalize_classes(&mut self) -> Result<(), LayoutError> {
        self.recompute_topo_order()
    }

    pub fn add_function(&mut self, func: FuncIr) {
        self.functions.insert(func.name.clone(), func);
    }

    pub fn class(&self, name: &str) -> Option<&ClassIr> {
        self.classes.get(name)
    }

    pub fn class_mut(&mut self, name: &str) -> Option<&mut ClassIr> {
        self.classes.get_mut(name)
    }

    pub fn base_of(&self, class_name: &str) -> Option<&ClassIr> {
        let class = self.classes.get(class_name)?;
        let base_name = class.base_name.as_ref()?;
        self.classes.get(base_name)
    }

    /// Classes in an order where every base precedes its derived classes
    ///.
    pub fn topological_classes(&self) -> impl Iterator<Item = &ClassIr> {
        self.topo_order.iter().map(move |name| &self.classes[name])
    }

    fn recompute_topo_order(&mut self) -> Result<(), LayoutError> {
        let mut order = Vec::with_capacity(self.classes.len());
        let mut state: IndexMap<&str, VisitState> =
            self.classes.keys().map(|k| (k.as_str(), VisitState::Unvisited)).collect();

        for name in self.classes.keys() {
            if matches!(state[name.as_str()], VisitState::Unvisited) {
                let mut chain = Vec::new();
                visit(name, &self.classes, &mut state, &mut order, &mut chain)?;
            }
        }
        self.topo_order = order;
        Ok(())
    }

    /// The own-plus-inherited field list, with a dotted access path
    /// prefix for inherited fields (`super.x`, `super.super.x`, ...),
    /// matching how the layout pass builds a
    /// class's full field list before assigning offsets.
    pub fn flattened_fields(&self, class_name: &str) -> Vec<(String, FieldIr)> {
        let class = match self.classes.get(class_name) {
            Some(c) => c,
            None => return Vec::new(),
        };
        let mut out = match &class.base_name {
            Some(base) => self
                .flattened_fields(base)
                .into_iter()
                .map(|(path, field)| (format!("super.{path}"), field))
                .collect(),
            None => Vec::new(),
        };
        out.extend(class.fields.iter().map(|f| (f.name.clone(), f.clone())));
        out
    }

    /// The name of every method reachable from `class_name`, including
    /// inherited ones not overridden — used to populate `locals_dict`
    ///.
    pub fn flattened_method_names(&self, class_name: &str) -> Vec<String> {
        let mut seen = IndexMap::new();
        let mut chain = Vec::new();
        let mut cur = Some(class_name.to_string());
        while let Some(name) = cur {
            let Some(class) = self.classes.get(&name) else { break };
            chain.push(class);
            cur = class.base_name.clone();
        }
        // Walk from the root base down to `class_name` so overrides in the
        // more derived classes win the insertion slot, but names first
        // introduced by a base keep that base's position.
        for class in chain.into_iter().rev() {
            for method_name in class.methods.keys() {
                seen.entry(method_name.clone()).or_insert(());
            }
        }
        seen.into_keys().collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    InProgress,
    Done,
}

fn visit<'a>(
    name: &'a str,
    classes: &'a IndexMap<String, ClassIr>,
    state: &mut IndexMap<&'a str, VisitState>,
    order: &mut Vec<String>,
    chain: &mut Vec<String>,
) -> Result<(), LayoutError> {
    match state.get(name).copied() {
        Some(VisitState::Done) => return Ok(()),
        Some(VisitState::InProgress) => {
            chain.push(name.to_string());
            return Err(LayoutError {
                class_name: name.to_string(),
                kind: LayoutErrorKind::InheritanceCycle(chain.clone()),
            });
        }
        _ => {}
    }
    state.insert(name, VisitState::InProgress);
    chain.push(name.to_string());

    if let Some(base) = classes[name].base_name.as_deref() {
        if !classes.contains_key(base) {
            return Err(LayoutError {
                class_name: name.to_string(),
                kind: LayoutErrorKind::UnknownBase(base.to_string()),
            });
        }
        visit(base, classes, state, order, chain)?;
    }

    chain.pop();
    state.insert(name, VisitState::Done);
    order.push(name.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topo_order_places_base_before_derived() {
        let mut module = Module::new("mymod", "mymod");
        let mut b = ClassIr::new("B", "B");
        b.base_name = Some("A".to_string());
        let a = ClassIr::new("A", "A");
        // Insert derived first to prove ordering is computed, not preserved.
        module.insert_class(b);
        module.insert_class(a);
        module.finalize_classes().unwrap();
        let names: Vec<_> = module.topological_classes().map(|c| c.py_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn detects_inheritance_cycle() {
        let mut module = Module::new("mymod", "mymod");
        let mut a = ClassIr::new("A", "A");
        a.base_name = Some("B".to_string());
        let mut b = ClassIr::new("B", "B");
        b.base_name = Some("A".to_string());
        module.insert_class(a);
        module.insert_class(b);
        let err = module.finalize_classes().unwrap_err();
        assert!(matches!(err.kind, LayoutErrorKind::InheritanceCycle(_)));
    }
}
