// src/core/flattener.rs
use super::model::{Module, TypeId};

/// Produces a depth-first, pre-order listing of every type in a module
pub struct TypeTreeFlattener;

impl TypeTreeFlattener {
    /// Every reachable type exactly once, each parent before its nested types,
    /// siblings in declaration order.
    ///
    /// The result holds ids only, so later flag mutations cannot change it.
    pub fn flatten(module: &Module) -> Vec<TypeId> {
        let mut order = Vec::with_capacity(module.len());
        let mut stack: Vec<TypeId> = module.roots().iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            let Some(ty) = module.get(id) else {
                continue;
            };
            order.push(id);
            stack.extend(ty.nested_types().iter().rev().copied());
        }

        order
    }
}
