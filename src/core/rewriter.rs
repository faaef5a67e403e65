// src/core/rewriter.rs
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::event_filter::EventBackingFieldFilter;
use super::model::{MemberAccess, MethodSymbol, Module, TypeId, TypeVisibility};

/// Number of symbols promoted per kind. Symbols that were already public are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteReport {
    pub types: usize,
    pub methods: usize,
    pub fields: usize,
    pub getters: usize,
    pub setters: usize,
    /// Fields left alone because they share a name with an event
    pub excluded_fields: usize,
}

impl RewriteReport {
    pub fn total(&self) -> usize {
        self.types + self.methods + self.fields + self.getters + self.setters
    }

    pub fn log(&self) {
        for (count, kind) in [
            (self.types, "types"),
            (self.methods, "methods"),
            (self.fields, "fields"),
            (self.getters, "getters"),
            (self.setters, "setters"),
        ] {
            info!("Changed {} non-public {} to public.", count, kind);
        }
        if self.excluded_fields > 0 {
            info!(
                "Kept {} event backing fields as they were.",
                self.excluded_fields
            );
        }
    }
}

/// Promotes every type and member of a module to public.
///
/// The rewrite only ever raises visibility, so running it twice changes
/// nothing the second time.
pub struct VisibilityRewriter;

impl VisibilityRewriter {
    /// Run the type, method, field, getter and setter passes over `order`
    pub fn rewrite(
        module: &mut Module,
        order: &[TypeId],
        filter: &EventBackingFieldFilter,
    ) -> RewriteReport {
        let mut report = RewriteReport::default();

        for id in order {
            if let Some(ty) = module.get_mut(*id) {
                let target = if ty.is_nested() {
                    TypeVisibility::NestedPublic
                } else {
                    TypeVisibility::Public
                };
                if ty.visibility != target {
                    debug!("Type {} {:?} -> {:?}", ty.full_name(), ty.visibility, target);
                    ty.visibility = target;
                    report.types += 1;
                }
            }
        }

        for id in order {
            if let Some(ty) = module.get_mut(*id) {
                for method in &mut ty.methods {
                    if promote_method(method) {
                        report.methods += 1;
                    }
                }
            }
        }

        for id in order {
            let Some(ty) = module.get(*id) else {
                continue;
            };
            let excluded: Vec<bool> = ty
                .fields
                .iter()
                .map(|field| filter.excludes(ty, &field.name))
                .collect();

            if let Some(ty) = module.get_mut(*id) {
                for (field, skip) in ty.fields.iter_mut().zip(excluded) {
                    if skip {
                        if !field.is_public() {
                            debug!("Skipping event backing field {}", field.name);
                            report.excluded_fields += 1;
                        }
                        continue;
                    }
                    if !field.is_public() {
                        field.access = MemberAccess::Public;
                        report.fields += 1;
                    }
                }
            }
        }

        for id in order {
            if let Some(ty) = module.get_mut(*id) {
                let accessors: Vec<_> = ty
                    .properties
                    .iter()
                    .map(|p| (p.getter, p.setter))
                    .collect();

                for (getter, setter) in accessors {
                    if let Some(method) = getter.and_then(|g| ty.method_mut(g)) {
                        if promote_method(method) {
                            report.getters += 1;
                        }
                    }
                    if let Some(method) = setter.and_then(|s| ty.method_mut(s)) {
                        if promote_method(method) {
                            report.setters += 1;
                        }
                    }
                }
            }
        }

        report
    }
}

fn promote_method(method: &mut MethodSymbol) -> bool {
    if method.is_public() {
        return false;
    }
    method.access = MemberAccess::Public;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{
        EventSymbol, FieldSymbol, MethodSymbol, PropertySymbol, TypeSymbol,
    };
    use crate::core::TypeTreeFlattener;

    fn sample_module() -> Module {
        let mut module = Module::new("Lib");

        let mut widget = TypeSymbol::new("Widget", TypeVisibility::NotPublic);
        widget.add_method(MethodSymbol::new(".ctor", MemberAccess::Public));
        widget.add_method(MethodSymbol::new("Draw", MemberAccess::Private));
        let getter = widget.add_method(MethodSymbol::new("get_Size", MemberAccess::Assembly));
        widget.fields.push(FieldSymbol::new("size", MemberAccess::Private));
        widget.fields.push(FieldSymbol::new("Clicked", MemberAccess::Private));
        widget.fields.push(FieldSymbol::new("Name", MemberAccess::Public));
        widget.events.push(EventSymbol::new("Clicked"));
        let mut size = PropertySymbol::new("Size");
        size.getter = Some(getter);
        widget.properties.push(size);
        let widget = module.add_type(widget);

        let mut cache = TypeSymbol::new("Cache", TypeVisibility::NestedPrivate);
        cache.add_method(MethodSymbol::new("Clear", MemberAccess::Family));
        module.add_nested_type(widget, cache).unwrap();

        module.add_type(TypeSymbol::new("Api", TypeVisibility::Public));
        module
    }

    fn rewrite(module: &mut Module) -> RewriteReport {
        let order = TypeTreeFlattener::flatten(module);
        let filter = EventBackingFieldFilter::from_types(module, &order);
        VisibilityRewriter::rewrite(module, &order, &filter)
    }

    #[test]
    fn test_counts_per_kind() {
        let mut module = sample_module();
        let report = rewrite(&mut module);

        assert_eq!(report.types, 2);
        assert_eq!(report.methods, 3);
        assert_eq!(report.fields, 1);
        assert_eq!(report.getters, 0);
        assert_eq!(report.setters, 0);
        assert_eq!(report.excluded_fields, 1);
        assert_eq!(report.total(), 6);
    }

    #[test]
    fn test_nested_types_use_nested_public() {
        let mut module = sample_module();
        rewrite(&mut module);

        for (_, ty) in module.types() {
            if ty.is_nested() {
                assert!(ty.is_nested_public(), "{} not nested public", ty.name);
                assert!(!ty.is_public());
            } else {
                assert!(ty.is_public(), "{} not public", ty.name);
            }
        }
    }

    #[test]
    fn test_completeness_and_event_field_kept() {
        let mut module = sample_module();
        rewrite(&mut module);

        for (_, ty) in module.types() {
            assert!(ty.methods.iter().all(|m| m.is_public()));
            for field in &ty.fields {
                if field.name == "Clicked" {
                    assert_eq!(field.access, MemberAccess::Private);
                } else {
                    assert!(field.is_public());
                }
            }
        }
    }

    #[test]
    fn test_idempotent() {
        let mut module = sample_module();
        rewrite(&mut module);
        let snapshot = module.clone();

        let second = rewrite(&mut module);
        assert_eq!(second.total(), 0);
        assert_eq!(module, snapshot);
    }

    #[test]
    fn test_accessors_promoted_by_method_pass() {
        let mut module = Module::new("Lib");
        let mut ty = TypeSymbol::new("Settings", TypeVisibility::Public);
        let get = ty.add_method(MethodSymbol::new("get_Path", MemberAccess::Private));
        let set = ty.add_method(MethodSymbol::new("set_Path", MemberAccess::Private));
        let mut path = PropertySymbol::new("Path");
        path.getter = Some(get);
        path.setter = Some(set);
        ty.properties.push(path);
        ty.properties.push(PropertySymbol::new("Id"));
        let id = module.add_type(ty);

        let filter = EventBackingFieldFilter::disabled();
        let report = VisibilityRewriter::rewrite(&mut module, &[id], &filter);
        assert_eq!(report.methods, 2);
        assert_eq!(report.getters + report.setters, 0);
        assert!(module.get(id).unwrap().methods.iter().all(|m| m.is_public()));
    }

    #[test]
    fn test_dangling_accessor_is_skipped() {
        let mut module = Module::new("Lib");
        let mut ty = TypeSymbol::new("Broken", TypeVisibility::Public);
        let mut prop = PropertySymbol::new("Ghost");
        prop.getter = Some(crate::core::model::MethodId(7));
        ty.properties.push(prop);
        let id = module.add_type(ty);

        let report =
            VisibilityRewriter::rewrite(&mut module, &[id], &EventBackingFieldFilter::disabled());
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn test_disabled_filter_promotes_backing_field() {
        let mut module = sample_module();
        let order = TypeTreeFlattener::flatten(&module);
        let report =
            VisibilityRewriter::rewrite(&mut module, &order, &EventBackingFieldFilter::disabled());

        assert_eq!(report.fields, 2);
        assert_eq!(report.excluded_fields, 0);
    }
}
