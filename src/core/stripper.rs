// src/core/stripper.rs
use tracing::debug;

use super::model::{Module, TypeId};

/// Turns a module into a metadata-only reference stub by emptying method bodies.
///
/// Names, attributes, return types and the body location stay untouched so
/// every method remains a linkable signature.
pub struct BodyStripper;

impl BodyStripper {
    /// Empty every method body reachable through `order`, returning how many were stripped
    pub fn strip(module: &mut Module, order: &[TypeId]) -> usize {
        let mut stripped = 0;

        for id in order {
            let Some(ty) = module.get_mut(*id) else {
                continue;
            };
            let mut emptied = 0;
            for method in &mut ty.methods {
                if let Some(body) = method.body.as_mut() {
                    if !body.is_empty() {
                        body.code.clear();
                        emptied += 1;
                    }
                }
            }
            if emptied > 0 {
                debug!("Stripped {} method bodies of {}", emptied, ty.full_name());
            }
            stripped += emptied;
        }

        stripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{MemberAccess, MethodBody, MethodSymbol, TypeSymbol, TypeVisibility};
    use crate::core::TypeTreeFlattener;

    #[test]
    fn test_strip_preserves_signature() {
        let mut module = Module::new("Lib");
        let mut ty = TypeSymbol::new("Math", TypeVisibility::Public);

        let mut add = MethodSymbol::new("Add", MemberAccess::Private);
        add.return_type = "int32".to_string();
        add.attributes = 0x0090;
        add.body = Some(MethodBody::new(0x2050, vec![0x02, 0x03, 0x58, 0x2A]));
        ty.add_method(add);

        let mut run = MethodSymbol::new("Run", MemberAccess::Public);
        run.attributes = 0x0400;
        ty.add_method(run);

        let mut empty = MethodSymbol::new("Nop", MemberAccess::Public);
        empty.body = Some(MethodBody::new(0x2060, Vec::new()));
        ty.add_method(empty);

        let id = module.add_type(ty);
        let order = TypeTreeFlattener::flatten(&module);
        assert_eq!(BodyStripper::strip(&mut module, &order), 1);

        let add = &module.get(id).unwrap().methods[0];
        assert_eq!(add.name, "Add");
        assert_eq!(add.return_type, "int32");
        assert_eq!(add.attributes, 0x0090);
        assert_eq!(add.access, MemberAccess::Private);
        assert_eq!(add.body, Some(MethodBody::new(0x2050, Vec::new())));

        assert!(module.get(id).unwrap().methods[1].body.is_none());
    }

    #[test]
    fn test_strip_reaches_nested_types() {
        let mut module = Module::new("Lib");
        let outer = module.add_type(TypeSymbol::new("Outer", TypeVisibility::Public));
        let mut inner = TypeSymbol::new("Inner", TypeVisibility::NestedPrivate);
        let mut work = MethodSymbol::new("Work", MemberAccess::Private);
        work.body = Some(MethodBody::new(0, vec![0x2A]));
        inner.add_method(work);
        let inner = module.add_nested_type(outer, inner).unwrap();

        let order = TypeTreeFlattener::flatten(&module);
        assert_eq!(BodyStripper::strip(&mut module, &order), 1);
        assert!(module.get(inner).unwrap().methods[0]
            .body
            .as_ref()
            .unwrap()
            .is_empty());
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_only_types_with_stripped_bodies_are_logged() {
        let mut module = Module::new("Lib");
        let mut busy = TypeSymbol::new("Busy", TypeVisibility::Public);
        let mut work = MethodSymbol::new("Work", MemberAccess::Public);
        work.body = Some(MethodBody::new(0, vec![0x2A]));
        busy.add_method(work);
        module.add_type(busy);
        let mut idle = TypeSymbol::new("Idle", TypeVisibility::Public);
        idle.add_method(MethodSymbol::new("Abstract", MemberAccess::Public));
        module.add_type(idle);
        let order = TypeTreeFlattener::flatten(&module);

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let stripped =
            tracing::subscriber::with_default(subscriber, || BodyStripper::strip(&mut module, &order));

        assert_eq!(stripped, 1);
        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("Stripped 1 method bodies of Busy"));
        assert!(!logs.contains("Idle"));
    }
}
