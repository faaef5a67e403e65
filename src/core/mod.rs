// src/core/mod.rs
mod batch;
mod engine;
mod event_filter;
mod flattener;
mod model;
mod output;
mod report;
mod rewriter;
mod stripper;

pub use batch::{BatchDriver, BatchSummary, InputOutcome};
pub use engine::{Engine, InputReport};
pub use event_filter::EventBackingFieldFilter;
pub use flattener::TypeTreeFlattener;
pub use model::{
    EventSymbol, FieldSymbol, MemberAccess, MethodBody, MethodId, MethodSymbol, Module,
    PropertySymbol, TypeId, TypeSymbol, TypeVisibility,
};
pub use output::{OutputResolver, OutputSpec, OutputTarget};
pub use report::RunReport;
pub use rewriter::{RewriteReport, VisibilityRewriter};
pub use stripper::BodyStripper;
