//! Publicizes .NET assemblies: every type, method, field and property
//! accessor of a module is rewritten to public visibility, optionally with
//! method bodies stripped to produce a reference-only stub.

pub mod cli;
pub mod codec;
pub mod config;
pub mod core;
pub mod error;
