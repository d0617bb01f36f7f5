/// Declaration composition: cluster, launch template, node group and policy bindings
pub mod binding;
pub mod catalog;
pub mod cluster;
pub mod graph;
pub mod launch;
pub mod nodegroup;
pub mod stack;
pub mod types;

pub use catalog::ProviderCatalog;
pub use graph::{DeclarationGraph, ResourceId, ResourceKind, ResourceOutputs};
pub use stack::{compose, StackDeclaration, StackSpec};
