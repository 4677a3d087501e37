//! Mesh identity resolvers.

pub mod static_resolver;

pub use static_resolver::StaticIdentityResolver;
