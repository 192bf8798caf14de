//! Galton Plugin System
//!
//! Every analysis the engine offers is a [`FunctionPlugin`]: a pure
//! function over [`Value`](galton_core::Value)s that describes itself with
//! [`FunctionMeta`] and is looked up by name in a [`PluginRegistry`].

mod context;
mod registry;
mod traits;

pub use context::{AdvisorConfig, EvalContext};
pub use registry::PluginRegistry;
pub use traits::{ArgMeta, FunctionMeta, FunctionPlugin};

/// Re-export core types for plugin authors
pub mod prelude {
    pub use crate::{AdvisorConfig, ArgMeta, EvalContext, FunctionMeta, FunctionPlugin, PluginRegistry};
    pub use galton_core::prelude::*;
}
