#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod build;
pub mod config;
pub mod dev;
pub mod error;
pub mod imports;
pub mod paths;
pub mod plugin;
pub mod resolver;

pub use build::{graph::ModuleGraph, BuildEngine, BuildSummary, ModuleOutput};
pub use config::{Config, ServerConfig, CONFIG_FILE};
pub use error::Error;
pub use imports::{scan_imports, ImportKind, ImportSpec};
pub use plugin::{
    HookResult, LoadResult, Plugin, PluginContainer, PluginContext, PluginError, ResolvedId,
    TransformResult,
};
pub use resolver::{DependencyInfo, Resolver};
