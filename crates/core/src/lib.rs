//! Module registry and configuration-driven instantiation for the trellis
//! host.
//!
//! Trellis is assembled from swappable components: protocol handlers,
//! writers, encoders, whole sub-applications. This crate is the backbone
//! that holds them together. Components register themselves once at process
//! start under hierarchical, dot-separated IDs; a configuration document
//! then drives the creation, initialization, validation, and eventual
//! teardown of a tree of instances, without the host needing compile-time
//! knowledge of which components are present.
//!
//! The moving parts, leaves first:
//!
//! - [`ModuleId`]: the identifier model.
//! - [`registry`]: the process-wide table of ID to constructor.
//! - [`Module`] and the capability traits ([`Provisioner`], [`Validator`],
//!   [`CleanerUpper`], [`App`], [`EventEmitter`]): what a registered
//!   component may implement.
//! - [`Context`]: the lifecycle scope of one configuration load, owning the
//!   instances it creates and their cleanup obligations.
//! - [`Context::load_module`] and friends: the resolver that turns raw
//!   configuration fields into provisioned instances.
//!
//! The core builds and tears down; it never schedules or runs components
//! after construction.

pub mod config;
pub mod context;
pub mod error;
pub mod id;
pub mod load;
pub mod logging;
pub mod module;
pub mod registry;
pub mod strict;

pub use config::{AppSlot, Config, ConfigHandle, load_config};
pub use context::Context;
pub use error::{LoadError, RegistryError, StrictError};
pub use id::ModuleId;
pub use load::{Descriptor, LoadedField, ModuleMap, RawModuleField, module_name_inline};
pub use module::{
	App, CleanerUpper, Event, EventEmitter, Module, ModuleInfo, ModuleRegistration, Provisioner,
	Validator, module_id, module_name,
};
pub use registry::{
	get_module, get_modules, modules, register_module, register_provided_modules,
};
