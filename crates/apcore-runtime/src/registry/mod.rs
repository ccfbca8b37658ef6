//! Module registry: store, events, and the 8-step discovery pipeline.
//!
//! ```text
//! 1. scan         : walk extension roots for *.module.yaml manifests
//! 2. id-map       : apply canonical-id overrides
//! 3. metadata     : load <stem>_meta.yaml companions
//! 4. entry points : resolve factories from the ModuleCatalog
//! 5. validate     : collect-all-errors interface checks
//! 6. dependencies : parse DependencyInfo records from metadata
//! 7. topo sort    : Kahn's algorithm, deterministic frontier
//! 8. register     : instantiate + merge metadata, in order
//! ```

mod catalog;
mod dependencies;
mod entry_point;
mod metadata;
mod registry;
mod scanner;

pub use catalog::{ModuleCatalog, ModuleFactory};
pub use dependencies::resolve_dependencies;
pub use entry_point::resolve_entry_point;
pub use metadata::{
    load_id_map, load_metadata, merge_module_metadata, parse_dependencies, IdMapEntry,
};
pub use registry::{is_valid_module_id, Registry, RegistryCallback, RegistryEvent};
pub use scanner::{scan_extensions, scan_multi_root, RootSpec, SOURCE_EXTENSION};
