//! Thin re-export surface so the binary and any future embedders share a
//! single entrypoint into the runtime.

pub use memoria_facade::{Facade, FacadeConfig};
