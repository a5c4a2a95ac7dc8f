//! Resource actions: declarative, authorized, transactional CRUD and association
//! actions over a pluggable data store.

pub mod case;
pub mod config;
pub mod error;
pub mod input;
pub mod resource;
pub mod service;
pub mod sql;
pub mod store;
pub mod value;

pub use config::{from_json_str, load_from_path, resolve, ActionSettings, ModelDef, ModelRegistry, RegistryConfig};
pub use error::{ActionError, ActionResult, ConfigError, ErrorBody, MissingFields, StoreError};
pub use input::{ActionInput, AssociationInput, AuthBundle, Paginate};
pub use resource::{AssociationSpec, AuthSpec, ColumnsToReturn, FieldSpec, ResourceSpec};
pub use service::{ActionScope, Actions, Output};
pub use store::{MemoryScope, MemoryStore, PgScope, PgStore, Record, RecordSet, Related, Store};
