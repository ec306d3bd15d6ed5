//! Table metadata and the snapshots built from it.

mod column;
mod registry;
mod relation;
mod snapshot;
mod table;

pub use column::Column;
pub use registry::{MetadataProvider, SchemaRegistry, StaticMetadata};
pub use relation::{Junction, Relation, RelationKind, RelationRef, RollupFunc, VirtualColumn};
pub use snapshot::SchemaSnapshot;
pub use table::{LookupPlan, RollupPlan, Table, TableMeta, TableRelation};
