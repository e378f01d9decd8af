//! Value objects of the table format: schemas, partition specs, sort orders,
//! snapshots and the table metadata document that ties them together.

mod partition;
mod schema;
mod snapshot;
mod sort;
mod table_metadata;

pub use partition::{PartitionField, PartitionSpec};
pub use schema::{ComplexType, FieldType, Schema, SchemaType, StructField};
pub use snapshot::{Snapshot, SnapshotRefType, SnapshotReference};
pub use sort::{NullOrder, SortDirection, SortField, SortOrder};
pub use table_metadata::{MetadataLogEntry, SnapshotLogEntry, TableMetadata, MAIN_BRANCH};
