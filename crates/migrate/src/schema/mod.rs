//! Schema Model
//!
//! Adapter-agnostic description of tables, columns, indexes and foreign keys,
//! the operations that change them, and the [`Schema`] handle migrations use
//! to run those operations.

pub mod column;
pub mod definition;
pub mod executor;
pub mod foreign_key;
pub mod index;
pub mod operation;
pub mod options;
pub mod table;

pub use column::{Column, ColumnDefault, ColumnOptions, ColumnType};
pub use definition::{ColumnMap, IdStrategy, TableDefinition, TableOptions};
pub use executor::{Schema, SchemaMode};
pub use foreign_key::{ForeignKey, ReferentialAction};
pub use index::{Index, IndexType};
pub use operation::SchemaOperation;
pub use options::{options_from_json, OptionSetter, OptionValue};
pub use table::Table;
