//! Source side of the federation: the table catalog, the connector contract every store
//! implements, the in-memory relational/document connector and the synthetic dataset.

pub mod catalog;
pub mod connector;
pub mod fixtures;
pub mod memory;

pub use catalog::*;
pub use connector::*;
pub use fixtures::{generate_dataset, Dataset, DatasetConfig};
pub use memory::MemoryConnector;
