//! Bulk import and export of tree-structured, multi-channel messaging
//! content as CSV or XLSX files.
//!
//! The flow: [`importer::ContentImporter`] parses a tabular file into
//! [`rows::ContentRow`]s, [`tree::TreeBuilder`] folds those into
//! [`tree::ContentNode`]s, and the nodes persist into a
//! [`repo::ContentStore`] inside a transaction. [`exporter::ContentExporter`]
//! walks the store back out into rows, so an exported file reimports to the
//! same tree.

pub mod assessments;
pub mod blocks;
pub mod codec;
pub mod error;
pub mod exporter;
pub mod importer;
pub mod ordered_sets;
pub mod progress;
pub mod repo;
pub mod rows;
pub mod tree;
