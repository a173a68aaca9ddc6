//! Schema metadata model and the remote source boundary
//!
//! - [`types`]: Schema object types (entities, enumerations, labels, modules)
//! - [`labels`]: `Labelled` capability and the label walker
//! - [`source`]: `MetadataSource` trait implemented by the transport layer

pub mod labels;
pub mod source;
pub mod types;
