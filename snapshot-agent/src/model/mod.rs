//! Data model shared by every pipeline stage.

pub mod filter;
pub mod object;
pub mod resource;

pub use filter::{BackupTemplate, Filter};
pub use object::ObjectRecord;
pub use resource::{GroupResource, GroupVersion, ResourceTypeDescriptor};
