mod field;
mod table;
mod reference;
mod uri;

pub use field::{BqType, Column, FieldMode};
pub use table::LoadSchema;
pub use reference::TableRef;
pub use uri::GcsUri;
