mod params;
mod sql_template;

pub use params::QueryParams;
pub use sql_template::SqlTemplate;
