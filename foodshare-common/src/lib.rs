pub mod geo;
pub mod lifecycle;
pub mod model;
pub mod query;
pub mod snowflake;
pub mod util;
