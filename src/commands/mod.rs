pub mod apply;
pub mod validate;
