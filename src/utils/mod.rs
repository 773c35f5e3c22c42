pub mod filters;
pub mod hash;
pub mod text;
