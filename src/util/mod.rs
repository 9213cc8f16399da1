pub mod registry;
pub mod vec2;
