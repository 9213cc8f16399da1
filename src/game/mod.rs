pub mod constants;
pub mod player;
pub mod simulation;
pub mod spawn;
pub mod spore;
pub mod world;
