// rox-data: Serde structs for recorded sequence, scene object and replay config documents
pub mod config;
pub mod model;
