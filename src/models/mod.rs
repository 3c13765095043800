pub mod message;
pub mod timeline;
pub mod waypoint;
