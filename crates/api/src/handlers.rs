pub mod devices;
pub mod report;
pub mod system;
