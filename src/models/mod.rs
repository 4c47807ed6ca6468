pub mod dcim;
pub mod ipam;
pub mod virtualization;

pub use dcim::*;
pub use ipam::*;
pub use virtualization::*;
