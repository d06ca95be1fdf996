pub mod case;
pub mod journey;
pub mod vendor;
