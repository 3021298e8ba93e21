mod bank;
mod identify;

pub use bank::ProfileBank;
pub use identify::IdentificationEngine;
