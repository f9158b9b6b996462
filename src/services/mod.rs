pub mod audit;
pub mod clock;
pub mod deadline;
pub mod provider;
pub mod signer;
