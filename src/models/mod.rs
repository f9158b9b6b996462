pub mod job;
pub mod provider;
pub mod verification;
