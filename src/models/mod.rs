pub mod user;
pub mod verification;
