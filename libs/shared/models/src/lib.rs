pub mod auth;
pub mod error;

pub mod appointment;
pub mod compensation;
pub mod inventory;
pub mod payment;
pub mod prescription;
pub mod schedule;
