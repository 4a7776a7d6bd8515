pub mod health;
pub mod prescriptions;
pub mod steps;
pub mod sweeps;
pub mod webhooks;
