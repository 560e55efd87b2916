pub mod accounts;
pub mod payments;
pub mod tasks;
pub mod webhook;
