//! Domain types shared by every oxpager crate.
//!
//! Alerts arrive from the external detection pipeline as [`types::AlertRecord`]s;
//! the policy entities in [`types`] (maintenance windows, suppression rules,
//! routing rows, on-call schedules) are authored elsewhere and only read here.

pub mod condition;
pub mod id;
pub mod types;
