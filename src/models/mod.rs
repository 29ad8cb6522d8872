// src/models/mod.rs

pub mod award;
pub mod participant;
pub mod quiz;
pub mod submission;
