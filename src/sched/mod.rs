//! /proc/schedstat sampling: per-CPU parsing and delta bookkeeping

pub mod engine;
pub mod sample;
