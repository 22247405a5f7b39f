//! Stylenet binary executable.
//!
//! One binary runs every role: `rendezvous`, `processor` and `initiator`.

pub mod cli;
mod logs;
