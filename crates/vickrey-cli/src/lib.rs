//! The `vickrey` command line: seeding, serving, manual page sync and team
//! provisioning.

pub mod actions;
pub mod cli;
pub mod commands;
pub mod dispatch;
