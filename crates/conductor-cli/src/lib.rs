//! Conductor CLI library: the command implementations behind the
//! `conductor` binary, exposed for integration tests.

pub mod commands;
