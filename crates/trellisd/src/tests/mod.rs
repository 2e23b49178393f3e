//! Test suites for the Trellis daemon.

pub(crate) mod support;
