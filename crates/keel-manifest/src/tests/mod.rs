//! Tests for the keel-manifest crate.

mod helpers;
