//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in machine-readable I/O: the call-table documents handed to the generator
//! and the JSON reports printed by the command-line tools.

pub const CALL_TABLE_SCHEMA_VERSION: &str = "csource.calls@0.1.0";

pub const CSOURCE_REPORT_SCHEMA_VERSION: &str = "csource.report@0.1.0";
pub const CSOURCE_BUILD_REPORT_SCHEMA_VERSION: &str = "csource-build.report@0.1.0";
