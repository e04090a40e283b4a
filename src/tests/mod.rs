//! Cross-module tests that drive the schedule controller through whole wake
//! cycles with in-memory collaborators.
