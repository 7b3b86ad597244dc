//! Scheduler unit tests
