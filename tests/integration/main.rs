//! Integration tests for the PhotoFlow services.

mod helpers;

mod pipeline_test;
mod security_test;
mod tracker_test;
