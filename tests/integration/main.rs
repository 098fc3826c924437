//! Integration tests

mod common;
mod execution_test;
mod pipeline_test;
mod queue_test;
mod routing_test;
