//! Integration tests for the credential flows
//! These run the real reqwest transport and loopback listener against a mock authority

pub mod test_harness;

pub mod authority_test;
pub mod cache_test;
pub mod flow_test;
