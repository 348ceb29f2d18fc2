mod pool_tests;
mod search_tests;
mod snapshot_tests;
pub(crate) mod support;
