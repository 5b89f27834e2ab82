//! Utilities for preparing throwaway file databases in tests. Not for production use.
pub mod prepare_env;
