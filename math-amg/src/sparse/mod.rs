//! Sparse matrix structures (CSR format)
//!
//! This module provides Compressed Sparse Row (CSR) format for efficient
//! storage, matrix-vector products and the Galerkin triple product used to
//! build coarse operators.

mod csr;

pub use csr::{CsrBuilder, CsrMatrix};
