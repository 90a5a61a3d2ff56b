//! End-to-end CLI builds against shell scripts standing in for the native
//! toolchain.

#![cfg(unix)]

mod build_tests;
mod common;
