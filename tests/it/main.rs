//! Black-box suite exercising the core end-to-end against a real temp
//! sqlite file, gated behind the `core-it` feature since mounting an actual
//! FUSE filesystem needs `/dev/fuse`/`CAP_SYS_ADMIN`, which CI doesn't
//! generally have; `fuse_adapter` is exercised only up to the
//! `dispatcher`/`namespace` boundary it wraps.

mod core;
mod support;
