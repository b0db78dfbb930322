//! Engine integration tests
//!
//! Run the full pipeline against an in-memory catalog, a temp-dir local
//! mirror and a recording fake of the remote drive port.

mod feed_behavior;
mod matrix_edges;
mod prober;
mod rig;
