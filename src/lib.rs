//! Staged concurrent command runner.
//!
//! A plan is an ordered list of **stages**; each stage holds **steps**
//! (shell command templates). Steps within a stage run concurrently; a
//! stage only completes once every one of its steps has finished, and the
//! next stage starts only after the previous one fully drains.
//!
//! - [`config`]: the YAML plan document (`play:` stages + `vars`).
//! - [`render`]: step template substitution against the shared vars.
//! - [`gate`] / [`sink`]: the stage barrier and asynchronous failure
//!   collection.
//! - [`task`]: one child process — lifecycle, stream capture, outcome.
//! - [`play`]: the orchestrator driving stages and exposing results.
//! - [`report`], [`palette`], [`notify`]: console rendering, per-task
//!   colors, and the best-effort notification seam.

pub mod config;
pub mod gate;
pub mod logging;
pub mod notify;
pub mod palette;
pub mod play;
pub mod render;
pub mod report;
pub mod sink;
pub mod task;
