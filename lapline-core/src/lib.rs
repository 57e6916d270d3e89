//! # lapline-core
//!
//! Pure logic for lapline (no I/O, instant tests).
//!
//! This crate implements the race-timing fold and the sync bookkeeping
//! without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. The event log is the only source of truth; runner
//! state is always obtained by replaying it:
//!
//! 1. [`effective`] drops events retracted by UNDO tombstones
//! 2. [`replay`] sorts the rest by `(captured_at_ms, id)`
//! 3. [`reducer`] folds each runner's stream under a [`RunTemplateConfig`]
//!
//! The actual I/O (store, remote) is performed by `lapline-client`, which
//! interprets the actions produced by the [`SyncState`] machine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod effective;
pub mod ingest;
pub mod reducer;
pub mod replay;
pub mod state;
pub mod template;
pub mod watermark;

pub use effective::{effective_events, into_effective, retracted_ids};
pub use ingest::{resolve_ingest, IngestOutcome};
pub use reducer::{apply_event, RunnerFlag, RunnerState};
pub use replay::{derive_runner, derive_standings, ordered_effective, replay_order};
pub use state::{Action, Event, LaneState, PullOutcome, PushOutcome, SyncEvent, SyncState};
pub use template::{
    resolve_template, Enforcement, FinishRule, RunTemplateConfig, StartRule, TemplateFlag,
    TemplateKey, TemplateOverrides, UnknownEnforcement, DEFAULT_SCAN_GAP_MS, FINISH_SCAN_GAP_MS,
};
pub use watermark::{plan_pull, PullPlan, Watermark};
