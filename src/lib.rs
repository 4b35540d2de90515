//! # Pixel Upload
//!
//! The media upload pipeline behind a "buy a pixel" advertising canvas. One
//! user-selected (or pasted) image is validated, compressed and resized,
//! optionally cropped, and sent to object storage, with progress reporting,
//! cancellation, retry, and leak-free cleanup of local byte references.
//!
//! # Architecture: One Run, Four Stages
//!
//! ```text
//! 1. Validate    SourceFile  →  ok / ValidationError     (size, MIME)
//! 2. Transform   SourceFile  →  Transformed              (constrain, re-encode)
//! 3. Crop        Transformed →  Transformed / abandoned  (only with an aspect ratio)
//! 4. Upload      Transformed →  public URL               (key, transfer, progress)
//! ```
//!
//! The [`pipeline::PipelineController`] is the only thing a host talks to. It
//! runs the stages of one *run* sequentially on a spawned tokio task and
//! publishes a [`pipeline::PipelineState`] snapshot on every transition.
//! Submitting a new file supersedes the run in flight: at most one run's
//! outcome is ever reported.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | State machine, run generations, retry and cancellation entry points |
//! | [`validate`] | Pure size / MIME checks |
//! | [`imaging`] | Dimension math, [`imaging::ImageBackend`] trait, `image`-crate backend, [`imaging::transform`] |
//! | [`crop`] | Crop collaborator trait and a non-interactive center crop |
//! | [`upload`] | Storage key generation, transfer, synthetic progress |
//! | [`storage`] | Object storage trait and a local-directory implementation |
//! | [`tracker`] | Registry of ephemeral byte references, released exactly once |
//! | [`config`] | `config.toml` loading, validation, and merging over stock defaults |
//! | [`env`] | Injected clock and randomness |
//! | [`error`] | Failure taxonomy (validation, transform, upload) |
//! | [`types`] | Payload types shared by every stage (`SourceFile`, `Blob`) |
//! | [`output`] | CLI output formatting of pipeline states |
//!
//! # Design Decisions
//!
//! ## Generations Over Locks
//!
//! Stages await blocking work, a crop UI, and the network. Rather than hold a
//! lock across those waits, each run carries a generation id and a
//! cancellation token. The controller's state lives behind one
//! `std::sync::Mutex`, taken only to commit a stage result, and a result whose
//! generation is no longer current is dropped. Superseding a run is therefore
//! synchronous: cancel the token, bump the generation, release everything.
//!
//! ## Never Inflate
//!
//! Re-encoding a small, already-compressed JPEG can make it larger. The
//! transform compares sizes and keeps the original bytes whenever the encoded
//! result is not strictly smaller. Animated GIFs and SVGs are never decoded at
//! all.
//!
//! ## Cancellation Is Not Failure
//!
//! A cancelled run ends in `Cancelled` with no error, even when the aborted
//! transfer surfaced a network error on its way out. Hosts show failures to
//! users; they should never show one for something the user asked for.
//!
//! ## Injected Ambient State
//!
//! Storage keys depend on the wall clock and randomness, and the transform
//! on a pixel backend. All three are traits ([`env::Clock`],
//! [`env::RandomSource`], [`imaging::ImageBackend`]) so tests drive the
//! pipeline deterministically without encoding a single real image.

pub mod config;
pub mod crop;
pub mod env;
pub mod error;
pub mod imaging;
pub mod output;
pub mod pipeline;
pub mod storage;
pub mod tracker;
pub mod types;
pub mod upload;
pub mod validate;
