//! # Task Intake
//!
//! Turns uploaded files and JSON payloads into labeling tasks for a
//! project, checked against the data fields its labeling config declares.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐   ┌───────────┐
//! │   Uploads   │──▶│  Normalizer  │──▶│   Import   │──▶│ TaskStore │
//! │ files / dir │   │ (core crate) │   │  service   │   │           │
//! └─────────────┘   └──────────────┘   └────────────┘   └───────────┘
//!        │                  ▲
//!        ▼                  │
//!  ┌─────────────┐          │
//!  │ FileStorage │──────────┘
//!  └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! intake --config ./config/intake.toml check
//! intake --config ./config/intake.toml import --project 1 tasks.csv
//! intake --config ./config/intake.toml import-dir --project 1 ./dataset
//! echo '[{"text": "hi"}]' | intake --config ./config/intake.toml inline --project 1 -
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`storage`] | Local filesystem file storage |
//! | [`svg`] | SVG allowlist cleanup |
//! | [`uploads`] | Upload naming, creation, directory uploads, registry |
//! | [`import`] | Import, inline import, and re-import |
//! | [`commands`] | CLI command implementations |
//! | [`logging`] | Tracing subscriber setup |

pub mod commands;
pub mod config;
pub mod import;
pub mod logging;
pub mod storage;
pub mod svg;
pub mod uploads;
