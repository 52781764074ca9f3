//! Client-side board: lane partition, drag handling and store sync.
//!
//! ```text
//! ┌──────────────┐ relocate/submit/remove ┌────────────────┐   HTTP   ┌───────┐
//! │ CLI / caller │ ─────────────────────> │ BoardManager   │ ───────> │ store │
//! │              │ <───── BoardEvent ──── │  └─ Board      │ <─────── │ (api) │
//! └──────────────┘                        └────────────────┘          └───────┘
//! ```
//!
//! | Module      | Responsibility                                            |
//! |-------------|-----------------------------------------------------------|
//! | `partition` | `Board`: three ordered lanes, pure `relocate`             |
//! | `manager`   | `BoardManager`: optimistic updates, load sequencing       |
//! | `client`    | `TaskStore` trait and its reqwest implementation          |
//! | `session`   | `Session`: bearer token from register/login               |

pub mod client;
pub mod manager;
pub mod partition;
pub mod session;

pub use client::{HttpTaskStore, TaskStore};
pub use manager::{BoardEvent, BoardManager, FormState, LoadOutcome, PersistTicket, TaskDraft};
pub use partition::{Board, Relocation};
pub use session::Session;
