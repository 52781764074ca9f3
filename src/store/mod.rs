//! Server-side task store: REST API over SQLite.
//!
//! | Module   | Responsibility                                        |
//! |----------|-------------------------------------------------------|
//! | `db`     | `TaskDb` schema, queries, lane re-ranking; `DbHandle` |
//! | `auth`   | bearer-token extractor and register/login/logout/me   |
//! | `api`    | task routes, `ApiError`                               |
//! | `server` | `ServerConfig`, router assembly, graceful shutdown    |

pub mod api;
pub mod auth;
pub mod db;
pub mod server;

pub use db::{DbHandle, TaskDb};
pub use server::{ServerConfig, build_router, open_state, start_server, state_from_db};
