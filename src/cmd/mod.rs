//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                                  |
//! |-----------|---------------------------------------------------|
//! | `serve`   | `Serve`, `Init`                                   |
//! | `account` | `Register`, `Login`, `Logout`, `Whoami`           |
//! | `board`   | `Board`, `Add`, `Edit`, `Move`, `Rm`              |

pub mod account;
pub mod board;
pub mod serve;

pub use account::{cmd_login, cmd_logout, cmd_register, cmd_whoami};
pub use board::{TaskEdit, cmd_add, cmd_board, cmd_edit, cmd_move, cmd_rm};
pub use serve::{cmd_init, cmd_serve};
