//! # wwks-engine
//!
//! Reconciliation engine of the WWKS robot client.
//!
//! The engine keeps the stock table and the in-flight output orders in step
//! with what the robot reports, and raises typed events for its consumers.
//! It runs as one tokio task driven through an [`EngineHandle`]:
//!
//! 1. Build an [`EngineContext`] from the config and call [`Engine::start`].
//! 2. [`subscribe`](EngineHandle::subscribe) for [`EngineEvent`]s.
//! 3. [`connect`](EngineHandle::connect) to the robot; the handshake, status
//!    query and first full refresh follow automatically.
//! 4. Issue intents: [`refresh`](EngineHandle::refresh),
//!    [`request_output`](EngineHandle::request_output),
//!    [`search`](EngineHandle::search).
//!
//! ## Modules
//!
//! | Module        | Role                                                  |
//! |---------------|-------------------------------------------------------|
//! | `reconcile`   | Synchronous state machine, returns effects            |
//! | `stock_table` | Stock rows keyed by article id                        |
//! | `order_book`  | Output orders, one open order per article             |
//! | `event`       | Engine events and the subscriber bus                  |
//! | `debounce`    | Cancellable search delay                              |
//! | `engine`      | The async task, its context and handle                |

pub mod debounce;
pub mod engine;
pub mod event;
pub mod order_book;
pub mod reconcile;
pub mod stock_table;

pub use engine::{Engine, EngineContext, EngineHandle, EngineSnapshot};
pub use event::{EngineEvent, EngineEventReceiver};
pub use reconcile::{Effects, OutputIntent, Reconciler};
