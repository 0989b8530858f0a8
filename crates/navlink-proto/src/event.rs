use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Liveness,
    Command,
}

/// One line of pipeline output, as printed by `navlink run --json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkEvent {
    pub ts_unix_ms: i64,
    pub kind: EventKind,
    pub msg: String,
}
