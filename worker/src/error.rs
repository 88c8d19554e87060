use std::{error::Error, fmt, io};

use parameter_server::{initialization::RandErr, storage::StoreErr};

use crate::tables::TableKind;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Worker runtime failures.
#[derive(Debug)]
pub enum WorkerErr {
    Io(io::Error),
    Config(String),
    Resolve {
        broker: String,
        source: io::Error,
    },
    Connect {
        broker: String,
        source: io::Error,
    },
    Timeout {
        broker: String,
        stage: &'static str,
    },
    Send {
        broker: String,
        source: io::Error,
    },
    Recv {
        broker: String,
        source: io::Error,
    },
    MalformedReply {
        reply: usize,
        reason: String,
    },
    Store(StoreErr),
    Init(RandErr),
    MissingTable(TableKind),
    MissingRow {
        kind: TableKind,
        node: usize,
    },
    LengthMismatch {
        expected: usize,
        got: usize,
    },
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Io(e) => write!(f, "io error: {e}"),
            WorkerErr::Config(msg) => write!(f, "invalid config: {msg}"),
            WorkerErr::Resolve { broker, source } => {
                write!(f, "cannot resolve broker {broker}: {source}")
            }
            WorkerErr::Connect { broker, source } => {
                write!(f, "connecting to broker {broker} failed: {source}")
            }
            WorkerErr::Timeout { broker, stage } => {
                write!(f, "broker {broker} timed out during {stage}")
            }
            WorkerErr::Send { broker, source } => {
                write!(f, "sending registration to broker {broker} failed: {source}")
            }
            WorkerErr::Recv { broker, source } => {
                write!(f, "receiving membership from broker {broker} failed: {source}")
            }
            WorkerErr::MalformedReply { reply, reason } => {
                write!(f, "malformed membership reply #{reply}: {reason}")
            }
            WorkerErr::Store(e) => write!(f, "parameter store error: {e}"),
            WorkerErr::Init(e) => write!(f, "table initialization error: {e}"),
            WorkerErr::MissingTable(kind) => write!(f, "table {kind:?} is not prepared"),
            WorkerErr::MissingRow { kind, node } => {
                write!(f, "no {kind:?} row attached for node {node}")
            }
            WorkerErr::LengthMismatch { expected, got } => {
                write!(f, "length mismatch: expected {expected}, got {got}")
            }
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Io(e)
            | WorkerErr::Resolve { source: e, .. }
            | WorkerErr::Connect { source: e, .. }
            | WorkerErr::Send { source: e, .. }
            | WorkerErr::Recv { source: e, .. } => Some(e),
            WorkerErr::Store(e) => Some(e),
            WorkerErr::Init(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<StoreErr> for WorkerErr {
    fn from(value: StoreErr) -> Self {
        Self::Store(value)
    }
}

impl From<RandErr> for WorkerErr {
    fn from(value: RandErr) -> Self {
        Self::Init(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}
