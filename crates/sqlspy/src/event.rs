//! Spy identity and the events the interception layer produces.

use crate::table::ResultSetCollector;
use std::error::Error;
use std::fmt;

/// The kind of resource a spy wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassType {
    DataSource,
    Connection,
    Statement,
    PreparedStatement,
    ResultSet,
}

impl ClassType {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassType::DataSource => "DataSource",
            ClassType::Connection => "Connection",
            ClassType::Statement => "Statement",
            ClassType::PreparedStatement => "PreparedStatement",
            ClassType::ResultSet => "ResultSet",
        }
    }
}

impl fmt::Display for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies which wrapped resource produced an event.
///
/// Assigned once when the resource is wrapped and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpyId {
    pub class_type: ClassType,
    /// `None` for resources not tied to one connection (a data source or pool).
    pub connection_number: Option<u64>,
}

impl SpyId {
    pub fn new(class_type: ClassType, connection_number: Option<u64>) -> Self {
        Self {
            class_type,
            connection_number,
        }
    }

    /// A spy on a connection-independent resource.
    pub fn data_source() -> Self {
        Self::new(ClassType::DataSource, None)
    }

    /// Same connection, different resource kind.
    pub fn with_class(self, class_type: ClassType) -> Self {
        Self { class_type, ..self }
    }

    /// The connection number for display, `-` when there is none.
    pub fn number(&self) -> ConnectionNumber {
        ConnectionNumber(self.connection_number)
    }
}

/// Display adapter for an optional connection number.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionNumber(Option<u64>);

impl fmt::Display for ConnectionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(n) => write!(f, "{n}"),
            None => f.write_str("-"),
        }
    }
}

/// Something that happened at a wrapped call boundary.
///
/// Events borrow from the call site and are consumed exactly once by
/// [`SpyLogDelegate::handle`](crate::delegate::SpyLogDelegate::handle).
#[derive(Debug)]
pub enum SpyEvent<'a> {
    ExceptionOccurred {
        spy: SpyId,
        method_call: &'a str,
        error: &'a (dyn Error + 'static),
        sql: Option<&'a str>,
        exec_time_ms: Option<u64>,
    },
    MethodReturned {
        spy: SpyId,
        method_call: &'a str,
        return_text: &'a str,
    },
    ConstructorReturned {
        spy: SpyId,
        info: &'a str,
    },
    SqlOccurred {
        spy: SpyId,
        method_call: &'a str,
        sql: &'a str,
    },
    SqlTimingOccurred {
        spy: SpyId,
        exec_time_ms: u64,
        method_call: &'a str,
        sql: &'a str,
    },
    ConnectionOpened {
        spy: SpyId,
        exec_time_ms: Option<u64>,
    },
    ConnectionClosed {
        spy: SpyId,
        exec_time_ms: Option<u64>,
    },
    ConnectionAborted {
        spy: SpyId,
        exec_time_ms: Option<u64>,
    },
    ResultSetCollected {
        collector: &'a mut ResultSetCollector,
    },
}
